//! Cancellation and request ordering shared by the view controllers.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Lifetime handle of a mounted view. Clones observe the same flag; once
/// cancelled, completion handlers must not touch view state.
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    cancelled: Arc<AtomicBool>,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Monotonic identity of an issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

#[derive(Debug, Default)]
pub struct TokenSequence {
    latest: u64,
}

impl TokenSequence {
    pub fn issue(&mut self) -> RequestToken {
        self.latest += 1;
        RequestToken(self.latest)
    }

    pub fn latest(&self) -> Option<RequestToken> {
        (self.latest > 0).then_some(RequestToken(self.latest))
    }

    pub fn is_latest(&self, token: RequestToken) -> bool {
        token.0 == self.latest
    }
}
