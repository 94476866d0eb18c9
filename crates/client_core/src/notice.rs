//! Transient user-facing notifications ("toasts").

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::sync::broadcast;

pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: Instant,
}

/// Cloneable sender half shared by every controller of a session.
#[derive(Clone)]
pub struct Notifier {
    next_id: Arc<AtomicU64>,
    tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn notify(&self, kind: NoticeKind, message: impl Into<String>) -> Notice {
        let notice = Notice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            message: message.into(),
            raised_at: Instant::now(),
        };
        // No subscriber is not an error: nobody is looking at the screen.
        let _ = self.tx.send(notice.clone());
        notice
    }

    pub fn success(&self, message: impl Into<String>) -> Notice {
        self.notify(NoticeKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Notice {
        self.notify(NoticeKind::Error, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Notice {
        self.notify(NoticeKind::Info, message)
    }
}

/// Display side of the notifier: notices stay visible until dismissed or
/// until [`NOTICE_TTL`] has elapsed.
pub struct NoticeTray {
    ttl: Duration,
    visible: Vec<Notice>,
}

impl Default for NoticeTray {
    fn default() -> Self {
        Self::new(NOTICE_TTL)
    }
}

impl NoticeTray {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            visible: Vec::new(),
        }
    }

    pub fn push(&mut self, notice: Notice) {
        self.visible.push(notice);
    }

    /// Moves everything currently queued on `rx` into the tray.
    pub fn drain(&mut self, rx: &mut broadcast::Receiver<Notice>) {
        loop {
            match rx.try_recv() {
                Ok(notice) => self.push(notice),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    pub fn dismiss(&mut self, id: u64) {
        self.visible.retain(|notice| notice.id != id);
    }

    pub fn expire(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.visible
            .retain(|notice| now.saturating_duration_since(notice.raised_at) < ttl);
    }

    pub fn visible(&self) -> &[Notice] {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_auto_dismiss_after_ttl() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let first = notifier.success("saved");
        notifier.error("failed");

        let mut tray = NoticeTray::default();
        tray.drain(&mut rx);
        assert_eq!(tray.visible().len(), 2);

        tray.expire(first.raised_at + Duration::from_secs(1));
        assert_eq!(tray.visible().len(), 2);

        tray.expire(first.raised_at + NOTICE_TTL + Duration::from_millis(10));
        assert!(tray.visible().is_empty());
    }

    #[test]
    fn dismiss_removes_only_the_given_notice() {
        let notifier = Notifier::new();
        let mut tray = NoticeTray::default();
        let a = notifier.info("a");
        let b = notifier.info("b");
        assert_ne!(a.id, b.id);
        tray.push(a.clone());
        tray.push(b);
        tray.dismiss(a.id);
        assert_eq!(tray.visible().len(), 1);
        assert_eq!(tray.visible()[0].message, "b");
    }
}
