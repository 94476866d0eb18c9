//! Controller behind the leads table: query state, row selection, paging and
//! bulk actions over a [`LeadCollectionBackend`].
//!
//! Every read runs under a fresh [`RequestToken`]; only the latest token may
//! apply its response. Mutations never patch rows locally, they refetch.

use std::sync::Arc;

use shared::{
    domain::{LeadId, LeadStatus, PageSize, SortKey},
    protocol::{Lead, LeadListParams},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    notice::Notifier,
    query::{last_page, LeadFilter, PageWindow, QueryState},
    scope::{RequestToken, TokenSequence, ViewScope},
    selection::Selection,
    LeadCollectionBackend,
};

#[derive(Debug)]
pub enum FetchOutcome {
    Applied {
        token: RequestToken,
        total_found: u64,
    },
    /// A newer request was issued before this one completed.
    Superseded(RequestToken),
    Cancelled,
    Failed(ClientError),
}

impl FetchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FetchOutcome::Applied { .. })
    }
}

#[derive(Debug)]
pub enum PageMove {
    Moved(FetchOutcome),
    Ignored,
}

#[derive(Debug)]
pub enum BulkOutcome {
    Completed {
        affected: usize,
        refresh: FetchOutcome,
    },
    NothingSelected,
    Busy,
    Cancelled,
    Failed(ClientError),
}

#[derive(Debug)]
pub enum UploadOutcome {
    Completed {
        message: String,
        refresh: FetchOutcome,
    },
    Busy,
    Cancelled,
    Failed(ClientError),
}

/// Rows the user agreed to delete. Only [`LeadCollectionController::request_bulk_delete`]
/// hands these out, so a delete always passes through confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBulkDelete {
    lead_ids: Vec<LeadId>,
}

impl PendingBulkDelete {
    pub fn lead_ids(&self) -> &[LeadId] {
        &self.lead_ids
    }

    pub fn len(&self) -> usize {
        self.lead_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lead_ids.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    pub query: QueryState,
    pub leads: Vec<Lead>,
    pub total_found: u64,
    pub selected: Vec<LeadId>,
    pub loading: bool,
    pub uploading: bool,
    pub bulk_in_flight: bool,
    pub latest_request: Option<RequestToken>,
    pub window: PageWindow,
}

impl CollectionSnapshot {
    pub fn lead_ids(&self) -> Vec<LeadId> {
        self.leads.iter().map(|lead| lead.id).collect()
    }

    pub fn is_selected(&self, id: LeadId) -> bool {
        self.selected.contains(&id)
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    query: QueryState,
    selection: Selection,
    leads: Vec<Lead>,
    total_found: u64,
    loading: bool,
    uploading: bool,
    bulk_in_flight: bool,
    tokens: TokenSequence,
}

impl CollectionState {
    fn visible_ids(&self) -> Vec<LeadId> {
        self.leads.iter().map(|lead| lead.id).collect()
    }

    fn page_reachable(&self, page: u64) -> bool {
        page == 0
            || page
                .checked_mul(self.query.limit.get())
                .is_some_and(|skip| skip < self.total_found)
    }
}

enum Begin {
    Started(RequestToken, LeadListParams),
    Declined,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum BulkAction {
    Status(LeadStatus),
    Delete,
}

impl BulkAction {
    fn label(self) -> &'static str {
        match self {
            BulkAction::Status(_) => "status",
            BulkAction::Delete => "delete",
        }
    }

    fn success_message(self, count: usize) -> String {
        let noun = if count == 1 { "lead" } else { "leads" };
        match self {
            BulkAction::Status(status) => format!("Updated {count} {noun} to {status}"),
            BulkAction::Delete => format!("Deleted {count} {noun}"),
        }
    }
}

pub struct LeadCollectionController {
    backend: Arc<dyn LeadCollectionBackend>,
    notifier: Notifier,
    scope: ViewScope,
    state: Mutex<CollectionState>,
}

impl LeadCollectionController {
    pub fn new(backend: Arc<dyn LeadCollectionBackend>, notifier: Notifier) -> Arc<Self> {
        Self::with_query(backend, notifier, QueryState::default())
    }

    pub fn with_query(
        backend: Arc<dyn LeadCollectionBackend>,
        notifier: Notifier,
        query: QueryState,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            notifier,
            scope: ViewScope::new(),
            state: Mutex::new(CollectionState {
                query,
                ..CollectionState::default()
            }),
        })
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub async fn fetch_page(&self) -> FetchOutcome {
        self.refetch(|_| {}).await
    }

    pub async fn set_filter(&self, filter: LeadFilter) -> FetchOutcome {
        self.refetch(move |state| {
            state.query.set_filter(filter);
            state.selection.clear();
        })
        .await
    }

    pub async fn set_sort(&self, sort: SortKey) -> FetchOutcome {
        self.refetch(move |state| {
            state.query.set_sort(sort);
            state.selection.clear();
        })
        .await
    }

    pub async fn set_limit(&self, limit: PageSize) -> FetchOutcome {
        self.refetch(move |state| {
            state.query.set_limit(limit);
            state.selection.clear();
        })
        .await
    }

    pub async fn next_page(&self) -> PageMove {
        self.move_page(|current| current.checked_add(1)).await
    }

    pub async fn previous_page(&self) -> PageMove {
        self.move_page(|current| current.checked_sub(1)).await
    }

    pub async fn go_to_page(&self, page: u64) -> PageMove {
        self.move_page(move |_| Some(page)).await
    }

    /// Returns `false` when `id` is not a rendered row.
    pub async fn toggle_select(&self, id: LeadId) -> bool {
        let mut state = self.state.lock().await;
        if !state.leads.iter().any(|lead| lead.id == id) {
            debug!(lead_id = %id, "leads: ignoring selection of a row that is not rendered");
            return false;
        }
        state.selection.toggle(id);
        true
    }

    pub async fn toggle_select_all(&self) {
        let mut state = self.state.lock().await;
        let visible = state.visible_ids();
        state.selection.toggle_all(&visible);
    }

    pub async fn bulk_update_status(&self, status: LeadStatus) -> BulkOutcome {
        let lead_ids = self.state.lock().await.selection.ids();
        self.run_bulk(BulkAction::Status(status), lead_ids).await
    }

    /// First half of a delete: captures the current selection for confirmation.
    pub async fn request_bulk_delete(&self) -> Option<PendingBulkDelete> {
        let state = self.state.lock().await;
        (!state.selection.is_empty()).then(|| PendingBulkDelete {
            lead_ids: state.selection.ids(),
        })
    }

    pub async fn confirm_bulk_delete(&self, pending: PendingBulkDelete) -> BulkOutcome {
        self.run_bulk(BulkAction::Delete, pending.lead_ids).await
    }

    pub async fn upload_csv(&self, filename: &str, contents: Vec<u8>) -> UploadOutcome {
        if self.scope.is_cancelled() {
            return UploadOutcome::Cancelled;
        }
        {
            let mut state = self.state.lock().await;
            if state.uploading {
                return UploadOutcome::Busy;
            }
            state.uploading = true;
        }

        info!(filename, bytes = contents.len(), "leads: uploading batch");
        let result = self.backend.upload_csv(filename, contents).await;
        self.state.lock().await.uploading = false;
        if self.scope.is_cancelled() {
            return UploadOutcome::Cancelled;
        }

        match result {
            Ok(ack) => {
                let message = if ack.message.trim().is_empty() {
                    "Batch uploaded".to_string()
                } else {
                    ack.message
                };
                info!(filename, "leads: batch accepted");
                self.notifier.success(message.clone());
                let refresh = self
                    .refetch(|state| {
                        state.query.page = 0;
                        state.selection.clear();
                    })
                    .await;
                UploadOutcome::Completed { message, refresh }
            }
            Err(err) => {
                warn!(%err, filename, "leads: batch upload failed");
                if !err.is_unauthorized() {
                    let message = match err.backend_message() {
                        Some(detail) => format!("Upload failed: {detail}"),
                        None => "Upload failed; check that the file is a valid CSV".to_string(),
                    };
                    self.notifier.error(message);
                }
                UploadOutcome::Failed(err)
            }
        }
    }

    pub async fn snapshot(&self) -> CollectionSnapshot {
        let state = self.state.lock().await;
        CollectionSnapshot {
            query: state.query.clone(),
            leads: state.leads.clone(),
            total_found: state.total_found,
            selected: state.selection.ids(),
            loading: state.loading,
            uploading: state.uploading,
            bulk_in_flight: state.bulk_in_flight,
            latest_request: state.tokens.latest(),
            window: PageWindow::new(state.query.page, state.query.limit, state.total_found),
        }
    }

    pub fn unmount(&self) {
        debug!("leads: view unmounted");
        self.scope.cancel();
    }

    async fn move_page(&self, target: impl FnOnce(u64) -> Option<u64> + Send) -> PageMove {
        let begin = self
            .begin_fetch(|state| match target(state.query.page) {
                Some(page) if page != state.query.page && state.page_reachable(page) => {
                    state.query.page = page;
                    state.selection.clear();
                    true
                }
                _ => false,
            })
            .await;
        match begin {
            Begin::Started(token, params) => PageMove::Moved(self.finish_fetch(token, params).await),
            Begin::Declined | Begin::Cancelled => PageMove::Ignored,
        }
    }

    async fn refetch(&self, mutate: impl FnOnce(&mut CollectionState) + Send) -> FetchOutcome {
        let begin = self
            .begin_fetch(|state| {
                mutate(state);
                true
            })
            .await;
        match begin {
            Begin::Started(token, params) => self.finish_fetch(token, params).await,
            Begin::Declined | Begin::Cancelled => FetchOutcome::Cancelled,
        }
    }

    /// Applies `mutate` and issues a token under one lock, so the request
    /// always reflects the query it was issued for.
    async fn begin_fetch(
        &self,
        mutate: impl FnOnce(&mut CollectionState) -> bool + Send,
    ) -> Begin {
        if self.scope.is_cancelled() {
            return Begin::Cancelled;
        }
        let mut state = self.state.lock().await;
        if !mutate(&mut state) {
            return Begin::Declined;
        }
        let token = state.tokens.issue();
        state.loading = true;
        Begin::Started(token, state.query.to_params())
    }

    async fn finish_fetch(&self, token: RequestToken, params: LeadListParams) -> FetchOutcome {
        let outcome = self.complete_fetch(token, params).await;
        if !outcome.is_applied() {
            return outcome;
        }

        // Rows under the current page may have vanished (e.g. a delete emptied
        // the last page); fall back to the last page that still exists.
        let clamp = self
            .begin_fetch(|state| {
                let past_end =
                    state.query.page > 0 && state.query.skip() >= state.total_found;
                if !state.tokens.is_latest(token) || !past_end {
                    return false;
                }
                let target = last_page(state.query.limit.get(), state.total_found);
                info!(
                    from = state.query.page,
                    to = target,
                    total_found = state.total_found,
                    "leads: page past the end; clamping"
                );
                state.query.page = target;
                state.selection.clear();
                true
            })
            .await;
        match clamp {
            Begin::Started(token, params) => self.complete_fetch(token, params).await,
            Begin::Declined => outcome,
            Begin::Cancelled => FetchOutcome::Cancelled,
        }
    }

    async fn complete_fetch(&self, token: RequestToken, params: LeadListParams) -> FetchOutcome {
        debug!(
            token = token.0,
            skip = params.skip,
            limit = params.limit,
            sort_by = %params.sort_by,
            "leads: fetching page"
        );
        let result = self.backend.list_leads(&params).await;

        if self.scope.is_cancelled() {
            debug!(token = token.0, "leads: view gone; dropping response");
            return FetchOutcome::Cancelled;
        }
        let mut state = self.state.lock().await;
        if !state.tokens.is_latest(token) {
            debug!(token = token.0, "leads: discarding superseded response");
            return FetchOutcome::Superseded(token);
        }
        state.loading = false;

        match result {
            Ok(page) => {
                let total_found = page.total_found;
                state.leads = page.data;
                state.total_found = total_found;
                let visible = state.visible_ids();
                state.selection.retain_visible(&visible);
                info!(
                    page = state.query.page,
                    rows = state.leads.len(),
                    total_found,
                    "leads: page applied"
                );
                FetchOutcome::Applied { token, total_found }
            }
            Err(err) => {
                warn!(%err, token = token.0, "leads: page fetch failed");
                if !err.is_unauthorized() {
                    self.notifier.error(format!("Failed to load leads: {err}"));
                }
                FetchOutcome::Failed(err)
            }
        }
    }

    async fn run_bulk(&self, action: BulkAction, lead_ids: Vec<LeadId>) -> BulkOutcome {
        if lead_ids.is_empty() {
            return BulkOutcome::NothingSelected;
        }
        if self.scope.is_cancelled() {
            return BulkOutcome::Cancelled;
        }
        {
            let mut state = self.state.lock().await;
            if state.bulk_in_flight {
                debug!(action = action.label(), "leads: bulk action already running");
                return BulkOutcome::Busy;
            }
            state.bulk_in_flight = true;
        }

        let affected = lead_ids.len();
        info!(action = action.label(), affected, "leads: bulk action");
        let result = match action {
            BulkAction::Status(status) => self.backend.bulk_update_status(&lead_ids, status).await,
            BulkAction::Delete => self.backend.bulk_delete(&lead_ids).await,
        };
        self.state.lock().await.bulk_in_flight = false;
        if self.scope.is_cancelled() {
            return BulkOutcome::Cancelled;
        }

        match result {
            Ok(_) => {
                self.notifier.success(action.success_message(affected));
                let refresh = self.refetch(|state| state.selection.clear()).await;
                BulkOutcome::Completed { affected, refresh }
            }
            Err(err) => {
                warn!(%err, action = action.label(), affected, "leads: bulk action failed");
                if !err.is_unauthorized() {
                    self.notifier
                        .error(format!("Bulk {} failed: {err}", action.label()));
                }
                BulkOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/collection_tests.rs"]
mod tests;
