//! Single-lead view: score explanation, status change and notes.

use std::sync::Arc;

use shared::{
    domain::{LeadId, LeadStatus},
    protocol::{Lead, LeadUpdate},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    notice::Notifier,
    scope::{RequestToken, TokenSequence, ViewScope},
    LeadRecordBackend,
};

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded,
    Superseded(RequestToken),
    Cancelled,
    Failed(ClientError),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded)
    }
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved { refresh: LoadOutcome },
    /// Nothing to send: the draft matches what is stored, or no lead is loaded.
    Unchanged,
    Busy,
    Cancelled,
    Failed(ClientError),
}

#[derive(Debug, Clone)]
pub struct DetailSnapshot {
    pub lead_id: LeadId,
    pub lead: Option<Lead>,
    pub draft_status: LeadStatus,
    pub draft_note: String,
    pub loading: bool,
    pub saving_status: bool,
    pub saving_note: bool,
}

impl DetailSnapshot {
    /// Whether the "update status" action is enabled.
    pub fn status_changed(&self) -> bool {
        self.lead
            .as_ref()
            .is_some_and(|lead| lead.status != self.draft_status)
    }
}

#[derive(Debug, Default)]
struct DetailState {
    lead: Option<Lead>,
    draft_status: LeadStatus,
    draft_note: String,
    loading: bool,
    saving_status: bool,
    saving_note: bool,
    tokens: TokenSequence,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Status,
    Note,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::Note => "notes",
        }
    }
}

pub struct LeadDetailController {
    backend: Arc<dyn LeadRecordBackend>,
    notifier: Notifier,
    scope: ViewScope,
    lead_id: LeadId,
    state: Mutex<DetailState>,
}

impl LeadDetailController {
    pub fn new(
        backend: Arc<dyn LeadRecordBackend>,
        notifier: Notifier,
        lead_id: LeadId,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            notifier,
            scope: ViewScope::new(),
            lead_id,
            state: Mutex::new(DetailState::default()),
        })
    }

    pub fn lead_id(&self) -> LeadId {
        self.lead_id
    }

    pub async fn load(&self) -> LoadOutcome {
        if self.scope.is_cancelled() {
            return LoadOutcome::Cancelled;
        }
        let token = {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.tokens.issue()
        };

        debug!(lead_id = %self.lead_id, token = token.0, "lead: loading");
        let result = self.backend.get_lead(self.lead_id).await;

        if self.scope.is_cancelled() {
            return LoadOutcome::Cancelled;
        }
        let mut state = self.state.lock().await;
        if !state.tokens.is_latest(token) {
            debug!(lead_id = %self.lead_id, token = token.0, "lead: discarding superseded response");
            return LoadOutcome::Superseded(token);
        }
        state.loading = false;
        match result {
            Ok(lead) => {
                state.draft_status = lead.status;
                state.draft_note = lead.notes.clone().unwrap_or_default();
                info!(lead_id = %lead.id, status = %lead.status, "lead: loaded");
                state.lead = Some(lead);
                LoadOutcome::Loaded
            }
            Err(err) => {
                warn!(%err, lead_id = %self.lead_id, "lead: load failed");
                if !err.is_unauthorized() {
                    self.notifier.error(format!("Failed to load lead: {err}"));
                }
                LoadOutcome::Failed(err)
            }
        }
    }

    pub async fn set_draft_status(&self, status: LeadStatus) {
        self.state.lock().await.draft_status = status;
    }

    pub async fn set_draft_note(&self, note: impl Into<String>) {
        self.state.lock().await.draft_note = note.into();
    }

    /// Sends the drafted status; a draft equal to the stored status sends nothing.
    pub async fn update_status(&self) -> SaveOutcome {
        let update = {
            let state = self.state.lock().await;
            match &state.lead {
                Some(lead) if lead.status != state.draft_status => LeadUpdate {
                    status: Some(state.draft_status),
                    notes: None,
                },
                _ => return SaveOutcome::Unchanged,
            }
        };
        self.save(Field::Status, update).await
    }

    pub async fn save_note(&self) -> SaveOutcome {
        let update = {
            let state = self.state.lock().await;
            if state.lead.is_none() {
                return SaveOutcome::Unchanged;
            }
            LeadUpdate {
                status: None,
                notes: Some(state.draft_note.clone()),
            }
        };
        self.save(Field::Note, update).await
    }

    pub async fn snapshot(&self) -> DetailSnapshot {
        let state = self.state.lock().await;
        DetailSnapshot {
            lead_id: self.lead_id,
            lead: state.lead.clone(),
            draft_status: state.draft_status,
            draft_note: state.draft_note.clone(),
            loading: state.loading,
            saving_status: state.saving_status,
            saving_note: state.saving_note,
        }
    }

    pub fn unmount(&self) {
        self.scope.cancel();
    }

    async fn save(&self, field: Field, update: LeadUpdate) -> SaveOutcome {
        if self.scope.is_cancelled() {
            return SaveOutcome::Cancelled;
        }
        {
            let mut state = self.state.lock().await;
            let flag = saving_flag(&mut state, field);
            if *flag {
                return SaveOutcome::Busy;
            }
            *flag = true;
        }

        info!(lead_id = %self.lead_id, field = field.label(), "lead: saving");
        let result = self.backend.update_lead(self.lead_id, &update).await;
        *saving_flag(&mut *self.state.lock().await, field) = false;
        if self.scope.is_cancelled() {
            return SaveOutcome::Cancelled;
        }

        match result {
            Ok(_) => {
                let message = match field {
                    Field::Status => "Status updated",
                    Field::Note => "Notes saved",
                };
                self.notifier.success(message);
                SaveOutcome::Saved {
                    refresh: self.load().await,
                }
            }
            Err(err) => {
                warn!(%err, lead_id = %self.lead_id, field = field.label(), "lead: save failed");
                if !err.is_unauthorized() {
                    self.notifier
                        .error(format!("Failed to save {}: {err}", field.label()));
                }
                SaveOutcome::Failed(err)
            }
        }
    }
}

fn saving_flag(state: &mut DetailState, field: Field) -> &mut bool {
    match field {
        Field::Status => &mut state.saving_status,
        Field::Note => &mut state.saving_note,
    }
}

#[cfg(test)]
#[path = "tests/lead_detail_tests.rs"]
mod tests;
