use async_trait::async_trait;
use shared::{
    domain::{LeadId, LeadStatus},
    protocol::{
        Acknowledgement, Lead, LeadListParams, LeadPage, LeadProfile, LeadUpdate,
        SimulationResult,
    },
};

pub mod api;
pub mod collection;
pub mod credentials;
pub mod error;
pub mod lead_detail;
pub mod notice;
pub mod query;
pub mod scope;
pub mod selection;
pub mod simulator;

pub use api::{ApiClient, SessionEvent};
pub use collection::{
    BulkOutcome, CollectionSnapshot, FetchOutcome, LeadCollectionController, PageMove,
    PendingBulkDelete, UploadOutcome,
};
pub use credentials::{CredentialProvider, FileCredentials, MemoryCredentials};
pub use error::{ClientError, ClientResult};
pub use lead_detail::{DetailSnapshot, LeadDetailController, LoadOutcome, SaveOutcome};
pub use notice::{Notice, NoticeKind, NoticeTray, Notifier};
pub use query::{LeadFilter, LeadFilters, PageWindow, QueryState};
pub use scope::{RequestToken, ViewScope};
pub use selection::Selection;
pub use simulator::{Debounced, Debouncer, SimulatorController, SimulatorSnapshot};

/// Backend operations behind the leads table.
#[async_trait]
pub trait LeadCollectionBackend: Send + Sync {
    async fn list_leads(&self, params: &LeadListParams) -> ClientResult<LeadPage>;
    async fn bulk_update_status(
        &self,
        lead_ids: &[LeadId],
        status: LeadStatus,
    ) -> ClientResult<Acknowledgement>;
    async fn bulk_delete(&self, lead_ids: &[LeadId]) -> ClientResult<Acknowledgement>;
    async fn upload_csv(&self, filename: &str, contents: Vec<u8>)
        -> ClientResult<Acknowledgement>;
}

/// Backend operations behind the single-lead view.
#[async_trait]
pub trait LeadRecordBackend: Send + Sync {
    async fn get_lead(&self, lead_id: LeadId) -> ClientResult<Lead>;
    async fn update_lead(
        &self,
        lead_id: LeadId,
        update: &LeadUpdate,
    ) -> ClientResult<Acknowledgement>;
}

#[async_trait]
pub trait SimulationBackend: Send + Sync {
    async fn simulate(&self, profile: &LeadProfile) -> ClientResult<SimulationResult>;
}
