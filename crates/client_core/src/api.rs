//! REST client for the CRM backend, including the bearer-token interceptor.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{LeadId, LeadStatus},
    protocol::{
        Acknowledgement, BulkDeleteRequest, BulkStatusRequest, Credentials, DashboardStats, Lead,
        LeadListParams, LeadPage, LeadProfile, LeadUpdate, ModelInsights, ProfileUpdate,
        RegisteredUser, SimulationResult, TokenResponse, UserProfile,
    },
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    credentials::CredentialProvider,
    error::{ClientError, ClientResult},
    LeadCollectionBackend, LeadRecordBackend, SimulationBackend,
};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { username: String },
    SignedOut,
    /// The backend rejected the stored credential; the user must sign in again.
    Expired,
}

pub struct ApiClient {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    session_events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> ClientResult<Self> {
        Self::with_http(Client::new(), base_url, credentials)
    }

    pub fn with_http(
        http: Client,
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ClientResult<Self> {
        let (session_events, _) = broadcast::channel(16);
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            credentials,
            session_events,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    pub fn is_signed_in(&self) -> bool {
        self.credentials.token().is_some()
    }

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<()> {
        let url = self.endpoint("login")?;
        let response = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), username, "auth: sign-in rejected");
            return Err(ClientError::rejected(status.as_u16(), &body));
        }
        let token: TokenResponse = decode(response).await?;
        self.credentials.store(&token.access_token)?;
        info!(username, "auth: signed in");
        let _ = self.session_events.send(SessionEvent::SignedIn {
            username: username.to_string(),
        });
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> ClientResult<RegisteredUser> {
        let body = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.send_json(self.request(Method::POST, "register")?.json(&body))
            .await
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.credentials.clear()?;
        let _ = self.session_events.send(SessionEvent::SignedOut);
        Ok(())
    }

    pub async fn dashboard_stats(&self) -> ClientResult<DashboardStats> {
        self.send_json(self.request(Method::GET, "dashboard/stats")?)
            .await
    }

    pub async fn user_profile(&self) -> ClientResult<UserProfile> {
        self.send_json(self.request(Method::GET, "user/profile")?)
            .await
    }

    /// Saves the edited fields, then re-reads the profile so derived stats are fresh.
    pub async fn update_user_profile(&self, update: &ProfileUpdate) -> ClientResult<UserProfile> {
        if update.is_empty() {
            return Err(ClientError::InvalidInput("no profile fields to update".into()));
        }
        self.send(self.request(Method::PUT, "user/profile")?.json(update))
            .await?;
        info!("profile: updated");
        self.user_profile().await
    }

    pub async fn model_insights(&self) -> ClientResult<ModelInsights> {
        self.send_json(self.request(Method::GET, "ai/insights")?)
            .await
    }

    /// Removes every lead in the database.
    pub async fn clear_leads(&self) -> ClientResult<Acknowledgement> {
        let ack = self
            .send_json(self.request(Method::DELETE, "leads/all")?)
            .await?;
        warn!("leads: database cleared");
        Ok(ack)
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidInput(format!("invalid endpoint '{path}': {e}")))
    }

    fn request(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "api: request");
        let builder = self.http.request(method, url);
        Ok(match self.credentials.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.expire_session();
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let url = response.url().clone();
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %url, "api: request rejected");
            return Err(ClientError::rejected(status.as_u16(), &body));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = self.send(builder).await?;
        decode(response).await
    }

    fn expire_session(&self) {
        if let Err(err) = self.credentials.clear() {
            warn!(%err, "auth: failed to clear rejected credentials");
        }
        warn!("auth: credentials rejected; session expired");
        let _ = self.session_events.send(SessionEvent::Expired);
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

fn normalize_base_url(raw: &str) -> ClientResult<Url> {
    let raw = raw.trim();
    let mut url = Url::parse(raw)
        .map_err(|e| ClientError::InvalidInput(format!("invalid api url '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidInput(format!(
            "api url '{raw}' must start with http:// or https://"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl LeadCollectionBackend for ApiClient {
    async fn list_leads(&self, params: &LeadListParams) -> ClientResult<LeadPage> {
        self.send_json(self.request(Method::GET, "leads")?.query(params))
            .await
    }

    async fn bulk_update_status(
        &self,
        lead_ids: &[LeadId],
        status: LeadStatus,
    ) -> ClientResult<Acknowledgement> {
        let body = BulkStatusRequest {
            lead_ids: lead_ids.to_vec(),
            status,
        };
        self.send_json(self.request(Method::POST, "leads/bulk/status")?.json(&body))
            .await
    }

    async fn bulk_delete(&self, lead_ids: &[LeadId]) -> ClientResult<Acknowledgement> {
        let body = BulkDeleteRequest {
            lead_ids: lead_ids.to_vec(),
        };
        self.send_json(self.request(Method::POST, "leads/bulk/delete")?.json(&body))
            .await
    }

    async fn upload_csv(
        &self,
        filename: &str,
        contents: Vec<u8>,
    ) -> ClientResult<Acknowledgement> {
        let part = multipart::Part::bytes(contents)
            .file_name(filename.to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new().part("file", part);
        self.send_json(self.request(Method::POST, "upload-csv")?.multipart(form))
            .await
    }
}

#[async_trait]
impl LeadRecordBackend for ApiClient {
    async fn get_lead(&self, lead_id: LeadId) -> ClientResult<Lead> {
        self.send_json(self.request(Method::GET, &format!("leads/{lead_id}"))?)
            .await
    }

    async fn update_lead(
        &self,
        lead_id: LeadId,
        update: &LeadUpdate,
    ) -> ClientResult<Acknowledgement> {
        self.send_json(
            self.request(Method::PUT, &format!("leads/{lead_id}/notes"))?
                .json(update),
        )
        .await
    }
}

#[async_trait]
impl SimulationBackend for ApiClient {
    async fn simulate(&self, profile: &LeadProfile) -> ClientResult<SimulationResult> {
        self.send_json(self.request(Method::POST, "ai/simulate")?.json(profile))
            .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
