use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{LeadId, LeadStatus, PredictionLabel, SortKey, UserId};

/// Customer attributes the scoring model consumes. Leads carry them as
/// ingested from CSV; the simulator posts them as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadProfile {
    pub age: u32,
    pub job: String,
    pub marital: String,
    pub education: String,
    #[serde(rename = "default")]
    pub credit_default: String,
    pub housing: String,
    pub loan: String,
    pub contact: String,
    pub month: String,
    pub day_of_week: String,
    pub campaign: u32,
    pub pdays: u32,
    pub previous: u32,
    pub poutcome: String,
    pub emp_var_rate: f64,
    pub cons_price_idx: f64,
    pub cons_conf_idx: f64,
    pub euribor3m: f64,
    pub nr_employed: f64,
}

impl Default for LeadProfile {
    fn default() -> Self {
        Self {
            age: 30,
            job: "admin.".into(),
            marital: "married".into(),
            education: "university.degree".into(),
            credit_default: "no".into(),
            housing: "no".into(),
            loan: "no".into(),
            contact: "cellular".into(),
            month: "may".into(),
            day_of_week: "mon".into(),
            campaign: 1,
            pdays: 999,
            previous: 0,
            poutcome: "nonexistent".into(),
            emp_var_rate: 1.1,
            cons_price_idx: 93.994,
            cons_conf_idx: -36.4,
            euribor3m: 4.857,
            nr_employed: 5191.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapContribution {
    pub feature: String,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(default)]
    pub shap_values: Vec<ShapContribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Explanation {
    /// Contributions ordered by absolute impact, strongest first.
    pub fn strongest(&self, n: usize) -> Vec<&ShapContribution> {
        let mut ranked = self.shap_values.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
        ranked.truncate(n);
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    #[serde(default)]
    pub status: LeadStatus,
    pub prediction_score: f64,
    pub prediction_label: PredictionLabel,
    #[serde(flatten)]
    pub profile: LeadProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl Lead {
    pub fn score_percent(&self) -> u32 {
        (self.prediction_score.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    pub fn was_updated(&self) -> bool {
        matches!((self.created_at, self.updated_at), (Some(created), Some(updated)) if updated > created)
    }
}

/// One page of the leads collection plus the size of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeadPage {
    pub data: Vec<Lead>,
    pub total_found: u64,
}

/// Query string of `GET /leads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadListParams {
    pub skip: u64,
    pub limit: u64,
    pub sort_by: SortKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
}

/// Partial single-lead update; absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeadUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStatusRequest {
    pub lead_ids: Vec<LeadId>,
    pub status: LeadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub lead_ids: Vec<LeadId>,
}

/// Generic `{status, message}` acknowledgement used by the mutation endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub score: f64,
    pub label: PredictionLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_leads: u64,
    pub high_potential: u64,
    pub medium_potential: u64,
    pub low_potential: u64,
    pub conversion_rate_estimate: f64,
    pub age_dist: Vec<Bucket>,
    pub score_dist: Vec<Bucket>,
    pub marital_dist: Vec<Bucket>,
    pub edu_dist: Vec<Bucket>,
    pub job_dist: Vec<Bucket>,
    pub econ_dist: Vec<Bucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileStats {
    pub leads_processed: u64,
    pub conversion_rate: f64,
    pub current_progress: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub lead_id: LeadId,
    pub time: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub email: String,
    pub id_emp: String,
    #[serde(default)]
    pub monthly_target: u64,
    #[serde(default)]
    pub joined_date: String,
    #[serde(default)]
    pub active_days: u64,
    #[serde(default)]
    pub stats: ProfileStats,
    #[serde(default)]
    pub recent_activities: Vec<ActivityEntry>,
}

/// Fields of `PUT /user/profile`; absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_emp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_target: Option<u64>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ProfileUpdate::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub impact: f64,
}

/// Global model summary behind the AI lab view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInsights {
    pub model_name: String,
    pub last_trained: String,
    pub feature_importance: Vec<FeatureImportance>,
}

impl ModelInsights {
    /// Features ordered by descending impact.
    pub fn ranked(&self) -> Vec<&FeatureImportance> {
        let mut ranked: Vec<_> = self.feature_importance.iter().collect();
        ranked.sort_by(|a, b| b.impact.total_cmp(&a.impact));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_decodes_backend_row_with_flattened_profile() {
        let body = r#"{
            "id": 17,
            "age": 41,
            "job": "blue-collar",
            "marital": "single",
            "education": "basic.9y",
            "default": "unknown",
            "euribor3m": 1.2,
            "prediction_score": 0.734,
            "prediction_label": "High Potential",
            "status": "In Progress",
            "notes": null,
            "created_at": "2024-03-01T08:00:00",
            "updated_at": "2024-03-02T09:30:00.125"
        }"#;
        let lead: Lead = serde_json::from_str(body).expect("decode lead");
        assert_eq!(lead.id, LeadId(17));
        assert_eq!(lead.status, LeadStatus::InProgress);
        assert_eq!(lead.profile.job, "blue-collar");
        assert_eq!(lead.profile.credit_default, "unknown");
        assert_eq!(lead.profile.pdays, 999);
        assert_eq!(lead.score_percent(), 73);
        assert!(lead.was_updated());
        assert!(lead.explanation.is_none());
    }

    #[test]
    fn missing_status_defaults_to_new() {
        let body = r#"{"id":1,"prediction_score":0.1,"prediction_label":"Low Potential"}"#;
        let lead: Lead = serde_json::from_str(body).expect("decode lead");
        assert_eq!(lead.status, LeadStatus::New);
    }

    #[test]
    fn list_params_omit_unset_filters() {
        let params = LeadListParams {
            skip: 20,
            limit: 10,
            sort_by: SortKey::ScoreHigh,
            job: None,
            min_score: Some(0.5),
            min_age: None,
            max_age: None,
            status: Some(LeadStatus::Interested),
        };
        let value = serde_json::to_value(&params).expect("encode");
        assert_eq!(
            value,
            serde_json::json!({
                "skip": 20,
                "limit": 10,
                "sort_by": "score_high",
                "min_score": 0.5,
                "status": "Interested"
            })
        );
    }

    #[test]
    fn strongest_contributions_rank_by_magnitude() {
        let explanation = Explanation {
            shap_values: vec![
                ShapContribution { feature: "age".into(), impact: 0.05 },
                ShapContribution { feature: "euribor3m".into(), impact: -0.4 },
                ShapContribution { feature: "pdays".into(), impact: 0.2 },
            ],
            recommendation: None,
        };
        let top = explanation
            .strongest(2)
            .into_iter()
            .map(|c| c.feature.as_str())
            .collect::<Vec<_>>();
        assert_eq!(top, vec!["euribor3m", "pdays"]);
    }
}
