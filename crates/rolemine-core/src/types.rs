use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Risk classification attached to entitlements and generated roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            "CRITICAL" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Immutable entitlement reference data, loaded once per upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_category: Option<RiskLevel>,
}

/// One pre-computed cluster row from the cluster-summary upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: String,
    /// Entitlement IDs in their declared order.
    pub entitlement_ids: Vec<String>,
    pub member_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One user row from the user-metadata upload. Many users per cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMetadata {
    pub user_id: String,
    pub cluster_id: String,
    pub job_title: String,
    pub department: String,
}

/// Aggregated statistics over the users assigned to a cluster.
///
/// Distributions are `BTreeMap`s and the top lists are ordered by count
/// descending then name ascending, so identical tables always yield an
/// identical summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSummary {
    pub total_users: usize,
    pub top_job_titles: Vec<String>,
    pub top_departments: Vec<String>,
    pub job_title_distribution: BTreeMap<String, usize>,
    pub department_distribution: BTreeMap<String, usize>,
}

/// Derived per-cluster view joining the three tables. Built on demand,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedCluster {
    pub cluster_id: String,
    pub member_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub entitlements: Vec<EntitlementMetadata>,
    pub user_summary: UserSummary,
}

/// Role proposal produced by the model for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSuggestion {
    pub cluster_id: String,
    pub role_name: String,
    pub description: String,
    pub rationale: String,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Reviewer verdict for one suggestion. Overwritten on each review call;
/// no history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewState {
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self {
            status: ReviewStatus::Pending,
            feedback: None,
            reviewed_at: None,
        }
    }
}

/// Role-store value: a suggestion and its current review state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    pub suggestion: RoleSuggestion,
    pub review: ReviewState,
}

/// Naming style of one role option in the multi-option flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStyle {
    BusinessFocused,
    TechnicalFocused,
    HierarchicalFocused,
}

impl RoleStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "business_focused" => Some(RoleStyle::BusinessFocused),
            "technical_focused" => Some(RoleStyle::TechnicalFocused),
            "hierarchical_focused" => Some(RoleStyle::HierarchicalFocused),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleStyle::BusinessFocused => "business_focused",
            RoleStyle::TechnicalFocused => "technical_focused",
            RoleStyle::HierarchicalFocused => "hierarchical_focused",
        }
    }
}

impl fmt::Display for RoleStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the three differently-styled role proposals for a cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleOption {
    pub option_number: u8,
    pub role_name: String,
    pub style: RoleStyle,
    pub description: String,
    pub rationale: String,
}

/// The full multi-option proposal for one cluster: exactly three
/// options, the model's recommendation, and the reviewer's selection
/// once one has been made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleOptionSet {
    pub cluster_id: String,
    pub options: Vec<RoleOption>,
    pub recommended_option: u8,
    pub recommendation_reason: String,
    pub risk_level: RiskLevel,
    pub entitlement_count: usize,
    pub user_count: usize,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}
