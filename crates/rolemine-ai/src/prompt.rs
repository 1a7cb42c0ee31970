use rolemine_core::ConsolidatedCluster;

use crate::provider::{ChatMessage, MessageRole};

pub const SYSTEM_PROMPT: &str = "You are an expert security analyst specializing in \
Role-Based Access Control (RBAC) design. Always respond with valid JSON.";

/// Deterministic prompt rendering for a consolidated cluster. No side
/// effects; identical input always yields identical messages.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    /// Entitlements listed verbatim before truncation. Anything beyond
    /// the cap is folded into an "and N more" marker to respect model
    /// context limits.
    max_entitlements: usize,
}

impl PromptBuilder {
    pub fn new(max_entitlements: usize) -> Self {
        Self {
            max_entitlements: max_entitlements.max(1),
        }
    }

    pub fn build(&self, cluster: &ConsolidatedCluster) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: MessageRole::System,
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: MessageRole::User,
                content: self.user_prompt(cluster),
            },
        ]
    }

    /// Messages for the multi-option flow: one call asking for three
    /// differently-styled role names plus a recommendation.
    pub fn build_options(&self, cluster: &ConsolidatedCluster) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: MessageRole::System,
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: MessageRole::User,
                content: self.options_prompt(cluster),
            },
        ]
    }

    fn options_prompt(&self, cluster: &ConsolidatedCluster) -> String {
        let (entitlements_text, job_titles, departments) = self.context_block(cluster);
        format!(
            r#"You are analyzing a cluster of users with similar access patterns to create RBAC roles.

CLUSTER INFORMATION:
- Cluster ID: {cluster_id}
- Total Users: {total_users}
- Common Job Titles: {job_titles}
- Primary Departments: {departments}

ENTITLEMENTS IN THIS CLUSTER:
{entitlements_text}

Generate THREE different role options for this cluster, each with a different naming approach:

1. Business-focused: the name emphasizes business function and responsibilities (e.g. "Financial Report Analyst").
2. Technical-focused: the name emphasizes the systems and data being accessed (e.g. "ERP System Read User").
3. Hierarchical-focused: the name emphasizes seniority and organizational level (e.g. "Senior Finance Specialist").

For EACH option provide: role_name, description (2-3 sentences), rationale (2-3 sentences), and style (business_focused, technical_focused or hierarchical_focused).

Also provide: recommended_option (1, 2 or 3), recommendation_reason, and risk_level (LOW, MEDIUM, HIGH or CRITICAL).

Respond in JSON format:
{{
  "role_options": [
    {{"option_number": 1, "role_name": "...", "style": "business_focused", "description": "...", "rationale": "..."}},
    {{"option_number": 2, "role_name": "...", "style": "technical_focused", "description": "...", "rationale": "..."}},
    {{"option_number": 3, "role_name": "...", "style": "hierarchical_focused", "description": "...", "rationale": "..."}}
  ],
  "recommended_option": 1,
  "recommendation_reason": "...",
  "risk_level": "..."
}}

Make each option distinctly different while accurately representing the same access, and follow the principle of least privilege."#,
            cluster_id = cluster.cluster_id,
            total_users = cluster.user_summary.total_users,
        )
    }

    /// Shared prompt context: truncated entitlement list, job-title and
    /// department lines.
    fn context_block(&self, cluster: &ConsolidatedCluster) -> (String, String, String) {
        let shown = cluster.entitlements.len().min(self.max_entitlements);
        let mut entitlements_text = cluster.entitlements[..shown]
            .iter()
            .map(|e| {
                let risk = e
                    .risk_category
                    .map(|r| format!(" [{}]", r))
                    .unwrap_or_default();
                format!("   - {}: {} - {}{}", e.id, e.name, e.description, risk)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let omitted = cluster.entitlements.len() - shown;
        if omitted > 0 {
            entitlements_text.push_str(&format!("\n   ... and {} more entitlements", omitted));
        }

        let job_titles = if cluster.user_summary.top_job_titles.is_empty() {
            "Not specified".to_string()
        } else {
            cluster.user_summary.top_job_titles.join(", ")
        };
        let departments = if cluster.user_summary.top_departments.is_empty() {
            "Not specified".to_string()
        } else {
            cluster.user_summary.top_departments.join(", ")
        };

        (entitlements_text, job_titles, departments)
    }

    fn user_prompt(&self, cluster: &ConsolidatedCluster) -> String {
        let (entitlements_text, job_titles, departments) = self.context_block(cluster);
        format!(
            r#"You are analyzing a cluster of users with similar access patterns to create an RBAC role.

CLUSTER INFORMATION:
- Cluster ID: {cluster_id}
- Total Users: {total_users}
- Common Job Titles: {job_titles}
- Primary Departments: {departments}

ENTITLEMENTS IN THIS CLUSTER:
{entitlements_text}

Based on this information, generate a role definition with the following:

1. Role Name: a concise, professional role name (3-5 words) reflecting the primary function and level of access. Avoid generic names like "User Role" or "Access Group".

2. Description: 2-3 sentences explaining the primary purpose of this role, its key responsibilities and the typical user profile.

3. Rationale: 2-3 sentences of business and security justification, addressing the principle of least privilege and any compliance considerations.

4. Risk Level: LOW, MEDIUM, HIGH or CRITICAL, based on the sensitivity of data accessed, potential for modification, scope of access and regulatory implications.

Respond in JSON format with keys: role_name, description, rationale, risk_level, confidence (0.0-1.0)."#,
            cluster_id = cluster.cluster_id,
            total_users = cluster.user_summary.total_users,
        )
    }
}
