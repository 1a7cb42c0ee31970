use std::sync::Arc;

use chrono::Utc;
use rolemine_core::{
    ConsolidatedCluster, Result, RiskLevel, RoleMineError, RoleOption, RoleOptionSet,
    RoleStyle, RoleSuggestion,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::prompt::PromptBuilder;
use crate::provider::{CompletionParams, LlmProvider};

/// Expected shape of the model's JSON reply.
#[derive(Debug, Deserialize)]
struct SuggestionPayload {
    role_name: Option<String>,
    description: Option<String>,
    rationale: Option<String>,
    risk_level: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Turns a consolidated cluster into a validated [`RoleSuggestion`]:
/// prompt rendering, one provider call, then schema validation of the
/// reply. Parse failures are contract violations and are never retried.
pub struct RoleSuggestionClient {
    provider: Arc<dyn LlmProvider>,
    prompt: PromptBuilder,
    params: CompletionParams,
}

impl RoleSuggestionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, prompt: PromptBuilder, params: CompletionParams) -> Self {
        Self {
            provider,
            prompt,
            params,
        }
    }

    pub async fn generate(&self, cluster: &ConsolidatedCluster) -> Result<RoleSuggestion> {
        let messages = self.prompt.build(cluster);
        debug!(
            cluster_id = %cluster.cluster_id,
            provider = self.provider.provider_name(),
            "requesting role suggestion"
        );
        let response = self.provider.complete(&messages, &self.params).await?;
        parse_suggestion(&cluster.cluster_id, &response.content, &response.model)
    }

    /// One provider call producing the three-option set for a cluster.
    pub async fn generate_options(&self, cluster: &ConsolidatedCluster) -> Result<RoleOptionSet> {
        let messages = self.prompt.build_options(cluster);
        debug!(
            cluster_id = %cluster.cluster_id,
            provider = self.provider.provider_name(),
            "requesting role option set"
        );
        let response = self.provider.complete(&messages, &self.params).await?;
        parse_option_set(cluster, &response.content, &response.model)
    }
}

/// Validate the model's raw reply against the suggestion schema.
pub fn parse_suggestion(cluster_id: &str, raw: &str, model: &str) -> Result<RoleSuggestion> {
    let payload: SuggestionPayload = parse_json_reply(cluster_id, raw)?;

    let role_name = required_field(cluster_id, "role_name", payload.role_name)?;
    let description = required_field(cluster_id, "description", payload.description)?;
    let rationale = required_field(cluster_id, "rationale", payload.rationale)?;

    let risk_raw = payload.risk_level.unwrap_or_default();
    let risk_level = RiskLevel::parse(&risk_raw).ok_or_else(|| {
        RoleMineError::ResponseParse(format!(
            "model reply for cluster '{}' has unknown risk_level '{}'",
            cluster_id, risk_raw
        ))
    })?;

    let confidence = payload.confidence.filter(|c| (0.0..=1.0).contains(c));

    Ok(RoleSuggestion {
        cluster_id: cluster_id.to_string(),
        role_name,
        description,
        rationale,
        risk_level,
        confidence,
        model: model.to_string(),
        generated_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct OptionPayload {
    option_number: Option<u8>,
    role_name: Option<String>,
    style: Option<String>,
    description: Option<String>,
    rationale: Option<String>,
}

/// Expected shape of the model's multi-option JSON reply.
#[derive(Debug, Deserialize)]
struct OptionSetPayload {
    #[serde(default)]
    role_options: Vec<OptionPayload>,
    recommended_option: Option<u8>,
    recommendation_reason: Option<String>,
    risk_level: Option<String>,
}

/// Validate the model's multi-option reply: exactly three options with
/// distinct numbers in 1..=3, known styles, and a recommendation that
/// names one of them.
pub fn parse_option_set(
    cluster: &ConsolidatedCluster,
    raw: &str,
    model: &str,
) -> Result<RoleOptionSet> {
    let cluster_id = cluster.cluster_id.as_str();
    let payload: OptionSetPayload = parse_json_reply(cluster_id, raw)?;

    if payload.role_options.len() != 3 {
        return Err(RoleMineError::ResponseParse(format!(
            "model reply for cluster '{}' has {} role options, expected 3",
            cluster_id,
            payload.role_options.len()
        )));
    }

    let mut options = Vec::with_capacity(3);
    let mut seen_numbers = [false; 3];
    for opt in payload.role_options {
        let number = match opt.option_number {
            Some(n @ 1..=3) => n,
            _ => {
                return Err(RoleMineError::ResponseParse(format!(
                    "model reply for cluster '{}' has an option_number outside 1..=3",
                    cluster_id
                )))
            }
        };
        if seen_numbers[number as usize - 1] {
            return Err(RoleMineError::ResponseParse(format!(
                "model reply for cluster '{}' repeats option_number {}",
                cluster_id, number
            )));
        }
        seen_numbers[number as usize - 1] = true;

        let style_raw = opt.style.unwrap_or_default();
        let style = RoleStyle::parse(&style_raw).ok_or_else(|| {
            RoleMineError::ResponseParse(format!(
                "model reply for cluster '{}' has unknown style '{}'",
                cluster_id, style_raw
            ))
        })?;

        options.push(RoleOption {
            option_number: number,
            role_name: required_field(cluster_id, "role_name", opt.role_name)?,
            style,
            description: required_field(cluster_id, "description", opt.description)?,
            rationale: required_field(cluster_id, "rationale", opt.rationale)?,
        });
    }
    options.sort_by_key(|o| o.option_number);

    let recommended_option = match payload.recommended_option {
        Some(n @ 1..=3) => n,
        _ => {
            return Err(RoleMineError::ResponseParse(format!(
                "model reply for cluster '{}' has no valid recommended_option",
                cluster_id
            )))
        }
    };

    let risk_raw = payload.risk_level.unwrap_or_default();
    let risk_level = RiskLevel::parse(&risk_raw).ok_or_else(|| {
        RoleMineError::ResponseParse(format!(
            "model reply for cluster '{}' has unknown risk_level '{}'",
            cluster_id, risk_raw
        ))
    })?;

    Ok(RoleOptionSet {
        cluster_id: cluster_id.to_string(),
        options,
        recommended_option,
        recommendation_reason: payload.recommendation_reason.unwrap_or_default(),
        risk_level,
        entitlement_count: cluster.entitlements.len(),
        user_count: cluster.user_summary.total_users,
        model: model.to_string(),
        generated_at: Utc::now(),
        selected_option: None,
        feedback: None,
    })
}

/// Strict JSON first; as a fallback the outermost brace window is
/// extracted, since some models wrap JSON in prose or code fences.
fn parse_json_reply<T: DeserializeOwned>(cluster_id: &str, raw: &str) -> Result<T> {
    match serde_json::from_str(raw) {
        Ok(p) => Ok(p),
        Err(_) => {
            let window = brace_window(raw).ok_or_else(|| {
                RoleMineError::ResponseParse(format!(
                    "model reply for cluster '{}' contains no JSON object",
                    cluster_id
                ))
            })?;
            serde_json::from_str(window).map_err(|e| {
                RoleMineError::ResponseParse(format!(
                    "model reply for cluster '{}' is not valid JSON: {}",
                    cluster_id, e
                ))
            })
        }
    }
}

fn required_field(cluster_id: &str, name: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RoleMineError::ResponseParse(format!(
            "model reply for cluster '{}' is missing required field '{}'",
            cluster_id, name
        ))),
    }
}

fn brace_window(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
