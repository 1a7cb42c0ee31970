use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rolemine_ai::{BatchEntry, BatchReport};
use rolemine_core::{
    ReviewStatus, RiskLevel, RoleMineError, RoleOptionSet, RoleRecord, RoleStyle,
};
use rolemine_data::{export, loader, FileKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// Upload

#[derive(Deserialize)]
pub struct UploadRequest {
    pub file_type: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub content: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: Option<String>,
    pub file_type: String,
    pub rows_processed: usize,
    /// Clusters removed by this upload whose stored suggestions were
    /// dropped. Always 0 for non-cluster uploads.
    pub invalidated_suggestions: usize,
}

pub async fn upload_data(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    let kind = FileKind::parse(&request.file_type)?;

    // Parse fully before touching any table; a malformed upload leaves
    // existing data as-is.
    let (rows_processed, invalidated_suggestions) = match kind {
        FileKind::ClusterSummary => {
            let clusters = loader::parse_cluster_summary(&request.content)?;
            let rows = clusters.len();
            let removed = state.catalog.replace_clusters(clusters);
            let dropped =
                state.store.remove_many(&removed) + state.options.remove_many(&removed);
            (rows, dropped)
        }
        FileKind::UserMetadata => {
            let users = loader::parse_user_metadata(&request.content)?;
            let rows = users.len();
            state.catalog.replace_users(users);
            (rows, 0)
        }
        FileKind::EntitlementMetadata => {
            let entitlements = loader::parse_entitlement_metadata(&request.content)?;
            let rows = entitlements.len();
            state.catalog.replace_entitlements(entitlements);
            (rows, 0)
        }
    };

    info!(
        file_type = kind.as_str(),
        rows_processed, "processed data upload"
    );
    Ok(Json(UploadResponse {
        filename: request.filename,
        file_type: kind.as_str().to_string(),
        rows_processed,
        invalidated_suggestions,
    }))
}

// Clusters

#[derive(Serialize)]
pub struct ClusterOverview {
    pub cluster_id: String,
    pub entitlement_count: usize,
    pub user_count: usize,
    pub top_job_titles: Vec<String>,
    pub top_departments: Vec<String>,
    pub has_suggestion: bool,
}

fn overview(state: &AppState, view: rolemine_core::ConsolidatedCluster) -> ClusterOverview {
    ClusterOverview {
        has_suggestion: state.store.contains(&view.cluster_id),
        entitlement_count: view.entitlements.len(),
        user_count: view.user_summary.total_users,
        top_job_titles: view.user_summary.top_job_titles,
        top_departments: view.user_summary.top_departments,
        cluster_id: view.cluster_id,
    }
}

pub async fn list_clusters(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ClusterOverview>>> {
    // One snapshot under a single catalog read lock; a concurrent
    // re-upload can never 404 the listing mid-iteration.
    let clusters = state
        .catalog
        .consolidate_all()
        .into_iter()
        .map(|view| overview(&state, view))
        .collect();
    Ok(Json(clusters))
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> ApiResult<Json<ClusterOverview>> {
    let view = state.catalog.consolidate(&cluster_id)?;
    Ok(Json(overview(&state, view)))
}

// Role generation

#[derive(Deserialize)]
pub struct GenerateRoleRequest {
    pub cluster_id: String,
    #[serde(default)]
    pub force_regenerate: bool,
}

#[derive(Serialize)]
pub struct RoleResponse {
    pub cluster_id: String,
    pub role_name: String,
    pub description: String,
    pub rationale: String,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub status: ReviewStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl From<RoleRecord> for RoleResponse {
    fn from(record: RoleRecord) -> Self {
        Self {
            cluster_id: record.suggestion.cluster_id,
            role_name: record.suggestion.role_name,
            description: record.suggestion.description,
            rationale: record.suggestion.rationale,
            risk_level: record.suggestion.risk_level,
            confidence: record.suggestion.confidence,
            model: record.suggestion.model,
            generated_at: record.suggestion.generated_at,
            status: record.review.status,
            feedback: record.review.feedback,
        }
    }
}

pub async fn generate_role(
    State(state): State<AppState>,
    Json(request): Json<GenerateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let record = state
        .service
        .generate_single(&request.cluster_id, request.force_regenerate)
        .await?;
    Ok(Json(record.into()))
}

#[derive(Deserialize)]
pub struct BatchGenerateRequest {
    #[serde(default)]
    pub cluster_ids: Option<Vec<String>>,
    #[serde(default)]
    pub process_all: bool,
    #[serde(default)]
    pub concurrent_limit: Option<usize>,
    #[serde(default)]
    pub force_regenerate: bool,
}

#[derive(Serialize)]
pub struct BatchGenerateResponse {
    pub total: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub processing_time_ms: u64,
    pub results: Vec<BatchEntry>,
}

impl BatchGenerateResponse {
    fn from_report(report: BatchReport, elapsed_ms: u64) -> Self {
        Self {
            total: report.total,
            generated: report.generated,
            skipped: report.skipped,
            failed: report.failed,
            processing_time_ms: elapsed_ms,
            results: report.entries,
        }
    }
}

pub async fn generate_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchGenerateRequest>,
) -> ApiResult<Json<BatchGenerateResponse>> {
    let cluster_ids = if request.process_all {
        state.catalog.cluster_ids()
    } else {
        match request.cluster_ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => {
                return Err(ApiError::BadRequest(
                    "provide cluster_ids or set process_all=true".to_string(),
                ))
            }
        }
    };

    let concurrency = request
        .concurrent_limit
        .unwrap_or(state.settings.generation.max_concurrent);
    if !(1..=20).contains(&concurrency) {
        return Err(ApiError::BadRequest(
            "concurrent_limit must be between 1 and 20".to_string(),
        ));
    }

    let started = Instant::now();
    let report = state
        .service
        .generate_batch(cluster_ids, concurrency, request.force_regenerate)
        .await;
    Ok(Json(BatchGenerateResponse::from_report(
        report,
        started.elapsed().as_millis() as u64,
    )))
}

// Review

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub async fn review_role(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let record = state
        .store
        .review(&cluster_id, request.approved, request.feedback)?;
    Ok(Json(record.into()))
}

// Multi-option generation

#[derive(Deserialize)]
pub struct GenerateOptionsRequest {
    pub cluster_id: String,
    #[serde(default)]
    pub force_regenerate: bool,
}

pub async fn generate_role_options(
    State(state): State<AppState>,
    Json(request): Json<GenerateOptionsRequest>,
) -> ApiResult<Json<RoleOptionSet>> {
    let set = state
        .service
        .generate_options(&request.cluster_id, request.force_regenerate)
        .await?;
    Ok(Json(set))
}

#[derive(Deserialize)]
pub struct SelectOptionRequest {
    pub cluster_id: String,
    pub selected_option: u8,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Serialize)]
pub struct SelectOptionResponse {
    pub cluster_id: String,
    pub selected_option: u8,
    pub role_name: String,
}

pub async fn select_role_option(
    State(state): State<AppState>,
    Json(request): Json<SelectOptionRequest>,
) -> ApiResult<Json<SelectOptionResponse>> {
    if !(1..=3).contains(&request.selected_option) {
        return Err(ApiError::BadRequest(
            "selected_option must be between 1 and 3".to_string(),
        ));
    }

    let set = state
        .options
        .select(&request.cluster_id, request.selected_option, request.feedback)?;
    let role_name = set
        .options
        .iter()
        .find(|o| o.option_number == request.selected_option)
        .map(|o| o.role_name.clone())
        .unwrap_or_default();
    Ok(Json(SelectOptionResponse {
        cluster_id: set.cluster_id,
        selected_option: request.selected_option,
        role_name,
    }))
}

#[derive(Serialize)]
pub struct ComparisonRow {
    pub option: u8,
    pub role_name: String,
    pub style: RoleStyle,
    pub word_count: usize,
    pub is_recommended: bool,
    pub is_selected: bool,
}

#[derive(Serialize)]
pub struct ComparisonResponse {
    pub cluster_id: String,
    pub comparison: Vec<ComparisonRow>,
    pub recommendation_reason: String,
    pub risk_level: RiskLevel,
}

pub async fn get_role_comparison(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> ApiResult<Json<ComparisonResponse>> {
    let set = state.options.get(&cluster_id).ok_or_else(|| {
        RoleMineError::NotFound(format!(
            "no role options exist for cluster '{}'",
            cluster_id
        ))
    })?;

    let comparison = set
        .options
        .iter()
        .map(|opt| ComparisonRow {
            option: opt.option_number,
            role_name: opt.role_name.clone(),
            style: opt.style,
            word_count: opt.role_name.split_whitespace().count(),
            is_recommended: opt.option_number == set.recommended_option,
            is_selected: set.selected_option == Some(opt.option_number),
        })
        .collect();

    Ok(Json(ComparisonResponse {
        cluster_id: set.cluster_id,
        comparison,
        recommendation_reason: set.recommendation_reason,
        risk_level: set.risk_level,
    }))
}

// Export

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn export_roles(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> ApiResult<Response> {
    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(ReviewStatus::parse(s).ok_or_else(|| {
            ApiError::RoleMine(RoleMineError::Validation(format!(
                "unknown review status '{}'",
                s
            )))
        })?),
    };

    let records = state.store.snapshot();
    match params.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(export::export_json(&records, status)).into_response()),
        "csv" => Ok((
            [(header::CONTENT_TYPE, "text/csv")],
            export::export_csv(&records, status),
        )
            .into_response()),
        other => Err(ApiError::BadRequest(format!(
            "format must be 'json' or 'csv', got '{}'",
            other
        ))),
    }
}
