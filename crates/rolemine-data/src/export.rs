use chrono::Utc;
use rolemine_core::{ReviewStatus, RoleRecord};
use serde_json::json;

pub const CSV_HEADER: &str =
    "cluster_id,role_name,description,rationale,risk_level,confidence,status,feedback,generated_at";

fn filtered<'a>(
    records: &'a [RoleRecord],
    status: Option<ReviewStatus>,
) -> impl Iterator<Item = &'a RoleRecord> {
    records
        .iter()
        .filter(move |r| status.map_or(true, |s| r.review.status == s))
}

/// Serialize a store snapshot (optionally filtered by review status)
/// into the structured-record export document.
pub fn export_json(records: &[RoleRecord], status: Option<ReviewStatus>) -> serde_json::Value {
    let roles: Vec<serde_json::Value> = filtered(records, status)
        .map(|r| {
            json!({
                "cluster_id": r.suggestion.cluster_id,
                "role_name": r.suggestion.role_name,
                "description": r.suggestion.description,
                "rationale": r.suggestion.rationale,
                "risk_level": r.suggestion.risk_level,
                "confidence": r.suggestion.confidence,
                "model": r.suggestion.model,
                "generated_at": r.suggestion.generated_at,
                "status": r.review.status,
                "feedback": r.review.feedback,
                "reviewed_at": r.review.reviewed_at,
            })
        })
        .collect();

    json!({
        "generated_at": Utc::now(),
        "total_roles": roles.len(),
        "roles": roles,
    })
}

/// Serialize a store snapshot into the tabular export.
pub fn export_csv(records: &[RoleRecord], status: Option<ReviewStatus>) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for r in filtered(records, status) {
        let confidence = r
            .suggestion
            .confidence
            .map(|c| c.to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            csv_escape(&r.suggestion.cluster_id),
            csv_escape(&r.suggestion.role_name),
            csv_escape(&r.suggestion.description),
            csv_escape(&r.suggestion.rationale),
            r.suggestion.risk_level,
            confidence,
            r.review.status,
            csv_escape(r.review.feedback.as_deref().unwrap_or("")),
            r.suggestion.generated_at.to_rfc3339(),
        ));
    }
    out
}

fn csv_escape(value: &str) -> String {
    // Exported records must stay single-line so the same line-based
    // record splitter the loader uses can read them back; embedded
    // newlines are flattened to spaces.
    let flat = value
        .replace("\r\n", " ")
        .replace('\r', " ")
        .replace('\n', " ");
    if flat.contains(',') || flat.contains('"') {
        format!("\"{}\"", flat.replace('"', "\"\""))
    } else {
        flat
    }
}
