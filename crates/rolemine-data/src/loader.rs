use std::collections::{BTreeMap, HashMap, HashSet};

use rolemine_core::{
    ClusterSummary, EntitlementMetadata, Result, RiskLevel, RoleMineError, UserMetadata,
};
use serde::Deserialize;

/// The three fixed upload kinds accepted by `POST /clusters/upload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    ClusterSummary,
    UserMetadata,
    EntitlementMetadata,
}

impl FileKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "cluster_summary" => Ok(FileKind::ClusterSummary),
            "user_metadata" => Ok(FileKind::UserMetadata),
            "entitlement_metadata" => Ok(FileKind::EntitlementMetadata),
            other => Err(RoleMineError::Validation(format!(
                "unknown file_type '{}', expected one of cluster_summary, user_metadata, entitlement_metadata",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::ClusterSummary => "cluster_summary",
            FileKind::UserMetadata => "user_metadata",
            FileKind::EntitlementMetadata => "entitlement_metadata",
        }
    }
}

/// Split one CSV record into fields, honoring double-quoted fields with
/// `""` escapes. Embedded newlines inside quotes are not supported; the
/// upload schemas never need them.
pub(crate) fn split_csv_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

struct CsvTable {
    header: Vec<String>,
    /// (1-based row number in the file, fields)
    rows: Vec<(usize, Vec<String>)>,
}

fn parse_csv(content: &str, kind: FileKind, required: &[&str]) -> Result<CsvTable> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines.next().ok_or_else(|| {
        RoleMineError::Validation(format!("{}: file is empty", kind.as_str()))
    })?;
    let header: Vec<String> = split_csv_record(header_line)
        .into_iter()
        .map(|f| f.trim().to_string())
        .collect();

    for col in required {
        if !header.iter().any(|h| h == col) {
            return Err(RoleMineError::Validation(format!(
                "{}: missing required column '{}'",
                kind.as_str(),
                col
            )));
        }
    }

    let mut rows = Vec::new();
    for (row_no, line) in lines {
        let fields = split_csv_record(line);
        if fields.len() != header.len() {
            return Err(RoleMineError::Validation(format!(
                "{}: row {}: expected {} fields, found {}",
                kind.as_str(),
                row_no,
                header.len(),
                fields.len()
            )));
        }
        rows.push((row_no, fields));
    }
    Ok(CsvTable { header, rows })
}

fn column<'a>(table: &'a CsvTable, name: &str) -> usize {
    // required columns are validated in parse_csv
    table.header.iter().position(|h| h == name).unwrap_or(0)
}

/// Parse a cluster-summary CSV upload.
///
/// Required columns: `Cluster_ID`, `Core_Entitlements` (comma-separated
/// entitlement IDs inside one quoted field), `User_Count`. Optional:
/// `Label`. Duplicate cluster IDs are rejected.
pub fn parse_cluster_summary(content: &str) -> Result<Vec<ClusterSummary>> {
    let kind = FileKind::ClusterSummary;
    let table = parse_csv(content, kind, &["Cluster_ID", "Core_Entitlements", "User_Count"])?;

    let id_col = column(&table, "Cluster_ID");
    let ent_col = column(&table, "Core_Entitlements");
    let count_col = column(&table, "User_Count");
    let label_col = table.header.iter().position(|h| h == "Label");

    let mut seen = HashSet::new();
    let mut clusters = Vec::with_capacity(table.rows.len());
    for (row_no, fields) in &table.rows {
        let cluster_id = fields[id_col].trim().to_string();
        if cluster_id.is_empty() {
            return Err(RoleMineError::Validation(format!(
                "cluster_summary: row {}: field 'Cluster_ID' is empty",
                row_no
            )));
        }
        if !seen.insert(cluster_id.clone()) {
            return Err(RoleMineError::Validation(format!(
                "cluster_summary: row {}: duplicate Cluster_ID '{}'",
                row_no, cluster_id
            )));
        }

        let entitlement_ids: Vec<String> = fields[ent_col]
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if entitlement_ids.is_empty() {
            return Err(RoleMineError::Validation(format!(
                "cluster_summary: row {}: field 'Core_Entitlements' is empty",
                row_no
            )));
        }

        let member_count: usize = fields[count_col].trim().parse().map_err(|_| {
            RoleMineError::Validation(format!(
                "cluster_summary: row {}: field 'User_Count' is not an integer: '{}'",
                row_no, fields[count_col]
            ))
        })?;

        let label = label_col
            .map(|c| fields[c].trim().to_string())
            .filter(|l| !l.is_empty());

        clusters.push(ClusterSummary {
            cluster_id,
            entitlement_ids,
            member_count,
            label,
        });
    }
    Ok(clusters)
}

/// Parse a user-metadata CSV upload. Required columns: `User_ID`,
/// `Cluster_ID`, `Job_Title`, `Department`.
pub fn parse_user_metadata(content: &str) -> Result<Vec<UserMetadata>> {
    let kind = FileKind::UserMetadata;
    let table = parse_csv(
        content,
        kind,
        &["User_ID", "Cluster_ID", "Job_Title", "Department"],
    )?;

    let user_col = column(&table, "User_ID");
    let cluster_col = column(&table, "Cluster_ID");
    let title_col = column(&table, "Job_Title");
    let dept_col = column(&table, "Department");

    let mut users = Vec::with_capacity(table.rows.len());
    for (row_no, fields) in &table.rows {
        let user_id = fields[user_col].trim().to_string();
        let cluster_id = fields[cluster_col].trim().to_string();
        if user_id.is_empty() {
            return Err(RoleMineError::Validation(format!(
                "user_metadata: row {}: field 'User_ID' is empty",
                row_no
            )));
        }
        if cluster_id.is_empty() {
            return Err(RoleMineError::Validation(format!(
                "user_metadata: row {}: field 'Cluster_ID' is empty",
                row_no
            )));
        }
        users.push(UserMetadata {
            user_id,
            cluster_id,
            job_title: fields[title_col].trim().to_string(),
            department: fields[dept_col].trim().to_string(),
        });
    }
    Ok(users)
}

#[derive(Deserialize)]
struct EntitlementPayload {
    name: String,
    description: String,
    #[serde(default)]
    risk_category: Option<String>,
}

/// Parse an entitlement-metadata JSON upload: an object keyed by
/// entitlement ID with `name`, `description` and optional
/// `risk_category`.
pub fn parse_entitlement_metadata(content: &str) -> Result<HashMap<String, EntitlementMetadata>> {
    let raw: BTreeMap<String, EntitlementPayload> =
        serde_json::from_str(content).map_err(|e| {
            RoleMineError::Validation(format!("entitlement_metadata: malformed JSON: {}", e))
        })?;

    let mut entitlements = HashMap::with_capacity(raw.len());
    for (id, payload) in raw {
        let risk_category = match payload.risk_category.as_deref() {
            None => None,
            Some(s) => Some(RiskLevel::parse(s).ok_or_else(|| {
                RoleMineError::Validation(format!(
                    "entitlement_metadata: entry '{}': unknown risk_category '{}'",
                    id, s
                ))
            })?),
        };
        entitlements.insert(
            id.clone(),
            EntitlementMetadata {
                id,
                name: payload.name,
                description: payload.description,
                risk_category,
            },
        );
    }
    Ok(entitlements)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTERS: &str = "Cluster_ID,Core_Entitlements,User_Count\nC01,\"E1, E2\",3\nC02,E3,10\n";

    #[test]
    fn parses_cluster_summary_with_quoted_entitlements() {
        let clusters = parse_cluster_summary(CLUSTERS).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].cluster_id, "C01");
        assert_eq!(clusters[0].entitlement_ids, vec!["E1", "E2"]);
        assert_eq!(clusters[0].member_count, 3);
        assert_eq!(clusters[1].entitlement_ids, vec!["E3"]);
    }

    #[test]
    fn rejects_missing_column() {
        let err = parse_cluster_summary("Cluster_ID,User_Count\nC01,3\n").unwrap_err();
        match err {
            RoleMineError::Validation(msg) => assert!(msg.contains("Core_Entitlements")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_user_count_naming_row_and_field() {
        let err = parse_cluster_summary(
            "Cluster_ID,Core_Entitlements,User_Count\nC01,E1,three\n",
        )
        .unwrap_err();
        match err {
            RoleMineError::Validation(msg) => {
                assert!(msg.contains("row 2"));
                assert!(msg.contains("User_Count"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_duplicate_cluster_id() {
        let err = parse_cluster_summary(
            "Cluster_ID,Core_Entitlements,User_Count\nC01,E1,3\nC01,E2,4\n",
        )
        .unwrap_err();
        assert!(matches!(err, RoleMineError::Validation(_)));
    }

    #[test]
    fn parses_user_metadata() {
        let users = parse_user_metadata(
            "User_ID,Cluster_ID,Job_Title,Department\nu1,C01,Analyst,Finance\nu2,C01,Analyst,Finance\n",
        )
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].job_title, "Analyst");
    }

    #[test]
    fn rejects_ragged_row() {
        let err = parse_user_metadata(
            "User_ID,Cluster_ID,Job_Title,Department\nu1,C01,Analyst\n",
        )
        .unwrap_err();
        match err {
            RoleMineError::Validation(msg) => assert!(msg.contains("row 2")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn parses_entitlement_json() {
        let json = r#"{
            "E1": {"name": "GL Read", "description": "Read the general ledger", "risk_category": "LOW"},
            "E2": {"name": "GL Write", "description": "Post journal entries"}
        }"#;
        let ents = parse_entitlement_metadata(json).unwrap();
        assert_eq!(ents.len(), 2);
        assert_eq!(ents["E1"].risk_category, Some(RiskLevel::Low));
        assert_eq!(ents["E2"].risk_category, None);
    }

    #[test]
    fn rejects_unknown_risk_category() {
        let json = r#"{"E1": {"name": "n", "description": "d", "risk_category": "EXTREME"}}"#;
        assert!(matches!(
            parse_entitlement_metadata(json),
            Err(RoleMineError::Validation(_))
        ));
    }

    #[test]
    fn split_handles_escaped_quotes() {
        let fields = split_csv_record(r#"a,"b ""x"" c",d"#);
        assert_eq!(fields, vec!["a", "b \"x\" c", "d"]);
    }
}
