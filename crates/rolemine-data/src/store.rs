use chrono::Utc;
use dashmap::DashMap;
use rolemine_core::{
    Result, ReviewState, ReviewStatus, RoleMineError, RoleOptionSet, RoleRecord, RoleSuggestion,
};
use tracing::info;

/// In-memory mapping of cluster ID to a generated suggestion and its
/// review state. `DashMap` gives per-entry locking, so a review and a
/// batch merge touching different clusters never contend, and a
/// read-modify-write on one entry is atomic.
#[derive(Default)]
pub struct RoleStore {
    records: DashMap<String, RoleRecord>,
}

impl RoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh suggestion. Any prior review state for the cluster
    /// is reset to pending.
    pub fn insert_suggestion(&self, suggestion: RoleSuggestion) {
        self.records.insert(
            suggestion.cluster_id.clone(),
            RoleRecord {
                suggestion,
                review: ReviewState::default(),
            },
        );
    }

    pub fn get(&self, cluster_id: &str) -> Option<RoleRecord> {
        self.records.get(cluster_id).map(|r| r.clone())
    }

    pub fn contains(&self, cluster_id: &str) -> bool {
        self.records.contains_key(cluster_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overwrite the review state for a cluster. Fails with `NotFound`
    /// when no suggestion has been generated yet.
    pub fn review(
        &self,
        cluster_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<RoleRecord> {
        let mut entry = self.records.get_mut(cluster_id).ok_or_else(|| {
            RoleMineError::NotFound(format!(
                "no suggestion exists for cluster '{}'",
                cluster_id
            ))
        })?;
        entry.review = ReviewState {
            status: if approved {
                ReviewStatus::Approved
            } else {
                ReviewStatus::Rejected
            },
            feedback,
            reviewed_at: Some(Utc::now()),
        };
        info!(cluster_id, approved, "suggestion reviewed");
        Ok(entry.clone())
    }

    /// Drop records for clusters removed by a re-upload. Returns how
    /// many were dropped.
    pub fn remove_many(&self, cluster_ids: &[String]) -> usize {
        let mut removed = 0;
        for id in cluster_ids {
            if self.records.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "dropped suggestions for removed clusters");
        }
        removed
    }

    /// All records sorted by cluster ID, for deterministic export and
    /// listing.
    pub fn snapshot(&self) -> Vec<RoleRecord> {
        let mut records: Vec<RoleRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.suggestion.cluster_id.cmp(&b.suggestion.cluster_id));
        records
    }
}

/// In-memory mapping of cluster ID to its multi-option role set.
/// Same entry-locking discipline as [`RoleStore`].
#[derive(Default)]
pub struct OptionStore {
    sets: DashMap<String, RoleOptionSet>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly generated set. Any prior selection and feedback
    /// for the cluster are discarded with the old set.
    pub fn insert_set(&self, set: RoleOptionSet) {
        self.sets.insert(set.cluster_id.clone(), set);
    }

    pub fn get(&self, cluster_id: &str) -> Option<RoleOptionSet> {
        self.sets.get(cluster_id).map(|s| s.clone())
    }

    /// Record the reviewer's pick. `NotFound` when no set was generated
    /// for the cluster, `InvalidOperation` when the option number does
    /// not exist in the stored set.
    pub fn select(
        &self,
        cluster_id: &str,
        option_number: u8,
        feedback: Option<String>,
    ) -> Result<RoleOptionSet> {
        let mut entry = self.sets.get_mut(cluster_id).ok_or_else(|| {
            RoleMineError::NotFound(format!(
                "no role options exist for cluster '{}'",
                cluster_id
            ))
        })?;
        if !entry.options.iter().any(|o| o.option_number == option_number) {
            return Err(RoleMineError::InvalidOperation(format!(
                "cluster '{}' has no option {}",
                cluster_id, option_number
            )));
        }
        entry.selected_option = Some(option_number);
        if feedback.is_some() {
            entry.feedback = feedback;
        }
        info!(cluster_id, option_number, "role option selected");
        Ok(entry.clone())
    }

    /// Drop sets for clusters removed by a re-upload. Returns how many
    /// were dropped.
    pub fn remove_many(&self, cluster_ids: &[String]) -> usize {
        let mut removed = 0;
        for id in cluster_ids {
            if self.sets.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "dropped option sets for removed clusters");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolemine_core::RiskLevel;

    fn suggestion(cluster_id: &str) -> RoleSuggestion {
        RoleSuggestion {
            cluster_id: cluster_id.to_string(),
            role_name: format!("Role {}", cluster_id),
            description: "desc".to_string(),
            rationale: "rationale".to_string(),
            risk_level: RiskLevel::Medium,
            confidence: None,
            model: "test-model".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn review_without_suggestion_is_not_found() {
        let store = RoleStore::new();
        assert!(matches!(
            store.review("C01", true, None),
            Err(RoleMineError::NotFound(_))
        ));
    }

    #[test]
    fn review_overwrites_state() {
        let store = RoleStore::new();
        store.insert_suggestion(suggestion("C01"));
        assert_eq!(store.get("C01").unwrap().review.status, ReviewStatus::Pending);

        let record = store.review("C01", true, Some("ok".into())).unwrap();
        assert_eq!(record.review.status, ReviewStatus::Approved);
        assert_eq!(record.review.feedback.as_deref(), Some("ok"));
        assert!(record.review.reviewed_at.is_some());

        let record = store.review("C01", false, None).unwrap();
        assert_eq!(record.review.status, ReviewStatus::Rejected);
        assert_eq!(record.review.feedback, None);
    }

    #[test]
    fn reinsert_resets_review_to_pending() {
        let store = RoleStore::new();
        store.insert_suggestion(suggestion("C01"));
        store.review("C01", true, None).unwrap();
        store.insert_suggestion(suggestion("C01"));
        assert_eq!(store.get("C01").unwrap().review.status, ReviewStatus::Pending);
    }

    #[test]
    fn snapshot_is_sorted() {
        let store = RoleStore::new();
        store.insert_suggestion(suggestion("C02"));
        store.insert_suggestion(suggestion("C01"));
        let ids: Vec<String> = store
            .snapshot()
            .into_iter()
            .map(|r| r.suggestion.cluster_id)
            .collect();
        assert_eq!(ids, vec!["C01", "C02"]);
    }

    #[test]
    fn remove_many_drops_only_named_clusters() {
        let store = RoleStore::new();
        store.insert_suggestion(suggestion("C01"));
        store.insert_suggestion(suggestion("C02"));
        let removed = store.remove_many(&["C01".to_string(), "C99".to_string()]);
        assert_eq!(removed, 1);
        assert!(store.get("C02").is_some());
    }

    use rolemine_core::{RoleOption, RoleStyle};

    fn option_set(cluster_id: &str) -> RoleOptionSet {
        let styles = [
            RoleStyle::BusinessFocused,
            RoleStyle::TechnicalFocused,
            RoleStyle::HierarchicalFocused,
        ];
        RoleOptionSet {
            cluster_id: cluster_id.to_string(),
            options: styles
                .iter()
                .enumerate()
                .map(|(i, style)| RoleOption {
                    option_number: i as u8 + 1,
                    role_name: format!("Role {} v{}", cluster_id, i + 1),
                    style: *style,
                    description: "desc".to_string(),
                    rationale: "rationale".to_string(),
                })
                .collect(),
            recommended_option: 1,
            recommendation_reason: "clearest name".to_string(),
            risk_level: RiskLevel::Medium,
            entitlement_count: 3,
            user_count: 10,
            model: "test-model".to_string(),
            generated_at: Utc::now(),
            selected_option: None,
            feedback: None,
        }
    }

    #[test]
    fn select_requires_existing_set_and_option() {
        let store = OptionStore::new();
        assert!(matches!(
            store.select("C01", 1, None),
            Err(RoleMineError::NotFound(_))
        ));

        store.insert_set(option_set("C01"));
        assert!(matches!(
            store.select("C01", 4, None),
            Err(RoleMineError::InvalidOperation(_))
        ));

        let set = store.select("C01", 2, Some("prefer technical".into())).unwrap();
        assert_eq!(set.selected_option, Some(2));
        assert_eq!(set.feedback.as_deref(), Some("prefer technical"));
    }

    #[test]
    fn reinsert_set_discards_selection() {
        let store = OptionStore::new();
        store.insert_set(option_set("C01"));
        store.select("C01", 3, None).unwrap();
        store.insert_set(option_set("C01"));
        assert_eq!(store.get("C01").unwrap().selected_option, None);
    }

    #[test]
    fn select_keeps_earlier_feedback_when_none_given() {
        let store = OptionStore::new();
        store.insert_set(option_set("C01"));
        store.select("C01", 1, Some("good".into())).unwrap();
        let set = store.select("C01", 2, None).unwrap();
        assert_eq!(set.feedback.as_deref(), Some("good"));
    }
}
