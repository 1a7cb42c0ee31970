use std::sync::Arc;

use rolemine_core::{Result, RoleMineError, RoleOptionSet, RoleRecord, RoleSuggestion};
use rolemine_data::{DataCatalog, OptionStore, RoleStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::RoleSuggestionClient;

/// Outcome for one submitted cluster ID in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOutcome {
    Generated { suggestion: RoleSuggestion },
    /// An up-to-date suggestion already existed and
    /// `force_regenerate` was false; no LLM call was made.
    Skipped { suggestion: RoleSuggestion },
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub cluster_id: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Result of a batch run: exactly one entry per submitted cluster ID,
/// in submission order, duplicates included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: Vec<BatchEntry>,
}

enum Prepared {
    Skip(RoleSuggestion),
    Run(JoinHandle<Result<RoleSuggestion>>),
}

/// Generation entry point shared by the single and batch endpoints.
///
/// Batch fan-out discipline: one task per submitted ID, admitted through
/// a semaphore of `concurrency` permits, so at most C provider calls are
/// in flight at any instant. Workers only read shared state; suggestions
/// are written to the store in the merge step after each task joins, and
/// one worker's failure never cancels its siblings.
pub struct RoleGenerationService {
    catalog: Arc<DataCatalog>,
    store: Arc<RoleStore>,
    options: Arc<OptionStore>,
    client: Arc<RoleSuggestionClient>,
}

impl RoleGenerationService {
    pub fn new(
        catalog: Arc<DataCatalog>,
        store: Arc<RoleStore>,
        options: Arc<OptionStore>,
        client: Arc<RoleSuggestionClient>,
    ) -> Self {
        Self {
            catalog,
            store,
            options,
            client,
        }
    }

    /// Generate (or return the stored) three-option set for one
    /// cluster. Same idempotence rule as [`Self::generate_single`].
    pub async fn generate_options(
        &self,
        cluster_id: &str,
        force_regenerate: bool,
    ) -> Result<RoleOptionSet> {
        if !force_regenerate {
            if let Some(set) = self.options.get(cluster_id) {
                info!(cluster_id, "returning existing role option set");
                return Ok(set);
            }
        }

        let view = self.catalog.consolidate(cluster_id)?;
        let set = self.client.generate_options(&view).await?;
        info!(
            cluster_id,
            recommended = set.recommended_option,
            "generated role option set"
        );
        self.options.insert_set(set.clone());
        Ok(set)
    }

    /// Generate (or return the stored) suggestion for one cluster.
    /// With `force_regenerate = false` an existing suggestion is
    /// returned as-is and no LLM call is made.
    pub async fn generate_single(
        &self,
        cluster_id: &str,
        force_regenerate: bool,
    ) -> Result<RoleRecord> {
        if !force_regenerate {
            if let Some(record) = self.store.get(cluster_id) {
                info!(cluster_id, "returning existing suggestion");
                return Ok(record);
            }
        }

        let view = self.catalog.consolidate(cluster_id)?;
        let suggestion = self.client.generate(&view).await?;
        info!(cluster_id, role_name = %suggestion.role_name, "generated role suggestion");
        self.store.insert_suggestion(suggestion);
        self.store
            .get(cluster_id)
            .ok_or_else(|| RoleMineError::NotFound(format!("cluster '{}' not found", cluster_id)))
    }

    /// Run generation for every submitted cluster ID under the given
    /// concurrency cap. Returns after every ID has a recorded success,
    /// failure or skip; the report carries one entry per submission.
    pub async fn generate_batch(
        &self,
        cluster_ids: Vec<String>,
        concurrency: usize,
        force_regenerate: bool,
    ) -> BatchReport {
        let concurrency = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let total = cluster_ids.len();
        info!(total, concurrency, force_regenerate, "starting batch generation");

        let mut prepared = Vec::with_capacity(total);
        for cluster_id in cluster_ids {
            // Per-cluster skip decision, before any permit is taken.
            if !force_regenerate {
                if let Some(record) = self.store.get(&cluster_id) {
                    prepared.push((cluster_id, Prepared::Skip(record.suggestion)));
                    continue;
                }
            }

            let semaphore = Arc::clone(&semaphore);
            let catalog = Arc::clone(&self.catalog);
            let client = Arc::clone(&self.client);
            let id = cluster_id.clone();
            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let view = catalog.consolidate(&id)?;
                client.generate(&view).await
            });
            prepared.push((cluster_id, Prepared::Run(task)));
        }

        let mut entries = Vec::with_capacity(total);
        let (mut generated, mut skipped, mut failed) = (0usize, 0usize, 0usize);
        for (cluster_id, item) in prepared {
            let outcome = match item {
                Prepared::Skip(suggestion) => {
                    skipped += 1;
                    BatchOutcome::Skipped { suggestion }
                }
                Prepared::Run(task) => match task.await {
                    Ok(Ok(suggestion)) => {
                        self.store.insert_suggestion(suggestion.clone());
                        generated += 1;
                        BatchOutcome::Generated { suggestion }
                    }
                    Ok(Err(e)) => {
                        warn!(cluster_id = %cluster_id, error = %e, "cluster generation failed");
                        failed += 1;
                        BatchOutcome::Failed {
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        }
                    }
                    Err(join_err) => {
                        warn!(cluster_id = %cluster_id, error = %join_err, "generation task aborted");
                        failed += 1;
                        BatchOutcome::Failed {
                            kind: "llm".to_string(),
                            message: format!("generation task failed: {}", join_err),
                        }
                    }
                },
            };
            entries.push(BatchEntry { cluster_id, outcome });
        }

        info!(total, generated, skipped, failed, "batch generation complete");
        BatchReport {
            total,
            generated,
            skipped,
            failed,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::provider::{ChatMessage, CompletionParams, LlmProvider, LlmResponse};
    use async_trait::async_trait;
    use rolemine_core::{ClusterSummary, ReviewStatus, UserMetadata};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted provider: answers with a well-formed suggestion, fails
    /// for configured cluster IDs, and tracks in-flight call counts.
    struct MockProvider {
        fail_for: HashSet<String>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                fail_for: HashSet::new(),
                delay: Duration::from_millis(0),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing_for(ids: &[&str]) -> Self {
            let mut provider = Self::new();
            provider.fail_for = ids.iter().map(|s| s.to_string()).collect();
            provider
        }

        fn with_delay(ms: u64) -> Self {
            let mut provider = Self::new();
            provider.delay = Duration::from_millis(ms);
            provider
        }

        fn cluster_id_from(messages: &[ChatMessage]) -> String {
            let user = &messages[1].content;
            user.lines()
                .find_map(|l| l.strip_prefix("- Cluster ID: "))
                .unwrap_or("unknown")
                .to_string()
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: &CompletionParams,
        ) -> rolemine_core::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            let cluster_id = Self::cluster_id_from(messages);
            let result = if self.fail_for.contains(&cluster_id) {
                Err(RoleMineError::RetryExhausted(format!(
                    "injected failure for {}",
                    cluster_id
                )))
            } else if messages[1].content.contains("THREE different role options") {
                Ok(LlmResponse {
                    content: format!(
                        r#"{{"role_options": [
                            {{"option_number": 1, "role_name": "Business {id}", "style": "business_focused", "description": "d", "rationale": "r"}},
                            {{"option_number": 2, "role_name": "Technical {id}", "style": "technical_focused", "description": "d", "rationale": "r"}},
                            {{"option_number": 3, "role_name": "Senior {id}", "style": "hierarchical_focused", "description": "d", "rationale": "r"}}
                        ], "recommended_option": 1, "recommendation_reason": "clearest", "risk_level": "MEDIUM"}}"#,
                        id = cluster_id
                    ),
                    model: "mock".to_string(),
                    total_tokens: None,
                    finish_reason: Some("stop".to_string()),
                })
            } else {
                Ok(LlmResponse {
                    content: format!(
                        r#"{{"role_name": "Role {id}", "description": "Access for {id}", "rationale": "Cohesive grouping", "risk_level": "LOW", "confidence": 0.9}}"#,
                        id = cluster_id
                    ),
                    model: "mock".to_string(),
                    total_tokens: None,
                    finish_reason: Some("stop".to_string()),
                })
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn provider_name(&self) -> &str {
            "mock"
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn seeded_catalog(cluster_ids: &[&str]) -> Arc<DataCatalog> {
        let catalog = Arc::new(DataCatalog::new());
        catalog.replace_clusters(
            cluster_ids
                .iter()
                .map(|id| ClusterSummary {
                    cluster_id: id.to_string(),
                    entitlement_ids: vec!["E1".to_string()],
                    member_count: 2,
                    label: None,
                })
                .collect(),
        );
        catalog.replace_users(
            cluster_ids
                .iter()
                .map(|id| UserMetadata {
                    user_id: format!("u-{}", id),
                    cluster_id: id.to_string(),
                    job_title: "Analyst".to_string(),
                    department: "Finance".to_string(),
                })
                .collect(),
        );
        catalog
    }

    fn service_with(
        provider: Arc<MockProvider>,
        catalog: Arc<DataCatalog>,
    ) -> (RoleGenerationService, Arc<RoleStore>) {
        let store = Arc::new(RoleStore::new());
        let client = Arc::new(RoleSuggestionClient::new(
            provider,
            PromptBuilder::new(25),
            CompletionParams::default(),
        ));
        (
            RoleGenerationService::new(
                catalog,
                Arc::clone(&store),
                Arc::new(OptionStore::new()),
                client,
            ),
            store,
        )
    }

    #[tokio::test]
    async fn single_generation_is_idempotent() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01"]);
        let (service, _store) = service_with(Arc::clone(&provider), catalog);

        let first = service.generate_single("C01", false).await.unwrap();
        let second = service.generate_single("C01", false).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            first.suggestion.generated_at,
            second.suggestion.generated_at
        );
        assert_eq!(first.suggestion.role_name, "Role C01");
    }

    #[tokio::test]
    async fn force_regenerate_calls_provider_again() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01"]);
        let (service, _store) = service_with(Arc::clone(&provider), catalog);

        service.generate_single("C01", false).await.unwrap();
        service.generate_single("C01", true).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_cluster_is_not_found() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01"]);
        let (service, _store) = service_with(provider, catalog);

        assert!(matches!(
            service.generate_single("C99", false).await,
            Err(RoleMineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn batch_respects_concurrency_cap() {
        let provider = Arc::new(MockProvider::with_delay(25));
        let ids: Vec<String> = (1..=8).map(|i| format!("C{:02}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let catalog = seeded_catalog(&id_refs);
        let (service, _store) = service_with(Arc::clone(&provider), catalog);

        let report = service.generate_batch(ids, 2, false).await;
        assert_eq!(report.generated, 8);
        assert!(
            provider.max_in_flight.load(Ordering::SeqCst) <= 2,
            "in-flight calls exceeded the cap: {}",
            provider.max_in_flight.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn batch_result_has_one_entry_per_submission() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01", "C02"]);
        let (service, _store) = service_with(provider, catalog);

        // Duplicates and an unknown ID are all accounted for.
        let submitted = vec![
            "C01".to_string(),
            "C02".to_string(),
            "C01".to_string(),
            "C99".to_string(),
        ];
        let report = service.generate_batch(submitted.clone(), 3, false).await;

        assert_eq!(report.total, 4);
        assert_eq!(report.entries.len(), 4);
        let ids: Vec<&str> = report.entries.iter().map(|e| e.cluster_id.as_str()).collect();
        assert_eq!(ids, vec!["C01", "C02", "C01", "C99"]);

        match &report.entries[3].outcome {
            BatchOutcome::Failed { kind, .. } => assert_eq!(kind, "not_found"),
            other => panic!("expected not_found failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_disturb_siblings() {
        let provider = Arc::new(MockProvider::failing_for(&["C03"]));
        let ids = ["C01", "C02", "C03", "C04", "C05"];
        let catalog = seeded_catalog(&ids);
        let (service, store) = service_with(provider, catalog);

        let report = service
            .generate_batch(ids.iter().map(|s| s.to_string()).collect(), 5, false)
            .await;

        assert_eq!(report.generated, 4);
        assert_eq!(report.failed, 1);
        for entry in &report.entries {
            match (&entry.cluster_id[..], &entry.outcome) {
                ("C03", BatchOutcome::Failed { kind, .. }) => {
                    assert_eq!(kind, "retry_exhausted")
                }
                ("C03", other) => panic!("C03 should have failed, got {:?}", other),
                (id, BatchOutcome::Generated { suggestion }) => {
                    assert_eq!(suggestion.role_name, format!("Role {}", id))
                }
                (id, other) => panic!("{} had unexpected outcome {:?}", id, other),
            }
        }
        assert!(store.get("C03").is_none());
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn existing_suggestions_are_skipped_per_cluster() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01", "C02"]);
        let (service, store) = service_with(Arc::clone(&provider), catalog);

        service.generate_single("C01", false).await.unwrap();
        store.review("C01", true, Some("ok".into())).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let report = service
            .generate_batch(vec!["C01".to_string(), "C02".to_string()], 2, false)
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.generated, 1);
        // Only C02 triggered a new call.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        // The skipped cluster keeps its review state.
        assert_eq!(
            store.get("C01").unwrap().review.status,
            ReviewStatus::Approved
        );
    }

    #[tokio::test]
    async fn option_generation_is_idempotent() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01"]);
        let (service, _store) = service_with(Arc::clone(&provider), catalog);

        let first = service.generate_options("C01", false).await.unwrap();
        assert_eq!(first.options.len(), 3);
        assert_eq!(first.options[0].role_name, "Business C01");
        assert_eq!(first.recommended_option, 1);
        // The seeded catalog has no entitlement metadata, so E1 is
        // unresolvable and the consolidated view lists none.
        assert_eq!(first.entitlement_count, 0);
        assert_eq!(first.user_count, 1);

        let second = service.generate_options("C01", false).await.unwrap();
        assert_eq!(second.generated_at, first.generated_at);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let third = service.generate_options("C01", true).await.unwrap();
        assert_ne!(third.generated_at, first.generated_at);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn option_generation_unknown_cluster_is_not_found() {
        let provider = Arc::new(MockProvider::new());
        let catalog = seeded_catalog(&["C01"]);
        let (service, _store) = service_with(provider, catalog);

        assert!(matches!(
            service.generate_options("C99", false).await,
            Err(RoleMineError::NotFound(_))
        ));
    }
}
