use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use rolemine_core::{
    ClusterSummary, ConsolidatedCluster, EntitlementMetadata, Result, RoleMineError, UserMetadata,
    UserSummary,
};
use tracing::info;

const TOP_JOB_TITLES: usize = 5;
const TOP_DEPARTMENTS: usize = 3;

#[derive(Default)]
struct Tables {
    clusters: BTreeMap<String, ClusterSummary>,
    users_by_cluster: HashMap<String, Vec<UserMetadata>>,
    entitlements: HashMap<String, EntitlementMetadata>,
}

/// Owner of the three in-memory tables. Each `replace_*` swaps a fully
/// parsed table under the write lock, so readers never observe a
/// half-replaced table.
#[derive(Default)]
pub struct DataCatalog {
    tables: RwLock<Tables>,
}

impl DataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cluster table. Returns the IDs of clusters that were
    /// present before and are absent in the new table, so callers can
    /// invalidate stale suggestions.
    pub fn replace_clusters(&self, clusters: Vec<ClusterSummary>) -> Vec<String> {
        let new_table: BTreeMap<String, ClusterSummary> = clusters
            .into_iter()
            .map(|c| (c.cluster_id.clone(), c))
            .collect();

        let mut tables = self.tables.write();
        let removed: Vec<String> = tables
            .clusters
            .keys()
            .filter(|id| !new_table.contains_key(*id))
            .cloned()
            .collect();
        info!(
            clusters = new_table.len(),
            removed = removed.len(),
            "replaced cluster table"
        );
        tables.clusters = new_table;
        removed
    }

    pub fn replace_users(&self, users: Vec<UserMetadata>) {
        let mut by_cluster: HashMap<String, Vec<UserMetadata>> = HashMap::new();
        for user in users {
            by_cluster.entry(user.cluster_id.clone()).or_default().push(user);
        }
        // Stable per-cluster ordering regardless of upload order.
        for members in by_cluster.values_mut() {
            members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        }

        let mut tables = self.tables.write();
        info!(clusters = by_cluster.len(), "replaced user table");
        tables.users_by_cluster = by_cluster;
    }

    pub fn replace_entitlements(&self, entitlements: HashMap<String, EntitlementMetadata>) {
        let mut tables = self.tables.write();
        info!(entitlements = entitlements.len(), "replaced entitlement table");
        tables.entitlements = entitlements;
    }

    /// All known cluster IDs, sorted.
    pub fn cluster_ids(&self) -> Vec<String> {
        self.tables.read().clusters.keys().cloned().collect()
    }

    pub fn contains_cluster(&self, cluster_id: &str) -> bool {
        self.tables.read().clusters.contains_key(cluster_id)
    }

    /// Join a cluster with its users and resolved entitlements into the
    /// per-cluster view used as LLM input. Deterministic: entitlements
    /// keep the cluster's declared order (unresolvable IDs are skipped),
    /// and the user summary orders everything by count then name.
    pub fn consolidate(&self, cluster_id: &str) -> Result<ConsolidatedCluster> {
        let tables = self.tables.read();
        let cluster = tables.clusters.get(cluster_id).ok_or_else(|| {
            RoleMineError::NotFound(format!("cluster '{}' not found", cluster_id))
        })?;
        Ok(consolidate_one(&tables, cluster))
    }

    /// Consolidated views for every cluster, in ID order, built under a
    /// single read lock so a concurrent table swap cannot make some IDs
    /// vanish mid-listing.
    pub fn consolidate_all(&self) -> Vec<ConsolidatedCluster> {
        let tables = self.tables.read();
        tables
            .clusters
            .values()
            .map(|cluster| consolidate_one(&tables, cluster))
            .collect()
    }
}

fn consolidate_one(tables: &Tables, cluster: &ClusterSummary) -> ConsolidatedCluster {
    let entitlements: Vec<EntitlementMetadata> = cluster
        .entitlement_ids
        .iter()
        .filter_map(|id| tables.entitlements.get(id).cloned())
        .collect();

    let members = tables
        .users_by_cluster
        .get(&cluster.cluster_id)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    ConsolidatedCluster {
        cluster_id: cluster.cluster_id.clone(),
        member_count: cluster.member_count,
        label: cluster.label.clone(),
        entitlements,
        user_summary: summarize_users(members),
    }
}

fn summarize_users(users: &[UserMetadata]) -> UserSummary {
    let mut job_titles: BTreeMap<String, usize> = BTreeMap::new();
    let mut departments: BTreeMap<String, usize> = BTreeMap::new();
    for user in users {
        *job_titles.entry(user.job_title.clone()).or_default() += 1;
        *departments.entry(user.department.clone()).or_default() += 1;
    }

    UserSummary {
        total_users: users.len(),
        top_job_titles: top_entries(&job_titles, TOP_JOB_TITLES),
        top_departments: top_entries(&departments, TOP_DEPARTMENTS),
        job_title_distribution: job_titles,
        department_distribution: departments,
    }
}

fn top_entries(counts: &BTreeMap<String, usize>, limit: usize) -> Vec<String> {
    let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
    // Count descending, then name ascending; BTreeMap iteration already
    // yields names in order, so the sort only needs the count key.
    entries.sort_by(|a, b| b.1.cmp(a.1));
    entries.into_iter().take(limit).map(|(name, _)| name.clone()).collect()
}
