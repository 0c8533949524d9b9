//! Persistence contract for the policy catalog

use indexmap::IndexMap;
#[cfg(test)]
use mockall::automock;

use crate::policy::error::StoreError;
use crate::policy::strategy::{ExactKey, MinorKey, PatchKey};
use crate::policy::types::{
    DocPage, NewPolicyVersion, PolicyDoc, PolicyFilters, PolicyVersion, ResolvedItem,
};

/// Trait for storing and querying policy versions
///
/// Implementations must keep exactly one `is_latest` row per policy name and
/// report duplicate (name, version) inserts as [`StoreError::Duplicate`].
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait PolicyRepository: Send + Sync {
    /// List the latest version of every policy matching the filters, ordered by name.
    ///
    /// `filters.page` and `filters.page_size` are expected to be normalized.
    async fn list_policies(&self, filters: &PolicyFilters) -> Result<Vec<PolicyVersion>, StoreError>;

    /// Count policies matching the same predicate as `list_policies`
    async fn count_policies(&self, filters: &PolicyFilters) -> Result<u64, StoreError>;

    async fn distinct_categories(&self) -> Result<Vec<String>, StoreError>;
    async fn distinct_providers(&self) -> Result<Vec<String>, StoreError>;
    async fn distinct_platforms(&self) -> Result<Vec<String>, StoreError>;

    async fn get_policy_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<PolicyVersion>, StoreError>;

    async fn get_latest_policy_version(&self, name: &str) -> Result<Option<PolicyVersion>, StoreError>;

    /// List versions of a policy, newest first
    async fn list_policy_versions(
        &self,
        name: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<PolicyVersion>, StoreError>;

    async fn count_policy_versions(&self, name: &str) -> Result<u64, StoreError>;

    /// Insert a new version together with its docs, flipping the latest flag
    /// when it is the new maximum.
    ///
    /// All or nothing: if any doc cannot be written the version is not stored.
    async fn create_policy_version(
        &self,
        version: &NewPolicyVersion,
        docs: &IndexMap<DocPage, String>,
    ) -> Result<PolicyVersion, StoreError>;

    // Bulk strategy lookups. Keys without a match are omitted from the result.

    async fn lookup_exact(&self, keys: &[ExactKey]) -> Result<Vec<ResolvedItem>, StoreError>;

    async fn lookup_latest_patch(&self, keys: &[PatchKey]) -> Result<Vec<ResolvedItem>, StoreError>;

    async fn lookup_latest_minor(&self, keys: &[MinorKey]) -> Result<Vec<ResolvedItem>, StoreError>;

    async fn lookup_latest_major(&self, names: &[String]) -> Result<Vec<ResolvedItem>, StoreError>;

    async fn get_doc(&self, version_id: i64, page: &str) -> Result<Option<PolicyDoc>, StoreError>;

    async fn list_docs(&self, version_id: i64) -> Result<Vec<PolicyDoc>, StoreError>;

    async fn upsert_doc(
        &self,
        version_id: i64,
        page: &str,
        content_md: &str,
    ) -> Result<PolicyDoc, StoreError>;
}
