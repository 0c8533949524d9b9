//! Catalog browsing, version lookup and publishing

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::MAX_DESCRIPTION_LENGTH;
use crate::policy::error::{CatalogError, StoreError};
use crate::policy::pagination::{normalize_page, normalize_page_size};
use crate::policy::repository::PolicyRepository;
use crate::policy::resolver::Resolver;
use crate::policy::types::{
    CatalogFacets, DocPage, NewPolicyVersion, Paginated, PaginationInfo, PolicyDoc, PolicyFilters,
    PolicyVersion,
};
use crate::policy::version::{normalize_version, validate_policy_name, validate_version};

/// Read and write access to the policy catalog
pub struct Catalog<R: PolicyRepository + ?Sized> {
    repo: Arc<R>,
    resolver: Resolver<R>,
}

impl<R: PolicyRepository + ?Sized> Catalog<R> {
    pub fn new(repo: Arc<R>, max_batch_size: usize) -> Self {
        let resolver = Resolver::new(Arc::clone(&repo), max_batch_size);
        Self { repo, resolver }
    }

    /// Resolver sharing this catalog's repository
    pub fn resolver(&self) -> &Resolver<R> {
        &self.resolver
    }

    /// List the latest version of every matching policy.
    ///
    /// The page and page size are clamped first; the listing and the count run
    /// concurrently against the same filters.
    pub async fn list_policies(
        &self,
        filters: &PolicyFilters,
    ) -> Result<Paginated<PolicyVersion>, CatalogError> {
        let page = normalize_page(filters.page);
        let page_size = normalize_page_size(filters.page_size);
        let filters = PolicyFilters {
            page: i64::from(page),
            page_size: i64::from(page_size),
            ..filters.clone()
        };

        let (items, total) = tokio::try_join!(
            async {
                self.repo
                    .list_policies(&filters)
                    .await
                    .map_err(|e| CatalogError::storage("listing policies", &e))
            },
            async {
                self.repo
                    .count_policies(&filters)
                    .await
                    .map_err(|e| CatalogError::storage("counting policies", &e))
            },
        )?;

        debug!(
            "Listed {} of {} policies (page {}, size {})",
            items.len(),
            total,
            page,
            page_size
        );

        Ok(Paginated {
            items,
            pagination: PaginationInfo::new(page, page_size, total),
        })
    }

    pub async fn get_latest_version(&self, name: &str) -> Result<PolicyVersion, CatalogError> {
        self.repo
            .get_latest_policy_version(name)
            .await
            .map_err(|e| CatalogError::storage("fetching latest policy version", &e))?
            .ok_or_else(|| CatalogError::policy_version_not_found(name, "latest"))
    }

    /// Fetch one version; a leading `v` on the version is ignored
    pub async fn get_version(&self, name: &str, version: &str) -> Result<PolicyVersion, CatalogError> {
        self.repo
            .get_policy_version(name, normalize_version(version))
            .await
            .map_err(|e| CatalogError::storage("fetching policy version", &e))?
            .ok_or_else(|| CatalogError::policy_version_not_found(name, version))
    }

    /// List all versions of a policy, highest version first
    pub async fn list_versions(
        &self,
        name: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Paginated<PolicyVersion>, CatalogError> {
        let page = normalize_page(page);
        let page_size = normalize_page_size(page_size);

        let (items, total) = tokio::try_join!(
            async {
                self.repo
                    .list_policy_versions(name, page, page_size)
                    .await
                    .map_err(|e| CatalogError::storage("listing policy versions", &e))
            },
            async {
                self.repo
                    .count_policy_versions(name)
                    .await
                    .map_err(|e| CatalogError::storage("counting policy versions", &e))
            },
        )?;

        Ok(Paginated {
            items,
            pagination: PaginationInfo::new(page, page_size, total),
        })
    }

    /// Raw definition payload of a version
    pub async fn get_definition(&self, name: &str, version: &str) -> Result<String, CatalogError> {
        Ok(self.get_version(name, version).await?.definition)
    }

    /// All documentation pages of a version, keyed by page name
    pub async fn get_all_docs(
        &self,
        name: &str,
        version: &str,
    ) -> Result<IndexMap<String, String>, CatalogError> {
        let policy_version = self.get_version(name, version).await?;
        let docs = self
            .repo
            .list_docs(policy_version.id)
            .await
            .map_err(|e| CatalogError::storage("listing documentation", &e))?;

        Ok(docs
            .into_iter()
            .map(|doc| (doc.page, doc.content_md))
            .collect())
    }

    /// Markdown content of a single documentation page
    pub async fn get_doc(&self, name: &str, version: &str, page: &str) -> Result<String, CatalogError> {
        let page = parse_doc_page(page)?;
        let policy_version = self.get_version(name, version).await?;

        self.repo
            .get_doc(policy_version.id, page.as_str())
            .await
            .map_err(|e| CatalogError::storage("fetching documentation", &e))?
            .map(|doc| doc.content_md)
            .ok_or_else(|| CatalogError::doc_not_found(name, version, page.as_str()))
    }

    /// Distinct categories, providers and platforms of the latest versions
    pub async fn facets(&self) -> Result<CatalogFacets, CatalogError> {
        let (categories, providers, platforms) = tokio::try_join!(
            async { self.repo.distinct_categories().await },
            async { self.repo.distinct_providers().await },
            async { self.repo.distinct_platforms().await },
        )
        .map_err(|e| CatalogError::storage("collecting catalog facets", &e))?;

        Ok(CatalogFacets {
            categories,
            providers,
            platforms,
        })
    }

    /// Validate and store a new version together with its documentation.
    ///
    /// Whether the new version becomes the latest one is decided by the store.
    pub async fn publish(
        &self,
        new_version: NewPolicyVersion,
        docs: &IndexMap<DocPage, String>,
    ) -> Result<PolicyVersion, CatalogError> {
        let new_version = validate_new_version(new_version)?;

        info!(
            "Publishing policy version {}@{}",
            new_version.policy_name, new_version.version
        );

        let created = match self.repo.create_policy_version(&new_version, docs).await {
            Ok(created) => created,
            Err(StoreError::Duplicate { name, version }) => {
                info!("Policy version {}@{} already exists", name, version);
                return Err(CatalogError::Conflict { name, version });
            }
            Err(e) => return Err(CatalogError::storage("creating policy version", &e)),
        };

        info!(
            "Published {}@{} (id {}, latest: {}, {} docs)",
            created.policy_name,
            created.version,
            created.id,
            created.is_latest,
            docs.len()
        );
        Ok(created)
    }

    /// Create or replace one documentation page of an existing version
    pub async fn upsert_doc(
        &self,
        name: &str,
        version: &str,
        page: &str,
        content_md: &str,
    ) -> Result<PolicyDoc, CatalogError> {
        let page = parse_doc_page(page)?;
        let policy_version = self.get_version(name, version).await?;

        self.repo
            .upsert_doc(policy_version.id, page.as_str(), content_md)
            .await
            .map_err(|e| CatalogError::storage("storing documentation", &e))
    }
}

fn parse_doc_page(page: &str) -> Result<DocPage, CatalogError> {
    page.parse().map_err(|_| {
        CatalogError::validation(
            "invalid documentation page",
            json!({
                "allowed_values": DocPage::ALL.map(|p| p.as_str()),
                "provided": page,
            }),
        )
    })
}

fn validate_new_version(mut new_version: NewPolicyVersion) -> Result<NewPolicyVersion, CatalogError> {
    validate_policy_name(&new_version.policy_name).map_err(|e| {
        CatalogError::validation(
            "invalid policy name",
            json!({ "policy": new_version.policy_name, "reason": e.to_string() }),
        )
    })?;

    let version = normalize_version(&new_version.version).to_string();
    validate_version(&version).map_err(|e| {
        CatalogError::validation(
            "invalid version",
            json!({ "version": new_version.version, "reason": e.to_string() }),
        )
    })?;
    new_version.version = version;

    if let Some(description) = &new_version.description {
        let length = description.chars().count();
        if length > MAX_DESCRIPTION_LENGTH {
            warn!(
                "Rejecting {}@{}: description has {} characters",
                new_version.policy_name, new_version.version, length
            );
            return Err(CatalogError::validation(
                format!("description too long (max {MAX_DESCRIPTION_LENGTH} characters)"),
                json!({ "maxLength": MAX_DESCRIPTION_LENGTH, "provided": length }),
            ));
        }
    }

    if new_version.display_name.is_empty() {
        new_version.display_name = new_version.policy_name.clone();
    }

    Ok(new_version)
}
