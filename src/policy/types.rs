//! Common types for the policy catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checksum of a downloadable policy artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

/// One immutable release of a named policy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    pub id: i64,
    pub policy_name: String,
    pub version: String,
    pub is_latest: bool,

    pub display_name: String,
    pub provider: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub supported_platforms: Vec<String>,
    pub logo_path: Option<String>,
    pub banner_path: Option<String>,

    pub release_date: Option<DateTime<Utc>>,
    pub definition: String,
    pub icon_path: Option<String>,
    pub source_type: Option<String>,
    pub download_url: Option<String>,
    pub checksum: Option<Checksum>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a policy version.
///
/// `is_latest` is not part of it: the store decides that atomically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewPolicyVersion {
    pub policy_name: String,
    pub version: String,
    pub display_name: String,
    pub provider: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub supported_platforms: Vec<String>,
    pub logo_path: Option<String>,
    pub banner_path: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub definition: String,
    pub icon_path: Option<String>,
    pub source_type: Option<String>,
    pub download_url: Option<String>,
    pub checksum: Option<Checksum>,
}

/// Documentation page kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocPage {
    Overview,
    Configuration,
    Examples,
    Faq,
}

impl DocPage {
    pub const ALL: [DocPage; 4] = [
        DocPage::Overview,
        DocPage::Configuration,
        DocPage::Examples,
        DocPage::Faq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocPage::Overview => "overview",
            DocPage::Configuration => "configuration",
            DocPage::Examples => "examples",
            DocPage::Faq => "faq",
        }
    }
}

impl std::str::FromStr for DocPage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overview" => Ok(DocPage::Overview),
            "configuration" => Ok(DocPage::Configuration),
            "examples" => Ok(DocPage::Examples),
            "faq" => Ok(DocPage::Faq),
            _ => Err(()),
        }
    }
}

/// A documentation page attached to a policy version
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDoc {
    pub id: i64,
    pub policy_version_id: i64,
    pub page: String,
    pub content_md: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter criteria for listing policies
///
/// Page numbers and sizes are raw caller input; the catalog clamps them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyFilters {
    pub search: Option<String>,
    pub categories: Vec<String>,
    pub providers: Vec<String>,
    pub platforms: Vec<String>,
    pub page: i64,
    pub page_size: i64,
}

/// Pagination metadata for a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

/// A page of results together with its pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationInfo,
}

/// A single resolution request as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub name: String,
    pub version: String,
    /// Raw strategy; empty or absent means "exact"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_resolution: Option<String>,
}

impl ResolveRequest {
    pub fn new(name: &str, version: &str, version_resolution: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            version_resolution: version_resolution.map(str::to_string),
        }
    }
}

/// A resolved policy version with its download location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedItem {
    pub name: String,
    pub version: String,
    pub download_url: Option<String>,
    pub checksum: Option<Checksum>,
}

/// Request echoed together with the item it resolved to, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub request: ResolveRequest,
    pub resolved: Option<ResolvedItem>,
}

/// Distinct filter values across the latest version of every policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CatalogFacets {
    pub categories: Vec<String>,
    pub providers: Vec<String>,
    pub platforms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("overview", Some(DocPage::Overview))]
    #[case("configuration", Some(DocPage::Configuration))]
    #[case("examples", Some(DocPage::Examples))]
    #[case("faq", Some(DocPage::Faq))]
    #[case("FAQ", None)]
    #[case("changelog", None)]
    fn doc_page_from_str_returns_expected(#[case] input: &str, #[case] expected: Option<DocPage>) {
        assert_eq!(input.parse::<DocPage>().ok(), expected);
    }

    #[test]
    fn doc_page_round_trips_through_as_str() {
        for page in DocPage::ALL {
            assert_eq!(page.as_str().parse::<DocPage>(), Ok(page));
        }
    }

    #[test]
    fn resolve_request_deserializes_without_strategy() {
        let request: ResolveRequest = serde_json::from_value(json!({
            "name": "rate-limit",
            "version": "1.0.0"
        }))
        .unwrap();

        assert_eq!(request, ResolveRequest::new("rate-limit", "1.0.0", None));
    }

    #[test]
    fn new_policy_version_deserializes_partial_manifest() {
        let manifest: NewPolicyVersion = serde_json::from_value(json!({
            "policyName": "rate-limit",
            "version": "1.0.0",
            "displayName": "Rate Limit",
            "provider": "acme",
            "categories": ["traffic"],
            "checksum": { "algorithm": "sha256", "value": "abc" }
        }))
        .unwrap();

        assert_eq!(manifest.policy_name, "rate-limit");
        assert_eq!(manifest.description, None);
        assert_eq!(manifest.categories, vec!["traffic".to_string()]);
        assert_eq!(
            manifest.checksum,
            Some(Checksum {
                algorithm: "sha256".to_string(),
                value: "abc".to_string(),
            })
        );
    }
}
