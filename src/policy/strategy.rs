//! Resolution strategies and batch classification
//!
//! A raw batch of [`ResolveRequest`]s is normalized and partitioned into one
//! bucket per [`ResolutionStrategy`]. Classification is pure: it never touches
//! the store, so the fan-out in [`crate::policy::resolver`] only has to issue
//! one lookup per non-empty bucket.

use serde_json::json;

use crate::policy::error::CatalogError;
use crate::policy::types::{ResolveRequest, ResolvedItem};
use crate::policy::version::{normalize_version, parse_major, parse_major_minor, parse_version};

/// How a requested version is matched against stored releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    /// The exact version
    Exact,
    /// Highest patch within the requested major.minor
    Patch,
    /// Highest minor.patch within the requested major
    Minor,
    /// Highest version overall
    Major,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 4] = [
        ResolutionStrategy::Exact,
        ResolutionStrategy::Patch,
        ResolutionStrategy::Minor,
        ResolutionStrategy::Major,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Exact => "exact",
            ResolutionStrategy::Patch => "patch",
            ResolutionStrategy::Minor => "minor",
            ResolutionStrategy::Major => "major",
        }
    }

    /// Resolve a raw strategy string, treating empty/absent as `Exact`
    pub fn from_raw(raw: Option<&str>) -> Result<Self, CatalogError> {
        match raw.unwrap_or_default() {
            "" => Ok(ResolutionStrategy::Exact),
            other => other.parse().map_err(|_| {
                CatalogError::validation(
                    "invalid versionResolution",
                    json!({
                        "allowed_values": Self::ALL.map(|s| s.as_str()),
                        "provided": other,
                    }),
                )
            }),
        }
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ResolutionStrategy::Exact),
            "patch" => Ok(ResolutionStrategy::Patch),
            "minor" => Ok(ResolutionStrategy::Minor),
            "major" => Ok(ResolutionStrategy::Major),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactKey {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchKey {
    pub name: String,
    pub major: u64,
    pub minor: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinorKey {
    pub name: String,
    pub major: u64,
}

/// A classified request, tagged by strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedRequest {
    Exact(ExactKey),
    Patch(PatchKey),
    Minor(MinorKey),
    Major(String),
}

impl ClassifiedRequest {
    pub fn strategy(&self) -> ResolutionStrategy {
        match self {
            ClassifiedRequest::Exact(_) => ResolutionStrategy::Exact,
            ClassifiedRequest::Patch(_) => ResolutionStrategy::Patch,
            ClassifiedRequest::Minor(_) => ResolutionStrategy::Minor,
            ClassifiedRequest::Major(_) => ResolutionStrategy::Major,
        }
    }

    /// Whether `item` answers this request.
    ///
    /// Only meaningful against items returned by this request's own strategy
    /// lookup, which yields at most one item per key.
    pub fn matches(&self, item: &ResolvedItem) -> bool {
        match self {
            ClassifiedRequest::Exact(key) => item.name == key.name && item.version == key.version,
            ClassifiedRequest::Patch(key) => {
                item.name == key.name
                    && parse_major_minor(&item.version).ok() == Some((key.major, key.minor))
            }
            ClassifiedRequest::Minor(key) => {
                item.name == key.name && parse_major(&item.version).ok() == Some(key.major)
            }
            ClassifiedRequest::Major(name) => item.name == *name,
        }
    }
}

/// Requests partitioned by strategy, in input order within each bucket
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassifiedBatch {
    pub exact: Vec<ExactKey>,
    pub patch: Vec<PatchKey>,
    pub minor: Vec<MinorKey>,
    pub major: Vec<String>,
}

impl ClassifiedBatch {
    pub fn len(&self) -> usize {
        self.exact.len() + self.patch.len() + self.minor.len() + self.major.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, request: ClassifiedRequest) {
        match request {
            ClassifiedRequest::Exact(key) => self.exact.push(key),
            ClassifiedRequest::Patch(key) => self.patch.push(key),
            ClassifiedRequest::Minor(key) => self.minor.push(key),
            ClassifiedRequest::Major(name) => self.major.push(name),
        }
    }
}

impl FromIterator<ClassifiedRequest> for ClassifiedBatch {
    fn from_iter<I: IntoIterator<Item = ClassifiedRequest>>(iter: I) -> Self {
        let mut batch = ClassifiedBatch::default();
        for request in iter {
            batch.push(request);
        }
        batch
    }
}

/// Normalize and classify a single request
pub fn classify_request(request: &ResolveRequest) -> Result<ClassifiedRequest, CatalogError> {
    if request.name.is_empty() || request.version.is_empty() {
        return Err(CatalogError::validation(
            "policy name and version are required",
            json!({ "policy": request.name, "version": request.version }),
        ));
    }

    let version = normalize_version(&request.version);
    let strategy = ResolutionStrategy::from_raw(request.version_resolution.as_deref())?;

    let classified = match strategy {
        ResolutionStrategy::Exact => {
            parse_version(version).map_err(|e| {
                CatalogError::validation(
                    "invalid version format for exact resolution",
                    json!({
                        "policy": request.name,
                        "version": request.version,
                        "expected": "major.minor.patch",
                        "reason": e.to_string(),
                    }),
                )
            })?;
            ClassifiedRequest::Exact(ExactKey {
                name: request.name.clone(),
                version: version.to_string(),
            })
        }
        ResolutionStrategy::Patch => {
            let (major, minor) = parse_major_minor(version).map_err(|e| {
                CatalogError::validation(
                    "invalid version format for patch resolution",
                    json!({
                        "policy": request.name,
                        "version": request.version,
                        "expected": "major.minor",
                        "reason": e.to_string(),
                    }),
                )
            })?;
            ClassifiedRequest::Patch(PatchKey {
                name: request.name.clone(),
                major,
                minor,
            })
        }
        ResolutionStrategy::Minor => {
            let major = parse_major(version).map_err(|e| {
                CatalogError::validation(
                    "invalid version format for minor resolution",
                    json!({
                        "policy": request.name,
                        "version": request.version,
                        "expected": "major",
                        "reason": e.to_string(),
                    }),
                )
            })?;
            ClassifiedRequest::Minor(MinorKey {
                name: request.name.clone(),
                major,
            })
        }
        ResolutionStrategy::Major => ClassifiedRequest::Major(request.name.clone()),
    };

    Ok(classified)
}

/// Partition a batch into strategy buckets.
///
/// Batches over `max_batch_size` are rejected before any request is looked at.
/// The first invalid request fails the whole batch. Duplicates are kept.
pub fn classify(
    requests: &[ResolveRequest],
    max_batch_size: usize,
) -> Result<ClassifiedBatch, CatalogError> {
    Ok(classify_all(requests, max_batch_size)?.into_iter().collect())
}

/// Classify every request of a batch, keeping input order.
///
/// Same size check and fail-fast behavior as [`classify`].
pub fn classify_all(
    requests: &[ResolveRequest],
    max_batch_size: usize,
) -> Result<Vec<ClassifiedRequest>, CatalogError> {
    if requests.len() > max_batch_size {
        return Err(CatalogError::validation(
            format!("too many policies in batch (max {max_batch_size})"),
            json!({
                "maxBatchSize": max_batch_size,
                "provided": requests.len(),
            }),
        ));
    }

    requests.iter().map(classify_request).collect()
}
