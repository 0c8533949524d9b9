//! Concurrent batch resolution
//!
//! One bulk lookup is issued per non-empty strategy bucket and all of them run
//! at the same time. The first failing lane fails the whole call: the other
//! lanes are dropped, which cancels them, and no partial result is returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, try_join_all};
use futures::{FutureExt, TryFutureExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::policy::error::{CatalogError, StoreError};
use crate::policy::repository::PolicyRepository;
use crate::policy::strategy::{ClassifiedBatch, ResolutionStrategy, classify, classify_all};
use crate::policy::types::{ResolveRequest, Resolution, ResolvedItem};

type Lane<'a> =
    BoxFuture<'a, Result<(ResolutionStrategy, Vec<ResolvedItem>), (ResolutionStrategy, StoreError)>>;

fn lane<'a, F>(strategy: ResolutionStrategy, lookup: F) -> Lane<'a>
where
    F: Future<Output = Result<Vec<ResolvedItem>, StoreError>> + Send + 'a,
{
    lookup
        .map_ok(move |items| (strategy, items))
        .map_err(move |e| (strategy, e))
        .boxed()
}

/// Resolves batches of requests against a [`PolicyRepository`]
pub struct Resolver<R: PolicyRepository + ?Sized> {
    repo: Arc<R>,
    max_batch_size: usize,
}

impl<R: PolicyRepository + ?Sized> Resolver<R> {
    pub fn new(repo: Arc<R>, max_batch_size: usize) -> Self {
        Self {
            repo,
            max_batch_size,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Resolve a batch into an unordered set of items.
    ///
    /// Requests without a match are simply absent; callers correlate by
    /// name/version, or use [`Resolver::resolve_correlated`].
    pub async fn resolve(&self, requests: &[ResolveRequest]) -> Result<Vec<ResolvedItem>, CatalogError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let batch = classify(requests, self.max_batch_size)?;
        let lanes = self.dispatch(&batch).await?;

        Ok(lanes.into_iter().flat_map(|(_, items)| items).collect())
    }

    /// Resolve a batch, giving up once `timeout` has elapsed
    pub async fn resolve_with_timeout(
        &self,
        requests: &[ResolveRequest],
        timeout: Duration,
    ) -> Result<Vec<ResolvedItem>, CatalogError> {
        match tokio::time::timeout(timeout, self.resolve(requests)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    "Resolution of {} requests timed out after {}ms",
                    requests.len(),
                    timeout_ms
                );
                Err(CatalogError::Timeout { timeout_ms })
            }
        }
    }

    /// Resolve a batch until `cancelled` completes, whichever comes first
    pub async fn resolve_until<C>(
        &self,
        requests: &[ResolveRequest],
        cancelled: C,
    ) -> Result<Vec<ResolvedItem>, CatalogError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.resolve(requests) => result,
            () = cancelled => {
                info!("Resolution of {} requests cancelled by caller", requests.len());
                Err(CatalogError::Cancelled)
            }
        }
    }

    /// Resolve a single request, failing with `NotFound` when nothing matches
    pub async fn resolve_one(&self, request: &ResolveRequest) -> Result<ResolvedItem, CatalogError> {
        self.resolve(std::slice::from_ref(request))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CatalogError::not_found(
                    "policy version not found",
                    json!({
                        "policy": request.name,
                        "version": request.version,
                        "resolution": request.version_resolution.as_deref().unwrap_or("exact"),
                    }),
                )
            })
    }

    /// Resolve a batch and pair every request with its answer, in input order
    pub async fn resolve_correlated(
        &self,
        requests: &[ResolveRequest],
    ) -> Result<Vec<Resolution>, CatalogError> {
        let classified = classify_all(requests, self.max_batch_size)?;
        if classified.is_empty() {
            return Ok(Vec::new());
        }

        let batch: ClassifiedBatch = classified.iter().cloned().collect();
        let lanes = self.dispatch(&batch).await?;

        let resolutions = requests
            .iter()
            .zip(classified)
            .map(|(request, key)| {
                let resolved = lanes
                    .iter()
                    .filter(|(strategy, _)| *strategy == key.strategy())
                    .flat_map(|(_, items)| items)
                    .find(|item| key.matches(item))
                    .cloned();
                Resolution {
                    request: request.clone(),
                    resolved,
                }
            })
            .collect();

        Ok(resolutions)
    }

    /// Issue one lookup per non-empty bucket and wait for all of them
    async fn dispatch(
        &self,
        batch: &ClassifiedBatch,
    ) -> Result<Vec<(ResolutionStrategy, Vec<ResolvedItem>)>, CatalogError> {
        let mut lanes: Vec<Lane<'_>> = Vec::with_capacity(ResolutionStrategy::ALL.len());

        if !batch.exact.is_empty() {
            lanes.push(lane(
                ResolutionStrategy::Exact,
                self.repo.lookup_exact(&batch.exact),
            ));
        }
        if !batch.patch.is_empty() {
            lanes.push(lane(
                ResolutionStrategy::Patch,
                self.repo.lookup_latest_patch(&batch.patch),
            ));
        }
        if !batch.minor.is_empty() {
            lanes.push(lane(
                ResolutionStrategy::Minor,
                self.repo.lookup_latest_minor(&batch.minor),
            ));
        }
        if !batch.major.is_empty() {
            lanes.push(lane(
                ResolutionStrategy::Major,
                self.repo.lookup_latest_major(&batch.major),
            ));
        }

        debug!(
            "Dispatching {} lookups for {} requests",
            lanes.len(),
            batch.len()
        );

        let results = try_join_all(lanes).await.map_err(|(strategy, e)| {
            warn!("{} lookup failed, aborting batch", strategy.as_str());
            CatalogError::storage("resolving policy versions", &e)
        })?;

        debug!(
            "Resolved {} items",
            results.iter().map(|(_, items)| items.len()).sum::<usize>()
        );
        Ok(results)
    }
}
