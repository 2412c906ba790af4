//! Paged batch application over a scanned collection.
//!
//! [`iterate_and_apply`] walks a collection in fixed-size pages selected by
//! skip/limit offsets, hands every non-empty page to a transform that
//! returns one future per record, waits for all of them, reports the
//! settled results to an optional tick observer and moves on. The scan
//! stops at the first empty page.
//!
//! # Ordering
//!
//! Pages are strictly sequential: page `N + 1` is not fetched until every
//! future of page `N` has settled. Futures within a page run concurrently,
//! so records of one page may complete in any order; results are still
//! reported in page order.
//!
//! # Failure
//!
//! The first failing future aborts the whole pass with
//! [`BatchError::Transform`]; no further page is fetched. Records already
//! transformed are not rolled back, so transforms must be safe to re-run.
//!
//! # Caller obligations
//!
//! Skip/limit offsets are not stable under concurrent mutation: commuters
//! inserted or removed while a pass runs can be skipped or visited twice,
//! and a collection that grows faster than the scan advances keeps the
//! loop running. Run at most one pass per collection at a time, and do not
//! insert into or delete from the collection while it runs.

use std::future::Future;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, instrument};

use commuter_core::Commuter;

use crate::db::{CommuterStore, RepositoryError};

/// Default page size.
pub const DEFAULT_PAGE_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(99);

/// A collection that can be read page by page.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Fetch up to `limit` items after skipping `skip`, in natural scan order.
    async fn fetch_page(&self, skip: usize, limit: usize)
    -> Result<Vec<Self::Item>, RepositoryError>;
}

/// Pages over every commuter in a store.
pub struct CommuterPages<'a> {
    store: &'a dyn CommuterStore,
}

impl<'a> CommuterPages<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn CommuterStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PageSource for CommuterPages<'_> {
    type Item = Commuter;

    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Vec<Commuter>, RepositoryError> {
        self.store.find_page(skip, limit).await
    }
}

/// Options for a batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Page size.
    pub limit: NonZeroUsize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl BatchOptions {
    /// Options with the given page size.
    #[must_use]
    pub const fn with_limit(limit: NonZeroUsize) -> Self {
        Self { limit }
    }
}

/// Errors that abort a batch pass. `page` is the 1-based page number.
#[derive(Debug, Error)]
pub enum BatchError<E> {
    /// Fetching a page failed.
    #[error("failed to fetch page {page}: {source}")]
    Fetch {
        page: usize,
        #[source]
        source: RepositoryError,
    },

    /// A record transform failed.
    #[error("transform failed on page {page}: {source}")]
    Transform {
        page: usize,
        #[source]
        source: E,
    },
}

/// Totals for a completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Non-empty pages processed.
    pub pages: usize,
    /// Records handed to the transform.
    pub records: usize,
}

/// Apply `transform` to every page of `source`.
///
/// # Errors
///
/// Returns [`BatchError::Fetch`] if a page cannot be read and
/// [`BatchError::Transform`] for the first failing record future.
pub async fn iterate_and_apply<S, F, Fut, R, E>(
    source: &S,
    options: BatchOptions,
    transform: F,
) -> Result<BatchSummary, BatchError<E>>
where
    S: PageSource + ?Sized,
    F: FnMut(Vec<S::Item>) -> Vec<Fut>,
    Fut: Future<Output = Result<R, E>>,
{
    iterate_and_apply_with_tick(source, options, transform, |_: &[R]| {}).await
}

/// Apply `transform` to every page of `source`, calling `tick` with each
/// page's results once they have all settled.
///
/// # Errors
///
/// Returns [`BatchError::Fetch`] if a page cannot be read and
/// [`BatchError::Transform`] for the first failing record future.
#[instrument(skip_all, fields(limit = options.limit.get()))]
pub async fn iterate_and_apply_with_tick<S, F, Fut, R, E, K>(
    source: &S,
    options: BatchOptions,
    mut transform: F,
    mut tick: K,
) -> Result<BatchSummary, BatchError<E>>
where
    S: PageSource + ?Sized,
    F: FnMut(Vec<S::Item>) -> Vec<Fut>,
    Fut: Future<Output = Result<R, E>>,
    K: FnMut(&[R]),
{
    let limit = options.limit.get();
    let mut summary = BatchSummary::default();

    loop {
        let page = summary.pages + 1;
        let skip = summary.pages.saturating_mul(limit);

        let items = source
            .fetch_page(skip, limit)
            .await
            .map_err(|source| BatchError::Fetch { page, source })?;
        if items.is_empty() {
            break;
        }

        let count = items.len();
        let results = try_join_all(transform(items))
            .await
            .map_err(|source| BatchError::Transform { page, source })?;
        tick(&results);

        summary.pages = page;
        summary.records += count;
        debug!(page, records = count, "Batch page applied");
    }

    debug!(
        pages = summary.pages,
        records = summary.records,
        "Batch pass complete"
    );
    Ok(summary)
}
