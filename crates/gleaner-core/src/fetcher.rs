//! Paginated fetching shared by every strategy.
//!
//! One [`PageFetcher`] drives any [`Query`] (search term, curated
//! collection, or batch lookup) page by page until the query is exhausted,
//! hits the per-query offset ceiling, stops yielding new records, or the
//! session target is met. Upstream errors are classified through
//! [`AppError::class`] before the retry/skip/abort decision is made.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::error::{AppError, ErrorClass};
use crate::models::{CatalogItem, HarvestRecord, Provenance, StrategyKind};
use crate::session::{HarvestSession, Offer};
use crate::terms::{CuratedCollection, MIXED_CATEGORY, SearchTerm};
use crate::traits::CatalogClient;

/// Offsets between progress log lines within one query.
const PROGRESS_EVERY: usize = 500;

/// Position within one query's result set.
///
/// Requests are only issued while `offset < max_offset`; the ceiling is an
/// upstream limit per query, not an end-of-results signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    offset: usize,
    page_size: usize,
    max_offset: usize,
}

impl PaginationCursor {
    pub fn new(page_size: usize, max_offset: usize) -> Self {
        Self {
            offset: 0,
            page_size: page_size.max(1),
            max_offset,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// Whether another request is permitted.
    pub fn has_room(&self) -> bool {
        self.offset < self.max_offset
    }

    /// Move to the next page, clamped to the ceiling.
    pub fn advance(&mut self) {
        self.offset = (self.offset + self.page_size).min(self.max_offset);
    }
}

/// One unit of work for the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Search(SearchTerm),
    Collection(CuratedCollection),
    /// Direct lookup of known ids, paged by batch size.
    Batch { ids: Vec<String>, category: String },
}

impl Query {
    pub fn batch(ids: Vec<String>) -> Self {
        Query::Batch {
            ids,
            category: MIXED_CATEGORY.to_string(),
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        match self {
            Query::Search(_) => StrategyKind::Search,
            Query::Collection(_) => StrategyKind::CuratedCollections,
            Query::Batch { .. } => StrategyKind::DirectBatch,
        }
    }

    /// Human-readable origin recorded in provenance.
    pub fn label(&self) -> &str {
        match self {
            Query::Search(term) => term.query(),
            Query::Collection(collection) => &collection.id,
            Query::Batch { .. } => "batch",
        }
    }

    pub fn category(&self) -> &str {
        match self {
            Query::Search(term) => term.category_label(),
            Query::Collection(collection) => collection.category(),
            Query::Batch { category, .. } => category,
        }
    }

    fn provenance(&self) -> Provenance {
        Provenance::new(self.strategy(), self.label())
    }

    /// Batch pages address disjoint id slices, so one bad page says nothing
    /// about the next.
    fn pages_independent(&self) -> bool {
        matches!(self, Query::Batch { .. })
    }

    fn cursor(&self, page_size: usize, batch_size: usize, max_offset: usize) -> PaginationCursor {
        match self {
            Query::Batch { ids, .. } => PaginationCursor::new(batch_size, ids.len()),
            _ => PaginationCursor::new(page_size, max_offset),
        }
    }

    async fn execute<C: CatalogClient>(
        &self,
        client: &C,
        cursor: &PaginationCursor,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        match self {
            Query::Search(term) => {
                client
                    .search(term.query(), cursor.page_size(), cursor.offset())
                    .await
            }
            Query::Collection(collection) => {
                client
                    .collection_page(&collection.id, cursor.page_size(), cursor.offset())
                    .await
            }
            Query::Batch { ids, .. } => {
                let end = (cursor.offset() + cursor.page_size()).min(ids.len());
                client.fetch_batch(&ids[cursor.offset()..end]).await
            }
        }
    }
}

/// Why a query stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEnd {
    /// Upstream returned no more results.
    Exhausted,
    /// The per-query offset ceiling was reached.
    Ceiling,
    /// A page yielded only keys already accepted.
    Overlap,
    TargetReached,
    /// Still rate limited after the cool-down retry.
    RateLimited,
    /// A transient error ended the query.
    Failed,
    /// Forbidden below the abort threshold; the query was abandoned.
    Forbidden,
    /// Consecutive forbidden responses reached the threshold.
    StrategyAborted,
    Cancelled,
}

impl TermEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermEnd::Exhausted => "exhausted",
            TermEnd::Ceiling => "ceiling",
            TermEnd::Overlap => "overlap",
            TermEnd::TargetReached => "target_reached",
            TermEnd::RateLimited => "rate_limited",
            TermEnd::Failed => "failed",
            TermEnd::Forbidden => "forbidden",
            TermEnd::StrategyAborted => "strategy_aborted",
            TermEnd::Cancelled => "cancelled",
        }
    }

    /// Normal termination conditions, as opposed to error-driven ones.
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            TermEnd::Exhausted | TermEnd::Ceiling | TermEnd::Overlap | TermEnd::TargetReached
        )
    }
}

/// What one query contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermOutcome {
    pub new_records: usize,
    pub pages: usize,
    pub duplicates: usize,
    /// Null slots and items that could not become records.
    pub malformed: usize,
    /// Pages skipped after an error (batch lookups only).
    pub skipped_pages: usize,
    pub end: TermEnd,
}

impl TermOutcome {
    fn new() -> Self {
        Self {
            new_records: 0,
            pages: 0,
            duplicates: 0,
            malformed: 0,
            skipped_pages: 0,
            end: TermEnd::Exhausted,
        }
    }

    pub fn exhausted_normally(&self) -> bool {
        self.end.is_normal()
    }
}

/// Counts consecutive forbidden responses within one strategy.
#[derive(Debug, Clone)]
pub struct ForbiddenGuard {
    threshold: u32,
    consecutive: u32,
    total: u32,
}

impl ForbiddenGuard {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            total: 0,
        }
    }

    /// Record one forbidden response. Returns true once the threshold is hit.
    pub fn record_forbidden(&mut self) -> bool {
        self.consecutive += 1;
        self.total += 1;
        self.is_tripped()
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn total(&self) -> u32 {
        self.total
    }
}

/// Per-page tallies.
#[derive(Default)]
struct PageTally {
    new_records: usize,
    duplicates: usize,
    malformed: usize,
}

/// Drives queries to completion against a catalog client.
#[derive(Clone)]
pub struct PageFetcher<C> {
    client: C,
    page_size: usize,
    batch_size: usize,
    max_offset: usize,
    cooldown: Duration,
}

impl<C: CatalogClient> PageFetcher<C> {
    pub fn new(client: C, config: &HarvestConfig) -> Self {
        Self {
            client,
            page_size: config.page_size,
            batch_size: config.batch_size,
            max_offset: config.max_offset,
            cooldown: config.cooldown,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch pages for `query` until a stop condition is met.
    ///
    /// Only fatal errors are returned as `Err`; everything else is folded
    /// into the outcome's [`TermEnd`].
    pub async fn drive(
        &self,
        query: &Query,
        session: &mut HarvestSession,
        guard: &mut ForbiddenGuard,
        cancel: &CancellationToken,
    ) -> Result<TermOutcome, AppError> {
        let mut cursor = query.cursor(self.page_size, self.batch_size, self.max_offset);
        let mut outcome = TermOutcome::new();
        let independent = query.pages_independent();

        outcome.end = loop {
            if cancel.is_cancelled() {
                break TermEnd::Cancelled;
            }
            if session.target_reached() {
                break TermEnd::TargetReached;
            }
            if !cursor.has_room() {
                break if independent {
                    TermEnd::Exhausted
                } else {
                    TermEnd::Ceiling
                };
            }

            let Some(first) = self.execute_or_cancel(query, &cursor, cancel).await else {
                break TermEnd::Cancelled;
            };
            let result = match first {
                Err(err) if err.class() == ErrorClass::RateLimited => {
                    let wait = self.cooldown_for(&err);
                    tracing::warn!(
                        query = %query.label(),
                        offset = cursor.offset(),
                        wait_secs = wait.as_secs_f32(),
                        "Rate limited, cooling down before retry"
                    );
                    if !sleep_or_cancel(wait, cancel).await {
                        break TermEnd::Cancelled;
                    }
                    match self.execute_or_cancel(query, &cursor, cancel).await {
                        Some(retried) => retried,
                        None => break TermEnd::Cancelled,
                    }
                }
                other => other,
            };

            let items = match result {
                Ok(items) => {
                    guard.record_success();
                    items
                }
                Err(err) => {
                    let end = match err.class() {
                        ErrorClass::Fatal => return Err(err),
                        ErrorClass::RateLimited => {
                            tracing::warn!(
                                query = %query.label(),
                                offset = cursor.offset(),
                                "Still rate limited after cool-down"
                            );
                            TermEnd::RateLimited
                        }
                        ErrorClass::Forbidden => {
                            if guard.record_forbidden() {
                                tracing::error!(
                                    strategy = %query.strategy(),
                                    consecutive = guard.consecutive(),
                                    error = %err,
                                    "Forbidden threshold reached; current credentials cannot use this endpoint"
                                );
                                break TermEnd::StrategyAborted;
                            }
                            tracing::warn!(
                                query = %query.label(),
                                consecutive = guard.consecutive(),
                                error = %err,
                                "Forbidden"
                            );
                            TermEnd::Forbidden
                        }
                        ErrorClass::Transient | ErrorClass::MalformedItem => {
                            tracing::warn!(
                                query = %query.label(),
                                offset = cursor.offset(),
                                error = %err,
                                "Page request failed"
                            );
                            TermEnd::Failed
                        }
                    };
                    if independent {
                        outcome.skipped_pages += 1;
                        cursor.advance();
                        continue;
                    }
                    break end;
                }
            };

            if items.is_empty() {
                break TermEnd::Exhausted;
            }
            outcome.pages += 1;

            let tally = Self::accept_page(query, items, session);
            outcome.new_records += tally.new_records;
            outcome.duplicates += tally.duplicates;
            outcome.malformed += tally.malformed;

            if session.target_reached() {
                break TermEnd::TargetReached;
            }

            session.checkpoint_if_due()?;

            if tally.new_records == 0 && !independent {
                break if tally.duplicates > 0 {
                    TermEnd::Overlap
                } else {
                    TermEnd::Exhausted
                };
            }

            cursor.advance();
            if cursor.offset() % PROGRESS_EVERY == 0 && cursor.has_room() {
                tracing::info!(
                    query = %query.label(),
                    offset = cursor.offset(),
                    new_records = outcome.new_records,
                    total = session.len(),
                    "Progress"
                );
            }
        };

        Ok(outcome)
    }

    /// Issue one page request, dropping it if `cancel` fires first.
    async fn execute_or_cancel(
        &self,
        query: &Query,
        cursor: &PaginationCursor,
        cancel: &CancellationToken,
    ) -> Option<Result<Vec<Option<CatalogItem>>, AppError>> {
        tokio::select! {
            result = query.execute(&self.client, cursor) => Some(result),
            () = cancel.cancelled() => None,
        }
    }

    /// Convert and offer every item on a page, stopping at the target.
    fn accept_page(
        query: &Query,
        items: Vec<Option<CatalogItem>>,
        session: &mut HarvestSession,
    ) -> PageTally {
        let mut tally = PageTally::default();
        for slot in items {
            let Some(item) = slot else {
                tally.malformed += 1;
                continue;
            };
            let record = match HarvestRecord::from_item(
                &item,
                query.category(),
                query.provenance(),
                session.next_position(),
            ) {
                Ok(record) => record,
                Err(err) => {
                    tracing::debug!(query = %query.label(), error = %err, "Skipping item");
                    tally.malformed += 1;
                    continue;
                }
            };
            match session.offer(record) {
                Offer::Accepted => tally.new_records += 1,
                Offer::Duplicate => tally.duplicates += 1,
                Offer::TargetReached => break,
            }
        }
        tally
    }

    /// Cool-down before the single retry: the configured period, or the
    /// server's hint if longer, capped at five periods.
    fn cooldown_for(&self, err: &AppError) -> Duration {
        match err {
            AppError::RateLimited {
                retry_after: Some(hint),
            } => (*hint).clamp(self.cooldown, self.cooldown * 5),
            _ => self.cooldown,
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}
