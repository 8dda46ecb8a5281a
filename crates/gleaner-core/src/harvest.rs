//! Strategy orchestration.
//!
//! The harvester walks a fixed state machine, `Search → CuratedCollections
//! → DirectBatch → Done`, feeding every query of the current strategy to the
//! [`PageFetcher`]. Any state jumps straight to `Done` once the target is
//! met. A strategy aborted by the forbidden guard is reported and skipped;
//! only fatal errors end the run with `Err`.

use std::collections::HashSet;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointWriter;
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::fetcher::{ForbiddenGuard, PageFetcher, Query, TermEnd};
use crate::models::StrategyKind;
use crate::reporter::{HarvestEvent, HarvestReporter};
use crate::session::HarvestSession;
use crate::summary::{DatasetStats, HarvestSummary};
use crate::terms::{CuratedCollection, TermCatalog, default_collections, unique_collections};
use crate::throttle::ThrottledClient;
use crate::traits::CatalogClient;

/// Position in the strategy sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Search,
    CuratedCollections,
    DirectBatch,
    Done,
}

impl StrategyState {
    pub fn next(self) -> Self {
        match self {
            StrategyState::Search => StrategyState::CuratedCollections,
            StrategyState::CuratedCollections => StrategyState::DirectBatch,
            StrategyState::DirectBatch | StrategyState::Done => StrategyState::Done,
        }
    }

    pub fn strategy(self) -> Option<StrategyKind> {
        match self {
            StrategyState::Search => Some(StrategyKind::Search),
            StrategyState::CuratedCollections => Some(StrategyKind::CuratedCollections),
            StrategyState::DirectBatch => Some(StrategyKind::DirectBatch),
            StrategyState::Done => None,
        }
    }
}

/// How one strategy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyRun {
    Completed,
    Aborted,
    Cancelled,
}

/// Drives all strategies against one catalog client and one checkpoint file.
pub struct Harvester<C> {
    fetcher: PageFetcher<ThrottledClient<C>>,
    writer: CheckpointWriter,
    terms: TermCatalog,
    collections: Vec<CuratedCollection>,
    batch_ids: Vec<String>,
    config: HarvestConfig,
}

impl<C: CatalogClient> Harvester<C> {
    pub fn new(client: C, writer: CheckpointWriter, config: HarvestConfig) -> Self {
        let client = ThrottledClient::new(client, config.pacing.clone());
        Self {
            fetcher: PageFetcher::new(client, &config),
            writer,
            terms: TermCatalog::default(),
            collections: default_collections(),
            batch_ids: Vec::new(),
            config,
        }
    }

    pub fn with_terms(mut self, terms: TermCatalog) -> Self {
        self.terms = terms;
        self
    }

    /// Collections repeating an earlier id are visited once.
    pub fn with_collections(mut self, collections: Vec<CuratedCollection>) -> Self {
        self.collections = unique_collections(&collections);
        self
    }

    pub fn with_batch_ids(mut self, ids: Vec<String>) -> Self {
        self.batch_ids = ids;
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn checkpoint_path(&self) -> &std::path::Path {
        self.writer.path()
    }

    /// Run every strategy until the target is met, the strategies are
    /// exhausted, or `cancel` fires. The final state is always checkpointed.
    pub async fn run<R: HarvestReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<HarvestSummary, AppError> {
        self.config.validate()?;
        let started_at = Utc::now();
        let mut session =
            HarvestSession::open(self.writer.clone(), self.config.flush, self.config.target)?;

        reporter.report(HarvestEvent::Started {
            run_id: session.run_id(),
            checkpoint: self.writer.path(),
            resumed: session.resumed(),
            target: self.config.target,
        });

        if !session.target_reached() {
            // Bad credentials should fail the run before any query is spent.
            self.fetcher.client().fetch_token().await?;
        }

        let mut aborted = Vec::new();
        let mut cancelled = false;
        let mut state = StrategyState::Search;

        while let Some(strategy) = state.strategy() {
            if session.target_reached() {
                reporter.report(HarvestEvent::TargetReached {
                    total: session.len(),
                });
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let run = match state {
                StrategyState::Search => {
                    let skip = self.config.skip_terms;
                    let count = self.terms.len().saturating_sub(skip);
                    let queries = self
                        .terms
                        .terms()
                        .enumerate()
                        .skip(skip)
                        .map(|(i, term)| (i, Query::Search(term)));
                    self.run_strategy(strategy, queries, count, &mut session, &cancel, reporter)
                        .await?
                }
                StrategyState::CuratedCollections => {
                    let queries = self
                        .collections
                        .iter()
                        .cloned()
                        .map(Query::Collection)
                        .enumerate();
                    let count = self.collections.len();
                    self.run_strategy(strategy, queries, count, &mut session, &cancel, reporter)
                        .await?
                }
                StrategyState::DirectBatch => {
                    let ids = self.pending_batch_ids(&session);
                    if ids.is_empty() {
                        tracing::debug!("No unseen ids for direct lookup");
                        StrategyRun::Completed
                    } else {
                        let queries = std::iter::once((0, Query::batch(ids)));
                        self.run_strategy(strategy, queries, 1, &mut session, &cancel, reporter)
                            .await?
                    }
                }
                StrategyState::Done => StrategyRun::Completed,
            };

            match run {
                StrategyRun::Completed => {}
                StrategyRun::Aborted => aborted.push(strategy),
                StrategyRun::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
            state = state.next();
        }

        session.checkpoint()?;

        let summary = HarvestSummary {
            run_id: session.run_id(),
            started_at,
            finished_at: Utc::now(),
            target: self.config.target,
            total_records: session.len(),
            resumed_records: session.resumed(),
            new_records: session.new_records(),
            per_strategy: session.per_strategy().clone(),
            per_category: DatasetStats::from_records(session.records()).per_category,
            aborted_strategies: aborted,
            checkpoints_written: session.flushes(),
            cancelled,
        };
        reporter.report(HarvestEvent::Finished { summary: &summary });
        Ok(summary)
    }

    /// Batch ids not yet accepted, first occurrence kept.
    fn pending_batch_ids(&self, session: &HarvestSession) -> Vec<String> {
        let mut seen = HashSet::new();
        self.batch_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && !session.is_known(id))
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect()
    }

    async fn run_strategy<R, I>(
        &self,
        strategy: StrategyKind,
        queries: I,
        count: usize,
        session: &mut HarvestSession,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<StrategyRun, AppError>
    where
        R: HarvestReporter,
        I: Iterator<Item = (usize, Query)>,
    {
        reporter.report(HarvestEvent::StrategyStarted {
            strategy,
            queries: count,
        });
        let before = session.per_strategy().get(&strategy).copied().unwrap_or(0);
        let mut guard = ForbiddenGuard::new(self.config.forbidden_threshold);
        let mut run = StrategyRun::Completed;

        for (index, query) in queries {
            if session.target_reached() {
                break;
            }
            if cancel.is_cancelled() {
                run = StrategyRun::Cancelled;
                break;
            }

            let outcome = self.fetcher.drive(&query, session, &mut guard, cancel).await?;
            session.term_processed();
            reporter.report(HarvestEvent::QueryFinished {
                strategy,
                index,
                label: query.label(),
                outcome: &outcome,
                total: session.len(),
            });

            match outcome.end {
                TermEnd::StrategyAborted => {
                    reporter.report(HarvestEvent::StrategyAborted {
                        strategy,
                        consecutive_forbidden: guard.consecutive(),
                    });
                    run = StrategyRun::Aborted;
                    break;
                }
                TermEnd::Cancelled => {
                    run = StrategyRun::Cancelled;
                    break;
                }
                _ => {}
            }

            session.checkpoint_if_due()?;
        }

        let after = session.per_strategy().get(&strategy).copied().unwrap_or(0);
        reporter.report(HarvestEvent::StrategyFinished {
            strategy,
            new_records: after - before,
        });
        Ok(run)
    }
}
