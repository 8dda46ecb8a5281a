use std::path::Path;

use uuid::Uuid;

use crate::fetcher::TermOutcome;
use crate::models::StrategyKind;
use crate::summary::HarvestSummary;

/// Events emitted by the harvester for monitoring/logging.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    Started {
        run_id: Uuid,
        checkpoint: &'a Path,
        resumed: usize,
        target: usize,
    },
    StrategyStarted {
        strategy: StrategyKind,
        queries: usize,
    },
    QueryFinished {
        strategy: StrategyKind,
        index: usize,
        label: &'a str,
        outcome: &'a TermOutcome,
        total: usize,
    },
    StrategyAborted {
        strategy: StrategyKind,
        consecutive_forbidden: u32,
    },
    StrategyFinished {
        strategy: StrategyKind,
        new_records: usize,
    },
    TargetReached {
        total: usize,
    },
    Finished {
        summary: &'a HarvestSummary,
    },
}

/// Trait for receiving harvest events (decoupled logging).
pub trait HarvestReporter: Send + Sync {
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHarvestReporter;

impl HarvestReporter for TracingHarvestReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::Started {
                run_id,
                checkpoint,
                resumed,
                target,
            } => {
                tracing::info!(
                    %run_id,
                    checkpoint = %checkpoint.display(),
                    resumed,
                    target,
                    "Harvest started"
                );
            }
            HarvestEvent::StrategyStarted { strategy, queries } => {
                tracing::info!(%strategy, queries, "Strategy started");
            }
            HarvestEvent::QueryFinished {
                strategy,
                index,
                label,
                outcome,
                total,
            } if outcome.exhausted_normally() => {
                tracing::info!(
                    %strategy,
                    index,
                    query = %label,
                    new_records = outcome.new_records,
                    duplicates = outcome.duplicates,
                    end = outcome.end.as_str(),
                    total,
                    "Query finished"
                );
            }
            HarvestEvent::QueryFinished {
                strategy,
                index,
                label,
                outcome,
                total,
            } => {
                tracing::warn!(
                    %strategy,
                    index,
                    query = %label,
                    new_records = outcome.new_records,
                    malformed = outcome.malformed,
                    skipped_pages = outcome.skipped_pages,
                    end = outcome.end.as_str(),
                    total,
                    "Query ended early"
                );
            }
            HarvestEvent::StrategyAborted {
                strategy,
                consecutive_forbidden,
            } => {
                tracing::error!(%strategy, consecutive_forbidden, "Strategy aborted");
            }
            HarvestEvent::StrategyFinished {
                strategy,
                new_records,
            } => {
                tracing::info!(%strategy, new_records, "Strategy finished");
            }
            HarvestEvent::TargetReached { total } => {
                tracing::info!(total, "Target reached");
            }
            HarvestEvent::Finished { summary } => {
                tracing::info!(
                    run_id = %summary.run_id,
                    total = summary.total_records,
                    new_records = summary.new_records,
                    cancelled = summary.cancelled,
                    "Harvest finished"
                );
            }
        }
    }
}
