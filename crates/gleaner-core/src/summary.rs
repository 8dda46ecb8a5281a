use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{HarvestRecord, StrategyKind};

/// Final report of a harvesting run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target: usize,
    pub total_records: usize,
    pub resumed_records: usize,
    pub new_records: usize,
    /// Records accepted in this run, by strategy.
    pub per_strategy: BTreeMap<StrategyKind, usize>,
    /// All accumulated records, by source category.
    pub per_category: BTreeMap<String, usize>,
    pub aborted_strategies: Vec<StrategyKind>,
    pub checkpoints_written: usize,
    pub cancelled: bool,
}

impl HarvestSummary {
    pub fn target_reached(&self) -> bool {
        self.total_records >= self.target
    }
}

/// Breakdown of an existing dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub total_records: usize,
    pub per_category: BTreeMap<String, usize>,
    pub per_strategy: BTreeMap<StrategyKind, usize>,
    pub distinct_attributions: usize,
}

impl DatasetStats {
    pub fn from_records(records: &[HarvestRecord]) -> Self {
        let mut stats = Self {
            total_records: records.len(),
            ..Self::default()
        };
        let mut attributions = std::collections::HashSet::new();
        for record in records {
            *stats
                .per_category
                .entry(record.source_category.clone())
                .or_default() += 1;
            *stats
                .per_strategy
                .entry(record.provenance.strategy)
                .or_default() += 1;
            attributions.extend(record.attribution.iter().map(String::as_str));
        }
        stats.distinct_attributions = attributions.len();
        stats
    }

    /// Categories sorted by descending count, ties by name.
    pub fn top_categories(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut sorted: Vec<(&str, usize)> = self
            .per_category
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        sorted.truncate(limit);
        sorted
    }
}
