use std::collections::BTreeMap;

use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointWriter, FlushPolicy};
use crate::dedup::DedupStore;
use crate::error::AppError;
use crate::models::{HarvestRecord, StrategyKind};

/// Result of offering a candidate record to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Duplicate,
    /// The target was already met; the candidate was not registered.
    TargetReached,
}

/// State of one harvesting invocation: the accumulator, the dedup key set
/// and the checkpoint writer that makes them durable.
pub struct HarvestSession {
    run_id: Uuid,
    target: usize,
    records: Vec<HarvestRecord>,
    keys: DedupStore,
    resumed: usize,
    per_strategy: BTreeMap<StrategyKind, usize>,
    writer: CheckpointWriter,
    policy: FlushPolicy,
    records_since_flush: usize,
    terms_since_flush: usize,
    flushes: usize,
}

impl HarvestSession {
    /// Open a session, resuming from the writer's last committed checkpoint.
    pub fn open(
        writer: CheckpointWriter,
        policy: FlushPolicy,
        target: usize,
    ) -> Result<Self, AppError> {
        let checkpoint = writer.load()?;
        Ok(Self::resume(checkpoint, writer, policy, target))
    }

    pub fn resume(
        checkpoint: Checkpoint,
        writer: CheckpointWriter,
        policy: FlushPolicy,
        target: usize,
    ) -> Self {
        let Checkpoint { records, mut keys } = checkpoint;
        // Keys reconstructed from rows must cover every row.
        for record in &records {
            keys.accept(&record.primary_key);
        }
        Self {
            run_id: Uuid::new_v4(),
            target,
            resumed: records.len(),
            records,
            keys,
            per_strategy: BTreeMap::new(),
            writer,
            policy,
            records_since_flush: 0,
            terms_since_flush: 0,
            flushes: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn resumed(&self) -> usize {
        self.resumed
    }

    pub fn new_records(&self) -> usize {
        self.records.len() - self.resumed
    }

    pub fn target_reached(&self) -> bool {
        self.records.len() >= self.target
    }

    /// Position the next accepted record will take.
    pub fn next_position(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn records(&self) -> &[HarvestRecord] {
        &self.records
    }

    pub fn keys(&self) -> &DedupStore {
        &self.keys
    }

    pub fn per_strategy(&self) -> &BTreeMap<StrategyKind, usize> {
        &self.per_strategy
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Offer a candidate. It is appended only if the target is not yet met
    /// and its key has never been accepted.
    pub fn offer(&mut self, record: HarvestRecord) -> Offer {
        if self.target_reached() {
            return Offer::TargetReached;
        }
        if !self.keys.accept(&record.primary_key) {
            return Offer::Duplicate;
        }
        debug_assert_eq!(record.position, self.next_position());
        *self
            .per_strategy
            .entry(record.provenance.strategy)
            .or_default() += 1;
        self.records.push(record);
        self.records_since_flush += 1;
        Offer::Accepted
    }

    /// Count one processed term toward the flush cadence.
    pub fn term_processed(&mut self) {
        self.terms_since_flush += 1;
    }

    /// Flush if the cadence says so. Returns whether a flush happened.
    pub fn checkpoint_if_due(&mut self) -> Result<bool, AppError> {
        if !self
            .policy
            .should_flush(self.records_since_flush, self.terms_since_flush)
        {
            return Ok(false);
        }
        self.checkpoint()?;
        Ok(true)
    }

    /// Unconditionally write the current state.
    pub fn checkpoint(&mut self) -> Result<(), AppError> {
        self.writer.flush(&self.records, &self.keys)?;
        tracing::info!(
            run_id = %self.run_id,
            records = self.records.len(),
            added = self.records_since_flush,
            path = %self.writer.path().display(),
            "Progress saved"
        );
        self.records_since_flush = 0;
        self.terms_since_flush = 0;
        self.flushes += 1;
        Ok(())
    }
}
