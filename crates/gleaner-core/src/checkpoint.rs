//! Durable snapshots of the accumulated records and dedup key set.
//!
//! A checkpoint is a `;`-delimited, fully quoted file with one row per
//! record. The dedup key set is rebuilt from the `primary_key` column on
//! load. The attribution column holds a JSON array of names. Writes go to `<path>.tmp` and are renamed over the committed file,
//! so an interrupted flush never damages the last good checkpoint.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dedup::DedupStore;
use crate::error::AppError;
use crate::models::{HarvestRecord, Provenance, StrategyKind};

const DELIMITER: u8 = b';';

/// Snapshot of accumulated state.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub records: Vec<HarvestRecord>,
    pub keys: DedupStore,
}

impl Checkpoint {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// On-disk row layout.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRow {
    position: u64,
    primary_key: String,
    display_name: String,
    attribution: String,
    source_category: String,
    popularity: u32,
    duration_ms: u64,
    strategy: String,
    origin: String,
}

impl CheckpointRow {
    fn from_record(record: &HarvestRecord) -> Result<Self, AppError> {
        Ok(Self {
            position: record.position,
            primary_key: record.primary_key.clone(),
            display_name: record.display_name.clone(),
            attribution: serde_json::to_string(&record.attribution)?,
            source_category: record.source_category.clone(),
            popularity: record.popularity,
            duration_ms: record.duration_ms,
            strategy: record.provenance.strategy.as_str().to_string(),
            origin: record.provenance.origin.clone(),
        })
    }

    fn into_record(self, position: u64) -> Result<HarvestRecord, AppError> {
        let strategy: StrategyKind = self
            .strategy
            .parse()
            .map_err(AppError::CheckpointError)?;
        let attribution: Vec<String> = if self.attribution.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.attribution).map_err(|e| {
                AppError::CheckpointError(format!(
                    "bad attribution for {}: {e}",
                    self.primary_key
                ))
            })?
        };
        Ok(HarvestRecord {
            position,
            primary_key: self.primary_key,
            display_name: self.display_name,
            attribution,
            source_category: self.source_category,
            popularity: self.popularity,
            duration_ms: self.duration_ms,
            provenance: Provenance::new(strategy, self.origin),
        })
    }
}

/// When to flush: after `every_records` newly accepted records or
/// `every_terms` processed terms, whichever comes first. Zero disables
/// that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub every_records: usize,
    pub every_terms: usize,
}

impl FlushPolicy {
    pub fn should_flush(&self, records_since: usize, terms_since: usize) -> bool {
        (self.every_records > 0 && records_since >= self.every_records)
            || (self.every_terms > 0 && terms_since >= self.every_terms)
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            every_records: 100,
            every_terms: 5,
        }
    }
}

/// Owns the checkpoint file. One writer per file.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    path: PathBuf,
}

impl CheckpointWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the staging file written before commit.
    pub fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Load the committed checkpoint, or an empty one if none exists.
    ///
    /// Rows repeating an earlier key are dropped and positions are
    /// renumbered from 1.
    pub fn load(&self) -> Result<Checkpoint, AppError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No checkpoint found, starting fresh");
            return Ok(Checkpoint::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .from_path(&self.path)?;

        let mut checkpoint = Checkpoint::default();
        let mut dropped = 0usize;
        for row in reader.deserialize::<CheckpointRow>() {
            let row = row?;
            if !checkpoint.keys.accept(&row.primary_key) {
                dropped += 1;
                continue;
            }
            let position = checkpoint.records.len() as u64 + 1;
            checkpoint.records.push(row.into_record(position)?);
        }

        if dropped > 0 {
            tracing::warn!(dropped, "Dropped duplicate rows from checkpoint");
        }
        tracing::info!(
            path = %self.path.display(),
            records = checkpoint.records.len(),
            "Loaded checkpoint"
        );
        Ok(checkpoint)
    }

    /// Write the full state and commit it atomically.
    pub fn flush(&self, records: &[HarvestRecord], keys: &DedupStore) -> Result<(), AppError> {
        self.stage(records, keys)?.commit()
    }

    /// Write the full state to the staging file without committing it.
    pub fn stage(
        &self,
        records: &[HarvestRecord],
        keys: &DedupStore,
    ) -> Result<StagedCheckpoint<'_>, AppError> {
        if let Some(record) = records.iter().find(|r| !keys.contains(&r.primary_key)) {
            return Err(AppError::CheckpointError(format!(
                "record {} is missing from the dedup key set",
                record.primary_key
            )));
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.temp_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);
        for record in records {
            writer.serialize(CheckpointRow::from_record(record)?)?;
        }
        writer.flush()?;
        let file: File = writer
            .into_inner()
            .map_err(|e| AppError::CheckpointError(e.to_string()))?;
        file.sync_all()?;

        Ok(StagedCheckpoint {
            writer: self,
            tmp_path,
            records: records.len(),
        })
    }
}

/// A fully written staging file awaiting commit.
#[must_use = "a staged checkpoint is not durable until committed"]
#[derive(Debug)]
pub struct StagedCheckpoint<'a> {
    writer: &'a CheckpointWriter,
    tmp_path: PathBuf,
    records: usize,
}

impl StagedCheckpoint<'_> {
    /// Atomically replace the committed checkpoint with the staged one.
    pub fn commit(self) -> Result<(), AppError> {
        fs::rename(&self.tmp_path, &self.writer.path).map_err(|e| {
            AppError::CheckpointError(format!(
                "failed to commit {}: {e}",
                self.writer.path.display()
            ))
        })?;
        tracing::debug!(
            path = %self.writer.path.display(),
            records = self.records,
            "Checkpoint committed"
        );
        Ok(())
    }
}
