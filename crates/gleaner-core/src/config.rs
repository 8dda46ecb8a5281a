use std::time::Duration;

use crate::checkpoint::FlushPolicy;
use crate::error::AppError;
use crate::throttle::ThrottleConfig;

/// Tunables for one harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Stop once this many records are accumulated (resumed ones included).
    pub target: usize,
    pub page_size: usize,
    pub batch_size: usize,
    /// Upstream offset ceiling per query.
    pub max_offset: usize,
    pub flush: FlushPolicy,
    pub pacing: ThrottleConfig,
    /// Wait before retrying a rate-limited page.
    pub cooldown: Duration,
    /// Consecutive forbidden responses that abort a strategy.
    pub forbidden_threshold: u32,
    /// Search terms to skip at the start of the sequence.
    pub skip_terms: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target: 40_000,
            page_size: 50,
            batch_size: 50,
            max_offset: 1_000,
            flush: FlushPolicy::default(),
            pacing: ThrottleConfig::default(),
            cooldown: Duration::from_secs(60),
            forbidden_threshold: 5,
            skip_terms: 0,
        }
    }
}

impl HarvestConfig {
    pub fn with_target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_offset(mut self, max_offset: usize) -> Self {
        self.max_offset = max_offset;
        self
    }

    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_pacing(mut self, pacing: ThrottleConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_forbidden_threshold(mut self, threshold: u32) -> Self {
        self.forbidden_threshold = threshold;
        self
    }

    pub fn with_skip_terms(mut self, skip: usize) -> Self {
        self.skip_terms = skip;
        self
    }

    /// Reject values the harvester cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("target", self.target),
            ("page_size", self.page_size),
            ("batch_size", self.batch_size),
            ("max_offset", self.max_offset),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AppError::ConfigError(format!("{name} must be at least 1")));
            }
        }
        if self.forbidden_threshold == 0 {
            return Err(AppError::ConfigError(
                "forbidden_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Read overrides from environment variables on top of the defaults.
    ///
    /// - `GLEANER_TARGET`, `GLEANER_PAGE_SIZE`, `GLEANER_BATCH_SIZE`,
    ///   `GLEANER_MAX_OFFSET`
    /// - `GLEANER_FLUSH_RECORDS`, `GLEANER_FLUSH_TERMS`
    /// - `GLEANER_PACING_MS`, `GLEANER_COOLDOWN_SECS`
    /// - `GLEANER_FORBIDDEN_THRESHOLD`, `GLEANER_SKIP_TERMS`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let number = |key: &str| -> Result<Option<u64>, AppError> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid {key} '{raw}': must be a non-negative integer"
                    ))
                }),
            }
        };

        if let Some(v) = number("GLEANER_TARGET")? {
            config.target = v as usize;
        }
        if let Some(v) = number("GLEANER_PAGE_SIZE")? {
            config.page_size = v as usize;
        }
        if let Some(v) = number("GLEANER_BATCH_SIZE")? {
            config.batch_size = v as usize;
        }
        if let Some(v) = number("GLEANER_MAX_OFFSET")? {
            config.max_offset = v as usize;
        }
        if let Some(v) = number("GLEANER_FLUSH_RECORDS")? {
            config.flush.every_records = v as usize;
        }
        if let Some(v) = number("GLEANER_FLUSH_TERMS")? {
            config.flush.every_terms = v as usize;
        }
        if let Some(v) = number("GLEANER_PACING_MS")? {
            config.pacing.delay = Duration::from_millis(v);
        }
        if let Some(v) = number("GLEANER_COOLDOWN_SECS")? {
            config.cooldown = Duration::from_secs(v);
        }
        if let Some(v) = number("GLEANER_FORBIDDEN_THRESHOLD")? {
            config.forbidden_threshold = u32::try_from(v).map_err(|_| {
                AppError::ConfigError(format!("GLEANER_FORBIDDEN_THRESHOLD {v} is too large"))
            })?;
        }
        if let Some(v) = number("GLEANER_SKIP_TERMS")? {
            config.skip_terms = v as usize;
        }

        config.validate()?;
        Ok(config)
    }
}
