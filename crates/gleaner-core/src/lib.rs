pub mod checkpoint;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod harvest;
pub mod models;
pub mod reporter;
pub mod session;
pub mod summary;
pub mod terms;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use checkpoint::{Checkpoint, CheckpointWriter, FlushPolicy};
pub use config::HarvestConfig;
pub use dedup::DedupStore;
pub use error::{AppError, ErrorClass};
pub use fetcher::{ForbiddenGuard, PageFetcher, PaginationCursor, Query, TermEnd, TermOutcome};
pub use harvest::{Harvester, StrategyState};
pub use models::{CatalogItem, Contributor, HarvestRecord, Provenance, StrategyKind};
pub use reporter::{HarvestEvent, HarvestReporter, TracingHarvestReporter};
pub use session::{HarvestSession, Offer};
pub use summary::{DatasetStats, HarvestSummary};
pub use terms::{CuratedCollection, SearchTerm, TermCatalog};
pub use throttle::{ThrottleConfig, ThrottledClient};
pub use traits::{CatalogClient, Credential};
