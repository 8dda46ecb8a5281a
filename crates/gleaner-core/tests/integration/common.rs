use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gleaner_core::{
    AppError, CatalogClient, CatalogItem, CheckpointWriter, Credential, FlushPolicy,
    HarvestConfig, Harvester, TermCatalog, ThrottleConfig,
};
use tokio_util::sync::CancellationToken;

/// A request seen by the simulated upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search { query: String, offset: usize },
    Collection { id: String, offset: usize },
    Batch { ids: Vec<String> },
}

#[derive(Default)]
struct State {
    /// Query → full result list. Queries not listed yield an endless stream
    /// when `endless` is set, else nothing.
    corpus: HashMap<String, Vec<CatalogItem>>,
    collections: HashMap<String, Vec<CatalogItem>>,
    endless: bool,
    /// Queries answered with 403.
    forbidden: Vec<String>,
    calls: Vec<Call>,
    /// Cancel this token once `cancel_after` paged calls were served.
    cancel_after: Option<(usize, CancellationToken)>,
}

/// In-memory stand-in for the catalog API.
#[derive(Clone, Default)]
pub struct SimulatedCatalog {
    state: Arc<Mutex<State>>,
}

impl SimulatedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unknown search query returns unique, never-ending results.
    pub fn endless() -> Self {
        let catalog = Self::default();
        catalog.state.lock().unwrap().endless = true;
        catalog
    }

    pub fn with_results(self, query: &str, keys: &[&str]) -> Self {
        let items = keys.iter().map(|k| item(k)).collect();
        self.state
            .lock()
            .unwrap()
            .corpus
            .insert(query.to_string(), items);
        self
    }

    pub fn with_collection(self, id: &str, prefix: &str, count: usize) -> Self {
        let items = (0..count).map(|i| item(&format!("{prefix}-{i}"))).collect();
        self.state
            .lock()
            .unwrap()
            .collections
            .insert(id.to_string(), items);
        self
    }

    pub fn forbid(self, query: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .forbidden
            .push(query.to_string());
        self
    }

    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((calls, token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn search_offsets(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search { query, offset } => Some((query, offset)),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        let served = state.calls.len();
        if let Some((limit, token)) = &state.cancel_after
            && served >= *limit
        {
            token.cancel();
        }
    }
}

pub fn item(key: &str) -> CatalogItem {
    CatalogItem::new(key, format!("Title {key}")).with_artist("Artist")
}

fn page_of(items: &[CatalogItem], page_size: usize, offset: usize) -> Vec<Option<CatalogItem>> {
    items
        .iter()
        .skip(offset)
        .take(page_size)
        .cloned()
        .map(Some)
        .collect()
}

impl CatalogClient for SimulatedCatalog {
    async fn fetch_token(&self) -> Result<Credential, AppError> {
        Ok(Credential {
            access_token: "simulated".into(),
            expires_in: Duration::from_secs(3600),
        })
    }

    async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.log(Call::Search {
            query: query.to_string(),
            offset,
        });
        let state = self.state.lock().unwrap();
        if state.forbidden.iter().any(|q| q == query) {
            return Err(AppError::Forbidden(format!("HTTP 403 for {query}")));
        }
        if let Some(items) = state.corpus.get(query) {
            return Ok(page_of(items, page_size, offset));
        }
        if state.endless {
            return Ok((offset..offset + page_size)
                .map(|i| Some(item(&format!("{query}#{i}"))))
                .collect());
        }
        Ok(Vec::new())
    }

    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.log(Call::Collection {
            id: collection_id.to_string(),
            offset,
        });
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .get(collection_id)
            .map(|items| page_of(items, page_size, offset))
            .unwrap_or_default())
    }

    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.log(Call::Batch { ids: ids.to_vec() });
        Ok(ids.iter().map(|id| Some(item(id))).collect())
    }
}

/// Search terms `genre:<tag>` for each tag, nothing else.
pub fn genre_terms(tags: &[&str]) -> TermCatalog {
    TermCatalog {
        year_start: 0,
        year_end: 0,
        year_step: 1,
        attributions: vec![],
        categories: tags.iter().map(|t| t.to_string()).collect(),
        keywords: vec![],
    }
}

/// Small pages, no pacing, no cool-down.
pub fn fast_config(target: usize) -> HarvestConfig {
    HarvestConfig::default()
        .with_target(target)
        .with_page_size(10)
        .with_batch_size(10)
        .with_max_offset(100)
        .with_cooldown(Duration::ZERO)
        .with_pacing(ThrottleConfig::new(Duration::ZERO))
        .with_flush(FlushPolicy {
            every_records: 10,
            every_terms: 1,
        })
}

pub fn harvester(
    catalog: &SimulatedCatalog,
    path: &Path,
    config: HarvestConfig,
    tags: &[&str],
) -> Harvester<SimulatedCatalog> {
    Harvester::new(catalog.clone(), CheckpointWriter::new(path), config)
        .with_terms(genre_terms(tags))
        .with_collections(vec![])
}
