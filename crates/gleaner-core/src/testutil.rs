//! Test utilities: a scripted in-memory catalog client.
//!
//! All state lives behind `Arc<Mutex<_>>` so clones share it and tests can
//! assert on the recorded requests afterwards.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::CatalogItem;
use crate::traits::{CatalogClient, Credential};

/// A request observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRequest {
    Token,
    Search {
        query: String,
        page_size: usize,
        offset: usize,
    },
    Collection {
        id: String,
        page_size: usize,
        offset: usize,
    },
    Batch {
        ids: Vec<String>,
    },
}

/// Mock client serving fixed result sets, paged by offset.
///
/// Queued errors are returned (one per call) before any result is served
/// for that endpoint.
#[derive(Clone, Default)]
pub struct MockCatalogClient {
    search_results: Arc<Mutex<HashMap<String, Vec<Option<CatalogItem>>>>>,
    collections: Arc<Mutex<HashMap<String, Vec<Option<CatalogItem>>>>>,
    lookup: Arc<Mutex<HashMap<String, CatalogItem>>>,
    search_errors: Arc<Mutex<VecDeque<AppError>>>,
    collection_errors: Arc<Mutex<VecDeque<AppError>>>,
    batch_errors: Arc<Mutex<VecDeque<AppError>>>,
    /// Search queries that always answer 403.
    forbidden_searches: Arc<Mutex<HashSet<String>>>,
    /// Delay before every search response.
    delay: Option<Duration>,
    /// When set, any search query returns an endless stream of unique items.
    unlimited: bool,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlimited() -> Self {
        Self {
            unlimited: true,
            ..Self::default()
        }
    }

    pub fn with_search(self, query: &str, items: Vec<CatalogItem>) -> Self {
        self.search_results
            .lock()
            .unwrap()
            .insert(query.to_string(), items.into_iter().map(Some).collect());
        self
    }

    pub fn with_raw_search(self, query: &str, items: Vec<Option<CatalogItem>>) -> Self {
        self.search_results
            .lock()
            .unwrap()
            .insert(query.to_string(), items);
        self
    }

    pub fn with_collection(self, id: &str, items: Vec<CatalogItem>) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(id.to_string(), items.into_iter().map(Some).collect());
        self
    }

    pub fn with_lookup(self, items: Vec<CatalogItem>) -> Self {
        {
            let mut lookup = self.lookup.lock().unwrap();
            for item in items {
                if let Some(id) = item.id.clone() {
                    lookup.insert(id, item);
                }
            }
        }
        self
    }

    pub fn with_forbidden_search(self, query: &str) -> Self {
        self.forbidden_searches
            .lock()
            .unwrap()
            .insert(query.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_search_error(&self, error: AppError) {
        self.search_errors.lock().unwrap().push_back(error);
    }

    pub fn push_collection_error(&self, error: AppError) {
        self.collection_errors.lock().unwrap().push_back(error);
    }

    pub fn push_batch_error(&self, error: AppError) {
        self.batch_errors.lock().unwrap().push_back(error);
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn search_offsets(&self, query: &str) -> Vec<usize> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                RecordedRequest::Search {
                    query: q, offset, ..
                } if q == query => Some(offset),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

/// `count` items with keys `{prefix}-{start}` onwards.
pub fn items(prefix: &str, start: usize, count: usize) -> Vec<CatalogItem> {
    (start..start + count)
        .map(|i| CatalogItem::new(format!("{prefix}-{i}"), format!("Track {i}")).with_artist("Someone"))
        .collect()
}

fn page(all: &[Option<CatalogItem>], page_size: usize, offset: usize) -> Vec<Option<CatalogItem>> {
    all.iter().skip(offset).take(page_size).cloned().collect()
}

impl CatalogClient for MockCatalogClient {
    async fn fetch_token(&self) -> Result<Credential, AppError> {
        self.record(RecordedRequest::Token);
        Ok(Credential {
            access_token: "test-token".into(),
            expires_in: Duration::from_secs(3600),
        })
    }

    async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.record(RecordedRequest::Search {
            query: query.to_string(),
            page_size,
            offset,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.search_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.forbidden_searches.lock().unwrap().contains(query) {
            return Err(AppError::Forbidden(format!("HTTP 403 for {query}")));
        }
        if self.unlimited {
            return Ok(items(query, offset, page_size).into_iter().map(Some).collect());
        }
        let results = self.search_results.lock().unwrap();
        Ok(results
            .get(query)
            .map(|all| page(all, page_size, offset))
            .unwrap_or_default())
    }

    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.record(RecordedRequest::Collection {
            id: collection_id.to_string(),
            page_size,
            offset,
        });
        if let Some(err) = self.collection_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection_id)
            .map(|all| page(all, page_size, offset))
            .unwrap_or_default())
    }

    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.record(RecordedRequest::Batch { ids: ids.to_vec() });
        if let Some(err) = self.batch_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let lookup = self.lookup.lock().unwrap();
        Ok(ids.iter().map(|id| lookup.get(id).cloned()).collect())
    }
}
