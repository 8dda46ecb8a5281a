use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::models::CatalogItem;

/// Access credential returned by the upstream token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Authenticated access to the upstream catalog API.
///
/// Pages are returned as `Option`s so that null entries inside an otherwise
/// valid page survive until the fetcher can skip them one by one.
pub trait CatalogClient: Send + Sync + Clone {
    /// Obtain (or refresh) the access credential.
    fn fetch_token(&self) -> impl Future<Output = Result<Credential, AppError>> + Send;

    /// One page of keyword/attribute search results.
    fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<Option<CatalogItem>>, AppError>> + Send;

    /// One page of a curated collection's entries.
    fn collection_page(
        &self,
        collection_id: &str,
        page_size: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<Option<CatalogItem>>, AppError>> + Send;

    /// Direct lookup by id. One slot per requested id, `None` when unknown.
    fn fetch_batch(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<Option<CatalogItem>>, AppError>> + Send;
}
