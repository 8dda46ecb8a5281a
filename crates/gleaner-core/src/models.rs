use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Retrieval strategy that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Search,
    #[serde(rename = "collections")]
    CuratedCollections,
    #[serde(rename = "batch")]
    DirectBatch,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Search,
        StrategyKind::CuratedCollections,
        StrategyKind::DirectBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Search => "search",
            StrategyKind::CuratedCollections => "collections",
            StrategyKind::DirectBatch => "batch",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" => Ok(StrategyKind::Search),
            "collections" => Ok(StrategyKind::CuratedCollections),
            "batch" => Ok(StrategyKind::DirectBatch),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

/// Where a record came from: the strategy plus the term literal,
/// collection id, or `"batch"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub strategy: StrategyKind,
    pub origin: String,
}

impl Provenance {
    pub fn new(strategy: StrategyKind, origin: impl Into<String>) -> Self {
        Self {
            strategy,
            origin: origin.into(),
        }
    }
}

/// One contributing entity of a catalog item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Contributor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A raw item as returned by the upstream catalog.
///
/// Every field is optional; [`HarvestRecord::from_item`] decides whether
/// the item is usable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<Contributor>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_local: bool,
}

/// Explicit `null` decodes like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl CatalogItem {
    /// Convenience constructor used by tests and simulated upstreams.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_artist(mut self, name: impl Into<String>) -> Self {
        self.artists.push(Contributor {
            id: None,
            name: Some(name.into()),
        });
        self
    }
}

/// An accepted catalog entry. Never mutated after acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRecord {
    /// 1-based position in the accumulated dataset.
    pub position: u64,
    pub primary_key: String,
    pub display_name: String,
    pub attribution: Vec<String>,
    pub source_category: String,
    pub popularity: u32,
    pub duration_ms: u64,
    pub provenance: Provenance,
}

impl HarvestRecord {
    /// Build a record from a raw item.
    ///
    /// Fails with [`AppError::MalformedItem`] when the item has no key,
    /// no display name, or is a local-only entry.
    pub fn from_item(
        item: &CatalogItem,
        category: &str,
        provenance: Provenance,
        position: u64,
    ) -> Result<Self, AppError> {
        let primary_key = item
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::MalformedItem("item has no id".into()))?;

        if item.is_local {
            return Err(AppError::MalformedItem(format!(
                "item {primary_key} is local-only"
            )));
        }

        let display_name = item
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::MalformedItem(format!("item {primary_key} has no name")))?;

        let attribution = item
            .artists
            .iter()
            .filter_map(|artist| artist.name.clone())
            .filter(|name| !name.is_empty())
            .collect();

        Ok(Self {
            position,
            primary_key: primary_key.to_string(),
            display_name: display_name.to_string(),
            attribution,
            source_category: category.to_string(),
            popularity: item.popularity.unwrap_or(0),
            duration_ms: item.duration_ms.unwrap_or(0),
            provenance,
        })
    }
}
