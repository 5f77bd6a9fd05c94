//! In-memory provider returning canned items.

use super::{ItemDetails, ItemRef, SearchProvider, SearchQuery, SearchSession};
use crate::error::{Result, UpstreamError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A canned item and its comments
#[derive(Clone, Debug, PartialEq)]
pub struct StaticItem {
    /// Item returned by `load_details`
    pub details: ItemDetails,
    /// Bodies returned by `comment_bodies`
    pub comments: Vec<String>,
}

#[derive(Clone, Default)]
struct Catalog {
    /// (scope, query) → item ids in result order
    results: HashMap<(String, String), Vec<String>>,
    items: HashMap<String, StaticItem>,
}

/// Provider answering searches from a fixed catalog
///
/// Searches with no registered results return an empty list.
#[derive(Clone, Default)]
pub struct StaticProvider {
    catalog: Arc<Catalog>,
}

impl StaticProvider {
    /// Provider with an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` as a result of searching `query` in `scope`
    ///
    /// Results keep registration order.
    pub fn with_item(mut self, scope: &str, query: &str, item: StaticItem) -> Self {
        let catalog = Arc::make_mut(&mut self.catalog);
        catalog
            .results
            .entry((scope.to_string(), query.to_string()))
            .or_default()
            .push(item.details.id.clone());
        catalog.items.insert(item.details.id.clone(), item);
        self
    }
}

struct StaticSession {
    catalog: Arc<Catalog>,
}

#[async_trait]
impl SearchSession for StaticSession {
    async fn search(&self, query: &SearchQuery) -> std::result::Result<Vec<ItemRef>, UpstreamError> {
        let ids = self
            .catalog
            .results
            .get(&(query.scope.clone(), query.query.clone()))
            .cloned()
            .unwrap_or_default();
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);

        Ok(ids
            .into_iter()
            .take(limit)
            .map(|id| ItemRef {
                id,
                scope: query.scope.clone(),
            })
            .collect())
    }

    async fn load_details(&self, item: &ItemRef) -> std::result::Result<ItemDetails, UpstreamError> {
        self.catalog
            .items
            .get(&item.id)
            .map(|i| i.details.clone())
            .ok_or(UpstreamError::AccessDenied { status: 404 })
    }

    async fn comment_bodies(&self, item: &ItemRef) -> std::result::Result<Vec<String>, UpstreamError> {
        self.catalog
            .items
            .get(&item.id)
            .map(|i| i.comments.clone())
            .ok_or(UpstreamError::AccessDenied { status: 404 })
    }

    async fn close(&self) {}
}

#[async_trait]
impl SearchProvider for StaticProvider {
    async fn open_session(&self) -> Result<Box<dyn SearchSession>> {
        Ok(Box::new(StaticSession {
            catalog: self.catalog.clone(),
        }))
    }

    fn name(&self) -> &str {
        "static"
    }
}
