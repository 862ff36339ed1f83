//! Fixed in-memory graph fetcher.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::RelationKind;

use super::traits::GraphFetcher;

/// A [`GraphFetcher`] answering from fixed product and category tables.
///
/// Keys absent from the tables are reported as unknown.
#[derive(Debug, Clone, Default)]
pub struct StaticGraphFetcher {
    products: HashMap<String, Vec<String>>,
    categories: HashMap<String, Vec<String>>,
}

impl StaticGraphFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fetcher from product → categories and category → groups tables.
    pub fn from_tables(
        products: HashMap<String, Vec<String>>,
        categories: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            products,
            categories,
        }
    }

    /// The small demonstration catalog: balls, toys, soccer balls and teddy bears.
    pub fn with_catalog_defaults() -> Self {
        Self::new()
            .with_product("soccerBall", ["toys", "balls", "sport"])
            .with_product("teddyBear", ["toys"])
            .with_category("balls", ["group-a-1", "group-b"])
            .with_category("toys", ["group-b", "group-c"])
    }

    pub fn with_product<I, S>(mut self, product: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products.insert(
            product.into(),
            categories.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_category<I, S>(mut self, category: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .insert(category.into(), groups.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl GraphFetcher for StaticGraphFetcher {
    async fn fetch_parents(
        &self,
        kind: RelationKind,
        key: &str,
    ) -> DomainResult<Option<Vec<String>>> {
        let table = match kind {
            RelationKind::Product => &self.products,
            RelationKind::Category => &self.categories,
        };
        Ok(table.get(key).cloned())
    }
}
