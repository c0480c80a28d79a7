//! Property search: hard filters followed by cosine-similarity ranking.
//!
//! `PropertySearchEngine` narrows the catalog with the user's hard
//! constraints in a fixed order, embeds the query (through the cache), and
//! returns the top-k survivors as public [`Listing`]s.

use std::sync::{Arc, Mutex};

use broker_core::catalog::Catalog;
use broker_core::error::BrokerError;
use broker_core::types::{Listing, Property, TransactionType};
use tracing::debug;

use crate::cache::EmbeddingCache;
use crate::embedding::{DynEmbeddingService, EmbeddingService};

/// Hard constraints applied before ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub transaction: Option<TransactionType>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl SearchCriteria {
    pub fn has_price_bounds(&self) -> bool {
        self.min_price.is_some() || self.max_price.is_some()
    }
}

/// One step of the hard-filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Transaction,
    Bedrooms,
    Bathrooms,
    Location,
    PropertyType,
    PriceRange,
}

impl FilterStage {
    /// Stages in application order.
    pub const ORDER: [FilterStage; 6] = [
        FilterStage::Transaction,
        FilterStage::Bedrooms,
        FilterStage::Bathrooms,
        FilterStage::Location,
        FilterStage::PropertyType,
        FilterStage::PriceRange,
    ];

    /// Whether a listing survives this stage. Unset constraints pass everything.
    pub fn accepts(&self, listing: &Listing, criteria: &SearchCriteria) -> bool {
        match self {
            FilterStage::Transaction => match criteria.transaction {
                Some(TransactionType::Rent) => listing.is_lease(),
                Some(TransactionType::Buy) => listing.is_for_sale(),
                None => true,
            },
            FilterStage::Bedrooms => criteria
                .bedrooms
                .is_none_or(|n| listing.bedroom_count == Some(n)),
            FilterStage::Bathrooms => criteria
                .bathrooms
                .is_none_or(|n| listing.bath_count == Some(f64::from(n))),
            FilterStage::Location => criteria
                .location
                .as_deref()
                .is_none_or(|term| listing.matches_location(term)),
            FilterStage::PropertyType => criteria
                .property_type
                .as_deref()
                .is_none_or(|t| listing.matches_property_type(t)),
            FilterStage::PriceRange => {
                if !criteria.has_price_bounds() {
                    return true;
                }
                let Some(price) = listing.applicable_price(criteria.transaction) else {
                    return false;
                };
                criteria.min_price.is_none_or(|min| price >= min)
                    && criteria.max_price.is_none_or(|max| price <= max)
            }
        }
    }
}

/// Apply every filter stage in order, stopping early once nothing is left.
pub fn apply_hard_filters<'a>(
    properties: &'a [Property],
    criteria: &SearchCriteria,
) -> Vec<&'a Property> {
    let mut candidates: Vec<&Property> = properties.iter().collect();
    for stage in FilterStage::ORDER {
        if candidates.is_empty() {
            break;
        }
        candidates.retain(|p| stage.accepts(&p.listing, criteria));
    }
    candidates
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Rank candidates by similarity to `query_vec`, best first, keeping `top_k`.
///
/// The sort is stable, so equal scores keep catalog order.
pub fn rank(query_vec: &[f32], candidates: &[&Property], top_k: usize) -> Vec<Listing> {
    let mut scored: Vec<(f64, &Property)> = candidates
        .iter()
        .map(|p| (cosine_similarity(query_vec, &p.embedding), *p))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(top_k)
        .map(|(_, p)| p.to_listing())
        .collect()
}

/// Search engine over the in-memory catalog.
///
/// Uses dynamic dispatch (`Box<dyn DynEmbeddingService>`) so that production
/// code can supply `OpenAiEmbeddingService` while tests use `MockEmbedding`.
pub struct PropertySearchEngine {
    catalog: Arc<Catalog>,
    embedder: Box<dyn DynEmbeddingService>,
    cache: Mutex<EmbeddingCache>,
}

impl PropertySearchEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        embedder: impl EmbeddingService + 'static,
        cache_capacity: usize,
    ) -> Self {
        Self::new_dyn(catalog, Box::new(embedder), cache_capacity)
    }

    pub fn new_dyn(
        catalog: Arc<Catalog>,
        embedder: Box<dyn DynEmbeddingService>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            catalog,
            embedder,
            cache: Mutex::new(EmbeddingCache::new(cache_capacity)),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Embed a query, consulting the cache first.
    pub async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, BrokerError> {
        {
            let cache = self.cache.lock().map_err(|e| {
                BrokerError::Search(format!("embedding cache lock poisoned: {}", e))
            })?;
            if let Some(vector) = cache.get(query) {
                debug!("Embedding cache hit");
                return Ok(vector.clone());
            }
        }

        let vector = self.embedder.embed_boxed(query).await?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|e| BrokerError::Search(format!("embedding cache lock poisoned: {}", e)))?;
        cache.insert(query, vector.clone());
        Ok(vector)
    }

    /// Hard-filter the catalog, then rank the survivors against `query`.
    ///
    /// The query is only embedded when at least one property survives the
    /// filters.
    pub async fn search(
        &self,
        query: &str,
        criteria: &SearchCriteria,
        top_k: usize,
    ) -> Result<Vec<Listing>, BrokerError> {
        let candidates = apply_hard_filters(self.catalog.properties(), criteria);
        debug!(
            candidates = candidates.len(),
            catalog = self.catalog.len(),
            "Hard filters applied"
        );
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.query_embedding(query).await?;
        Ok(rank(&query_vec, &candidates, top_k))
    }

    /// Exact, case-insensitive lookup by name or address.
    pub fn find_exact(&self, name_or_address: &str) -> Option<Listing> {
        self.catalog
            .find_exact(name_or_address)
            .map(Property::to_listing)
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;
    use serde_json::json;

    fn property(value: serde_json::Value, embed_text: &str) -> Property {
        let mut prop: Property = serde_json::from_value(value).unwrap();
        prop.embedding = MockEmbedding::new().vector_for(embed_text);
        prop
    }

    fn fixture_catalog() -> Catalog {
        Catalog::new(vec![
            property(
                json!({"id": "sale", "name": "Ocean Villa", "fullAddress": "9 Dune Rd, Montauk, NY",
                       "propertyType": "House", "salesPrice": 650000, "bedroomCount": 3, "bathCount": 2}),
                "ocean villa montauk house",
            ),
            property(
                json!({"id": "lease", "name": "Brooklyn Loft", "fullAddress": "1 Main St, Brooklyn, NY",
                       "propertyType": "Apartment", "leaseProperty": true, "monthlyRent": 3000,
                       "bedroomCount": 3, "bathCount": 1}),
                "brooklyn loft apartment",
            ),
            property(
                json!({"id": "lease2", "name": "Park Slope Flat", "fullAddress": "7 5th Ave, Brooklyn, NY",
                       "neighborhood": "Park Slope", "propertyType": "Apartment", "leaseProperty": true,
                       "monthlyRent": 5200, "bedroomCount": 2, "bathCount": 1}),
                "park slope flat",
            ),
        ])
    }

    fn engine() -> PropertySearchEngine {
        PropertySearchEngine::new(Arc::new(fixture_catalog()), MockEmbedding::new(), 10)
    }

    fn ids(listings: &[Listing]) -> Vec<&str> {
        listings.iter().map(|l| l.id.as_str()).collect()
    }

    // ---- cosine ----

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    // ---- hard filters ----

    #[test]
    fn test_transaction_filter_respects_listing_kind() {
        let catalog = fixture_catalog();
        let rent = SearchCriteria {
            transaction: Some(TransactionType::Rent),
            ..Default::default()
        };
        let out: Vec<&str> = apply_hard_filters(catalog.properties(), &rent)
            .iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(out, vec!["lease", "lease2"]);

        let buy = SearchCriteria {
            transaction: Some(TransactionType::Buy),
            ..Default::default()
        };
        let out: Vec<&str> = apply_hard_filters(catalog.properties(), &buy)
            .iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(out, vec!["sale"]);
    }

    #[test]
    fn test_price_range_compares_applicable_price() {
        let catalog = fixture_catalog();
        let criteria = SearchCriteria {
            min_price: Some(2000.0),
            max_price: Some(4000.0),
            ..Default::default()
        };
        let out: Vec<&str> = apply_hard_filters(catalog.properties(), &criteria)
            .iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(out, vec!["lease"]);
    }

    #[test]
    fn test_price_bounds_are_inclusive() {
        let catalog = fixture_catalog();
        let criteria = SearchCriteria {
            min_price: Some(3000.0),
            max_price: Some(3000.0),
            ..Default::default()
        };
        assert_eq!(apply_hard_filters(catalog.properties(), &criteria).len(), 1);
    }

    #[test]
    fn test_location_matches_neighborhood() {
        let catalog = fixture_catalog();
        let criteria = SearchCriteria {
            location: Some("park slope".into()),
            ..Default::default()
        };
        let out = apply_hard_filters(catalog.properties(), &criteria);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "lease2");
    }

    #[test]
    fn test_each_stage_narrows() {
        let catalog = fixture_catalog();
        let criteria = SearchCriteria {
            transaction: Some(TransactionType::Rent),
            bedrooms: Some(3),
            bathrooms: Some(1),
            location: Some("brooklyn".into()),
            property_type: Some("apartment".into()),
            min_price: Some(1000.0),
            max_price: None,
        };
        let mut current: Vec<&Property> = catalog.properties().iter().collect();
        for stage in FilterStage::ORDER {
            let before = current.len();
            let next: Vec<&Property> = current
                .iter()
                .copied()
                .filter(|p| stage.accepts(&p.listing, &criteria))
                .collect();
            assert!(next.len() <= before);
            assert!(next.iter().all(|p| current.iter().any(|c| c.id() == p.id())));
            current = next;
        }
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id(), "lease");
    }

    // ---- ranking ----

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let engine = engine();
        let results = engine
            .search("brooklyn loft apartment", &SearchCriteria::default(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "lease");
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let engine = engine();
        let criteria = SearchCriteria {
            transaction: Some(TransactionType::Rent),
            ..Default::default()
        };
        let first = engine.search("quiet flat", &criteria, 5).await.unwrap();
        let second = engine.search("quiet flat", &criteria, 5).await.unwrap();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(engine.cached_queries(), 1);
    }

    #[tokio::test]
    async fn test_top_k_truncates() {
        let engine = engine();
        let results = engine
            .search("anything", &SearchCriteria::default(), 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_filter_result_skips_embedding() {
        let engine = engine();
        let criteria = SearchCriteria {
            bedrooms: Some(9),
            ..Default::default()
        };
        // An empty query would fail to embed; the early return avoids that.
        let results = engine.search("", &criteria, 5).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(engine.cached_queries(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let engine = engine();
        let result = engine.search("", &SearchCriteria::default(), 5).await;
        assert!(matches!(result, Err(BrokerError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_cache_normalizes_queries() {
        let engine = engine();
        engine.query_embedding("Brooklyn ").await.unwrap();
        engine.query_embedding("brooklyn").await.unwrap();
        assert_eq!(engine.cached_queries(), 1);
    }

    #[test]
    fn test_find_exact_returns_listing() {
        let engine = engine();
        let listing = engine.find_exact("BROOKLYN LOFT").unwrap();
        assert_eq!(listing.id, "lease");
        assert!(engine.find_exact("brooklyn").is_none());
    }
}
