//! The property catalog and its read-only views.
//!
//! The catalog is loaded once at startup from a JSON array of property
//! records and never mutated afterwards.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BrokerError, Result};
use crate::types::{Listing, Property};

/// Default page size for catalog listings.
pub const DEFAULT_PAGE_LIMIT: usize = 12;

/// In-memory, read-only property catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    properties: Vec<Property>,
}

impl Catalog {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    /// Load the catalog from a JSON file containing an array of properties.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            properties = catalog.len(),
            "Property catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let properties: Vec<Property> = serde_json::from_str(content)
            .map_err(|e| BrokerError::Catalog(format!("invalid catalog JSON: {}", e)))?;
        Ok(Self::new(properties))
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Look up a property by its identifier.
    pub fn get(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.id() == id)
    }

    /// Exact, case-insensitive lookup by name, then by full address.
    pub fn find_exact(&self, name_or_address: &str) -> Option<&Property> {
        let wanted = name_or_address.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.properties
            .iter()
            .find(|p| p.listing.name.to_lowercase() == wanted)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|p| p.listing.full_address.to_lowercase() == wanted)
            })
    }

    /// Distinct place names users can search by, sorted.
    ///
    /// Collects the second-to-last comma-separated address component, the
    /// neighborhood and the city of every property, keeping names longer than
    /// two characters.
    pub fn available_locations(&self) -> Vec<String> {
        let mut locations = BTreeSet::new();
        for prop in &self.properties {
            let parts: Vec<&str> = prop.listing.full_address.split(',').collect();
            if parts.len() > 1 {
                locations.insert(parts[parts.len() - 2].trim().to_string());
            }
            if let Some(ref n) = prop.listing.neighborhood {
                locations.insert(n.trim().to_string());
            }
            if let Some(ref c) = prop.listing.city {
                locations.insert(c.trim().to_string());
            }
        }
        locations
            .into_iter()
            .filter(|l| l.chars().count() > 2 && l != "None")
            .collect()
    }

    /// Filter and paginate the catalog for the listing view.
    pub fn query(&self, query: &CatalogQuery) -> CatalogPage {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);

        let filtered: Vec<&Listing> = self
            .properties
            .iter()
            .map(|p| &p.listing)
            .filter(|l| query.accepts(l))
            .collect();

        let total = filtered.len();
        let total_pages = total.div_ceil(limit);
        let properties = filtered
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .map(CatalogItem::from)
            .collect();

        CatalogPage {
            properties,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1,
            },
        }
    }
}

/// Query parameters for the catalog listing view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    /// Substring over name, address and description.
    pub search: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub location: Option<String>,
    pub property_type: Option<String>,
    /// "buy" or "rent".
    pub transaction_type: Option<String>,
}

impl CatalogQuery {
    fn accepts(&self, listing: &Listing) -> bool {
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let hit = listing.name.to_lowercase().contains(&needle)
                || listing.full_address.to_lowercase().contains(&needle)
                || listing.description.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }

        // The listing view bounds compare sale prices only.
        let sale_price = listing.sales_price.filter(|p| *p != 0.0);
        if let Some(min) = self.price_min {
            if !sale_price.is_some_and(|p| p >= min) {
                return false;
            }
        }
        if let Some(max) = self.price_max {
            if !sale_price.is_some_and(|p| p <= max) {
                return false;
            }
        }

        if let Some(beds) = self.bedrooms {
            if listing.bedroom_count != Some(beds) {
                return false;
            }
        }
        if let Some(baths) = self.bathrooms {
            if listing.bath_count != Some(baths) {
                return false;
            }
        }
        if let Some(ref location) = self.location {
            if !listing.matches_location(location) {
                return false;
            }
        }
        if let Some(ref ptype) = self.property_type {
            if !listing.matches_property_type(ptype) {
                return false;
            }
        }

        match self.transaction_type.as_deref().map(str::to_lowercase).as_deref() {
            Some("buy") => sale_price.is_some(),
            Some("rent") => sale_price.is_none(),
            _ => true,
        }
    }
}

/// Pagination metadata for the listing view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One formatted entry of the listing view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sales_price: Option<f64>,
    pub full_address: String,
    pub location: String,
    pub bedroom_count: Option<u32>,
    pub bath_count: Option<f64>,
    pub square_feet: Option<serde_json::Value>,
    pub living_space_size: Option<serde_json::Value>,
    pub image: Vec<serde_json::Value>,
    pub media: Vec<serde_json::Value>,
    pub slug: String,
}

impl From<&Listing> for CatalogItem {
    fn from(l: &Listing) -> Self {
        Self {
            id: l.id.clone(),
            name: l.name.clone(),
            description: l.description.clone(),
            sales_price: l.sales_price,
            full_address: l.full_address.clone(),
            location: l.full_address.clone(),
            bedroom_count: l.bedroom_count,
            bath_count: l.bath_count,
            square_feet: l.living_space_size.clone(),
            living_space_size: l.living_space_size.clone(),
            image: l.media.clone(),
            media: l.media.clone(),
            slug: l.slug.clone().unwrap_or_default(),
        }
    }
}

/// A page of the listing view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub properties: Vec<CatalogItem>,
    pub pagination: Pagination,
}
