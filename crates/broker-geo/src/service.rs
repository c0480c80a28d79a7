//! Location lookups as the dialogue consumes them.
//!
//! Converts source distances to miles, applies the per-lookup cutoff and
//! cap, and caches per-address enrichment for listing detail views.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use broker_core::config::LocationConfig;
use broker_core::types::Listing;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance::{km_to_miles, round2, Coordinates};
use crate::error::LocationError;
use crate::geocode::Geocoder;
use crate::poi::{PoiCategory, PoiSource, RawPoi};

/// A nearby place with its distance in miles (two decimals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "distance")]
    pub distance_miles: f64,
    pub description: String,
}

/// Location facts attached to a listing detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub coordinates: Coordinates,
    pub nearby_schools: Vec<PointOfInterest>,
    pub nearby_attractions: Vec<PointOfInterest>,
}

/// A listing with optional location facts flattened into it.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedListing {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(flatten)]
    pub location: Option<LocationData>,
}

struct LookupLimits {
    radius_m: u32,
    cutoff_miles: f64,
    cap: usize,
}

/// Geocoding plus points-of-interest lookups with display rules applied.
pub struct LocationService {
    geocoder: Arc<dyn Geocoder>,
    pois: Arc<dyn PoiSource>,
    radius_m: u32,
    attraction_radius_m: u32,
    cache: Mutex<HashMap<String, LocationData>>,
}

impl LocationService {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        pois: Arc<dyn PoiSource>,
        config: &LocationConfig,
    ) -> Self {
        Self {
            geocoder,
            pois,
            radius_m: config.radius_meters,
            attraction_radius_m: config.attraction_radius_meters,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, LocationError> {
        self.geocoder.geocode(address).await
    }

    fn limits(&self, category: PoiCategory) -> LookupLimits {
        match category {
            PoiCategory::Schools => LookupLimits {
                radius_m: self.radius_m,
                cutoff_miles: 5.0,
                cap: 5,
            },
            PoiCategory::Attractions => LookupLimits {
                radius_m: self.attraction_radius_m,
                cutoff_miles: 3.0,
                cap: 8,
            },
            _ => LookupLimits {
                radius_m: self.radius_m,
                cutoff_miles: 5.0,
                cap: 10,
            },
        }
    }

    /// Places of `category` near `center`, nearest first.
    pub async fn nearby(
        &self,
        center: Coordinates,
        category: PoiCategory,
    ) -> Result<Vec<PointOfInterest>, LocationError> {
        let limits = self.limits(category);
        let raw = self.pois.query(center, limits.radius_m, category).await?;
        Ok(shape(raw, limits.cutoff_miles, limits.cap))
    }

    /// Attach coordinates, schools and attractions to a listing.
    ///
    /// Results are cached per address. Lookup failures degrade to the plain
    /// listing (or to empty POI lists) and are only logged.
    pub async fn enrich(&self, listing: Listing) -> EnrichedListing {
        let address = listing.full_address.trim().to_string();
        if address.is_empty() {
            return EnrichedListing {
                listing,
                location: None,
            };
        }

        if let Some(cached) = self.cached(&address) {
            debug!(address = %address, "Location cache hit");
            return EnrichedListing {
                listing,
                location: Some(cached),
            };
        }

        let coordinates = match self.geocoder.geocode(&address).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                return EnrichedListing {
                    listing,
                    location: None,
                }
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Geocoding failed during enrichment");
                return EnrichedListing {
                    listing,
                    location: None,
                };
            }
        };

        let nearby_schools = self
            .nearby(coordinates, PoiCategory::Schools)
            .await
            .unwrap_or_else(|e| {
                warn!(address = %address, error = %e, "Failed to fetch schools");
                Vec::new()
            });
        let nearby_attractions = self
            .nearby(coordinates, PoiCategory::Attractions)
            .await
            .unwrap_or_else(|e| {
                warn!(address = %address, error = %e, "Failed to fetch attractions");
                Vec::new()
            });

        let data = LocationData {
            coordinates,
            nearby_schools,
            nearby_attractions,
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(address, data.clone());
        }

        EnrichedListing {
            listing,
            location: Some(data),
        }
    }

    fn cached(&self, address: &str) -> Option<LocationData> {
        self.cache.lock().ok()?.get(address).cloned()
    }
}

/// Convert to miles, drop anything past the cutoff, sort, and cap.
fn shape(raw: Vec<RawPoi>, cutoff_miles: f64, cap: usize) -> Vec<PointOfInterest> {
    let mut pois: Vec<PointOfInterest> = raw
        .into_iter()
        .filter_map(|p| {
            let miles = km_to_miles(p.distance_km);
            if miles > cutoff_miles {
                return None;
            }
            Some(PointOfInterest {
                name: p.name,
                kind: p.category,
                distance_miles: round2(miles),
                description: p.description,
            })
        })
        .collect();
    pois.sort_by(|a, b| {
        a.distance_miles
            .partial_cmp(&b.distance_miles)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pois.truncate(cap);
    pois
}
