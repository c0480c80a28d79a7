//! Address geocoding.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use broker_core::config::LocationConfig;
use serde::Deserialize;
use tracing::debug;

use crate::distance::Coordinates;
use crate::error::LocationError;

/// Resolves a free-text address to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns `Ok(None)` when the service has no match for the address.
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, LocationError>;
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Geocoder backed by the OpenStreetMap Nominatim search API.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &LocationConfig) -> Result<Self, LocationError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.nominatim_url.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, LocationError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LocationError::Status(status.as_u16()));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        let Some(place) = places.into_iter().next() else {
            debug!(address, "No geocoding match");
            return Ok(None);
        };

        let lat = place
            .lat
            .parse::<f64>()
            .map_err(|e| LocationError::Decode(format!("lat: {}", e)))?;
        let lng = place
            .lon
            .parse::<f64>()
            .map_err(|e| LocationError::Decode(format!("lon: {}", e)))?;
        Ok(Some(Coordinates::new(lat, lng)))
    }
}

/// Fixed address table, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    places: HashMap<String, Coordinates>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, address: &str, coordinates: Coordinates) -> Self {
        self.places
            .insert(address.trim().to_lowercase(), coordinates);
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, LocationError> {
        Ok(self.places.get(&address.trim().to_lowercase()).copied())
    }
}
