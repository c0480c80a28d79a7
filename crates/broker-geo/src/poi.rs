//! Points-of-interest categories and map-data sources.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use broker_core::config::LocationConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::{haversine_km, Coordinates};
use crate::error::LocationError;

/// Kind of place a user can ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Hospitals,
    Schools,
    Parks,
    Restaurants,
    Shopping,
    Banks,
    Pharmacies,
    GasStations,
    Attractions,
    All,
}

/// Keyword table consulted in declaration order; the first hit wins.
const CATEGORY_KEYWORDS: &[(PoiCategory, &[&str])] = &[
    (
        PoiCategory::Hospitals,
        &["hospital", "hospitals", "medical", "healthcare", "clinic", "clinics"],
    ),
    (
        PoiCategory::Schools,
        &[
            "school", "schools", "education", "educational", "university", "universities",
            "college", "colleges",
        ],
    ),
    (
        PoiCategory::Parks,
        &[
            "park", "parks", "recreation", "recreational", "playground", "playgrounds", "garden",
            "gardens",
        ],
    ),
    (
        PoiCategory::Restaurants,
        &["restaurant", "restaurants", "dining", "food", "cafe", "cafes", "coffee"],
    ),
    (
        PoiCategory::Shopping,
        &["shopping", "shop", "shops", "store", "stores", "mall", "malls", "retail"],
    ),
    (
        PoiCategory::Banks,
        &["bank", "banks", "atm", "banking", "financial"],
    ),
    (
        PoiCategory::Pharmacies,
        &["pharmacy", "pharmacies", "drugstore", "medicine", "prescription"],
    ),
    (
        PoiCategory::GasStations,
        &["gas", "fuel", "station", "stations", "gasoline", "petrol"],
    ),
    (
        PoiCategory::Attractions,
        &[
            "attraction", "attractions", "tourist", "tourism", "museum", "museums", "gallery",
            "galleries",
        ],
    ),
];

impl PoiCategory {
    /// Infer the category a message asks about, defaulting to `All`.
    pub fn from_query(query: &str) -> Self {
        let lower = query.to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(PoiCategory::All)
    }

    /// Human-readable plural used in replies.
    pub fn label(&self) -> &'static str {
        match self {
            PoiCategory::Hospitals => "hospitals",
            PoiCategory::Schools => "schools",
            PoiCategory::Parks => "parks",
            PoiCategory::Restaurants => "restaurants",
            PoiCategory::Shopping => "shopping",
            PoiCategory::Banks => "banks",
            PoiCategory::Pharmacies => "pharmacies",
            PoiCategory::GasStations => "gas stations",
            PoiCategory::Attractions => "attractions",
            PoiCategory::All => "points of interest",
        }
    }

    /// Overpass selectors for the general (non-school, non-attraction) lookup.
    fn overpass_selectors(&self) -> &'static [&'static str] {
        match self {
            PoiCategory::Hospitals => &[r#"node["amenity"="hospital"]"#],
            PoiCategory::Schools => &[
                r#"node["amenity"="school"]"#,
                r#"way["amenity"="school"]"#,
                r#"relation["amenity"="school"]"#,
            ],
            PoiCategory::Parks => &[r#"node["leisure"="park"]"#],
            PoiCategory::Restaurants => &[r#"node["amenity"~"^(restaurant|cafe|fast_food)$"]"#],
            PoiCategory::Shopping => &[r#"node["shop"]"#],
            PoiCategory::Banks => &[r#"node["amenity"="bank"]"#],
            PoiCategory::Pharmacies => &[r#"node["amenity"="pharmacy"]"#],
            PoiCategory::GasStations => &[r#"node["amenity"="fuel"]"#],
            PoiCategory::Attractions => &[
                r#"node["amenity"~"^(restaurant|cafe|hospital|pharmacy|bank|shopping|supermarket|park)$"]"#,
                r#"node["leisure"~"^(park|playground|sports_centre|swimming_pool)$"]"#,
                r#"node["shop"~"^(supermarket|mall|shopping_centre)$"]"#,
                r#"node["tourism"~"^(attraction|museum|gallery)$"]"#,
                r#"way["amenity"~"^(restaurant|cafe|hospital|pharmacy|bank|shopping|supermarket)$"]"#,
                r#"way["leisure"~"^(park|playground|sports_centre|swimming_pool)$"]"#,
            ],
            PoiCategory::All => &[
                r#"node["amenity"~"^(restaurant|cafe|hospital|pharmacy|bank|shopping|supermarket|school)$"]"#,
                r#"node["leisure"~"^(park|playground|sports_centre|swimming_pool)$"]"#,
                r#"node["shop"~"^(supermarket|mall)$"]"#,
                r#"node["tourism"~"^(attraction|museum|gallery)$"]"#,
            ],
        }
    }

    /// Build the Overpass QL query for this category around a point.
    pub fn overpass_query(&self, center: Coordinates, radius_m: u32) -> String {
        let clauses: String = self
            .overpass_selectors()
            .iter()
            .map(|sel| {
                format!(
                    "  {}(around:{},{},{});\n",
                    sel, radius_m, center.lat, center.lng
                )
            })
            .collect();
        format!("[out:json][timeout:25];\n(\n{});\nout center tags;\n", clauses)
    }
}

impl fmt::Display for PoiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A place as reported by the map-data source, distance still in kilometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoi {
    pub name: String,
    /// Display category ("Elementary School", "Restaurant/Dining", ...).
    pub category: String,
    pub distance_km: f64,
    pub description: String,
}

/// Map-data query service.
#[async_trait]
pub trait PoiSource: Send + Sync {
    async fn query(
        &self,
        center: Coordinates,
        radius_m: u32,
        category: PoiCategory,
    ) -> Result<Vec<RawPoi>, LocationError>;
}

// ---------------------------------------------------------------------------
// Overpass
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn position(&self) -> Option<Coordinates> {
        match (self.kind.as_str(), self.lat, self.lon, &self.center) {
            ("node", Some(lat), Some(lon), _) => Some(Coordinates::new(lat, lon)),
            (_, _, _, Some(c)) => Some(Coordinates::new(c.lat, c.lon)),
            _ => None,
        }
    }
}

/// Points-of-interest source backed by the Overpass API.
pub struct OverpassPoiSource {
    client: reqwest::Client,
    url: String,
}

impl OverpassPoiSource {
    pub fn new(config: &LocationConfig) -> Result<Self, LocationError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.overpass_url.clone(),
        })
    }
}

#[async_trait]
impl PoiSource for OverpassPoiSource {
    async fn query(
        &self,
        center: Coordinates,
        radius_m: u32,
        category: PoiCategory,
    ) -> Result<Vec<RawPoi>, LocationError> {
        let query = category.overpass_query(center, radius_m);
        let response = self.client.post(&self.url).body(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LocationError::Status(status.as_u16()));
        }

        let data: OverpassResponse = response.json().await?;
        let pois: Vec<RawPoi> = data
            .elements
            .iter()
            .filter_map(|el| {
                let position = el.position()?;
                let (kind, description) = describe(category, &el.tags);
                let fallback = if category == PoiCategory::Schools {
                    "Unnamed School"
                } else {
                    "Unnamed Location"
                };
                Some(RawPoi {
                    name: el.tags.get("name").cloned().unwrap_or_else(|| fallback.to_string()),
                    category: kind,
                    distance_km: haversine_km(center, position),
                    description,
                })
            })
            .collect();

        debug!(category = %category, found = pois.len(), "Overpass lookup complete");
        Ok(pois)
    }
}

/// Display category and description for a tagged element.
fn describe(category: PoiCategory, tags: &HashMap<String, String>) -> (String, String) {
    match category {
        PoiCategory::Schools => {
            let kind = school_type(tags);
            let description = format!("{} in the area", kind);
            (kind, description)
        }
        PoiCategory::Attractions => {
            let kind = attraction_type(tags).to_string();
            let description = format!("{} in the area", kind);
            (kind, description)
        }
        _ => {
            let (kind, description) = general_type(tags);
            (kind.to_string(), description.to_string())
        }
    }
}

fn school_type(tags: &HashMap<String, String>) -> String {
    if let Some(kind) = tags.get("school:type") {
        let mut chars = kind.chars();
        let titled = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        };
        return format!("{} School", titled);
    }
    if let Some(level) = tags.get("isced:level") {
        if level.contains('0') || level.contains('1') {
            return "Elementary School".to_string();
        }
        if level.contains('2') {
            return "Middle School".to_string();
        }
        if level.contains('3') {
            return "High School".to_string();
        }
    }
    "School".to_string()
}

fn general_type(tags: &HashMap<String, String>) -> (&'static str, &'static str) {
    if let Some(amenity) = tags.get("amenity") {
        return match amenity.as_str() {
            "hospital" => ("Hospital", "Medical facility"),
            "school" => ("School", "Educational institution"),
            "restaurant" | "cafe" | "fast_food" => ("Restaurant/Dining", "Dining establishment"),
            "pharmacy" => ("Pharmacy", "Pharmacy/Drugstore"),
            "bank" => ("Bank", "Banking services"),
            "fuel" => ("Gas Station", "Fuel station"),
            "park" => ("Park", "Public park"),
            _ => ("Point of Interest", "Location in the area"),
        };
    }
    if let Some(leisure) = tags.get("leisure") {
        return match leisure.as_str() {
            "park" | "playground" | "garden" => ("Park/Recreation", "Recreational area"),
            "sports_centre" | "swimming_pool" => ("Sports/Fitness", "Sports facility"),
            _ => ("Point of Interest", "Location in the area"),
        };
    }
    if tags.contains_key("shop") {
        return ("Shopping", "Retail establishment");
    }
    if tags.contains_key("tourism") {
        return ("Tourism/Culture", "Tourist attraction");
    }
    ("Point of Interest", "Location in the area")
}

fn attraction_type(tags: &HashMap<String, String>) -> &'static str {
    if let Some(amenity) = tags.get("amenity") {
        return match amenity.as_str() {
            "restaurant" | "cafe" => "Restaurant/Dining",
            "hospital" | "pharmacy" => "Healthcare",
            "bank" => "Banking",
            "supermarket" | "shopping" => "Shopping",
            _ => "Point of Interest",
        };
    }
    if let Some(leisure) = tags.get("leisure") {
        return match leisure.as_str() {
            "park" | "playground" => "Park/Recreation",
            "sports_centre" | "swimming_pool" => "Sports/Fitness",
            _ => "Point of Interest",
        };
    }
    if tags.contains_key("shop") {
        return "Shopping";
    }
    if tags.contains_key("tourism") {
        return "Tourism/Culture";
    }
    "Point of Interest"
}

// ---------------------------------------------------------------------------
// Static source
// ---------------------------------------------------------------------------

/// Fixed results per category, ignoring the center and radius.
#[derive(Debug, Clone, Default)]
pub struct StaticPoiSource {
    by_category: HashMap<PoiCategory, Vec<RawPoi>>,
}

impl StaticPoiSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pois(mut self, category: PoiCategory, pois: Vec<RawPoi>) -> Self {
        self.by_category.entry(category).or_default().extend(pois);
        self
    }
}

#[async_trait]
impl PoiSource for StaticPoiSource {
    async fn query(
        &self,
        _center: Coordinates,
        _radius_m: u32,
        category: PoiCategory,
    ) -> Result<Vec<RawPoi>, LocationError> {
        Ok(self.by_category.get(&category).cloned().unwrap_or_default())
    }
}
