//! Answers to "what's near X" questions.
//!
//! The address comes from the model, with a regex fallback when the model
//! is unavailable. Without an address the answer covers the properties the
//! user was last shown.

use std::sync::{Arc, LazyLock};

use broker_core::types::Listing;
use broker_geo::{LocationService, PoiCategory, PointOfInterest};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::prompts;

static ADDRESS_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:near|around|close to|at)\s+([A-Za-z0-9\s,]+?)(?:\s*[?.!]|$)")
        .expect("valid address regex")
});

const PER_KIND_LIMIT: usize = 2;
const SPECIFIC_LIMIT: usize = 5;
const SHOWN_PROPERTY_LIMIT: usize = 3;
const PER_PROPERTY_LIMIT: usize = 2;

const AREA_FOLLOWUP: &str = "Would you like me to help you find properties in this area?";

/// Pull an address out of the message with the fallback pattern.
pub fn address_from_pattern(message: &str) -> Option<String> {
    ADDRESS_FALLBACK
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_end_matches(',').trim().to_string())
        .filter(|a| !a.is_empty())
}

fn poi_line(poi: &PointOfInterest) -> String {
    format!("• **{}** - {:.2} miles", poi.name, poi.distance_miles)
}

/// Render a lookup around one address.
pub fn format_nearby(address: &str, category: PoiCategory, pois: &[PointOfInterest]) -> String {
    if pois.is_empty() {
        return format!(
            "I couldn't find any {} near {}. Would you like me to search for something else in the area?",
            category.label(),
            address
        );
    }

    let mut out = Vec::new();
    if category == PoiCategory::All {
        out.push(format!("Here's what I found near {}:", address));
        // Groups keep first-seen order, which is nearest first.
        let mut groups: Vec<(&str, Vec<&PointOfInterest>)> = Vec::new();
        for poi in pois {
            match groups.iter_mut().find(|(kind, _)| *kind == poi.kind) {
                Some((_, members)) => members.push(poi),
                None => groups.push((poi.kind.as_str(), vec![poi])),
            }
        }
        for (kind, members) in groups {
            out.push(String::new());
            out.push(format!("**{}**", kind));
            out.extend(members.into_iter().take(PER_KIND_LIMIT).map(poi_line));
        }
    } else {
        out.push(format!("Here are the {} near {}:", category.label(), address));
        out.push(String::new());
        out.extend(pois.iter().take(SPECIFIC_LIMIT).map(poi_line));
    }
    out.push(String::new());
    out.push(AREA_FOLLOWUP.to_string());
    out.join("\n")
}

/// Location-query handler.
#[derive(Clone)]
pub struct LocationResponder {
    llm: LlmClient,
    service: Arc<LocationService>,
}

impl LocationResponder {
    pub fn new(llm: LlmClient, service: Arc<LocationService>) -> Self {
        Self { llm, service }
    }

    pub fn service(&self) -> &LocationService {
        &self.service
    }

    /// The address, landmark or place the message asks about, if any.
    pub async fn extract_address(&self, message: &str) -> Option<String> {
        match self.llm.ask(&prompts::address_extraction(message)).await {
            Ok(reply) => {
                let address = reply.trim().trim_matches(|c| c == '"' || c == '\'').trim();
                if address.is_empty() || address.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(address.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "Address extraction failed, using pattern fallback");
                address_from_pattern(message)
            }
        }
    }

    /// Answer a location query. Never fails; lookup errors become an apology.
    pub async fn answer(&self, message: &str, last_shown: &[Listing]) -> String {
        let category = PoiCategory::from_query(message);
        let Some(address) = self.extract_address(message).await else {
            debug!("No address in location query, using shown properties");
            return self.around_shown(category, last_shown).await;
        };

        let center = match self.service.geocode(&address).await {
            Ok(Some(center)) => center,
            Ok(None) => {
                info!(address = %address, "Address not found by geocoder");
                return prompts::geocode_miss(&address);
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Geocoding failed");
                return prompts::LOCATION_ERROR_REPLY.to_string();
            }
        };

        match self.service.nearby(center, category).await {
            Ok(pois) => {
                info!(
                    address = %address,
                    category = category.label(),
                    count = pois.len(),
                    "Location query answered"
                );
                format_nearby(&address, category, &pois)
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Nearby lookup failed");
                prompts::LOCATION_ERROR_REPLY.to_string()
            }
        }
    }

    async fn around_shown(&self, category: PoiCategory, shown: &[Listing]) -> String {
        if shown.is_empty() {
            return prompts::NO_ADDRESS_REPLY.to_string();
        }

        let mut sections = Vec::new();
        for listing in shown.iter().take(SHOWN_PROPERTY_LIMIT) {
            let address = listing.full_address.trim();
            if address.is_empty() {
                continue;
            }
            let center = match self.service.geocode(address).await {
                Ok(Some(center)) => center,
                Ok(None) => continue,
                Err(e) => {
                    warn!(address = %address, error = %e, "Geocoding shown property failed");
                    continue;
                }
            };
            let pois = match self.service.nearby(center, category).await {
                Ok(pois) if !pois.is_empty() => pois,
                Ok(_) => continue,
                Err(e) => {
                    warn!(address = %address, error = %e, "Nearby lookup failed");
                    continue;
                }
            };
            let label = if listing.name.is_empty() { address } else { listing.name.as_str() };
            let mut section = vec![format!("**{}**", label)];
            section.extend(pois.iter().take(PER_PROPERTY_LIMIT).map(poi_line));
            sections.push(section.join("\n"));
        }

        if sections.is_empty() {
            return format!(
                "I couldn't find any {} near the properties I showed you. Could you give me a specific address?",
                category.label()
            );
        }
        format!(
            "Here are the {} near the properties I showed you:\n\n{}\n\n{}",
            category.label(),
            sections.join("\n\n"),
            AREA_FOLLOWUP
        )
    }
}
