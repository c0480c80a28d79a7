//! Keyword tables shared by the intent classifier and the preference
//! accumulator. All matching is case-insensitive substring search.

use broker_core::types::TransactionType;

/// Proximity and amenity words that point at a location query.
pub const LOCATION_KEYWORDS: &[&str] = &[
    "schools",
    "school",
    "near",
    "nearby",
    "close to",
    "around",
    "attractions",
    "attraction",
    "what's near",
    "what's around",
    "distance",
    "miles",
    "radius",
    "hospitals",
    "hospital",
    "parks",
    "park",
    "restaurants",
    "restaurant",
];

/// Words that point at a property search.
pub const PROPERTY_KEYWORDS: &[&str] = &[
    "house",
    "home",
    "property",
    "properties",
    "apartment",
    "condo",
    "family home",
    "show me",
    "find",
    "looking for",
    "search",
    "buy",
    "rent",
    "sale",
    "bedroom",
    "bathroom",
    "garden",
    "yard",
    "listing",
    "listings",
];

/// Checked before [`RENT_KEYWORDS`].
pub const BUY_KEYWORDS: &[&str] = &["buy", "purchase", "sale", "for sale", "buying"];

pub const RENT_KEYWORDS: &[&str] = &["rent", "rental", "lease", "renting"];

/// Phrases that express interest in one particular listing.
pub const INTEREST_PHRASES: &[&str] = &[
    "interested in",
    "i like",
    "i love",
    "tell me more about",
    "tour",
    "schedule",
    "visit",
];

/// Concrete search constraints. A digit anywhere also counts.
pub const SEARCH_CUES: &[&str] = &[
    "bedroom",
    "bathroom",
    "$",
    "price",
    "budget",
    "under ",
    "below",
    "between",
    "cheap",
    "afford",
    "per month",
    "monthly",
    " in ",
    "garden",
    "yard",
];

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    let lower = message.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

pub fn mentions_location(message: &str) -> bool {
    contains_any(message, LOCATION_KEYWORDS)
}

pub fn mentions_property(message: &str) -> bool {
    contains_any(message, PROPERTY_KEYWORDS)
}

pub fn expresses_interest(message: &str) -> bool {
    contains_any(message, INTEREST_PHRASES)
}

/// Whether the message names at least one concrete search constraint.
pub fn has_search_cue(message: &str) -> bool {
    message.chars().any(|c| c.is_ascii_digit()) || contains_any(message, SEARCH_CUES)
}

/// Transaction type from keywords, buy before rent.
pub fn infer_transaction(message: &str) -> Option<TransactionType> {
    if contains_any(message, BUY_KEYWORDS) {
        Some(TransactionType::Buy)
    } else if contains_any(message, RENT_KEYWORDS) {
        Some(TransactionType::Rent)
    } else {
        None
    }
}
