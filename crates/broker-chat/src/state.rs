//! Per-session conversation state.
//!
//! Everything here round-trips through JSON unchanged, which is how the
//! client-echo session mode carries it between turns.

use std::collections::BTreeSet;

use broker_core::types::{parse_loose_number, Listing, TransactionType};
use broker_tour::TourScheduling;
use serde::{Deserialize, Deserializer, Serialize};

/// A search preference the user can state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    TransactionType,
    Location,
    PropertyType,
    Bedrooms,
    MinPrice,
    MaxPrice,
    Size,
}

impl Criterion {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "transaction_type" => Some(Self::TransactionType),
            "location" => Some(Self::Location),
            "property_type" => Some(Self::PropertyType),
            "bedrooms" => Some(Self::Bedrooms),
            "min_price" => Some(Self::MinPrice),
            "max_price" => Some(Self::MaxPrice),
            "size" => Some(Self::Size),
            _ => None,
        }
    }
}

/// The single piece of information to ask for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCriterion {
    TransactionType,
    Location,
    Bedrooms,
    Price,
}

/// Newly extracted preference values. `None` means "not mentioned".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceDelta {
    pub transaction_type: Option<TransactionType>,
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub size: Option<String>,
}

impl PreferenceDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Accumulated search preferences with provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default, deserialize_with = "de_transaction")]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default, deserialize_with = "de_count")]
    pub bedrooms: Option<u32>,
    #[serde(default, deserialize_with = "de_price")]
    pub min_price: Option<f64>,
    #[serde(default, deserialize_with = "de_price")]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub size: Option<String>,
    /// Criteria the user has stated at least once.
    #[serde(default, deserialize_with = "de_criteria")]
    pub gathered_criteria: BTreeSet<Criterion>,
}

impl UserPreferences {
    /// Overwrite every mentioned field and record it as gathered.
    ///
    /// Unmentioned fields keep their previous value.
    pub fn merge(&mut self, delta: &PreferenceDelta) {
        if let Some(t) = delta.transaction_type {
            self.transaction_type = Some(t);
            self.gathered_criteria.insert(Criterion::TransactionType);
        }
        if let Some(loc) = non_blank(&delta.location) {
            self.location = Some(loc);
            self.gathered_criteria.insert(Criterion::Location);
        }
        if let Some(kind) = non_blank(&delta.property_type) {
            self.property_type = Some(kind);
            self.gathered_criteria.insert(Criterion::PropertyType);
        }
        if let Some(beds) = delta.bedrooms {
            self.bedrooms = Some(beds);
            self.gathered_criteria.insert(Criterion::Bedrooms);
        }
        if let Some(min) = delta.min_price {
            self.min_price = Some(min);
            self.gathered_criteria.insert(Criterion::MinPrice);
        }
        if let Some(max) = delta.max_price {
            self.max_price = Some(max);
            self.gathered_criteria.insert(Criterion::MaxPrice);
        }
        if let Some(size) = non_blank(&delta.size) {
            self.size = Some(size);
            self.gathered_criteria.insert(Criterion::Size);
        }
    }

    /// Any constraint beyond the transaction type and location.
    pub fn has_specifics(&self) -> bool {
        self.bedrooms.is_some()
            || self.min_price.is_some()
            || self.max_price.is_some()
            || self.property_type.is_some()
    }

    /// Enough is known to run a search.
    pub fn is_sufficient(&self) -> bool {
        self.transaction_type.is_some() && (self.location.is_some() || self.has_specifics())
    }

    /// Next criterion to ask about: transaction, location, bedrooms, price.
    pub fn next_missing_criterion(&self) -> Option<MissingCriterion> {
        if self.transaction_type.is_none() {
            Some(MissingCriterion::TransactionType)
        } else if self.location.is_none() {
            Some(MissingCriterion::Location)
        } else if self.bedrooms.is_none() {
            Some(MissingCriterion::Bedrooms)
        } else if self.min_price.is_none() && self.max_price.is_none() {
            Some(MissingCriterion::Price)
        } else {
            None
        }
    }

    /// Drop gathered markers whose value is missing.
    ///
    /// Only needed for state that arrived from outside, since `merge` never
    /// produces such a marker.
    pub fn normalize(&mut self) {
        let present: Vec<Criterion> = self
            .gathered_criteria
            .iter()
            .copied()
            .filter(|c| self.value_present(*c))
            .collect();
        self.gathered_criteria = present.into_iter().collect();
    }

    fn value_present(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::TransactionType => self.transaction_type.is_some(),
            Criterion::Location => self.location.is_some(),
            Criterion::PropertyType => self.property_type.is_some(),
            Criterion::Bedrooms => self.bedrooms.is_some(),
            Criterion::MinPrice => self.min_price.is_some(),
            Criterion::MaxPrice => self.max_price.is_some(),
            Criterion::Size => self.size.is_some(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// Dialogue state owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub awaiting_tour_confirmation: bool,
    #[serde(default)]
    pub awaiting_property_confirmation: bool,
    #[serde(default)]
    pub potential_property: Option<Listing>,
    #[serde(default)]
    pub property_of_interest: Option<Listing>,
    /// Most recent search results shown to the user.
    #[serde(default)]
    pub last_shown_properties: Vec<Listing>,
    #[serde(default)]
    pub tour_scheduling: TourScheduling,
    #[serde(default)]
    pub user_preferences: UserPreferences,
}

/// Everything stored per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub latest_property_results: Vec<Listing>,
    #[serde(default)]
    pub conversation_state: ConversationState,
}

// =============================================================================
// Lenient decoding of client-echoed state
// =============================================================================

fn de_transaction<'de, D>(deserializer: D) -> Result<Option<TransactionType>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(TransactionType::parse))
}

fn de_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(parse_loose_number(&value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32))
}

fn de_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(parse_loose_number(&value))
}

fn de_criteria<'de, D>(deserializer: D) -> Result<BTreeSet<Criterion>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(keys.iter().filter_map(|k| Criterion::parse(k)).collect())
}
