//! Catalog record types shared by all crates.
//!
//! [`Property`] is the full record as stored in the catalog file, including
//! the pre-computed embedding. [`Listing`] is the public projection that is
//! allowed to leave the search engine and the HTTP layer.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Whether the user wants to buy or to rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Buy,
    Rent,
}

impl TransactionType {
    /// Parse a loose transaction label ("buy", "sale", "rent", "lease", ...).
    ///
    /// Returns `None` for "unknown", empty strings, and anything unrecognized.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "buy" | "sale" | "for sale" | "purchase" | "buying" => Some(Self::Buy),
            "rent" | "rental" | "lease" | "renting" => Some(Self::Rent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Rent => "rent",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public view of a catalog property.
///
/// Field names are camelCase on the wire and stable: the catalog views, the
/// chat results and the client-echoed session state all use this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub full_address: String,
    #[serde(default, deserialize_with = "de_place_name")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "de_place_name")]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_number")]
    pub sales_price: Option<f64>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub lease_property: bool,
    #[serde(default, alias = "leasePrice", deserialize_with = "de_lenient_number")]
    pub monthly_rent: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_count")]
    pub bedroom_count: Option<u32>,
    #[serde(default, deserialize_with = "de_lenient_number")]
    pub bath_count: Option<f64>,
    #[serde(default)]
    pub living_space_size: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub media: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub description: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub amenities: Vec<String>,
}

impl Listing {
    /// A lease listing is one flagged `leaseProperty`.
    pub fn is_lease(&self) -> bool {
        self.lease_property
    }

    /// A sale listing carries a positive `salesPrice` and is not a lease.
    pub fn is_for_sale(&self) -> bool {
        !self.lease_property && self.sales_price.is_some_and(|p| p > 0.0)
    }

    /// The price that range filters compare against.
    ///
    /// Buyers compare the sale price and renters the monthly rent. With no
    /// active transaction type the listing's own kind decides.
    pub fn applicable_price(&self, transaction: Option<TransactionType>) -> Option<f64> {
        let lease = match transaction {
            Some(TransactionType::Buy) => false,
            Some(TransactionType::Rent) => true,
            None => self.lease_property,
        };
        if lease {
            if self.lease_property {
                self.monthly_rent
            } else {
                None
            }
        } else {
            self.sales_price.filter(|p| *p > 0.0)
        }
    }

    /// Whether the location term appears in the address, city or neighborhood.
    pub fn matches_location(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.full_address.to_lowercase().contains(&term)
            || self
                .city
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&term))
            || self
                .neighborhood
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&term))
    }

    /// Case-insensitive substring match on the property type.
    pub fn matches_property_type(&self, wanted: &str) -> bool {
        let wanted = wanted.trim().to_lowercase();
        self.property_type
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&wanted))
    }
}

/// A catalog record: the public listing plus internal-only fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(default)]
    pub seo_description: Option<String>,
    /// Pre-computed embedding of the listing text.
    #[serde(default, deserialize_with = "de_null_default")]
    pub embedding: Vec<f32>,
}

impl Property {
    pub fn id(&self) -> &str {
        &self.listing.id
    }

    /// Strip the internal-only fields.
    pub fn to_listing(&self) -> Listing {
        self.listing.clone()
    }
}

// =============================================================================
// Lenient field decoding
// =============================================================================

/// Treat an explicit `null` as the type's default.
fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifiers may be numbers in older catalog exports.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid property id: {}",
            other
        ))),
    }
}

/// City and neighborhood are either plain strings or `{ "name": ... }` objects.
fn de_place_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let name = match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Object(map)) => map
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string),
        _ => None,
    };
    Ok(name.filter(|n| !n.trim().is_empty() && n != "None"))
}

/// Parse a number that may arrive as a JSON number or a string like "$4,500".
pub fn parse_loose_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

fn de_lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_loose_number))
}

fn de_lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(parse_loose_number)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        json!({
            "id": "p-1",
            "name": "Hampton Bays Renovated House",
            "fullAddress": "12 Bay Ave, Hampton Bays, NY 11946",
            "city": {"name": "Hampton Bays"},
            "neighborhood": "Shinnecock",
            "propertyType": "House",
            "salesPrice": null,
            "leaseProperty": true,
            "leasePrice": "$3,000",
            "bedroomCount": 3,
            "bathCount": 2.5,
            "livingSpaceSize": "1,800 sqft",
            "media": [{"smallUrl": "a.jpg"}],
            "description": "Renovated with a garden.",
            "slug": "hampton-bays-renovated-house",
            "seoDescription": "seo text",
            "embedding": [0.1, 0.2, 0.3]
        })
    }

    // ---- decoding ----

    #[test]
    fn test_property_decodes_lenient_fields() {
        let prop: Property = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(prop.id(), "p-1");
        assert_eq!(prop.listing.city.as_deref(), Some("Hampton Bays"));
        assert_eq!(prop.listing.neighborhood.as_deref(), Some("Shinnecock"));
        assert_eq!(prop.listing.monthly_rent, Some(3000.0));
        assert_eq!(prop.listing.bedroom_count, Some(3));
        assert_eq!(prop.listing.bath_count, Some(2.5));
        assert_eq!(prop.embedding.len(), 3);
        assert_eq!(prop.seo_description.as_deref(), Some("seo text"));
    }

    #[test]
    fn test_numeric_id_accepted() {
        let prop: Property = serde_json::from_value(json!({"id": 42})).unwrap();
        assert_eq!(prop.id(), "42");
        assert!(prop.embedding.is_empty());
    }

    #[test]
    fn test_listing_serialization_omits_internal_fields() {
        let prop: Property = serde_json::from_value(sample_json()).unwrap();
        let value = serde_json::to_value(prop.to_listing()).unwrap();
        assert!(value.get("embedding").is_none());
        assert!(value.get("seoDescription").is_none());
        assert_eq!(value["fullAddress"], "12 Bay Ave, Hampton Bays, NY 11946");
        assert_eq!(value["monthlyRent"], 3000.0);
    }

    // ---- pricing ----

    #[test]
    fn test_applicable_price_by_transaction() {
        let lease: Property = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(lease.listing.applicable_price(Some(TransactionType::Rent)), Some(3000.0));
        assert_eq!(lease.listing.applicable_price(Some(TransactionType::Buy)), None);
        assert_eq!(lease.listing.applicable_price(None), Some(3000.0));

        let sale: Property = serde_json::from_value(json!({
            "id": "s", "salesPrice": 650000, "leaseProperty": false
        }))
        .unwrap();
        assert!(sale.listing.is_for_sale());
        assert_eq!(sale.listing.applicable_price(None), Some(650000.0));
        assert_eq!(sale.listing.applicable_price(Some(TransactionType::Rent)), None);
    }

    // ---- matching ----

    #[test]
    fn test_location_matching_any_field() {
        let prop: Property = serde_json::from_value(sample_json()).unwrap();
        assert!(prop.listing.matches_location("hampton"));
        assert!(prop.listing.matches_location("SHINNECOCK"));
        assert!(prop.listing.matches_location("11946"));
        assert!(!prop.listing.matches_location("brooklyn"));
    }

    #[test]
    fn test_transaction_type_parse() {
        assert_eq!(TransactionType::parse("Buy"), Some(TransactionType::Buy));
        assert_eq!(TransactionType::parse("lease"), Some(TransactionType::Rent));
        assert_eq!(TransactionType::parse("unknown"), None);
        assert_eq!(TransactionType::Rent.to_string(), "rent");
    }

    #[test]
    fn test_parse_loose_number() {
        assert_eq!(parse_loose_number(&json!("$4,500")), Some(4500.0));
        assert_eq!(parse_loose_number(&json!(12)), Some(12.0));
        assert_eq!(parse_loose_number(&json!("n/a")), None);
        assert_eq!(parse_loose_number(&json!(true)), None);
    }
}
