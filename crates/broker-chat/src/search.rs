//! Conversation-side search: building criteria from preferences, the
//! exact-name shortcut, the relaxed fallback ladder and name matching.

use std::sync::Arc;

use broker_core::types::{Listing, TransactionType};
use broker_vector::{PropertySearchEngine, SearchCriteria};
use tracing::{debug, info};

use crate::error::ChatError;
use crate::state::UserPreferences;
use crate::types::{Classification, Intent};

/// A constraint dropped by the relaxed fallback search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaxation {
    Bedrooms,
    Price,
    PropertyType,
}

impl Relaxation {
    /// Ladder order. Each step keeps the previous steps dropped.
    pub const LADDER: [Relaxation; 3] =
        [Relaxation::Bedrooms, Relaxation::Price, Relaxation::PropertyType];

    pub fn label(&self) -> &'static str {
        match self {
            Relaxation::Bedrooms => "bedroom count",
            Relaxation::Price => "price range",
            Relaxation::PropertyType => "property type",
        }
    }

    /// Clear this constraint. Returns whether anything changed.
    fn apply(&self, criteria: &mut SearchCriteria) -> bool {
        match self {
            Relaxation::Bedrooms => criteria.bedrooms.take().is_some(),
            Relaxation::Price => {
                let had = criteria.has_price_bounds();
                criteria.min_price = None;
                criteria.max_price = None;
                had
            }
            Relaxation::PropertyType => criteria.property_type.take().is_some(),
        }
    }
}

/// Results found only after dropping a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxedResults {
    pub dropped: Relaxation,
    pub results: Vec<Listing>,
}

/// Hard constraints for the current turn.
///
/// The transaction type from this turn's classification wins over the
/// accumulated one.
pub fn criteria_from(transaction: Option<TransactionType>, prefs: &UserPreferences) -> SearchCriteria {
    SearchCriteria {
        transaction: transaction.or(prefs.transaction_type),
        bedrooms: prefs.bedrooms,
        bathrooms: None,
        location: prefs.location.clone(),
        property_type: prefs.property_type.clone(),
        min_price: prefs.min_price,
        max_price: prefs.max_price,
    }
}

/// Search text rebuilt from accumulated preferences.
pub fn implicit_query(prefs: &UserPreferences) -> String {
    let mut parts = Vec::new();
    match prefs.transaction_type {
        Some(TransactionType::Rent) => parts.push("for rent".to_string()),
        Some(TransactionType::Buy) => parts.push("for sale".to_string()),
        None => {}
    }
    if let Some(ref kind) = prefs.property_type {
        parts.push(kind.clone());
    }
    if let Some(beds) = prefs.bedrooms {
        parts.push(format!("{}-bedroom", beds));
    }
    if let Some(ref location) = prefs.location {
        parts.push(format!("in {}", location));
    }
    match (prefs.min_price, prefs.max_price) {
        (Some(min), Some(max)) => parts.push(format!("${} to ${}", price(min), price(max))),
        (Some(min), None) => parts.push(format!("over ${}", price(min))),
        (None, Some(max)) => parts.push(format!("under ${}", price(max))),
        (None, None) => {}
    }
    parts.join(" ")
}

fn price(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

const NAME_STOP_WORDS: &[&str] = &["the", "a", "an", "of", "at", "in", "on", "and"];

/// Whether `candidate` is the property the user called `requested`.
///
/// Matches when the candidate name contains the requested name, or when
/// every significant word of the requested name appears in it.
pub fn match_property_name(candidate: &str, requested: &str) -> bool {
    let candidate = candidate.to_lowercase();
    let requested = requested.trim().to_lowercase();
    if requested.is_empty() || candidate.is_empty() {
        return false;
    }
    if candidate.contains(&requested) {
        return true;
    }
    let words: Vec<&str> = requested
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !NAME_STOP_WORDS.contains(w))
        .collect();
    !words.is_empty() && words.iter().all(|w| candidate.contains(w))
}

/// Distinct listings in `shown` whose name matches `requested`.
pub fn matches_by_name(shown: &[Listing], requested: &str) -> Vec<Listing> {
    let mut found: Vec<Listing> = Vec::new();
    for listing in shown.iter().filter(|l| match_property_name(&l.name, requested)) {
        if !found.iter().any(|f| f.id == listing.id && f.name == listing.name) {
            found.push(listing.clone());
        }
    }
    found
}

/// Keep the results the narrative mentions by id or name; all if none are.
pub fn filter_by_mentions(results: &[Listing], narrative: &str) -> Vec<Listing> {
    let text = narrative.to_lowercase();
    let mentioned: Vec<Listing> = results
        .iter()
        .filter(|l| {
            (!l.id.is_empty() && text.contains(&l.id.to_lowercase()))
                || (!l.name.is_empty() && text.contains(&l.name.to_lowercase()))
        })
        .cloned()
        .collect();
    if mentioned.is_empty() {
        results.to_vec()
    } else {
        mentioned
    }
}

/// Search entry point used by the dialogue.
#[derive(Clone)]
pub struct PropertyFinder {
    engine: Arc<PropertySearchEngine>,
    top_k: usize,
    relaxed_limit: usize,
}

impl PropertyFinder {
    pub fn new(engine: Arc<PropertySearchEngine>, top_k: usize, relaxed_limit: usize) -> Self {
        Self {
            engine,
            top_k,
            relaxed_limit,
        }
    }

    pub fn engine(&self) -> &PropertySearchEngine {
        &self.engine
    }

    /// Ranked search for this turn.
    ///
    /// A property-interest turn that names a property is answered by an
    /// exact name-or-address lookup instead, when that finds one.
    pub async fn search_properties(
        &self,
        query: &str,
        classification: &Classification,
        prefs: &UserPreferences,
    ) -> Result<Vec<Listing>, ChatError> {
        if classification.intent == Intent::PropertyInterest
            && !classification.property_name.is_empty()
        {
            if let Some(listing) = self.engine.find_exact(&classification.property_name) {
                debug!(id = %listing.id, "Exact property match");
                return Ok(vec![listing]);
            }
        }
        let criteria = criteria_from(classification.transaction, prefs);
        let results = self.engine.search(query, &criteria, self.top_k).await?;
        debug!(count = results.len(), ?criteria, "Property search finished");
        Ok(results)
    }

    /// Retry an empty search with constraints dropped one at a time.
    ///
    /// Returns the first relaxation that finds anything, capped at the
    /// relaxed limit, or `None`.
    pub async fn relaxed_search(
        &self,
        query: &str,
        transaction: Option<TransactionType>,
        prefs: &UserPreferences,
    ) -> Result<Option<RelaxedResults>, ChatError> {
        let mut criteria = criteria_from(transaction, prefs);
        for step in Relaxation::LADDER {
            if !step.apply(&mut criteria) {
                continue;
            }
            let results = self
                .engine
                .search(query, &criteria, self.relaxed_limit)
                .await?;
            if !results.is_empty() {
                info!(dropped = step.label(), count = results.len(), "Relaxed search found results");
                return Ok(Some(RelaxedResults {
                    dropped: step,
                    results,
                }));
            }
        }
        Ok(None)
    }

    /// Resolve a property by name: among `shown` first, then an exact
    /// name-or-address hit in the catalog, then a loose catalog match.
    pub fn find_by_name(&self, shown: &[Listing], name: &str) -> Option<Listing> {
        shown
            .iter()
            .find(|l| match_property_name(&l.name, name))
            .cloned()
            .or_else(|| self.engine.find_exact(name))
            .or_else(|| {
                self.engine
                    .catalog()
                    .properties()
                    .iter()
                    .find(|p| match_property_name(&p.listing.name, name))
                    .map(|p| p.to_listing())
            })
    }

    pub fn available_locations(&self) -> Vec<String> {
        self.engine.catalog().available_locations()
    }
}
