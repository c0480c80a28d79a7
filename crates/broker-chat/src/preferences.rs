//! Preference extraction and accumulation.
//!
//! The model's JSON is decoded into a loosely typed shape first and then
//! validated field by field, so a malformed value drops only that field.
//! Any model or parse failure yields an empty delta.

use broker_core::types::{parse_loose_number, TransactionType};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::prompts;
use crate::state::{PreferenceDelta, UserPreferences};
use crate::types::{DisplayFilters, HistoryMessage};

/// Preference extraction reply as the model sends it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractedPreferences {
    pub transaction_type: Value,
    pub location: Value,
    pub property_type: Value,
    pub bedrooms: Value,
    pub min_price: Value,
    pub max_price: Value,
    pub size: Value,
}

impl ExtractedPreferences {
    pub fn into_delta(self) -> PreferenceDelta {
        PreferenceDelta {
            transaction_type: text(&self.transaction_type)
                .as_deref()
                .and_then(TransactionType::parse),
            location: text(&self.location),
            property_type: text(&self.property_type),
            bedrooms: count(&self.bedrooms),
            min_price: amount(&self.min_price),
            max_price: amount(&self.max_price),
            size: text(&self.size),
        }
    }
}

/// Display-filter reply as the model sends it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedFilters {
    transaction_type: Value,
    property_type: Value,
    bedrooms: Value,
    bathrooms: Value,
    location: Value,
    price_min: Value,
    price_max: Value,
}

impl ExtractedFilters {
    fn into_filters(self) -> DisplayFilters {
        DisplayFilters {
            transaction_type: text(&self.transaction_type)
                .as_deref()
                .and_then(TransactionType::parse),
            property_type: text(&self.property_type),
            bedrooms: count(&self.bedrooms),
            bathrooms: amount(&self.bathrooms),
            location: text(&self.location),
            price_min: amount(&self.price_min),
            price_max: amount(&self.price_max),
        }
    }
}

fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match s.to_lowercase().as_str() {
        "" | "null" | "none" | "unknown" | "n/a" => None,
        _ => Some(s),
    }
}

fn amount(value: &Value) -> Option<f64> {
    parse_loose_number(value).filter(|n| n.is_finite() && *n >= 0.0)
}

fn count(value: &Value) -> Option<u32> {
    amount(value).map(|n| n.round() as u32)
}

/// Render the last `turns` history entries as `role: content` lines.
pub fn recent_context(history: &[HistoryMessage], turns: usize) -> String {
    let start = history.len().saturating_sub(turns);
    history[start..]
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// LLM-backed preference extraction.
#[derive(Clone)]
pub struct PreferenceAccumulator {
    llm: LlmClient,
    history_turns: usize,
}

impl PreferenceAccumulator {
    pub fn new(llm: LlmClient, history_turns: usize) -> Self {
        Self { llm, history_turns }
    }

    /// Extract preferences from the message and merge them into `prefs`.
    ///
    /// `hint` is the transaction type found by intent classification; it is
    /// used when the extraction itself found none. Returns what was merged.
    pub async fn extract_and_merge(
        &self,
        message: &str,
        history: &[HistoryMessage],
        prefs: &mut UserPreferences,
        hint: Option<TransactionType>,
    ) -> PreferenceDelta {
        let prompt = prompts::preference_extraction(
            &recent_context(history, self.history_turns),
            message,
        );
        let mut delta = match self.llm.ask_json::<ExtractedPreferences>(&prompt).await {
            Ok(extracted) => extracted.into_delta(),
            Err(e) => {
                warn!(error = %e, "Preference extraction failed");
                PreferenceDelta::default()
            }
        };
        if delta.transaction_type.is_none() {
            delta.transaction_type = hint;
        }
        prefs.merge(&delta);
        debug!(?delta, gathered = prefs.gathered_criteria.len(), "Preferences merged");
        delta
    }

    /// Filters for the client's search panel, or `None` when nothing was found.
    pub async fn extract_display_filters(
        &self,
        message: &str,
        history: &[HistoryMessage],
    ) -> Option<DisplayFilters> {
        let prompt =
            prompts::display_filters(&recent_context(history, self.history_turns), message);
        match self.llm.ask_json::<ExtractedFilters>(&prompt).await {
            Ok(extracted) => Some(extracted.into_filters()).filter(|f| !f.is_empty()),
            Err(e) => {
                warn!(error = %e, "Display filter extraction failed");
                None
            }
        }
    }

    /// Ask for the single most important missing criterion.
    pub async fn clarification(
        &self,
        message: &str,
        prefs: &UserPreferences,
        available_locations: &[String],
    ) -> String {
        let prompt = prompts::clarification(
            message,
            prefs,
            prefs.next_missing_criterion(),
            available_locations,
        );
        self.llm
            .ask_or(&prompt, prompts::CLARIFICATION_FALLBACK)
            .await
    }
}
