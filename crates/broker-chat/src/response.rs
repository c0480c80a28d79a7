//! Reply assembly: turn outcomes, suggestions, metadata, and the
//! deterministic results summary used when the model cannot write one.

use broker_core::types::Listing;
use broker_tour::TourStatus;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::prompts;
use crate::state::SessionData;
use crate::types::{ChatReply, DisplayFilters, Intent, ResponseType};

/// Intent label used on the error-recovery path.
pub const ERROR_RECOVERY_INTENT: &str = "error_recovery";

// =============================================================================
// TurnOutcome
// =============================================================================

/// What a dialogue branch produced for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response: String,
    pub results: Vec<Listing>,
    pub parsed_filters: Option<DisplayFilters>,
    /// Short name of the branch that handled the turn, for logs.
    pub branch: &'static str,
}

impl TurnOutcome {
    pub fn text(branch: &'static str, response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            results: Vec::new(),
            parsed_filters: None,
            branch,
        }
    }

    pub fn with_results(mut self, results: Vec<Listing>) -> Self {
        self.results = results;
        self
    }

    pub fn with_filters(mut self, filters: Option<DisplayFilters>) -> Self {
        self.parsed_filters = filters;
        self
    }
}

// =============================================================================
// Reply construction
// =============================================================================

/// Build the reply for a turn that completed normally.
pub fn success_reply(
    intent: Intent,
    outcome: TurnOutcome,
    session_id: &str,
    elapsed_ms: u64,
    tour_status: TourStatus,
    state: Option<SessionData>,
) -> ChatReply {
    let suggestions = suggestions(intent, &outcome.results, tour_status);
    let mut metadata = Map::new();
    metadata.insert("execution_time_ms".into(), json!(elapsed_ms));
    metadata.insert("result_count".into(), json!(outcome.results.len()));
    metadata.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));

    ChatReply {
        response: outcome.response,
        response_type: ResponseType::General,
        intent: intent.wire_name(),
        results: outcome.results,
        suggestions,
        metadata,
        parsed_filters: outcome.parsed_filters,
        session_id: session_id.to_string(),
        conversation_state: state,
    }
}

/// Build the apology sent when a turn failed internally.
pub fn recovery_reply(session_id: &str, elapsed_ms: u64, state: Option<SessionData>) -> ChatReply {
    ChatReply {
        response: prompts::ERROR_RECOVERY_REPLY.to_string(),
        response_type: ResponseType::Error,
        intent: ERROR_RECOVERY_INTENT.to_string(),
        results: Vec::new(),
        suggestions: Vec::new(),
        metadata: error_metadata(elapsed_ms),
        parsed_filters: None,
        session_id: session_id.to_string(),
        conversation_state: state,
    }
}

fn error_metadata(elapsed_ms: u64) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("execution_time_ms".into(), json!(elapsed_ms));
    metadata.insert("error".into(), json!("Internal server error"));
    metadata.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
    metadata
}

/// Follow-up prompts offered to the client.
pub fn suggestions(intent: Intent, results: &[Listing], tour_status: TourStatus) -> Vec<String> {
    let items: &[&str] = match tour_status {
        TourStatus::Confirmed => &["What's near the property?", "Show me similar properties"],
        s if s.is_awaiting() => &[],
        _ if !results.is_empty() => &[
            "Schedule a tour",
            "What schools are nearby?",
            "Show me similar properties",
        ],
        _ => match intent {
            Intent::InitialInquiry => &["I want to buy", "I want to rent"],
            Intent::LocationQuery => &["Show me properties in this area"],
            Intent::PropertyQuery | Intent::PropertyRejection | Intent::FollowupQuery => {
                &["Adjust my budget", "Try a different area"]
            }
            _ => &[],
        },
    };
    items.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Deterministic summaries
// =============================================================================

/// Thousands-separated whole dollars.
pub fn format_dollars(amount: f64) -> String {
    let whole = amount.round().max(0.0) as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("${}", out)
}

fn price_label(listing: &Listing) -> Option<String> {
    if listing.is_lease() {
        listing
            .monthly_rent
            .map(|rent| format!("{}/month", format_dollars(rent)))
    } else {
        listing.sales_price.filter(|p| *p > 0.0).map(format_dollars)
    }
}

/// Markdown bullet list of results, used when the narrative call fails.
pub fn summarize_results(results: &[Listing]) -> String {
    let mut lines = vec![format!(
        "I found {} {} that might interest you:",
        results.len(),
        if results.len() == 1 { "property" } else { "properties" }
    )];
    for listing in results {
        let mut line = format!("- **{}**", listing.name);
        if let Some(price) = price_label(listing) {
            line.push_str(&format!(" - {}", price));
        }
        if let Some(beds) = listing.bedroom_count {
            line.push_str(&format!(", {} bed", beds));
        }
        if !listing.full_address.is_empty() {
            line.push_str(&format!(", {}", listing.full_address));
        }
        lines.push(line);
    }
    lines.push("Would you like more details on any of these?".to_string());
    lines.join("\n")
}

/// Deterministic "which one?" question.
pub fn which_property_fallback(candidates: &[Listing]) -> String {
    let names: Vec<&str> = candidates
        .iter()
        .take(3)
        .map(|l| l.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return prompts::CLARIFICATION_FALLBACK.to_string();
    }
    format!(
        "Which property are you interested in: {}?",
        names.join(", ")
    )
}

/// Deterministic mention of relaxed results.
pub fn relaxed_fallback(dropped: &str, count: usize) -> String {
    format!(
        "I couldn't find exact matches, but I found {} similar {} if you're flexible on the {}. Would you like to adjust that requirement?",
        count,
        if count == 1 { "property" } else { "properties" },
        dropped
    )
}
