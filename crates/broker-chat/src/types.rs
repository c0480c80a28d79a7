//! Wire types for the chat turn: intents, requests, and replies.

use std::fmt;

use broker_core::types::{Listing, TransactionType};
use serde::{Deserialize, Serialize};

use crate::state::SessionData;

/// The classified purpose of one user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    PropertyQuery,
    FollowupQuery,
    PropertyInterest,
    PropertyRejection,
    InitialInquiry,
    LocationQuery,
    ConversationalQuery,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::PropertyQuery,
        Intent::FollowupQuery,
        Intent::PropertyInterest,
        Intent::PropertyRejection,
        Intent::InitialInquiry,
        Intent::LocationQuery,
        Intent::ConversationalQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PropertyQuery => "PROPERTY_QUERY",
            Intent::FollowupQuery => "FOLLOWUP_QUERY",
            Intent::PropertyInterest => "PROPERTY_INTEREST",
            Intent::PropertyRejection => "PROPERTY_REJECTION",
            Intent::InitialInquiry => "INITIAL_INQUIRY",
            Intent::LocationQuery => "LOCATION_QUERY",
            Intent::ConversationalQuery => "CONVERSATIONAL_QUERY",
        }
    }

    /// Lenient parse of an LLM-reported intent label.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_uppercase().replace([' ', '-'], "_");
        Intent::ALL.into_iter().find(|i| i.as_str() == normalized)
    }

    /// Lower-case form used in the reply payload.
    pub fn wire_name(&self) -> String {
        self.as_str().to_lowercase()
    }

    /// Intents that keep an in-progress tour alive.
    pub fn keeps_tour(&self) -> bool {
        matches!(self, Intent::PropertyInterest | Intent::FollowupQuery)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of intent classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub transaction: Option<TransactionType>,
    /// Name of a specific property mentioned, or empty.
    pub property_name: String,
}

impl Classification {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            transaction: None,
            property_name: String::new(),
        }
    }

    pub fn with_transaction(mut self, transaction: Option<TransactionType>) -> Self {
        self.transaction = transaction;
        self
    }

    /// What classification degrades to when the model is unavailable.
    pub fn fallback() -> Self {
        Self::new(Intent::ConversationalQuery)
    }
}

/// One prior chat message as the client sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl HistoryMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Previous state echoed back by the client (client-echo mode only).
    #[serde(default)]
    pub conversation_state: Option<SessionData>,
}

impl ChatRequest {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    General,
    Error,
}

/// Filters extracted from a message for the client's filter sidebar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
}

impl DisplayFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Reply to one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub response_type: ResponseType,
    /// Lower-case intent name, or `error_recovery`.
    pub intent: String,
    pub results: Vec<Listing>,
    pub suggestions: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub parsed_filters: Option<DisplayFilters>,
    pub session_id: String,
    /// Full session state, present only in client-echo mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_state: Option<SessionData>,
}

/// Outcome of `POST /clear-session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearStatus {
    Cleared,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearSessionResponse {
    pub status: ClearStatus,
    pub session_id: String,
}
