//! Conversational layer of the broker assistant.
//!
//! Classifies each message, accumulates the client's search preferences
//! across turns, runs property and location lookups, drives tour booking,
//! and writes replies through an LLM with deterministic fallbacks.

pub mod error;
pub mod intent;
pub mod keywords;
pub mod llm;
pub mod location;
pub mod orchestrator;
pub mod preferences;
pub mod prompts;
pub mod response;
pub mod search;
pub mod session;
pub mod state;
pub mod types;

pub use error::ChatError;
pub use intent::IntentClassifier;
pub use llm::{LanguageModel, LlmClient, OpenAiChatModel, ScriptedModel};
pub use location::LocationResponder;
pub use orchestrator::ChatOrchestrator;
pub use preferences::PreferenceAccumulator;
pub use response::TurnOutcome;
pub use search::{PropertyFinder, Relaxation, RelaxedResults};
pub use session::{SessionLease, SessionStore};
pub use state::{ConversationState, PreferenceDelta, SessionData, UserPreferences};
pub use types::{
    ChatReply, ChatRequest, Classification, ClearSessionResponse, ClearStatus, DisplayFilters,
    HistoryMessage, Intent, ResponseType,
};
