//! Error types for the conversational core.

use broker_core::error::BrokerError;
use broker_geo::LocationError;
use broker_tour::TourError;

/// Errors from the chat engine.
///
/// Only the input errors (`EmptyMessage`, `MessageTooLong`) reach the HTTP
/// caller. Everything else raised inside a turn is turned into the
/// error-recovery reply.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("LLM call timed out after {0} seconds")]
    LlmTimeout(u64),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("search error: {0}")]
    Search(#[from] BrokerError),
    #[error("location error: {0}")]
    Location(#[from] LocationError),
    #[error("tour error: {0}")]
    Tour(#[from] TourError),
    #[error("session error: {0}")]
    Session(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Parse(err.to_string())
    }
}

impl ChatError {
    /// Whether the error is the caller's fault rather than the turn's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");

        let err = ChatError::MessageTooLong(2000);
        assert_eq!(
            err.to_string(),
            "message exceeds maximum length of 2000 characters"
        );

        let err = ChatError::Llm("status 500".to_string());
        assert_eq!(err.to_string(), "LLM error: status 500");

        let err = ChatError::LlmTimeout(30);
        assert_eq!(err.to_string(), "LLM call timed out after 30 seconds");

        let err = ChatError::Parse("expected object".to_string());
        assert_eq!(err.to_string(), "parse error: expected object");
    }

    #[test]
    fn test_chat_error_from_broker_error() {
        let err: ChatError = BrokerError::Embedding("no key".to_string()).into();
        assert!(matches!(err, ChatError::Search(_)));
        assert!(err.to_string().contains("no key"));
    }

    #[test]
    fn test_chat_error_from_tour_error() {
        let err: ChatError = TourError::NotActive.into();
        assert_eq!(err.to_string(), "tour error: No tour in progress");
    }

    #[test]
    fn test_chat_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ChatError = json_err.into();
        assert!(matches!(err, ChatError::Parse(_)));
    }

    #[test]
    fn test_client_errors() {
        assert!(ChatError::EmptyMessage.is_client_error());
        assert!(ChatError::MessageTooLong(10).is_client_error());
        assert!(!ChatError::Llm("x".to_string()).is_client_error());
    }
}
