//! Intent classification.
//!
//! A keyword pre-filter settles the obvious cases without a model call;
//! everything else goes to the LLM with the seven-category taxonomy.
//! Classification never fails: any model or parse error degrades to
//! [`Classification::fallback`].

use broker_core::types::TransactionType;
use broker_tour::extract_details;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::keywords;
use crate::llm::LlmClient;
use crate::prompts;
use crate::types::{Classification, Intent};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClassification {
    intent: String,
    transaction_type: Value,
    property_name: Value,
}

/// Keyword pre-filter plus LLM fallback.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: LlmClient,
}

impl IntentClassifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Classify `message` given the rendered conversation `context`.
    ///
    /// `tour_active` marks an in-progress tour booking, in which case any
    /// message carrying a scheduling detail continues it.
    pub async fn classify(
        &self,
        context: &str,
        message: &str,
        tour_active: bool,
    ) -> Classification {
        if let Some(quick) = prefilter(message, tour_active) {
            debug!(intent = %quick.intent, "Intent settled by keywords");
            return quick;
        }

        let prompt = prompts::classification(context, message);
        let raw = match self.llm.ask_json::<RawClassification>(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Intent classification failed, treating as conversational");
                return Classification::fallback();
            }
        };

        let mut intent = Intent::parse(&raw.intent).unwrap_or(Intent::ConversationalQuery);
        if intent == Intent::ConversationalQuery && keywords::mentions_location(message) {
            intent = Intent::LocationQuery;
        }
        let transaction = raw
            .transaction_type
            .as_str()
            .and_then(TransactionType::parse)
            .or_else(|| keywords::infer_transaction(message));
        let property_name = raw
            .property_name
            .as_str()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        debug!(
            intent = %intent,
            ?transaction,
            property_name = %property_name,
            "Intent classified by LLM"
        );
        Classification {
            intent,
            transaction,
            property_name,
        }
    }
}

/// Cases decided without the model.
fn prefilter(message: &str, tour_active: bool) -> Option<Classification> {
    if tour_active && extract_details(message).has_any() {
        return Some(Classification::new(Intent::FollowupQuery));
    }
    // Interest in a specific listing needs the model to pick out the name.
    if keywords::expresses_interest(message) {
        return None;
    }

    let location = keywords::mentions_location(message);
    let property = keywords::mentions_property(message);
    if location && !property {
        return Some(Classification::new(Intent::LocationQuery));
    }
    if property && keywords::has_search_cue(message) {
        return Some(
            Classification::new(Intent::PropertyQuery)
                .with_transaction(keywords::infer_transaction(message)),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use std::sync::Arc;
    use std::time::Duration;

    fn classifier(model: Arc<ScriptedModel>) -> IntentClassifier {
        IntentClassifier::new(LlmClient::new(model, Duration::from_secs(5)))
    }

    const MARKER: &str = "Classify this query";

    // ---- keyword pre-filter ----

    #[tokio::test]
    async fn test_location_shortcut() {
        let model = Arc::new(ScriptedModel::new());
        let c = classifier(model.clone())
            .classify("", "What schools are near 164 Old Montauk?", false)
            .await;
        assert_eq!(c.intent, Intent::LocationQuery);
        assert_eq!(c.transaction, None);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_property_shortcut_with_transaction() {
        let model = Arc::new(ScriptedModel::new());
        let c = classifier(model.clone())
            .classify("", "3 bedroom apartment for rent in Brooklyn", false)
            .await;
        assert_eq!(c.intent, Intent::PropertyQuery);
        assert_eq!(c.transaction, Some(TransactionType::Rent));
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_broad_inquiry_reaches_model() {
        let model = Arc::new(ScriptedModel::new().with_rule(
            MARKER,
            r#"{"intent": "INITIAL_INQUIRY", "transaction_type": "buy", "property_name": ""}"#,
        ));
        let c = classifier(model.clone())
            .classify("user: I want to buy a house", "I want to buy a house", false)
            .await;
        assert_eq!(c.intent, Intent::InitialInquiry);
        assert_eq!(c.transaction, Some(TransactionType::Buy));
        assert_eq!(model.count_containing(MARKER), 1);
    }

    #[tokio::test]
    async fn test_interest_reaches_model() {
        let model = Arc::new(ScriptedModel::new().with_rule(
            MARKER,
            r#"{"intent": "PROPERTY_INTEREST", "transaction_type": "unknown", "property_name": " Hampton Bays "}"#,
        ));
        let c = classifier(model)
            .classify("", "I'm interested in the Hampton Bays house", false)
            .await;
        assert_eq!(c.intent, Intent::PropertyInterest);
        assert_eq!(c.property_name, "Hampton Bays");
        assert_eq!(c.transaction, None);
    }

    #[tokio::test]
    async fn test_tour_continuation() {
        let model = Arc::new(ScriptedModel::new());
        let c = classifier(model.clone())
            .classify("", "My name is Jane Doe, jane@example.com", true)
            .await;
        assert_eq!(c.intent, Intent::FollowupQuery);
        assert!(model.prompts().is_empty());
    }

    // ---- model replies ----

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let model = Arc::new(ScriptedModel::new().with_failure(MARKER));
        let c = classifier(model).classify("", "hello there", false).await;
        assert_eq!(c, Classification::fallback());
    }

    #[tokio::test]
    async fn test_garbage_reply_falls_back() {
        let model = Arc::new(ScriptedModel::new().with_rule(MARKER, "PROPERTY_QUERY probably"));
        let c = classifier(model).classify("", "hello there", false).await;
        assert_eq!(c, Classification::fallback());
    }

    #[tokio::test]
    async fn test_unknown_label_is_conversational() {
        let model = Arc::new(ScriptedModel::new().with_rule(MARKER, r#"{"intent": "SMALL_TALK"}"#));
        let c = classifier(model).classify("", "how are you?", false).await;
        assert_eq!(c.intent, Intent::ConversationalQuery);
    }

    #[tokio::test]
    async fn test_proximity_overrides_conversational() {
        let model = Arc::new(ScriptedModel::new().with_rule(
            MARKER,
            r#"{"intent": "CONVERSATIONAL_QUERY", "transaction_type": "unknown"}"#,
        ));
        // Interest phrase bypasses the pre-filter, proximity word is present.
        let c = classifier(model)
            .classify("", "I'd love to visit somewhere near the beach", false)
            .await;
        assert_eq!(c.intent, Intent::LocationQuery);
    }

    #[tokio::test]
    async fn test_unknown_transaction_uses_keywords() {
        let model = Arc::new(ScriptedModel::new().with_rule(
            MARKER,
            r#"{"intent": "PROPERTY_INTEREST", "transaction_type": "unknown", "property_name": "Sunset Loft"}"#,
        ));
        let c = classifier(model)
            .classify("", "I love the Sunset Loft, is it for sale?", false)
            .await;
        assert_eq!(c.transaction, Some(TransactionType::Buy));
    }
}
