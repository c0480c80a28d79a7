//! Chat orchestrator: runs one conversational turn end to end.
//!
//! A turn validates the message, leases the session, classifies intent,
//! applies the tour rules, dispatches to an intent branch, and saves the
//! session. Failures inside a branch become the error-recovery reply; only
//! invalid input is returned to the caller as an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use broker_core::config::{BrokerConfig, ChatConfig, SessionMode};
use broker_core::types::Listing;
use broker_geo::LocationService;
use broker_tour::{send_confirmation, Mailer, TourProgress, TourScheduling};
use broker_vector::PropertySearchEngine;
use tracing::{debug, error, info, warn};

use crate::error::ChatError;
use crate::intent::IntentClassifier;
use crate::llm::{LanguageModel, LlmClient};
use crate::location::LocationResponder;
use crate::preferences::{recent_context, PreferenceAccumulator};
use crate::prompts;
use crate::response::{self, TurnOutcome};
use crate::search::{
    filter_by_mentions, implicit_query, match_property_name, matches_by_name, PropertyFinder,
};
use crate::session::SessionStore;
use crate::state::{ConversationState, PreferenceDelta, SessionData};
use crate::types::{
    ChatReply, ChatRequest, Classification, ClearSessionResponse, HistoryMessage, Intent,
};

/// History with the persona prepended, unless the client already sent a
/// system message.
pub fn with_system_message(history: &[HistoryMessage]) -> Vec<HistoryMessage> {
    if history.iter().any(|m| m.role == "system") {
        return history.to_vec();
    }
    let mut full = Vec::with_capacity(history.len() + 1);
    full.push(HistoryMessage::new("system", prompts::SYSTEM_MESSAGE));
    full.extend_from_slice(history);
    full
}

/// Classification context: the last `turns` history entries plus the message.
pub fn build_context(history: &[HistoryMessage], message: &str, turns: usize) -> String {
    let mut context = recent_context(history, turns);
    if !context.is_empty() {
        context.push('\n');
    }
    context.push_str("user: ");
    context.push_str(message);
    context
}

/// Property to book when the user asks for a tour.
///
/// Preference order: a named match in the latest results, the only latest
/// result, the current property of interest, the potential property, and
/// finally the first property last shown.
fn tour_candidate(name: &str, session: &SessionData) -> Option<Listing> {
    let latest = &session.latest_property_results;
    let conv = &session.conversation_state;
    if !name.is_empty() {
        if let Some(hit) = latest
            .iter()
            .find(|l| match_property_name(&l.name, name))
        {
            return Some(hit.clone());
        }
    }
    if let [only] = latest.as_slice() {
        return Some(only.clone());
    }
    conv.property_of_interest
        .clone()
        .or_else(|| conv.potential_property.clone())
        .or_else(|| conv.last_shown_properties.first().cloned())
}

/// Central chat orchestrator.
pub struct ChatOrchestrator {
    llm: LlmClient,
    classifier: IntentClassifier,
    preferences: PreferenceAccumulator,
    finder: PropertyFinder,
    location: LocationResponder,
    mailer: Arc<dyn Mailer>,
    sessions: SessionStore,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        engine: Arc<PropertySearchEngine>,
        location: Arc<LocationService>,
        mailer: Arc<dyn Mailer>,
        config: &BrokerConfig,
    ) -> Self {
        let llm = LlmClient::new(model, Duration::from_secs(config.llm.timeout_secs));
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            preferences: PreferenceAccumulator::new(llm.clone(), config.chat.extraction_turns),
            finder: PropertyFinder::new(engine, config.search.top_k, config.search.relaxed_limit),
            location: LocationResponder::new(llm.clone(), location),
            mailer,
            sessions: SessionStore::new(config.chat.session_mode),
            config: config.chat.clone(),
            llm,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn finder(&self) -> &PropertyFinder {
        &self.finder
    }

    fn validate(&self, message: &str) -> Result<(), ChatError> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let max = self.config.max_message_length;
        if message.chars().count() > max {
            return Err(ChatError::MessageTooLong(max));
        }
        Ok(())
    }

    /// Handle one chat turn.
    ///
    /// Returns `Err` only for invalid input. Anything that goes wrong after
    /// the session is leased is logged and answered with the recovery reply.
    pub async fn handle_turn(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let started = Instant::now();
        let ChatRequest {
            message,
            history,
            session_id,
            conversation_state,
        } = request;
        let message = message.trim();
        self.validate(message)?;

        let mut lease = self
            .sessions
            .get_or_create(session_id.as_deref(), conversation_state)
            .await?;
        let session_id = lease.id().to_string();

        let result = self.run_turn(message, &history, &mut lease).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let tour_status = lease.conversation_state.tour_scheduling.status;
        let saved = self.sessions.save(lease);
        let echoed = (self.sessions.mode() == SessionMode::ClientEcho).then_some(saved);

        let reply = match result {
            Ok((intent, outcome)) => {
                info!(
                    session_id = %session_id,
                    intent = %intent,
                    branch = outcome.branch,
                    results = outcome.results.len(),
                    elapsed_ms,
                    "Chat turn handled"
                );
                response::success_reply(intent, outcome, &session_id, elapsed_ms, tour_status, echoed)
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    error = %e,
                    elapsed_ms,
                    "Chat turn failed, sending recovery reply"
                );
                response::recovery_reply(&session_id, elapsed_ms, echoed)
            }
        };
        Ok(reply)
    }

    /// Forget a session.
    pub fn clear_session(&self, session_id: &str) -> ClearSessionResponse {
        let status = self.sessions.clear(session_id);
        info!(session_id = %session_id, ?status, "Session clear requested");
        ClearSessionResponse {
            status,
            session_id: session_id.to_string(),
        }
    }

    async fn run_turn(
        &self,
        message: &str,
        history: &[HistoryMessage],
        session: &mut SessionData,
    ) -> Result<(Intent, TurnOutcome), ChatError> {
        let full_history = with_system_message(history);
        let context = build_context(&full_history, message, self.config.context_turns);

        let tour_active = session.conversation_state.tour_scheduling.is_active();
        let classification = self.classifier.classify(&context, message, tour_active).await;
        let intent = classification.intent;

        let conv = &mut session.conversation_state;
        if !intent.keeps_tour() && conv.tour_scheduling.is_active() {
            info!(intent = %intent, "Topic changed, abandoning tour booking");
        }
        if !intent.keeps_tour() {
            conv.tour_scheduling.reset();
        }

        if conv.tour_scheduling.is_active() {
            return Ok((intent, self.continue_tour(message, conv).await?));
        }

        if conv.awaiting_tour_confirmation {
            if let Some(property) = conv.property_of_interest.clone() {
                if self.llm.ask_yes_no(&prompts::tour_affirmation(message)).await {
                    return Ok((intent, self.start_tour(property, conv).await));
                }
                debug!("Tour offer not accepted this turn");
            }
        }

        let outcome = match intent {
            Intent::InitialInquiry => {
                self.initial_inquiry(
                    &context,
                    message,
                    &classification,
                    &mut session.conversation_state,
                )
                .await
            }
            Intent::PropertyInterest => {
                self.property_interest(&context, message, &classification, session)
                    .await
            }
            Intent::PropertyQuery | Intent::PropertyRejection => {
                self.property_query(message, history, &classification, session)
                    .await?
            }
            Intent::FollowupQuery => {
                self.followup(&context, message, history, &classification, session)
                    .await?
            }
            Intent::LocationQuery => {
                let reply = self
                    .location
                    .answer(message, &session.conversation_state.last_shown_properties)
                    .await;
                TurnOutcome::text("location", reply)
            }
            Intent::ConversationalQuery => {
                let reply = self
                    .llm
                    .ask_or(
                        &prompts::conversational(&context, message),
                        prompts::CONVERSATIONAL_FALLBACK,
                    )
                    .await;
                TurnOutcome::text("conversational", reply)
            }
        };
        Ok((intent, outcome))
    }

    // =========================================================================
    // Tour
    // =========================================================================

    async fn continue_tour(
        &self,
        message: &str,
        conv: &mut ConversationState,
    ) -> Result<TurnOutcome, ChatError> {
        let tour = &mut conv.tour_scheduling;
        match tour.advance(message)? {
            TourProgress::Confirmed => {
                let sent = send_confirmation(self.mailer.as_ref(), tour).await;
                info!(property = tour.property_name(), email_sent = sent, "Tour confirmed");
                let reply = self
                    .llm
                    .ask_or(
                        &prompts::tour_confirmed(tour),
                        &prompts::confirmation_fallback(tour),
                    )
                    .await;
                Ok(TurnOutcome::text("tour_confirmed", reply))
            }
            TourProgress::NeedsMore(next) => {
                debug!(next = %next, "Tour needs more details");
                let reply = self
                    .llm
                    .ask_or(&prompts::tour_step(next, message), prompts::TOUR_FALLBACK)
                    .await;
                Ok(TurnOutcome::text("tour_step", reply))
            }
        }
    }

    async fn start_tour(&self, property: Listing, conv: &mut ConversationState) -> TurnOutcome {
        conv.tour_scheduling = TourScheduling::begin(property.clone());
        conv.property_of_interest = Some(property);
        conv.awaiting_tour_confirmation = false;
        info!(property = conv.tour_scheduling.property_name(), "Tour booking started");
        let reply = self
            .llm
            .ask_or(
                &prompts::tour_start(conv.tour_scheduling.property_name()),
                prompts::TOUR_FALLBACK,
            )
            .await;
        TurnOutcome::text("tour_start", reply)
    }

    // =========================================================================
    // Branches
    // =========================================================================

    async fn initial_inquiry(
        &self,
        context: &str,
        message: &str,
        classification: &Classification,
        conv: &mut ConversationState,
    ) -> TurnOutcome {
        if classification.transaction.is_some() {
            conv.user_preferences.merge(&PreferenceDelta {
                transaction_type: classification.transaction,
                ..PreferenceDelta::default()
            });
        }
        let reply = self
            .llm
            .ask_or(
                &prompts::initial_inquiry(context, message),
                prompts::CLARIFICATION_FALLBACK,
            )
            .await;
        TurnOutcome::text("initial_inquiry", reply)
    }

    async fn property_interest(
        &self,
        context: &str,
        message: &str,
        classification: &Classification,
        session: &mut SessionData,
    ) -> TurnOutcome {
        let name = classification.property_name.as_str();

        if self.llm.ask_yes_no(&prompts::tour_intent(message)).await {
            return match tour_candidate(name, session) {
                Some(property) => {
                    self.start_tour(property, &mut session.conversation_state)
                        .await
                }
                None => {
                    let reply = self
                        .llm
                        .ask_or(&prompts::tour_which_property(context), prompts::TOUR_FALLBACK)
                        .await;
                    TurnOutcome::text("tour_which_property", reply)
                }
            };
        }

        if name.is_empty() {
            let candidates = if session.conversation_state.last_shown_properties.is_empty() {
                session.latest_property_results.clone()
            } else {
                session.conversation_state.last_shown_properties.clone()
            };
            return match candidates.as_slice() {
                [] => {
                    let reply = self
                        .llm
                        .ask_or(
                            &prompts::interest_unknown(context),
                            prompts::CLARIFICATION_FALLBACK,
                        )
                        .await;
                    TurnOutcome::text("interest_unknown", reply)
                }
                [only] => {
                    self.offer_tour(only.clone(), &mut session.conversation_state)
                        .await
                }
                several => {
                    let reply = self
                        .llm
                        .ask_or(
                            &prompts::interest_which_of(context, several),
                            &response::which_property_fallback(several),
                        )
                        .await;
                    TurnOutcome::text("interest_which", reply)
                }
            };
        }

        let shown: Vec<Listing> = session
            .conversation_state
            .last_shown_properties
            .iter()
            .chain(session.latest_property_results.iter())
            .cloned()
            .collect();
        let candidates = matches_by_name(&shown, name);
        if candidates.len() > 1 {
            debug!(name = %name, matches = candidates.len(), "Property name is ambiguous");
            let reply = self
                .llm
                .ask_or(
                    &prompts::interest_which_of(context, &candidates),
                    &response::which_property_fallback(&candidates),
                )
                .await;
            return TurnOutcome::text("interest_which", reply).with_results(candidates);
        }
        match self.finder.find_by_name(&shown, name) {
            Some(property) => {
                self.offer_tour(property, &mut session.conversation_state)
                    .await
            }
            None => {
                info!(name = %name, "Property of interest not found");
                TurnOutcome::text("interest_not_found", prompts::property_not_found(name))
            }
        }
    }

    /// Describe the property and offer a tour on the next turn.
    async fn offer_tour(&self, property: Listing, conv: &mut ConversationState) -> TurnOutcome {
        let reply = self
            .llm
            .ask_or(
                &prompts::interest_in(&property),
                &prompts::interest_fallback(&property),
            )
            .await;
        conv.property_of_interest = Some(property.clone());
        conv.potential_property = Some(property.clone());
        conv.awaiting_tour_confirmation = true;
        TurnOutcome::text("property_interest", reply).with_results(vec![property])
    }

    async fn property_query(
        &self,
        message: &str,
        history: &[HistoryMessage],
        classification: &Classification,
        session: &mut SessionData,
    ) -> Result<TurnOutcome, ChatError> {
        let filters = self
            .preferences
            .extract_display_filters(message, history)
            .await;
        let prefs = &mut session.conversation_state.user_preferences;
        self.preferences
            .extract_and_merge(message, history, prefs, classification.transaction)
            .await;

        if !prefs.is_sufficient() {
            let reply = self
                .preferences
                .clarification(message, prefs, &self.finder.available_locations())
                .await;
            return Ok(TurnOutcome::text("clarification", reply).with_filters(filters));
        }

        let prefs = prefs.clone();
        let results = self
            .finder
            .search_properties(message, classification, &prefs)
            .await?;
        if !results.is_empty() {
            let outcome = self.present_results(message, results, session).await;
            return Ok(outcome.with_filters(filters));
        }

        let outcome = match self
            .finder
            .relaxed_search(message, classification.transaction, &prefs)
            .await?
        {
            Some(relaxed) => {
                let label = relaxed.dropped.label();
                let count = relaxed.results.len();
                let reply = self
                    .llm
                    .ask_or(
                        &prompts::relaxed_results(&prefs, label, count),
                        &response::relaxed_fallback(label, count),
                    )
                    .await;
                session.latest_property_results = relaxed.results.clone();
                session.conversation_state.last_shown_properties = relaxed.results.clone();
                TurnOutcome::text("relaxed_results", reply).with_results(relaxed.results)
            }
            None => {
                let reply = self
                    .llm
                    .ask_or(&prompts::no_results(&prefs), prompts::NO_RESULTS_FALLBACK)
                    .await;
                TurnOutcome::text("no_results", reply)
            }
        };
        Ok(outcome.with_filters(filters))
    }

    async fn followup(
        &self,
        context: &str,
        message: &str,
        history: &[HistoryMessage],
        classification: &Classification,
        session: &mut SessionData,
    ) -> Result<TurnOutcome, ChatError> {
        let filters = self
            .preferences
            .extract_display_filters(message, history)
            .await;
        self.preferences
            .extract_and_merge(
                message,
                history,
                &mut session.conversation_state.user_preferences,
                classification.transaction,
            )
            .await;

        let prefs = session.conversation_state.user_preferences.clone();
        if prefs.is_sufficient() {
            let query = implicit_query(&prefs);
            debug!(query = %query, "Follow-up search from accumulated preferences");
            let results = self
                .finder
                .search_properties(&query, classification, &prefs)
                .await?;
            let outcome = if results.is_empty() {
                let reply = self
                    .llm
                    .ask_or(&prompts::no_results(&prefs), prompts::NO_RESULTS_FALLBACK)
                    .await;
                TurnOutcome::text("no_results", reply)
            } else {
                self.present_results(&query, results, session).await
            };
            return Ok(outcome.with_filters(filters));
        }

        let shown = &session.conversation_state.last_shown_properties;
        let outcome = if shown.is_empty() {
            let reply = self
                .preferences
                .clarification(message, &prefs, &self.finder.available_locations())
                .await;
            TurnOutcome::text("clarification", reply)
        } else {
            let reply = self
                .llm
                .ask_or(
                    &prompts::followup_answer(context, message, shown),
                    prompts::CONVERSATIONAL_FALLBACK,
                )
                .await;
            TurnOutcome::text("followup_answer", reply)
        };
        Ok(outcome.with_filters(filters))
    }

    /// Narrate the results, remember what was shown, and compress the reply.
    async fn present_results(
        &self,
        query: &str,
        results: Vec<Listing>,
        session: &mut SessionData,
    ) -> TurnOutcome {
        let narrative = match self.llm.ask(&prompts::results_narrative(query, &results)).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => response::summarize_results(&results),
            Err(e) => {
                warn!(error = %e, "Results narrative failed, using plain summary");
                response::summarize_results(&results)
            }
        };

        let shown = filter_by_mentions(&results, &narrative);
        session.latest_property_results = shown.clone();
        let conv = &mut session.conversation_state;
        conv.last_shown_properties = shown.clone();
        if let [only] = shown.as_slice() {
            conv.potential_property = Some(only.clone());
        }

        let reply = self
            .llm
            .ask_or(&prompts::compress(&narrative), &narrative)
            .await;
        TurnOutcome::text("search_results", reply).with_results(shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::types::ClearStatus;
    use broker_core::catalog::Catalog;
    use broker_core::error::BrokerError;
    use broker_core::types::{Property, TransactionType};
    use broker_geo::{Coordinates, PoiCategory, RawPoi, StaticGeocoder, StaticPoiSource};
    use broker_tour::{RecordingMailer, TourStatus};
    use broker_vector::{EmbeddingService, MockEmbedding};
    use serde_json::json;

    // =========================================================================
    // Fixtures
    // =========================================================================

    const CLASSIFY: &str = "Classify this query into EXACTLY ONE";
    const PREFS: &str = "Extract any mentioned preferences";
    const FILTERS: &str = "Extract specific property filters";
    const NARRATIVE: &str = "Write a conversational, well-formatted reply";
    const COMPRESS: &str = "Summarize these property results";
    const TOUR_INTENT: &str = "Does the user want to schedule a tour";
    const AFFIRM: &str = "Is the user accepting an offer to tour";

    fn property(value: serde_json::Value) -> Property {
        let mut prop: Property = serde_json::from_value(value).unwrap();
        prop.embedding = MockEmbedding::new().vector_for(&prop.listing.name);
        prop
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::new(vec![
            property(json!({"id": "loft3", "name": "Brooklyn Heights Loft",
                            "fullAddress": "10 Hicks St, Brooklyn, NY", "propertyType": "Apartment",
                            "leaseProperty": true, "monthlyRent": 3000, "bedroomCount": 3})),
            property(json!({"id": "loft2", "name": "Williamsburg Walkup",
                            "fullAddress": "5 Bedford Ave, Brooklyn, NY", "propertyType": "Apartment",
                            "leaseProperty": true, "monthlyRent": 2500, "bedroomCount": 2})),
            property(json!({"id": "bk-house", "name": "Park Slope Brownstone",
                            "fullAddress": "7 5th Ave, Brooklyn, NY", "propertyType": "House",
                            "salesPrice": 1800000, "bedroomCount": 3})),
            property(json!({"id": "hb", "name": "Hampton Bays Renovated House",
                            "fullAddress": "12 Shore Rd, Hampton Bays, NY", "propertyType": "House",
                            "leaseProperty": true, "monthlyRent": 42000, "bedroomCount": 4})),
        ]))
    }

    struct Harness {
        orchestrator: ChatOrchestrator,
        model: Arc<ScriptedModel>,
        mailer: Arc<RecordingMailer>,
    }

    fn harness_with(model: ScriptedModel, mode: SessionMode) -> Harness {
        let model = Arc::new(model);
        let mailer = Arc::new(RecordingMailer::new());
        let engine = Arc::new(PropertySearchEngine::new(catalog(), MockEmbedding::new(), 100));
        let geocoder =
            StaticGeocoder::new().with_place("164 Old Montauk", Coordinates::new(40.95, -72.3));
        let pois = StaticPoiSource::new().with_pois(
            PoiCategory::Schools,
            (0..7)
                .map(|i| RawPoi {
                    name: format!("School {}", i),
                    category: "School".to_string(),
                    distance_km: 4.0 - i as f64 * 0.5,
                    description: String::new(),
                })
                .collect(),
        );
        let mut config = BrokerConfig::default();
        config.chat.session_mode = mode;
        let location = Arc::new(LocationService::new(
            Arc::new(geocoder),
            Arc::new(pois),
            &config.location,
        ));
        let orchestrator =
            ChatOrchestrator::new(model.clone(), engine, location, mailer.clone(), &config);
        Harness {
            orchestrator,
            model,
            mailer,
        }
    }

    fn harness(model: ScriptedModel) -> Harness {
        harness_with(model, SessionMode::InMemory)
    }

    fn listing(id: &str) -> Listing {
        catalog().get(id).unwrap().to_listing()
    }

    fn echo_request(message: &str, state: SessionData) -> ChatRequest {
        ChatRequest {
            conversation_state: Some(state),
            ..ChatRequest::new(message).with_session("echo-1")
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let h = harness(ScriptedModel::new());
        let err = h
            .orchestrator
            .handle_turn(ChatRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(h.orchestrator.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_long_message_rejected() {
        let h = harness(ScriptedModel::new());
        let err = h
            .orchestrator
            .handle_turn(ChatRequest::new(&"a".repeat(2001)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MessageTooLong(2000)));
    }

    // ---- context ----

    #[test]
    fn test_system_message_inserted_once() {
        let history = vec![HistoryMessage::new("user", "hi")];
        let full = with_system_message(&history);
        assert_eq!(full.len(), 2);
        assert_eq!(full[0].role, "system");
        assert_eq!(with_system_message(&full).len(), 2);
    }

    #[test]
    fn test_context_window() {
        let history: Vec<HistoryMessage> = (1..=7)
            .map(|i| HistoryMessage::new("user", &format!("m{}", i)))
            .collect();
        let context = build_context(&history, "now", 5);
        assert!(!context.contains("m2"));
        assert!(context.starts_with("user: m3"));
        assert!(context.ends_with("user: now"));
    }

    // =========================================================================
    // Scenarios
    // =========================================================================

    #[tokio::test]
    async fn test_initial_inquiry() {
        let h = harness(
            ScriptedModel::new()
                .with_rule(
                    CLASSIFY,
                    r#"{"intent": "INITIAL_INQUIRY", "transaction_type": "buy", "property_name": ""}"#,
                )
                .with_rule("initial inquiry", "Wonderful! Which area are you considering?"),
        );
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("I want to buy a house"))
            .await
            .unwrap();

        assert_eq!(reply.intent, "initial_inquiry");
        assert_eq!(reply.response, "Wonderful! Which area are you considering?");
        assert!(reply.results.is_empty());
        assert!(reply.conversation_state.is_none());
    }

    #[tokio::test]
    async fn test_brooklyn_rental_search() {
        let h = harness(
            ScriptedModel::new()
                .with_rule(FILTERS, r#"{"transaction_type": "rent", "bedrooms": 3, "location": "Brooklyn"}"#)
                .with_rule(
                    PREFS,
                    r#"{"transaction_type": "rent", "location": "Brooklyn", "property_type": "apartment", "bedrooms": 3}"#,
                )
                .with_rule(NARRATIVE, "- **Brooklyn Heights Loft** - $3,000/month, 3 bed")
                .with_rule(COMPRESS, "I found a 3-bedroom loft in Brooklyn Heights. Want to see it?"),
        );
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("3 bedroom apartment for rent in Brooklyn"))
            .await
            .unwrap();

        assert_eq!(reply.intent, "property_query");
        let ids: Vec<&str> = reply.results.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["loft3"]);
        assert_eq!(
            reply.response,
            "I found a 3-bedroom loft in Brooklyn Heights. Want to see it?"
        );
        let filters = reply.parsed_filters.unwrap();
        assert_eq!(filters.transaction_type, Some(TransactionType::Rent));
        assert_eq!(filters.bedrooms, Some(3));
        // The classifier settled the intent without a model call.
        assert_eq!(h.model.count_containing(CLASSIFY), 0);
    }

    #[tokio::test]
    async fn test_insufficient_criteria_asks_one_question() {
        let h = harness(
            ScriptedModel::new()
                .with_rule(PREFS, r#"{"bedrooms": 2}"#)
                .with_rule("asks for ONE missing piece", "Are you looking to buy or rent?"),
        );
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("show me 2 bedroom homes"))
            .await
            .unwrap();
        assert_eq!(reply.response, "Are you looking to buy or rent?");
        assert!(reply.results.is_empty());
    }

    #[tokio::test]
    async fn test_relaxed_results_mentioned() {
        let h = harness(
            ScriptedModel::new()
                .with_rule(
                    PREFS,
                    r#"{"transaction_type": "rent", "location": "Brooklyn", "bedrooms": 5}"#,
                )
                .with_rule("No exact matches", "Nothing with 5 bedrooms, but I have 2 close options."),
        );
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("5 bedroom rental in Brooklyn"))
            .await
            .unwrap();
        assert_eq!(reply.response, "Nothing with 5 bedrooms, but I have 2 close options.");
        assert_eq!(reply.results.len(), 2);
        assert!(reply.results.iter().all(|l| l.lease_property));
    }

    #[tokio::test]
    async fn test_no_results_fallback() {
        let h = harness(ScriptedModel::new().with_rule(
            PREFS,
            r#"{"transaction_type": "buy", "location": "Queens"}"#,
        ));
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("houses for sale in Queens"))
            .await
            .unwrap();
        assert_eq!(reply.response, prompts::NO_RESULTS_FALLBACK);
        assert!(reply.results.is_empty());
    }

    #[tokio::test]
    async fn test_interest_in_shown_property() {
        let h = harness_with(
            ScriptedModel::new()
                .with_rule(
                    CLASSIFY,
                    r#"{"intent": "PROPERTY_INTEREST", "transaction_type": "rent", "property_name": "Hampton Bays house"}"#,
                )
                .with_rule(TOUR_INTENT, "no"),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.last_shown_properties = vec![listing("hb")];

        let reply = h
            .orchestrator
            .handle_turn(echo_request("I'm interested in the Hampton Bays house", state))
            .await
            .unwrap();

        assert_eq!(reply.intent, "property_interest");
        assert_eq!(reply.results[0].id, "hb");
        assert!(reply.response.contains("schedule a tour"));
        let echoed = reply.conversation_state.unwrap();
        assert!(echoed.conversation_state.awaiting_tour_confirmation);
        assert_eq!(
            echoed.conversation_state.property_of_interest.unwrap().id,
            "hb"
        );
    }

    #[tokio::test]
    async fn test_ambiguous_interest_asks_which() {
        let h = harness_with(
            ScriptedModel::new()
                .with_rule(
                    CLASSIFY,
                    r#"{"intent": "PROPERTY_INTEREST", "property_name": "house"}"#,
                )
                .with_rule(TOUR_INTENT, "no"),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.last_shown_properties = vec![listing("hb"), listing("bk-house")];
        state.conversation_state.last_shown_properties[1].name = "Park Slope House".into();
        state.latest_property_results = state.conversation_state.last_shown_properties.clone();

        let reply = h
            .orchestrator
            .handle_turn(echo_request("I'm interested in the house", state))
            .await
            .unwrap();

        assert_eq!(
            reply.response,
            "Which property are you interested in: Hampton Bays Renovated House, Park Slope House?"
        );
        assert_eq!(reply.results.len(), 2);
        let conv = reply.conversation_state.unwrap().conversation_state;
        assert!(!conv.awaiting_tour_confirmation);
        assert!(conv.property_of_interest.is_none());
    }

    #[tokio::test]
    async fn test_interest_unknown_property() {
        let h = harness(
            ScriptedModel::new()
                .with_rule(
                    CLASSIFY,
                    r#"{"intent": "PROPERTY_INTEREST", "property_name": "Sunset Castle"}"#,
                )
                .with_rule(TOUR_INTENT, "no"),
        );
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("I love the Sunset Castle"))
            .await
            .unwrap();
        assert_eq!(reply.response, prompts::property_not_found("Sunset Castle"));
    }

    #[tokio::test]
    async fn test_accepting_tour_offer_starts_booking() {
        let h = harness_with(
            ScriptedModel::new()
                .with_rule(CLASSIFY, r#"{"intent": "CONVERSATIONAL_QUERY"}"#)
                .with_rule(AFFIRM, "Yes"),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.awaiting_tour_confirmation = true;
        state.conversation_state.property_of_interest = Some(listing("hb"));

        let reply = h
            .orchestrator
            .handle_turn(echo_request("Yes, I'd really like that", state))
            .await
            .unwrap();

        assert_eq!(reply.response, prompts::TOUR_FALLBACK);
        let conv = reply.conversation_state.unwrap().conversation_state;
        assert!(!conv.awaiting_tour_confirmation);
        assert_eq!(conv.tour_scheduling.status, TourStatus::AwaitingTime);
        assert_eq!(conv.tour_scheduling.property_name(), "Hampton Bays Renovated House");
    }

    #[tokio::test]
    async fn test_declining_tour_offer_keeps_flag() {
        let h = harness_with(
            ScriptedModel::new()
                .with_rule(CLASSIFY, r#"{"intent": "CONVERSATIONAL_QUERY"}"#)
                .with_rule(AFFIRM, "no")
                .with_rule("conversational query", "No problem at all."),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.awaiting_tour_confirmation = true;
        state.conversation_state.property_of_interest = Some(listing("hb"));

        let reply = h
            .orchestrator
            .handle_turn(echo_request("Not right now, thanks", state))
            .await
            .unwrap();
        assert_eq!(reply.response, "No problem at all.");
        let conv = reply.conversation_state.unwrap().conversation_state;
        assert!(conv.awaiting_tour_confirmation);
        assert_eq!(conv.tour_scheduling.status, TourStatus::Idle);
    }

    #[tokio::test]
    async fn test_tour_details_in_one_turn_confirm_booking() {
        let h = harness_with(ScriptedModel::new(), SessionMode::ClientEcho);
        let mut state = SessionData::default();
        let mut tour = TourScheduling::begin(listing("hb"));
        tour.status = TourStatus::AwaitingName;
        state.conversation_state.tour_scheduling = tour;

        let reply = h
            .orchestrator
            .handle_turn(echo_request(
                "My name is Jane Doe, jane@example.com, tomorrow at 3pm",
                state,
            ))
            .await
            .unwrap();

        assert_eq!(reply.intent, "followup_query");
        assert!(reply.response.contains("tomorrow"));
        assert!(reply.response.contains("3pm"));
        assert!(reply.response.contains("A confirmation email has been sent to jane@example.com"));
        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@example.com");

        let tour = reply.conversation_state.unwrap().conversation_state.tour_scheduling;
        assert_eq!(tour.status, TourStatus::Confirmed);
        assert!(tour.email_sent);
        assert_eq!(tour.name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_tour_step_asks_for_next_slot() {
        let h = harness_with(
            ScriptedModel::new().with_rule("The user is scheduling a tour", "And your name?"),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.tour_scheduling = TourScheduling::begin(listing("hb"));

        let reply = h
            .orchestrator
            .handle_turn(echo_request("tomorrow at 3pm works", state))
            .await
            .unwrap();
        assert_eq!(reply.response, "And your name?");
        let tour = reply.conversation_state.unwrap().conversation_state.tour_scheduling;
        assert_eq!(tour.status, TourStatus::AwaitingName);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_topic_change_abandons_tour() {
        let h = harness_with(
            ScriptedModel::new().with_rule("Extract the address", "164 Old Montauk"),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.tour_scheduling = TourScheduling::begin(listing("hb"));

        let reply = h
            .orchestrator
            .handle_turn(echo_request("What schools are near 164 Old Montauk?", state))
            .await
            .unwrap();

        assert_eq!(reply.intent, "location_query");
        let tour = reply.conversation_state.unwrap().conversation_state.tour_scheduling;
        assert_eq!(tour, TourScheduling::default());
    }

    #[tokio::test]
    async fn test_schools_near_address() {
        let h = harness(ScriptedModel::new().with_rule("Extract the address", "164 Old Montauk"));
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("What schools are near 164 Old Montauk?"))
            .await
            .unwrap();

        assert_eq!(reply.intent, "location_query");
        let distances: Vec<f64> = reply
            .response
            .lines()
            .filter(|l| l.starts_with('•'))
            .map(|l| {
                let miles = l.rsplit(" - ").next().unwrap().trim_end_matches(" miles");
                miles.parse::<f64>().unwrap()
            })
            .collect();
        assert_eq!(distances.len(), 5);
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert!(reply.response.contains("0.62 miles"));
    }

    // =========================================================================
    // Follow-ups and sessions
    // =========================================================================

    #[tokio::test]
    async fn test_preferences_accumulate_across_turns() {
        let h = harness(
            ScriptedModel::new()
                .with_failure(FILTERS)
                .with_rule(CLASSIFY, r#"{"intent": "FOLLOWUP_QUERY"}"#)
                .with_rule("asks for ONE missing piece", "Which area do you prefer?")
                .with_rule("Brooklyn please", r#"{"location": "Brooklyn"}"#)
                .with_rule(PREFS, r#"{"transaction_type": "rent"}"#),
        );
        let first = h
            .orchestrator
            .handle_turn(ChatRequest::new("I'd like to rent"))
            .await
            .unwrap();
        assert_eq!(first.response, "Which area do you prefer?");
        assert!(first.results.is_empty());
        assert_eq!(h.orchestrator.sessions().len(), 1);

        let second = h
            .orchestrator
            .handle_turn(ChatRequest::new("Brooklyn please").with_session(&first.session_id))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.results.len(), 2);
        assert!(second.response.starts_with("I found 2 properties"));

        let lease = h
            .orchestrator
            .sessions()
            .get_or_create(Some(&first.session_id), None)
            .await
            .unwrap();
        let prefs = &lease.conversation_state.user_preferences;
        assert_eq!(prefs.transaction_type, Some(TransactionType::Rent));
        assert_eq!(prefs.location.as_deref(), Some("Brooklyn"));
        assert_eq!(lease.latest_property_results.len(), 2);
    }

    #[tokio::test]
    async fn test_followup_runs_implicit_search() {
        let h = harness_with(
            ScriptedModel::new()
                .with_rule(CLASSIFY, r#"{"intent": "FOLLOWUP_QUERY"}"#)
                .with_rule(PREFS, "{}")
                .with_rule(NARRATIVE, "- **Williamsburg Walkup** is a great fit")
                .with_rule(COMPRESS, "The Williamsburg Walkup fits. Want details?"),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.user_preferences.merge(&PreferenceDelta {
            transaction_type: Some(TransactionType::Rent),
            location: Some("Brooklyn".into()),
            bedrooms: Some(2),
            ..PreferenceDelta::default()
        });

        let reply = h
            .orchestrator
            .handle_turn(echo_request("what else do you have?", state))
            .await
            .unwrap();

        assert_eq!(reply.results.len(), 1);
        assert_eq!(reply.results[0].id, "loft2");
        let prompt = h
            .model
            .prompts()
            .into_iter()
            .find(|p| p.contains(NARRATIVE))
            .unwrap();
        assert!(prompt.contains("User query: for rent 2-bedroom in Brooklyn"));
        let conv = reply.conversation_state.unwrap().conversation_state;
        assert_eq!(conv.last_shown_properties.len(), 1);
    }

    #[tokio::test]
    async fn test_followup_answers_about_shown() {
        let h = harness_with(
            ScriptedModel::new()
                .with_rule(CLASSIFY, r#"{"intent": "FOLLOWUP_QUERY"}"#)
                .with_rule(PREFS, "{}")
                .with_rule("previous search results", "Yes, it has a lovely garden."),
            SessionMode::ClientEcho,
        );
        let mut state = SessionData::default();
        state.conversation_state.last_shown_properties = vec![listing("hb")];

        let reply = h
            .orchestrator
            .handle_turn(echo_request("does it have outdoor space?", state))
            .await
            .unwrap();
        assert_eq!(reply.response, "Yes, it has a lovely garden.");
    }

    #[tokio::test]
    async fn test_client_echo_round_trip() {
        let h = harness_with(
            ScriptedModel::new().with_rule(
                CLASSIFY,
                r#"{"intent": "INITIAL_INQUIRY", "transaction_type": "rent"}"#,
            ),
            SessionMode::ClientEcho,
        );
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("I'm hoping to find a place"))
            .await
            .unwrap();
        let state = reply.conversation_state.clone().unwrap();
        assert_eq!(
            state.conversation_state.user_preferences.transaction_type,
            Some(TransactionType::Rent)
        );

        let wire = serde_json::to_value(&reply).unwrap();
        let echoed: SessionData =
            serde_json::from_value(wire["conversation_state"].clone()).unwrap();
        assert_eq!(echoed, state);
        assert!(h.orchestrator.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_clear_session() {
        let h = harness(ScriptedModel::new());
        let reply = h
            .orchestrator
            .handle_turn(ChatRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(
            h.orchestrator.clear_session(&reply.session_id).status,
            ClearStatus::Cleared
        );
        assert_eq!(
            h.orchestrator.clear_session(&reply.session_id).status,
            ClearStatus::NotFound
        );
    }

    // =========================================================================
    // Error recovery
    // =========================================================================

    struct BrokenEmbedding;

    impl EmbeddingService for BrokenEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BrokerError> {
            Err(BrokerError::Embedding("service unavailable".to_string()))
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn test_internal_failure_becomes_recovery_reply() {
        let model = Arc::new(ScriptedModel::new().with_rule(
            PREFS,
            r#"{"transaction_type": "rent", "location": "Brooklyn"}"#,
        ));
        let engine = Arc::new(PropertySearchEngine::new(catalog(), BrokenEmbedding, 10));
        let config = BrokerConfig::default();
        let location = Arc::new(LocationService::new(
            Arc::new(StaticGeocoder::new()),
            Arc::new(StaticPoiSource::new()),
            &config.location,
        ));
        let orchestrator = ChatOrchestrator::new(
            model,
            engine,
            location,
            Arc::new(RecordingMailer::new()),
            &config,
        );

        let reply = orchestrator
            .handle_turn(ChatRequest::new("apartments for rent in Brooklyn"))
            .await
            .unwrap();
        assert_eq!(reply.intent, response::ERROR_RECOVERY_INTENT);
        assert_eq!(reply.response, prompts::ERROR_RECOVERY_REPLY);
        assert_eq!(reply.metadata["error"], "Internal server error");
        assert!(!reply.session_id.is_empty());
        // The session survives the failed turn.
        assert_eq!(orchestrator.sessions().len(), 1);
    }
}
