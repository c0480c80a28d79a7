//! Prompt builders and canned replies.
//!
//! Each builder opens with a fixed instruction line so replies can be
//! scripted by prompt substring in tests.

use broker_core::types::Listing;
use broker_tour::{TourScheduling, TourStatus};

use crate::state::{MissingCriterion, UserPreferences};

/// Persona prepended to the conversation once.
pub const SYSTEM_MESSAGE: &str = "You are Serhant, a seasoned real estate agent who helps clients buy or rent homes.
Work the way a good broker does:
- Ask one focused qualifying question at a time (area, budget, buy or rent, property type, bedrooms, must-haves, move-in timeline).
- Keep a warm, professional tone and mention relevant market context when it helps.
- Remember what the client already told you and never ask for it twice.
Narrow the options quickly and recommend listings that fit what the client actually needs.";

pub const ERROR_RECOVERY_REPLY: &str = "I'm sorry, I'm having trouble understanding. Could you rephrase your question about what you're looking for?";

pub const CLARIFICATION_FALLBACK: &str = "I'd be happy to help you find properties! Could you tell me a bit more about what you're looking for?";

pub const TOUR_FALLBACK: &str = "I'd be happy to help schedule your tour. Could you tell me your preferred date and time?";

pub const LOCATION_ERROR_REPLY: &str = "I'm having trouble processing that location query. Could you try rephrasing your question?";

pub const NO_ADDRESS_REPLY: &str = "I couldn't identify a specific address in your message. Could you provide the full address you're asking about?";

pub const NO_RESULTS_FALLBACK: &str = "I couldn't find any properties matching those criteria. Would you like to adjust your budget, area, or number of bedrooms?";

pub const CONVERSATIONAL_FALLBACK: &str = "I'm here to help with anything real estate. Are you thinking about buying or renting?";

pub fn property_not_found(name: &str) -> String {
    format!(
        "I couldn't find a property named '{}'. Could you clarify which property you're interested in?",
        name
    )
}

pub fn geocode_miss(address: &str) -> String {
    format!(
        "I couldn't find location information for '{}'. Could you provide a more specific address or check the spelling?",
        address
    )
}

/// Deterministic confirmation used when the model cannot phrase one.
pub fn confirmation_fallback(tour: &TourScheduling) -> String {
    let date = tour.date.as_deref().unwrap_or_default();
    let time = tour.time.as_deref().unwrap_or_default();
    let email = tour.email.as_deref().unwrap_or_default();
    let delivery = if tour.email_sent {
        format!("A confirmation email has been sent to {}.", email)
    } else {
        format!(
            "I wasn't able to send the confirmation email to {}, but your booking is recorded.",
            email
        )
    };
    format!(
        "Great! I've scheduled your tour for {} on {} at {}. {} Is there anything specific you'd like to know about the property before the tour?",
        tour.property_name(),
        date,
        time,
        delivery
    )
}

pub fn interest_fallback(property: &Listing) -> String {
    format!(
        "Great choice! {} is a wonderful property. Would you like to schedule a tour?",
        display_name(property)
    )
}

fn display_name(property: &Listing) -> &str {
    if property.name.is_empty() {
        "this property"
    } else {
        &property.name
    }
}

fn listings_json(listings: &[Listing]) -> String {
    serde_json::to_string_pretty(listings).unwrap_or_default()
}

// =============================================================================
// Classification and extraction
// =============================================================================

pub fn classification(context: &str, message: &str) -> String {
    format!(
        r#"Classify this query into EXACTLY ONE of the categories below.

Context: {context}
User Query: {message}

1. PROPERTY_QUERY: a new search for properties with specific criteria
2. FOLLOWUP_QUERY: a question about previously shown properties without new criteria
3. PROPERTY_INTEREST: the user likes or wants to know more about one specific property
4. PROPERTY_REJECTION: the user says a shown property is not for them
5. INITIAL_INQUIRY: a first, broad statement about looking for a property
6. LOCATION_QUERY: any question about schools, amenities, attractions or services near an address, property or place
7. CONVERSATIONAL_QUERY: general conversation not about properties

If the query asks about anything "near", "around" or "close to" a place, choose LOCATION_QUERY, never CONVERSATIONAL_QUERY.

Transaction type indicators:
- buy: "buy", "purchase", "for sale", "own", "invest"
- rent: "rent", "rental", "lease", "monthly", "tenant"
- unknown: neither is clearly stated

Return only a JSON object: {{"intent": "<category>", "transaction_type": "buy" | "rent" | "unknown", "property_name": "<name of a specific property or empty>"}}

Examples:
"I want to buy a house" -> {{"intent": "INITIAL_INQUIRY", "transaction_type": "buy", "property_name": ""}}
"Looking for apartments to rent in Manhattan" -> {{"intent": "PROPERTY_QUERY", "transaction_type": "rent", "property_name": ""}}
"I'm interested in the Hampton Bays house" -> {{"intent": "PROPERTY_INTEREST", "transaction_type": "unknown", "property_name": "Hampton Bays"}}
"Which schools are near 164 Old Montauk?" -> {{"intent": "LOCATION_QUERY", "transaction_type": "unknown", "property_name": ""}}"#
    )
}

pub fn preference_extraction(recent: &str, message: &str) -> String {
    format!(
        r#"Extract any mentioned preferences from this conversation.

Recent context: {recent}
Current message: {message}

Return only a JSON object, using null for anything not mentioned:
{{"transaction_type": "buy" | "rent" | null, "location": string | null, "property_type": "apartment" | "house" | "condo" | "townhouse" | null, "bedrooms": number | null, "min_price": number | null, "max_price": number | null, "size": string | null, "schools_important": true | false, "amenities_important": true | false}}

Examples:
"I want to buy apartments" -> {{"transaction_type": "buy", "property_type": "apartment", "location": null, "bedrooms": null, "min_price": null, "max_price": null, "size": null, "schools_important": false, "amenities_important": false}}
"3 bedrooms under 500k" -> {{"transaction_type": null, "location": null, "property_type": null, "bedrooms": 3, "min_price": null, "max_price": 500000, "size": null, "schools_important": false, "amenities_important": false}}
"apartments between $2000 to $4000" -> {{"transaction_type": null, "location": null, "property_type": "apartment", "bedrooms": null, "min_price": 2000, "max_price": 4000, "size": null, "schools_important": false, "amenities_important": false}}"#
    )
}

pub fn display_filters(recent: &str, message: &str) -> String {
    format!(
        r#"Extract specific property filters for the frontend search panel.

Recent context: {recent}
Current message: {message}

Return only a JSON object with these keys, null when missing:
{{"transaction_type": "buy" | "rent" | null, "property_type": "apartment" | "house" | "condo" | "studio" | null, "bedrooms": number | null, "bathrooms": number | null, "location": string | null, "price_min": number | null, "price_max": number | null}}

Mapping rules:
- "home" or "family home" -> "house"; "apt" -> "apartment"
- "studio" -> "studio" with bedrooms 0
- "buying", "purchase" -> "buy"; "rental", "renting" -> "rent"
- "under $4000" -> price_max 4000; "$3000 to $4000" -> price_min 3000, price_max 4000"#
    )
}

pub fn clarification(
    message: &str,
    prefs: &UserPreferences,
    missing: Option<MissingCriterion>,
    locations: &[String],
) -> String {
    let known = serde_json::to_string(prefs).unwrap_or_default();
    let need = match missing {
        Some(MissingCriterion::TransactionType) => "whether they want to buy or rent".to_string(),
        Some(MissingCriterion::Location) => format!(
            "their preferred area. Available areas include: {}",
            locations.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ),
        Some(MissingCriterion::Bedrooms) => "how many bedrooms they need".to_string(),
        Some(MissingCriterion::Price) => "their budget or price range".to_string(),
        None => "any other requirement that would narrow the search".to_string(),
    };
    format!(
        r#"Write a reply that asks for ONE missing piece of information.

You are a professional real estate agent talking with a client.
Client's message: "{message}"
What you already know: {known}
What you still need: {need}

Acknowledge the request warmly, ask a single question, and if asking about the area mention two or three of the available areas. Two or three sentences at most."#
    )
}

// =============================================================================
// Tour
// =============================================================================

pub fn tour_intent(message: &str) -> String {
    format!(
        r#"Does the user want to schedule a tour or visit a property in person?
Message: "{message}"
Return only "yes" or "no"."#
    )
}

pub fn tour_affirmation(message: &str) -> String {
    format!(
        r#"Is the user accepting an offer to tour the property? Phrases like "yes", "sure", "I would love to" count.
Message: "{message}"
Return only "yes" or "no"."#
    )
}

pub fn tour_start(property_name: &str) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

The user wants to schedule a tour for {property_name}.
Confirm their interest and ask what date and time work for them. Two or three sentences."#
    )
}

pub fn tour_step(status: TourStatus, message: &str) -> String {
    let ask = match status {
        TourStatus::AwaitingName => "Ask for their name to complete the booking. Keep it brief and friendly.",
        TourStatus::AwaitingEmail => "Ask for their email address so the confirmation can be sent. Keep it brief.",
        TourStatus::AwaitingDate => "Acknowledge the time and ask for their preferred date. Two sentences.",
        TourStatus::AwaitingTime => "Ask for their preferred time for the tour and offer flexibility. Two or three sentences.",
        _ => "Help them continue scheduling and ask for whatever is still missing.",
    };
    format!(
        r#"{SYSTEM_MESSAGE}

The user is scheduling a tour. Their message: "{message}"
{ask}"#
    )
}

pub fn tour_confirmed(tour: &TourScheduling) -> String {
    let delivery = if tour.email_sent {
        "mention that a confirmation email has been sent to their email"
    } else {
        "mention that the confirmation email could not be sent but the booking stands"
    };
    format!(
        r#"{SYSTEM_MESSAGE}

The user has scheduled a tour for {} on {} at {}. Their name is {} and their email is {}.
Confirm the tour details in two or three sentences, {delivery}, and ask whether they have questions about the property before the tour."#,
        tour.property_name(),
        tour.date.as_deref().unwrap_or_default(),
        tour.time.as_deref().unwrap_or_default(),
        tour.name.as_deref().unwrap_or_default(),
        tour.email.as_deref().unwrap_or_default(),
    )
}

pub fn tour_which_property(context: &str) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Conversation context: {context}
The user wants to schedule a tour but it is not clear which property.
Ask which specific property they'd like to tour, reminding them of the most recently discussed one if there is one. Two or three sentences."#
    )
}

// =============================================================================
// Property interest
// =============================================================================

pub fn interest_in(property: &Listing) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Provide a brief, enthusiastic response about this property and ask if they'd like to schedule a tour.
The user is interested in {}.
Property details: {}
Three or four sentences."#,
        display_name(property),
        listings_json(std::slice::from_ref(property))
    )
}

pub fn interest_which_of(context: &str, candidates: &[Listing]) -> String {
    let names = candidates
        .iter()
        .take(3)
        .map(|p| format!("\"{}\"", p.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"{SYSTEM_MESSAGE}

Conversation context: {context}
The user is interested in one of several properties.
Ask which specific property they're interested in from among {names}. Two or three sentences."#
    )
}

pub fn interest_unknown(context: &str) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Conversation context: {context}
The user is interested in a property but nothing has been shown yet.
Ask what type of property they're interested in. Two or three sentences."#
    )
}

// =============================================================================
// Search replies
// =============================================================================

pub fn initial_inquiry(context: &str, message: &str) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Conversation context: {context}
User: {message}
Respond to this initial inquiry like a professional broker. Ask 1 specific qualifying question about their preferences. Two or three sentences."#
    )
}

pub fn results_narrative(query: &str, results: &[Listing]) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Write a conversational, well-formatted reply presenting these search results.
User query: {query}
Results: {}

Use markdown bullets, one per property, with its name in bold plus price, location and a standout feature. Keep it concise and end with one engaging question."#,
        listings_json(results)
    )
}

pub fn compress(narrative: &str) -> String {
    format!(
        r#"You are a real estate agent who gives extremely brief replies.
Summarize these property results in 2-3 short sentences and end with ONE very brief question:
{narrative}"#
    )
}

pub fn relaxed_results(prefs: &UserPreferences, dropped: &str, count: usize) -> String {
    let location = prefs.location.as_deref().unwrap_or("the requested area");
    format!(
        r#"You are a real estate agent. Be helpful and specific about alternatives.
No exact matches were found for the client's search in {location}.
There are {count} similar properties available if the {dropped} requirement is relaxed.
Tell them so briefly and suggest adjusting that requirement to see more options."#
    )
}

pub fn no_results(prefs: &UserPreferences) -> String {
    format!(
        r#"You are a real estate agent who gives brief replies, under 25 words.
No properties match the search criteria: {}.
Say so and ask one short question to refine the search."#,
        serde_json::to_string(prefs).unwrap_or_default()
    )
}

pub fn followup_answer(context: &str, message: &str, shown: &[Listing]) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Conversation context: {context}
User: {message}
These are the properties from the previous search results: {}
Answer the question directly about these properties in two or three sentences and ask one brief follow-up."#,
        listings_json(&shown[..shown.len().min(3)])
    )
}

pub fn conversational(context: &str, message: &str) -> String {
    format!(
        r#"{SYSTEM_MESSAGE}

Conversation context: {context}
User: {message}
Respond very concisely (two or three sentences) to this conversational query, keeping it focused on real estate."#
    )
}

// =============================================================================
// Location
// =============================================================================

pub fn address_extraction(message: &str) -> String {
    format!(
        r#"Extract the address, location, or landmark from this message: "{message}"

It may be a street address ("164 Old Montauk Highway"), a landmark ("Times Square"), a neighborhood or city ("Brooklyn"), or a property name.
Return only the extracted text, or NONE if there is no specific location.

Examples:
"What hospitals are near Times Square?" -> Times Square
"Restaurants near 123 Main St" -> 123 Main St"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tour() -> TourScheduling {
        TourScheduling {
            status: TourStatus::Confirmed,
            property: serde_json::from_value(serde_json::json!({"id": "1", "name": "Sunset Loft"}))
                .ok(),
            date: Some("tomorrow".into()),
            time: Some("3pm".into()),
            name: Some("Jane Doe".into()),
            email: Some("jane@example.com".into()),
            email_sent: true,
            name_stated: true,
        }
    }

    #[test]
    fn test_confirmation_fallback_sent() {
        let text = confirmation_fallback(&tour());
        assert!(text
            .starts_with("Great! I've scheduled your tour for Sunset Loft on tomorrow at 3pm."));
        assert!(text.contains("A confirmation email has been sent to jane@example.com."));
    }

    #[test]
    fn test_confirmation_fallback_not_sent() {
        let mut t = tour();
        t.email_sent = false;
        let text = confirmation_fallback(&t);
        assert!(text.contains("wasn't able to send the confirmation email"));
        assert!(!text.contains("has been sent"));
    }

    #[test]
    fn test_clarification_mentions_areas() {
        let prompt = clarification(
            "show me something",
            &UserPreferences::default(),
            Some(MissingCriterion::Location),
            &["Brooklyn".into(), "Hampton Bays".into(), "Queens".into(), "Soho".into()],
        );
        assert!(prompt.contains("Brooklyn, Hampton Bays, Queens"));
        assert!(!prompt.contains("Soho"));
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(
            property_not_found("Blue House"),
            "I couldn't find a property named 'Blue House'. Could you clarify which property you're interested in?"
        );
        assert!(geocode_miss("Nowhere")
            .starts_with("I couldn't find location information for 'Nowhere'."));
    }
}
