//! Tour scheduling state machine with validated transitions.
//!
//! Idle -> AwaitingTime when a tour is requested for a property, then
//! between the awaiting states as slots fill, and finally Confirmed once
//! name, email, date and time are all known. Only a reset returns to Idle.

use std::fmt;

use broker_core::types::Listing;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::TourError;
use crate::extract::{extract_details, TourDetails};

/// Where the tour sub-dialogue currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourStatus {
    #[default]
    #[serde(rename = "", alias = "none")]
    Idle,
    AwaitingTime,
    AwaitingDate,
    AwaitingName,
    AwaitingEmail,
    Confirmed,
}

impl TourStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingTime => "awaiting_time",
            Self::AwaitingDate => "awaiting_date",
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingEmail => "awaiting_email",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(
            self,
            Self::AwaitingTime | Self::AwaitingDate | Self::AwaitingName | Self::AwaitingEmail
        )
    }
}

impl fmt::Display for TourStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Idle -> AwaitingTime
/// - any awaiting state -> any awaiting state (slots may fill in any order)
/// - any awaiting state -> Confirmed
/// - anything -> Idle (reset)
pub fn validate_transition(from: TourStatus, to: TourStatus) -> Result<(), TourError> {
    let valid = matches!(
        (from, to),
        (TourStatus::Idle, TourStatus::AwaitingTime) | (_, TourStatus::Idle)
    ) || (from.is_awaiting() && (to.is_awaiting() || to == TourStatus::Confirmed));

    if valid {
        Ok(())
    } else {
        Err(TourError::InvalidTransition(from, to))
    }
}

/// Outcome of feeding one message into an in-progress tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourProgress {
    /// Still collecting; the status names the next slot to ask for.
    NeedsMore(TourStatus),
    /// Every slot is filled. Returned once, on the transition.
    Confirmed,
}

/// Per-session tour booking record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TourScheduling {
    #[serde(default, deserialize_with = "de_status")]
    pub status: TourStatus,
    #[serde(default)]
    pub property: Option<Listing>,
    #[serde(default, deserialize_with = "de_slot")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de_slot")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "de_slot")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_slot")]
    pub email: Option<String>,
    #[serde(default)]
    pub email_sent: bool,
    /// The name was introduced explicitly rather than guessed from a bare line.
    #[serde(default)]
    pub name_stated: bool,
}

impl TourScheduling {
    /// Start a booking for `property`, asking for a time first.
    pub fn begin(property: Listing) -> Self {
        Self {
            status: TourStatus::AwaitingTime,
            property: Some(property),
            ..Self::default()
        }
    }

    /// Whether the sub-dialogue is collecting details.
    pub fn is_active(&self) -> bool {
        self.status.is_awaiting()
    }

    pub fn property_name(&self) -> &str {
        self.property
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("the property")
    }

    /// Fill the slots that are still empty.
    ///
    /// Filled slots are kept, except that an explicitly stated name
    /// replaces one guessed from a bare line.
    pub fn absorb(&mut self, details: TourDetails) {
        fill(&mut self.date, details.date);
        fill(&mut self.time, details.time);
        fill(&mut self.email, details.email);
        if details.name_stated && !self.name_stated {
            if let Some(name) = details.name.filter(|n| !n.trim().is_empty()) {
                debug!(name = %name, "Stated name replaces guessed one");
                self.name = Some(name);
                self.name_stated = true;
            }
        } else {
            fill(&mut self.name, details.name);
        }
    }

    /// The next slot to ask for, in priority order name, email, date, time.
    pub fn next_missing(&self) -> Option<TourStatus> {
        if self.name.is_none() {
            Some(TourStatus::AwaitingName)
        } else if self.email.is_none() {
            Some(TourStatus::AwaitingEmail)
        } else if self.date.is_none() {
            Some(TourStatus::AwaitingDate)
        } else if self.time.is_none() {
            Some(TourStatus::AwaitingTime)
        } else {
            None
        }
    }

    /// Extract details from `message`, fill empty slots and move the status.
    pub fn advance(&mut self, message: &str) -> Result<TourProgress, TourError> {
        if !self.is_active() {
            return Err(TourError::NotActive);
        }
        self.absorb(extract_details(message));

        let next = self.next_missing().unwrap_or(TourStatus::Confirmed);
        self.transition(next)?;

        if next == TourStatus::Confirmed {
            Ok(TourProgress::Confirmed)
        } else {
            Ok(TourProgress::NeedsMore(next))
        }
    }

    fn transition(&mut self, to: TourStatus) -> Result<(), TourError> {
        validate_transition(self.status, to)?;
        debug!(from = %self.status, to = %to, "Tour status transition");
        self.status = to;
        Ok(())
    }

    /// Abandon the booking.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            *slot = Some(v);
        }
    }
}

/// Accept `null` as Idle.
fn de_status<'de, D>(deserializer: D) -> Result<TourStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<TourStatus>::deserialize(deserializer)?.unwrap_or_default())
}

/// Empty strings on the wire mean "not provided".
fn de_slot<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        serde_json::from_value(serde_json::json!({
            "id": "p7",
            "name": "Hampton Bays Renovated House",
            "leaseProperty": true,
            "monthlyRent": 4500
        }))
        .unwrap()
    }

    // =====================================================================
    // Transitions
    // =====================================================================

    #[test]
    fn test_idle_to_awaiting_time() {
        assert!(validate_transition(TourStatus::Idle, TourStatus::AwaitingTime).is_ok());
    }

    #[test]
    fn test_awaiting_states_interleave() {
        assert!(validate_transition(TourStatus::AwaitingTime, TourStatus::AwaitingName).is_ok());
        assert!(validate_transition(TourStatus::AwaitingEmail, TourStatus::AwaitingDate).is_ok());
        assert!(validate_transition(TourStatus::AwaitingName, TourStatus::AwaitingName).is_ok());
    }

    #[test]
    fn test_awaiting_to_confirmed() {
        assert!(validate_transition(TourStatus::AwaitingEmail, TourStatus::Confirmed).is_ok());
    }

    #[test]
    fn test_reset_always_allowed() {
        assert!(validate_transition(TourStatus::Confirmed, TourStatus::Idle).is_ok());
        assert!(validate_transition(TourStatus::AwaitingDate, TourStatus::Idle).is_ok());
    }

    #[test]
    fn test_confirmed_never_regresses() {
        assert!(validate_transition(TourStatus::Confirmed, TourStatus::AwaitingName).is_err());
        assert!(validate_transition(TourStatus::Confirmed, TourStatus::Confirmed).is_err());
    }

    #[test]
    fn test_idle_cannot_skip_ahead() {
        assert!(validate_transition(TourStatus::Idle, TourStatus::Confirmed).is_err());
        assert!(validate_transition(TourStatus::Idle, TourStatus::AwaitingName).is_err());
    }

    // =====================================================================
    // Slot filling
    // =====================================================================

    #[test]
    fn test_begin_awaits_time() {
        let tour = TourScheduling::begin(listing());
        assert_eq!(tour.status, TourStatus::AwaitingTime);
        assert!(tour.is_active());
        assert_eq!(tour.property_name(), "Hampton Bays Renovated House");
    }

    #[test]
    fn test_next_missing_priority() {
        let mut tour = TourScheduling::begin(listing());
        assert_eq!(tour.next_missing(), Some(TourStatus::AwaitingName));
        tour.name = Some("Jane".into());
        assert_eq!(tour.next_missing(), Some(TourStatus::AwaitingEmail));
        tour.email = Some("jane@example.com".into());
        assert_eq!(tour.next_missing(), Some(TourStatus::AwaitingDate));
        tour.date = Some("tomorrow".into());
        assert_eq!(tour.next_missing(), Some(TourStatus::AwaitingTime));
        tour.time = Some("3pm".into());
        assert_eq!(tour.next_missing(), None);
    }

    #[test]
    fn test_advance_fills_slots_across_turns() {
        let mut tour = TourScheduling::begin(listing());

        let progress = tour.advance("tomorrow at 3pm").unwrap();
        assert_eq!(progress, TourProgress::NeedsMore(TourStatus::AwaitingName));
        assert_eq!(tour.date.as_deref(), Some("tomorrow"));
        assert_eq!(tour.time.as_deref(), Some("3pm"));

        let progress = tour.advance("Jane Doe").unwrap();
        assert_eq!(progress, TourProgress::NeedsMore(TourStatus::AwaitingEmail));

        let progress = tour.advance("jane@example.com").unwrap();
        assert_eq!(progress, TourProgress::Confirmed);
        assert_eq!(tour.status, TourStatus::Confirmed);
    }

    #[test]
    fn test_advance_all_in_one_message() {
        let mut tour = TourScheduling::begin(listing());
        tour.status = TourStatus::AwaitingName;
        let progress = tour
            .advance("My name is Jane Doe, jane@example.com, tomorrow at 3pm")
            .unwrap();
        assert_eq!(progress, TourProgress::Confirmed);
        assert_eq!(tour.name.as_deref(), Some("Jane Doe"));
        assert_eq!(tour.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_filled_slots_are_kept() {
        let mut tour = TourScheduling::begin(listing());
        tour.advance("next Friday").unwrap();
        tour.advance("actually tomorrow").unwrap();
        assert_eq!(tour.date.as_deref(), Some("next Friday"));
    }

    #[test]
    fn test_date_reply_does_not_become_the_name() {
        let mut tour = TourScheduling::begin(listing());
        let progress = tour.advance("Next Friday").unwrap();
        assert_eq!(progress, TourProgress::NeedsMore(TourStatus::AwaitingName));
        assert_eq!(tour.date.as_deref(), Some("Next Friday"));
        assert_eq!(tour.name, None);

        let progress = tour
            .advance("My name is Jane Doe, jane@example.com, 3pm")
            .unwrap();
        assert_eq!(progress, TourProgress::Confirmed);
        assert_eq!(tour.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_stated_name_replaces_guessed_name() {
        let mut tour = TourScheduling::begin(listing());
        tour.advance("Carlos").unwrap();
        assert_eq!(tour.name.as_deref(), Some("Carlos"));
        assert!(!tour.name_stated);

        tour.advance("sorry, my name is Jane Doe").unwrap();
        assert_eq!(tour.name.as_deref(), Some("Jane Doe"));
        assert!(tour.name_stated);

        tour.advance("call me Ana").unwrap();
        assert_eq!(tour.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_advance_after_confirmation_fails() {
        let mut tour = TourScheduling::begin(listing());
        tour.advance("My name is Jane Doe, jane@example.com, tomorrow at 3pm")
            .unwrap();
        assert!(matches!(tour.advance("hello"), Err(TourError::NotActive)));
        assert_eq!(tour.status, TourStatus::Confirmed);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tour = TourScheduling::begin(listing());
        tour.advance("tomorrow").unwrap();
        tour.reset();
        assert_eq!(tour, TourScheduling::default());
        assert!(!tour.is_active());
    }

    // =====================================================================
    // Wire format
    // =====================================================================

    #[test]
    fn test_status_wire_names() {
        let tour = TourScheduling::default();
        let value = serde_json::to_value(&tour).unwrap();
        assert_eq!(value["status"], "");

        let tour = TourScheduling::begin(listing());
        let value = serde_json::to_value(&tour).unwrap();
        assert_eq!(value["status"], "awaiting_time");
    }

    #[test]
    fn test_lenient_client_state() {
        let tour: TourScheduling = serde_json::from_value(serde_json::json!({
            "status": null,
            "time": "",
            "date": "",
            "name": "",
            "email": ""
        }))
        .unwrap();
        assert_eq!(tour, TourScheduling::default());

        let tour: TourScheduling =
            serde_json::from_value(serde_json::json!({"status": "awaiting_email", "name": "Jane"}))
                .unwrap();
        assert_eq!(tour.status, TourStatus::AwaitingEmail);
        assert_eq!(tour.name.as_deref(), Some("Jane"));
    }
}
