//! Error types for tour scheduling.

use crate::state_machine::TourStatus;

/// Errors from the tour state machine and email delivery.
#[derive(Debug, thiserror::Error)]
pub enum TourError {
    #[error("Invalid tour transition: {0} -> {1}")]
    InvalidTransition(TourStatus, TourStatus),
    #[error("No tour in progress")]
    NotActive,
    #[error("Invalid email address: {0}")]
    Address(String),
    #[error("Email delivery failed: {0}")]
    Delivery(String),
    #[error("Email delivery is disabled")]
    Disabled,
}
