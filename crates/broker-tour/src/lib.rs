//! Tour scheduling for the broker assistant.
//!
//! A small forward-only state machine collects a visitor's name, email,
//! date and time across chat turns. Once every slot is filled the tour is
//! confirmed and a confirmation email is sent through a [`Mailer`].

pub mod error;
pub mod extract;
pub mod mailer;
pub mod state_machine;

pub use error::TourError;
pub use extract::{extract_contact, extract_date_time, extract_details, TourDetails};
pub use mailer::{
    mailer_from_config, send_confirmation, tour_confirmation, EmailMessage, LogMailer, Mailer,
    RecordingMailer, SmtpMailer,
};
pub use state_machine::{validate_transition, TourProgress, TourScheduling, TourStatus};
