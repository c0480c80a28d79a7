//! Tour confirmation email delivery.
//!
//! The conversation layer only needs to know whether a confirmation went
//! out; every failure is logged here and reported as `false`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use broker_core::config::EmailConfig;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info, warn};

use crate::error::TourError;
use crate::state_machine::TourScheduling;

/// A plain-text email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TourError>;
}

/// Build the confirmation email for a booked tour.
pub fn tour_confirmation(
    to: &str,
    name: &str,
    property_name: &str,
    date: &str,
    time: &str,
) -> EmailMessage {
    let body = format!(
        "Hello {name},\n\n\
         Thank you for scheduling a tour of {property_name} on {date} at {time}.\n\n\
         Your tour details:\n\
         - Property: {property_name}\n\
         - Date: {date}\n\
         - Time: {time}\n\n\
         Please arrive 5 minutes early. If you need to reschedule, please contact us as soon as possible.\n\n\
         We look forward to showing you the property!\n\n\
         Best regards,\n\
         The Property Management Team\n"
    );
    EmailMessage {
        to: to.to_string(),
        subject: format!("Your Tour of {} is Confirmed!", property_name),
        body,
    }
}

/// Send the confirmation for a fully booked tour, at most once.
///
/// Returns whether the email has been sent. Delivery failures leave
/// `email_sent` false and are only logged.
pub async fn send_confirmation(mailer: &dyn Mailer, tour: &mut TourScheduling) -> bool {
    if tour.email_sent {
        return true;
    }
    let (Some(email), Some(name), Some(date), Some(time)) = (
        tour.email.as_deref(),
        tour.name.as_deref(),
        tour.date.as_deref(),
        tour.time.as_deref(),
    ) else {
        warn!("Tour confirmation requested with missing details");
        return false;
    };

    let message = tour_confirmation(email, name, tour.property_name(), date, time);
    match mailer.send(&message).await {
        Ok(()) => {
            info!(to = %message.to, "Tour confirmation email sent");
            tour.email_sent = true;
        }
        Err(e) => {
            error!(to = %message.to, error = %e, "Error sending confirmation email");
        }
    }
    tour.email_sent
}

/// Choose the mailer for a configuration.
///
/// SMTP is used only when enabled and the password variable is set;
/// otherwise messages are logged and reported as not sent.
pub fn mailer_from_config(config: &EmailConfig) -> Arc<dyn Mailer> {
    if !config.enabled {
        return Arc::new(LogMailer);
    }
    let password = match std::env::var(&config.password_env) {
        Ok(p) if !p.is_empty() => p,
        _ => {
            warn!(
                var = %config.password_env,
                "Email password not set, confirmation emails will only be logged"
            );
            return Arc::new(LogMailer);
        }
    };
    match SmtpMailer::new(config, password) {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            warn!(error = %e, "SMTP setup failed, confirmation emails will only be logged");
            Arc::new(LogMailer)
        }
    }
}

// =============================================================================
// SMTP
// =============================================================================

/// STARTTLS SMTP delivery.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig, password: String) -> Result<Self, TourError> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| TourError::Address(format!("{}: {}", config.sender, e)))?;
        let transport = SmtpTransport::starttls_relay(&config.smtp_server)
            .map_err(|e| TourError::Delivery(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(config.sender.clone(), password))
            .build();
        Ok(Self { transport, sender })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), TourError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| TourError::Address(format!("{}: {}", message.to, e)))?;
        let email = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| TourError::Delivery(e.to_string()))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| TourError::Delivery(e.to_string()))?
            .map_err(|e| TourError::Delivery(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// Non-delivering mailers
// =============================================================================

/// Logs the message instead of sending it. Always reports failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), TourError> {
        info!(to = %message.to, subject = %message.subject, "Email delivery disabled, not sending");
        Err(TourError::Disabled)
    }
}

/// Keeps every message in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), TourError> {
        if self.fail {
            return Err(TourError::Delivery("recording mailer set to fail".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
