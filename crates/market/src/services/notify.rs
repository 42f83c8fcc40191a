//! Notification dispatch.
//!
//! Fire-and-forget email jobs keyed on order events. Enqueueing never blocks
//! the caller on delivery: [`SmtpNotifier`] hands the message to a spawned
//! task and delivery failures are logged, not returned. At-least-once is
//! acceptable; an order's outcome never depends on its notification.

use std::sync::{Arc, Mutex, PoisonError};

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use uuid::Uuid;

use bazaar_core::Email;

use crate::config::SmtpConfig;

/// One notification job.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Job ID, for correlating delivery logs with the triggering event.
    pub id: Uuid,
    pub recipients: Vec<Email>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Build a notification with a fresh job ID.
    #[must_use]
    pub fn new(recipients: Vec<Email>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipients,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Errors that can occur while queueing a notification.
///
/// Delivery errors are not represented here - they happen after the caller
/// has moved on and are only logged.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport could not be constructed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build the email message.
    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// An address could not be parsed into a mailbox.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// The notification has no recipients.
    #[error("notification has no recipients")]
    NoRecipients,
}

/// Asynchronous notification queue.
#[allow(async_fn_in_trait)]
pub trait Notifier: Clone + Send + Sync {
    /// Queue a notification for delivery. Returns once the job is accepted,
    /// not once it is delivered.
    async fn enqueue(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// SMTP-backed notifier using `lettre`.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpNotifier {
    /// Create a notifier from SMTP configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay connection cannot be configured.
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

impl Notifier for SmtpNotifier {
    async fn enqueue(&self, notification: Notification) -> Result<(), NotifyError> {
        if notification.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .subject(&notification.subject);
        for recipient in &notification.recipients {
            builder = builder.to(recipient
                .as_str()
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(recipient.to_string()))?);
        }
        let message = builder.body(notification.body.clone())?;

        // Delivery happens off the caller's path; failures are logged only.
        let mailer = self.mailer.clone();
        let job_id = notification.id;
        let subject = notification.subject.clone();
        tokio::spawn(async move {
            match mailer.send(message).await {
                Ok(_) => {
                    tracing::info!(%job_id, subject = %subject, "Notification delivered");
                }
                Err(e) => {
                    tracing::error!(%job_id, subject = %subject, error = %e, "Notification delivery failed");
                }
            }
        });

        Ok(())
    }
}

/// Notifier that records every job instead of delivering it. Used in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every notification enqueued so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn enqueue(&self, notification: Notification) -> Result<(), NotifyError> {
        if notification.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}
