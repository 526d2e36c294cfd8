//! Async SMTP transport configured from [`EmailSettings`].

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailSettings;
use crate::error::SentinelError;

/// Sends plain-text email through a configured SMTP relay.
///
/// The configured username doubles as the `From` address, matching the
/// relay account.
#[derive(Clone)]
pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSender")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl EmailSender {
    /// Builds the transport from SMTP settings. With `use_tls` the
    /// connection is upgraded via STARTTLS; without it the relay is
    /// addressed in plaintext (local development relays).
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Notification`] when the relay host is
    /// rejected by the transport builder or the configured username is
    /// not a valid mailbox address.
    pub fn from_settings(settings: &EmailSettings) -> Result<Self, SentinelError> {
        let from: Mailbox = settings
            .smtp_username
            .parse()
            .map_err(|e| SentinelError::Notification(format!("invalid sender address: {e}")))?;

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
                .map_err(|e| SentinelError::Notification(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        };

        let transport = builder
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.smtp_username.clone(),
                settings.smtp_password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }

    /// Sends one plain-text message to one recipient.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Notification`] on an invalid recipient
    /// address or transport failure.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SentinelError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| SentinelError::Notification(format!("invalid recipient {to}: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SentinelError::Notification(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| SentinelError::Notification(e.to_string()))
    }
}
