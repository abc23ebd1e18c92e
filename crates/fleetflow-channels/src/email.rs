//! Email Channel — SMTP delivery via async lettre.
//!
//! Works with Gmail, Outlook and custom relays that speak STARTTLS.

use async_trait::async_trait;
use fleetflow_core::config::EmailChannelConfig;
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::traits::ChannelSender;
use fleetflow_core::types::{DeliveryChannel, Notification, Recipient};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::format;

/// Email channel — one SMTP connection per send.
pub struct EmailChannel {
    config: EmailChannelConfig,
}

impl EmailChannel {
    pub fn new(config: EmailChannelConfig) -> Self {
        Self { config }
    }

    fn fail(&self, recipient: &Recipient, reason: impl Into<String>) -> FleetFlowError {
        FleetFlowError::delivery(DeliveryChannel::Email.to_string(), &recipient.id, reason)
    }

    /// Build the message without sending it.
    pub fn compose(&self, recipient: &Recipient, notification: &Notification) -> Result<Message> {
        let Some(address) = recipient.email.as_deref() else {
            return Err(self.fail(recipient, "no email address"));
        };

        let from_name = self.config.display_name.as_deref().unwrap_or("FleetFlow Alerts");
        let from: Mailbox = format!("{from_name} <{}>", self.config.email)
            .parse()
            .map_err(|e| self.fail(recipient, format!("Invalid from: {e}")))?;
        let to: Mailbox = format!("{} <{address}>", recipient.name)
            .parse()
            .map_err(|e| self.fail(recipient, format!("Invalid to: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(format::subject(notification))
            .header(ContentType::TEXT_PLAIN)
            .body(format::plain_text(notification))
            .map_err(|e| self.fail(recipient, format!("Build email: {e}")))
    }
}

#[async_trait]
impl ChannelSender for EmailChannel {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Email
    }

    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<()> {
        let email = self.compose(recipient, notification)?;

        let creds = Credentials::new(self.config.email.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| self.fail(recipient, format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| self.fail(recipient, format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to {}: {}", recipient.id, notification.title);
        Ok(())
    }
}
