//! SMS Channel — Twilio-compatible REST gateway.
//! POST form-encoded `To`/`From`/`Body` with basic auth (account sid + token).

use async_trait::async_trait;
use fleetflow_core::config::SmsChannelConfig;
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::traits::ChannelSender;
use fleetflow_core::types::{DeliveryChannel, Notification, Recipient};

use crate::format;

pub struct SmsChannel {
    config: SmsChannelConfig,
    client: reqwest::Client,
}

impl SmsChannel {
    pub fn new(config: SmsChannelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.config.api_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Form fields for one message.
    pub fn form(&self, phone: &str, notification: &Notification) -> Vec<(&'static str, String)> {
        vec![
            ("To", phone.to_string()),
            ("From", self.config.from_number.clone()),
            ("Body", format::sms_text(notification)),
        ]
    }

    fn fail(&self, recipient: &Recipient, reason: impl Into<String>) -> FleetFlowError {
        FleetFlowError::delivery(DeliveryChannel::Sms.to_string(), &recipient.id, reason)
    }
}

#[async_trait]
impl ChannelSender for SmsChannel {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Sms
    }

    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<()> {
        let Some(phone) = recipient.phone.as_deref() else {
            return Err(self.fail(recipient, "no phone number"));
        };

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&self.form(phone, notification))
            .send()
            .await
            .map_err(|e| self.fail(recipient, format!("SMS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(recipient, format!("SMS gateway {status}: {body}")));
        }

        tracing::info!("📱 SMS sent to {}: {}", recipient.id, notification.title);
        Ok(())
    }
}
