//! Push Channel — JSON POST to a push gateway (Expo/FCM relay style).

use async_trait::async_trait;
use fleetflow_core::config::PushChannelConfig;
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::traits::ChannelSender;
use fleetflow_core::types::{DeliveryChannel, Notification, Priority, Recipient};

pub struct PushChannel {
    config: PushChannelConfig,
    client: reqwest::Client,
}

impl PushChannel {
    pub fn new(config: PushChannelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Gateway payload for one device.
    pub fn payload(&self, token: &str, n: &Notification) -> serde_json::Value {
        let priority = if n.priority >= Priority::High { "high" } else { "normal" };
        serde_json::json!({
            "to": token,
            "title": n.title,
            "body": n.message,
            "priority": priority,
            "data": {
                "notification_id": n.id,
                "type": n.kind,
                "priority": n.priority,
                "metadata": n.metadata,
            }
        })
    }

    fn fail(&self, recipient: &Recipient, reason: impl Into<String>) -> FleetFlowError {
        FleetFlowError::delivery(DeliveryChannel::Push.to_string(), &recipient.id, reason)
    }
}

#[async_trait]
impl ChannelSender for PushChannel {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Push
    }

    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<()> {
        let Some(token) = recipient.push_token.as_deref() else {
            return Err(self.fail(recipient, "no push token"));
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&self.payload(token, notification));
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.fail(recipient, format!("Push request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(recipient, format!("Push gateway {status}: {body}")));
        }

        tracing::info!("🔔 Push sent to {}: {}", recipient.id, notification.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetflow_core::types::{NotificationType, Portal};

    fn channel() -> PushChannel {
        PushChannel::new(PushChannelConfig {
            enabled: true,
            endpoint: "https://push.example.com/send".into(),
            api_key: "key".into(),
        })
    }

    #[test]
    fn test_payload_shape() {
        let n = Notification::new(NotificationType::DispatchUpdate, Priority::Critical, "Truck down", "I-80 MM 112")
            .with_metadata(serde_json::json!({"load": "L-9"}));
        let payload = channel().payload("ExponentPushToken[abc]", &n);
        assert_eq!(payload["to"], "ExponentPushToken[abc]");
        assert_eq!(payload["priority"], "high");
        assert_eq!(payload["data"]["type"], "dispatch_update");
        assert_eq!(payload["data"]["priority"], "critical");
        assert_eq!(payload["data"]["metadata"]["load"], "L-9");

        let low = Notification::new(NotificationType::SystemAlert, Priority::Low, "t", "m");
        assert_eq!(channel().payload("tok", &low)["priority"], "normal");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let recipient = Recipient::new("d1", "Driver", Portal::Driver);
        let n = Notification::new(NotificationType::DispatchUpdate, Priority::High, "t", "m");
        let err = channel().send(&recipient, &n).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::ChannelDelivery { .. }));
    }
}
