//! # FleetFlow Channels
//! Outbound delivery channels. In-app delivery lives in the scheduler crate;
//! everything here talks to an external service.

pub mod email;
pub mod format;
pub mod push;
pub mod sms;

use std::sync::Arc;

use fleetflow_core::config::ChannelConfig;
use fleetflow_core::traits::ChannelSender;

pub use email::EmailChannel;
pub use push::PushChannel;
pub use sms::SmsChannel;

/// Build the senders enabled in config.
pub fn channels_from_config(config: &ChannelConfig) -> Vec<Arc<dyn ChannelSender>> {
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();
    if let Some(cfg) = config.email.as_ref().filter(|c| c.enabled) {
        senders.push(Arc::new(EmailChannel::new(cfg.clone())));
    }
    if let Some(cfg) = config.sms.as_ref().filter(|c| c.enabled) {
        senders.push(Arc::new(SmsChannel::new(cfg.clone())));
    }
    if let Some(cfg) = config.push.as_ref().filter(|c| c.enabled) {
        senders.push(Arc::new(PushChannel::new(cfg.clone())));
    }
    tracing::debug!("📡 {} outbound channel(s) configured", senders.len());
    senders
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetflow_core::config::{EmailChannelConfig, PushChannelConfig};
    use fleetflow_core::types::DeliveryChannel;

    #[test]
    fn test_only_enabled_channels_built() {
        let config = ChannelConfig {
            email: Some(EmailChannelConfig {
                enabled: true,
                smtp_host: "smtp.example.com".into(),
                smtp_port: 587,
                email: "alerts@example.com".into(),
                password: "secret".into(),
                display_name: None,
            }),
            sms: None,
            push: Some(PushChannelConfig {
                enabled: false,
                endpoint: "https://push.example.com/send".into(),
                api_key: String::new(),
            }),
        };
        let senders = channels_from_config(&config);
        assert_eq!(senders.len(), 1);
        assert_eq!(senders[0].channel(), DeliveryChannel::Email);
    }

    #[test]
    fn test_empty_config() {
        assert!(channels_from_config(&ChannelConfig::default()).is_empty());
    }
}
