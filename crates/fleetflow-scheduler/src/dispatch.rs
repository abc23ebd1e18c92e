//! Notification dispatch — decides which recipients get a notification on
//! which channels, then hands it to the registered channel senders.
//!
//! Filter order per recipient: portal → priority → type → quiet hours →
//! value threshold → channel intersection. A failing channel never blocks
//! other channels or other recipients.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetflow_core::config::DispatchConfig;
use fleetflow_core::error::FleetFlowError;
use fleetflow_core::traits::ChannelSender;
use fleetflow_core::types::{DeliveryChannel, Notification, NotificationType, Priority, Recipient};
use serde::Serialize;

/// Why a recipient did not get a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    PortalNotTargeted,
    PriorityDisabled { priority: Priority },
    TypeDisabled { kind: NotificationType },
    QuietHours,
    BelowThreshold { min: f64, value: f64 },
    NoChannels,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PortalNotTargeted => write!(f, "portal not targeted"),
            SkipReason::PriorityDisabled { priority } => write!(f, "priority {priority} disabled"),
            SkipReason::TypeDisabled { kind } => write!(f, "type {kind} disabled"),
            SkipReason::QuietHours => write!(f, "quiet hours"),
            SkipReason::BelowThreshold { min, value } => {
                write!(f, "value {value} below minimum {min}")
            }
            SkipReason::NoChannels => write!(f, "no enabled channel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub recipient_id: String,
    pub channel: DeliveryChannel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryFailure {
    pub recipient_id: String,
    pub channel: DeliveryChannel,
    pub error: String,
}

/// Outcome of one `dispatch` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub notification_id: String,
    pub delivered: Vec<Delivery>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<DeliveryFailure>,
}

impl DispatchReport {
    /// Recipients that got it on at least one channel.
    pub fn recipients_reached(&self) -> BTreeSet<&str> {
        self.delivered.iter().map(|d| d.recipient_id.as_str()).collect()
    }

    pub fn skip_reason(&self, recipient_id: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|(id, _)| id == recipient_id)
            .map(|(_, reason)| reason)
    }
}

/// Running totals across all dispatches.
#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Preference-aware fan-out to channel senders.
pub struct NotificationDispatcher {
    senders: BTreeMap<DeliveryChannel, Arc<dyn ChannelSender>>,
    channel_timeout: Duration,
    counters: Counters,
}

impl NotificationDispatcher {
    pub fn new(channel_timeout: Duration) -> Self {
        Self {
            senders: BTreeMap::new(),
            channel_timeout,
            counters: Counters::default(),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(Duration::from_secs(config.channel_timeout_secs))
    }

    /// Register (or replace) the sender for its channel.
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        let channel = sender.channel();
        tracing::info!("📡 Channel registered: {channel}");
        self.senders.insert(channel, sender);
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.register(sender);
        self
    }

    pub fn registered_channels(&self) -> Vec<DeliveryChannel> {
        self.senders.keys().copied().collect()
    }

    /// Channels this recipient should get the notification on, or why not.
    pub fn route(
        &self,
        notification: &Notification,
        recipient: &Recipient,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<DeliveryChannel>, SkipReason> {
        let prefs = &recipient.preferences;

        if !notification.targets(recipient.portal) {
            return Err(SkipReason::PortalNotTargeted);
        }
        if !prefs.priority_enabled(notification.priority) {
            return Err(SkipReason::PriorityDisabled {
                priority: notification.priority,
            });
        }
        if !prefs.type_enabled(notification.kind) {
            return Err(SkipReason::TypeDisabled {
                kind: notification.kind,
            });
        }
        if prefs.in_quiet_hours(now) {
            let bypass =
                prefs.quiet_hours.urgent_bypass && notification.priority.can_bypass_quiet_hours();
            if !bypass {
                return Err(SkipReason::QuietHours);
            }
        }
        if !prefs.meets_threshold(notification.value) {
            return Err(SkipReason::BelowThreshold {
                min: prefs.min_value.unwrap_or_default(),
                value: notification.value.unwrap_or_default(),
            });
        }

        let channels: BTreeSet<DeliveryChannel> = notification
            .channels
            .iter()
            .copied()
            .filter(|c| prefs.channel_enabled(*c) && self.senders.contains_key(c))
            .collect();
        if channels.is_empty() {
            return Err(SkipReason::NoChannels);
        }
        Ok(channels)
    }

    /// Dispatch now.
    pub async fn dispatch(&self, notification: &Notification, recipients: &[Recipient]) -> DispatchReport {
        self.dispatch_at(notification, recipients, Utc::now()).await
    }

    /// Dispatch evaluating quiet hours at `now`.
    pub async fn dispatch_at(
        &self,
        notification: &Notification,
        recipients: &[Recipient],
        now: DateTime<Utc>,
    ) -> DispatchReport {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut report = DispatchReport {
            notification_id: notification.id.clone(),
            ..Default::default()
        };

        for recipient in recipients {
            let channels = match self.route(notification, recipient, now) {
                Ok(channels) => channels,
                Err(reason) => {
                    tracing::debug!(
                        "🔕 '{}' skipped for {}: {}",
                        notification.title,
                        recipient.id,
                        reason
                    );
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    report.skipped.push((recipient.id.clone(), reason));
                    continue;
                }
            };

            let sends = channels.iter().filter_map(|channel| {
                let sender = self.senders.get(channel)?;
                Some(async move { (*channel, self.send_one(sender.as_ref(), recipient, notification).await) })
            });

            for (channel, result) in futures::future::join_all(sends).await {
                match result {
                    Ok(()) => {
                        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                        report.delivered.push(Delivery {
                            recipient_id: recipient.id.clone(),
                            channel,
                        });
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ {e}");
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        report.failed.push(DeliveryFailure {
                            recipient_id: recipient.id.clone(),
                            channel,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            "📣 '{}' [{}] delivered {} / skipped {} / failed {}",
            notification.title,
            notification.priority,
            report.delivered.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    async fn send_one(
        &self,
        sender: &dyn ChannelSender,
        recipient: &Recipient,
        notification: &Notification,
    ) -> Result<(), FleetFlowError> {
        match tokio::time::timeout(self.channel_timeout, sender.send(recipient, notification)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ FleetFlowError::ChannelDelivery { .. })) => Err(e),
            Ok(Err(other)) => Err(FleetFlowError::delivery(
                sender.channel().to_string(),
                &recipient.id,
                other.to_string(),
            )),
            Err(_) => Err(FleetFlowError::delivery(
                sender.channel().to_string(),
                &recipient.id,
                format!("timed out after {}s", self.channel_timeout.as_secs()),
            )),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}
