//! Per-recipient notification preferences.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeliveryChannel, NotificationType, Priority};

/// What a recipient wants to receive, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "all_channels")]
    pub channels: BTreeSet<DeliveryChannel>,
    #[serde(default = "all_priorities")]
    pub priorities: BTreeSet<Priority>,
    #[serde(default = "all_types")]
    pub types: BTreeSet<NotificationType>,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    /// Skip notifications whose associated value is below this amount.
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Offset of the recipient's local time from UTC, used for quiet hours.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn all_channels() -> BTreeSet<DeliveryChannel> {
    DeliveryChannel::ALL.into_iter().collect()
}
fn all_priorities() -> BTreeSet<Priority> {
    Priority::ALL.into_iter().collect()
}
fn all_types() -> BTreeSet<NotificationType> {
    NotificationType::ALL.into_iter().collect()
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            channels: all_channels(),
            priorities: all_priorities(),
            types: all_types(),
            quiet_hours: QuietHours::default(),
            min_value: None,
            utc_offset_minutes: 0,
        }
    }
}

impl NotificationPreferences {
    pub fn priority_enabled(&self, priority: Priority) -> bool {
        self.priorities.contains(&priority)
    }

    pub fn type_enabled(&self, kind: NotificationType) -> bool {
        self.types.contains(&kind)
    }

    pub fn channel_enabled(&self, channel: DeliveryChannel) -> bool {
        self.channels.contains(&channel)
    }

    pub fn set_priority(&mut self, priority: Priority, enabled: bool) {
        if enabled {
            self.priorities.insert(priority);
        } else {
            self.priorities.remove(&priority);
        }
    }

    pub fn set_type(&mut self, kind: NotificationType, enabled: bool) {
        if enabled {
            self.types.insert(kind);
        } else {
            self.types.remove(&kind);
        }
    }

    pub fn set_channel(&mut self, channel: DeliveryChannel, enabled: bool) {
        if enabled {
            self.channels.insert(channel);
        } else {
            self.channels.remove(&channel);
        }
    }

    /// Whether `now` falls inside the recipient's quiet hours (local time).
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let local = now + Duration::minutes(self.utc_offset_minutes as i64);
        self.quiet_hours.contains(local.time())
    }

    /// A missing value always passes.
    pub fn meets_threshold(&self, value: Option<f64>) -> bool {
        match (self.min_value, value) {
            (Some(min), Some(v)) => v >= min,
            _ => true,
        }
    }
}

/// Daily window during which only bypass-eligible priorities get through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    /// "HH:MM", local time.
    #[serde(default = "default_quiet_start")]
    pub start: String,
    /// "HH:MM", local time. May be earlier than `start` for overnight windows.
    #[serde(default = "default_quiet_end")]
    pub end: String,
    /// Let urgent/critical notifications through during quiet hours.
    #[serde(default = "default_true")]
    pub urgent_bypass: bool,
}

fn default_quiet_start() -> String {
    "22:00".into()
}
fn default_quiet_end() -> String {
    "07:00".into()
}
fn default_true() -> bool {
    true
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_quiet_start(),
            end: default_quiet_end(),
            urgent_bypass: true,
        }
    }
}

impl QuietHours {
    pub fn new(start: &str, end: &str, urgent_bypass: bool) -> Self {
        Self {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
            urgent_bypass,
        }
    }

    /// Parsed `(start, end)`; `None` if either bound is malformed.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(&self.end, "%H:%M").ok()?;
        Some((start, end))
    }

    /// Start is inclusive, end exclusive. Equal bounds mean an empty window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        let Some((start, end)) = self.window() else {
            return false;
        };
        if start <= end {
            time >= start && time < end
        } else {
            time >= start || time < end
        }
    }
}
