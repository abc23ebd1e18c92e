//! Core data model: opportunities, notifications, recipients.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::preferences::NotificationPreferences;

/// A procurement opportunity returned by an upstream source.
/// Never mutated once a fetch cycle produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Unique id, used as the diff key between cycles.
    pub id: String,
    pub title: String,
    pub posted_date: Option<NaiveDate>,
    pub response_deadline: Option<DateTime<Utc>>,
    pub estimated_value: Option<f64>,
    /// Which system produced it (e.g. "sam.gov", "automotive-rfp").
    pub source_system: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Opportunity {
    pub fn new(id: &str, title: &str, source_system: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            posted_date: None,
            response_deadline: None,
            estimated_value: None,
            source_system: source_system.to_string(),
            description: None,
            agency: None,
            category: None,
            url: None,
        }
    }

    /// Days left until the response deadline, negative once it has passed.
    pub fn days_until_deadline(&self, now: DateTime<Utc>) -> Option<i64> {
        self.response_deadline.map(|d| (d - now).num_days())
    }
}

/// Query parameters sent to an opportunity source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityQuery {
    pub posted_from: NaiveDate,
    pub posted_to: NaiveDate,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub limit: Option<u32>,
}

impl OpportunityQuery {
    /// Query covering the last `lookback_days` up to `today`.
    pub fn lookback(today: NaiveDate, lookback_days: u32) -> Self {
        Self {
            posted_from: today - chrono::Duration::days(lookback_days as i64),
            posted_to: today,
            category: None,
            keywords: Vec::new(),
            limit: None,
        }
    }
}

/// Notification priority, ordered low → critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
        Priority::Critical,
    ];

    /// Urgent and critical may skip quiet hours when the recipient allows it.
    pub fn can_bypass_quiet_hours(&self) -> bool {
        matches!(self, Priority::Urgent | Priority::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    RfxOpportunity,
    GovernmentContract,
    AutomotiveRfp,
    LoadAssignment,
    DispatchUpdate,
    PaymentAlert,
    ComplianceAlert,
    SystemAlert,
}

impl NotificationType {
    pub const ALL: [NotificationType; 8] = [
        NotificationType::RfxOpportunity,
        NotificationType::GovernmentContract,
        NotificationType::AutomotiveRfp,
        NotificationType::LoadAssignment,
        NotificationType::DispatchUpdate,
        NotificationType::PaymentAlert,
        NotificationType::ComplianceAlert,
        NotificationType::SystemAlert,
    ];
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::RfxOpportunity => "rfx_opportunity",
            NotificationType::GovernmentContract => "government_contract",
            NotificationType::AutomotiveRfp => "automotive_rfp",
            NotificationType::LoadAssignment => "load_assignment",
            NotificationType::DispatchUpdate => "dispatch_update",
            NotificationType::PaymentAlert => "payment_alert",
            NotificationType::ComplianceAlert => "compliance_alert",
            NotificationType::SystemAlert => "system_alert",
        };
        f.write_str(s)
    }
}

/// Delivery channel a notification can travel on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    InApp,
    Email,
    Sms,
    Push,
}

impl DeliveryChannel {
    pub const ALL: [DeliveryChannel; 4] = [
        DeliveryChannel::InApp,
        DeliveryChannel::Email,
        DeliveryChannel::Sms,
        DeliveryChannel::Push,
    ];
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryChannel::InApp => write!(f, "in_app"),
            DeliveryChannel::Email => write!(f, "email"),
            DeliveryChannel::Sms => write!(f, "sms"),
            DeliveryChannel::Push => write!(f, "push"),
        }
    }
}

/// Role tag of the portal a recipient works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Portal {
    Admin,
    Dispatcher,
    Broker,
    Carrier,
    Driver,
    Shipper,
    Vendor,
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Portal::Admin => "admin",
            Portal::Dispatcher => "dispatcher",
            Portal::Broker => "broker",
            Portal::Carrier => "carrier",
            Portal::Driver => "driver",
            Portal::Shipper => "shipper",
            Portal::Vendor => "vendor",
        };
        f.write_str(s)
    }
}

/// A notification. Only `read` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub channels: BTreeSet<DeliveryChannel>,
    /// Empty means every portal.
    pub target_portals: BTreeSet<Portal>,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
    /// Associated amount, checked against a recipient's `min_value`.
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Notification {
    /// New unread notification on every channel, for every portal.
    pub fn new(kind: NotificationType, priority: Priority, title: &str, message: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            priority,
            title: title.to_string(),
            message: message.to_string(),
            channels: DeliveryChannel::ALL.into_iter().collect(),
            target_portals: BTreeSet::new(),
            read: false,
            timestamp: Utc::now(),
            value: None,
            source: String::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = DeliveryChannel>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    pub fn for_portals(mut self, portals: impl IntoIterator<Item = Portal>) -> Self {
        self.target_portals = portals.into_iter().collect();
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn targets(&self, portal: Portal) -> bool {
        self.target_portals.is_empty() || self.target_portals.contains(&portal)
    }
}

/// Someone who receives notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub portal: Portal,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default)]
    pub preferences: NotificationPreferences,
}

impl Recipient {
    pub fn new(id: &str, name: &str, portal: Portal) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            portal,
            email: None,
            phone: None,
            push_token: None,
            preferences: NotificationPreferences::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert!(Priority::Urgent < Priority::Critical);
        assert!(Priority::Critical.can_bypass_quiet_hours());
        assert!(!Priority::High.can_bypass_quiet_hours());
    }

    #[test]
    fn test_notification_targets() {
        let n = Notification::new(
            NotificationType::GovernmentContract,
            Priority::High,
            "New RFP",
            "body",
        );
        assert!(n.targets(Portal::Driver));

        let n = n.for_portals([Portal::Broker, Portal::Admin]);
        assert!(n.targets(Portal::Broker));
        assert!(!n.targets(Portal::Driver));
    }

    #[test]
    fn test_serialized_names() {
        let n = Notification::new(
            NotificationType::AutomotiveRfp,
            Priority::Urgent,
            "t",
            "m",
        )
        .with_channels([DeliveryChannel::InApp]);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "automotive_rfp");
        assert_eq!(json["priority"], "urgent");
        assert_eq!(json["channels"][0], "in_app");
    }

    #[test]
    fn test_days_until_deadline() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut opp = Opportunity::new("A", "Fleet tires", "sam.gov");
        assert_eq!(opp.days_until_deadline(now), None);
        opp.response_deadline = Some(Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
        assert_eq!(opp.days_until_deadline(now), Some(3));
    }

    #[test]
    fn test_lookback_query() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let q = OpportunityQuery::lookback(today, 7);
        assert_eq!(q.posted_from, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(q.posted_to, today);
    }
}
