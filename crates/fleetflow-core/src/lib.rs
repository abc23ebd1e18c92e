//! # FleetFlow Core
//!
//! Shared data model, traits, configuration and error types used by the
//! opportunity monitor, the notification dispatcher and the delivery channels.

pub mod config;
pub mod error;
pub mod preferences;
pub mod traits;
pub mod types;

pub use config::FleetFlowConfig;
pub use error::{FleetFlowError, Result};
pub use preferences::{NotificationPreferences, QuietHours};
pub use traits::{ChannelSender, OpportunitySource};
pub use types::{
    DeliveryChannel, Notification, NotificationType, Opportunity, OpportunityQuery, Portal,
    Priority, Recipient,
};
