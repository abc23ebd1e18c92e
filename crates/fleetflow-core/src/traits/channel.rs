//! Delivery channel trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DeliveryChannel, Notification, Recipient};

/// Sends a notification to one recipient over one channel.
/// Implementations are fire-and-forget side effects; the dispatcher decides
/// who receives what, never how.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Which channel this sender serves.
    fn channel(&self) -> DeliveryChannel;

    /// Deliver. A missing address for this channel is a `ChannelDelivery` error.
    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<()>;
}
