//! In-app notification store — per-recipient inbox kept in memory.
//! History per recipient is capped by evicting the oldest *read* entries;
//! unread notifications stay until deleted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use fleetflow_core::error::Result;
use fleetflow_core::traits::ChannelSender;
use fleetflow_core::types::{DeliveryChannel, Notification, Recipient};
use tokio::sync::RwLock;

/// Per-recipient inboxes.
pub struct NotificationStore {
    inboxes: RwLock<HashMap<String, VecDeque<Notification>>>,
    max_per_recipient: usize,
}

impl NotificationStore {
    pub fn new(max_per_recipient: usize) -> Self {
        Self {
            inboxes: RwLock::new(HashMap::new()),
            max_per_recipient: max_per_recipient.max(1),
        }
    }

    /// Add a notification to a recipient's inbox.
    pub async fn push(&self, recipient_id: &str, notification: Notification) {
        let mut inboxes = self.inboxes.write().await;
        let inbox = inboxes.entry(recipient_id.to_string()).or_default();
        inbox.push_back(notification);
        while inbox.len() > self.max_per_recipient {
            let Some(oldest_read) = inbox.iter().position(|n| n.read) else {
                break;
            };
            inbox.remove(oldest_read);
        }
    }

    /// Newest first.
    pub async fn list(&self, recipient_id: &str) -> Vec<Notification> {
        self.inboxes
            .read()
            .await
            .get(recipient_id)
            .map(|inbox| inbox.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn unread_count(&self, recipient_id: &str) -> usize {
        self.inboxes
            .read()
            .await
            .get(recipient_id)
            .map(|inbox| inbox.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// Flip `read` on one notification. Returns false if it is not there.
    pub async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> bool {
        let mut inboxes = self.inboxes.write().await;
        let Some(n) = inboxes
            .get_mut(recipient_id)
            .and_then(|inbox| inbox.iter_mut().find(|n| n.id == notification_id))
        else {
            return false;
        };
        n.read = true;
        true
    }

    /// Returns how many were flipped.
    pub async fn mark_all_read(&self, recipient_id: &str) -> usize {
        let mut inboxes = self.inboxes.write().await;
        let Some(inbox) = inboxes.get_mut(recipient_id) else {
            return 0;
        };
        let mut flipped = 0;
        for n in inbox.iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        flipped
    }

    pub async fn delete(&self, recipient_id: &str, notification_id: &str) -> bool {
        let mut inboxes = self.inboxes.write().await;
        let Some(inbox) = inboxes.get_mut(recipient_id) else {
            return false;
        };
        let len = inbox.len();
        inbox.retain(|n| n.id != notification_id);
        inbox.len() < len
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(100)
    }
}

/// The `in_app` channel: drops the notification into the recipient's inbox.
pub struct InAppChannel {
    store: Arc<NotificationStore>,
}

impl InAppChannel {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChannelSender for InAppChannel {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::InApp
    }

    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<()> {
        self.store.push(&recipient.id, notification.clone()).await;
        tracing::debug!("📥 In-app notification stored for {}: {}", recipient.id, notification.title);
        Ok(())
    }
}
