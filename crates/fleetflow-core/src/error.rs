//! FleetFlow error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetFlowError>;

#[derive(Debug, Error)]
pub enum FleetFlowError {
    /// Local throttle: the hourly request budget is spent.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Breaker is open, upstream calls are suppressed.
    #[error("Circuit open: retry in {retry_in_secs}s")]
    CircuitOpen { retry_in_secs: u64 },

    /// Non-2xx or transport failure from the opportunity source.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The source answered 429.
    #[error("Upstream throttled the request")]
    UpstreamThrottled,

    #[error("Delivery via {channel} to {recipient} failed: {reason}")]
    ChannelDelivery {
        channel: String,
        recipient: String,
        reason: String,
    },

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl FleetFlowError {
    /// Build a delivery error for one recipient/channel pair.
    pub fn delivery(
        channel: impl Into<String>,
        recipient: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ChannelDelivery {
            channel: channel.into(),
            recipient: recipient.into(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt in the same cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Timeout(_) | Self::Http(_))
    }
}
