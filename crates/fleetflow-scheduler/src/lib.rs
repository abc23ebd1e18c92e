//! # FleetFlow Scheduler
//!
//! Opportunity polling and notification fan-out for the FleetFlow platform.
//! Runs on tokio timers only; state survives restarts through SQLite.
//!
//! ## Architecture
//! ```text
//! OpportunityMonitor (tokio interval)
//!   ├── RetryingFetcher
//!   │     ├── CircuitBreaker: 5 failures → open for 5 min
//!   │     ├── RateLimiter: 900 calls per hour
//!   │     └── OpportunitySource (SAM.gov style HTTP API)
//!   ├── diff against last-seen ids → new opportunities
//!   └── NotificationDispatcher (per recipient preferences)
//!         ├── InApp (NotificationStore)
//!         ├── Email (SMTP)
//!         ├── SMS (HTTP API)
//!         └── Push (HTTP API)
//! ```

pub mod circuit;
pub mod dispatch;
pub mod fetcher;
pub mod monitor;
pub mod notify;
pub mod persistence;
pub mod rate_limit;
pub mod source;

pub use circuit::{CircuitBreaker, CircuitState};
pub use dispatch::{DispatchReport, DispatchStats, NotificationDispatcher, SkipReason};
pub use fetcher::{FetcherStatus, RetryPolicy, RetryingFetcher};
pub use monitor::{CycleOutcome, MonitorHandle, MonitorState, MonitorStats, OpportunityMonitor, spawn_monitor};
pub use notify::{InAppChannel, NotificationStore};
pub use persistence::FleetFlowDb;
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
pub use source::HttpOpportunitySource;
