//! Opportunity monitor — the polling loop that fetches, diffs against the
//! last-seen cache and hands new opportunities to the dispatcher.
//! Uses tokio::interval: sleeps between cycles, one cycle at a time.
//!
//! ```text
//! Idle → Fetching → Diffing → Notifying → Idle
//!           └── failure: cycle skipped, cache untouched
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetflow_core::config::MonitorConfig;
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::types::{Notification, Opportunity, OpportunityQuery, Priority, Recipient};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatch::{DispatchReport, NotificationDispatcher};
use crate::fetcher::{FetcherStatus, RetryingFetcher};
use crate::persistence::FleetFlowDb;

/// Where the monitor is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Fetching,
    Diffing,
    Notifying,
}

/// Counters across cycles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    /// Fetches that finished after a stop request and were thrown away.
    pub cycles_discarded: u64,
    pub opportunities_fetched: u64,
    pub new_opportunities: u64,
    pub notifications_delivered: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Result of one polling cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed {
        fetched: usize,
        new: Vec<Opportunity>,
        reports: Vec<DispatchReport>,
    },
    /// Fetch failed; nothing changed. The next tick tries again.
    Skipped { reason: String },
}

impl CycleOutcome {
    pub fn new_ids(&self) -> Vec<&str> {
        match self {
            CycleOutcome::Completed { new, .. } => new.iter().map(|o| o.id.as_str()).collect(),
            CycleOutcome::Skipped { .. } => Vec::new(),
        }
    }
}

/// Polls one source and notifies recipients about unseen opportunities.
pub struct OpportunityMonitor {
    config: MonitorConfig,
    fetcher: RetryingFetcher,
    dispatcher: Arc<NotificationDispatcher>,
    recipients: Vec<Recipient>,
    seen: HashSet<String>,
    state: MonitorState,
    stats: MonitorStats,
    db: Option<FleetFlowDb>,
}

impl OpportunityMonitor {
    pub fn new(
        config: MonitorConfig,
        fetcher: RetryingFetcher,
        dispatcher: Arc<NotificationDispatcher>,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            config,
            fetcher,
            dispatcher,
            recipients,
            seen: HashSet::new(),
            state: MonitorState::Idle,
            stats: MonitorStats::default(),
            db: None,
        }
    }

    /// Start from a known set of ids instead of an empty cache.
    pub fn with_seen<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seen = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Persist the cache and delivered notifications. Loads the stored cache
    /// and any stored recipient preferences.
    pub fn with_db(mut self, db: FleetFlowDb) -> Result<Self> {
        self.seen = db.load_seen_ids(&self.config.name)?;
        for recipient in &mut self.recipients {
            if let Some(prefs) = db.get_preferences(&recipient.id)? {
                recipient.preferences = prefs;
            }
        }
        tracing::info!(
            "💾 Monitor '{}' restored {} known opportunities",
            self.config.name,
            self.seen.len()
        );
        self.db = Some(db);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn seen_ids(&self) -> &HashSet<String> {
        &self.seen
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn fetcher_status(&self) -> FetcherStatus {
        self.fetcher.status()
    }

    /// Replace one recipient's preferences (and persist them if a db is attached).
    pub fn update_preferences(
        &mut self,
        recipient_id: &str,
        prefs: fleetflow_core::NotificationPreferences,
    ) -> Result<bool> {
        let Some(recipient) = self.recipients.iter_mut().find(|r| r.id == recipient_id) else {
            return Ok(false);
        };
        if let Some(db) = &self.db {
            db.set_preferences(recipient_id, &prefs)?;
        }
        recipient.preferences = prefs;
        Ok(true)
    }

    /// Query for a cycle that runs on `today`.
    pub fn build_query(&self, today: chrono::NaiveDate) -> OpportunityQuery {
        let mut query = OpportunityQuery::lookback(today, self.config.lookback_days);
        query.category = self.config.category.clone();
        query.keywords = self.config.keywords.clone();
        query.limit = self.config.source.limit;
        query
    }

    /// Compare a fetched batch with the cache by id. Returns the unseen
    /// records and replaces the cache with the batch's ids.
    pub fn diff(&mut self, batch: &[Opportunity]) -> Vec<Opportunity> {
        let mut emitted = HashSet::new();
        let fresh: Vec<Opportunity> = batch
            .iter()
            .filter(|o| !self.seen.contains(&o.id) && emitted.insert(o.id.as_str()))
            .cloned()
            .collect();
        self.seen = batch.iter().map(|o| o.id.clone()).collect();
        fresh
    }

    /// Priority: urgent when due soon, high when valuable, low once expired.
    pub fn priority_for(&self, opp: &Opportunity, now: DateTime<Utc>) -> Priority {
        if let Some(deadline) = opp.response_deadline {
            if deadline <= now {
                return Priority::Low;
            }
            if (deadline - now).num_days() <= self.config.urgent_deadline_days {
                return Priority::Urgent;
            }
        }
        match opp.estimated_value {
            Some(v) if v >= self.config.high_value_threshold => Priority::High,
            _ => Priority::Normal,
        }
    }

    pub fn notification_for(&self, opp: &Opportunity, now: DateTime<Utc>) -> Notification {
        let mut message = match &opp.agency {
            Some(agency) => format!("{agency}: {}", opp.title),
            None => opp.title.clone(),
        };
        if let Some(deadline) = opp.response_deadline {
            message.push_str(&format!(" | due {}", deadline.format("%Y-%m-%d %H:%M UTC")));
        }
        if let Some(value) = opp.estimated_value {
            message.push_str(&format!(" | est. ${value:.0}"));
        }

        let mut n = Notification::new(
            self.config.notification_type,
            self.priority_for(opp, now),
            &format!("New opportunity: {}", opp.title),
            &message,
        )
        .for_portals(self.config.target_portals.iter().copied())
        .with_source(&opp.source_system)
        .with_metadata(serde_json::json!({
            "opportunity_id": opp.id,
            "url": opp.url,
            "category": opp.category,
        }));
        n.timestamp = now;
        if let Some(value) = opp.estimated_value {
            n = n.with_value(value);
        }
        n
    }

    /// Fetching step only. The cache is not touched.
    pub async fn fetch_batch(&mut self) -> Result<Vec<Opportunity>> {
        self.state = MonitorState::Fetching;
        let query = self.build_query(Utc::now().date_naive());
        let result = self.fetcher.fetch(&query).await;
        if result.is_err() {
            self.state = MonitorState::Idle;
        }
        result
    }

    /// Diffing and notifying steps for a fetched batch.
    pub async fn apply_batch(&mut self, batch: Vec<Opportunity>) -> CycleOutcome {
        self.apply_batch_at(batch, Utc::now()).await
    }

    pub async fn apply_batch_at(&mut self, batch: Vec<Opportunity>, now: DateTime<Utc>) -> CycleOutcome {
        self.state = MonitorState::Diffing;
        let fresh = self.diff(&batch);
        self.stats.cycles_run += 1;
        self.stats.opportunities_fetched += batch.len() as u64;
        self.stats.new_opportunities += fresh.len() as u64;
        self.stats.last_success = Some(now);
        self.stats.last_error = None;

        if let Some(db) = &self.db {
            if let Err(e) = db.save_seen_ids(&self.config.name, &self.seen) {
                tracing::warn!("⚠️ Failed to save seen ids: {e}");
            }
        }

        self.state = MonitorState::Notifying;
        let mut reports = Vec::with_capacity(fresh.len());
        for opp in &fresh {
            let notification = self.notification_for(opp, now);
            let report = self
                .dispatcher
                .dispatch_at(&notification, &self.recipients, now)
                .await;
            self.stats.notifications_delivered += report.delivered.len() as u64;
            self.record_history(&notification, &report);
            reports.push(report);
        }

        tracing::info!(
            "🔎 Monitor '{}': {} fetched, {} new",
            self.config.name,
            batch.len(),
            fresh.len()
        );
        self.state = MonitorState::Idle;
        CycleOutcome::Completed {
            fetched: batch.len(),
            new: fresh,
            reports,
        }
    }

    fn record_history(&self, notification: &Notification, report: &DispatchReport) {
        let Some(db) = &self.db else {
            return;
        };
        for recipient_id in report.recipients_reached() {
            if let Err(e) = db.save_notification(recipient_id, notification) {
                tracing::warn!("⚠️ Failed to save notification for {recipient_id}: {e}");
            }
        }
    }

    /// Record a failed fetch as a skipped cycle.
    pub fn skip(&mut self, error: &FleetFlowError) -> CycleOutcome {
        self.stats.cycles_skipped += 1;
        self.stats.last_error = Some(error.to_string());
        self.state = MonitorState::Idle;
        tracing::warn!(
            "⏭️ Monitor '{}' skipped cycle: {error}",
            self.config.name
        );
        CycleOutcome::Skipped {
            reason: error.to_string(),
        }
    }

    /// One full cycle. Never fails: fetch errors become `Skipped`.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.fetch_batch().await {
            Ok(batch) => self.apply_batch(batch).await,
            Err(e) => self.skip(&e),
        }
    }
}

/// Running monitor task.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<OpportunityMonitor>,
}

impl MonitorHandle {
    /// Stop the timer. An in-flight fetch finishes and its result is dropped.
    /// Returns the monitor with its cache and stats.
    pub async fn stop(self) -> Option<OpportunityMonitor> {
        let _ = self.stop_tx.send(true);
        match self.task.await {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                tracing::warn!("⚠️ Monitor task ended abnormally: {e}");
                None
            }
        }
    }
}

/// Spawn the monitor loop as a background tokio task. The first cycle runs
/// immediately, then every `interval`.
pub fn spawn_monitor(mut monitor: OpportunityMonitor, interval: Duration) -> MonitorHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!(
            "⏰ Monitor '{}' started (every {}s)",
            monitor.name(),
            interval.as_secs()
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }

            let fetched = monitor.fetch_batch().await;
            if *stop_rx.borrow() {
                monitor.stats.cycles_discarded += 1;
                monitor.state = MonitorState::Idle;
                tracing::info!("🛑 Monitor '{}' stopped mid-cycle, result discarded", monitor.name());
                break;
            }
            match fetched {
                Ok(batch) => {
                    monitor.apply_batch(batch).await;
                }
                Err(e) => {
                    monitor.skip(&e);
                }
            }
        }

        tracing::info!("🛑 Monitor '{}' stopped", monitor.name());
        monitor
    });

    MonitorHandle { stop_tx, task }
}
