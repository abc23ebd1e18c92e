//! SQLite-backed persistence: key/value settings (recipient preferences,
//! monitor caches) and notification history.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::preferences::NotificationPreferences;
use fleetflow_core::types::Notification;
use rusqlite::OptionalExtension;
use serde::Serialize;
use serde::de::DeserializeOwned;

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> FleetFlowError + '_ {
    move |e| FleetFlowError::Database(format!("{context}: {e}"))
}

/// SQLite-backed store.
pub struct FleetFlowDb {
    conn: rusqlite::Connection,
}

impl FleetFlowDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Throwaway database for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            -- Generic settings (preferences, monitor caches)
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,        -- JSON
                updated_at TEXT NOT NULL
            );

            -- Notification history, one row per recipient
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                priority TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                payload TEXT NOT NULL,      -- full notification JSON
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (id, recipient_id)
            );
         ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    // ─── Key/value ──────────────────────────────────────────

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(db_err("KV get"))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, json, Utc::now().to_rfc3339()],
            )
            .map_err(db_err("KV set"))?;
        Ok(())
    }

    pub fn get_preferences(&self, recipient_id: &str) -> Result<Option<NotificationPreferences>> {
        self.get(&format!("preferences:{recipient_id}"))
    }

    pub fn set_preferences(&self, recipient_id: &str, prefs: &NotificationPreferences) -> Result<()> {
        self.set(&format!("preferences:{recipient_id}"), prefs)
    }

    pub fn load_seen_ids(&self, monitor: &str) -> Result<HashSet<String>> {
        Ok(self
            .get::<Vec<String>>(&format!("seen:{monitor}"))?
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_default())
    }

    pub fn save_seen_ids(&self, monitor: &str, ids: &HashSet<String>) -> Result<()> {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        self.set(&format!("seen:{monitor}"), &sorted)
    }

    // ─── Notifications ──────────────────────────────────────

    pub fn save_notification(&self, recipient_id: &str, n: &Notification) -> Result<()> {
        let payload = serde_json::to_string(n)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO notifications
                 (id, recipient_id, kind, priority, title, message, payload, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    n.id,
                    recipient_id,
                    n.kind.to_string(),
                    n.priority.to_string(),
                    n.title,
                    n.message,
                    payload,
                    n.read,
                    n.timestamp.to_rfc3339()
                ],
            )
            .map_err(db_err("Save notification"))?;
        Ok(())
    }

    /// Newest first. The stored `read` column wins over the payload.
    pub fn recent_notifications(&self, recipient_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT payload, read FROM notifications WHERE recipient_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(db_err("Recent notifications"))?;
        let rows = stmt
            .query_map(rusqlite::params![recipient_id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
            })
            .map_err(db_err("Recent notifications"))?;

        let mut out = Vec::new();
        for row in rows {
            let (payload, read) = row.map_err(db_err("Recent notifications"))?;
            match serde_json::from_str::<Notification>(&payload) {
                Ok(mut n) => {
                    n.read = read;
                    out.push(n);
                }
                Err(e) => tracing::warn!("⚠️ Skipping unreadable notification row: {e}"),
            }
        }
        Ok(out)
    }

    pub fn mark_notification_read(&self, recipient_id: &str, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                rusqlite::params![id, recipient_id],
            )
            .map_err(db_err("Mark read"))?;
        Ok(changed > 0)
    }

    pub fn delete_notification(&self, recipient_id: &str, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                rusqlite::params![id, recipient_id],
            )
            .map_err(db_err("Delete notification"))?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetflow_core::types::{NotificationType, Priority};

    #[test]
    fn test_open_and_migrate() {
        let dir = std::env::temp_dir().join("fleetflow-db-test");
        let db = FleetFlowDb::open(&dir.join("test.db")).unwrap();
        assert!(db.load_seen_ids("sam-gov").unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_preferences_round_trip() {
        let db = FleetFlowDb::open_in_memory().unwrap();
        assert!(db.get_preferences("r1").unwrap().is_none());

        let mut prefs = NotificationPreferences::default();
        prefs.set_priority(Priority::Low, false);
        prefs.min_value = Some(10_000.0);
        db.set_preferences("r1", &prefs).unwrap();

        // Overwrite keeps a single row.
        prefs.min_value = Some(20_000.0);
        db.set_preferences("r1", &prefs).unwrap();
        let loaded = db.get_preferences("r1").unwrap().unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn test_seen_ids() {
        let db = FleetFlowDb::open_in_memory().unwrap();
        let ids: HashSet<String> = ["B", "C", "D"].iter().map(|s| s.to_string()).collect();
        db.save_seen_ids("sam-gov", &ids).unwrap();
        assert_eq!(db.load_seen_ids("sam-gov").unwrap(), ids);
        assert!(db.load_seen_ids("automotive").unwrap().is_empty());
    }

    #[test]
    fn test_notification_history() {
        let db = FleetFlowDb::open_in_memory().unwrap();
        let n = Notification::new(NotificationType::PaymentAlert, Priority::High, "Paid", "Invoice 7");
        db.save_notification("r1", &n).unwrap();
        db.save_notification("r2", &n).unwrap();

        let recent = db.recent_notifications("r1", 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].read);

        assert!(db.mark_notification_read("r1", &n.id).unwrap());
        assert!(db.recent_notifications("r1", 10).unwrap()[0].read);
        assert!(!db.recent_notifications("r2", 10).unwrap()[0].read);

        assert!(db.delete_notification("r1", &n.id).unwrap());
        assert!(!db.delete_notification("r1", &n.id).unwrap());
        assert!(db.recent_notifications("r1", 10).unwrap().is_empty());
    }
}
