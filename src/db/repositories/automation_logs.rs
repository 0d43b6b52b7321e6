use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64, to_u64},
};
use crate::models::AutomationLogEntry;
use crate::orchestrator::LogSink;

pub const RECENT_LOGS_LIMIT: usize = 100;
pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 30;

// Fixed width, so text order in SQLite matches time order.
fn to_stored(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_entry(row: &Row) -> Result<AutomationLogEntry> {
    let timestamp: String = row.get("timestamp")?;
    let duration_ms: i64 = row.get("duration_ms")?;

    Ok(AutomationLogEntry {
        id: Some(row.get("id")?),
        run_id: row.get("run_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        package_id: row.get("package_id")?,
        display_name: row.get("display_name")?,
        duration_ms: to_u64(duration_ms, "duration_ms")?,
        succeeded: row.get("succeeded")?,
        error_message: row.get("error_message")?,
    })
}

impl Database {
    /// Appends one entry and returns its row id.
    pub async fn insert_log(&self, entry: &AutomationLogEntry) -> Result<i64> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO automation_logs (run_id, timestamp, package_id, display_name, duration_ms, succeeded, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.run_id,
                    to_stored(&record.timestamp),
                    record.package_id,
                    record.display_name,
                    to_i64(record.duration_ms)?,
                    record.succeeded,
                    record.error_message,
                ],
            )
            .with_context(|| format!("failed to insert log for {}", record.package_id))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest first.
    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<AutomationLogEntry>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM automation_logs
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn failed_logs(&self) -> Result<Vec<AutomationLogEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM automation_logs
                 WHERE succeeded = 0
                 ORDER BY timestamp DESC, id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn logs_for_run(&self, run_id: &str) -> Result<Vec<AutomationLogEntry>> {
        let run_id = run_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM automation_logs
                 WHERE run_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let mut rows = stmt.query(params![run_id])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// Deletes entries strictly older than `cutoff`; returns how many went.
    pub async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM automation_logs WHERE timestamp < ?1",
                    params![to_stored(&cutoff)],
                )
                .context("failed to delete old automation logs")?;
            Ok(deleted)
        })
        .await
    }

    pub async fn clean_old_logs(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days.max(0));
        self.delete_logs_before(cutoff).await
    }
}

#[async_trait]
impl LogSink for Database {
    async fn record(&self, entry: AutomationLogEntry) -> Result<()> {
        self.insert_log(&entry).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppTask;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("appdriver.db")).unwrap();
        (dir, db)
    }

    fn task(package: &str) -> AppTask {
        AppTask::new(package, package, 60_000).unwrap()
    }

    fn at(entry: AutomationLogEntry, days_ago: i64) -> AutomationLogEntry {
        AutomationLogEntry {
            timestamp: Utc::now() - Duration::days(days_ago),
            ..entry
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back_newest_first() {
        let (_dir, db) = open();
        let older = at(AutomationLogEntry::success("run-1", &task("com.example.a")), 2);
        let newer = at(
            AutomationLogEntry::failure("run-1", &task("com.example.b"), "Failed to launch"),
            1,
        );

        let first_id = db.insert_log(&older).await.unwrap();
        let second_id = db.insert_log(&newer).await.unwrap();
        assert!(second_id > first_id);

        let logs = db.recent_logs(RECENT_LOGS_LIMIT).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].package_id, "com.example.b");
        assert_eq!(logs[0].id, Some(second_id));
        assert!(!logs[0].succeeded);
        assert_eq!(logs[0].duration_ms, 0);
        assert_eq!(logs[0].error_message.as_deref(), Some("Failed to launch"));
        assert_eq!(logs[1].package_id, "com.example.a");
        assert!(logs[1].succeeded);
        assert_eq!(logs[1].duration_ms, 60_000);
    }

    #[tokio::test]
    async fn test_recent_logs_respects_limit() {
        let (_dir, db) = open();
        for i in 0..5 {
            let entry = AutomationLogEntry::success("run-1", &task(&format!("com.example.app{i}")));
            db.insert_log(&entry).await.unwrap();
        }
        assert_eq!(db.recent_logs(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_logs_and_run_filter() {
        let (_dir, db) = open();
        db.record(AutomationLogEntry::success("run-1", &task("com.example.a")))
            .await
            .unwrap();
        db.record(AutomationLogEntry::failure("run-1", &task("com.example.b"), "boom"))
            .await
            .unwrap();
        db.record(AutomationLogEntry::success("run-2", &task("com.example.c")))
            .await
            .unwrap();

        let failed = db.failed_logs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].package_id, "com.example.b");

        let run = db.logs_for_run("run-1").await.unwrap();
        let packages: Vec<&str> = run.iter().map(|e| e.package_id.as_str()).collect();
        assert_eq!(packages, vec!["com.example.a", "com.example.b"]);
    }

    #[tokio::test]
    async fn test_clean_old_logs_keeps_recent_entries() {
        let (_dir, db) = open();
        db.insert_log(&at(AutomationLogEntry::success("r", &task("com.example.old")), 45))
            .await
            .unwrap();
        db.insert_log(&at(AutomationLogEntry::success("r", &task("com.example.edge")), 29))
            .await
            .unwrap();
        db.insert_log(&AutomationLogEntry::success("r", &task("com.example.new")))
            .await
            .unwrap();

        let deleted = db.clean_old_logs(DEFAULT_LOG_RETENTION_DAYS).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = db
            .recent_logs(RECENT_LOGS_LIMIT)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.package_id)
            .collect();
        assert_eq!(remaining, vec!["com.example.new", "com.example.edge"]);
    }
}
