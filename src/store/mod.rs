//! SQLite persistence for injections and callbacks
//!
//! Single-file store shared by every component: the injector records before
//! it sends, the listeners append callbacks, and the correlation query joins
//! the two sides on the token. Writers use short-lived pool connections and
//! commit concurrently under WAL; foreign keys are enforced on every
//! connection so a callback row can never outlive referential integrity.

use crate::error::{Result, RicochetError};
use crate::models::{unix_now, Callback, Finding, Injection, Severity};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Handle to the on-disk injection/callback store.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

fn store_err(e: sqlx::Error) -> RicochetError {
    RicochetError::StoreIo(e.to_string())
}

impl Store {
    /// Opens (or creates) the store at `path` and runs the idempotent schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RicochetError::StoreIo(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Store { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS injections (
                token TEXT PRIMARY KEY,
                target_url TEXT NOT NULL,
                parameter TEXT NOT NULL,
                payload TEXT NOT NULL,
                context TEXT,
                injected_at REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS callbacks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL REFERENCES injections(token),
                source_ip TEXT,
                request_path TEXT,
                headers TEXT,
                body BLOB,
                received_at REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_callbacks_token ON callbacks(token)")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_injections_injected_at ON injections(injected_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    /// Appends an injection row. The token is the primary key; recording the
    /// same token twice is an invariant violation surfaced as
    /// [`RicochetError::DuplicateToken`].
    pub async fn record_injection(&self, inj: &Injection) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO injections (token, target_url, parameter, payload, context, injected_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&inj.token)
        .bind(&inj.target_url)
        .bind(&inj.parameter)
        .bind(&inj.payload)
        .bind(&inj.context)
        .bind(inj.injected_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RicochetError::DuplicateToken(inj.token.clone()))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    /// Fetches one injection by token.
    pub async fn get_injection(&self, token: &str) -> Result<Option<Injection>> {
        let row = sqlx::query("SELECT * FROM injections WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(|r| injection_from_row(&r)))
    }

    /// Lists recent injections, newest first.
    pub async fn list_injections(&self, limit: i64) -> Result<Vec<Injection>> {
        let rows = sqlx::query("SELECT * FROM injections ORDER BY injected_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.iter().map(injection_from_row).collect())
    }

    /// Appends a callback row if, and only if, its token matches a recorded
    /// injection. Returns `false` (and persists nothing) for unknown tokens;
    /// stranger traffic against the listeners never raises.
    pub async fn record_callback(
        &self,
        token: &str,
        source_ip: &str,
        request_path: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<bool> {
        let headers_json = serde_json::to_string(headers)?;
        let result = sqlx::query(
            "INSERT INTO callbacks (token, source_ip, request_path, headers, body, received_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(token)
        .bind(source_ip)
        .bind(request_path)
        .bind(headers_json)
        .bind(body)
        .bind(unix_now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                debug!("callback for unknown token {token} dropped");
                Ok(false)
            }
            Err(e) => Err(store_err(e)),
        }
    }

    /// All callbacks for one injection, newest first.
    pub async fn get_callbacks_for_injection(&self, token: &str) -> Result<Vec<Callback>> {
        let rows = sqlx::query("SELECT * FROM callbacks WHERE token = ? ORDER BY received_at DESC")
            .bind(token)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.iter().map(callback_from_row).collect())
    }

    /// Correlation query: inner join of injections and callbacks on the
    /// token, one finding per callback, newest first. `since` filters on the
    /// callback's `received_at`; the severity floor is applied in memory
    /// because the mapping from context to severity lives outside the
    /// storage layer.
    pub async fn get_findings(
        &self,
        since: Option<f64>,
        min_severity: Option<Severity>,
    ) -> Result<Vec<Finding>> {
        let rows = if let Some(since) = since {
            sqlx::query(
                "SELECT i.token, i.target_url, i.parameter, i.payload, i.context, i.injected_at,
                        c.id AS callback_id, c.source_ip, c.request_path, c.headers, c.body,
                        c.received_at
                 FROM injections i JOIN callbacks c ON i.token = c.token
                 WHERE c.received_at >= ?
                 ORDER BY c.received_at DESC",
            )
            .bind(since)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT i.token, i.target_url, i.parameter, i.payload, i.context, i.injected_at,
                        c.id AS callback_id, c.source_ip, c.request_path, c.headers, c.body,
                        c.received_at
                 FROM injections i JOIN callbacks c ON i.token = c.token
                 ORDER BY c.received_at DESC",
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(store_err)?;

        let mut findings: Vec<Finding> = rows.iter().map(finding_from_row).collect();
        if let Some(floor) = min_severity {
            findings.retain(|f| f.severity() <= floor);
        }
        Ok(findings)
    }

    /// Injections that have received at least one callback, paired with the
    /// callback count, ordered by most recent callback.
    pub async fn injections_with_callbacks(&self) -> Result<Vec<(Injection, i64)>> {
        let rows = sqlx::query(
            "SELECT i.*, COUNT(c.id) AS callback_count, MAX(c.received_at) AS last_callback
             FROM injections i JOIN callbacks c ON i.token = c.token
             GROUP BY i.token
             ORDER BY last_callback DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .iter()
            .map(|r| (injection_from_row(r), r.get::<i64, _>("callback_count")))
            .collect())
    }
}

fn injection_from_row(row: &SqliteRow) -> Injection {
    Injection {
        token: row.get("token"),
        target_url: row.get("target_url"),
        parameter: row.get("parameter"),
        payload: row.get("payload"),
        context: row.get("context"),
        injected_at: row.get("injected_at"),
    }
}

fn callback_from_row(row: &SqliteRow) -> Callback {
    Callback {
        id: row.get("id"),
        token: row.get("token"),
        source_ip: row.get("source_ip"),
        request_path: row.get("request_path"),
        headers: parse_headers(row.get("headers")),
        body: row.get("body"),
        received_at: row.get("received_at"),
    }
}

fn finding_from_row(row: &SqliteRow) -> Finding {
    Finding {
        token: row.get("token"),
        target_url: row.get("target_url"),
        parameter: row.get("parameter"),
        payload: row.get("payload"),
        context: row.get("context"),
        injected_at: row.get("injected_at"),
        callback_id: row.get("callback_id"),
        source_ip: row.get("source_ip"),
        request_path: row.get("request_path"),
        callback_headers: parse_headers(row.get("headers")),
        callback_body: row.get("body"),
        received_at: row.get("received_at"),
    }
}

fn parse_headers(raw: Option<String>) -> BTreeMap<String, String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}
