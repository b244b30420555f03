// minitel-core/src/vault/mod.rs

use crate::settings::{SessionSettings, StoredSettings, keys};
use chrono::Utc;
use minitel_neural::{Role, Turn};
use rusqlite::{Connection, Result, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

pub mod schema;

/// Exchanges kept for context (one user turn plus one assistant turn each).
pub const MAX_HISTORY_EXCHANGES: usize = 20;
pub const MAX_HISTORY_CHARS: usize = 16_000;

// ════════════════════════════════════════════════════════════════════
// Collaborator traits
// ════════════════════════════════════════════════════════════════════

/// Conversation turns fed back to the chat backend.
pub trait HistoryStore {
    /// Retained turns, oldest first.
    fn turns(&self) -> anyhow::Result<Vec<Turn>>;
    fn append(&mut self, turns: &[Turn]) -> anyhow::Result<()>;
    fn reset(&mut self) -> anyhow::Result<()>;
}

pub trait SettingsStore {
    fn load_settings(&self) -> anyhow::Result<StoredSettings>;
    /// All keys are written together or not at all.
    fn save_settings(&mut self, settings: &SessionSettings) -> anyhow::Result<()>;
    /// Forget the confirmed link so the next start probes again.
    fn clear_link(&mut self) -> anyhow::Result<()>;
}

// ════════════════════════════════════════════════════════════════════
// Data types
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_turns: usize,
    pub max_chars: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_turns: MAX_HISTORY_EXCHANGES * 2,
            max_chars: MAX_HISTORY_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultStats {
    pub turns: i64,
    pub session_turns: i64,
    pub total_sessions: i64,
    pub history_chars: i64,
}

// ════════════════════════════════════════════════════════════════════
// Vault
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Vault {
    conn: Arc<Mutex<Connection>>,
    session_id: String,
    start_time: i64,
    retention: Retention,
}

impl Vault {
    /// Open the Vault at the specified path.
    /// Creates the database file and runs all migrations if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(&path)?;

        // WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn)
    }

    /// A throwaway vault (tests, `--simulate` without a path).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Run migrations in order
        conn.execute_batch(schema::MIGRATION_INIT)?;
        conn.execute_batch(schema::MIGRATION_V2)?;

        let vault = Self {
            conn: Arc::new(Mutex::new(conn)),
            session_id: Uuid::new_v4().to_string(),
            start_time: Utc::now().timestamp(),
            retention: Retention::default(),
        };

        vault.start_session()?;

        Ok(vault)
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ────────────────────────────────────────────────────────────────
    // Sessions
    // ────────────────────────────────────────────────────────────────

    fn start_session(&self) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session (id, start_time) VALUES (?1, ?2)",
            params![self.session_id, self.start_time],
        )?;
        Ok(())
    }

    /// Mark the current session as ended.
    pub fn close_session(&self) -> Result<()> {
        self.conn().execute(
            "UPDATE session SET end_time = ?1 WHERE id = ?2",
            params![Utc::now().timestamp(), self.session_id],
        )?;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Conversation History
    // ────────────────────────────────────────────────────────────────

    pub fn append_turns(&self, turns: &[Turn]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();
        for turn in turns {
            tx.execute(
                "INSERT INTO history (session_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![self.session_id, turn.role.as_str(), turn.content, now],
            )?;
        }
        trim_history(&tx, self.retention)?;
        tx.commit()
    }

    /// Retained turns, oldest first.
    pub fn load_turns(&self) -> Result<Vec<Turn>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT role, content FROM history ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content) = row?;
            match Role::parse(&role) {
                Some(role) => turns.push(Turn::new(role, content)),
                None => warn!("Vault: skipping turn with unknown role {:?}", role),
            }
        }
        Ok(turns)
    }

    pub fn clear_history(&self) -> Result<()> {
        self.conn().execute("DELETE FROM history", [])?;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Statistics
    // ────────────────────────────────────────────────────────────────

    pub fn stats(&self) -> Result<VaultStats> {
        let conn = self.conn();

        let turns: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;

        let session_turns: i64 = conn.query_row(
            "SELECT COUNT(*) FROM history WHERE session_id = ?1",
            params![self.session_id],
            |row| row.get(0),
        )?;

        let total_sessions: i64 =
            conn.query_row("SELECT COUNT(*) FROM session", [], |row| row.get(0))?;

        let history_chars: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM history",
            [],
            |row| row.get(0),
        )?;

        Ok(VaultStats {
            turns,
            session_turns,
            total_sessions,
            history_chars,
        })
    }

    // ────────────────────────────────────────────────────────────────
    // Config (key-value settings)
    // ────────────────────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn().query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn all_config(&self) -> Result<HashMap<String, String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (k, v) = row?;
            map.insert(k, v);
        }
        Ok(map)
    }

    /// Replace several keys in one transaction.
    pub fn set_config_many(&self, pairs: &[(&str, String)]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (key, value) in pairs {
            tx.execute(
                "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()
    }

    pub fn remove_config(&self, keys: &[&str]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for key in keys {
            removed += tx.execute("DELETE FROM config WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

/// Drop the oldest turns beyond the turn count, then beyond the character budget.
fn trim_history(conn: &Connection, retention: Retention) -> Result<()> {
    let dropped = conn.execute(
        "DELETE FROM history WHERE id NOT IN
            (SELECT id FROM history ORDER BY id DESC LIMIT ?1)",
        params![retention.max_turns as i64],
    )?;

    let sizes: Vec<(i64, i64)> = {
        let mut stmt = conn.prepare("SELECT id, LENGTH(content) FROM history ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_>>()?
    };

    let mut total = 0usize;
    let mut cutoff = None;
    for (id, len) in sizes {
        total += len.max(0) as usize;
        if total > retention.max_chars {
            cutoff = Some(id);
            break;
        }
    }

    let mut trimmed = 0;
    if let Some(id) = cutoff {
        trimmed = conn.execute("DELETE FROM history WHERE id <= ?1", params![id])?;
    }
    if dropped + trimmed > 0 {
        debug!("Vault: trimmed {} old turn(s)", dropped + trimmed);
    }
    Ok(())
}

impl HistoryStore for Vault {
    fn turns(&self) -> anyhow::Result<Vec<Turn>> {
        Ok(self.load_turns()?)
    }

    fn append(&mut self, turns: &[Turn]) -> anyhow::Result<()> {
        Ok(self.append_turns(turns)?)
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        Ok(self.clear_history()?)
    }
}

impl SettingsStore for Vault {
    fn load_settings(&self) -> anyhow::Result<StoredSettings> {
        Ok(SessionSettings::from_pairs(&self.all_config()?))
    }

    fn save_settings(&mut self, settings: &SessionSettings) -> anyhow::Result<()> {
        Ok(self.set_config_many(&settings.to_pairs())?)
    }

    fn clear_link(&mut self) -> anyhow::Result<()> {
        self.remove_config(&keys::LINK)?;
        Ok(())
    }
}
