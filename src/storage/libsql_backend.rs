//! libSQL backend — async `ModStore` implementation.
//!
//! Local file or in-memory databases; `new_memory()` is for tests.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::llm::Role;
use crate::moderation::types::ActionKind;
use crate::storage::traits::{
    AuditEntry, CommunityPolicy, ConversationTurn, ModStore, PolicyPatch,
};

/// Conversation rows kept per user per channel.
const HISTORY_KEEP: u32 = 20;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS community_settings (
        community_id TEXT PRIMARY KEY,
        enabled INTEGER NOT NULL DEFAULT 0,
        severity_threshold INTEGER NOT NULL DEFAULT 3,
        action_ceiling TEXT NOT NULL DEFAULT 'timeout',
        dm_on_action INTEGER NOT NULL DEFAULT 1,
        public_warnings INTEGER NOT NULL DEFAULT 1,
        moderator_immunity INTEGER NOT NULL DEFAULT 1,
        ignored_channels TEXT NOT NULL DEFAULT '[]',
        ignored_roles TEXT NOT NULL DEFAULT '[]',
        log_channel TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS user_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        community_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        warnings INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(community_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS idx_user_data_community ON user_data(community_id);

    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        community_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        action TEXT NOT NULL,
        reason TEXT,
        duration TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_audit_community ON audit_log(community_id);
    CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(community_id, user_id);

    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        community_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_user
        ON conversations(community_id, channel_id, user_id);
"#;

/// libSQL store backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Query(format!("init_schema: {e}")))
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn ensure_policy_row(&self, community_id: &str) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO community_settings (community_id) VALUES (?1)",
                params![community_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("ensure_policy_row: {e}")))?;
        Ok(())
    }

    async fn ensure_user_row(&self, community_id: &str, user_id: &str) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO user_data (community_id, user_id) VALUES (?1, ?2)",
                params![community_id, user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("ensure_user_row: {e}")))?;
        Ok(())
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn serialize_string_list(list: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(list).map_err(|e| StorageError::Serialization(e.to_string()))
}

const POLICY_COLUMNS: &str = "community_id, enabled, severity_threshold, action_ceiling, \
     dm_on_action, public_warnings, moderator_immunity, ignored_channels, ignored_roles, \
     log_channel";

fn row_to_policy(row: &libsql::Row) -> Result<CommunityPolicy, libsql::Error> {
    let ceiling_str: String = row.get(3)?;
    let channels_str: String = row.get(7)?;
    let roles_str: String = row.get(8)?;
    let log_channel: Option<String> = row.get(9).ok();

    Ok(CommunityPolicy {
        community_id: row.get(0)?,
        enabled: row.get::<i64>(1)? != 0,
        severity_threshold: row.get::<i64>(2)?.clamp(1, 10) as u8,
        action_ceiling: ActionKind::from_str(&ceiling_str).unwrap_or(ActionKind::Timeout),
        dm_on_action: row.get::<i64>(4)? != 0,
        public_warnings: row.get::<i64>(5)? != 0,
        moderator_immunity: row.get::<i64>(6)? != 0,
        ignored_channels: parse_string_list(&channels_str),
        ignored_roles: parse_string_list(&roles_str),
        log_channel,
    })
}

const AUDIT_COLUMNS: &str =
    "community_id, user_id, actor_id, action, reason, duration, created_at";

fn row_to_audit(row: &libsql::Row) -> Result<AuditEntry, libsql::Error> {
    let action_str: String = row.get(3)?;
    let created_str: String = row.get(6)?;
    let reason: Option<String> = row.get(4).ok();
    let duration: Option<String> = row.get(5).ok();

    Ok(AuditEntry {
        community_id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        action: ActionKind::from_str(&action_str).unwrap_or(ActionKind::None),
        reason,
        duration,
        created_at: parse_datetime(&created_str),
    })
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn str_to_role(s: &str) -> Role {
    match s {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

#[async_trait]
impl ModStore for LibSqlStore {
    async fn get_policy(&self, community_id: &str) -> Result<CommunityPolicy, StorageError> {
        self.ensure_policy_row(community_id).await?;

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM community_settings WHERE community_id = ?1"
                ),
                params![community_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_policy: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                row_to_policy(&row).map_err(|e| StorageError::Query(format!("row parse: {e}")))
            }
            Ok(None) => Err(StorageError::NotFound {
                entity: "community_settings".to_string(),
                id: community_id.to_string(),
            }),
            Err(e) => Err(StorageError::Query(format!("get_policy: {e}"))),
        }
    }

    async fn update_policy(
        &self,
        community_id: &str,
        patch: PolicyPatch,
    ) -> Result<CommunityPolicy, StorageError> {
        let mut policy = self.get_policy(community_id).await?;

        if let Some(enabled) = patch.enabled {
            policy.enabled = enabled;
        }
        if let Some(threshold) = patch.severity_threshold {
            policy.severity_threshold = threshold;
        }
        if let Some(ceiling) = patch.action_ceiling {
            policy.action_ceiling = ceiling;
        }
        if let Some(dm) = patch.dm_on_action {
            policy.dm_on_action = dm;
        }
        if let Some(public) = patch.public_warnings {
            policy.public_warnings = public;
        }
        if let Some(immunity) = patch.moderator_immunity {
            policy.moderator_immunity = immunity;
        }
        if let Some(channels) = patch.ignored_channels {
            policy.ignored_channels = channels;
        }
        if let Some(roles) = patch.ignored_roles {
            policy.ignored_roles = roles;
        }
        if let Some(log_channel) = patch.log_channel {
            policy.log_channel = log_channel;
        }

        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE community_settings SET enabled = ?1, severity_threshold = ?2, \
                 action_ceiling = ?3, dm_on_action = ?4, public_warnings = ?5, \
                 moderator_immunity = ?6, ignored_channels = ?7, ignored_roles = ?8, \
                 log_channel = ?9, updated_at = ?10 WHERE community_id = ?11",
                params![
                    policy.enabled as i64,
                    policy.severity_threshold as i64,
                    policy.action_ceiling.as_str(),
                    policy.dm_on_action as i64,
                    policy.public_warnings as i64,
                    policy.moderator_immunity as i64,
                    serialize_string_list(&policy.ignored_channels)?,
                    serialize_string_list(&policy.ignored_roles)?,
                    opt_text_owned(policy.log_channel.clone()),
                    now,
                    community_id,
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_policy: {e}")))?;

        debug!(community_id, "Policy updated");
        Ok(policy)
    }

    async fn get_warning_count(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<u32, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT warnings FROM user_data WHERE community_id = ?1 AND user_id = ?2",
                params![community_id, user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_warning_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StorageError::Query(format!("row parse: {e}")))?;
                Ok(count.max(0) as u32)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StorageError::Query(format!("get_warning_count: {e}"))),
        }
    }

    async fn increment_warnings(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<u32, StorageError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO user_data (community_id, user_id, warnings, updated_at) \
                 VALUES (?1, ?2, 1, ?3) \
                 ON CONFLICT(community_id, user_id) \
                 DO UPDATE SET warnings = warnings + 1, updated_at = ?3 \
                 RETURNING warnings",
                params![community_id, user_id, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("increment_warnings: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StorageError::Query(format!("row parse: {e}")))?;
                Ok(count.max(0) as u32)
            }
            Ok(None) => Err(StorageError::Query(
                "increment_warnings returned no row".to_string(),
            )),
            Err(e) => Err(StorageError::Query(format!("increment_warnings: {e}"))),
        }
    }

    async fn reset_warnings(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError> {
        self.ensure_user_row(community_id, user_id).await?;
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE user_data SET warnings = 0, updated_at = ?1 \
                 WHERE community_id = ?2 AND user_id = ?3",
                params![now, community_id, user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("reset_warnings: {e}")))?;
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO audit_log (community_id, user_id, actor_id, action, reason, \
                 duration, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.community_id.as_str(),
                    entry.user_id.as_str(),
                    entry.actor_id.as_str(),
                    entry.action.as_str(),
                    opt_text_owned(entry.reason.clone()),
                    opt_text_owned(entry.duration.clone()),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("append_audit: {e}")))?;
        Ok(())
    }

    async fn audit_for_user(
        &self,
        community_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_log \
                     WHERE community_id = ?1 AND user_id = ?2 \
                     ORDER BY created_at DESC, id DESC LIMIT ?3"
                ),
                params![community_id, user_id, limit as i64],
            )
            .await
            .map_err(|e| StorageError::Query(format!("audit_for_user: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_audit(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Skipping audit row: {e}");
                }
            }
        }
        Ok(entries)
    }

    async fn audit_for_community(
        &self,
        community_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE community_id = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                ),
                params![community_id, limit as i64],
            )
            .await
            .map_err(|e| StorageError::Query(format!("audit_for_community: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_audit(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Skipping audit row: {e}");
                }
            }
        }
        Ok(entries)
    }

    async fn purge_community(&self, community_id: &str) -> Result<(), StorageError> {
        let conn = self.conn();
        for table in [
            "community_settings",
            "user_data",
            "audit_log",
            "conversations",
        ] {
            conn.execute(
                &format!("DELETE FROM {table} WHERE community_id = ?1"),
                params![community_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("purge_community ({table}): {e}")))?;
        }
        info!(community_id, "Community data purged");
        Ok(())
    }

    async fn add_conversation_turn(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
        turn: &ConversationTurn,
    ) -> Result<(), StorageError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO conversations (community_id, channel_id, user_id, role, content, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                community_id,
                channel_id,
                user_id,
                role_to_str(turn.role),
                turn.content.as_str(),
                now,
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("add_conversation_turn: {e}")))?;

        // Keep only the newest rows per user per channel
        conn.execute(
            "DELETE FROM conversations \
             WHERE community_id = ?1 AND channel_id = ?2 AND user_id = ?3 \
             AND id NOT IN ( \
                 SELECT id FROM conversations \
                 WHERE community_id = ?1 AND channel_id = ?2 AND user_id = ?3 \
                 ORDER BY id DESC LIMIT ?4 \
             )",
            params![community_id, channel_id, user_id, HISTORY_KEEP as i64],
        )
        .await
        .map_err(|e| StorageError::Query(format!("trim conversation history: {e}")))?;

        Ok(())
    }

    async fn conversation_history(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role, content FROM conversations \
                 WHERE community_id = ?1 AND channel_id = ?2 AND user_id = ?3 \
                 ORDER BY id DESC LIMIT ?4",
                params![community_id, channel_id, user_id, limit as i64],
            )
            .await
            .map_err(|e| StorageError::Query(format!("conversation_history: {e}")))?;

        let mut turns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let role_str: String = row
                .get(0)
                .map_err(|e| StorageError::Query(format!("row parse: {e}")))?;
            let content: String = row
                .get(1)
                .map_err(|e| StorageError::Query(format!("row parse: {e}")))?;
            turns.push(ConversationTurn {
                role: str_to_role(&role_str),
                content,
            });
        }
        // Query was newest-first; callers want chronological order
        turns.reverse();
        Ok(turns)
    }

    async fn clear_conversation(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "DELETE FROM conversations \
                 WHERE community_id = ?1 AND channel_id = ?2 AND user_id = ?3",
                params![community_id, channel_id, user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("clear_conversation: {e}")))?;
        Ok(())
    }
}
