//! Storage trait and the records it persists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::llm::Role;
use crate::moderation::types::ActionKind;

// ── Community policy ────────────────────────────────────────────────

/// Per-community moderation settings. Every community has one; reads for
/// an unknown community materialize the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPolicy {
    pub community_id: String,
    /// Moderation is opt-in per community.
    pub enabled: bool,
    /// Judgments below this severity are ignored (1..=10).
    pub severity_threshold: u8,
    /// Strongest action the pipeline may take here.
    pub action_ceiling: ActionKind,
    /// DM the sender when acting on their message.
    pub dm_on_action: bool,
    /// Post a transient public warning in the channel.
    pub public_warnings: bool,
    /// Moderators' messages are never scanned.
    pub moderator_immunity: bool,
    pub ignored_channels: Vec<String>,
    pub ignored_roles: Vec<String>,
    /// Channel that receives enforcement summaries, if set.
    pub log_channel: Option<String>,
}

impl CommunityPolicy {
    pub fn defaults(community_id: impl Into<String>) -> Self {
        Self {
            community_id: community_id.into(),
            enabled: false,
            severity_threshold: 3,
            action_ceiling: ActionKind::Timeout,
            dm_on_action: true,
            public_warnings: true,
            moderator_immunity: true,
            ignored_channels: Vec::new(),
            ignored_roles: Vec::new(),
            log_channel: None,
        }
    }
}

/// Partial policy update: only `Some` fields change.
#[derive(Debug, Clone, Default)]
pub struct PolicyPatch {
    pub enabled: Option<bool>,
    pub severity_threshold: Option<u8>,
    pub action_ceiling: Option<ActionKind>,
    pub dm_on_action: Option<bool>,
    pub public_warnings: Option<bool>,
    pub moderator_immunity: Option<bool>,
    pub ignored_channels: Option<Vec<String>>,
    pub ignored_roles: Option<Vec<String>>,
    pub log_channel: Option<Option<String>>,
}

// ── Audit log ───────────────────────────────────────────────────────

/// Actor id recorded for pipeline-initiated actions.
pub const SYSTEM_ACTOR: &str = "automod";

/// One enforcement event, kept for accountability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub community_id: String,
    pub user_id: String,
    /// Moderator id, or [`SYSTEM_ACTOR`] for automatic actions.
    pub actor_id: String,
    pub action: ActionKind,
    pub reason: Option<String>,
    /// Human-readable duration for timed actions.
    pub duration: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn automatic(
        community_id: impl Into<String>,
        user_id: impl Into<String>,
        action: ActionKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            community_id: community_id.into(),
            user_id: user_id.into(),
            actor_id: SYSTEM_ACTOR.to_string(),
            action,
            reason: Some(reason.into()),
            duration: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
}

// ── Conversation history ────────────────────────────────────────────

/// One stored turn of an assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

// ── Store trait ─────────────────────────────────────────────────────

/// Persistence for policies, warnings, audit entries, and assistant
/// conversation history.
#[async_trait]
pub trait ModStore: Send + Sync {
    /// Fetch a community's policy, creating defaults on first access.
    async fn get_policy(&self, community_id: &str) -> Result<CommunityPolicy, StorageError>;

    /// Apply a partial update and return the resulting policy.
    async fn update_policy(
        &self,
        community_id: &str,
        patch: PolicyPatch,
    ) -> Result<CommunityPolicy, StorageError>;

    async fn get_warning_count(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<u32, StorageError>;

    /// Add one warning and return the new total. Atomic: concurrent
    /// increments never lose a count.
    async fn increment_warnings(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<u32, StorageError>;

    async fn reset_warnings(&self, community_id: &str, user_id: &str)
        -> Result<(), StorageError>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// Most recent audit entries for a user, newest first.
    async fn audit_for_user(
        &self,
        community_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StorageError>;

    /// Most recent audit entries across a community, newest first.
    async fn audit_for_community(
        &self,
        community_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StorageError>;

    /// Remove everything stored for a community.
    async fn purge_community(&self, community_id: &str) -> Result<(), StorageError>;

    /// Record one conversation turn, trimming old history per user and
    /// channel.
    async fn add_conversation_turn(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
        turn: &ConversationTurn,
    ) -> Result<(), StorageError>;

    /// Last `limit` turns in chronological order.
    async fn conversation_history(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, StorageError>;

    async fn clear_conversation(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError>;
}
