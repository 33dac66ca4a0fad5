//! Administrative surface — validated policy mutations.
//!
//! Each operation validates its input, applies a storage patch, and
//! returns the updated policy so callers can render the new state.
//! Validation happens before any write; an invalid request never
//! partially mutates a policy.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::AdminError;
use crate::moderation::types::ActionKind;
use crate::storage::{CommunityPolicy, ModStore, PolicyPatch};

pub struct AdminSurface {
    store: Arc<dyn ModStore>,
}

impl AdminSurface {
    pub fn new(store: Arc<dyn ModStore>) -> Self {
        Self { store }
    }

    /// Current policy, materializing defaults for unknown communities.
    pub async fn status(&self, community_id: &str) -> Result<CommunityPolicy, AdminError> {
        Ok(self.store.get_policy(community_id).await?)
    }

    pub async fn enable(&self, community_id: &str) -> Result<CommunityPolicy, AdminError> {
        self.set_enabled(community_id, true).await
    }

    pub async fn disable(&self, community_id: &str) -> Result<CommunityPolicy, AdminError> {
        self.set_enabled(community_id, false).await
    }

    async fn set_enabled(
        &self,
        community_id: &str,
        enabled: bool,
    ) -> Result<CommunityPolicy, AdminError> {
        let policy = self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    enabled: Some(enabled),
                    ..Default::default()
                },
            )
            .await?;
        info!(community_id, enabled, "Automod toggled");
        Ok(policy)
    }

    /// Set the severity threshold. Accepts 1..=10.
    pub async fn set_threshold(
        &self,
        community_id: &str,
        threshold: i64,
    ) -> Result<CommunityPolicy, AdminError> {
        if !(1..=10).contains(&threshold) {
            return Err(AdminError::InvalidThreshold(threshold));
        }
        Ok(self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    severity_threshold: Some(threshold as u8),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Set the action ceiling from its wire name.
    pub async fn set_action_ceiling(
        &self,
        community_id: &str,
        action: &str,
    ) -> Result<CommunityPolicy, AdminError> {
        let ceiling = ActionKind::from_str(action)
            .map_err(|()| AdminError::UnknownAction(action.to_string()))?;
        Ok(self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    action_ceiling: Some(ceiling),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Add or remove a channel from the ignore list. Returns the updated
    /// policy and whether the channel is now ignored.
    pub async fn toggle_ignored_channel(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> Result<(CommunityPolicy, bool), AdminError> {
        let current = self.store.get_policy(community_id).await?;
        let mut channels = current.ignored_channels;
        let now_ignored = if let Some(pos) = channels.iter().position(|c| c == channel_id) {
            channels.remove(pos);
            false
        } else {
            channels.push(channel_id.to_string());
            true
        };
        let policy = self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    ignored_channels: Some(channels),
                    ..Default::default()
                },
            )
            .await?;
        Ok((policy, now_ignored))
    }

    /// Add or remove a role from the ignore list. Returns the updated
    /// policy and whether the role is now ignored.
    pub async fn toggle_ignored_role(
        &self,
        community_id: &str,
        role_id: &str,
    ) -> Result<(CommunityPolicy, bool), AdminError> {
        let current = self.store.get_policy(community_id).await?;
        let mut roles = current.ignored_roles;
        let now_ignored = if let Some(pos) = roles.iter().position(|r| r == role_id) {
            roles.remove(pos);
            false
        } else {
            roles.push(role_id.to_string());
            true
        };
        let policy = self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    ignored_roles: Some(roles),
                    ..Default::default()
                },
            )
            .await?;
        Ok((policy, now_ignored))
    }

    pub async fn set_log_channel(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> Result<CommunityPolicy, AdminError> {
        Ok(self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    log_channel: Some(Some(channel_id.to_string())),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn clear_log_channel(
        &self,
        community_id: &str,
    ) -> Result<CommunityPolicy, AdminError> {
        Ok(self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    log_channel: Some(None),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn set_dm_on_action(
        &self,
        community_id: &str,
        enabled: bool,
    ) -> Result<CommunityPolicy, AdminError> {
        Ok(self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    dm_on_action: Some(enabled),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn set_moderator_immunity(
        &self,
        community_id: &str,
        enabled: bool,
    ) -> Result<CommunityPolicy, AdminError> {
        Ok(self
            .store
            .update_policy(
                community_id,
                PolicyPatch {
                    moderator_immunity: Some(enabled),
                    ..Default::default()
                },
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::LibSqlStore;

    async fn surface() -> AdminSurface {
        AdminSurface::new(Arc::new(LibSqlStore::new_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn enable_and_disable_round_trip() {
        let admin = surface().await;

        let enabled = admin.enable("g1").await.unwrap();
        assert!(enabled.enabled);
        let disabled = admin.disable("g1").await.unwrap();
        assert!(!disabled.enabled);
    }

    #[tokio::test]
    async fn threshold_bounds_are_validated_before_writing() {
        let admin = surface().await;

        assert!(matches!(
            admin.set_threshold("g1", 0).await,
            Err(AdminError::InvalidThreshold(0))
        ));
        assert!(matches!(
            admin.set_threshold("g1", 11).await,
            Err(AdminError::InvalidThreshold(11))
        ));
        // Failed validation left the stored default untouched
        assert_eq!(admin.status("g1").await.unwrap().severity_threshold, 3);

        let updated = admin.set_threshold("g1", 7).await.unwrap();
        assert_eq!(updated.severity_threshold, 7);
    }

    #[tokio::test]
    async fn unknown_action_name_is_rejected() {
        let admin = surface().await;

        assert!(matches!(
            admin.set_action_ceiling("g1", "obliterate").await,
            Err(AdminError::UnknownAction(_))
        ));

        let updated = admin.set_action_ceiling("g1", "delete").await.unwrap();
        assert_eq!(updated.action_ceiling, ActionKind::Delete);
    }

    #[tokio::test]
    async fn channel_ignore_toggles_both_ways() {
        let admin = surface().await;

        let (policy, ignored) = admin.toggle_ignored_channel("g1", "c1").await.unwrap();
        assert!(ignored);
        assert_eq!(policy.ignored_channels, vec!["c1".to_string()]);

        let (policy, ignored) = admin.toggle_ignored_channel("g1", "c1").await.unwrap();
        assert!(!ignored);
        assert!(policy.ignored_channels.is_empty());
    }

    #[tokio::test]
    async fn log_channel_set_and_clear() {
        let admin = surface().await;

        let policy = admin.set_log_channel("g1", "log-chan").await.unwrap();
        assert_eq!(policy.log_channel.as_deref(), Some("log-chan"));

        let policy = admin.clear_log_channel("g1").await.unwrap();
        assert!(policy.log_channel.is_none());
    }

    #[tokio::test]
    async fn immunity_and_dm_toggles_persist() {
        let admin = surface().await;

        admin.set_moderator_immunity("g1", false).await.unwrap();
        admin.set_dm_on_action("g1", false).await.unwrap();

        let policy = admin.status("g1").await.unwrap();
        assert!(!policy.moderator_immunity);
        assert!(!policy.dm_on_action);
    }
}
