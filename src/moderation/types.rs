//! Shared types for the moderation decision pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Violation categories ────────────────────────────────────────────

/// The seven policy violation categories the pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    Toxicity,
    Spam,
    Slurs,
    Nsfw,
    Threats,
    Advertising,
    Scam,
}

impl ViolationKind {
    /// Wire label, as used in prompts and audit entries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Toxicity => "TOXICITY",
            Self::Spam => "SPAM",
            Self::Slurs => "SLURS",
            Self::Nsfw => "NSFW",
            Self::Threats => "THREATS",
            Self::Advertising => "ADVERTISING",
            Self::Scam => "SCAM",
        }
    }
}

impl FromStr for ViolationKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TOXICITY" => Ok(Self::Toxicity),
            "SPAM" => Ok(Self::Spam),
            "SLURS" => Ok(Self::Slurs),
            "NSFW" => Ok(Self::Nsfw),
            "THREATS" => Ok(Self::Threats),
            "ADVERTISING" => Ok(Self::Advertising),
            "SCAM" => Ok(Self::Scam),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Enforcement actions ─────────────────────────────────────────────

/// Enforcement actions, ordered weakest to strongest.
///
/// The derived `Ord` is the action hierarchy used for ceiling clamping:
/// `None < Warn < Delete < Timeout < Kick < Ban`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    None,
    Warn,
    Delete,
    Timeout,
    Kick,
    Ban,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::Delete => "delete",
            Self::Timeout => "timeout",
            Self::Kick => "kick",
            Self::Ban => "ban",
        }
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "warn" => Ok(Self::Warn),
            "delete" => Ok(Self::Delete),
            "timeout" => Ok(Self::Timeout),
            "kick" => Ok(Self::Kick),
            "ban" => Ok(Self::Ban),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Judgment ────────────────────────────────────────────────────────

/// Where a judgment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentSource {
    /// Severe pattern finding short-circuited the pipeline.
    Pattern,
    /// Low-severity pattern findings only (AI judged the text safe).
    Quick,
    /// AI judgment alone.
    Ai,
    /// AI judgment merged with pattern findings.
    Combined,
}

impl JudgmentSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Quick => "quick",
            Self::Ai => "ai",
            Self::Combined => "combined",
        }
    }
}

/// The canonical moderation verdict for one message.
///
/// Invariant: `safe` is true exactly when `violations` is empty and
/// `severity` is zero. All construction paths (pattern, AI normalization,
/// merge) maintain this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub safe: bool,
    pub violations: BTreeSet<ViolationKind>,
    /// 0 (clean) to 10 (most severe).
    pub severity: u8,
    pub reason: String,
    pub action: ActionKind,
    pub source: JudgmentSource,
}

impl Judgment {
    /// A clean verdict: no violations, severity zero, no action.
    pub fn safe(reason: impl Into<String>, source: JudgmentSource) -> Self {
        Self {
            safe: true,
            violations: BTreeSet::new(),
            severity: 0,
            reason: reason.into(),
            action: ActionKind::None,
            source,
        }
    }

    /// An unsafe verdict. Severity is clamped to [1, 10] so the safety
    /// invariant holds.
    pub fn unsafe_verdict(
        violations: BTreeSet<ViolationKind>,
        severity: u8,
        reason: impl Into<String>,
        action: ActionKind,
        source: JudgmentSource,
    ) -> Self {
        Self {
            safe: false,
            violations,
            severity: severity.clamp(1, 10),
            reason: reason.into(),
            action,
            source,
        }
    }
}

// ── Pattern findings ────────────────────────────────────────────────

/// A candidate violation produced by the pattern analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickFinding {
    pub kind: ViolationKind,
    /// Heuristic severity hint, 1–10.
    pub severity_hint: u8,
    pub reason: &'static str,
}

// ── Message context ─────────────────────────────────────────────────

/// Immutable per-message context handed to one pipeline invocation.
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// Platform-native message id (used for deletion).
    pub message_id: String,
    pub community_id: String,
    pub channel_id: String,
    pub sender_id: String,
    /// Display name, if the transport provides one.
    pub sender_name: Option<String>,
    pub channel_name: Option<String>,
    pub community_name: Option<String>,
    /// Sender holds moderation permissions in this community.
    pub sender_is_moderator: bool,
    /// Role ids the sender carries (checked against the ignore list).
    pub sender_roles: Vec<String>,
    /// Whether the sender can be timed out by the bot.
    pub sender_timeout_eligible: bool,
}

impl MessageContext {
    /// Minimal context for a plain member message.
    pub fn new(
        message_id: impl Into<String>,
        community_id: impl Into<String>,
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            community_id: community_id.into(),
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            sender_name: None,
            channel_name: None,
            community_name: None,
            sender_is_moderator: false,
            sender_roles: Vec::new(),
            sender_timeout_eligible: true,
        }
    }
}

// ── Effective plan ──────────────────────────────────────────────────

/// A judgment after policy resolution: the action is clamped to the
/// community's ceiling but severity and violation metadata survive for
/// logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePlan {
    pub action: ActionKind,
    pub severity: u8,
    pub violations: BTreeSet<ViolationKind>,
    pub reason: String,
    /// Attempt a direct notice to the sender.
    pub dm_notice: bool,
    /// Post a transient public warning when nothing stronger fired.
    pub public_notice: bool,
}

// ── Execution report ────────────────────────────────────────────────

/// What the enforcement coordinator actually managed to do.
///
/// Every field reflects best-effort outcomes; a `false`/`None` may mean
/// either "not applicable" or "attempted and failed" (failures are logged
/// at the point they occur).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub deleted: bool,
    pub timed_out_for: Option<Duration>,
    pub dm_sent: bool,
    pub public_notice_sent: bool,
    pub audit_recorded: bool,
    /// New warning total, when this enforcement recorded a warning.
    pub warning_total: Option<u32>,
    /// The 5-warning auto-timeout fired.
    pub escalated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_hierarchy_is_ordered() {
        assert!(ActionKind::None < ActionKind::Warn);
        assert!(ActionKind::Warn < ActionKind::Delete);
        assert!(ActionKind::Delete < ActionKind::Timeout);
        assert!(ActionKind::Timeout < ActionKind::Kick);
        assert!(ActionKind::Kick < ActionKind::Ban);
    }

    #[test]
    fn action_round_trips_through_str() {
        for action in [
            ActionKind::None,
            ActionKind::Warn,
            ActionKind::Delete,
            ActionKind::Timeout,
            ActionKind::Kick,
            ActionKind::Ban,
        ] {
            assert_eq!(action.as_str().parse::<ActionKind>(), Ok(action));
        }
        assert!("obliterate".parse::<ActionKind>().is_err());
    }

    #[test]
    fn violation_parses_case_insensitively() {
        assert_eq!("toxicity".parse::<ViolationKind>(), Ok(ViolationKind::Toxicity));
        assert_eq!(" SPAM ".parse::<ViolationKind>(), Ok(ViolationKind::Spam));
        assert!("RUDENESS".parse::<ViolationKind>().is_err());
    }

    #[test]
    fn violation_serializes_to_wire_labels() {
        let json = serde_json::to_value(ViolationKind::Advertising).unwrap();
        assert_eq!(json, "ADVERTISING");
    }

    #[test]
    fn safe_judgment_upholds_invariant() {
        let j = Judgment::safe("clean", JudgmentSource::Ai);
        assert!(j.safe);
        assert!(j.violations.is_empty());
        assert_eq!(j.severity, 0);
        assert_eq!(j.action, ActionKind::None);
    }

    #[test]
    fn unsafe_judgment_clamps_severity_floor() {
        let j = Judgment::unsafe_verdict(
            BTreeSet::from([ViolationKind::Spam]),
            0,
            "spam",
            ActionKind::Warn,
            JudgmentSource::Quick,
        );
        assert!(!j.safe);
        assert_eq!(j.severity, 1);
    }
}
