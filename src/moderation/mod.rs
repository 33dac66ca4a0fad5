//! Two-tier content moderation: deterministic pattern scan, cached AI
//! judgment, policy resolution, and best-effort enforcement.

pub mod cache;
pub mod enforce;
pub mod engine;
pub mod judge;
pub mod patterns;
pub mod policy;
pub mod service;
pub mod types;

pub use cache::JudgmentCache;
pub use enforce::EnforcementCoordinator;
pub use engine::DecisionEngine;
pub use judge::AiJudge;
pub use patterns::PatternAnalyzer;
pub use service::{AutomodService, ModerationOutcome, SkipReason};
pub use types::{
    ActionKind, EffectivePlan, ExecutionReport, Judgment, JudgmentSource, MessageContext,
    QuickFinding, ViolationKind,
};
