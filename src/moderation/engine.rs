//! Decision engine — merges pattern findings with AI judgment.
//!
//! Order matters: a severe pattern finding (hint >= 4) decides without a
//! model call; anything else goes to the AI judge and the two signals are
//! merged.

use std::collections::BTreeSet;

use tracing::debug;

use crate::moderation::judge::AiJudge;
use crate::moderation::patterns::PatternAnalyzer;
use crate::moderation::types::{
    ActionKind, Judgment, JudgmentSource, MessageContext, QuickFinding,
};

/// Pattern hint at or above this severity skips the AI call.
const SHORT_CIRCUIT_SEVERITY: u8 = 4;
/// Pattern hint at or above this severity escalates a quick verdict to delete.
const QUICK_DELETE_SEVERITY: u8 = 3;

pub struct DecisionEngine {
    patterns: PatternAnalyzer,
    judge: AiJudge,
}

impl DecisionEngine {
    pub fn new(judge: AiJudge) -> Self {
        Self {
            patterns: PatternAnalyzer::new(),
            judge,
        }
    }

    /// Produce the canonical verdict for one message.
    pub async fn decide(&self, text: &str, ctx: &MessageContext) -> Judgment {
        let findings = self.patterns.scan(text);

        if findings.iter().any(|f| f.severity_hint >= SHORT_CIRCUIT_SEVERITY) {
            let verdict = pattern_verdict(&findings, ActionKind::Delete, JudgmentSource::Pattern);
            debug!(
                community_id = %ctx.community_id,
                severity = verdict.severity,
                "Severe pattern finding, skipping AI"
            );
            return verdict;
        }

        let ai = self.judge.judge(text, ctx).await;

        if findings.is_empty() {
            return ai;
        }

        if !ai.safe {
            // Both signals fired: union the categories, keep the stronger
            // severity, trust the AI's reason and action.
            let mut violations = ai.violations.clone();
            violations.extend(findings.iter().map(|f| f.kind));
            let severity = ai
                .severity
                .max(findings.iter().map(|f| f.severity_hint).max().unwrap_or(0));
            return Judgment::unsafe_verdict(
                violations,
                severity,
                ai.reason,
                ai.action,
                JudgmentSource::Combined,
            );
        }

        // Low-severity findings the AI did not corroborate still stand
        let action = if findings.iter().any(|f| f.severity_hint >= QUICK_DELETE_SEVERITY) {
            ActionKind::Delete
        } else {
            ActionKind::Warn
        };
        pattern_verdict(&findings, action, JudgmentSource::Quick)
    }

    pub fn judge(&self) -> &AiJudge {
        &self.judge
    }
}

fn pattern_verdict(
    findings: &[QuickFinding],
    action: ActionKind,
    source: JudgmentSource,
) -> Judgment {
    let violations: BTreeSet<_> = findings.iter().map(|f| f.kind).collect();
    let severity = findings.iter().map(|f| f.severity_hint).max().unwrap_or(1);
    let reason = findings
        .iter()
        .map(|f| f.reason)
        .collect::<Vec<_>>()
        .join(", ");
    Judgment::unsafe_verdict(violations, severity, reason, action, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::moderation::types::ViolationKind;

    struct ScriptedProvider {
        content: String,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn replying(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: content.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: self.content.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    const SAFE_REPLY: &str =
        r#"{"safe": true, "violations": [], "severity": 0, "reason": "fine", "action": "none"}"#;

    fn engine_with(provider: Arc<ScriptedProvider>) -> DecisionEngine {
        DecisionEngine::new(AiJudge::new(provider))
    }

    fn ctx() -> MessageContext {
        MessageContext::new("m1", "g1", "c1", "u1")
    }

    #[tokio::test]
    async fn severe_pattern_finding_skips_the_model() {
        let provider = ScriptedProvider::replying(SAFE_REPLY);
        let engine = engine_with(provider.clone());

        let verdict = engine
            .decide("<@1> <@2> <@3> <@4> <@5> <@6>", &ctx())
            .await;
        assert!(!verdict.safe);
        assert_eq!(verdict.source, JudgmentSource::Pattern);
        assert_eq!(verdict.action, ActionKind::Delete);
        assert_eq!(verdict.severity, 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clean_text_returns_ai_verdict_unchanged() {
        let engine = engine_with(ScriptedProvider::replying(SAFE_REPLY));

        let verdict = engine.decide("hey, anyone around tonight?", &ctx()).await;
        assert!(verdict.safe);
        assert_eq!(verdict.source, JudgmentSource::Ai);
    }

    #[tokio::test]
    async fn mild_findings_with_safe_ai_become_quick_warn() {
        let engine = engine_with(ScriptedProvider::replying(SAFE_REPLY));

        // Caps finding at severity 2: below delete threshold
        let verdict = engine.decide("AAAAAAAAAA STOP SPAMMING", &ctx()).await;
        assert!(!verdict.safe);
        assert_eq!(verdict.source, JudgmentSource::Quick);
        assert_eq!(verdict.action, ActionKind::Warn);
        assert_eq!(verdict.severity, 2);
        assert!(verdict.violations.contains(&ViolationKind::Spam));
    }

    #[tokio::test]
    async fn severity_three_finding_escalates_quick_verdict_to_delete() {
        let engine = engine_with(ScriptedProvider::replying(SAFE_REPLY));

        let verdict = engine.decide("join discord.gg/abc for fun", &ctx()).await;
        assert_eq!(verdict.source, JudgmentSource::Quick);
        assert_eq!(verdict.action, ActionKind::Delete);
    }

    #[tokio::test]
    async fn findings_merge_with_unsafe_ai_verdict() {
        let reply = r#"{"safe": false, "violations": ["TOXICITY"], "severity": 5, "reason": "harassment", "action": "delete"}"#;
        let engine = engine_with(ScriptedProvider::replying(reply));

        let verdict = engine
            .decide("YOU ARE ALL WORTHLESS IDIOTS", &ctx())
            .await;
        assert_eq!(verdict.source, JudgmentSource::Combined);
        assert!(verdict.violations.contains(&ViolationKind::Toxicity));
        assert!(verdict.violations.contains(&ViolationKind::Spam));
        // AI severity 5 beats the caps hint of 2
        assert_eq!(verdict.severity, 5);
        assert_eq!(verdict.reason, "harassment");
        assert_eq!(verdict.action, ActionKind::Delete);
    }

    #[tokio::test]
    async fn merge_keeps_stronger_pattern_severity() {
        let reply = r#"{"safe": false, "violations": ["ADVERTISING"], "severity": 2, "reason": "promo", "action": "warn"}"#;
        let engine = engine_with(ScriptedProvider::replying(reply));

        // Invite link hint is 3, above the AI's 2
        let verdict = engine.decide("check discord.gg/promo please", &ctx()).await;
        assert_eq!(verdict.source, JudgmentSource::Combined);
        assert_eq!(verdict.severity, 3);
    }
}
