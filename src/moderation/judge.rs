//! AI judge — asks the model for a moderation verdict, with caching.
//!
//! The judge always produces a judgment. Any failure along the way
//! (network, timeout, unparseable output) degrades to a safe verdict so
//! a model outage never blocks chat.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::moderation::cache::JudgmentCache;
use crate::moderation::types::{ActionKind, Judgment, JudgmentSource, MessageContext, ViolationKind};

/// Messages shorter than this are never worth a model call.
const MIN_ANALYZABLE_CHARS: usize = 3;
const MAX_TOKENS: u32 = 200;
// Low temperature for consistent moderation
const TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "\
You are a chat content moderator AI. Analyze the following message and determine if it violates any rules.

Check for:
1. TOXICITY - Harassment, hate speech, personal attacks, bullying
2. SPAM - Repetitive content, excessive caps (>70%), excessive emojis (>10), gibberish
3. SLURS - Racial slurs, homophobic slurs, ableist slurs, any discriminatory language
4. NSFW - Sexual content, explicit descriptions, inappropriate suggestions
5. THREATS - Violence threats, doxxing threats, harm to self or others
6. ADVERTISING - Unsolicited links, server invites, promotions
7. SCAM - Phishing attempts, fake giveaways, suspicious links

Respond ONLY with valid JSON in this exact format:
{
    \"safe\": boolean,
    \"violations\": [\"TOXICITY\" | \"SPAM\" | \"SLURS\" | \"NSFW\" | \"THREATS\" | \"ADVERTISING\" | \"SCAM\"],
    \"severity\": 1-10,
    \"reason\": \"brief explanation\",
    \"action\": \"none\" | \"warn\" | \"delete\" | \"timeout\" | \"kick\" | \"ban\"
}

Severity guide:
- 1-3: Minor (warn)
- 4-6: Moderate (delete + warn)
- 7-8: Serious (delete + timeout)
- 9-10: Severe (delete + ban consideration)

Be strict but fair. Context matters - gaming trash talk is different from genuine harassment.
Do NOT flag normal conversation, jokes, or mild language.";

/// Cached AI judgment of message text.
pub struct AiJudge {
    provider: Arc<dyn LlmProvider>,
    cache: JudgmentCache,
}

impl AiJudge {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: JudgmentCache::new(),
        }
    }

    pub fn with_cache(provider: Arc<dyn LlmProvider>, cache: JudgmentCache) -> Self {
        Self { provider, cache }
    }

    /// Judge one message. Never fails: errors degrade to a safe verdict.
    pub async fn judge(&self, text: &str, ctx: &MessageContext) -> Judgment {
        if text.chars().count() < MIN_ANALYZABLE_CHARS {
            return Judgment::safe("Too short to analyze", JudgmentSource::Ai);
        }

        let key = JudgmentCache::normalize(text);
        if let Some(hit) = self.cache.get(&key) {
            debug!(community_id = %ctx.community_id, "Judgment cache hit");
            return hit;
        }

        let judgment = match self.ask_model(text, ctx).await {
            Ok(j) => j,
            Err(reason) => {
                warn!(
                    community_id = %ctx.community_id,
                    reason = %reason,
                    "AI moderation failed, failing open"
                );
                return Judgment::safe("Analysis failed", JudgmentSource::Ai);
            }
        };

        self.cache.put(&key, judgment.clone());
        judgment
    }

    pub fn cache(&self) -> &JudgmentCache {
        &self.cache
    }

    async fn ask_model(&self, text: &str, ctx: &MessageContext) -> Result<Judgment, String> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(text, ctx)),
        ])
        .with_max_tokens(MAX_TOKENS)
        .with_temperature(TEMPERATURE);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| e.to_string())?;

        let json_str = extract_json_object(&response.content);
        let raw: Value =
            serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

        Ok(normalize_verdict(&raw))
    }
}

fn build_user_prompt(text: &str, ctx: &MessageContext) -> String {
    let mut prompt = format!("Analyze this chat message:\n\"{text}\"\n");
    if let Some(name) = &ctx.sender_name {
        prompt.push_str(&format!("\nSender: {name}"));
    }
    if let Some(channel) = &ctx.channel_name {
        prompt.push_str(&format!("\nChannel: #{channel}"));
    }
    if let Some(community) = &ctx.community_name {
        prompt.push_str(&format!("\nServer: {community}"));
    }
    prompt
}

/// Pull a JSON object out of model output that may be wrapped in markdown
/// fences or surrounding prose.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

/// Total normalization of a raw model verdict: unknown violation labels
/// are dropped, severity is clamped to 0..=10, unrecognized actions fall
/// back to none, and `safe` is re-derived from what survived rather than
/// trusted from the model.
fn normalize_verdict(raw: &Value) -> Judgment {
    let violations: BTreeSet<ViolationKind> = raw
        .get("violations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| ViolationKind::from_str(s).ok())
                .collect()
        })
        .unwrap_or_default();

    let severity = raw
        .get("severity")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        .min(10) as u8;

    let reason = raw
        .get("reason")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("No reason provided")
        .to_string();

    let action = raw
        .get("action")
        .and_then(Value::as_str)
        .and_then(|s| ActionKind::from_str(s).ok())
        .unwrap_or(ActionKind::None);

    if violations.is_empty() && severity == 0 {
        Judgment::safe(reason, JudgmentSource::Ai)
    } else {
        Judgment::unsafe_verdict(violations, severity, reason, action, JudgmentSource::Ai)
    }
}
