//! Conversational assistant with per-user, per-channel memory.
//!
//! History is persisted through the store: the last ten turns are
//! replayed as context and the store trims retention to the newest
//! twenty rows.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role};
use crate::storage::{ConversationTurn, ModStore};

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant for chat communities. \
     Be concise, friendly, and helpful. Keep responses under 1500 characters when possible.";
/// Prior turns replayed as context.
const HISTORY_WINDOW: u32 = 10;
const MAX_TOKENS: u32 = 512;
const TEMPERATURE: f32 = 0.7;

pub struct Assistant {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ModStore>,
}

impl Assistant {
    pub fn new(provider: Arc<dyn LlmProvider>, store: Arc<dyn ModStore>) -> Self {
        Self { provider, store }
    }

    /// Answer one user prompt with conversation context, recording both
    /// sides of the exchange.
    pub async fn chat(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
        prompt: &str,
    ) -> Result<String> {
        let history = self
            .store
            .conversation_history(community_id, channel_id, user_id, HISTORY_WINDOW)
            .await?;

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(history.into_iter().map(|turn| ChatMessage {
            role: turn.role,
            content: turn.content,
        }));
        messages.push(ChatMessage::user(prompt));

        let request = CompletionRequest::new(messages)
            .with_max_tokens(MAX_TOKENS)
            .with_temperature(TEMPERATURE);
        let response = self.provider.complete(request).await.map_err(crate::error::Error::from)?;

        self.store
            .add_conversation_turn(
                community_id,
                channel_id,
                user_id,
                &ConversationTurn {
                    role: Role::User,
                    content: prompt.to_string(),
                },
            )
            .await?;
        self.store
            .add_conversation_turn(
                community_id,
                channel_id,
                user_id,
                &ConversationTurn {
                    role: Role::Assistant,
                    content: response.content.clone(),
                },
            )
            .await?;

        debug!(
            community_id,
            user_id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Assistant reply generated"
        );

        Ok(response.content)
    }

    /// Forget a user's conversation in a channel.
    pub async fn clear_history(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<()> {
        self.store
            .clear_conversation(community_id, channel_id, user_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::LlmError;
    use crate::llm::CompletionResponse;
    use crate::storage::LibSqlStore;

    /// Provider that records the request it saw and echoes a fixed reply.
    struct EchoProvider {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl EchoProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> CompletionRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    async fn assistant(reply: &str) -> (Assistant, Arc<EchoProvider>, Arc<LibSqlStore>) {
        let provider = EchoProvider::new(reply);
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        (
            Assistant::new(provider.clone(), store.clone()),
            provider,
            store,
        )
    }

    #[tokio::test]
    async fn chat_records_both_sides() {
        let (assistant, _, store) = assistant("hello!").await;

        let reply = assistant.chat("g1", "c1", "u1", "hi there").await.unwrap();
        assert_eq!(reply, "hello!");

        let history = store.conversation_history("g1", "c1", "u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hi there");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hello!");
    }

    #[tokio::test]
    async fn prior_turns_are_replayed_as_context() {
        let (assistant, provider, _) = assistant("ok").await;

        assistant.chat("g1", "c1", "u1", "first").await.unwrap();
        assistant.chat("g1", "c1", "u1", "second").await.unwrap();

        let request = provider.last_request();
        // system + 2 history turns + new prompt
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "first");
        assert_eq!(request.messages[2].content, "ok");
        assert_eq!(request.messages[3].content, "second");
        assert_eq!(request.max_tokens, Some(MAX_TOKENS));
    }

    #[tokio::test]
    async fn history_is_scoped_per_user_and_channel() {
        let (assistant, provider, _) = assistant("ok").await;

        assistant.chat("g1", "c1", "u1", "mine").await.unwrap();
        assistant.chat("g1", "c1", "u2", "theirs").await.unwrap();

        // u2's request carries no history from u1
        let request = provider.last_request();
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn clear_history_forgets_the_conversation() {
        let (assistant, provider, _) = assistant("ok").await;

        assistant.chat("g1", "c1", "u1", "remember me").await.unwrap();
        assistant.clear_history("g1", "c1", "u1").await.unwrap();
        assistant.chat("g1", "c1", "u1", "who am i").await.unwrap();

        let request = provider.last_request();
        assert_eq!(request.messages.len(), 2);
    }
}
