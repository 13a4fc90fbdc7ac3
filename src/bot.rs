use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::commands::handlers::{Handlers, Invocation};
use crate::commands::policy::resolve_role;
use crate::commands::Command;
use crate::config::ModerationConfig;
use crate::memory::messages::MessageRecord;
use crate::memory::MemoryStore;
use crate::platform::event::{Envelope, InboundMessage};
use crate::platform::{self, Action, ChatPlatform, ExecutionReport};

/// The moderation core: records every message, then authorizes and runs commands.
pub struct Moderator {
    store: MemoryStore,
    platform: Arc<dyn ChatPlatform>,
    moderation: ModerationConfig,
}

impl Moderator {
    pub fn new(
        store: MemoryStore,
        platform: Arc<dyn ChatPlatform>,
        moderation: ModerationConfig,
    ) -> Self {
        Self {
            store,
            platform,
            moderation,
        }
    }

    /// Handle one webhook body. Only normal-message events are acted on;
    /// anything else is accepted and ignored.
    pub async fn handle_payload(&self, payload: Value) -> Result<ExecutionReport> {
        let envelope = Envelope::from_value(payload)?;
        if !envelope.is_normal_message() {
            debug!(
                "Ignoring event {:?} of type {}",
                envelope.header.event_id, envelope.header.event_type
            );
            return Ok(ExecutionReport::default());
        }

        let message = envelope.message()?;
        Ok(self.handle_message(&message).await)
    }

    pub async fn handle_message(&self, message: &InboundMessage) -> ExecutionReport {
        self.store
            .record(&MessageRecord {
                msg_id: message.msg_id.clone(),
                chat_id: message.chat_id.clone(),
                user_id: message.sender_id.clone(),
                user_name: message.sender_name.clone(),
                content: message.raw_content.clone(),
                send_time: message
                    .send_time
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            })
            .await;

        let actions = self.plan(message).await;
        if actions.is_empty() {
            return ExecutionReport::default();
        }

        platform::execute(
            self.platform.as_ref(),
            &actions,
            self.moderation.recall_delay(),
        )
        .await
    }

    /// Decide which actions a message triggers, without executing them.
    /// Unknown verbs and unauthorized senders yield nothing.
    pub async fn plan(&self, message: &InboundMessage) -> Vec<Action> {
        if !message.is_text() {
            return Vec::new();
        }
        let Some(command) = Command::parse(&message.text, &message.mentions) else {
            return Vec::new();
        };

        let role = resolve_role(
            &self.store,
            message.sender_level,
            &message.chat_id,
            &message.sender_id,
        )
        .await;
        if !role.permits(command.verb.tier()) {
            debug!(
                "Dropping {} from {} ({:?}) in {}",
                command.verb.spec().name,
                message.sender_id,
                role,
                message.chat_id
            );
            return Vec::new();
        }

        info!(
            "{} issued by {}({}) in {}",
            command.verb.spec().name,
            message.sender_name,
            message.sender_id,
            message.chat_id
        );

        let invocation = Invocation {
            chat_id: &message.chat_id,
            msg_id: &message.msg_id,
            parent_id: message.parent_id.as_deref(),
            sender_id: &message.sender_id,
            sender_name: &message.sender_name,
            role,
        };
        Handlers::new(&self.store, &self.moderation)
            .handle(&command, &invocation)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::event::sample_payload;
    use crate::platform::testing::RecordingPlatform;
    use serde_json::json;

    fn moderator(store: &MemoryStore, platform: Arc<RecordingPlatform>) -> Moderator {
        let moderation = ModerationConfig {
            recall_delay_ms: 0,
            ..ModerationConfig::default()
        };
        Moderator::new(store.clone(), platform, moderation)
    }

    #[tokio::test]
    async fn test_owner_ban_runs_mute_and_reply() {
        let store = MemoryStore::open_in_memory().unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let bot = moderator(&store, platform.clone());

        let report = bot
            .handle_payload(sample_payload("!ban @bob 1h", "owner", &["bob-id"]))
            .await
            .unwrap();

        assert_eq!(report, ExecutionReport { attempted: 2, failed: 0 });
        let calls = platform.calls();
        assert_eq!(
            calls[0],
            Action::Mute {
                chat_id: "chat-1".to_string(),
                user_id: "bob-id".to_string(),
                seconds: 3600,
            }
        );
    }

    #[tokio::test]
    async fn test_member_commands_are_silently_dropped() {
        let store = MemoryStore::open_in_memory().unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let bot = moderator(&store, platform.clone());

        for text in ["!ban @bob 1h", "!delmsg @bob 3", "!help"] {
            bot.handle_payload(sample_payload(text, "member", &["bob-id"]))
                .await
                .unwrap();
        }
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_temporary_admin_gets_restricted_tier_only() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.grant("chat-1", "sender-1", "Boss").await.unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let bot = moderator(&store, platform.clone());

        let mut payload = sample_payload("!delmsg", "member", &[]);
        payload["event"]["message"]["parentId"] = json!("quoted-1");
        bot.handle_payload(payload).await.unwrap();

        let mut payload = sample_payload("!kick @bob", "member", &["bob-id"]);
        payload["event"]["message"]["msgId"] = json!("msg-2");
        bot.handle_payload(payload).await.unwrap();

        let calls = platform.calls();
        assert_eq!(
            calls[0],
            Action::RecallMessage {
                msg_id: "quoted-1".to_string(),
                chat_id: "chat-1".to_string(),
            }
        );
        assert!(!calls.iter().any(|a| matches!(a, Action::RemoveMember { .. })));
    }

    #[tokio::test]
    async fn test_every_message_is_recorded() {
        let store = MemoryStore::open_in_memory().unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let bot = moderator(&store, platform.clone());

        let mut payload = sample_payload("", "member", &[]);
        payload["event"]["message"]["contentType"] = json!("image");
        payload["event"]["message"]["content"] = json!({ "imageUrl": "https://img" });
        bot.handle_payload(payload).await.unwrap();

        let record = store.message("msg-1").await.unwrap().unwrap();
        assert_eq!(record.user_id, "sender-1");
        assert_eq!(record.user_name, "Boss");
        assert!(record.content.contains("imageUrl"));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_message_events_are_ignored() {
        let store = MemoryStore::open_in_memory().unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let bot = moderator(&store, platform.clone());

        let report = bot
            .handle_payload(json!({ "header": { "eventType": "group.join" }, "event": {} }))
            .await
            .unwrap();
        assert_eq!(report, ExecutionReport::default());
    }

    #[tokio::test]
    async fn test_malformed_message_event_is_an_error() {
        let store = MemoryStore::open_in_memory().unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let bot = moderator(&store, platform.clone());

        let result = bot
            .handle_payload(json!({
                "header": { "eventType": "message.receive.normal" },
                "event": { "chat": {} }
            }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failed_recalls_still_report_success_in_chat() {
        let store = MemoryStore::open_in_memory().unwrap();
        let platform = Arc::new(RecordingPlatform::failing_recalls());
        let bot = moderator(&store, platform.clone());

        let mut payload = sample_payload("!delmsg", "owner", &[]);
        payload["event"]["message"]["parentId"] = json!("quoted-1");
        let report = bot.handle_payload(payload).await.unwrap();

        assert_eq!(report, ExecutionReport { attempted: 2, failed: 1 });
        assert!(platform.calls().iter().any(|a| matches!(
            a,
            Action::SendText { text, .. } if text == "Recalled the quoted message"
        )));
    }
}
