pub mod event;
pub mod yhchat;

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

/// Receiver kind for outbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecvType {
    Group,
}

/// Moderation and messaging capability of the chat platform.
/// One method per outbound action; implementations report rejections as errors.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_text(&self, target_id: &str, target_type: RecvType, text: &str) -> Result<()>;

    async fn send_markdown(
        &self,
        target_id: &str,
        target_type: RecvType,
        markdown: &str,
    ) -> Result<()>;

    async fn recall_message(&self, msg_id: &str, chat_id: &str) -> Result<()>;

    /// Mute `user_id` for `seconds`; zero lifts the mute.
    async fn mute(&self, chat_id: &str, user_id: &str, seconds: u64) -> Result<()>;

    async fn remove_member(&self, chat_id: &str, user_id: &str) -> Result<()>;
}

/// A side effect requested by a command handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendText {
        target_id: String,
        target_type: RecvType,
        text: String,
    },
    SendMarkdown {
        target_id: String,
        target_type: RecvType,
        markdown: String,
    },
    RecallMessage {
        msg_id: String,
        chat_id: String,
    },
    Mute {
        chat_id: String,
        user_id: String,
        seconds: u64,
    },
    RemoveMember {
        chat_id: String,
        user_id: String,
    },
}

impl Action {
    /// Plain text message into a group chat
    pub fn group_text(chat_id: &str, text: impl Into<String>) -> Self {
        Action::SendText {
            target_id: chat_id.to_string(),
            target_type: RecvType::Group,
            text: text.into(),
        }
    }

    pub fn group_markdown(chat_id: &str, markdown: impl Into<String>) -> Self {
        Action::SendMarkdown {
            target_id: chat_id.to_string(),
            target_type: RecvType::Group,
            markdown: markdown.into(),
        }
    }

    pub fn is_recall(&self) -> bool {
        matches!(self, Action::RecallMessage { .. })
    }

    async fn run(&self, platform: &dyn ChatPlatform) -> Result<()> {
        match self {
            Action::SendText {
                target_id,
                target_type,
                text,
            } => platform.send_text(target_id, *target_type, text).await,
            Action::SendMarkdown {
                target_id,
                target_type,
                markdown,
            } => platform.send_markdown(target_id, *target_type, markdown).await,
            Action::RecallMessage { msg_id, chat_id } => {
                platform.recall_message(msg_id, chat_id).await
            }
            Action::Mute {
                chat_id,
                user_id,
                seconds,
            } => platform.mute(chat_id, user_id, *seconds).await,
            Action::RemoveMember { chat_id, user_id } => {
                platform.remove_member(chat_id, user_id).await
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SendText { target_id, .. } => write!(f, "send_text({})", target_id),
            Action::SendMarkdown { target_id, .. } => write!(f, "send_markdown({})", target_id),
            Action::RecallMessage { msg_id, chat_id } => {
                write!(f, "recall({} in {})", msg_id, chat_id)
            }
            Action::Mute {
                chat_id,
                user_id,
                seconds,
            } => write!(f, "mute({} in {} for {}s)", user_id, chat_id, seconds),
            Action::RemoveMember { chat_id, user_id } => {
                write!(f, "remove({} from {})", user_id, chat_id)
            }
        }
    }
}

/// Outcome of running a batch of actions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Run actions in order against the platform. Failures are logged and counted,
/// never retried, and do not stop the remaining actions. Consecutive recalls
/// are spaced by `recall_delay` to stay under the platform's rate limit.
pub async fn execute(
    platform: &dyn ChatPlatform,
    actions: &[Action],
    recall_delay: Duration,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    let mut previous_was_recall = false;

    for action in actions {
        if action.is_recall() && previous_was_recall && !recall_delay.is_zero() {
            tokio::time::sleep(recall_delay).await;
        }
        previous_was_recall = action.is_recall();

        report.attempted += 1;
        debug!("Executing {}", action);
        if let Err(e) = action.run(platform).await {
            report.failed += 1;
            warn!("Platform rejected {}: {:#}", action, e);
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every call as an `Action`; optionally rejects recalls.
    #[derive(Default)]
    pub struct RecordingPlatform {
        calls: Mutex<Vec<Action>>,
        pub fail_recalls: bool,
    }

    impl RecordingPlatform {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_recalls() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_recalls: true,
            }
        }

        pub fn calls(&self) -> Vec<Action> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, action: Action) {
            self.calls.lock().unwrap().push(action);
        }
    }

    #[async_trait]
    impl ChatPlatform for RecordingPlatform {
        async fn send_text(
            &self,
            target_id: &str,
            target_type: RecvType,
            text: &str,
        ) -> Result<()> {
            self.push(Action::SendText {
                target_id: target_id.to_string(),
                target_type,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_markdown(
            &self,
            target_id: &str,
            target_type: RecvType,
            markdown: &str,
        ) -> Result<()> {
            self.push(Action::SendMarkdown {
                target_id: target_id.to_string(),
                target_type,
                markdown: markdown.to_string(),
            });
            Ok(())
        }

        async fn recall_message(&self, msg_id: &str, chat_id: &str) -> Result<()> {
            self.push(Action::RecallMessage {
                msg_id: msg_id.to_string(),
                chat_id: chat_id.to_string(),
            });
            if self.fail_recalls {
                anyhow::bail!("recall rejected");
            }
            Ok(())
        }

        async fn mute(&self, chat_id: &str, user_id: &str, seconds: u64) -> Result<()> {
            self.push(Action::Mute {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
                seconds,
            });
            Ok(())
        }

        async fn remove_member(&self, chat_id: &str, user_id: &str) -> Result<()> {
            self.push(Action::RemoveMember {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingPlatform;
    use super::*;

    fn recall(id: &str) -> Action {
        Action::RecallMessage {
            msg_id: id.to_string(),
            chat_id: "chat-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_execute_runs_in_order() {
        let platform = RecordingPlatform::new();
        let actions = vec![
            Action::Mute {
                chat_id: "chat-1".to_string(),
                user_id: "user-1".to_string(),
                seconds: 600,
            },
            Action::group_text("chat-1", "done"),
        ];

        let report = execute(&platform, &actions, Duration::ZERO).await;
        assert_eq!(report, ExecutionReport { attempted: 2, failed: 0 });
        assert_eq!(platform.calls(), actions);
    }

    #[tokio::test]
    async fn test_execute_continues_after_failures() {
        let platform = RecordingPlatform::failing_recalls();
        let actions = vec![recall("a"), recall("b"), Action::group_text("chat-1", "ok")];

        let report = execute(&platform, &actions, Duration::ZERO).await;
        assert_eq!(report, ExecutionReport { attempted: 3, failed: 2 });
        assert_eq!(platform.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_paces_consecutive_recalls() {
        let platform = RecordingPlatform::new();
        let actions = vec![
            recall("a"),
            recall("b"),
            recall("c"),
            Action::group_text("chat-1", "ok"),
        ];

        let started = tokio::time::Instant::now();
        execute(&platform, &actions, Duration::from_millis(200)).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_recall_is_not_delayed() {
        let platform = RecordingPlatform::new();
        let actions = vec![recall("a"), Action::group_text("chat-1", "ok")];

        let started = tokio::time::Instant::now();
        execute(&platform, &actions, Duration::from_millis(200)).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
