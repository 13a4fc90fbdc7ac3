use tracing::{debug, info, warn};

use super::policy::Role;
use super::{help_text, Command, Verb};
use crate::config::ModerationConfig;
use crate::memory::MemoryStore;
use crate::platform::Action;

/// Who issued a command, where, and in reply to what
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub chat_id: &'a str,
    pub msg_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub role: Role,
}

/// Why a mute duration token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationError {
    /// `Nh` with N outside {1, 6, 12}
    UnsupportedHours,
    /// `…h` where the prefix is not a number
    Invalid,
    /// Anything else
    Unknown,
}

impl DurationError {
    pub fn message(self) -> &'static str {
        match self {
            DurationError::UnsupportedHours => "Mute duration can only be 1h, 6h or 12h",
            DurationError::Invalid => "Invalid mute duration",
            DurationError::Unknown => "Mute duration can only be 10, 1h, 6h or 12h",
        }
    }
}

/// Seconds for a `!ban` duration token: `10` is ten minutes, `1h`/`6h`/`12h` are hours.
pub fn mute_seconds(token: &str) -> Result<u64, DurationError> {
    if token == "10" {
        return Ok(600);
    }
    if let Some(hours) = token.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| DurationError::Invalid)?;
        return match hours {
            1 | 6 | 12 => Ok(hours * 3600),
            _ => Err(DurationError::UnsupportedHours),
        };
    }
    Err(DurationError::Unknown)
}

/// Turns authorized commands into platform actions.
///
/// Handlers only touch the local stores; everything aimed at the platform is
/// returned as `Action`s, replies included.
pub struct Handlers<'a> {
    store: &'a MemoryStore,
    moderation: &'a ModerationConfig,
}

impl<'a> Handlers<'a> {
    pub fn new(store: &'a MemoryStore, moderation: &'a ModerationConfig) -> Self {
        Self { store, moderation }
    }

    pub async fn handle(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        debug!("Handling {:?} from message {}", cmd.verb, inv.msg_id);
        match cmd.verb {
            Verb::Help => self.help(inv),
            Verb::Ban => self.ban(cmd, inv),
            Verb::Unban => self.unban(cmd, inv),
            Verb::Kick => self.kick(cmd, inv),
            Verb::DelMsg => self.delmsg(cmd, inv).await,
            Verb::AddAdmin => self.add_admin(cmd, inv).await,
            Verb::DelAdmin => self.del_admin(cmd, inv).await,
            Verb::AdminList => self.admin_list(inv).await,
        }
    }

    fn help(&self, inv: &Invocation<'_>) -> Vec<Action> {
        match inv.role.tier() {
            Some(tier) => vec![Action::group_markdown(inv.chat_id, help_text(tier))],
            None => Vec::new(),
        }
    }

    fn ban(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        let (Some(target), Some(label)) = (cmd.target(), cmd.target_label()) else {
            return usage(cmd.verb, inv);
        };
        let Some(token) = cmd.args.last().filter(|_| cmd.token_count() >= 3) else {
            return usage(cmd.verb, inv);
        };

        let seconds = match mute_seconds(token) {
            Ok(seconds) => seconds,
            Err(e) => return vec![Action::group_text(inv.chat_id, e.message())],
        };

        info!("Muting {} in {} for {}s", target, inv.chat_id, seconds);
        let notice = format!("{} has been muted for {}", label, token);
        self.with_audit(
            vec![
                Action::Mute {
                    chat_id: inv.chat_id.to_string(),
                    user_id: target.to_string(),
                    seconds,
                },
                Action::group_text(inv.chat_id, notice.clone()),
            ],
            inv,
            &notice,
            false,
        )
    }

    fn unban(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        let (Some(target), Some(label)) = (cmd.target(), cmd.target_label()) else {
            return usage(cmd.verb, inv);
        };

        let notice = format!("{} has been unmuted", label);
        self.with_audit(
            vec![
                Action::Mute {
                    chat_id: inv.chat_id.to_string(),
                    user_id: target.to_string(),
                    seconds: 0,
                },
                Action::group_text(inv.chat_id, notice.clone()),
            ],
            inv,
            &notice,
            false,
        )
    }

    fn kick(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        let (Some(target), Some(label)) = (cmd.target(), cmd.target_label()) else {
            return usage(cmd.verb, inv);
        };

        info!("Removing {} from {}", target, inv.chat_id);
        let notice = format!("{} has been removed from the chat", label);
        self.with_audit(
            vec![
                Action::RemoveMember {
                    chat_id: inv.chat_id.to_string(),
                    user_id: target.to_string(),
                },
                Action::group_text(inv.chat_id, notice.clone()),
            ],
            inv,
            &notice,
            false,
        )
    }

    async fn delmsg(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        // Reply form: recall the quoted message
        if let Some(parent_id) = inv.parent_id.filter(|_| cmd.args.is_empty()) {
            return self.with_audit(
                vec![
                    Action::RecallMessage {
                        msg_id: parent_id.to_string(),
                        chat_id: inv.chat_id.to_string(),
                    },
                    Action::group_text(inv.chat_id, "Recalled the quoted message"),
                ],
                inv,
                "Recalled the quoted message",
                true,
            );
        }

        let Some(token) = cmd.args.last() else {
            return usage(cmd.verb, inv);
        };

        let max = self.moderation.max_delete_count;
        let count = match token.parse::<i64>() {
            Ok(count) => count,
            Err(_) => {
                return vec![Action::group_text(
                    inv.chat_id,
                    format!("Please enter a valid number [1-{}]", max),
                )]
            }
        };
        if count < 1 || count > i64::from(max) {
            return vec![Action::group_text(
                inv.chat_id,
                format!("Can only recall 1-{} messages", max),
            )];
        }

        let (Some(target), Some(label)) = (cmd.target(), cmd.target_label()) else {
            return usage(cmd.verb, inv);
        };

        let ids = match self
            .store
            .recent_message_ids(inv.chat_id, target, count as u32)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to load messages of {} in {}: {:#}", target, inv.chat_id, e);
                Vec::new()
            }
        };

        info!(
            "Recalling {} of {} requested messages from {} in {}",
            ids.len(),
            count,
            target,
            inv.chat_id
        );

        let notice = format!("Recalled the latest {} messages from {}", ids.len(), label);
        let mut actions: Vec<Action> = ids
            .into_iter()
            .map(|msg_id| Action::RecallMessage {
                msg_id,
                chat_id: inv.chat_id.to_string(),
            })
            .collect();
        actions.push(Action::group_text(inv.chat_id, notice.clone()));
        self.with_audit(actions, inv, &notice, false)
    }

    async fn add_admin(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        let (Some(target), Some(nickname)) = (cmd.target(), cmd.target_label()) else {
            return usage(cmd.verb, inv);
        };

        if let Err(e) = self.store.grant(inv.chat_id, target, &nickname).await {
            warn!("Failed to grant temporary admin to {}: {:#}", target, e);
        }

        self.with_audit(
            vec![Action::group_text(
                inv.chat_id,
                format!("{} is now a temporary admin", nickname),
            )],
            inv,
            &format!("{} has been added as a temporary admin", nickname),
            false,
        )
    }

    async fn del_admin(&self, cmd: &Command, inv: &Invocation<'_>) -> Vec<Action> {
        let (Some(target), Some(nickname)) = (cmd.target(), cmd.target_label()) else {
            return usage(cmd.verb, inv);
        };

        if let Err(e) = self.store.revoke(inv.chat_id, target).await {
            warn!("Failed to revoke temporary admin from {}: {:#}", target, e);
        }

        self.with_audit(
            vec![Action::group_text(
                inv.chat_id,
                format!("{} has been removed from the temporary admins", nickname),
            )],
            inv,
            &format!("{} is no longer a temporary admin", nickname),
            false,
        )
    }

    async fn admin_list(&self, inv: &Invocation<'_>) -> Vec<Action> {
        let admins = match self.store.list_admins(inv.chat_id).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!("Failed to list temporary admins of {}: {:#}", inv.chat_id, e);
                return vec![Action::group_text(
                    inv.chat_id,
                    "Could not load the temporary admin list",
                )];
            }
        };

        if admins.is_empty() {
            return vec![Action::group_text(
                inv.chat_id,
                "This chat has no temporary admins",
            )];
        }

        let mut text = String::from("Temporary admins of this chat:\n");
        for admin in &admins {
            text.push_str(&format!("- {} ({})\n", admin.nickname, admin.user_id));
        }
        vec![Action::group_text(inv.chat_id, text)]
    }

    /// Append the audit-chat mirror of `notice` when one applies: always for
    /// `always`, otherwise only for commands issued in the main chat.
    fn with_audit(
        &self,
        mut actions: Vec<Action>,
        inv: &Invocation<'_>,
        notice: &str,
        always: bool,
    ) -> Vec<Action> {
        let Some(audit_chat) = self.moderation.audit_chat_id.as_deref() else {
            return actions;
        };
        if always || self.moderation.is_main_chat(inv.chat_id) {
            actions.push(Action::group_text(
                audit_chat,
                format!(
                    "{}\n\nExecutor: {}({})",
                    notice, inv.sender_name, inv.sender_id
                ),
            ));
        }
        actions
    }
}

fn usage(verb: Verb, inv: &Invocation<'_>) -> Vec<Action> {
    vec![Action::group_text(inv.chat_id, verb.usage_text())]
}
