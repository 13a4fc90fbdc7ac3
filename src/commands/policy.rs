use tracing::warn;

use super::Tier;
use crate::memory::MemoryStore;
use crate::platform::event::SenderLevel;

/// Effective role of a command sender in one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Administrator,
    TemporaryAdmin,
    Member,
}

impl Role {
    pub fn is_moderator(self) -> bool {
        matches!(self, Role::Owner | Role::Administrator)
    }

    pub fn permits(self, tier: Tier) -> bool {
        match tier {
            Tier::Full => self.is_moderator(),
            Tier::Restricted => self.is_moderator() || self == Role::TemporaryAdmin,
        }
    }

    /// Highest tier this role may use, if any
    pub fn tier(self) -> Option<Tier> {
        match self {
            Role::Owner | Role::Administrator => Some(Tier::Full),
            Role::TemporaryAdmin => Some(Tier::Restricted),
            Role::Member => None,
        }
    }
}

/// Resolve the sender's role. Platform owners and administrators never hit the
/// registry; everyone else is a temporary admin only if granted in this chat.
/// A registry failure is logged and treated as "not granted".
pub async fn resolve_role(
    store: &MemoryStore,
    level: SenderLevel,
    chat_id: &str,
    user_id: &str,
) -> Role {
    match level {
        SenderLevel::Owner => Role::Owner,
        SenderLevel::Administrator => Role::Administrator,
        SenderLevel::Member => match store.is_granted(chat_id, user_id).await {
            Ok(true) => Role::TemporaryAdmin,
            Ok(false) => Role::Member,
            Err(e) => {
                warn!("Temporary admin lookup failed for {} in {}: {:#}", user_id, chat_id, e);
                Role::Member
            }
        },
    }
}
