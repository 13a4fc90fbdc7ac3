//! Moderation commands: the verb table, the parser, and help rendering.
//!
//! A command is a text message whose first whitespace-separated token is a
//! known verb. Targets come from the message's mention list; only the first
//! mention is ever used.

pub mod handlers;
pub mod policy;

/// Known command verbs, declared in `COMMANDS` row order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Ban,
    Unban,
    Kick,
    DelMsg,
    AddAdmin,
    DelAdmin,
    AdminList,
    Help,
}

/// Permission tier a verb requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Owners and administrators only
    Full,
    /// Owners, administrators and temporary admins of the chat
    Restricted,
}

/// One row of the command table
#[derive(Debug)]
pub struct CommandSpec {
    pub verb: Verb,
    pub name: &'static str,
    pub tier: Tier,
    pub summary: &'static str,
    pub usage: &'static [&'static str],
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        verb: Verb::Ban,
        name: "!ban",
        tier: Tier::Full,
        summary: "mute a user",
        usage: &["!ban @user duration (duration is one of 10, 1h, 6h, 12h)"],
    },
    CommandSpec {
        verb: Verb::Unban,
        name: "!unban",
        tier: Tier::Full,
        summary: "lift a mute",
        usage: &["!unban @user"],
    },
    CommandSpec {
        verb: Verb::Kick,
        name: "!kick",
        tier: Tier::Full,
        summary: "remove a user from the chat",
        usage: &["!kick @user"],
    },
    CommandSpec {
        verb: Verb::DelMsg,
        name: "!delmsg",
        tier: Tier::Restricted,
        summary: "recall messages",
        usage: &[
            "!delmsg (sent as a reply to the message to recall)",
            "!delmsg @user count (recalls the user's latest messages)",
        ],
    },
    CommandSpec {
        verb: Verb::AddAdmin,
        name: "!addadmin",
        tier: Tier::Full,
        summary: "add a temporary admin",
        usage: &["!addadmin @user"],
    },
    CommandSpec {
        verb: Verb::DelAdmin,
        name: "!deladmin",
        tier: Tier::Full,
        summary: "remove a temporary admin",
        usage: &["!deladmin @user"],
    },
    CommandSpec {
        verb: Verb::AdminList,
        name: "!adminlist",
        tier: Tier::Full,
        summary: "list temporary admins",
        usage: &["!adminlist"],
    },
    CommandSpec {
        verb: Verb::Help,
        name: "!help",
        tier: Tier::Restricted,
        summary: "show this help",
        usage: &["!help"],
    },
];

// Each verb's row sits at its discriminant; reordering one without the other fails the build.
const _: () = {
    assert!(COMMANDS.len() == Verb::Help as usize + 1, "every verb needs a COMMANDS row");
    let mut i = 0;
    while i < COMMANDS.len() {
        assert!(
            COMMANDS[i].verb as usize == i,
            "COMMANDS rows must follow Verb declaration order"
        );
        i += 1;
    }
};

impl Verb {
    pub fn spec(self) -> &'static CommandSpec {
        &COMMANDS[self as usize]
    }

    pub fn from_token(token: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|spec| spec.name == token)
            .map(|spec| spec.verb)
    }

    pub fn tier(self) -> Tier {
        self.spec().tier
    }

    /// "Usage:" reply listing this verb's forms
    pub fn usage_text(self) -> String {
        let mut text = String::from("Usage:");
        for line in self.spec().usage {
            text.push('\n');
            text.push_str(line);
        }
        text
    }
}

/// A parsed command message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    /// Tokens after the verb
    pub args: Vec<String>,
    /// Mentioned user ids, in event order
    pub mentions: Vec<String>,
}

impl Command {
    /// Split `text` on whitespace and look the first token up in the verb table.
    /// Returns `None` for anything that is not a known command.
    pub fn parse(text: &str, mentions: &[String]) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let verb = Verb::from_token(tokens.next()?)?;
        Some(Self {
            verb,
            args: tokens.map(str::to_string).collect(),
            mentions: mentions.to_vec(),
        })
    }

    /// The single target of the command: the first mentioned user
    pub fn target(&self) -> Option<&str> {
        self.mentions.first().map(String::as_str)
    }

    /// Display text of the target: first argument with `@` removed
    pub fn target_label(&self) -> Option<String> {
        self.args.first().map(|arg| arg.replace('@', ""))
    }

    /// Number of tokens including the verb
    pub fn token_count(&self) -> usize {
        self.args.len() + 1
    }
}

/// Markdown command reference for a tier. The restricted reference only lists
/// restricted verbs other than help itself.
pub fn help_text(tier: Tier) -> String {
    let mut text = String::from("#### Command help");
    for spec in COMMANDS {
        let listed = match tier {
            Tier::Full => spec.verb != Verb::Help,
            Tier::Restricted => spec.tier == Tier::Restricted && spec.verb != Verb::Help,
        };
        if !listed {
            continue;
        }
        text.push_str(&format!("\n* {} | {}", spec.name, spec.summary));
        for line in spec.usage {
            text.push_str(&format!("\n> {}", line));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_splits_verb_and_args() {
        let cmd = Command::parse("!ban  @bob   1h", &ids(&["u-2"])).unwrap();
        assert_eq!(cmd.verb, Verb::Ban);
        assert_eq!(cmd.args, ids(&["@bob", "1h"]));
        assert_eq!(cmd.target(), Some("u-2"));
        assert_eq!(cmd.target_label().as_deref(), Some("bob"));
        assert_eq!(cmd.token_count(), 3);
    }

    #[test]
    fn test_unknown_or_prefixed_verbs_are_ignored() {
        assert!(Command::parse("!banana @bob", &[]).is_none());
        assert!(Command::parse("hello !ban", &[]).is_none());
        assert!(Command::parse("ban @bob 1h", &[]).is_none());
        assert!(Command::parse("   ", &[]).is_none());
    }

    #[test]
    fn test_every_verb_is_recognised() {
        for spec in COMMANDS {
            let cmd = Command::parse(spec.name, &[]).unwrap();
            assert_eq!(cmd.verb, spec.verb);
            assert!(cmd.args.is_empty());
            assert_eq!(cmd.verb.spec().name, spec.name);
        }
    }

    #[test]
    fn test_verb_rows_match_their_verb() {
        let verbs = [
            Verb::Ban,
            Verb::Unban,
            Verb::Kick,
            Verb::DelMsg,
            Verb::AddAdmin,
            Verb::DelAdmin,
            Verb::AdminList,
            Verb::Help,
        ];
        for verb in verbs {
            assert_eq!(verb.spec().verb, verb);
        }
        assert_eq!(Verb::DelMsg.spec().name, "!delmsg");
        assert_eq!(Verb::Help.tier(), Tier::Restricted);
        assert_eq!(Verb::Ban.tier(), Tier::Full);
    }

    #[test]
    fn test_only_first_mention_is_the_target() {
        let cmd = Command::parse("!kick @a @b", &ids(&["u-a", "u-b"])).unwrap();
        assert_eq!(cmd.target(), Some("u-a"));
    }

    #[test]
    fn test_tiers() {
        assert_eq!(Verb::DelMsg.tier(), Tier::Restricted);
        assert_eq!(Verb::Help.tier(), Tier::Restricted);
        for verb in [Verb::Ban, Verb::Unban, Verb::Kick, Verb::AddAdmin, Verb::DelAdmin, Verb::AdminList] {
            assert_eq!(verb.tier(), Tier::Full);
        }
    }

    #[test]
    fn test_help_text_by_tier() {
        let full = help_text(Tier::Full);
        for name in ["!ban", "!unban", "!kick", "!delmsg", "!addadmin", "!deladmin", "!adminlist"] {
            assert!(full.contains(name), "missing {}", name);
        }

        let restricted = help_text(Tier::Restricted);
        assert!(restricted.contains("!delmsg"));
        assert!(!restricted.contains("!ban"));
        assert!(!restricted.contains("!addadmin"));
    }
}
