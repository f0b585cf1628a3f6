//! Chat message parsing into the closed set of chat commands

use remotectl_shared::CommandType;
use thiserror::Error;

/// Everything a chat message can ask for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Lock { alias: Option<String> },
    Status { alias: Option<String> },
    Ping { alias: Option<String> },
    Logout { alias: Option<String> },
    Help,
    /// Second step of a logout
    Confirm { alias: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Ordinary chatter; no reply
    #[error("not a command")]
    NotACommand,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("'{0}' needs a device alias")]
    MissingAlias(&'static str),

    #[error("too many arguments for '{0}'")]
    TooManyArguments(&'static str),
}

impl ChatCommand {
    /// Whether the issuing principal must pass the authorization gate
    pub fn requires_auth(&self) -> bool {
        match self {
            ChatCommand::Help => false,
            ChatCommand::Lock { .. }
            | ChatCommand::Status { .. }
            | ChatCommand::Ping { .. }
            | ChatCommand::Logout { .. }
            | ChatCommand::Confirm { .. } => true,
        }
    }

    /// The device command this chat command asks for directly.
    ///
    /// `Confirm` has none of its own; it releases whatever is pending.
    pub fn command_type(&self) -> Option<CommandType> {
        match self {
            ChatCommand::Lock { .. } => Some(CommandType::Lock),
            ChatCommand::Status { .. } => Some(CommandType::Status),
            ChatCommand::Ping { .. } => Some(CommandType::Ping),
            ChatCommand::Logout { .. } => Some(CommandType::Logout),
            ChatCommand::Help | ChatCommand::Confirm { .. } => None,
        }
    }

    /// Alias as typed in the message
    pub fn alias(&self) -> Option<&str> {
        match self {
            ChatCommand::Lock { alias }
            | ChatCommand::Status { alias }
            | ChatCommand::Ping { alias }
            | ChatCommand::Logout { alias } => alias.as_deref(),
            ChatCommand::Confirm { alias } => Some(alias),
            ChatCommand::Help => None,
        }
    }
}

/// Parse `text` if it starts with `prefix`
pub fn parse(prefix: &str, text: &str) -> Result<ChatCommand, ParseError> {
    let body = text
        .trim()
        .strip_prefix(prefix)
        .ok_or(ParseError::NotACommand)?;

    let mut words = body.split_whitespace();
    let name = words.next().ok_or(ParseError::NotACommand)?.to_ascii_lowercase();
    let alias = words.next().map(str::to_string);
    let extra = words.next().is_some();

    let (label, command) = match name.as_str() {
        "lock" => ("lock", ChatCommand::Lock { alias }),
        "status" => ("status", ChatCommand::Status { alias }),
        "ping" => ("ping", ChatCommand::Ping { alias }),
        "logout" => ("logout", ChatCommand::Logout { alias }),
        "help" => ("help", ChatCommand::Help),
        "confirm" => (
            "confirm",
            ChatCommand::Confirm {
                alias: alias.ok_or(ParseError::MissingAlias("confirm"))?,
            },
        ),
        _ => return Err(ParseError::Unknown(name.clone())),
    };

    if extra {
        return Err(ParseError::TooManyArguments(label));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_with_alias() {
        assert_eq!(
            parse("!", "!ping alpha"),
            Ok(ChatCommand::Ping {
                alias: Some("alpha".into())
            })
        );
        assert_eq!(
            parse("!", "  !LOCK beta "),
            Ok(ChatCommand::Lock {
                alias: Some("beta".into())
            })
        );
        assert_eq!(parse("!", "!status"), Ok(ChatCommand::Status { alias: None }));
    }

    #[test]
    fn test_help_needs_no_auth() {
        let help = parse("!", "!help").unwrap();
        assert!(!help.requires_auth());
        assert!(parse("!", "!logout gamma").unwrap().requires_auth());
    }

    #[test]
    fn test_device_command_mapping() {
        let logout = parse("!", "!logout gamma").unwrap();
        assert_eq!(logout.command_type(), Some(CommandType::Logout));
        assert_eq!(logout.alias(), Some("gamma"));

        let confirm = parse("!", "!confirm gamma").unwrap();
        assert_eq!(confirm.command_type(), None);
        assert_eq!(confirm.alias(), Some("gamma"));

        assert_eq!(parse("!", "!ping").unwrap().alias(), None);
        assert_eq!(parse("!", "!help").unwrap().command_type(), None);
    }

    #[test]
    fn test_confirm_requires_alias() {
        assert_eq!(parse("!", "!confirm"), Err(ParseError::MissingAlias("confirm")));
        assert_eq!(
            parse("!", "!confirm gamma"),
            Ok(ChatCommand::Confirm {
                alias: "gamma".into()
            })
        );
    }

    #[test]
    fn test_non_commands_and_unknowns() {
        assert_eq!(parse("!", "hello there"), Err(ParseError::NotACommand));
        assert_eq!(parse("!", "!"), Err(ParseError::NotACommand));
        assert_eq!(parse("!", "!reboot alpha"), Err(ParseError::Unknown("reboot".into())));
        assert_eq!(
            parse("!", "!ping alpha beta"),
            Err(ParseError::TooManyArguments("ping"))
        );
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(
            parse("rc:", "rc:ping alpha"),
            Ok(ChatCommand::Ping {
                alias: Some("alpha".into())
            })
        );
        assert_eq!(parse("rc:", "!ping alpha"), Err(ParseError::NotACommand));
    }
}
