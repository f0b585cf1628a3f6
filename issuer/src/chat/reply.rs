//! User-facing reply text

use remotectl_shared::{CommandError, CommandResult, CommandType};

use super::confirm::ConfirmOutcome;
use super::parser::ParseError;

pub fn help(prefix: &str) -> String {
    format!(
        "Commands:\n\
         {p}ping <alias>    check that a device is online\n\
         {p}status <alias>  show device facts\n\
         {p}lock <alias>    lock the screen\n\
         {p}logout <alias>  log the user out (asks for confirmation)\n\
         {p}confirm <alias> confirm a pending logout\n\
         {p}help            this message",
        p = prefix
    )
}

pub fn parse_error(prefix: &str, error: &ParseError) -> String {
    format!("{}. Try {}help.", capitalize(&error.to_string()), prefix)
}

pub fn unauthorized() -> String {
    "You are not authorized to control devices.".into()
}

pub fn missing_alias(prefix: &str, command: CommandType) -> String {
    format!("Which device? Usage: {}{} <alias>", prefix, command)
}

pub fn confirmation_prompt(prefix: &str, command: CommandType, alias: &str) -> String {
    let consequence = match command {
        CommandType::Logout => format!("Logging out {alias} ends the user's session."),
        other => format!("{prefix}{other} {alias} cannot be undone."),
    };
    format!("{consequence} Reply {prefix}confirm {alias} to proceed.")
}

pub fn confirmation(prefix: &str, outcome: &ConfirmOutcome) -> Option<String> {
    match outcome {
        ConfirmOutcome::Confirmed { .. } => None,
        ConfirmOutcome::NothingPending => {
            Some("There is nothing waiting for confirmation.".into())
        }
        ConfirmOutcome::AliasMismatch { command, pending } => Some(format!(
            "Your pending {command} is for {pending}. Reply {prefix}confirm {pending} to proceed."
        )),
        ConfirmOutcome::Expired => {
            Some("That confirmation expired; send the command again.".into())
        }
    }
}

/// Render the outcome of a submitted command
pub fn outcome(
    command: CommandType,
    alias: &str,
    outcome: &Result<CommandResult, CommandError>,
) -> String {
    match outcome {
        Ok(result) => success(command, alias, result),
        Err(CommandError::Unauthorized) => unauthorized(),
        Err(CommandError::RateLimited) => {
            "Too many commands; wait a minute and try again.".into()
        }
        Err(CommandError::Unreachable(alias)) => format!("{alias} is offline or unknown."),
        Err(CommandError::Rejected) => format!("{alias} rejected the command."),
        Err(CommandError::ExecutionFailed(message)) => format!("{alias}: {message}"),
        Err(CommandError::UnknownCommand(name)) => {
            format!("{alias} does not support '{name}'.")
        }
        Err(CommandError::Timeout(after)) => {
            format!("{alias} did not respond within {}s.", after.as_secs())
        }
    }
}

fn success(command: CommandType, alias: &str, result: &CommandResult) -> String {
    match command {
        CommandType::Ping => format!("{alias} is online"),
        CommandType::Status => status_summary(alias, &result.message),
        CommandType::Lock | CommandType::Logout => format!("{alias}: {}", result.message),
    }
}

fn status_summary(alias: &str, message: &str) -> String {
    let Ok(facts) = serde_json::from_str::<serde_json::Value>(message) else {
        return format!("{alias}: {message}");
    };

    let text = |key: &str| facts[key].as_str().unwrap_or("?").to_string();
    let uptime = facts["uptime_secs"].as_u64().unwrap_or(0);
    let total = facts["commands"]["total"].as_u64().unwrap_or(0);
    let failed = facts["commands"]["failed"].as_u64().unwrap_or(0);

    format!(
        "{alias}: {} on {}/{}, agent v{}, up {}h{:02}m, {} commands ({} failed)",
        text("hostname"),
        text("platform"),
        text("arch"),
        text("version"),
        uptime / 3600,
        (uptime % 3600) / 60,
        total,
        failed
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
