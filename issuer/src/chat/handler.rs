//! Turns one chat message into at most one reply

use std::sync::Arc;

use remotectl_shared::CommandType;
use tracing::debug;

use super::confirm::{ConfirmOutcome, ConfirmationBook};
use super::parser::{self, ChatCommand, ParseError};
use super::reply;
use crate::auth::Principal;
use crate::command::CommandDispatcher;
use crate::config::IssuerConfig;

pub struct ChatHandler {
    dispatcher: Arc<CommandDispatcher>,
    confirmations: ConfirmationBook,
    prefix: String,
    default_alias: Option<String>,
}

impl ChatHandler {
    pub fn new(dispatcher: Arc<CommandDispatcher>, config: &IssuerConfig) -> Self {
        Self {
            dispatcher,
            confirmations: ConfirmationBook::new(config.confirmation_ttl()),
            prefix: config.prefix.clone(),
            default_alias: config.default_alias.clone(),
        }
    }

    /// Handle `text` from `principal`; `None` when the message is not for us
    pub async fn handle(&self, principal: &Principal, text: &str) -> Option<String> {
        let command = match parser::parse(&self.prefix, text) {
            Ok(command) => command,
            Err(ParseError::NotACommand) => return None,
            Err(e) => return Some(reply::parse_error(&self.prefix, &e)),
        };
        debug!(principal = %principal.id, ?command, "Chat command");

        if command.requires_auth() && !self.dispatcher.is_authorized(principal) {
            return Some(reply::unauthorized());
        }

        let text = match command {
            ChatCommand::Help => reply::help(&self.prefix),
            ChatCommand::Confirm { alias } => self.confirm(principal, &alias).await,
            device_command => self.request(principal, &device_command).await,
        };
        Some(text)
    }

    async fn request(&self, principal: &Principal, chat: &ChatCommand) -> String {
        let Some(command) = chat.command_type() else {
            return reply::help(&self.prefix);
        };
        let Some(alias) = self.resolve_alias(chat.alias()) else {
            return reply::missing_alias(&self.prefix, command);
        };

        if command.requires_confirmation() {
            self.confirmations.request(&principal.id, command, &alias).await;
            return reply::confirmation_prompt(&self.prefix, command, &alias);
        }
        self.submit(principal, command, &alias).await
    }

    async fn confirm(&self, principal: &Principal, alias: &str) -> String {
        match self.confirmations.confirm(&principal.id, alias).await {
            ConfirmOutcome::Confirmed { command, alias } => {
                self.submit(principal, command, &alias).await
            }
            other => reply::confirmation(&self.prefix, &other).unwrap_or_default(),
        }
    }

    async fn submit(&self, principal: &Principal, command: CommandType, alias: &str) -> String {
        let outcome = self.dispatcher.submit(principal, command, alias).await;
        reply::outcome(command, alias, &outcome)
    }

    fn resolve_alias(&self, alias: Option<&str>) -> Option<String> {
        alias.map(str::to_string).or_else(|| self.default_alias.clone())
    }
}
