//! Allow-list authorization of issuing principals

use std::collections::HashSet;

use crate::config::IssuerConfig;

/// A chat user plus the roles the chat platform reports for them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Allows a principal iff it, or one of its roles, is allow-listed.
///
/// There are no deny rules; anything not listed is denied.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    allowed_principals: HashSet<String>,
    allowed_roles: HashSet<String>,
}

impl AuthorizationGate {
    pub fn new(allowed_principals: HashSet<String>, allowed_roles: HashSet<String>) -> Self {
        Self {
            allowed_principals,
            allowed_roles,
        }
    }

    pub fn from_config(config: &IssuerConfig) -> Self {
        Self::new(
            config.allowed_principals.clone(),
            config.allowed_roles.clone(),
        )
    }

    /// Whether `principal` is on either allow-list
    pub fn is_allowed(&self, principal: &Principal) -> bool {
        self.allowed_principals.contains(&principal.id)
            || principal
                .roles
                .iter()
                .any(|role| self.allowed_roles.contains(role))
    }

    /// Gate a command; commands that do not require authorization always pass
    pub fn check(&self, principal: &Principal, requires_auth: bool) -> bool {
        !requires_auth || self.is_allowed(principal)
    }
}
