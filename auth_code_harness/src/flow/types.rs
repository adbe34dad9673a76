use std::fmt;

use crate::scope::ScopeSet;

/// Which relying party route family drives the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowVariant {
    OAuth2,
    OpenId,
}

impl FlowVariant {
    pub fn path_prefix(&self) -> &'static str {
        match self {
            Self::OAuth2 => "oauth2",
            Self::OpenId => "openid",
        }
    }
}

impl fmt::Display for FlowVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_prefix())
    }
}

/// How the consent step is answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentOptions {
    /// Scopes the user approves; may be any subset of the requested scopes, including none
    pub scope: ScopeSet,
    pub remember: bool,
    /// Register the client before the flow. When false, `FlowOptions::client_id` is used.
    pub create_client: bool,
}

impl Default for ConsentOptions {
    fn default() -> Self {
        Self {
            scope: ScopeSet::new(),
            remember: false,
            create_client: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    pub remember: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowOptions {
    pub consent: ConsentOptions,
    pub login: LoginOptions,
    pub login_hint: Option<String>,
    /// Value of the `prompt` parameter, e.g. `login` or `consent`
    pub prompt: Option<String>,
    /// Pre-registered client, used when `consent.create_client` is false
    pub client_id: Option<String>,
}

impl FlowOptions {
    /// Options granting exactly `scopes` at the consent step
    pub fn granting<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            consent: ConsentOptions {
                scope: scopes.into_iter().collect(),
                ..ConsentOptions::default()
            },
            ..Self::default()
        }
    }

    pub fn granted_scopes(&self) -> &ScopeSet {
        &self.consent.scope
    }
}

/// Tokens delivered to the relying party on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    /// What the callback page actually rendered
    pub raw_payload: String,
}

/// Non-success result reported by the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFailure {
    pub error_code: String,
    pub error_description: String,
    /// What the callback page actually rendered
    pub raw_payload: String,
}

impl fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error_description.is_empty() {
            write!(f, "{}", self.error_code)
        } else {
            write!(f, "{}: {}", self.error_code, self.error_description)
        }
    }
}

/// Result of one authorization code flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Success(TokenSet),
    Failure(FlowFailure),
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        match self {
            Self::Success(tokens) => Some(tokens),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FlowFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Short description used in logs and assertion messages; never includes token values
    pub fn summary(&self) -> String {
        match self {
            Self::Success(tokens) => format!(
                "success(access_token: {}, id_token: {}, refresh_token: {})",
                presence(Some(&tokens.access_token)),
                presence(tokens.id_token.as_ref()),
                presence(tokens.refresh_token.as_ref()),
            ),
            Self::Failure(failure) => format!("failure({failure})"),
        }
    }
}

fn presence(token: Option<&String>) -> &'static str {
    match token {
        Some(t) if t.is_empty() => "empty",
        Some(_) => "present",
        None => "absent",
    }
}
