use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Which of the flow's tokens a follow-up call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Route segment used by the relying party (`at` / `rt`)
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Access => "at",
            Self::Refresh => "rt",
        }
    }

    /// `token_use` reported by introspection for this kind
    pub fn token_use(&self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token_use())
    }
}

/// Introspection body relayed by the relying party
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntrospectionResult {
    pub active: bool,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub token_use: Option<String>,
    /// Body the relying party answered with
    #[serde(skip)]
    pub raw_payload: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IntrospectionEnvelope {
    pub(crate) result: String,
    #[serde(default)]
    pub(crate) body: Option<IntrospectionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevocationResult {
    pub result: String,
    #[serde(skip)]
    pub raw_payload: String,
}

/// Userinfo answer; a denial is data, not a harness error
#[derive(Debug, Clone, PartialEq)]
pub enum UserinfoResponse {
    Authorized(Value),
    Denied {
        status: u16,
        error: String,
        error_description: String,
        raw_payload: String,
    },
}

impl UserinfoResponse {
    pub(crate) fn from_parts(status: u16, body: Option<Value>, raw: &str) -> Self {
        let error = body
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match (error, body) {
            (None, Some(claims)) if (200..300).contains(&status) => Self::Authorized(claims),
            (error, body) => Self::Denied {
                status,
                error: error.unwrap_or_default(),
                error_description: body
                    .as_ref()
                    .and_then(|v| v.get("error_description"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                raw_payload: raw.to_string(),
            },
        }
    }

    /// What userinfo answered with
    pub fn raw_payload(&self) -> String {
        match self {
            Self::Authorized(claims) => claims.to_string(),
            Self::Denied { raw_payload, .. } => raw_payload.clone(),
        }
    }
}
