use serde::{Deserialize, Serialize};

use crate::scope::ScopeSet;
use crate::utils::{UtilError, generate_client_secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    Implicit,
}

/// Client metadata submitted to the registration endpoint.
///
/// `subject_type` and `token_endpoint_auth_method` are passed through untouched and omitted
/// from the payload when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRegistration {
    pub client_secret: String,
    pub scope: ScopeSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
}

impl ClientRegistration {
    /// Registration with a freshly generated secret of `secret_bytes` random bytes, a single
    /// redirect URI, and the authorization code + refresh token grants
    pub fn new(secret_bytes: usize, redirect_uri: impl Into<String>) -> Result<Self, UtilError> {
        Ok(Self {
            client_secret: generate_client_secret(secret_bytes)?,
            scope: ScopeSet::new(),
            subject_type: None,
            token_endpoint_auth_method: None,
            redirect_uris: vec![redirect_uri.into()],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        })
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.split_whitespace().collect();
        self
    }

    pub fn with_subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type.into());
        self
    }

    pub fn with_token_endpoint_auth_method(mut self, method: impl Into<String>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    pub fn with_redirect_uris<I, S>(mut self, redirect_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redirect_uris = redirect_uris.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_grant_types(mut self, grant_types: impl IntoIterator<Item = GrantType>) -> Self {
        self.grant_types = grant_types.into_iter().collect();
        self
    }

    /// Redirect URI the authorization request uses
    pub fn primary_redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }
}
