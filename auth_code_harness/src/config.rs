use std::env;
use std::time::Duration;

use url::Url;

use crate::errors::HarnessError;
use crate::flow::FlowVariant;
use crate::utils::CLIENT_SECRET_BYTES;
use crate::verifier::TokenKind;

pub const DEFAULT_LOGIN_USERNAME: &str = "foo@bar.com";
pub const DEFAULT_LOGIN_PASSWORD: &str = "foobar";
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: usize = 16;

/// Fixed test identity submitted at the login step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl Default for LoginCredentials {
    fn default() -> Self {
        Self {
            username: DEFAULT_LOGIN_USERNAME.to_string(),
            password: DEFAULT_LOGIN_PASSWORD.to_string(),
        }
    }
}

/// Everything the harness needs to know about the deployment under test.
///
/// `client_url` is the origin of the relying party. The registration collaborator
/// (`admin_url`) and the authorization server (`public_url`) default to the same origin.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub client_url: Url,
    pub admin_url: Url,
    pub public_url: Url,
    pub credentials: LoginCredentials,
    /// Subject expected in introspection responses
    pub expected_subject: String,
    /// Bounded wait for every navigation and request
    pub step_timeout: Duration,
    pub max_redirects: usize,
    /// Random bytes behind each generated client secret
    pub secret_bytes: usize,
}

impl HarnessConfig {
    pub fn new(client_url: &str) -> Result<Self, HarnessError> {
        let client_url = parse_base_url("client_url", client_url)?;
        let credentials = LoginCredentials::default();
        Ok(Self {
            admin_url: client_url.clone(),
            public_url: client_url.clone(),
            client_url,
            expected_subject: credentials.username.clone(),
            credentials,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            secret_bytes: CLIENT_SECRET_BYTES,
        })
    }

    /// Builds the configuration from environment variables.
    ///
    /// `CLIENT_URL` is required. `ADMIN_URL`, `PUBLIC_URL`, `HARNESS_LOGIN_USERNAME`,
    /// `HARNESS_LOGIN_PASSWORD`, `HARNESS_EXPECTED_SUBJECT`, `HARNESS_STEP_TIMEOUT_SECS` and
    /// `HARNESS_MAX_REDIRECTS` are optional.
    pub fn from_env() -> Result<Self, HarnessError> {
        let client_url = env::var("CLIENT_URL")
            .map_err(|_| HarnessError::Config("CLIENT_URL must be set".to_string()))?;
        let mut config = Self::new(&client_url)?;

        if let Ok(admin_url) = env::var("ADMIN_URL") {
            config = config.with_admin_url(&admin_url)?;
        }
        if let Ok(public_url) = env::var("PUBLIC_URL") {
            config = config.with_public_url(&public_url)?;
        }

        let username = env::var("HARNESS_LOGIN_USERNAME").ok();
        let password = env::var("HARNESS_LOGIN_PASSWORD").ok();
        if username.is_some() || password.is_some() {
            let defaults = LoginCredentials::default();
            config = config.with_credentials(LoginCredentials {
                username: username.unwrap_or(defaults.username),
                password: password.unwrap_or(defaults.password),
            });
        }
        if let Ok(subject) = env::var("HARNESS_EXPECTED_SUBJECT") {
            config.expected_subject = subject;
        }

        if let Ok(secs) = env::var("HARNESS_STEP_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                HarnessError::Config(format!("Invalid HARNESS_STEP_TIMEOUT_SECS: {secs}"))
            })?;
            config = config.with_step_timeout(Duration::from_secs(secs))?;
        }
        if let Ok(max) = env::var("HARNESS_MAX_REDIRECTS") {
            config.max_redirects = max.parse().map_err(|_| {
                HarnessError::Config(format!("Invalid HARNESS_MAX_REDIRECTS: {max}"))
            })?;
        }

        tracing::debug!(
            "Harness configuration: client_url={}, admin_url={}, public_url={}, user={}, step_timeout={:?}",
            config.client_url,
            config.admin_url,
            config.public_url,
            config.credentials.username,
            config.step_timeout
        );
        Ok(config)
    }

    pub fn with_admin_url(mut self, admin_url: &str) -> Result<Self, HarnessError> {
        self.admin_url = parse_base_url("admin_url", admin_url)?;
        Ok(self)
    }

    pub fn with_public_url(mut self, public_url: &str) -> Result<Self, HarnessError> {
        self.public_url = parse_base_url("public_url", public_url)?;
        Ok(self)
    }

    /// Replaces the login identity; the expected subject follows the new username.
    pub fn with_credentials(mut self, credentials: LoginCredentials) -> Self {
        self.expected_subject = credentials.username.clone();
        self.credentials = credentials;
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Result<Self, HarnessError> {
        if step_timeout.is_zero() {
            return Err(HarnessError::Config(
                "Step timeout must be greater than zero".to_string(),
            ));
        }
        self.step_timeout = step_timeout;
        Ok(self)
    }

    pub fn registration_endpoint(&self) -> Result<Url, HarnessError> {
        join(&self.admin_url, "clients")
    }

    pub fn authorization_endpoint(&self, variant: FlowVariant) -> Result<Url, HarnessError> {
        join(&self.public_url, &format!("{}/auth", variant.path_prefix()))
    }

    /// Callback page of the relying party for the given variant
    pub fn redirect_uri(&self, variant: FlowVariant) -> Result<Url, HarnessError> {
        join(&self.client_url, &format!("{}/callback", variant.path_prefix()))
    }

    pub fn introspection_endpoint(&self, kind: TokenKind) -> Result<Url, HarnessError> {
        join(
            &self.client_url,
            &format!("oauth2/introspect/{}", kind.path_segment()),
        )
    }

    pub fn revocation_endpoint(&self, kind: TokenKind) -> Result<Url, HarnessError> {
        join(
            &self.client_url,
            &format!("openid/revoke/{}", kind.path_segment()),
        )
    }

    pub fn userinfo_endpoint(&self) -> Result<Url, HarnessError> {
        join(&self.client_url, "openid/userinfo")
    }
}

fn parse_base_url(name: &str, value: &str) -> Result<Url, HarnessError> {
    let mut url = Url::parse(value.trim())
        .map_err(|e| HarnessError::Config(format!("Invalid {name} '{value}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HarnessError::Config(format!(
            "Invalid {name} '{value}': scheme must be http or https"
        )));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(HarnessError::Config(format!(
            "Invalid {name} '{value}': not a base URL"
        )));
    }
    // Keep any path prefix, so relative joins land below it.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url, HarnessError> {
    base.join(path)
        .map_err(|e| HarnessError::Config(format!("Failed to build URL from {base}: {e}")))
}
