use url::Url;

use crate::browser::{Browser, Landing, Page};
use crate::config::HarnessConfig;
use crate::errors::{FlowStep, HarnessError};
use crate::registration::{ClientRegistration, RegistrationError, register_client};
use crate::scope::ScopeSet;
use crate::utils::{STATE_BYTES, gen_random_string, preview};

use super::callback::capture_outcome;
use super::forms::PageKind;
use super::types::{FlowOptions, FlowOutcome, FlowVariant};

/// Drives one authorization code flow through an isolated browser context
pub struct FlowDriver<'a> {
    config: &'a HarnessConfig,
    browser: &'a Browser,
}

impl<'a> FlowDriver<'a> {
    pub fn new(config: &'a HarnessConfig, browser: &'a Browser) -> Self {
        Self { config, browser }
    }

    /// Registers the client, walks the authorization request through login and consent, and
    /// captures what the relying party's callback page reports.
    ///
    /// A non-success result on the callback page is returned as `FlowOutcome::Failure`, not as
    /// an error. Errors are reserved for the harness not being able to finish the flow.
    pub async fn run_authorization_code_flow(
        &self,
        registration: &ClientRegistration,
        options: &FlowOptions,
        variant: FlowVariant,
    ) -> Result<FlowOutcome, HarnessError> {
        let redirect_uri = redirect_uri(registration)?;
        let client_id = self.resolve_client(registration, options).await?;
        let state = gen_random_string(STATE_BYTES)?;

        let auth_url = authorization_request_url(
            self.config.authorization_endpoint(variant)?,
            &client_id,
            &registration.scope,
            &redirect_uri,
            &state,
            options,
        );
        tracing::info!(
            "Starting {} authorization code flow for client {} (requested: '{}', granting: '{}')",
            variant,
            client_id,
            registration.scope,
            options.consent.scope
        );

        let mut landing = self
            .browser
            .navigate(FlowStep::Authorization, auth_url, Some(&redirect_uri))
            .await?;
        let mut logged_in = false;
        let mut consented = false;

        let page = loop {
            let page = match landing {
                Landing::Boundary(callback) => {
                    tracing::debug!("Following redirect to callback {}", callback);
                    break self.browser.open(FlowStep::Callback, callback).await?;
                }
                Landing::Page(page) => page,
            };

            match PageKind::classify(&page.url, &page.body) {
                PageKind::Login(form) => {
                    if logged_in {
                        return Err(step_error(
                            FlowStep::Login,
                            "Login form presented again after submitting credentials",
                            &page,
                        ));
                    }
                    let fields = form
                        .fill_login(&self.config.credentials, options.login.remember)
                        .map_err(|message| step_error(FlowStep::Login, message, &page))?;
                    tracing::info!("Logging in as {}", self.config.credentials.username);
                    landing = self
                        .browser
                        .submit(FlowStep::Login, &form, &fields, Some(&redirect_uri))
                        .await?;
                    logged_in = true;
                }
                PageKind::Consent(form) => {
                    if consented {
                        return Err(step_error(
                            FlowStep::Consent,
                            "Consent form presented again after it was submitted",
                            &page,
                        ));
                    }
                    let fields = form
                        .fill_consent(&options.consent.scope, options.consent.remember)
                        .map_err(|message| step_error(FlowStep::Consent, message, &page))?;
                    tracing::info!(
                        "Granting [{}] of offered [{}]",
                        options.consent.scope,
                        form.offered_scopes()
                    );
                    landing = self
                        .browser
                        .submit(FlowStep::Consent, &form, &fields, Some(&redirect_uri))
                        .await?;
                    consented = true;
                }
                PageKind::Other => break page,
            }
        };

        let outcome = capture_outcome(&redirect_uri, &page.url, &page.body)?;
        tracing::info!(
            "{} flow for client {} finished: {}",
            variant,
            client_id,
            outcome.summary()
        );
        Ok(outcome)
    }

    async fn resolve_client(
        &self,
        registration: &ClientRegistration,
        options: &FlowOptions,
    ) -> Result<String, HarnessError> {
        if options.consent.create_client {
            let endpoint = self.config.registration_endpoint()?;
            let client = register_client(self.browser, endpoint, registration).await?;
            return Ok(client.client_id);
        }

        options.client_id.clone().ok_or_else(|| {
            HarnessError::Config(
                "Client creation is disabled but no client_id was provided".to_string(),
            )
        })
    }
}

fn redirect_uri(registration: &ClientRegistration) -> Result<Url, HarnessError> {
    let uri = registration.primary_redirect_uri().ok_or_else(|| {
        RegistrationError::InvalidRequest("At least one redirect URI is required".to_string())
    })?;
    Url::parse(uri).map_err(|e| {
        HarnessError::from(RegistrationError::InvalidRequest(format!(
            "Malformed redirect URI '{uri}': {e}"
        )))
    })
}

fn step_error(step: FlowStep, message: impl Into<String>, page: &Page) -> HarnessError {
    HarnessError::navigation_with_payload(
        step,
        format!("{} (at {})", message.into(), page.url),
        preview(&page.body, 500),
    )
}

/// Authorization request for the code flow
pub(crate) fn authorization_request_url(
    mut endpoint: Url,
    client_id: &str,
    scope: &ScopeSet,
    redirect_uri: &Url,
    state: &str,
    options: &FlowOptions,
) -> Url {
    {
        let mut query = endpoint.query_pairs_mut();
        query
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &scope.to_wire())
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("state", state);
        if let Some(login_hint) = &options.login_hint {
            query.append_pair("login_hint", login_hint);
        }
        if let Some(prompt) = &options.prompt {
            query.append_pair("prompt", prompt);
        }
    }
    endpoint
}
