use serde::Deserialize;
use url::Url;

use crate::browser::Browser;
use crate::errors::{FlowStep, HarnessError};

use super::errors::RegistrationError;
use super::types::ClientRegistration;

/// Client as issued by the registration endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Submits `registration` once. A rejection is fatal to the scenario and never retried.
pub async fn register_client(
    browser: &Browser,
    endpoint: Url,
    registration: &ClientRegistration,
) -> Result<RegisteredClient, HarnessError> {
    validate(registration)?;

    let response = browser
        .post_json(FlowStep::Registration, endpoint, registration)
        .await?;

    if !response.status.is_success() {
        return Err(RegistrationError::Rejected {
            status: response.status.as_u16(),
            body: response.body,
        }
        .into());
    }

    let client: RegisteredClient = serde_json::from_str(&response.body).map_err(|e| {
        RegistrationError::InvalidResponse(format!("{e} in response body {}", response.body))
    })?;
    if client.client_id.is_empty() {
        return Err(RegistrationError::InvalidResponse(format!(
            "Empty client_id in response body {}",
            response.body
        ))
        .into());
    }

    tracing::info!(
        "Registered client {} for scope '{}'",
        client.client_id,
        registration.scope
    );
    Ok(client)
}

fn validate(registration: &ClientRegistration) -> Result<(), RegistrationError> {
    if registration.redirect_uris.is_empty() {
        return Err(RegistrationError::InvalidRequest(
            "At least one redirect URI is required".to_string(),
        ));
    }
    for uri in &registration.redirect_uris {
        Url::parse(uri).map_err(|e| {
            RegistrationError::InvalidRequest(format!("Malformed redirect URI '{uri}': {e}"))
        })?;
    }
    if registration.client_secret.is_empty() {
        return Err(RegistrationError::InvalidRequest(
            "Client secret must not be empty".to_string(),
        ));
    }
    Ok(())
}
