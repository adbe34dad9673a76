use serde_json::Value;

use crate::browser::{Browser, RawResponse};
use crate::config::HarnessConfig;
use crate::errors::{FlowStep, HarnessError};
use crate::utils::preview;

use super::types::{
    IntrospectionEnvelope, IntrospectionResult, RevocationResult, TokenKind, UserinfoResponse,
};

const SUCCESS: &str = "success";

/// Issues the follow-up calls of a scenario.
///
/// Uses the scenario's own browser, so the calls carry the relying party session holding the
/// tokens minted by the flow that just completed.
pub struct OutcomeVerifier<'a> {
    config: &'a HarnessConfig,
    browser: &'a Browser,
}

impl<'a> OutcomeVerifier<'a> {
    pub fn new(config: &'a HarnessConfig, browser: &'a Browser) -> Self {
        Self { config, browser }
    }

    pub async fn introspect(&self, kind: TokenKind) -> Result<IntrospectionResult, HarnessError> {
        let url = self.config.introspection_endpoint(kind)?;
        let response = self.browser.get_raw(FlowStep::Introspection, url).await?;
        let envelope: IntrospectionEnvelope =
            parse_json(FlowStep::Introspection, &response)?;

        if envelope.result != SUCCESS {
            return Err(HarnessError::assertion(
                FlowStep::Introspection,
                format!("{kind} introspection result"),
                SUCCESS,
                envelope.result,
            )
            .with_payload(preview(&response.body, 500)));
        }
        let mut result = envelope.body.ok_or_else(|| HarnessError::Payload {
            step: FlowStep::Introspection,
            message: "Successful introspection without a body".to_string(),
            payload: preview(&response.body, 500),
        })?;
        result.raw_payload = response.body;

        tracing::info!(
            "Introspected {}: active={}, sub={:?}, token_use={:?}",
            kind,
            result.active,
            result.sub,
            result.token_use
        );
        Ok(result)
    }

    pub async fn revoke(&self, kind: TokenKind) -> Result<RevocationResult, HarnessError> {
        let url = self.config.revocation_endpoint(kind)?;
        let response = self.browser.get_raw(FlowStep::Revocation, url).await?;
        let mut result: RevocationResult = parse_json(FlowStep::Revocation, &response)?;
        result.raw_payload = response.body;
        tracing::info!("Revoked {}: {}", kind, result.result);
        Ok(result)
    }

    /// Calls userinfo with the session's access token. Non-2xx answers are returned as
    /// `UserinfoResponse::Denied`.
    pub async fn userinfo(&self) -> Result<UserinfoResponse, HarnessError> {
        let url = self.config.userinfo_endpoint()?;
        let response = self.browser.get_raw(FlowStep::Userinfo, url).await?;
        let status = response.status;

        let body = match serde_json::from_str::<Value>(&response.body) {
            Ok(value) => Some(value),
            Err(e) if !status.is_success() => {
                tracing::debug!("Userinfo returned {} with a non-JSON body: {}", status, e);
                None
            }
            Err(e) => {
                return Err(HarnessError::Payload {
                    step: FlowStep::Userinfo,
                    message: format!("Userinfo body is not JSON: {e}"),
                    payload: preview(&response.body, 500),
                });
            }
        };

        let userinfo = UserinfoResponse::from_parts(status.as_u16(), body, &response.body);
        match &userinfo {
            UserinfoResponse::Authorized(_) => tracing::info!("Userinfo authorized ({})", status),
            UserinfoResponse::Denied { error, .. } => {
                tracing::info!("Userinfo denied ({}): {}", status, error)
            }
        }
        Ok(userinfo)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    step: FlowStep,
    response: &RawResponse,
) -> Result<T, HarnessError> {
    serde_json::from_str(&response.body).map_err(|e| HarnessError::Payload {
        step,
        message: format!("Unexpected response ({}): {e}", response.status),
        payload: preview(&response.body, 500),
    })
}
