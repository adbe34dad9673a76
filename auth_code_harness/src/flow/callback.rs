//! Turns the relying party's callback page into a `FlowOutcome`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::errors::{FlowStep, HarnessError};
use crate::utils::preview;

use super::forms::decode_entities;
use super::types::{FlowFailure, FlowOutcome, TokenSet};

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));

const SUCCESS: &str = "success";
const NAVIGATION_ERROR: &str = "navigation_error";

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    result: String,
    #[serde(default)]
    token: Option<TokenPayload>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_debug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Text content of the page body: JSON is taken as-is, HTML has its tags stripped
pub(crate) fn page_text(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    decode_entities(TAG_RE.replace_all(trimmed, "").trim())
}

/// Parses the callback payload.
///
/// `result == "success"` must come with a `token` object holding a string `access_token`;
/// anything else is a failure. A body that is not JSON at all is a navigation error.
pub(crate) fn parse_callback_payload(body: &str) -> Result<FlowOutcome, HarnessError> {
    let text = page_text(body);
    let payload: CallbackPayload = serde_json::from_str(&text).map_err(|e| HarnessError::Payload {
        step: FlowStep::Callback,
        message: format!("Callback page is not a flow result: {e}"),
        payload: preview(&text, 500),
    })?;

    if payload.result != SUCCESS {
        return Ok(FlowOutcome::Failure(FlowFailure {
            error_code: payload.error.unwrap_or(payload.result),
            error_description: payload
                .error_description
                .or(payload.error_debug)
                .unwrap_or_default(),
            raw_payload: text,
        }));
    }

    let token = payload.token.ok_or_else(|| HarnessError::Payload {
        step: FlowStep::Callback,
        message: "Successful result without a token object".to_string(),
        payload: preview(&text, 500),
    })?;

    Ok(FlowOutcome::Success(TokenSet {
        access_token: token.access_token,
        id_token: token.id_token,
        refresh_token: token.refresh_token,
        raw_payload: text,
    }))
}

/// Failure built from the `error` parameters the authorization server put on a redirect
pub(crate) fn failure_from_url(url: &Url, body: &str) -> Option<FlowFailure> {
    let error = url
        .query_pairs()
        .find(|(k, _)| k == "error")
        .map(|(_, v)| v.into_owned())?;
    let description = url
        .query_pairs()
        .find(|(k, _)| k == "error_description" || k == "error_hint")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();
    Some(FlowFailure {
        error_code: error,
        error_description: description,
        raw_payload: preview(&page_text(body), 500),
    })
}

/// Captures the outcome from the page the flow ended on.
///
/// The callback page normally renders a JSON result. A callback that cannot be read as one is
/// still an outcome (a failure) as long as the flow reached the redirect URI; landing anywhere
/// else is only an outcome when the authorization server reported an error on the URL.
pub(crate) fn capture_outcome(
    redirect_uri: &Url,
    page_url: &Url,
    body: &str,
) -> Result<FlowOutcome, HarnessError> {
    let at_callback = page_url.origin() == redirect_uri.origin()
        && page_url.path() == redirect_uri.path();

    if !at_callback {
        return match failure_from_url(page_url, body) {
            Some(failure) => Ok(FlowOutcome::Failure(failure)),
            None => Err(HarnessError::navigation_with_payload(
                FlowStep::Callback,
                format!("Flow ended on {page_url} instead of the redirect URI {redirect_uri}"),
                preview(body, 500),
            )),
        };
    }

    match parse_callback_payload(body) {
        Ok(outcome) => Ok(outcome),
        Err(HarnessError::Payload { message, payload, .. }) => {
            tracing::warn!("Callback payload could not be parsed: {}", message);
            Ok(FlowOutcome::Failure(failure_from_url(page_url, body).unwrap_or(
                FlowFailure {
                    error_code: NAVIGATION_ERROR.to_string(),
                    error_description: message,
                    raw_payload: payload,
                },
            )))
        }
        Err(e) => Err(e),
    }
}
