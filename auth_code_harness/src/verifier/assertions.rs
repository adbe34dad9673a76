//! Expectations checked after a flow.
//!
//! Each function returns `HarnessError::Assertion` with the step, the expected and actual values,
//! and the raw payload the values were read from. Token values never appear in the messages.

use crate::errors::{FlowStep, HarnessError};
use crate::flow::{FlowFailure, FlowOutcome, TokenSet};
use crate::scope::{OFFLINE_ACCESS, OPENID, ScopeSet};
use crate::utils::preview;

use super::types::{IntrospectionResult, RevocationResult, TokenKind, UserinfoResponse};

const BEARER: &str = "Bearer";
const REQUEST_UNAUTHORIZED: &str = "request_unauthorized";

fn mismatch(
    step: FlowStep,
    check: impl Into<String>,
    expected: impl Into<String>,
    actual: impl Into<String>,
    raw: &str,
) -> HarnessError {
    HarnessError::assertion(step, check, expected, actual).with_payload(preview(raw, 500))
}

/// The flow succeeded. A failure outcome is returned as `HarnessError::FlowFailure`.
pub fn assert_success(outcome: &FlowOutcome) -> Result<&TokenSet, HarnessError> {
    match outcome {
        FlowOutcome::Success(tokens) => Ok(tokens),
        FlowOutcome::Failure(failure) => Err(HarnessError::FlowFailure(failure.clone())),
    }
}

/// The flow failed, with `expected_error_code` when given
pub fn assert_failure<'o>(
    outcome: &'o FlowOutcome,
    expected_error_code: Option<&str>,
) -> Result<&'o FlowFailure, HarnessError> {
    let failure = match outcome {
        FlowOutcome::Failure(failure) => failure,
        FlowOutcome::Success(tokens) => {
            return Err(mismatch(
                FlowStep::Callback,
                "flow result",
                "failure",
                outcome.summary(),
                &tokens.raw_payload,
            ));
        }
    };

    if let Some(code) = expected_error_code {
        if failure.error_code != code {
            return Err(mismatch(
                FlowStep::Callback,
                "error code",
                code,
                failure.error_code.clone(),
                &failure.raw_payload,
            ));
        }
    }
    Ok(failure)
}

/// Token presence follows the granted scopes: an access token always, an ID token iff
/// `openid` was granted, a refresh token iff `offline_access` was granted
pub fn assert_tokens_match_grant(
    tokens: &TokenSet,
    granted: &ScopeSet,
) -> Result<(), HarnessError> {
    if tokens.access_token.is_empty() {
        return Err(mismatch(
            FlowStep::Callback,
            "access_token presence",
            "non-empty",
            "empty",
            &tokens.raw_payload,
        ));
    }
    check_presence(tokens, "id_token", tokens.id_token.as_deref(), granted.contains(OPENID))?;
    check_presence(
        tokens,
        "refresh_token",
        tokens.refresh_token.as_deref(),
        granted.contains(OFFLINE_ACCESS),
    )
}

fn check_presence(
    tokens: &TokenSet,
    name: &str,
    token: Option<&str>,
    expected: bool,
) -> Result<(), HarnessError> {
    let present = token.is_some_and(|t| !t.is_empty());
    if present == expected {
        return Ok(());
    }
    let describe = |p: bool| if p { "present" } else { "absent" };
    Err(mismatch(
        FlowStep::Callback,
        format!("{name} presence"),
        describe(expected),
        match token {
            Some("") => "empty",
            _ => describe(present),
        },
        &tokens.raw_payload,
    ))
}

/// A freshly issued token introspects as active, owned by `subject`, with the `token_use`
/// matching `kind`
pub fn assert_introspection(
    result: &IntrospectionResult,
    kind: TokenKind,
    subject: &str,
) -> Result<(), HarnessError> {
    if !result.active {
        return Err(mismatch(
            FlowStep::Introspection,
            format!("{kind} active"),
            "true",
            "false",
            &result.raw_payload,
        ));
    }
    let expect_field = |check: String, expected: &str, actual: Option<&str>| match actual {
        Some(value) if value == expected => Ok(()),
        actual => Err(mismatch(
            FlowStep::Introspection,
            check,
            expected,
            actual.unwrap_or("missing"),
            &result.raw_payload,
        )),
    };
    expect_field(format!("{kind} sub"), subject, result.sub.as_deref())?;
    expect_field(
        format!("{kind} token_type"),
        BEARER,
        result.token_type.as_deref(),
    )?;
    expect_field(
        format!("{kind} token_use"),
        kind.token_use(),
        result.token_use.as_deref(),
    )
}

pub fn assert_revoked(result: &RevocationResult) -> Result<(), HarnessError> {
    if result.result == "success" {
        Ok(())
    } else {
        Err(mismatch(
            FlowStep::Revocation,
            "revocation result",
            "success",
            result.result.clone(),
            &result.raw_payload,
        ))
    }
}

/// Userinfo refused the session's access token with `request_unauthorized`
pub fn assert_access_denied(userinfo: &UserinfoResponse) -> Result<(), HarnessError> {
    let actual = match userinfo {
        UserinfoResponse::Denied { error, .. } if error.contains(REQUEST_UNAUTHORIZED) => {
            return Ok(());
        }
        UserinfoResponse::Denied { status, error, .. } => {
            format!("status {status}, error '{error}'")
        }
        UserinfoResponse::Authorized(_) => "authorized".to_string(),
    };
    Err(mismatch(
        FlowStep::Userinfo,
        "userinfo after revocation",
        REQUEST_UNAUTHORIZED,
        actual,
        &userinfo.raw_payload(),
    ))
}
