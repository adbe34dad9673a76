//! Built-in scenarios covering token issuance, introspection and revocation.

use crate::config::HarnessConfig;
use crate::errors::HarnessError;
use crate::flow::{FlowOptions, FlowVariant};
use crate::registration::ClientRegistration;
use crate::scenario::{Check, Scenario};
use crate::scope::{OFFLINE_ACCESS, OPENID};
use crate::verifier::TokenKind;

/// Consent choices exercised against a client requesting `offline_access openid`
const AUTHORIZE_CODE_GRANTS: [(&str, &[&str]); 4] = [
    ("all", &[OFFLINE_ACCESS, OPENID]),
    ("offline_access", &[OFFLINE_ACCESS]),
    ("openid", &[OPENID]),
    ("none", &[]),
];

/// Every built-in scenario, each with its own freshly generated client secret
pub fn catalog(config: &HarnessConfig) -> Result<Vec<Scenario>, HarnessError> {
    let mut scenarios = authorize_code(config)?;
    scenarios.extend(introspection(config)?);
    scenarios.extend(revocation(config)?);
    Ok(scenarios)
}

pub fn authorize_code(config: &HarnessConfig) -> Result<Vec<Scenario>, HarnessError> {
    let redirect_uri = config.redirect_uri(FlowVariant::OAuth2)?;
    AUTHORIZE_CODE_GRANTS
        .iter()
        .map(|(label, granted)| -> Result<Scenario, HarnessError> {
            let registration = ClientRegistration::new(config.secret_bytes, redirect_uri.as_str())?
                .with_scope("offline_access openid")
                .with_subject_type("public")
                .with_token_endpoint_auth_method("client_secret_basic");
            Ok(Scenario::new(
                format!("authorize_code/{label}"),
                registration,
                FlowOptions::granting(granted.iter().copied()),
                FlowVariant::OAuth2,
            )
            .with_check(Check::TokensMatchGrant))
        })
        .collect()
}

pub fn introspection(config: &HarnessConfig) -> Result<Vec<Scenario>, HarnessError> {
    let redirect_uri = config.redirect_uri(FlowVariant::OAuth2)?;
    [TokenKind::Access, TokenKind::Refresh]
        .into_iter()
        .map(|kind| -> Result<Scenario, HarnessError> {
            let registration = ClientRegistration::new(config.secret_bytes, redirect_uri.as_str())?
                .with_scope(OFFLINE_ACCESS);
            Ok(Scenario::new(
                format!("introspect/{}", kind.path_segment()),
                registration,
                FlowOptions::granting([OFFLINE_ACCESS]),
                FlowVariant::OAuth2,
            )
            .with_check(Check::Introspect(kind)))
        })
        .collect()
}

pub fn revocation(config: &HarnessConfig) -> Result<Vec<Scenario>, HarnessError> {
    let redirect_uri = config.redirect_uri(FlowVariant::OpenId)?;
    [TokenKind::Access, TokenKind::Refresh]
        .into_iter()
        .map(|kind| -> Result<Scenario, HarnessError> {
            let registration = ClientRegistration::new(config.secret_bytes, redirect_uri.as_str())?
                .with_scope("openid offline_access");
            Ok(Scenario::new(
                format!("revoke/{}", kind.path_segment()),
                registration,
                FlowOptions::granting([OPENID, OFFLINE_ACCESS]),
                FlowVariant::OpenId,
            )
            .with_check(Check::RevokeThenUserinfoDenied(kind)))
        })
        .collect()
}
