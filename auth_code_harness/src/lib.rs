//! auth-code-harness - End-to-end driver for the OAuth 2.0 / OpenID Connect authorization code flow
//!
//! This crate registers a client, walks the authorization request through the login and consent
//! pages like a browser would, captures the result rendered by the relying party's callback, and
//! verifies the token set plus follow-up introspection, revocation and userinfo calls.

mod browser;
mod catalog;
mod config;
mod errors;
mod flow;
mod registration;
mod scenario;
mod scope;
mod utils;
mod verifier;

pub use browser::{Browser, Landing, Page, RawResponse};

pub use catalog::{authorize_code, catalog, introspection, revocation};

pub use config::{
    DEFAULT_LOGIN_PASSWORD, DEFAULT_LOGIN_USERNAME, DEFAULT_MAX_REDIRECTS, DEFAULT_STEP_TIMEOUT,
    HarnessConfig, LoginCredentials,
};

pub use errors::{FlowStep, HarnessError};

pub use flow::forms::{FieldKind, FormField, FormMethod, HtmlForm, PageKind, parse_forms};
pub use flow::{
    ConsentOptions, FlowDriver, FlowFailure, FlowOptions, FlowOutcome, FlowVariant, LoginOptions,
    TokenSet,
};

pub use registration::{
    ClientRegistration, GrantType, RegisteredClient, RegistrationError, register_client,
};

pub use scenario::{Check, Harness, Scenario, ScenarioReport, SuiteReport};

pub use scope::{OFFLINE_ACCESS, OPENID, ScopeSet};

pub use utils::{CLIENT_SECRET_BYTES, UtilError, gen_random_string, generate_client_secret};

pub use verifier::{
    IntrospectionResult, OutcomeVerifier, RevocationResult, TokenKind, UserinfoResponse,
    assert_access_denied, assert_failure, assert_introspection, assert_revoked, assert_success,
    assert_tokens_match_grant,
};
