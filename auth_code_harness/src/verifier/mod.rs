//! Post-flow checks against the relying party's introspection, revocation and userinfo routes.

mod assertions;
mod client;
mod types;

pub use assertions::{
    assert_access_denied, assert_failure, assert_introspection, assert_revoked, assert_success,
    assert_tokens_match_grant,
};
pub use client::OutcomeVerifier;
pub use types::{IntrospectionResult, RevocationResult, TokenKind, UserinfoResponse};
