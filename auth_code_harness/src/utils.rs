use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::SecureRandom;
use thiserror::Error;

/// Number of random bytes behind a generated client secret (256 bits of entropy).
pub const CLIENT_SECRET_BYTES: usize = 32;

/// Number of random bytes behind the `state` parameter of an authorization request.
pub(crate) const STATE_BYTES: usize = 16;

pub(crate) fn base64url_encode(input: Vec<u8>) -> Result<String, UtilError> {
    Ok(URL_SAFE_NO_PAD.encode(input))
}

/// Generates `len` bytes from the system CSPRNG and returns them base64url-encoded
/// without padding, so the output only contains `[A-Za-z0-9_-]` and is
/// `ceil(len * 4 / 3)` characters long.
pub fn gen_random_string(len: usize) -> Result<String, UtilError> {
    if len == 0 {
        return Err(UtilError::Format(
            "Random string length must be non-zero".to_string(),
        ));
    }
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    let encoded = base64url_encode(bytes)
        .map_err(|_| UtilError::Crypto("Failed to encode random string".to_string()))?;
    Ok(encoded)
}

/// Fresh client secret for a scenario-scoped client registration.
pub fn generate_client_secret(len: usize) -> Result<String, UtilError> {
    gen_random_string(len)
}

/// Cuts long collaborator payloads down for log lines and error messages.
pub(crate) fn preview(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid format: {0}")]
    Format(String),
}
