use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Caught before anything was sent
    #[error("Invalid registration request: {0}")]
    InvalidRequest(String),

    /// The registration endpoint refused the payload
    #[error("Registration rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The registration endpoint accepted the payload but its answer is unusable
    #[error("Invalid registration response: {0}")]
    InvalidResponse(String),
}
