//! Error types for the auth-code-harness crate

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::flow::FlowFailure;
use crate::registration::RegistrationError;
use crate::utils::UtilError;

/// The step of a scenario an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStep {
    Registration,
    Authorization,
    Login,
    Consent,
    Callback,
    Introspection,
    Revocation,
    Userinfo,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authorization => "authorization",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::Callback => "callback",
            Self::Introspection => "introspection",
            Self::Revocation => "revocation",
            Self::Userinfo => "userinfo",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while driving or verifying a scenario
///
/// Every variant is fatal to the scenario it occurred in. Nothing is retried.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The registration collaborator rejected the client
    #[error("Registration error: {0}")]
    Registration(RegistrationError),

    /// A page transition or request did not complete
    #[error("Navigation failed during {step}: {message}")]
    Navigation {
        step: FlowStep,
        message: String,
        payload: Option<String>,
    },

    /// A step exceeded its bounded wait
    #[error("Timed out during {step} after {after:?}")]
    Timeout { step: FlowStep, after: Duration },

    /// A collaborator answered with a payload that does not match its schema
    #[error("Malformed payload during {step}: {message} (payload: {payload})")]
    Payload {
        step: FlowStep,
        message: String,
        payload: String,
    },

    /// The callback reported a non-success result
    #[error("Flow failed: {0}")]
    FlowFailure(FlowFailure),

    /// A post-flow expectation did not hold
    #[error("Assertion failed during {step} ({check}): expected {expected}, got {actual}")]
    Assertion {
        step: FlowStep,
        check: String,
        expected: String,
        actual: String,
        payload: Option<String>,
    },

    /// Error from utils operations
    #[error("Utils error: {0}")]
    Utils(UtilError),
}

impl HarnessError {
    /// The step this error is attributed to, when it has one
    pub fn step(&self) -> Option<FlowStep> {
        match self {
            Self::Registration(_) => Some(FlowStep::Registration),
            Self::Navigation { step, .. }
            | Self::Timeout { step, .. }
            | Self::Payload { step, .. }
            | Self::Assertion { step, .. } => Some(*step),
            Self::FlowFailure(_) => Some(FlowStep::Callback),
            Self::Config(_) | Self::Utils(_) => None,
        }
    }

    /// Raw collaborator payload observed when the error happened, if any
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Navigation { payload, .. } | Self::Assertion { payload, .. } => {
                payload.as_deref()
            }
            Self::Payload { payload, .. } => Some(payload),
            Self::FlowFailure(failure) => Some(&failure.raw_payload),
            Self::Registration(RegistrationError::Rejected { body, .. }) => Some(body),
            _ => None,
        }
    }

    pub(crate) fn navigation(step: FlowStep, message: impl Into<String>) -> Self {
        Self::Navigation {
            step,
            message: message.into(),
            payload: None,
        }
    }

    pub(crate) fn navigation_with_payload(
        step: FlowStep,
        message: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::Navigation {
            step,
            message: message.into(),
            payload: Some(payload.into()),
        }
    }

    pub(crate) fn assertion(
        step: FlowStep,
        check: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Assertion {
            step,
            check: check.into(),
            expected: expected.into(),
            actual: actual.into(),
            payload: None,
        }
    }

    /// Attaches the raw payload to a navigation or assertion error
    pub(crate) fn with_payload(mut self, raw: impl Into<String>) -> Self {
        if let Self::Navigation { payload, .. } | Self::Assertion { payload, .. } = &mut self {
            *payload = Some(raw.into());
        }
        self
    }

    /// Log the error and return self
    pub fn log(self) -> Self {
        match &self {
            Self::Config(msg) => tracing::error!("Configuration error: {}", msg),
            Self::Registration(err) => tracing::error!("Registration error: {}", err),
            Self::Navigation {
                step,
                message,
                payload,
            } => tracing::error!(
                "Navigation failed during {}: {} (payload: {:?})",
                step,
                message,
                payload
            ),
            Self::Timeout { step, after } => {
                tracing::error!("Timed out during {} after {:?}", step, after)
            }
            Self::Payload {
                step,
                message,
                payload,
            } => tracing::error!(
                "Malformed payload during {}: {} (payload: {})",
                step,
                message,
                payload
            ),
            Self::FlowFailure(failure) => tracing::error!("Flow failed: {}", failure),
            Self::Assertion {
                step,
                check,
                expected,
                actual,
                payload,
            } => tracing::error!(
                "Assertion failed during {} ({}): expected {}, got {} (payload: {:?})",
                step,
                check,
                expected,
                actual,
                payload
            ),
            Self::Utils(err) => tracing::error!("Utils error: {}", err),
        }
        self
    }
}

// Conversions stay silent; the scenario runner logs each error once through `log()`.
impl From<RegistrationError> for HarnessError {
    fn from(err: RegistrationError) -> Self {
        Self::Registration(err)
    }
}

impl From<UtilError> for HarnessError {
    fn from(err: UtilError) -> Self {
        Self::Utils(err)
    }
}
