//! Drives the authorization code flow through login and consent to the callback.

pub(crate) mod callback;
mod driver;
pub mod forms;
mod types;

pub use driver::FlowDriver;
pub use types::{
    ConsentOptions, FlowFailure, FlowOptions, FlowOutcome, FlowVariant, LoginOptions, TokenSet,
};
