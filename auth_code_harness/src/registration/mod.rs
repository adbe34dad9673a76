mod client;
mod errors;
mod types;

pub use client::{RegisteredClient, register_client};
pub use errors::RegistrationError;
pub use types::{ClientRegistration, GrantType};
