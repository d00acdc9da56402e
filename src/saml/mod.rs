//! SAML service provider module.
//!
//! Reads resolved responses, validates them against the SP configuration,
//! and builds the redirect URLs for login and logout.

pub mod config;
pub mod decrypt;
pub mod parse;
pub mod provider;
pub mod types;
pub mod validator;

pub use config::{CorppassConfig, ProxyConfig};
pub use decrypt::{
    decryptor_from_config, decryptor_with_backend, AssertionDecryptor, NoDecryption,
};
pub use provider::ServiceProvider;
pub use types::{Assertion, SamlResponse, Status};
pub use validator::{AuthenticatedUser, EntitlementKind, ResponseError, ResponseValidator};
