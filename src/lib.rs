//! CorpPass SAML artifact service provider.
//!
//! Resolves SAML artifacts against the IdP, validates the returned response
//! and the AuthAccess entitlement payload it carries, and hands back the
//! authenticated user.

pub mod artifact;
pub mod authaccess;
pub mod error;
pub mod notify;
pub mod saml;

pub use artifact::{ArtifactOrchestrator, ArtifactRequest, Authentication, HttpArtifactResolver};
pub use authaccess::AuthAccess;
pub use error::{Error, NetworkFaultKind, Result};
pub use notify::{Notifier, NotifyEvent, TracingNotifier};
pub use saml::{AuthenticatedUser, CorppassConfig, ResponseValidator, ServiceProvider};
