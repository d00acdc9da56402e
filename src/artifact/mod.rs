//! SAML artifact binding: inbound request, back-channel resolution and
//! the login orchestration built on top of them.

pub mod orchestrator;
pub mod request;
pub mod resolver;

pub use orchestrator::{ArtifactOrchestrator, Authentication};
pub use request::ArtifactRequest;
pub use resolver::{ArtifactResolver, ArtifactResponse, HttpArtifactResolver, ResolveFault};
