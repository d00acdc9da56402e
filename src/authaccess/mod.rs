//! AuthAccess entitlement payload.
//!
//! The IdP embeds an AuthAccess document in the first assertion attribute.
//! It describes the entity the user acts for and the roles granted per
//! e-service.

pub mod payload;
pub mod schema;
pub mod types;

pub use payload::AuthAccess;
pub use schema::{AuthAccessSchema, SchemaValidator};
pub use types::{AuthRow, EntityStatus, EserviceResult, Parameter, PayloadError};
