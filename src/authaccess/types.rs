//! AuthAccess entitlement types.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Root element name of an AuthAccess document.
pub const AUTH_ACCESS_ROOT: &str = "AuthAccess";

/// Date format used by every date field in the payload.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Registration status of the entity the user acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityStatus {
    Active,
    Suspend,
    Terminate,
}

impl EntityStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(EntityStatus::Active),
            "Suspend" => Some(EntityStatus::Suspend),
            "Terminate" => Some(EntityStatus::Terminate),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityStatus::Active => write!(f, "Active"),
            EntityStatus::Suspend => write!(f, "Suspend"),
            EntityStatus::Terminate => write!(f, "Terminate"),
        }
    }
}

/// Free-form name/value pair attached to an authorization row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// One authorization granted to the user for an e-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRow {
    /// Sub-entity the authorization applies to.
    pub entity_id_sub: Option<String>,
    /// Role name within the e-service.
    pub role: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub parameters: Vec<Parameter>,
}

impl AuthRow {
    /// Look up a parameter value by name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Authorizations for a single e-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EserviceResult {
    pub eservice_id: Option<String>,
    /// `Row_Count` as declared by the document.
    pub declared_row_count: Option<u32>,
    /// Rows actually present, in document order.
    pub auth_result_set: Vec<AuthRow>,
}

/// A single AuthAccess validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("AuthAccess is not well-formed XML: {0}")]
    Malformed(String),

    #[error("AuthAccess does not conform to the schema: {0}")]
    Schema(String),

    #[error("Root element was {found}, expected AuthAccess")]
    RootElement { found: String },

    #[error(
        "Entity status {} is not one of Active, Suspend, Terminate",
        .0.as_deref().unwrap_or("(missing)")
    )]
    EntityStatus(Option<String>),

    #[error(
        "Expected exactly one e-service result, found {found} with declared count {}",
        .declared.as_deref().unwrap_or("(missing)")
    )]
    EserviceCardinality {
        found: usize,
        declared: Option<String>,
    },

    #[error(
        "E-service {} declares Row_Count {declared} but contains {actual} rows",
        .eservice_id.as_deref().unwrap_or("(unnamed)")
    )]
    RowCountMismatch {
        eservice_id: Option<String>,
        declared: String,
        actual: usize,
    },

    #[error("{field} value {value} is not a valid YYYY-MM-DD date")]
    InvalidDate { field: &'static str, value: String },
}
