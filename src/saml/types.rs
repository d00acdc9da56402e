//! SAML protocol objects as handed over by the protocol layer.
//!
//! These carry only the facts the response validator checks. Signature
//! verification and decryption happen before (or through) this model.

use chrono::{DateTime, Utc};

/// Top-level status code for a successful response.
pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Subject confirmation method for bearer assertions.
pub const BEARER_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// Protocol-level status of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: String,
    pub sub_code: Option<String>,
    pub message: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: STATUS_SUCCESS.to_string(),
            sub_code: None,
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }

    /// Serialized `<samlp:Status>` block, used in diagnostics.
    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<samlp:Status><samlp:StatusCode Value="{}""#,
            escape_attr(&self.code)
        );
        match self.sub_code {
            Some(ref sub) => xml.push_str(&format!(
                r#"><samlp:StatusCode Value="{}"/></samlp:StatusCode>"#,
                escape_attr(sub)
            )),
            None => xml.push_str("/>"),
        }
        if let Some(ref message) = self.message {
            xml.push_str(&format!(
                "<samlp:StatusMessage>{}</samlp:StatusMessage>",
                escape_text(message)
            ));
        }
        xml.push_str("</samlp:Status>");
        xml
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// A subject name identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    pub value: String,
    pub format: Option<String>,
}

/// Opaque `<saml:EncryptedID>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedId {
    pub xml: String,
}

/// Opaque `<saml:EncryptedAssertion>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAssertion {
    pub xml: String,
}

/// A `<saml:SubjectConfirmation>` with its confirmation data flattened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubjectConfirmation {
    pub method: Option<String>,
    pub recipient: Option<String>,
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl SubjectConfirmation {
    pub fn is_bearer(&self) -> bool {
        self.method.as_deref() == Some(BEARER_METHOD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subject {
    pub name_id: Option<NameId>,
    pub encrypted_id: Option<EncryptedId>,
    pub confirmations: Vec<SubjectConfirmation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conditions {
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Audiences across every `<saml:AudienceRestriction>`. `None` when no
    /// restriction is declared.
    pub audiences: Option<Vec<String>>,
}

/// An attribute with its (already decoded) text values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute {
    pub name: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assertion {
    pub id: Option<String>,
    pub issuer: Option<String>,
    pub subject: Option<Subject>,
    pub conditions: Option<Conditions>,
    pub attributes: Vec<Attribute>,
}

/// A parsed `<samlp:Response>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamlResponse {
    pub id: Option<String>,
    pub destination: Option<String>,
    pub issuer: Option<String>,
    pub status: Status,
    pub assertions: Vec<Assertion>,
    pub encrypted_assertions: Vec<EncryptedAssertion>,
    /// Structural problems found by the protocol layer while parsing.
    pub library_errors: Vec<String>,
    /// The response as received, for diagnostics.
    pub raw_xml: String,
}

impl SamlResponse {
    pub fn first_assertion(&self) -> Option<&Assertion> {
        self.assertions.first()
    }
}

pub(crate) fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Escape character data for inclusion in generated XML.
pub(crate) fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_xml() {
        assert_eq!(
            Status::success().to_xml(),
            r#"<samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>"#
        );

        let status = Status {
            code: "urn:oasis:names:tc:SAML:2.0:status:Responder".to_string(),
            sub_code: Some("urn:oasis:names:tc:SAML:2.0:status:AuthnFailed".to_string()),
            message: Some("User <cancelled>".to_string()),
        };
        let xml = status.to_xml();
        assert!(!status.is_success());
        assert!(xml.contains(r#"<samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:AuthnFailed"/></samlp:StatusCode>"#));
        assert!(xml.contains("<samlp:StatusMessage>User &lt;cancelled&gt;</samlp:StatusMessage>"));
    }

    #[test]
    fn test_bearer_confirmation() {
        let confirmation = SubjectConfirmation {
            method: Some(BEARER_METHOD.to_string()),
            ..Default::default()
        };
        assert!(confirmation.is_bearer());
        assert!(!SubjectConfirmation::default().is_bearer());
    }
}
