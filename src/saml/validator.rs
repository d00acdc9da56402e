//! SAML response validation.
//!
//! Re-checks the trust and freshness facts the protocol library does not
//! guarantee, and derives the embedded AuthAccess payload. Every check runs
//! on every validation; failures accumulate.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::CorppassConfig;
use super::decrypt::AssertionDecryptor;
use super::types::{Assertion, SamlResponse};
use crate::authaccess::payload::join_messages;
use crate::authaccess::{AuthAccess, EntityStatus, PayloadError};
use crate::error::{Error, Result};
use crate::notify::{Notifier, NotifyEvent};

/// A single response validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Reported by the protocol layer while parsing or decrypting.
    #[error("{0}")]
    Library(String),

    #[error("The destination was {destination}, but the ACS is at {acs}")]
    Destination { destination: String, acs: String },

    #[error("The response issuer was {issuer}, but the IdP is {expected}")]
    ResponseIssuer { issuer: String, expected: String },

    #[error("The status code of the Response was not Success, was {status_xml}")]
    Status { status_xml: String },

    #[error("More than one assertions found: {0}")]
    MultipleAssertions(usize),

    #[error("The assertion issuer was {issuer}, but the IdP is {expected}")]
    AssertionIssuer { issuer: String, expected: String },

    #[error("{label}: time now is {now}, and is before {not_before}")]
    NotYetValid {
        label: &'static str,
        now: DateTime<Utc>,
        not_before: DateTime<Utc>,
    },

    #[error("{label}: time now is {now}, and is on or after {not_on_or_after}")]
    Expired {
        label: &'static str,
        now: DateTime<Utc>,
        not_on_or_after: DateTime<Utc>,
    },

    #[error("{sp_entity} is not a valid audience for this Response - Valid audiences: {audiences}")]
    Audience { sp_entity: String, audiences: String },

    #[error("A valid SubjectConfirmation was not found on this Response")]
    NoValidSubjectConfirmation,

    #[error("The NameID of the Response is missing")]
    MissingNameId,

    #[error(
        "The NameID {name_id} does not match the AuthAccess UserID {}",
        .user_id.as_deref().unwrap_or("(missing)")
    )]
    NameIdMismatch {
        name_id: String,
        user_id: Option<String>,
    },

    #[error("The Response carries no AuthAccess attribute")]
    MissingPayload,

    #[error("AuthAccess: {0}")]
    Payload(PayloadError),
}

/// Which kind of entitlement the assertion carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementKind {
    /// One AuthAccess attribute for the user's own entity.
    Single,
    /// Additional attributes granted through a third-party entity.
    ThirdParty,
}

/// Identity handed to the authentication framework after a successful
/// login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub login_id: Option<String>,
    pub account_type: Option<String>,
    pub entity_id: Option<String>,
    pub entity_status: Option<EntityStatus>,
    pub is_sp_holder: bool,
    pub eservice_id: Option<String>,
    pub roles: Vec<String>,
}

/// Validation context for one SAML response.
///
/// Construction decrypts any encrypted assertions in place. Validation is
/// idempotent: the first call fixes the report.
pub struct ResponseValidator {
    response: SamlResponse,
    config: Arc<CorppassConfig>,
    notifier: Arc<dyn Notifier>,
    name_id: Option<String>,
    auth_access: Option<AuthAccess>,
    report: OnceLock<Vec<ResponseError>>,
}

impl ResponseValidator {
    pub fn new(
        mut response: SamlResponse,
        config: Arc<CorppassConfig>,
        decryptor: &dyn AssertionDecryptor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let encrypted = std::mem::take(&mut response.encrypted_assertions);
        for assertion in &encrypted {
            match decryptor.decrypt_assertion(assertion) {
                Ok(xml) => {
                    let xml = notifier.notify(NotifyEvent::DecryptedAssertion, &xml);
                    if let Err(e) = response.push_assertion_xml(xml) {
                        response
                            .library_errors
                            .push(format!("Decrypted assertion could not be read: {}", e));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to decrypt assertion");
                    response
                        .library_errors
                        .push(format!("Failed to decrypt assertion: {}", e));
                }
            }
        }

        let name_id = derive_name_id(response.first_assertion(), decryptor);

        let payload = response
            .first_assertion()
            .and_then(|a| a.attributes.first())
            .and_then(|attr| attr.values.first())
            .map(|value| decode_payload(value));
        let auth_access = match payload {
            Some(Ok(xml)) => Some(AuthAccess::new(xml).with_notifier(notifier.clone())),
            Some(Err(e)) => {
                response.library_errors.push(e);
                None
            }
            None => None,
        };

        Self {
            response,
            config,
            notifier,
            name_id,
            auth_access,
            report: OnceLock::new(),
        }
    }

    /// Validate against the current time.
    pub fn validate(&self) -> bool {
        self.validate_at(Utc::now())
    }

    /// Validate against `now`. Only the first validation call runs the
    /// checks; later calls return the cached outcome.
    pub fn validate_at(&self, now: DateTime<Utc>) -> bool {
        self.report.get_or_init(|| self.run_checks(now)).is_empty()
    }

    /// Validation failures, validating against the current time first if
    /// no validation has run yet.
    pub fn errors(&self) -> &[ResponseError] {
        self.report.get_or_init(|| self.run_checks(Utc::now()))
    }

    pub fn error_messages(&self) -> String {
        join_messages(self.errors())
    }

    /// Fail with [`Error::ResponseValidationFailure`] unless valid.
    pub fn assert_valid(&self) -> Result<()> {
        if self.errors().is_empty() {
            return Ok(());
        }
        Err(Error::ResponseValidationFailure {
            messages: self.error_messages(),
            raw_xml: self.response.raw_xml.clone(),
        })
    }

    /// Whether the protocol status is Success. Has no side effects; the
    /// status check itself is recorded by validation.
    pub fn success(&self) -> bool {
        self.response.status.is_success()
    }

    pub fn response(&self) -> &SamlResponse {
        &self.response
    }

    pub fn raw_xml(&self) -> &str {
        &self.response.raw_xml
    }

    /// The subject NameID, decrypted from an EncryptedID when necessary.
    pub fn name_id(&self) -> Option<&str> {
        self.name_id.as_deref()
    }

    /// The AuthAccess payload from the first attribute.
    pub fn auth_access(&self) -> Option<&AuthAccess> {
        self.auth_access.as_ref()
    }

    pub fn is_third_party(&self) -> bool {
        self.response
            .first_assertion()
            .map_or(false, |a| a.attributes.len() > 1)
    }

    pub fn entitlement_kind(&self) -> EntitlementKind {
        if self.is_third_party() {
            EntitlementKind::ThirdParty
        } else {
            EntitlementKind::Single
        }
    }

    /// Third-party entitlement payloads are detected but not supported.
    pub fn third_party_auth_access(&self) -> Result<Vec<AuthAccess>> {
        Err(Error::NotImplemented("third-party AuthAccess entitlements"))
    }

    /// Identity summary, available once the response validated.
    pub fn user(&self) -> Option<AuthenticatedUser> {
        if !self.errors().is_empty() {
            return None;
        }
        let payload = self.auth_access.as_ref()?;
        let eservice_id = self.config.eservice_id.clone();
        let roles = eservice_id
            .as_deref()
            .map(|id| payload.roles(id).into_iter().map(str::to_string).collect())
            .unwrap_or_default();

        Some(AuthenticatedUser {
            user_id: self.name_id.clone()?,
            login_id: payload.login_id().map(str::to_string),
            account_type: payload.account_type().map(str::to_string),
            entity_id: payload.entity_id().map(str::to_string),
            entity_status: payload.entity_status(),
            is_sp_holder: payload.is_sp_holder(),
            eservice_id,
            roles,
        })
    }

    fn run_checks(&self, now: DateTime<Utc>) -> Vec<ResponseError> {
        let mut errors: Vec<ResponseError> = self
            .response
            .library_errors
            .iter()
            .cloned()
            .map(ResponseError::Library)
            .collect();

        self.check_destination(&mut errors);
        self.check_response_issuer(&mut errors);
        self.check_success(&mut errors);
        self.check_assertion_count(&mut errors);

        let assertion = self.response.first_assertion();
        self.check_assertion_issuer(assertion, &mut errors);
        if let Some(conditions) = assertion.and_then(|a| a.conditions.as_ref()) {
            check_window(
                "Conditions",
                now,
                conditions.not_before,
                conditions.not_on_or_after,
                &mut errors,
            );
        }
        self.check_audience(assertion, &mut errors);
        self.check_subject_confirmation(assertion, now, &mut errors);
        self.check_name_id(&mut errors);
        self.check_payload(&mut errors);

        if errors.is_empty() {
            debug!(response_id = ?self.response.id, "SAML response validated");
        } else {
            let messages = join_messages(&errors);
            self.notifier
                .notify(NotifyEvent::ResponseValidationFailure, &messages);
        }
        errors
    }

    fn check_destination(&self, errors: &mut Vec<ResponseError>) {
        let acs = &self.config.assertion_consumer_service_url;
        if let Some(ref destination) = self.response.destination {
            if destination != acs {
                errors.push(ResponseError::Destination {
                    destination: destination.clone(),
                    acs: acs.clone(),
                });
            }
        }
    }

    fn check_response_issuer(&self, errors: &mut Vec<ResponseError>) {
        if let Some(ref issuer) = self.response.issuer {
            if issuer != &self.config.idp_entity {
                errors.push(ResponseError::ResponseIssuer {
                    issuer: issuer.clone(),
                    expected: self.config.idp_entity.clone(),
                });
            }
        }
    }

    fn check_success(&self, errors: &mut Vec<ResponseError>) {
        if !self.success() {
            errors.push(ResponseError::Status {
                status_xml: self.response.status.to_xml(),
            });
        }
    }

    fn check_assertion_count(&self, errors: &mut Vec<ResponseError>) {
        let count = self.response.assertions.len();
        if count > 1 {
            errors.push(ResponseError::MultipleAssertions(count));
        }
    }

    fn check_assertion_issuer(&self, assertion: Option<&Assertion>, errors: &mut Vec<ResponseError>) {
        if let Some(issuer) = assertion.and_then(|a| a.issuer.as_ref()) {
            if issuer != &self.config.idp_entity {
                errors.push(ResponseError::AssertionIssuer {
                    issuer: issuer.clone(),
                    expected: self.config.idp_entity.clone(),
                });
            }
        }
    }

    fn check_audience(&self, assertion: Option<&Assertion>, errors: &mut Vec<ResponseError>) {
        let audiences = assertion
            .and_then(|a| a.conditions.as_ref())
            .and_then(|c| c.audiences.as_ref());
        if let Some(audiences) = audiences {
            if !audiences.iter().any(|a| a == &self.config.sp_entity) {
                errors.push(ResponseError::Audience {
                    sp_entity: self.config.sp_entity.clone(),
                    audiences: audiences.join(", "),
                });
            }
        }
    }

    /// At least one bearer confirmation must name our ACS as recipient and
    /// still be fresh. IdP-initiated, so there is no InResponseTo.
    fn check_subject_confirmation(
        &self,
        assertion: Option<&Assertion>,
        now: DateTime<Utc>,
        errors: &mut Vec<ResponseError>,
    ) {
        let acs = &self.config.assertion_consumer_service_url;
        let confirmations = assertion
            .and_then(|a| a.subject.as_ref())
            .map(|s| s.confirmations.as_slice())
            .unwrap_or_default();

        let found = confirmations
            .iter()
            .filter(|c| c.is_bearer())
            .enumerate()
            .any(|(index, confirmation)| {
                if confirmation.recipient.as_deref() != Some(acs.as_str()) {
                    debug!(
                        index,
                        recipient = ?confirmation.recipient,
                        "SubjectConfirmation rejected: recipient mismatch"
                    );
                    return false;
                }
                let mut rejected = Vec::new();
                if !check_window(
                    "SubjectConfirmationData",
                    now,
                    None,
                    confirmation.not_on_or_after,
                    &mut rejected,
                ) {
                    debug!(
                        index,
                        reason = %join_messages(&rejected),
                        "SubjectConfirmation rejected: expired"
                    );
                    return false;
                }
                true
            });

        if !found {
            errors.push(ResponseError::NoValidSubjectConfirmation);
        }
    }

    fn check_name_id(&self, errors: &mut Vec<ResponseError>) {
        let Some(ref name_id) = self.name_id else {
            errors.push(ResponseError::MissingNameId);
            return;
        };
        let user_id = self.auth_access.as_ref().and_then(|p| p.user_id());
        if user_id != Some(name_id.as_str()) {
            errors.push(ResponseError::NameIdMismatch {
                name_id: name_id.clone(),
                user_id: user_id.map(str::to_string),
            });
        }
    }

    fn check_payload(&self, errors: &mut Vec<ResponseError>) {
        match self.auth_access {
            Some(ref payload) => {
                errors.extend(payload.errors().iter().cloned().map(ResponseError::Payload));
            }
            None => errors.push(ResponseError::MissingPayload),
        }
    }
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("response_id", &self.response.id)
            .field("name_id", &self.name_id)
            .field("report", &self.report.get())
            .finish()
    }
}

/// Apply the `NotBefore` / `NotOnOrAfter` rule. Each bound is checked on
/// its own, so both may fail at once. Returns whether both passed.
pub fn check_window(
    label: &'static str,
    now: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
    errors: &mut Vec<ResponseError>,
) -> bool {
    let mut valid = true;
    if let Some(not_before) = not_before {
        if now < not_before {
            errors.push(ResponseError::NotYetValid {
                label,
                now,
                not_before,
            });
            valid = false;
        }
    }
    if let Some(not_on_or_after) = not_on_or_after {
        if now >= not_on_or_after {
            errors.push(ResponseError::Expired {
                label,
                now,
                not_on_or_after,
            });
            valid = false;
        }
    }
    valid
}

/// AuthAccess arrives as XML (escaped or inline) or Base64 encoded.
fn decode_payload(value: &str) -> std::result::Result<String, String> {
    let value = value.trim();
    if value.starts_with('<') {
        return Ok(value.to_string());
    }
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| format!("AuthAccess attribute is neither XML nor valid Base64: {}", e))?;
    String::from_utf8(bytes)
        .map_err(|e| format!("Decoded AuthAccess attribute is not valid UTF-8: {}", e))
}

fn derive_name_id(assertion: Option<&Assertion>, decryptor: &dyn AssertionDecryptor) -> Option<String> {
    let subject = assertion?.subject.as_ref()?;
    if let Some(ref name_id) = subject.name_id {
        return Some(name_id.value.clone());
    }
    let encrypted = subject.encrypted_id.as_ref()?;
    match decryptor.decrypt_encrypted_id(encrypted) {
        Ok(name_id) => Some(name_id.value),
        Err(e) => {
            warn!(error = %e, "Failed to decrypt EncryptedID, NameID unavailable");
            None
        }
    }
}
