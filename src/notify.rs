//! Audit notification sink.
//!
//! Call sites hand a payload to the sink and keep using the returned value,
//! so notifying never changes control flow.

use tracing::{debug, info, warn};

/// Well-known audit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyEvent {
    /// Cleartext of an assertion that arrived encrypted.
    DecryptedAssertion,
    /// The first resolution attempt hit a transient network fault.
    ResolveRetry,
    /// Raw body returned by the artifact resolution call.
    ArtifactResponse,
    /// One AuthAccess payload validation message.
    PayloadValidationError,
    /// Joined SAML response validation messages.
    ResponseValidationFailure,
    /// A fatal, classified authentication failure.
    AuthenticationFailure,
    /// The user was authenticated.
    LoginSuccess,
}

impl NotifyEvent {
    /// Event name as emitted to sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyEvent::DecryptedAssertion => "saml.decrypted_assertion",
            NotifyEvent::ResolveRetry => "saml.resolve_retry",
            NotifyEvent::ArtifactResponse => "saml.artifact_response",
            NotifyEvent::PayloadValidationError => "authaccess.validation_error",
            NotifyEvent::ResponseValidationFailure => "saml.validation_failure",
            NotifyEvent::AuthenticationFailure => "saml.authentication_failure",
            NotifyEvent::LoginSuccess => "saml.login_success",
        }
    }
}

impl std::fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification collaborator. Implementations must be callable from
/// concurrent authentication attempts and must return `payload` unchanged.
pub trait Notifier: Send + Sync {
    fn notify<'a>(&self, event: NotifyEvent, payload: &'a str) -> &'a str;
}

/// Default sink: one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify<'a>(&self, event: NotifyEvent, payload: &'a str) -> &'a str {
        match event {
            NotifyEvent::DecryptedAssertion | NotifyEvent::ArtifactResponse => {
                debug!(event = %event, payload = %payload, "SAML audit event");
            }
            NotifyEvent::LoginSuccess => {
                info!(event = %event, user = %payload, "SAML audit event");
            }
            _ => {
                warn!(event = %event, payload = %payload, "SAML audit event");
            }
        }
        payload
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[test]
    fn test_notifier_returns_payload() {
        let notifier = TracingNotifier;
        assert_eq!(notifier.notify(NotifyEvent::LoginSuccess, "S1234567A"), "S1234567A");

        let recorder = RecordingNotifier::default();
        let out = recorder.notify(NotifyEvent::ResolveRetry, "timeout");
        assert_eq!(out, "timeout");
        assert_eq!(recorder.count(NotifyEvent::ResolveRetry), 1);
        assert_eq!(recorder.payloads(NotifyEvent::ResolveRetry), vec!["timeout"]);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(NotifyEvent::DecryptedAssertion.to_string(), "saml.decrypted_assertion");
        assert_eq!(NotifyEvent::LoginSuccess.as_str(), "saml.login_success");
    }
}
