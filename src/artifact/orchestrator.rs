//! Artifact-to-identity orchestration.
//!
//! One call per login attempt: resolve the artifact (retrying once on a
//! transient network fault), validate the response and its AuthAccess
//! payload, and hand back the authenticated user.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::request::ArtifactRequest;
use super::resolver::{ArtifactResolver, ArtifactResponse, ResolveFault};
use crate::error::{Error, Result};
use crate::notify::{Notifier, NotifyEvent, TracingNotifier};
use crate::saml::config::CorppassConfig;
use crate::saml::decrypt::{decryptor_from_config, AssertionDecryptor, NoDecryption};
use crate::saml::validator::{AuthenticatedUser, ResponseValidator};

/// A completed login.
#[derive(Debug)]
pub struct Authentication {
    pub user: AuthenticatedUser,
    /// The validated response, kept for auditing.
    pub response: ResponseValidator,
    pub relay_state: Option<String>,
}

/// Wires the resolver, decryptor and notifier together for one SP.
pub struct ArtifactOrchestrator {
    config: Arc<CorppassConfig>,
    resolver: Arc<dyn ArtifactResolver>,
    decryptor: Arc<dyn AssertionDecryptor>,
    notifier: Arc<dyn Notifier>,
}

impl ArtifactOrchestrator {
    pub fn new(config: Arc<CorppassConfig>, resolver: Arc<dyn ArtifactResolver>) -> Self {
        Self {
            config,
            resolver,
            decryptor: Arc::new(NoDecryption),
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Orchestrator whose decryptor follows the configuration. Fails when a
    /// decryption key is configured but no backend can use it.
    pub fn from_config(
        config: Arc<CorppassConfig>,
        resolver: Arc<dyn ArtifactResolver>,
    ) -> Result<Self> {
        let decryptor = decryptor_from_config(&config)?;
        Ok(Self::new(config, resolver).with_decryptor(decryptor))
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn AssertionDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Resolve and validate against the current time.
    pub async fn resolve_artifact(&self, request: &ArtifactRequest) -> Result<Authentication> {
        self.resolve_artifact_at(request, Utc::now()).await
    }

    pub async fn resolve_artifact_at(
        &self,
        request: &ArtifactRequest,
        now: DateTime<Utc>,
    ) -> Result<Authentication> {
        let resolved = match self.resolve_with_retry(request).await {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(ref raw) = resolved.raw_xml {
            self.notifier.notify(NotifyEvent::ArtifactResponse, raw);
        }

        let response = match resolved {
            ArtifactResponse {
                success: true,
                response: Some(response),
                ..
            } => response,
            ArtifactResponse { raw_xml, .. } => {
                return Err(self.fail(Error::ArtifactResolutionFailure {
                    raw_response: raw_xml,
                }));
            }
        };

        let validator = ResponseValidator::new(
            response,
            self.config.clone(),
            self.decryptor.as_ref(),
            self.notifier.clone(),
        );
        validator.validate_at(now);
        if let Err(e) = validator.assert_valid() {
            return Err(self.fail(e));
        }

        let Some(user) = validator.user() else {
            return Err(self.fail(Error::ResponseValidationFailure {
                messages: "Validated response carries no identity".to_string(),
                raw_xml: validator.raw_xml().to_string(),
            }));
        };

        info!(
            user_id = %user.user_id,
            entity_id = ?user.entity_id,
            roles = user.roles.len(),
            "CorpPass login succeeded"
        );
        self.notifier.notify(NotifyEvent::LoginSuccess, &user.user_id);

        Ok(Authentication {
            user,
            response: validator,
            relay_state: request.relay_state.clone(),
        })
    }

    async fn resolve_with_retry(&self, request: &ArtifactRequest) -> Result<ArtifactResponse> {
        let mut retried = false;
        loop {
            match self.resolver.resolve(request).await {
                Ok(resolved) => return Ok(resolved),
                Err(ResolveFault::Network { kind, message }) if !retried => {
                    warn!(kind = %kind, error = %message, "Artifact resolution failed, retrying once");
                    self.notifier.notify(NotifyEvent::ResolveRetry, &message);
                    retried = true;
                }
                Err(ResolveFault::Network { kind, message }) => {
                    return Err(Error::NetworkFault { kind, message });
                }
                Err(ResolveFault::Protocol(message)) => return Err(Error::ProtocolFault(message)),
            }
        }
    }

    fn fail(&self, error: Error) -> Error {
        warn!(kind = error.kind(), error = %error, "CorpPass authentication failed");
        self.notifier
            .notify(NotifyEvent::AuthenticationFailure, &error.to_string());
        error
    }
}
