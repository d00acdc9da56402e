//! Artifact resolution back-channel.
//!
//! The resolver exchanges an artifact for the SAML response over SOAP and
//! classifies what went wrong. Whether to retry is the orchestrator's call.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use roxmltree::Document;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::request::ArtifactRequest;
use crate::error::NetworkFaultKind;
use crate::saml::config::CorppassConfig;
use crate::saml::parse::{read_response, read_status, ASSERTION_NS, PROTOCOL_NS};
use crate::saml::types::{escape_attr, escape_text, SamlResponse};

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Outcome of one resolution round-trip that reached the IdP.
#[derive(Debug, Clone, Default)]
pub struct ArtifactResponse {
    /// Whether the ArtifactResponse status was Success.
    pub success: bool,
    /// The wrapped SAML response, when one was returned.
    pub response: Option<SamlResponse>,
    /// Raw response body.
    pub raw_xml: Option<String>,
}

/// Why a resolution round-trip did not produce an [`ArtifactResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveFault {
    /// Transient transport failure; qualifies for one retry.
    #[error("{kind}: {message}")]
    Network {
        kind: NetworkFaultKind,
        message: String,
    },

    /// SAML or SOAP level fault; never retried.
    #[error("{0}")]
    Protocol(String),
}

/// Exchanges an artifact for a SAML response.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    async fn resolve(&self, request: &ArtifactRequest) -> Result<ArtifactResponse, ResolveFault>;
}

/// SOAP ArtifactResolve over HTTP(S).
pub struct HttpArtifactResolver {
    endpoint: String,
    sp_entity: String,
    http_client: reqwest::Client,
}

impl HttpArtifactResolver {
    /// Build a resolver for the configured endpoint, timeout and proxy.
    pub fn new(config: &CorppassConfig) -> anyhow::Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));

        if let Some(ref proxy) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .with_context(|| format!("Invalid proxy {}", proxy.url()))?;
            builder = builder.proxy(proxy);
        }

        let http_client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: config.artifact_resolution_url.clone(),
            sp_entity: config.sp_entity.clone(),
            http_client,
        })
    }

    fn envelope(&self, artifact: &str) -> String {
        build_resolve_envelope(
            &format!("_{}", uuid::Uuid::new_v4()),
            &Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            &self.endpoint,
            &self.sp_entity,
            artifact,
        )
    }
}

#[async_trait]
impl ArtifactResolver for HttpArtifactResolver {
    async fn resolve(&self, request: &ArtifactRequest) -> Result<ArtifactResponse, ResolveFault> {
        debug!(endpoint = %self.endpoint, "Resolving SAML artifact");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "http://www.oasis-open.org/committees/security")
            .body(self.envelope(&request.artifact))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify(&e))?;
        debug!(status = %status, bytes = body.len(), "Artifact resolution response received");

        let mut resolved = parse_artifact_response(&body)?;
        if !status.is_success() {
            resolved.success = false;
        }
        Ok(resolved)
    }
}

/// Map a transport error onto the fault taxonomy.
pub fn classify(error: &reqwest::Error) -> ResolveFault {
    let kind = if error.is_timeout() {
        NetworkFaultKind::Timeout
    } else if error.is_connect() {
        NetworkFaultKind::ConnectionReset
    } else if error.is_body() || error.is_decode() {
        NetworkFaultKind::MalformedHttp
    } else if error.is_request() {
        NetworkFaultKind::Io
    } else {
        return ResolveFault::Protocol(error.to_string());
    };

    ResolveFault::Network {
        kind,
        message: error.to_string(),
    }
}

pub fn build_resolve_envelope(
    id: &str,
    issue_instant: &str,
    destination: &str,
    issuer: &str,
    artifact: &str,
) -> String {
    format!(
        r#"<soap-env:Envelope xmlns:soap-env="{soap}"><soap-env:Body><samlp:ArtifactResolve xmlns:samlp="{protocol}" xmlns:saml="{assertion}" ID="{id}" Version="2.0" IssueInstant="{instant}" Destination="{destination}"><saml:Issuer>{issuer}</saml:Issuer><samlp:Artifact>{artifact}</samlp:Artifact></samlp:ArtifactResolve></soap-env:Body></soap-env:Envelope>"#,
        soap = SOAP_ENV_NS,
        protocol = PROTOCOL_NS,
        assertion = ASSERTION_NS,
        id = escape_attr(id),
        instant = escape_attr(issue_instant),
        destination = escape_attr(destination),
        issuer = escape_text(issuer),
        artifact = escape_text(artifact),
    )
}

/// Read an ArtifactResponse body. SOAP faults are protocol faults; a body
/// that is not an ArtifactResponse is reported as unsuccessful.
pub fn parse_artifact_response(body: &str) -> Result<ArtifactResponse, ResolveFault> {
    let unsuccessful = ArtifactResponse {
        success: false,
        response: None,
        raw_xml: Some(body.to_string()),
    };

    let doc = match Document::parse(body) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Artifact resolution body is not XML");
            return Ok(unsuccessful);
        }
    };

    if let Some(fault) = doc.descendants().find(|n| n.has_tag_name((SOAP_ENV_NS, "Fault"))) {
        let reason = fault
            .children()
            .find(|n| n.has_tag_name("faultstring"))
            .and_then(|n| n.text())
            .unwrap_or("SOAP fault without faultstring");
        return Err(ResolveFault::Protocol(reason.trim().to_string()));
    }

    let Some(artifact_response) = doc
        .descendants()
        .find(|n| n.has_tag_name((PROTOCOL_NS, "ArtifactResponse")))
    else {
        return Ok(unsuccessful);
    };

    let success = read_status(artifact_response).map_or(false, |s| s.is_success());
    let response = artifact_response
        .children()
        .find(|n| n.has_tag_name((PROTOCOL_NS, "Response")))
        .map(|node| read_response(node, body));

    Ok(ArtifactResponse {
        success,
        response,
        raw_xml: Some(body.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authaccess::payload::fixtures::auth_access_xml;
    use crate::saml::config::fixtures::test_config;
    use crate::saml::parse::fixtures::ResponseFixture;

    fn artifact_response(status: &str, inner: &str) -> String {
        format!(
            r#"<soap-env:Envelope xmlns:soap-env="http://schemas.xmlsoap.org/soap/envelope/"><soap-env:Body><samlp:ArtifactResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_ar1" Version="2.0"><samlp:Status><samlp:StatusCode Value="{}"/></samlp:Status>{}</samlp:ArtifactResponse></soap-env:Body></soap-env:Envelope>"#,
            status, inner
        )
    }

    #[test]
    fn test_envelope() {
        let xml = build_resolve_envelope(
            "_abc",
            "2015-11-30T04:40:00Z",
            "https://idp.example.com/artifact",
            "https://sp.example.com",
            "AAQ<&>",
        );
        let doc = Document::parse(&xml).unwrap();
        let resolve = doc
            .descendants()
            .find(|n| n.has_tag_name((PROTOCOL_NS, "ArtifactResolve")))
            .unwrap();
        assert_eq!(resolve.attribute("ID"), Some("_abc"));
        let artifact = resolve
            .children()
            .find(|n| n.has_tag_name((PROTOCOL_NS, "Artifact")))
            .unwrap();
        assert_eq!(artifact.text(), Some("AAQ<&>"));
    }

    #[test]
    fn test_parse_successful_artifact_response() {
        let inner = ResponseFixture::new(auth_access_xml("S1234567A")).to_xml();
        let body = artifact_response("urn:oasis:names:tc:SAML:2.0:status:Success", &inner);
        let resolved = parse_artifact_response(&body).unwrap();
        assert!(resolved.success);
        let response = resolved.response.unwrap();
        assert_eq!(response.id.as_deref(), Some("_r1"));
        assert_eq!(response.assertions.len(), 1);
        assert_eq!(resolved.raw_xml.as_deref(), Some(body.as_str()));
    }

    #[test]
    fn test_parse_unsuccessful_artifact_response() {
        let body = artifact_response("urn:oasis:names:tc:SAML:2.0:status:Requester", "");
        let resolved = parse_artifact_response(&body).unwrap();
        assert!(!resolved.success);
        assert!(resolved.response.is_none());
    }

    #[test]
    fn test_parse_soap_fault() {
        let body = r#"<soap-env:Envelope xmlns:soap-env="http://schemas.xmlsoap.org/soap/envelope/"><soap-env:Body><soap-env:Fault><faultcode>soap-env:Client</faultcode><faultstring>Unknown artifact</faultstring></soap-env:Fault></soap-env:Body></soap-env:Envelope>"#;
        assert_eq!(
            parse_artifact_response(body).unwrap_err(),
            ResolveFault::Protocol("Unknown artifact".to_string())
        );
    }

    #[test]
    fn test_parse_non_xml_body() {
        let resolved = parse_artifact_response("<html>Bad Gateway").unwrap();
        assert!(!resolved.success);
        assert_eq!(resolved.raw_xml.as_deref(), Some("<html>Bad Gateway"));
    }

    #[test]
    fn test_resolver_with_proxy() {
        let mut config = test_config();
        config.proxy = Some(crate::saml::config::ProxyConfig {
            address: "proxy.internal".to_string(),
            port: 3128,
        });
        assert!(HttpArtifactResolver::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_fault() {
        let mut config = test_config();
        config.artifact_resolution_url = "http://127.0.0.1:1/artifact".to_string();
        config.request_timeout_secs = 5;
        let resolver = HttpArtifactResolver::new(&config).unwrap();

        match resolver.resolve(&ArtifactRequest::new("abc")).await {
            Err(ResolveFault::Network { kind, .. }) => {
                assert!(matches!(
                    kind,
                    NetworkFaultKind::ConnectionReset | NetworkFaultKind::Timeout
                ));
            }
            other => panic!("expected network fault, got {:?}", other),
        }
    }
}
