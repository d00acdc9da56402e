//! Redirect URLs towards the IdP.
//!
//! CorpPass logins are IdP-initiated: the SP sends the browser to the IdP's
//! SSO endpoint with its PartnerId and target, and the IdP answers with an
//! artifact on the ACS. Logout is SP-initiated over the redirect binding.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::config::CorppassConfig;
use crate::error::Error;

/// Binding the IdP uses for both legs of the login.
pub const ARTIFACT_BINDING: &str = "HTTPArtifact";

/// Builds IdP redirect URLs for one service provider.
#[derive(Debug, Clone)]
pub struct ServiceProvider {
    config: Arc<CorppassConfig>,
}

impl ServiceProvider {
    pub fn new(config: Arc<CorppassConfig>) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CorppassConfig {
        &self.config
    }

    /// IdP-initiated SSO link that lands the user on `target` after login.
    pub fn sso_url(&self, target: &str) -> Result<String> {
        let idp_sso_url = self
            .config
            .idp_sso_url
            .as_ref()
            .ok_or_else(|| anyhow!("IdP SSO URL not configured"))?;

        let mut url = format!(
            "{}?RequestBinding={}&ResponseBinding={}&PartnerId={}&Target={}&NameIdFormat=Email",
            idp_sso_url,
            ARTIFACT_BINDING,
            ARTIFACT_BINDING,
            urlencoding::encode(&self.config.sp_entity),
            urlencoding::encode(target)
        );

        if let Some(ref eservice_id) = self.config.eservice_id {
            url.push_str(&format!("&esrvcID={}", urlencoding::encode(eservice_id)));
        }

        debug!(url = %url, "Created IdP SSO redirect");
        Ok(url)
    }

    /// Redirect-binding LogoutRequest URL, or `None` when the IdP has no
    /// SLO endpoint configured.
    pub fn logout_request_url(&self, name_id: &str, relay_state: Option<&str>) -> Result<Option<String>> {
        use samael::traits::ToXml;

        let idp_slo_url = match self.config.idp_slo_url {
            Some(ref url) => url,
            None => return Ok(None),
        };

        let request = self.build_logout_request(name_id, idp_slo_url);
        let xml = request
            .to_string()
            .map_err(|e| anyhow!("Failed to serialize LogoutRequest: {:?}", e))?;

        let mut url = format!(
            "{}?SAMLRequest={}",
            idp_slo_url,
            urlencoding::encode(&deflate_and_encode(&xml)?)
        );
        if let Some(state) = relay_state {
            url.push_str(&format!("&RelayState={}", urlencoding::encode(state)));
        }

        debug!(name_id = %name_id, "Created SAML LogoutRequest redirect");
        Ok(Some(url))
    }

    fn build_logout_request(&self, name_id: &str, destination: &str) -> samael::schema::LogoutRequest {
        use samael::schema::{Issuer, LogoutRequest, NameID};

        LogoutRequest {
            id: Some(format!("_{}", uuid::Uuid::new_v4())),
            version: Some("2.0".to_string()),
            issue_instant: Some(Utc::now()),
            destination: Some(destination.to_string()),
            issuer: Some(Issuer {
                value: Some(self.config.sp_entity.clone()),
                ..Default::default()
            }),
            name_id: Some(NameID {
                value: name_id.to_string(),
                format: Some(self.config.name_id_format.clone()),
            }),
            session_index: None,
            signature: None,
        }
    }
}

/// Deflate and base64 encode for SAML redirect binding.
fn deflate_and_encode(xml: &str) -> Result<String> {
    use std::io::Write;

    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(xml.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}
