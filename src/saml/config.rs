//! CorpPass service provider configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outbound HTTP proxy for the artifact resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Proxy host name or address.
    pub address: String,

    /// Proxy port.
    pub port: u16,
}

impl ProxyConfig {
    /// Proxy URL as understood by the HTTP client.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Service provider configuration, loaded once per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorppassConfig {
    /// SP Entity ID (our PartnerId at the IdP).
    #[serde(default)]
    pub sp_entity: String,

    /// IdP Entity ID; expected issuer of responses and assertions.
    #[serde(default)]
    pub idp_entity: String,

    /// Assertion Consumer Service URL (where the IdP sends the artifact).
    #[serde(default)]
    pub assertion_consumer_service_url: String,

    /// IdP artifact resolution (SOAP) endpoint.
    #[serde(default)]
    pub artifact_resolution_url: String,

    /// IdP SSO URL used to build IdP-initiated login links.
    #[serde(default)]
    pub idp_sso_url: Option<String>,

    /// IdP Single Logout URL.
    #[serde(default)]
    pub idp_slo_url: Option<String>,

    /// Optional outbound proxy.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    /// SP private key (PEM) handed to the decryption backend.
    #[serde(default)]
    pub decryption_key_path: Option<PathBuf>,

    /// E-service code this SP is registered for.
    #[serde(default)]
    pub eservice_id: Option<String>,

    /// NameID format used in logout requests.
    #[serde(default = "default_name_id_format")]
    pub name_id_format: String,

    /// Timeout for one artifact resolution round-trip.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_name_id_format() -> String {
    "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CorppassConfig {
    fn default() -> Self {
        Self {
            sp_entity: String::new(),
            idp_entity: String::new(),
            assertion_consumer_service_url: String::new(),
            artifact_resolution_url: String::new(),
            idp_sso_url: None,
            idp_slo_url: None,
            proxy: None,
            decryption_key_path: None,
            eservice_id: None,
            name_id_format: default_name_id_format(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl CorppassConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.sp_entity.is_empty() {
            return Err("sp_entity is required".to_string());
        }

        if self.idp_entity.is_empty() {
            return Err("idp_entity is required".to_string());
        }

        if self.assertion_consumer_service_url.is_empty() {
            return Err("assertion_consumer_service_url is required".to_string());
        }

        if self.artifact_resolution_url.is_empty() {
            return Err("artifact_resolution_url is required".to_string());
        }

        if let Some(ref proxy) = self.proxy {
            if proxy.address.is_empty() {
                return Err("proxy.address must not be empty".to_string());
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::test_config;
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CorppassConfig::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.proxy.is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = CorppassConfig::default();
        assert!(config.validate().is_err()); // missing sp_entity

        config.sp_entity = "https://sp.example.com".to_string();
        assert!(config.validate().is_err()); // missing idp_entity

        config.idp_entity = "https://idp.example.com".to_string();
        assert!(config.validate().is_err()); // missing ACS

        config.assertion_consumer_service_url = "https://sp.example.com/saml/acs".to_string();
        assert!(config.validate().is_err()); // missing resolution endpoint

        config.artifact_resolution_url = "https://idp.example.com/artifact".to_string();
        assert!(config.validate().is_ok());

        config.proxy = Some(ProxyConfig {
            address: String::new(),
            port: 3128,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_config() {
        let json = r#"{
            "sp_entity": "https://sp.example.com",
            "idp_entity": "https://idp.example.com",
            "assertion_consumer_service_url": "https://sp.example.com/saml/acs",
            "artifact_resolution_url": "https://idp.example.com/artifact",
            "proxy": { "address": "proxy.internal", "port": 3128 }
        }"#;
        let config: CorppassConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.proxy.unwrap().url(), "http://proxy.internal:3128");

        let unknown = r#"{ "sp_entity": "x", "cookie_secure": true }"#;
        assert!(serde_json::from_str::<CorppassConfig>(unknown).is_err());
    }

    #[test]
    fn test_fixture_is_valid() {
        assert!(test_config().validate().is_ok());
    }
}
