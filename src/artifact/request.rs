//! Inbound artifact binding parameters.

use crate::error::{Error, Result};

/// What the IdP redirected the browser to the ACS with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Opaque SAML artifact (`SAMLart`).
    pub artifact: String,
    /// Opaque state echoed back by the IdP.
    pub relay_state: Option<String>,
}

impl ArtifactRequest {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            relay_state: None,
        }
    }

    pub fn with_relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    /// Read `SAMLart` and `RelayState` from an ACS query string, with or
    /// without the leading `?`.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut artifact: Option<String> = None;
        let mut relay_state: Option<String> = None;

        for pair in query.trim_start_matches('?').split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let value = value.replace('+', " ");
                let decoded_value = urlencoding::decode(&value)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| value.clone());

                if key == "SAMLart" {
                    artifact = Some(decoded_value);
                } else if key == "RelayState" {
                    relay_state = Some(decoded_value);
                }
            }
        }

        match artifact {
            Some(artifact) if !artifact.is_empty() => Ok(Self {
                artifact,
                relay_state,
            }),
            _ => Err(Error::MissingArtifact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query() {
        let request =
            ArtifactRequest::from_query("?SAMLart=AAQAAMh48%2FaB%2B1w%3D&RelayState=%2Fhome").unwrap();
        assert_eq!(request.artifact, "AAQAAMh48/aB+1w=");
        assert_eq!(request.relay_state.as_deref(), Some("/home"));
    }

    #[test]
    fn test_from_query_without_relay_state() {
        let request = ArtifactRequest::from_query("SAMLart=abc").unwrap();
        assert_eq!(request, ArtifactRequest::new("abc"));
    }

    #[test]
    fn test_missing_artifact() {
        assert!(matches!(
            ArtifactRequest::from_query("RelayState=x"),
            Err(Error::MissingArtifact)
        ));
        assert!(matches!(
            ArtifactRequest::from_query("SAMLart="),
            Err(Error::MissingArtifact)
        ));
    }
}
