//! Decryption seam.
//!
//! XML encryption lives in the protocol library; this crate only decides
//! when to decrypt and what to do with the result.

use std::sync::Arc;

use super::config::CorppassConfig;
use super::types::{EncryptedAssertion, EncryptedId, NameId};
use crate::error::{Error, Result};

/// Decrypts SAML elements with the SP's configured private key.
pub trait AssertionDecryptor: Send + Sync {
    /// Return the cleartext `<saml:Assertion>` XML.
    fn decrypt_assertion(&self, encrypted: &EncryptedAssertion) -> anyhow::Result<String>;

    /// Return the NameID hidden in an `<saml:EncryptedID>`.
    fn decrypt_encrypted_id(&self, encrypted: &EncryptedId) -> anyhow::Result<NameId>;
}

/// Decryptor for deployments where the IdP sends cleartext assertions.
/// Every decryption attempt fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecryption;

impl AssertionDecryptor for NoDecryption {
    fn decrypt_assertion(&self, _encrypted: &EncryptedAssertion) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("No decryption key configured"))
    }

    fn decrypt_encrypted_id(&self, _encrypted: &EncryptedId) -> anyhow::Result<NameId> {
        Err(anyhow::anyhow!("No decryption key configured"))
    }
}

/// Pick the decryptor for a configuration.
///
/// Without a key the IdP must send cleartext, so [`NoDecryption`] applies.
/// A configured key needs an XML encryption backend supplied by the caller
/// through [`decryptor_with_backend`]; it is never silently ignored.
pub fn decryptor_from_config(config: &CorppassConfig) -> Result<Arc<dyn AssertionDecryptor>> {
    decryptor_with_backend(config, None)
}

/// Like [`decryptor_from_config`], with an optional key-backed decryptor
/// to use when `decryption_key_path` is set.
pub fn decryptor_with_backend(
    config: &CorppassConfig,
    backend: Option<Arc<dyn AssertionDecryptor>>,
) -> Result<Arc<dyn AssertionDecryptor>> {
    let Some(ref path) = config.decryption_key_path else {
        return Ok(Arc::new(NoDecryption));
    };

    if !path.is_file() {
        return Err(Error::Config(format!(
            "decryption_key_path {:?} is not a readable file",
            path
        )));
    }

    backend.ok_or_else(|| {
        Error::Config(format!(
            "decryption_key_path {:?} is set but no XML decryption backend is available",
            path
        ))
    })
}
