use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Connection parameters for one storage tenant.
///
/// Field names match what the host passes to the initializer. Two configs
/// with the same canonical form are the same tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Account ID or application key ID
    pub account_id: String,
    pub application_key: String,
    /// Bucket name
    pub bucket: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    Missing(&'static str),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ProviderConfig {
    pub fn new(
        account_id: impl Into<String>,
        application_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            application_key: application_key.into(),
            bucket: bucket.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_id.trim().is_empty() {
            return Err(ConfigError::Missing("accountId"));
        }
        if self.application_key.trim().is_empty() {
            return Err(ConfigError::Missing("applicationKey"));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        Ok(())
    }

    /// Canonical serialized form; field order is fixed by the struct.
    pub fn canonical(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 of the canonical form, hex encoded.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let canonical = self.canonical()?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("account_id", &self.account_id)
            .field("application_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}
