use std::collections::HashMap;
use std::sync::Arc;

use common::api::StorageApi;
use common::config::ProviderConfig;
use parking_lot::Mutex;

use crate::error::Result;
use crate::provider::Provider;
use crate::session::{ProviderOptions, SessionManager};

/// Session managers keyed by configuration fingerprint.
///
/// Initializing twice with an identical configuration hands back the
/// manager created the first time, with its session, bucket, credential
/// pool and refresh timer intact.
#[derive(Debug)]
pub struct ProviderRegistry {
    api: Arc<dyn StorageApi>,
    options: ProviderOptions,
    sessions: Mutex<HashMap<String, Arc<SessionManager>>>,
}

impl ProviderRegistry {
    pub fn new(api: Arc<dyn StorageApi>) -> Self {
        Self::with_options(api, ProviderOptions::default())
    }

    pub fn with_options(api: Arc<dyn StorageApi>, options: ProviderOptions) -> Self {
        Self {
            api,
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The manager for `config`, created and armed on first sight.
    ///
    /// Nothing remote happens here; the session is authorized lazily by
    /// the first operation that needs it.
    pub fn session_for(&self, config: &ProviderConfig) -> Result<Arc<SessionManager>> {
        config.validate()?;
        let fingerprint = config.fingerprint()?;

        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&fingerprint) {
            tracing::debug!(bucket = %config.bucket, "reusing session manager");
            if !existing.refresh_armed() {
                existing.arm_refresh();
            }
            return Ok(existing.clone());
        }

        tracing::debug!(bucket = %config.bucket, "creating session manager");
        let manager = Arc::new(SessionManager::new(
            config.clone(),
            fingerprint.clone(),
            self.api.clone(),
            &self.options,
        ));
        manager.arm_refresh();
        sessions.insert(fingerprint, manager.clone());
        Ok(manager)
    }

    /// Initialize a provider for `config`.
    pub fn provider(&self, config: &ProviderConfig) -> Result<Provider> {
        Ok(Provider::new(self.session_for(config)?))
    }

    /// Forget a tenant. Its refresh loop stops once the last provider
    /// using it is dropped.
    pub fn remove(&self, config: &ProviderConfig) -> Result<Option<Arc<SessionManager>>> {
        let fingerprint = config.fingerprint()?;
        Ok(self.sessions.lock().remove(&fingerprint))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
