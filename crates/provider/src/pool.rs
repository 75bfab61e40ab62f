use std::future::Future;

use common::api::UploadCredential;
use common::error::ApiError;
use parking_lot::Mutex;

/// Reusable upload credentials for one bucket.
///
/// Credentials are handed out most-recently-released first. A credential
/// is owned by exactly one place at a time (the pool or an upload), and a
/// discarded credential is dropped, so it can never be handed out again.
#[derive(Debug, Default)]
pub struct UploadTokenPool {
    idle: Mutex<Vec<UploadCredential>>,
}

impl UploadTokenPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a pooled credential, or await `fetch` for a fresh one.
    pub async fn acquire<F, Fut>(&self, fetch: F) -> Result<UploadCredential, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<UploadCredential, ApiError>>,
    {
        let pooled = self.idle.lock().pop();
        if let Some(credential) = pooled {
            tracing::debug!(upload_url = %credential.upload_url, "reusing pooled upload credential");
            return Ok(credential);
        }

        tracing::debug!("requesting fresh upload credential");
        fetch().await
    }

    /// Return a credential that is still good.
    pub fn release(&self, credential: UploadCredential) {
        self.idle.lock().push(credential);
    }

    /// Drop a credential the server rejected or that may be unusable.
    pub fn discard(&self, credential: UploadCredential) {
        tracing::debug!(upload_url = %credential.upload_url, "discarding upload credential");
        drop(credential);
    }

    /// Number of credentials waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}
