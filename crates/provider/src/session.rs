//! Authenticated sessions and their periodic refresh.
//!
//! A [`SessionManager`] owns everything that belongs to one tenant: the
//! active [`Session`], the resolved bucket, the upload credential pool and
//! the background refresh task. Sessions are never mutated. A refresh
//! authorizes a brand-new one and swaps it into the active slot, so an
//! operation that already holds the previous `Arc<Session>` keeps using it
//! until it finishes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::api::{
    Authorization, Bucket, FileVersionPage, ListFileVersionsRequest, StorageApi,
    UploadCredential, UploadRequest, UploadedFile,
};
use common::config::ProviderConfig;
use common::error::ApiError;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backoff::execute_with_backoff;
use crate::error::{ProviderError, Result};
use crate::pool::UploadTokenPool;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Tuning that is not part of a tenant's identity.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub refresh_interval: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl ProviderOptions {
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

/// One account authorization bound to the API it was issued by.
#[derive(Debug)]
pub struct Session {
    api: Arc<dyn StorageApi>,
    authorization: Authorization,
    created_at: DateTime<Utc>,
}

impl Session {
    pub async fn authorize(
        api: Arc<dyn StorageApi>,
        config: &ProviderConfig,
    ) -> std::result::Result<Self, ApiError> {
        let authorization = api
            .authorize(&config.account_id, &config.application_key)
            .await?;
        Ok(Self {
            api,
            authorization,
            created_at: Utc::now(),
        })
    }

    pub fn auth_token(&self) -> &str {
        &self.authorization.authorization_token
    }

    pub fn download_url(&self) -> &str {
        &self.authorization.download_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn list_buckets(&self, bucket_name: &str) -> std::result::Result<Vec<Bucket>, ApiError> {
        self.api.list_buckets(&self.authorization, bucket_name).await
    }

    pub async fn get_upload_url(
        &self,
        bucket_id: &str,
    ) -> std::result::Result<UploadCredential, ApiError> {
        self.api.get_upload_url(&self.authorization, bucket_id).await
    }

    /// Uploads carry their own credential, so this ignores the account token.
    pub async fn upload_file(
        &self,
        request: UploadRequest,
    ) -> std::result::Result<UploadedFile, ApiError> {
        self.api.upload_file(request).await
    }

    pub async fn list_file_versions(
        &self,
        request: ListFileVersionsRequest,
    ) -> std::result::Result<FileVersionPage, ApiError> {
        self.api
            .list_file_versions(&self.authorization, request)
            .await
    }

    pub async fn delete_file_version(
        &self,
        file_name: &str,
        file_id: &str,
    ) -> std::result::Result<(), ApiError> {
        self.api
            .delete_file_version(&self.authorization, file_name, file_id)
            .await
    }
}

pub struct SessionManager {
    config: ProviderConfig,
    fingerprint: String,
    api: Arc<dyn StorageApi>,
    refresh_interval: Duration,
    active: OnceCell<RwLock<Arc<Session>>>,
    bucket: OnceCell<Bucket>,
    uploads: UploadTokenPool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("bucket", &self.config.bucket)
            .field("fingerprint", &self.fingerprint)
            .field("refresh_interval", &self.refresh_interval)
            .field("refresh_armed", &self.refresh_armed())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        config: ProviderConfig,
        fingerprint: String,
        api: Arc<dyn StorageApi>,
        options: &ProviderOptions,
    ) -> Self {
        Self {
            config,
            fingerprint,
            api,
            refresh_interval: options.refresh_interval,
            active: OnceCell::new(),
            bucket: OnceCell::new(),
            uploads: UploadTokenPool::new(),
            refresh_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn uploads(&self) -> &UploadTokenPool {
        &self.uploads
    }

    /// The active session, authorizing on first use.
    ///
    /// Concurrent first callers share a single authorization. A failed
    /// authorization is not cached; the next caller tries again.
    pub async fn current_session(&self) -> Result<Arc<Session>> {
        let slot = self
            .active
            .get_or_try_init(|| async move {
                tracing::debug!(bucket = %self.config.bucket, "initializing session");
                let session = self.authorize().await?;
                Ok::<_, ProviderError>(RwLock::new(Arc::new(session)))
            })
            .await?;
        Ok(slot.read().clone())
    }

    /// The configured bucket, resolved once per manager.
    pub async fn current_bucket(&self) -> Result<Bucket> {
        let bucket = self
            .bucket
            .get_or_try_init(|| self.resolve_bucket())
            .await?;
        Ok(bucket.clone())
    }

    /// Authorize a new session and make it the active one.
    pub async fn refresh(&self) -> Result<Arc<Session>> {
        tracing::debug!(bucket = %self.config.bucket, "refreshing session");
        let fresh = Arc::new(self.authorize().await?);

        let initial = fresh.clone();
        let slot = self
            .active
            .get_or_init(|| async move { RwLock::new(initial) })
            .await;
        *slot.write() = fresh.clone();

        tracing::debug!(
            bucket = %self.config.bucket,
            created_at = %fresh.created_at(),
            "session refreshed"
        );
        Ok(fresh)
    }

    /// Start the background refresh loop. Returns `false` if it was
    /// already running or there is no runtime to run it on; in the latter
    /// case a later call from inside a runtime arms it.
    pub fn arm_refresh(self: &Arc<Self>) -> bool {
        let mut task = self.refresh_task.lock();
        if task.is_some() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                bucket = %self.config.bucket,
                "no tokio runtime, session refresh not armed"
            );
            return false;
        };

        let manager = Arc::downgrade(self);
        let period = self.refresh_interval;
        *task = Some(runtime.spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if let Err(error) = manager.refresh().await {
                    tracing::error!(
                        bucket = %manager.config.bucket,
                        "session refresh failed, keeping previous session: {}",
                        error
                    );
                }
            }
        }));
        true
    }

    pub fn refresh_armed(&self) -> bool {
        self.refresh_task.lock().is_some()
    }

    /// One authorization attempt. The caller decides whether to try again.
    async fn authorize(&self) -> Result<Session> {
        Session::authorize(self.api.clone(), &self.config)
            .await
            .map_err(ProviderError::Authorization)
    }

    async fn resolve_bucket(&self) -> Result<Bucket> {
        let session = self.current_session().await?;
        let session: &Session = &session;
        let name = self.config.bucket.as_str();

        let buckets = execute_with_backoff(move || session.list_buckets(name)).await?;
        let bucket = buckets
            .into_iter()
            .find(|bucket| bucket.bucket_name == name)
            .ok_or_else(|| ProviderError::BucketNotFound(name.to_string()))?;

        tracing::debug!(bucket = %bucket.bucket_name, bucket_id = %bucket.bucket_id, "resolved bucket");
        Ok(bucket)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::testkit::{status_error, Call, MockStorage};

    fn manager(mock: &MockStorage, bucket: &str) -> Arc<SessionManager> {
        let config = ProviderConfig::new("acct", "key", bucket);
        let fingerprint = config.fingerprint().unwrap();
        Arc::new(SessionManager::new(
            config,
            fingerprint,
            Arc::new(mock.clone()),
            &ProviderOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_session_is_memoized() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        let manager = manager(&mock, "media");

        let first = manager.current_session().await.unwrap();
        let second = manager.current_session().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mock.calls(Call::Authorize), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_retried_later() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        mock.fail_next(Call::Authorize, status_error(500));
        let manager = manager(&mock, "media");

        assert!(matches!(
            manager.current_session().await,
            Err(ProviderError::Authorization(_))
        ));
        assert!(manager.current_session().await.is_ok());
        assert_eq!(mock.calls(Call::Authorize), 2);
    }

    #[tokio::test]
    async fn test_bucket_requires_exact_name() {
        let mock = MockStorage::new("acct", "key").with_bucket("media-archive");
        let manager = manager(&mock, "media");

        match manager.current_bucket().await {
            Err(ProviderError::BucketNotFound(name)) => assert_eq!(name, "media"),
            other => panic!("expected BucketNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bucket_survives_refresh() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        let manager = manager(&mock, "media");

        let bucket = manager.current_bucket().await.unwrap();
        assert_eq!(bucket.bucket_id, "bucket-media");
        manager.refresh().await.unwrap();
        assert_eq!(manager.current_bucket().await.unwrap(), bucket);
        assert_eq!(mock.calls(Call::ListBuckets), 1);
    }

    #[tokio::test]
    async fn test_refresh_before_first_use_fills_slot() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        let manager = manager(&mock, "media");

        let refreshed = manager.refresh().await.unwrap();
        let current = manager.current_session().await.unwrap();
        assert!(Arc::ptr_eq(&refreshed, &current));
        assert_eq!(mock.calls(Call::Authorize), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_refresh_is_idempotent() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        let manager = manager(&mock, "media");

        assert!(!manager.refresh_armed());
        assert!(manager.arm_refresh());
        assert!(!manager.arm_refresh());
        assert!(manager.refresh_armed());
    }

    #[test]
    fn test_arm_refresh_retries_once_a_runtime_exists() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        let manager = manager(&mock, "media");
        assert!(!manager.arm_refresh());
        assert!(!manager.refresh_armed());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            assert!(manager.arm_refresh());
            manager.current_session().await.unwrap();
            tokio::time::sleep(DEFAULT_REFRESH_INTERVAL * 2 + Duration::from_secs(1)).await;
        });
        assert!(manager.refresh_armed());
        assert_eq!(mock.calls(Call::Authorize), 3);
    }

    #[tokio::test]
    async fn test_initial_authorization_is_not_retried() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        mock.fail_next(Call::Authorize, status_error(503));
        let manager = manager(&mock, "media");

        match manager.current_session().await {
            Err(ProviderError::Authorization(error)) => {
                assert_eq!(error.status_code().map(|s| s.as_u16()), Some(503))
            }
            other => panic!("expected Authorization, got {:?}", other),
        }
        assert_eq!(mock.calls(Call::Authorize), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_stops_with_manager() {
        let mock = MockStorage::new("acct", "key").with_bucket("media");
        let manager = manager(&mock, "media");
        manager.arm_refresh();
        drop(manager);

        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL * 3).await;
        assert_eq!(mock.calls(Call::Authorize), 0);
    }
}
