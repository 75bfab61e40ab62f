use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::api::{
    Authorization, Bucket, FileVersion, FileVersionPage, ListFileVersionsRequest, StorageApi,
    UploadCredential, UploadRequest, UploadedFile,
};
use crate::error::ApiError;

pub const MOCK_API_URL: &str = "https://api000.mock.test";
pub const MOCK_DOWNLOAD_URL: &str = "https://f000.mock.test";

const DEFAULT_PAGE_SIZE: u32 = 100;

/// Which remote call a record or script refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Authorize,
    ListBuckets,
    GetUploadUrl,
    UploadFile,
    ListFileVersions,
    DeleteFileVersion,
}

/// A call observed by the mock
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call: Call,
    /// Tokio clock at the time of the call (pausable in tests)
    pub at: Instant,
    /// Account token, upload token or account id the call was made with
    pub token: String,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    bucket_id: String,
    seq: u64,
    version: FileVersion,
}

#[derive(Debug)]
struct MockStorageInner {
    account_id: String,
    application_key: String,
    buckets: Vec<Bucket>,
    versions: Vec<StoredVersion>,
    /// Failures to return, in order, before a call does real work
    scripts: HashMap<Call, VecDeque<ApiError>>,
    calls: Vec<CallRecord>,
    account_tokens: HashSet<String>,
    /// upload token -> bucket id
    upload_tokens: HashMap<String, String>,
    counter: u64,
    page_size: u32,
    latency: Duration,
}

/// In-memory stand-in for the storage API.
///
/// Keeps real version state so uploads show up in listings and deletions
/// remove them, and lets tests script failures per call kind.
#[derive(Debug, Clone)]
pub struct MockStorage {
    inner: Arc<Mutex<MockStorageInner>>,
}

/// A status error as the server would return it.
pub fn status_error(code: u16) -> ApiError {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ApiError::http(status, "scripted", format!("scripted {} response", code))
}

/// A 429 with a `Retry-After` header.
pub fn rate_limited(retry_after_secs: u64) -> ApiError {
    status_error(429).with_retry_after(retry_after_secs)
}

/// A failure with no HTTP response at all.
pub fn connection_reset() -> ApiError {
    ApiError::Connection("connection reset by peer".to_string())
}

impl MockStorage {
    pub fn new(account_id: impl Into<String>, application_key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockStorageInner {
                account_id: account_id.into(),
                application_key: application_key.into(),
                buckets: Vec::new(),
                versions: Vec::new(),
                scripts: HashMap::new(),
                calls: Vec::new(),
                account_tokens: HashSet::new(),
                upload_tokens: HashMap::new(),
                counter: 0,
                page_size: DEFAULT_PAGE_SIZE,
                latency: Duration::ZERO,
            })),
        }
    }

    pub fn with_bucket(self, bucket_name: &str) -> Self {
        self.inner.lock().buckets.push(Bucket {
            bucket_id: format!("bucket-{}", bucket_name),
            bucket_name: bucket_name.to_string(),
        });
        self
    }

    /// Cap listings at `page_size` versions per page.
    pub fn with_page_size(self, page_size: u32) -> Self {
        self.inner.lock().page_size = page_size.max(1);
        self
    }

    /// Delay every call by `latency` on the tokio clock.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner.lock().latency = latency;
        self
    }

    /// Make the next call of kind `call` fail with `error`.
    pub fn fail_next(&self, call: Call, error: ApiError) {
        self.fail_times(call, 1, error);
    }

    /// Make the next `times` calls of kind `call` fail with `error`.
    pub fn fail_times(&self, call: Call, times: usize, error: ApiError) {
        let mut inner = self.inner.lock();
        let queue = inner.scripts.entry(call).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Invalidate every account token issued so far.
    pub fn expire_sessions(&self) {
        self.inner.lock().account_tokens.clear();
    }

    /// Store a version directly, bypassing the upload path.
    pub fn seed_version(&self, bucket_name: &str, file_name: &str) -> String {
        let mut inner = self.inner.lock();
        let bucket_id = format!("bucket-{}", bucket_name);
        inner.store_version(&bucket_id, file_name, 0, None).file_id
    }

    pub fn calls(&self, call: Call) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|record| record.call == call)
            .count()
    }

    pub fn records(&self, call: Call) -> Vec<CallRecord> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|record| record.call == call)
            .cloned()
            .collect()
    }

    /// Gaps between consecutive calls of one kind.
    pub fn intervals(&self, call: Call) -> Vec<Duration> {
        self.records(call)
            .windows(2)
            .map(|pair| pair[1].at.duration_since(pair[0].at))
            .collect()
    }

    pub fn tokens_used(&self, call: Call) -> Vec<String> {
        self.records(call)
            .into_iter()
            .map(|record| record.token)
            .collect()
    }

    /// Stored versions of `file_name`, newest first.
    pub fn versions(&self, file_name: &str) -> Vec<FileVersion> {
        let inner = self.inner.lock();
        let mut matching: Vec<_> = inner
            .versions
            .iter()
            .filter(|stored| stored.version.file_name == file_name)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.seq.cmp(&a.seq));
        matching.into_iter().map(|stored| stored.version).collect()
    }

    async fn enter(&self, call: Call, token: &str) -> Result<(), ApiError> {
        let latency = {
            let mut inner = self.inner.lock();
            inner.calls.push(CallRecord {
                call,
                at: Instant::now(),
                token: token.to_string(),
            });
            inner.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock();
        match inner.scripts.get_mut(&call).and_then(|queue| queue.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl MockStorageInner {
    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn check_account(&self, auth: &Authorization) -> Result<(), ApiError> {
        if self.account_tokens.contains(&auth.authorization_token) {
            Ok(())
        } else {
            Err(ApiError::http(
                StatusCode::UNAUTHORIZED,
                "expired_auth_token",
                "authorization token has expired",
            ))
        }
    }

    fn store_version(
        &mut self,
        bucket_id: &str,
        file_name: &str,
        content_length: u64,
        content_type: Option<String>,
    ) -> FileVersion {
        let seq = self.next_id();
        let version = FileVersion {
            file_id: format!("4_z{:08}", seq),
            file_name: file_name.to_string(),
            action: "upload".to_string(),
            content_length,
            content_type,
            upload_timestamp: seq,
        };
        self.versions.push(StoredVersion {
            bucket_id: bucket_id.to_string(),
            seq,
            version: version.clone(),
        });
        version
    }
}

#[async_trait]
impl StorageApi for MockStorage {
    async fn authorize(
        &self,
        account_id: &str,
        application_key: &str,
    ) -> Result<Authorization, ApiError> {
        self.enter(Call::Authorize, account_id).await?;
        let mut inner = self.inner.lock();
        if account_id != inner.account_id || application_key != inner.application_key {
            return Err(ApiError::http(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "invalid application key",
            ));
        }

        let token = format!("account-token-{}", inner.next_id());
        inner.account_tokens.insert(token.clone());
        Ok(Authorization {
            account_id: account_id.to_string(),
            authorization_token: token,
            api_url: MOCK_API_URL.to_string(),
            download_url: MOCK_DOWNLOAD_URL.to_string(),
        })
    }

    async fn list_buckets(
        &self,
        auth: &Authorization,
        bucket_name: &str,
    ) -> Result<Vec<Bucket>, ApiError> {
        self.enter(Call::ListBuckets, &auth.authorization_token)
            .await?;
        let inner = self.inner.lock();
        inner.check_account(auth)?;
        Ok(inner
            .buckets
            .iter()
            .filter(|bucket| bucket.bucket_name == bucket_name)
            .cloned()
            .collect())
    }

    async fn get_upload_url(
        &self,
        auth: &Authorization,
        bucket_id: &str,
    ) -> Result<UploadCredential, ApiError> {
        self.enter(Call::GetUploadUrl, &auth.authorization_token)
            .await?;
        let mut inner = self.inner.lock();
        inner.check_account(auth)?;
        if !inner.buckets.iter().any(|bucket| bucket.bucket_id == bucket_id) {
            return Err(ApiError::http(
                StatusCode::BAD_REQUEST,
                "bad_bucket_id",
                format!("invalid bucket id: {}", bucket_id),
            ));
        }

        let n = inner.next_id();
        let token = format!("upload-token-{}", n);
        inner
            .upload_tokens
            .insert(token.clone(), bucket_id.to_string());
        Ok(UploadCredential::new(
            bucket_id,
            format!("https://pod-000.mock.test/b2api/v2/b2_upload_file/{}/{}", bucket_id, n),
            token,
        ))
    }

    async fn upload_file(&self, request: UploadRequest) -> Result<UploadedFile, ApiError> {
        self.enter(Call::UploadFile, &request.authorization_token)
            .await?;
        let mut inner = self.inner.lock();
        let bucket_id = inner
            .upload_tokens
            .get(&request.authorization_token)
            .cloned()
            .ok_or_else(|| {
                ApiError::http(
                    StatusCode::UNAUTHORIZED,
                    "bad_auth_token",
                    "upload token is not valid",
                )
            })?;

        let version = inner.store_version(
            &bucket_id,
            &request.file_name,
            request.data.len() as u64,
            Some(request.content_type.clone()),
        );
        Ok(UploadedFile {
            file_id: version.file_id,
            file_name: version.file_name,
            content_length: version.content_length,
            content_type: version.content_type,
            upload_timestamp: version.upload_timestamp,
        })
    }

    async fn list_file_versions(
        &self,
        auth: &Authorization,
        request: ListFileVersionsRequest,
    ) -> Result<FileVersionPage, ApiError> {
        self.enter(Call::ListFileVersions, &auth.authorization_token)
            .await?;
        let inner = self.inner.lock();
        inner.check_account(auth)?;

        let start_name = request.start_file_name.unwrap_or_default();
        let prefix = request.prefix.unwrap_or_default();
        let mut candidates: Vec<&StoredVersion> = inner
            .versions
            .iter()
            .filter(|stored| stored.bucket_id == request.bucket_id)
            .filter(|stored| stored.version.file_name.starts_with(&prefix))
            .filter(|stored| stored.version.file_name >= start_name)
            .collect();
        // Server order: names ascending, newest version first within a name
        candidates.sort_by(|a, b| {
            a.version
                .file_name
                .cmp(&b.version.file_name)
                .then(b.seq.cmp(&a.seq))
        });
        if let Some(start_id) = &request.start_file_id {
            if let Some(position) = candidates
                .iter()
                .position(|stored| &stored.version.file_id == start_id)
            {
                candidates.drain(..position);
            }
        }

        let page_size = request
            .max_file_count
            .unwrap_or(inner.page_size)
            .min(inner.page_size) as usize;
        let files = candidates
            .iter()
            .take(page_size)
            .map(|stored| stored.version.clone())
            .collect();
        let next = candidates.get(page_size);
        Ok(FileVersionPage {
            files,
            next_file_name: next.map(|stored| stored.version.file_name.clone()),
            next_file_id: next.map(|stored| stored.version.file_id.clone()),
        })
    }

    async fn delete_file_version(
        &self,
        auth: &Authorization,
        file_name: &str,
        file_id: &str,
    ) -> Result<(), ApiError> {
        self.enter(Call::DeleteFileVersion, &auth.authorization_token)
            .await?;
        let mut inner = self.inner.lock();
        inner.check_account(auth)?;
        let position = inner
            .versions
            .iter()
            .position(|stored| {
                stored.version.file_name == file_name && stored.version.file_id == file_id
            })
            .ok_or_else(|| {
                ApiError::http(
                    StatusCode::BAD_REQUEST,
                    "file_not_present",
                    format!("file not present: {} {}", file_name, file_id),
                )
            })?;
        inner.versions.remove(position);
        Ok(())
    }
}
