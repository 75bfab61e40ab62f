//! Integration tests for uploads: credential pooling and the retry loop

mod common;

use std::sync::Arc;
use std::time::Duration;

use ::common::api::{
    Authorization, Bucket, FileVersionPage, ListFileVersionsRequest, StorageApi,
    UploadCredential, UploadRequest, UploadedFile,
};
use ::common::error::ApiError;
use ::common::testkit::{
    connection_reset, rate_limited, status_error, Call, MockStorage, MOCK_DOWNLOAD_URL,
};
use async_trait::async_trait;
use b2_provider::{ProviderError, ProviderRegistry};
use futures::future::join_all;
use tokio::time::Instant;

#[tokio::test]
async fn test_upload_sets_download_url() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);

    let mut file = common::image(Some("a"), "h1");
    provider.upload(&mut file).await.unwrap();

    assert_eq!(
        file.url.as_deref(),
        Some(format!("{}/file/media/a/h1.png", MOCK_DOWNLOAD_URL).as_str())
    );
    let versions = mock.versions("a/h1.png");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn test_upload_without_path() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);

    let mut file = common::image(None, "h1");
    provider.upload(&mut file).await.unwrap();

    assert_eq!(
        file.url.as_deref(),
        Some(format!("{}/file/media/h1.png", MOCK_DOWNLOAD_URL).as_str())
    );
    assert_eq!(mock.versions("h1.png").len(), 1);
}

#[tokio::test]
async fn test_released_credential_is_reused() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);

    provider.upload(&mut common::image(None, "h1")).await.unwrap();
    provider.upload(&mut common::image(None, "h2")).await.unwrap();

    assert_eq!(mock.calls(Call::GetUploadUrl), 1);
    let tokens = mock.tokens_used(Call::UploadFile);
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0], tokens[1]);
    assert_eq!(provider.session().uploads().idle(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_upload_fetches_new_credential() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_next(Call::UploadFile, status_error(401));

    let started = Instant::now();
    provider.upload(&mut common::image(None, "h1")).await.unwrap();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(mock.calls(Call::GetUploadUrl), 2);
    let tokens = mock.tokens_used(Call::UploadFile);
    assert_eq!(tokens.len(), 2);
    assert_ne!(tokens[0], tokens[1]);
    assert_eq!(provider.session().uploads().idle(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_error_fetches_new_credential() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_next(Call::UploadFile, connection_reset());

    provider.upload(&mut common::image(None, "h1")).await.unwrap();

    let tokens = mock.tokens_used(Call::UploadFile);
    assert_ne!(tokens[0], tokens[1]);
    assert_eq!(mock.calls(Call::GetUploadUrl), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_credential_and_backs_off() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_times(Call::UploadFile, 2, status_error(408));

    provider.upload(&mut common::image(None, "h1")).await.unwrap();

    assert_eq!(
        mock.intervals(Call::UploadFile),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    let tokens = mock.tokens_used(Call::UploadFile);
    assert!(tokens.iter().all(|token| token == &tokens[0]));
    assert_eq!(mock.calls(Call::GetUploadUrl), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_upload_uses_exponential_delay() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_next(Call::UploadFile, rate_limited(30));
    mock.fail_next(Call::UploadFile, rate_limited(30));

    provider.upload(&mut common::image(None, "h1")).await.unwrap();

    assert_eq!(
        mock.intervals(Call::UploadFile),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_upload_gives_up_after_five_attempts() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_times(Call::UploadFile, 10, status_error(401));

    let mut file = common::image(Some("a"), "h1");
    let error = provider.upload(&mut file).await.unwrap_err();

    match &error {
        ProviderError::UploadFailed {
            file_name,
            attempts,
            ..
        } => {
            assert_eq!(file_name, "a/h1.png");
            assert_eq!(*attempts, 5);
        }
        other => panic!("expected UploadFailed, got {:?}", other),
    }
    assert_eq!(common::status_of(&error), Some(401));
    assert_eq!(mock.calls(Call::UploadFile), 5);
    assert_eq!(mock.calls(Call::GetUploadUrl), 5);
    assert_eq!(provider.session().uploads().idle(), 0);
    assert!(file.url.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_sleep_after_last_attempt() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_times(Call::UploadFile, 10, status_error(408));

    let started = Instant::now();
    let error = provider
        .upload(&mut common::image(None, "h1"))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::UploadFailed { attempts: 5, .. }));
    assert_eq!(
        mock.intervals(Call::UploadFile),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]
    );
    assert_eq!(started.elapsed(), Duration::from_secs(15));
}

#[tokio::test]
async fn test_fatal_status_fails_immediately() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_next(Call::UploadFile, status_error(400));

    let error = provider
        .upload(&mut common::image(None, "h1"))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Api(_)));
    assert_eq!(common::status_of(&error), Some(400));
    assert_eq!(mock.calls(Call::UploadFile), 1);
    assert_eq!(provider.session().uploads().idle(), 0);
}

#[tokio::test]
async fn test_undecodable_upload_response_is_not_resent() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_next(
        Call::UploadFile,
        ApiError::Decode("expected value at line 1 column 1".to_string()),
    );

    let error = provider
        .upload(&mut common::image(None, "h1"))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Api(ApiError::Decode(_))));
    assert_eq!(mock.calls(Call::UploadFile), 1);
    assert_eq!(mock.calls(Call::GetUploadUrl), 1);
}

/// Storage that echoes uploaded names back percent-encoded, as the upload
/// header carries them.
#[derive(Debug)]
struct EncodedEcho(MockStorage);

#[async_trait]
impl StorageApi for EncodedEcho {
    async fn authorize(
        &self,
        account_id: &str,
        application_key: &str,
    ) -> Result<Authorization, ApiError> {
        self.0.authorize(account_id, application_key).await
    }

    async fn list_buckets(
        &self,
        auth: &Authorization,
        bucket_name: &str,
    ) -> Result<Vec<Bucket>, ApiError> {
        self.0.list_buckets(auth, bucket_name).await
    }

    async fn get_upload_url(
        &self,
        auth: &Authorization,
        bucket_id: &str,
    ) -> Result<UploadCredential, ApiError> {
        self.0.get_upload_url(auth, bucket_id).await
    }

    async fn upload_file(&self, request: UploadRequest) -> Result<UploadedFile, ApiError> {
        let mut uploaded = self.0.upload_file(request).await?;
        uploaded.file_name = uploaded.file_name.replace(' ', "%20");
        Ok(uploaded)
    }

    async fn list_file_versions(
        &self,
        auth: &Authorization,
        request: ListFileVersionsRequest,
    ) -> Result<FileVersionPage, ApiError> {
        self.0.list_file_versions(auth, request).await
    }

    async fn delete_file_version(
        &self,
        auth: &Authorization,
        file_name: &str,
        file_id: &str,
    ) -> Result<(), ApiError> {
        self.0.delete_file_version(auth, file_name, file_id).await
    }
}

#[tokio::test]
async fn test_download_url_uses_local_object_name() {
    let mock = common::mock();
    common::init_tracing();
    let registry = ProviderRegistry::new(Arc::new(EncodedEcho(mock.clone())));
    let provider = registry.provider(&common::config()).unwrap();

    let mut file = common::image(Some("a b"), "h1");
    provider.upload(&mut file).await.unwrap();

    assert_eq!(mock.versions("a b/h1.png").len(), 1);
    assert_eq!(
        file.url.as_deref(),
        Some(format!("{}/file/media/a b/h1.png", MOCK_DOWNLOAD_URL).as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_upload_url_fetch_is_backed_off() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.fail_times(Call::GetUploadUrl, 2, status_error(503));

    provider.upload(&mut common::image(None, "h1")).await.unwrap();

    assert_eq!(
        mock.intervals(Call::GetUploadUrl),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(mock.calls(Call::UploadFile), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_uploads_share_one_session() {
    let mock = common::mock().with_latency(Duration::from_millis(250));
    let (_registry, provider) = common::setup(&mock);

    let mut files: Vec<_> = (0..8)
        .map(|n| common::image(Some("batch"), &format!("h{}", n)))
        .collect();
    let results = join_all(files.iter_mut().map(|file| provider.upload(file))).await;

    assert!(results.iter().all(Result::is_ok));
    assert!(files.iter().all(|file| file.url.is_some()));
    assert_eq!(mock.calls(Call::Authorize), 1);
    assert_eq!(mock.calls(Call::ListBuckets), 1);
}

#[tokio::test]
async fn test_bad_credentials_fail_initialization() {
    let mock = common::mock();
    let registry = common::registry(&mock);
    let provider = registry
        .provider(&::common::config::ProviderConfig::new(
            common::ACCOUNT_ID,
            "wrong-key",
            common::BUCKET,
        ))
        .unwrap();

    let error = provider
        .upload(&mut common::image(None, "h1"))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Authorization(_)));
    assert_eq!(common::status_of(&error), Some(401));
    assert_eq!(mock.calls(Call::GetUploadUrl), 0);
}

#[tokio::test]
async fn test_missing_bucket_fails_initialization() {
    let mock = common::mock();
    let registry = common::registry(&mock);
    let provider = registry
        .provider(&::common::config::ProviderConfig::new(
            common::ACCOUNT_ID,
            common::APPLICATION_KEY,
            "archive",
        ))
        .unwrap();

    let error = provider
        .upload(&mut common::image(None, "h1"))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::BucketNotFound(ref name) if name == "archive"));
}
