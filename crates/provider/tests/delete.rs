//! Integration tests for deleting every stored version of an object

mod common;

use std::time::Duration;

use ::common::testkit::{status_error, Call, MockStorage};
use b2_provider::ProviderError;

#[tokio::test]
async fn test_delete_removes_every_version() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    for _ in 0..3 {
        mock.seed_version("media", "a/h1.png");
    }

    provider.delete(&common::image(Some("a"), "h1")).await.unwrap();

    assert!(mock.versions("a/h1.png").is_empty());
    assert_eq!(mock.calls(Call::DeleteFileVersion), 3);
}

#[tokio::test]
async fn test_delete_leaves_names_sharing_the_prefix() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.seed_version("media", "a/h1.png");
    mock.seed_version("media", "a/h1.png.thumb");
    mock.seed_version("media", "a/h1.pngx");

    provider.delete(&common::image(Some("a"), "h1")).await.unwrap();

    assert!(mock.versions("a/h1.png").is_empty());
    assert_eq!(mock.versions("a/h1.png.thumb").len(), 1);
    assert_eq!(mock.versions("a/h1.pngx").len(), 1);
}

#[tokio::test]
async fn test_delete_missing_object_succeeds() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.seed_version("media", "a/other.png");

    provider.delete(&common::image(Some("a"), "h1")).await.unwrap();

    assert_eq!(mock.calls(Call::DeleteFileVersion), 0);
    assert_eq!(mock.versions("a/other.png").len(), 1);
}

#[tokio::test]
async fn test_delete_follows_continuation_pages() {
    let mock = MockStorage::new(common::ACCOUNT_ID, common::APPLICATION_KEY)
        .with_bucket(common::BUCKET)
        .with_page_size(2);
    let (_registry, provider) = common::setup(&mock);
    for _ in 0..5 {
        mock.seed_version("media", "doc.pdf");
    }
    mock.seed_version("media", "doc.pdf.sig");

    provider
        .delete(&::common::file::UploadFile::new("doc", ".pdf", "application/pdf", Vec::<u8>::new()))
        .await
        .unwrap();

    assert!(mock.versions("doc.pdf").is_empty());
    assert_eq!(mock.versions("doc.pdf.sig").len(), 1);
    assert_eq!(mock.calls(Call::ListFileVersions), 3);
    assert_eq!(mock.calls(Call::DeleteFileVersion), 5);
}

#[tokio::test]
async fn test_delete_failure_fails_the_operation() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.seed_version("media", "a/h1.png");
    mock.seed_version("media", "a/h1.png");
    mock.fail_next(Call::DeleteFileVersion, status_error(500));

    let error = provider
        .delete(&common::image(Some("a"), "h1"))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Api(_)));
    assert_eq!(common::status_of(&error), Some(500));
}

#[tokio::test(start_paused = true)]
async fn test_delete_backs_off_while_unavailable() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);
    mock.seed_version("media", "a/h1.png");
    mock.fail_next(Call::ListFileVersions, status_error(503));
    mock.fail_next(Call::DeleteFileVersion, status_error(429).with_retry_after(3));

    provider.delete(&common::image(Some("a"), "h1")).await.unwrap();

    assert_eq!(mock.intervals(Call::ListFileVersions), vec![Duration::from_secs(1)]);
    assert_eq!(mock.intervals(Call::DeleteFileVersion), vec![Duration::from_secs(3)]);
    assert!(mock.versions("a/h1.png").is_empty());
}

#[tokio::test]
async fn test_upload_then_delete_leaves_nothing() {
    let mock = common::mock();
    let (_registry, provider) = common::setup(&mock);

    let mut file = common::image(Some("uploads/2024"), "abc123");
    provider.upload(&mut file).await.unwrap();
    provider.upload(&mut file).await.unwrap();
    assert_eq!(mock.versions("uploads/2024/abc123.png").len(), 2);

    provider.delete(&file).await.unwrap();
    assert!(mock.versions("uploads/2024/abc123.png").is_empty());
}
