//! Shared setup for provider integration tests
#![allow(dead_code)]

use std::sync::Arc;

use ::common::config::ProviderConfig;
use ::common::error::ApiError;
use ::common::file::UploadFile;
use ::common::testkit::MockStorage;
use b2_provider::{Provider, ProviderError, ProviderOptions, ProviderRegistry};

pub const ACCOUNT_ID: &str = "0001a2b3c4d5";
pub const APPLICATION_KEY: &str = "K001application-key";
pub const BUCKET: &str = "media";

/// Route provider logs to the test harness; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("b2_provider=debug")
        .with_test_writer()
        .try_init();
}

pub fn config() -> ProviderConfig {
    ProviderConfig::new(ACCOUNT_ID, APPLICATION_KEY, BUCKET)
}

pub fn mock() -> MockStorage {
    MockStorage::new(ACCOUNT_ID, APPLICATION_KEY).with_bucket(BUCKET)
}

pub fn registry(mock: &MockStorage) -> ProviderRegistry {
    init_tracing();
    ProviderRegistry::new(Arc::new(mock.clone()))
}

pub fn registry_with(mock: &MockStorage, options: ProviderOptions) -> ProviderRegistry {
    init_tracing();
    ProviderRegistry::with_options(Arc::new(mock.clone()), options)
}

/// A registry over `mock` and a provider for the default config.
pub fn setup(mock: &MockStorage) -> (ProviderRegistry, Provider) {
    let registry = registry(mock);
    let provider = registry.provider(&config()).unwrap();
    (registry, provider)
}

pub fn image(path: Option<&str>, hash: &str) -> UploadFile {
    let file = UploadFile::new(hash, ".png", "image/png", format!("png bytes of {}", hash))
        .with_name(format!("{}.png", hash));
    match path {
        Some(path) => file.with_path(path),
        None => file,
    }
}

/// HTTP status of the remote error behind `error`.
pub fn status_of(error: &ProviderError) -> Option<u16> {
    error
        .api_error()
        .and_then(ApiError::status_code)
        .map(|status| status.as_u16())
}
