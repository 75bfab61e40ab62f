/**
 * The remote object-storage surface: request/response
 *  shapes and the `StorageApi` trait the provider is
 *  written against.
 */
pub mod api;
/**
 * Tenant configuration and its identity fingerprint.
 */
pub mod config;
pub mod error;
/**
 * The host's file record and object naming rules.
 */
pub mod file;
/**
 * `StorageApi` over HTTP, speaking the B2 native API.
 */
pub mod http;
pub mod testkit;

pub mod prelude {
    pub use crate::api::{
        Authorization, Bucket, FileVersion, FileVersionPage, ListFileVersionsRequest,
        StorageApi, UploadCredential, UploadRequest, UploadedFile,
    };
    pub use crate::config::{ConfigError, ProviderConfig};
    pub use crate::error::ApiError;
    pub use crate::file::{download_url, object_name, UploadFile};
    pub use crate::http::B2Client;
}
