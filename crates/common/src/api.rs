//! The remote object-storage surface the provider depends on.
//!
//! Request and response shapes follow the B2 native JSON API. The
//! [`StorageApi`] trait is stateless: every call that needs account
//! credentials takes the [`Authorization`] it should run under, so an
//! authorized session is just an API handle paired with one of these.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Result of authorizing an account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub account_id: String,
    pub authorization_token: String,
    /// Base URL for every account-level API call
    pub api_url: String,
    /// Base URL for public downloads
    pub download_url: String,
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("account_id", &self.account_id)
            .field("authorization_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_id: String,
    pub bucket_name: String,
}

/// An upload endpoint plus the token that authorizes uploads to it.
///
/// Deliberately not `Clone`: a credential has exactly one holder, either
/// an in-flight upload or the pool.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredential {
    pub bucket_id: String,
    pub upload_url: String,
    pub authorization_token: String,
}

impl UploadCredential {
    pub fn new(
        bucket_id: impl Into<String>,
        upload_url: impl Into<String>,
        authorization_token: impl Into<String>,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            upload_url: upload_url.into(),
            authorization_token: authorization_token.into(),
        }
    }
}

impl fmt::Debug for UploadCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCredential")
            .field("bucket_id", &self.bucket_id)
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

/// A single raw upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub upload_url: String,
    pub authorization_token: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadRequest {
    pub fn new(
        credential: &UploadCredential,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Self {
        Self {
            upload_url: credential.upload_url.clone(),
            authorization_token: credential.authorization_token.clone(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub upload_timestamp: u64,
}

/// One stored version of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub file_id: String,
    pub file_name: String,
    /// "upload", "hide", "start" or "folder"
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub upload_timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileVersionsRequest {
    pub bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,
}

/// One page of a version listing, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersionPage {
    pub files: Vec<FileVersion>,
    #[serde(default)]
    pub next_file_name: Option<String>,
    #[serde(default)]
    pub next_file_id: Option<String>,
}

#[async_trait]
pub trait StorageApi: Send + Sync + fmt::Debug {
    /// Exchange account credentials for an account authorization.
    async fn authorize(
        &self,
        account_id: &str,
        application_key: &str,
    ) -> Result<Authorization, ApiError>;

    /// List buckets visible to the account, filtered by name.
    async fn list_buckets(
        &self,
        auth: &Authorization,
        bucket_name: &str,
    ) -> Result<Vec<Bucket>, ApiError>;

    /// Request a fresh upload endpoint for a bucket.
    async fn get_upload_url(
        &self,
        auth: &Authorization,
        bucket_id: &str,
    ) -> Result<UploadCredential, ApiError>;

    /// Upload one object using a previously issued upload credential.
    async fn upload_file(&self, request: UploadRequest) -> Result<UploadedFile, ApiError>;

    /// List object versions, newest first within a name.
    async fn list_file_versions(
        &self,
        auth: &Authorization,
        request: ListFileVersionsRequest,
    ) -> Result<FileVersionPage, ApiError>;

    /// Permanently delete a single object version.
    async fn delete_file_version(
        &self,
        auth: &Authorization,
        file_name: &str,
        file_id: &str,
    ) -> Result<(), ApiError>;
}
