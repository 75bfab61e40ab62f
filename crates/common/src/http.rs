//! [`StorageApi`] over the B2 native JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use url::Url;

use crate::api::{
    Authorization, Bucket, FileVersionPage, ListFileVersionsRequest, StorageApi,
    UploadCredential, UploadRequest, UploadedFile,
};
use crate::error::ApiError;

pub const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com";

const API_PATH: &str = "b2api/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Content type that asks the server to infer one from the file name
const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

#[derive(Debug, Clone)]
pub struct B2Client {
    auth_url: Url,
    client: Client,
}

/// Error body returned by every B2 endpoint.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<Bucket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsRequest<'a> {
    account_id: &'a str,
    bucket_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlRequest<'a> {
    bucket_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileVersionRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
}

impl B2Client {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_auth_url(Url::parse(DEFAULT_AUTH_URL)?)
    }

    /// Use a different authorization endpoint (e.g. a test server).
    pub fn with_auth_url(auth_url: Url) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { auth_url, client })
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    fn endpoint(base: &str, call: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            API_PATH,
            call
        ))?)
    }

    async fn post_json<B, R>(&self, auth: &Authorization, call: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = Self::endpoint(&auth.api_url, call)?;
        tracing::trace!(%url, "calling storage API");
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, &auth.authorization_token)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, ApiError> {
        if response.status().is_success() {
            response
                .json::<R>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: Response) -> ApiError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => (parsed.code, parsed.message),
            Err(_) => (
                status
                    .canonical_reason()
                    .unwrap_or("unknown")
                    .to_lowercase()
                    .replace(' ', "_"),
                body,
            ),
        };

        ApiError::Status {
            status,
            code,
            message,
            retry_after,
        }
    }
}

/// Percent-encode each path segment, keeping the separators.
fn encode_file_name(file_name: &str) -> String {
    file_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl StorageApi for B2Client {
    async fn authorize(
        &self,
        account_id: &str,
        application_key: &str,
    ) -> Result<Authorization, ApiError> {
        let url = Self::endpoint(self.auth_url.as_str(), "b2_authorize_account")?;
        let response = self
            .client
            .get(url)
            .basic_auth(account_id, Some(application_key))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn list_buckets(
        &self,
        auth: &Authorization,
        bucket_name: &str,
    ) -> Result<Vec<Bucket>, ApiError> {
        let request = ListBucketsRequest {
            account_id: &auth.account_id,
            bucket_name,
        };
        let response: ListBucketsResponse =
            self.post_json(auth, "b2_list_buckets", &request).await?;
        Ok(response.buckets)
    }

    async fn get_upload_url(
        &self,
        auth: &Authorization,
        bucket_id: &str,
    ) -> Result<UploadCredential, ApiError> {
        self.post_json(auth, "b2_get_upload_url", &GetUploadUrlRequest { bucket_id })
            .await
    }

    async fn upload_file(&self, request: UploadRequest) -> Result<UploadedFile, ApiError> {
        let checksum = hex::encode(Sha1::digest(&request.data));
        let content_type = if request.content_type.is_empty() {
            AUTO_CONTENT_TYPE
        } else {
            request.content_type.as_str()
        };

        let response = self
            .client
            .post(request.upload_url.as_str())
            .header(AUTHORIZATION, &request.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(&request.file_name))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, request.data.len())
            .header("X-Bz-Content-Sha1", checksum)
            .body(request.data)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn list_file_versions(
        &self,
        auth: &Authorization,
        request: ListFileVersionsRequest,
    ) -> Result<FileVersionPage, ApiError> {
        self.post_json(auth, "b2_list_file_versions", &request).await
    }

    async fn delete_file_version(
        &self,
        auth: &Authorization,
        file_name: &str,
        file_id: &str,
    ) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_json(
                auth,
                "b2_delete_file_version",
                &DeleteFileVersionRequest { file_name, file_id },
            )
            .await?;
        Ok(())
    }
}
