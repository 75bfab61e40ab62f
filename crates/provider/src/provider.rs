use std::sync::Arc;

use common::api::{FileVersion, ListFileVersionsRequest, UploadCredential, UploadRequest};
use common::file::{download_url, UploadFile};
use futures::future::try_join_all;

use crate::backoff::{RetryPolicy, Verdict};
use crate::error::{ProviderError, Result};
use crate::session::{Session, SessionManager};

/// Upload and delete for one tenant.
///
/// Cheap to clone; every clone shares the same session, bucket and upload
/// credential pool.
#[derive(Debug, Clone)]
pub struct Provider {
    session: Arc<SessionManager>,
    backoff: RetryPolicy,
    upload_policy: RetryPolicy,
}

impl Provider {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            backoff: RetryPolicy::backoff(),
            upload_policy: RetryPolicy::upload(),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Store `file` under its object name and set `file.url`.
    pub async fn upload(&self, file: &mut UploadFile) -> Result<()> {
        self.session.arm_refresh();
        let session = self.session.current_session().await?;
        let bucket = self.session.current_bucket().await?;
        let file_name = file.object_name();
        let pool = self.session.uploads();

        let backoff = &self.backoff;
        let current: &Session = &session;
        let bucket_id = bucket.bucket_id.as_str();

        let mut state = self.upload_policy.start();
        let mut held: Option<UploadCredential> = None;
        loop {
            let credential = match held.take() {
                Some(credential) => credential,
                None => {
                    pool.acquire(move || {
                        backoff.execute(move || current.get_upload_url(bucket_id))
                    })
                    .await?
                }
            };

            tracing::debug!(
                file_name = %file_name,
                attempt = state.attempts() + 1,
                "uploading file"
            );
            let request =
                UploadRequest::new(&credential, &file_name, &file.mime, file.buffer.clone());
            let error = match current.upload_file(request).await {
                Ok(uploaded) => {
                    pool.release(credential);
                    let url =
                        download_url(current.download_url(), &bucket.bucket_name, &file_name);
                    tracing::info!(
                        file_name = %file_name,
                        file_id = %uploaded.file_id,
                        url = %url,
                        "uploaded file"
                    );
                    file.url = Some(url);
                    return Ok(());
                }
                Err(error) => error,
            };

            match state.on_error(&error) {
                Verdict::Retry { wait, reacquire } => {
                    tracing::debug!(
                        file_name = %file_name,
                        attempt = state.attempts(),
                        reacquire,
                        wait_ms = wait.as_millis() as u64,
                        "upload attempt failed: {}",
                        error
                    );
                    if reacquire {
                        pool.discard(credential);
                    } else {
                        held = Some(credential);
                    }
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
                Verdict::Fail => {
                    pool.discard(credential);
                    return Err(ProviderError::Api(error));
                }
                Verdict::Exhausted => {
                    pool.discard(credential);
                    return Err(ProviderError::UploadFailed {
                        file_name,
                        attempts: state.attempts(),
                        last: error,
                    });
                }
            }
        }
    }

    /// Delete every stored version of `file`'s object name.
    ///
    /// Deletions run concurrently; any failure fails the whole call.
    pub async fn delete(&self, file: &UploadFile) -> Result<()> {
        self.session.arm_refresh();
        let session = self.session.current_session().await?;
        let bucket = self.session.current_bucket().await?;
        let file_name = file.object_name();

        let current: &Session = &session;
        let versions = self
            .matching_versions(current, &bucket.bucket_id, &file_name)
            .await?;
        tracing::debug!(file_name = %file_name, versions = versions.len(), "deleting file versions");

        let backoff = &self.backoff;
        let deletions = versions.iter().map(move |version| {
            backoff.execute(move || {
                current.delete_file_version(&version.file_name, &version.file_id)
            })
        });
        try_join_all(deletions).await?;

        tracing::info!(file_name = %file_name, versions = versions.len(), "deleted file");
        Ok(())
    }

    /// Versions named exactly `file_name`, in server order.
    async fn matching_versions(
        &self,
        session: &Session,
        bucket_id: &str,
        file_name: &str,
    ) -> Result<Vec<FileVersion>> {
        let mut request = ListFileVersionsRequest {
            bucket_id: bucket_id.to_string(),
            start_file_name: Some(file_name.to_string()),
            prefix: Some(file_name.to_string()),
            ..Default::default()
        };

        let mut matched = Vec::new();
        loop {
            let page = {
                let request = &request;
                self.backoff
                    .execute(move || session.list_file_versions(request.clone()))
                    .await?
            };

            let leading = leading_matches(&page.files, file_name);
            let whole_page = leading == page.files.len();
            matched.extend(page.files.into_iter().take(leading));

            match (page.next_file_name, page.next_file_id) {
                (Some(next_name), Some(next_id)) if whole_page && next_name == file_name => {
                    request.start_file_id = Some(next_id);
                }
                _ => return Ok(matched),
            }
        }
    }
}

/// Length of the run of versions at the front of `files` named `file_name`.
///
/// The listing starts at `file_name`, so the run ends at the first version
/// with any other name, even one that shares it as a prefix.
pub(crate) fn leading_matches(files: &[FileVersion], file_name: &str) -> usize {
    files
        .iter()
        .take_while(|version| version.file_name == file_name)
        .count()
}
