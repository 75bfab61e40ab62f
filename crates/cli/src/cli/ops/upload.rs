use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::Args;
use common::file::UploadFile;
use sha2::{Digest, Sha256};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Upload {
    /// Local file to upload
    pub file: PathBuf,

    /// Folder to store the object under
    #[arg(long)]
    pub path: Option<String>,

    /// Content type (guessed from the file extension if omitted)
    #[arg(long)]
    pub mime: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("upload failed: {0}")]
    Provider(#[from] b2_provider::ProviderError),
}

/// Build the host file record for `file`: the hash is the hex SHA-256 of
/// the content, the extension keeps its leading dot.
pub fn file_record(
    file: &Path,
    content: Bytes,
    path: Option<String>,
    mime: Option<String>,
) -> UploadFile {
    let hash = hex::encode(Sha256::digest(&content));
    let ext = file
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mime = mime.unwrap_or_else(|| {
        mime_guess::from_path(file)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let record = UploadFile::new(hash, ext, mime, content).with_name(name);
    match path {
        Some(path) => record.with_path(path),
        None => record,
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Upload {
    type Error = UploadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let content = tokio::fs::read(&self.file)
            .await
            .map_err(|source| UploadError::Read {
                path: self.file.clone(),
                source,
            })?;
        let mut record = file_record(
            &self.file,
            Bytes::from(content),
            self.path.clone(),
            self.mime.clone(),
        );

        let provider = ctx.provider()?;
        provider.upload(&mut record).await?;

        Ok(record.url.clone().unwrap_or_else(|| record.object_name()))
    }
}
