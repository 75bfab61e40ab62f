use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A file record handed over by the host for upload or deletion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadFile {
    /// Original file name, informational only
    #[serde(default)]
    pub name: String,
    /// Optional folder the object lives under
    #[serde(default)]
    pub path: Option<String>,
    pub hash: String,
    /// Extension including the leading dot
    pub ext: String,
    pub mime: String,
    #[serde(skip)]
    pub buffer: Bytes,
    /// Public download URL, set after a successful upload
    #[serde(default)]
    pub url: Option<String>,
}

impl UploadFile {
    pub fn new(
        hash: impl Into<String>,
        ext: impl Into<String>,
        mime: impl Into<String>,
        buffer: impl Into<Bytes>,
    ) -> Self {
        Self {
            hash: hash.into(),
            ext: ext.into(),
            mime: mime.into(),
            buffer: buffer.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The key this file is stored under in the bucket.
    pub fn object_name(&self) -> String {
        object_name(self.path.as_deref(), &self.hash, &self.ext)
    }
}

/// `{path}/{hash}{ext}`, or `{hash}{ext}` when there is no path.
pub fn object_name(path: Option<&str>, hash: &str, ext: &str) -> String {
    match path {
        Some(path) if !path.is_empty() => format!("{}/{}{}", path, hash, ext),
        _ => format!("{}{}", hash, ext),
    }
}

/// Public URL of an object: `{download_base}/file/{bucket}/{file_name}`.
pub fn download_url(download_base: &str, bucket_name: &str, file_name: &str) -> String {
    format!("{}/file/{}/{}", download_base, bucket_name, file_name)
}
