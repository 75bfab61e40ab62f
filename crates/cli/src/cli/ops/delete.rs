use clap::Args;
use common::file::UploadFile;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Delete {
    /// Content hash the object was stored under
    #[arg(long)]
    pub hash: String,

    /// File extension, with or without the leading dot
    #[arg(long, default_value = "")]
    pub ext: String,

    /// Folder the object is stored under
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("delete failed: {0}")]
    Provider(#[from] b2_provider::ProviderError),
}

impl Delete {
    fn record(&self) -> UploadFile {
        let ext = if self.ext.is_empty() || self.ext.starts_with('.') {
            self.ext.clone()
        } else {
            format!(".{}", self.ext)
        };
        let record = UploadFile::new(&self.hash, ext, "", Vec::<u8>::new());
        match &self.path {
            Some(path) => record.with_path(path),
            None => record,
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Delete {
    type Error = DeleteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let record = self.record();
        let provider = ctx.provider()?;
        provider.delete(&record).await?;

        Ok(format!("Deleted {}", record.object_name()))
    }
}
