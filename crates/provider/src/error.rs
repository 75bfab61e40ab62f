use common::config::ConfigError;
use common::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("authorization failed: {0}")]
    Authorization(#[source] ApiError),
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("upload of {file_name} failed after {attempts} attempts: {last}")]
    UploadFailed {
        file_name: String,
        attempts: u32,
        #[source]
        last: ApiError,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ProviderError {
    /// The remote error behind this failure, if there is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Authorization(error) | Self::Api(error) => Some(error),
            Self::UploadFailed { last, .. } => Some(last),
            Self::InvalidConfig(_) | Self::BucketNotFound(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
