use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Account ID or application key ID
    #[arg(long)]
    pub account_id: String,

    /// Application key
    #[arg(long)]
    pub application_key: String,

    /// Bucket to upload into
    #[arg(long)]
    pub bucket: String,

    /// Default log level for later commands
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Authorization endpoint (defaults to the public B2 endpoint)
    #[arg(long)]
    pub auth_url: Option<url::Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] common::config::ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_level: self.log_level.map(|level| level.to_string().to_lowercase()),
            auth_url: self.auth_url.as_ref().map(|url| url.to_string()),
            ..AppConfig::new(&self.account_id, &self.application_key, &self.bucket)
        };
        config.provider_config().validate()?;

        let state = AppState::init(ctx.config_path.clone(), config)?;

        Ok(format!(
            "Initialized b2up directory at: {}\n\
             - Config: {}\n\
             - Bucket: {}",
            state.app_dir.display(),
            state.config_path.display(),
            state.config.bucket
        ))
    }
}
