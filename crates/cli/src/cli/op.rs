use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use b2_provider::{Provider, ProviderError, ProviderRegistry};
use common::http::B2Client;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use url::Url;

use crate::state::{AppState, StateError};

/// Resolve the log level.
///
/// Priority: explicit `--log-level` flag > config file `log_level` > warn.
pub fn resolve_log_level(
    explicit: Option<tracing::Level>,
    config_path: Option<PathBuf>,
) -> tracing::Level {
    if let Some(level) = explicit {
        return level;
    }
    AppState::load(config_path)
        .ok()
        .and_then(|state| state.config.log_level())
        .unwrap_or(tracing::Level::WARN)
}

/// Install a compact stderr logger filtered by `RUST_LOG`, defaulting to
/// `level`.
pub fn init_logging(level: tracing::Level) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid auth_url: {0}")]
    AuthUrl(#[from] url::ParseError),
    #[error("failed to create HTTP client: {0}")]
    Client(#[from] common::error::ApiError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Optional custom config path (defaults to ~/.b2up)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    /// Load the config and initialize a provider for it.
    pub fn provider(&self) -> Result<Provider, ContextError> {
        let state = AppState::load(self.config_path.clone())?;

        let client = match &state.config.auth_url {
            Some(auth_url) => B2Client::with_auth_url(Url::parse(auth_url)?)?,
            None => B2Client::new()?,
        };
        let registry = ProviderRegistry::new(Arc::new(client));
        Ok(registry.provider(&state.config.provider_config())?)
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
