/**
 * Status-driven retry policies and the backoff
 *  executor wrapped around remote calls.
 */
pub mod backoff;
pub mod error;
/**
 * Reusable upload credentials.
 */
pub mod pool;
pub mod provider;
/**
 * Tenant state keyed by configuration fingerprint.
 */
pub mod registry;
/**
 * Authenticated sessions, bucket resolution
 *  and the periodic refresh loop.
 */
pub mod session;

pub use backoff::{execute_with_backoff, RetryAction, RetryPolicy, RetryState, Verdict};
pub use error::{ProviderError, Result};
pub use pool::UploadTokenPool;
pub use provider::Provider;
pub use registry::ProviderRegistry;
pub use session::{ProviderOptions, Session, SessionManager, DEFAULT_REFRESH_INTERVAL};

pub mod prelude {
    pub use crate::{Provider, ProviderConfig, ProviderError, ProviderOptions, ProviderRegistry};
    pub use common::file::UploadFile;
}

pub use common::config::ProviderConfig;
