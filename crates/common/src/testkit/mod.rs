//! In-process test doubles for the storage API.
//!
//! [`MockStorage`] keeps real version state and lets tests script failures
//! per call kind, so retry, pooling and refresh behaviour can be exercised
//! without a network.
//!
//! # Example
//!
//! ```rust
//! use common::testkit::{status_error, Call, MockStorage};
//!
//! let mock = MockStorage::new("acct", "key").with_bucket("media");
//! mock.fail_next(Call::UploadFile, status_error(503));
//! assert_eq!(mock.calls(Call::UploadFile), 0);
//! ```

mod storage;

pub use storage::{
    connection_reset, rate_limited, status_error, Call, CallRecord, MockStorage,
    MOCK_API_URL, MOCK_DOWNLOAD_URL,
};
