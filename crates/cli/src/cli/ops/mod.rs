pub mod delete;
pub mod init;
pub mod upload;
pub mod version;

pub use delete::Delete;
pub use init::Init;
pub use upload::Upload;
pub use version::Version;
