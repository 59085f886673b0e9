//! CLI command implementations

pub mod hook;
pub mod init;
pub mod review;

pub use hook::HookArgs;
pub use init::InitArgs;
pub use review::ReviewArgs;
