//! Network setup through external CNI plugins
//!
//! - [`CniRuntime`]: ADD/DEL per prepared device, with retry and cleanup
//! - [`ResultFiles`]: per-pod result file shared with containers
//! - [`netconf`]: netconf parsing and deviceID/MAC injection

pub mod backoff;
pub mod error;
pub mod exec;
pub mod netconf;
pub mod result_file;
pub mod runtime;
pub mod status;

pub use backoff::Backoff;
pub use error::CniError;
pub use exec::ExecOutput;
pub use exec::PluginExec;
pub use exec::RawExec;
pub use result_file::ResultFiles;
pub use runtime::CniRuntime;
