//! Prepared-device bookkeeping for resource claims
//!
//! [`DeviceStateManager`] owns the prepared map and its checkpoint;
//! [`config_resolver`] turns the claim's opaque configs into per-request [`api_types::VfConfig`]s.

pub mod config_resolver;
mod manager;

pub use manager::DeviceStateError;
pub use manager::DeviceStateManager;
