//! SR-IOV virtual function lifecycle for Dynamic Resource Allocation
//!
//! The kubelet-side state of the driver: which VFs are prepared for which
//! claims, how they are bound, attached to pod networks and handed to
//! containers, and how that state survives restarts.

pub mod cdi;
pub mod checkpoint;
pub mod cni;
pub mod config;
pub mod consts;
pub mod device_state;
pub mod host;
pub mod k8s;
pub mod nri;
pub mod types;
