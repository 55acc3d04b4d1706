//! Shared API type definitions
//!
//! This crate contains the API types shared between the SR-IOV DRA driver and
//! its clients: the opaque `VfConfig` device configuration and the subset of the
//! `resource.k8s.io` allocation types the driver consumes.

pub mod resource;
pub mod virtualfunction;

pub use resource::*;
pub use virtualfunction::*;
