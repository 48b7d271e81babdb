//! Fleet provisioning against the cluster control plane.
//!
//! The control plane is reached exclusively through its CLI, wrapped by
//! [`client::CtlClient`]; everything above it is readiness polling and
//! batch lifecycle sequencing.

pub mod client;
pub mod lifecycle;
pub mod poll;
pub mod provision;
