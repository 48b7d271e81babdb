//! Shared building blocks for the virtfleet tools.
//!
//! Holds the error taxonomy, the typed resource records exchanged with the
//! cluster control plane, the hosts-file format, and the YAML bridge used to
//! load user templates.

pub mod error;
pub mod hosts;
pub mod resources;
pub mod yaml;

pub use error::{Error, Result};

/// Label stamped into instantiated VM definitions and propagated to their
/// launcher pods. Pod-to-VM correlation matches this label exactly.
pub const VM_LABEL: &str = "virtfleet.io/vm";
