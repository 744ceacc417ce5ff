//! Data models
//!
//! Shared between studio-agent and host surfaces (REST, dashboards).
//! Timestamps are Unix milliseconds (`i64`).

pub mod artifact;
pub mod capture_target;
pub mod status;

// Re-exports
pub use artifact::*;
pub use capture_target::*;
pub use status::*;
