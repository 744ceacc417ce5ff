//! Periodic capture
//!
//! - [`CaptureRegistry`]: target persistence and worker lifetimes
//! - [`CaptureWorker`]: one periodic capture loop per enabled target
//! - [`RetentionSweeper`]: bounded history per target

pub mod registry;
pub mod sweeper;
pub mod worker;

pub use registry::{CaptureRegistry, RegistrySettings};
pub use sweeper::{RetentionSweeper, SweepReport};
pub use worker::{CadenceCell, CaptureWorker, decode_image_data, mime_for};
