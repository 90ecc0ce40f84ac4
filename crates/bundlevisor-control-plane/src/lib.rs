pub mod config;
pub mod control_loop;
pub mod features;
pub mod shared;

pub use config::ControlPlaneConfig;
pub use control_loop::ControlLoop;
pub use shared::error::{ControlPlaneError, ControlPlaneResult};
