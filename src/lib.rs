//! Function scaler control plane.
//!
//! One [`scaler::Scaler`] runs per function. Replicas of the same scaler
//! contest a `"<function>-leader"` key through [`skiff_election`], and only
//! the current leader runs the autoscaling loop for that function.

pub mod config;
pub mod scaler;

pub use config::ConfigError;
pub use config::SkiffConfig;
pub use scaler::Autoscaler;
pub use scaler::LoggingAutoscaler;
pub use scaler::Scaler;
pub use scaler::ScalerError;
pub use scaler::ScalerSet;
pub use scaler::leader_key;
