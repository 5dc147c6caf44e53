//! A GigE Vision camera driver that exposes machine-vision cameras as CCD devices
//! for astronomical device-control hosts.
//!
//! The crate sits between two fixed contracts. On one side is the vision-protocol
//! layer, described by the traits in [vision]. On the other side is the host,
//! which drives a [ccd::GigeCcd] through its lifecycle calls and a periodic timer,
//! and receives notifications through the [ccd::CcdHost] trait.
//!
//! A simulated vision layer lives in [sim], so the exposure state machine can be
//! exercised without hardware.
//!
//! ## Example
//!
//! More examples are provided in the `demos/` folder.
//!
//! ```no_run
//! use gige_ccd::{ccd::LogHost, factory, sim::SimProvider, util::CcdUtil};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = SimProvider::new("GT6600C");
//!     let mut devices = factory::discover(provider, |_| LogHost);
//!
//!     if let Some(ccd) = devices.first_mut() {
//!         ccd.connect()?;
//!         ccd.update_properties();
//!
//!         let frame = ccd.capture_frame(0.5).await?;
//!         println!("Received {} bytes", frame.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Contains timeouts, sentinel values, feature names and model identifiers.
pub mod consts;

/// Contains the driver configuration and host-facing enums.
pub mod settings;

/// Contains the bounded property type used for every numeric camera setting.
pub mod property;

/// Contains the traits describing the vision-protocol layer.
pub mod vision;

/// Contains the model-specific behaviour of the supported camera families.
pub mod model;

/// Contains the camera adapter and its exposure state machine.
pub mod cam;

/// Contains the camera factory and the driver's initialization entry point.
pub mod factory;

/// Contains the device front-end driven by the host.
pub mod ccd;

/// Contains async convenience methods for driving the front-end.
pub mod util;

/// Contains an in-process simulated vision layer.
pub mod sim;

/// Crate-specific error enum.
/// Every fallible function of the driver returns a Result with this error type.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GigeError {
    #[error("Vision layer call `{call}` failed: {reason}")]
    Device { call: &'static str, reason: String },

    #[error("Feature `{feature}` rejected the write: {reason}")]
    Feature { feature: String, reason: String },

    #[error("Camera is not connected")]
    NotConnected,

    #[error("Couldn't find a reachable camera (device id: {device_id:?})")]
    NoDeviceFound { device_id: Option<String> },

    #[error("Could not create buffer, maybe camera has been disconnected?")]
    BufferAllocation,

    #[error("Unexpected image buffer size (expected: {expected}, camera payload: {payload})")]
    PayloadMismatch { expected: usize, payload: usize },

    #[error("Exposure failed: {0}")]
    ExposureFailed(String),

    #[error("Exposure did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Invalid driver configuration: {0}")]
    Config(String),
}

impl GigeError {
    /// Shorthand for a failed call into the vision layer.
    pub fn device(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Device {
            call,
            reason: reason.into(),
        }
    }
}

pub type GigeResult<T> = Result<T, GigeError>;
