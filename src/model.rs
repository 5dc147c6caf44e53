use log::*;

use crate::{
    consts::{features, models},
    vision::{CameraDevice, PixelFormat},
    GigeResult,
};

/// The camera families the driver knows about.
///
/// Selected once by the factory from the reported model name; everything not listed
/// here behaves like `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraModel {
    #[default]
    Generic,
    /// FLIR/Point Grey BlackFly GigE (`BFLY-PGE-31S4M`).
    BlackFly,
    /// Allied Vision Prosilica GT (`GT6600C`).
    Prosilica,
}

impl CameraModel {
    pub const KNOWN: [CameraModel; 2] = [CameraModel::BlackFly, CameraModel::Prosilica];

    /// Picks the model whose identifier occurs in `model_name` (case-sensitive).
    pub fn from_model_name(model_name: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|model| model.identifier().is_some_and(|id| model_name.contains(id)))
            .unwrap_or(Self::Generic)
    }

    /// The substring identifying this model, if it is not the generic fallback.
    pub fn identifier(&self) -> Option<&'static str> {
        match self {
            Self::Generic => None,
            Self::BlackFly => Some(models::BLACKFLY),
            Self::Prosilica => Some(models::PROSILICA),
        }
    }

    /// Writes the vendor registers this model needs.
    ///
    /// Rejected writes are logged and skipped, the sequence always runs to the end.
    /// Returns the number of writes the camera rejected.
    pub fn configure_registers<D: CameraDevice>(&self, device: &mut D) -> usize {
        let results: Vec<(&str, GigeResult<()>)> = match self {
            Self::Generic => Vec::new(),
            Self::BlackFly => vec![
                (
                    features::PIXEL_FORMAT,
                    device.set_string_feature(features::PIXEL_FORMAT, features::MONO8),
                ),
                (
                    features::EXPOSURE_COMPENSATION_AUTO,
                    device.set_string_feature(features::EXPOSURE_COMPENSATION_AUTO, features::OFF),
                ),
                (
                    features::SHARPNESS_AUTO,
                    device.set_string_feature(features::SHARPNESS_AUTO, features::OFF),
                ),
                ("Binning", device.set_binning(1, 1)),
            ],
            Self::Prosilica => vec![
                (
                    features::SENSOR_DIGITIZATION_TAPS,
                    device.set_string_feature(features::SENSOR_DIGITIZATION_TAPS, features::FOUR),
                ),
                (
                    features::BALANCE_WHITE_AUTO,
                    device.set_string_feature(features::BALANCE_WHITE_AUTO, features::OFF),
                ),
                (
                    features::DEVICE_TEMPERATURE_SELECTOR,
                    device.set_string_feature(features::DEVICE_TEMPERATURE_SELECTOR, features::MAIN),
                ),
                (
                    features::PIXEL_FORMAT,
                    device.set_pixel_format(PixelFormat::BayerGr12),
                ),
                ("Binning", device.set_binning(1, 1)),
            ],
        };

        let mut rejected = 0;
        for (register, result) in results {
            if let Err(e) = result {
                warn!("{self:?}: couldn't write register {register} ({e})");
                rejected += 1;
            }
        }

        if rejected == 0 && *self != Self::Generic {
            info!("{self:?}: vendor registers configured");
        }

        rejected
    }

    /// Reads the sensor temperature in °C, or `sentinel` if the model has no sensor
    /// or the read fails.
    pub fn read_temperature<D: CameraDevice>(&self, device: &D, sentinel: f64) -> f64 {
        match self {
            Self::Generic | Self::BlackFly => sentinel,
            Self::Prosilica => device
                .float_feature(features::DEVICE_TEMPERATURE)
                .inspect_err(|e| debug!("Couldn't read the device temperature ({e})"))
                .unwrap_or(sentinel),
        }
    }

    /// Bit depth reported to the host.
    pub fn bit_depth(&self) -> i32 {
        match self {
            Self::Generic | Self::BlackFly => 8,
            // The sensor delivers 12 bits in 16-bit words; hosts only take 8 or 16.
            Self::Prosilica => 16,
        }
    }
}
