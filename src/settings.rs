use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, FileFormat};
use serde::Deserialize;

use crate::{consts, GigeError, GigeResult};

#[repr(i8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, int_enum::IntEnum)]
/// Kind of frame the host asks for.
pub enum FrameType {
    #[default]
    Light = 0,
    /// Zero-length exposure, the camera clamps it to its shortest exposure.
    Bias = 1,
    Dark = 2,
    Flat = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Capabilities advertised to the host.
pub struct CcdCapabilities {
    pub can_abort: bool,
    pub can_bin: bool,
    pub can_subframe: bool,
    pub has_cooler: bool,
    pub has_shutter: bool,
}

impl Default for CcdCapabilities {
    fn default() -> Self {
        Self {
            can_abort: true,
            can_bin: true,
            can_subframe: true,
            has_cooler: false,
            has_shutter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
/// Tunables of the device front-end.
///
/// Every field is optional in a configuration file; missing ones take the defaults.
/// Durations are given in milliseconds:
///
/// ```toml
/// polling_period_ms = 250
/// transfer_timeout_ms = 8000
/// bayer_pattern = "RGGB"
/// ```
pub struct DriverSettings {
    /// Period of the polling timer.
    #[serde(rename = "polling_period_ms", deserialize_with = "millis::deserialize")]
    pub polling_period: Duration,
    /// Allowed time past the exposure end while the frame is transferred.
    #[serde(rename = "transfer_timeout_ms", deserialize_with = "millis::deserialize")]
    pub transfer_timeout: Duration,
    /// Allowed time past the exposure end before the transfer starts.
    #[serde(rename = "exposure_timeout_ms", deserialize_with = "millis::deserialize")]
    pub exposure_timeout: Duration,
    /// Longest wait for a finished buffer to come off the stream.
    #[serde(rename = "pop_timeout_ms", deserialize_with = "millis::deserialize")]
    pub pop_timeout: Duration,
    /// Temperature meaning "no sensor".
    pub temperature_sentinel: f64,
    /// Color filter pattern tagged on the frames.
    pub bayer_pattern: String,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            polling_period: consts::DEFAULT_POLLING_PERIOD,
            transfer_timeout: consts::TRANSFER_TIMEOUT,
            exposure_timeout: consts::EXPOSURE_TIMEOUT,
            pop_timeout: consts::POP_BUFFER_TIMEOUT,
            temperature_sentinel: consts::TEMPERATURE_UNSUPPORTED,
            bayer_pattern: consts::BAYER_PATTERN.to_string(),
        }
    }
}

impl DriverSettings {
    /// Loads the settings from a configuration file (any format the `config` crate knows,
    /// picked by extension), then from `GIGE_CCD_*` environment variables.
    ///
    /// * `config_path` - Path of the file, the extension may be left out.
    pub fn load(config_path: &str) -> GigeResult<Self> {
        let builder = Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(config::Environment::with_prefix("GIGE_CCD"));

        Self::build(builder)
    }

    /// Parses the settings from TOML text.
    pub fn from_toml(text: &str) -> GigeResult<Self> {
        Self::build(Config::builder().add_source(config::File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> GigeResult<Self> {
        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| GigeError::Config(e.to_string()))
    }

    pub fn with_polling_period(mut self, period: Duration) -> Self {
        self.polling_period = period;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn with_exposure_timeout(mut self, timeout: Duration) -> Self {
        self.exposure_timeout = timeout;
        self
    }

    /// Whether `temperature` is a real reading rather than the sentinel.
    pub fn is_real_temperature(&self, temperature: f64) -> bool {
        temperature != self.temperature_sentinel
    }
}
