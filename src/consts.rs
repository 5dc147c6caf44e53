use std::time::Duration;

/// Default period of the host polling timer.
pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_millis(100);

/// Allowed time past the exposure end while the frame is being transferred.
/// Covers relatively large link-layer delays.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Allowed time past the exposure end before the camera starts transferring.
/// GigE cameras are precise, so this stays short.
pub const EXPOSURE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound for popping a finished buffer off the acquisition stream.
pub const POP_BUFFER_TIMEOUT: Duration = Duration::from_millis(100);

/// Temperature reported by cameras that have no temperature sensor.
pub const TEMPERATURE_UNSUPPORTED: f64 = -150.0;

/// No GVCP call reports the pixel pitch, so it is assumed (in micrometers).
pub const DEFAULT_PIXEL_PITCH_UM: f64 = 5.5;

/// Color filter pattern tagged on every frame.
pub const BAYER_PATTERN: &str = "GRBG";

/// Device name used when the camera doesn't report a model name.
pub const UNKNOWN_NAME: &str = "None";

/// Model identifiers matched (as substrings) against the reported model name.
pub mod models {
    pub const BLACKFLY: &str = "BFLY-PGE-31S4M";
    pub const PROSILICA: &str = "GT6600C";
}

/// GenICam feature names and values written by the driver.
pub mod features {
    pub const USER_SET_DEFAULT_SELECTOR: &str = "UserSetDefaultSelector";
    pub const USER_SET_LOAD: &str = "UserSetLoad";
    pub const DEFAULT: &str = "Default";

    pub const TRIGGER_SOFTWARE: &str = "Software";
    pub const OFF: &str = "Off";

    pub const PIXEL_FORMAT: &str = "PixelFormat";
    pub const MONO8: &str = "Mono8";
    pub const EXPOSURE_COMPENSATION_AUTO: &str = "pgrExposureCompensationAuto";
    pub const SHARPNESS_AUTO: &str = "SharpnessAuto";

    pub const SENSOR_DIGITIZATION_TAPS: &str = "SensorDigitizationTaps";
    pub const FOUR: &str = "Four";
    pub const BALANCE_WHITE_AUTO: &str = "BalanceWhiteAuto";
    pub const DEVICE_TEMPERATURE_SELECTOR: &str = "DeviceTemperatureSelector";
    pub const MAIN: &str = "Main";
    pub const DEVICE_TEMPERATURE: &str = "DeviceTemperature";
}

/// FITS keywords added to every written frame.
pub mod fits {
    pub const CCD_TEMP: &str = "CCD-TEMP";
    pub const EGAIN: &str = "EGAIN";
    pub const BAYERPAT: &str = "BAYERPAT";
}
