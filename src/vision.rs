use std::time::Duration;

use crate::GigeResult;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, int_enum::IntEnum)]
/// Status of an acquisition buffer as reported by the vision layer.
pub enum BufferStatus {
    Unknown = -1,
    /// The buffer holds a complete frame.
    Success = 0,
    /// The buffer is queued but nothing has arrived yet.
    Cleared = 1,
    Timeout = 2,
    MissingPackets = 3,
    WrongPacketId = 4,
    /// The frame doesn't fit into the buffer.
    SizeMismatch = 5,
    /// Frame data is arriving.
    Filling = 6,
    Aborted = 7,
}

impl BufferStatus {
    /// Decodes a raw status value. Values outside the known set decode to `Unknown`.
    pub fn from_raw(raw: i32) -> Self {
        Self::try_from(raw).ok().unwrap_or(Self::Unknown)
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, int_enum::IntEnum)]
/// Pixel formats used by the driver, with their PFNC codes.
pub enum PixelFormat {
    Mono8 = 0x0108_0001,
    Mono12 = 0x0110_0005,
    Mono16 = 0x0110_0007,
    BayerGr8 = 0x0108_0008,
    BayerGr12 = 0x0110_000C,
}

impl PixelFormat {
    /// GenICam display name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mono8 => "Mono8",
            Self::Mono12 => "Mono12",
            Self::Mono16 => "Mono16",
            Self::BayerGr8 => "BayerGR8",
            Self::BayerGr12 => "BayerGR12",
        }
    }

    /// Bits occupied by one pixel in the transferred payload.
    pub fn bits_per_pixel(&self) -> u32 {
        // PFNC encodes the occupied bits in the second byte
        (u32::from(*self) >> 16) & 0xFF
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Acquisition modes of a GenICam camera.
pub enum AcquisitionMode {
    #[default]
    Continuous,
    SingleFrame,
    MultiFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Setting of an automatic feature such as auto-exposure.
pub enum Auto {
    #[default]
    Off,
    Once,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// A sensor region, in camera (binned) pixels.
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Opens camera handles.
pub trait DeviceProvider {
    type Device: CameraDevice;

    /// Opens a camera by its device id, or the first reachable camera when `device_id` is `None`.
    fn open(&self, device_id: Option<&str>) -> GigeResult<Self::Device>;
}

/// An open camera handle.
///
/// Every call is independently fallible, mirroring the vision layer.
pub trait CameraDevice {
    type Stream: AcquisitionStream;

    fn model_name(&self) -> GigeResult<String>;
    fn vendor_name(&self) -> GigeResult<String>;
    fn device_id(&self) -> GigeResult<String>;

    fn x_binning_bounds(&self) -> GigeResult<(i32, i32)>;
    fn y_binning_bounds(&self) -> GigeResult<(i32, i32)>;
    fn x_offset_bounds(&self) -> GigeResult<(i32, i32)>;
    fn y_offset_bounds(&self) -> GigeResult<(i32, i32)>;
    fn width_bounds(&self) -> GigeResult<(i32, i32)>;
    fn height_bounds(&self) -> GigeResult<(i32, i32)>;
    /// Full sensor width and height.
    fn sensor_size(&self) -> GigeResult<(i32, i32)>;
    fn frame_rate_bounds(&self) -> GigeResult<(f64, f64)>;
    /// Exposure time bounds in microseconds.
    fn exposure_time_bounds(&self) -> GigeResult<(f64, f64)>;
    fn gain_bounds(&self) -> GigeResult<(f64, f64)>;

    fn binning(&self) -> GigeResult<(i32, i32)>;
    fn set_binning(&mut self, x: i32, y: i32) -> GigeResult<()>;
    fn region(&self) -> GigeResult<Region>;
    fn set_region(&mut self, region: Region) -> GigeResult<()>;

    fn set_gain(&mut self, gain: f64) -> GigeResult<()>;
    fn set_gain_auto(&mut self, auto: Auto) -> GigeResult<()>;
    /// Sets the exposure time in microseconds.
    fn set_exposure_time(&mut self, us: f64) -> GigeResult<()>;
    fn set_exposure_time_auto(&mut self, auto: Auto) -> GigeResult<()>;
    fn set_trigger(&mut self, source: &str) -> GigeResult<()>;
    fn set_pixel_format(&mut self, format: PixelFormat) -> GigeResult<()>;

    /// Size of one frame in bytes.
    fn payload(&self) -> GigeResult<usize>;

    fn set_string_feature(&mut self, feature: &str, value: &str) -> GigeResult<()>;
    fn float_feature(&self, feature: &str) -> GigeResult<f64>;
    fn execute_command(&mut self, command: &str) -> GigeResult<()>;

    fn create_stream(&mut self) -> GigeResult<Self::Stream>;
    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> GigeResult<()>;
    fn start_acquisition(&mut self) -> GigeResult<()>;
    fn stop_acquisition(&mut self) -> GigeResult<()>;
    fn abort_acquisition(&mut self) -> GigeResult<()>;
    fn software_trigger(&mut self) -> GigeResult<()>;
}

/// The receive side of an acquisition: a queue of buffers filled by the camera.
pub trait AcquisitionStream {
    type Buffer: FrameBuffer;

    /// Allocates a buffer able to hold `size` bytes.
    fn new_buffer(&self, size: usize) -> Self::Buffer;

    /// Queues a buffer for filling.
    fn push_buffer(&mut self, buffer: Self::Buffer);

    fn try_pop_buffer(&mut self) -> Option<Self::Buffer>;

    /// Pops a completed buffer, waiting at most `timeout`.
    fn timeout_pop_buffer(&mut self, timeout: Duration) -> Option<Self::Buffer>;
}

/// A shared handle to an acquisition buffer. Clones refer to the same buffer.
pub trait FrameBuffer: Clone {
    fn raw_status(&self) -> i32;

    fn status(&self) -> BufferStatus {
        BufferStatus::from_raw(self.raw_status())
    }

    /// Calls `f` with the buffer contents. The slice is only valid for the call.
    fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R;

    /// Whether both handles refer to the same buffer.
    fn is_same(&self, other: &Self) -> bool;
}
