//! A simulated GigE camera.
//!
//! The simulator keeps its state behind a shared handle, so a test can hold on to the
//! [SimProvider] after handing a clone to the driver, then script buffer statuses,
//! make calls fail, and inspect what the driver wrote.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::Rng as _;

use crate::{
    consts::features,
    vision::{
        AcquisitionMode, AcquisitionStream, Auto, BufferStatus, CameraDevice, DeviceProvider,
        FrameBuffer, PixelFormat, Region,
    },
    GigeError, GigeResult,
};

pub const DEFAULT_SENSOR: (i32, i32) = (64, 48);
pub const DEFAULT_DEVICE_ID: &str = "SIM-0001";

#[derive(Debug)]
struct SimState {
    reachable: bool,
    model_name: String,
    vendor_name: String,
    device_id: String,

    sensor: (i32, i32),
    region: Region,
    binning: (i32, i32),
    max_binning: i32,
    pixel_format: PixelFormat,
    gain: f64,
    exposure_us: f64,
    gain_auto: Auto,
    exposure_auto: Auto,
    trigger: Option<String>,
    acquisition_mode: AcquisitionMode,
    acquiring: bool,

    features: HashMap<String, String>,
    float_features: HashMap<String, f64>,
    rejected_features: HashSet<String>,
    failing_calls: HashSet<&'static str>,
    payload_override: Option<usize>,

    /// Statuses the next triggered buffer walks through, one per status query.
    status_script: VecDeque<BufferStatus>,
    queued: VecDeque<SimBuffer>,

    calls: Vec<&'static str>,
    opens: usize,
    live_streams: usize,
    triggers: usize,
}

impl SimState {
    fn call(&mut self, name: &'static str) -> GigeResult<()> {
        self.calls.push(name);

        if self.failing_calls.contains(name) {
            return Err(GigeError::device(name, "simulated failure"));
        }

        Ok(())
    }

    fn binned_sensor(&self) -> (i32, i32) {
        (self.sensor.0 / self.binning.0, self.sensor.1 / self.binning.1)
    }

    fn payload(&self) -> usize {
        self.payload_override.unwrap_or_else(|| {
            let bytes_per_pixel = (self.pixel_format.bits_per_pixel() / 8) as usize;
            self.region.width.max(0) as usize * self.region.height.max(0) as usize * bytes_per_pixel
        })
    }
}

/// Entry point of the simulator: a single reachable camera.
#[derive(Debug, Clone)]
pub struct SimProvider {
    state: Arc<Mutex<SimState>>,
}

impl SimProvider {
    /// A reachable camera reporting `model_name`, with a small Mono8 sensor.
    pub fn new(model_name: &str) -> Self {
        let (w, h) = DEFAULT_SENSOR;

        let state = SimState {
            reachable: true,
            model_name: model_name.to_string(),
            vendor_name: "Simulated Vision".to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            sensor: DEFAULT_SENSOR,
            region: Region {
                x: 0,
                y: 0,
                width: w,
                height: h,
            },
            binning: (1, 1),
            max_binning: 4,
            pixel_format: PixelFormat::Mono8,
            gain: 0.0,
            exposure_us: 10_000.0,
            gain_auto: Auto::Continuous,
            exposure_auto: Auto::Continuous,
            trigger: None,
            acquisition_mode: AcquisitionMode::Continuous,
            acquiring: false,
            features: HashMap::new(),
            float_features: HashMap::from([(features::DEVICE_TEMPERATURE.to_string(), 31.5)]),
            rejected_features: HashSet::new(),
            failing_calls: HashSet::new(),
            payload_override: None,
            status_script: VecDeque::new(),
            queued: VecDeque::new(),
            calls: Vec::new(),
            opens: 0,
            live_streams: 0,
            triggers: 0,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A provider with no reachable camera.
    pub fn unreachable() -> Self {
        let provider = Self::new("");
        provider.set_reachable(false);
        provider
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Statuses the next triggered buffer reports, one per query; the last one sticks.
    /// Without a script a triggered buffer goes `Cleared`, `Filling`, `Success`.
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = BufferStatus>) {
        self.lock().status_script = statuses.into_iter().collect();
    }

    /// Makes the named call fail from now on (e.g. `"payload"`, `"set_region"`).
    pub fn fail_call(&self, name: &'static str) {
        self.lock().failing_calls.insert(name);
    }

    pub fn restore_call(&self, name: &'static str) {
        self.lock().failing_calls.remove(name);
    }

    /// Makes writes to a string feature fail.
    pub fn reject_feature(&self, feature: &str) {
        self.lock().rejected_features.insert(feature.to_string());
    }

    /// Reports `payload` bytes regardless of the geometry.
    pub fn set_payload_override(&self, payload: Option<usize>) {
        self.lock().payload_override = payload;
    }

    pub fn set_float_feature(&self, feature: &str, value: f64) {
        self.lock().float_features.insert(feature.to_string(), value);
    }

    pub fn remove_float_feature(&self, feature: &str) {
        self.lock().float_features.remove(feature);
    }

    pub fn feature(&self, feature: &str) -> Option<String> {
        self.lock().features.get(feature).cloned()
    }

    /// Every vision-layer call made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|call| **call == name).count()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Streams created and not dropped yet.
    pub fn live_streams(&self) -> usize {
        self.lock().live_streams
    }

    pub fn triggers(&self) -> usize {
        self.lock().triggers
    }

    pub fn region(&self) -> Region {
        self.lock().region
    }

    pub fn binning(&self) -> (i32, i32) {
        self.lock().binning
    }

    pub fn gain(&self) -> f64 {
        self.lock().gain
    }

    pub fn exposure_time(&self) -> f64 {
        self.lock().exposure_us
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.lock().pixel_format
    }

    pub fn trigger_source(&self) -> Option<String> {
        self.lock().trigger.clone()
    }

    pub fn autos(&self) -> (Auto, Auto) {
        let state = self.lock();
        (state.gain_auto, state.exposure_auto)
    }

    pub fn acquisition_mode(&self) -> AcquisitionMode {
        self.lock().acquisition_mode
    }

    pub fn is_acquiring(&self) -> bool {
        self.lock().acquiring
    }

    /// Current payload size in bytes.
    pub fn payload(&self) -> usize {
        self.lock().payload()
    }
}

impl DeviceProvider for SimProvider {
    type Device = SimDevice;

    fn open(&self, device_id: Option<&str>) -> GigeResult<SimDevice> {
        let mut state = self.lock();
        state.call("open")?;

        let matches = device_id.is_none_or(|id| id == state.device_id);
        if !state.reachable || !matches {
            return Err(GigeError::NoDeviceFound {
                device_id: device_id.map(str::to_string),
            });
        }

        state.opens += 1;

        Ok(SimDevice {
            state: self.state.clone(),
        })
    }
}

/// An open handle on the simulated camera.
#[derive(Debug)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the state after recording the call and checking for a scripted failure.
    fn with<R>(&self, call: &'static str, f: impl FnOnce(&mut SimState) -> GigeResult<R>) -> GigeResult<R> {
        let mut state = self.lock();
        state.call(call)?;
        f(&mut state)
    }
}

impl CameraDevice for SimDevice {
    type Stream = SimStream;

    fn model_name(&self) -> GigeResult<String> {
        self.with("model_name", |s| Ok(s.model_name.clone()))
    }

    fn vendor_name(&self) -> GigeResult<String> {
        self.with("vendor_name", |s| Ok(s.vendor_name.clone()))
    }

    fn device_id(&self) -> GigeResult<String> {
        self.with("device_id", |s| Ok(s.device_id.clone()))
    }

    fn x_binning_bounds(&self) -> GigeResult<(i32, i32)> {
        self.with("x_binning_bounds", |s| Ok((1, s.max_binning)))
    }

    fn y_binning_bounds(&self) -> GigeResult<(i32, i32)> {
        self.with("y_binning_bounds", |s| Ok((1, s.max_binning)))
    }

    fn x_offset_bounds(&self) -> GigeResult<(i32, i32)> {
        self.with("x_offset_bounds", |s| Ok((0, s.binned_sensor().0 - 1)))
    }

    fn y_offset_bounds(&self) -> GigeResult<(i32, i32)> {
        self.with("y_offset_bounds", |s| Ok((0, s.binned_sensor().1 - 1)))
    }

    fn width_bounds(&self) -> GigeResult<(i32, i32)> {
        self.with("width_bounds", |s| Ok((1, s.binned_sensor().0)))
    }

    fn height_bounds(&self) -> GigeResult<(i32, i32)> {
        self.with("height_bounds", |s| Ok((1, s.binned_sensor().1)))
    }

    fn sensor_size(&self) -> GigeResult<(i32, i32)> {
        self.with("sensor_size", |s| Ok(s.sensor))
    }

    fn frame_rate_bounds(&self) -> GigeResult<(f64, f64)> {
        self.with("frame_rate_bounds", |_| Ok((1.0, 30.0)))
    }

    fn exposure_time_bounds(&self) -> GigeResult<(f64, f64)> {
        self.with("exposure_time_bounds", |_| Ok((10.0, 30_000_000.0)))
    }

    fn gain_bounds(&self) -> GigeResult<(f64, f64)> {
        self.with("gain_bounds", |_| Ok((0.0, 24.0)))
    }

    fn binning(&self) -> GigeResult<(i32, i32)> {
        self.with("binning", |s| Ok(s.binning))
    }

    fn set_binning(&mut self, x: i32, y: i32) -> GigeResult<()> {
        self.with("set_binning", |s| {
            if !(1..=s.max_binning).contains(&x) || !(1..=s.max_binning).contains(&y) {
                return Err(GigeError::device("set_binning", format!("{x}x{y} out of range")));
            }

            s.binning = (x, y);

            // Binning shrinks the addressable area; keep the region inside it.
            let (w, h) = s.binned_sensor();
            s.region.x = s.region.x.min(w - 1);
            s.region.y = s.region.y.min(h - 1);
            s.region.width = s.region.width.min(w - s.region.x);
            s.region.height = s.region.height.min(h - s.region.y);
            Ok(())
        })
    }

    fn region(&self) -> GigeResult<Region> {
        self.with("region", |s| Ok(s.region))
    }

    fn set_region(&mut self, region: Region) -> GigeResult<()> {
        self.with("set_region", |s| {
            let (w, h) = s.binned_sensor();
            let fits = region.x >= 0
                && region.y >= 0
                && region.width > 0
                && region.height > 0
                && region.x + region.width <= w
                && region.y + region.height <= h;

            if !fits {
                return Err(GigeError::device("set_region", format!("{region:?} outside of {w}x{h}")));
            }

            s.region = region;
            Ok(())
        })
    }

    fn set_gain(&mut self, gain: f64) -> GigeResult<()> {
        self.with("set_gain", |s| {
            s.gain = gain;
            Ok(())
        })
    }

    fn set_gain_auto(&mut self, auto: Auto) -> GigeResult<()> {
        self.with("set_gain_auto", |s| {
            s.gain_auto = auto;
            Ok(())
        })
    }

    fn set_exposure_time(&mut self, us: f64) -> GigeResult<()> {
        self.with("set_exposure_time", |s| {
            s.exposure_us = us;
            Ok(())
        })
    }

    fn set_exposure_time_auto(&mut self, auto: Auto) -> GigeResult<()> {
        self.with("set_exposure_time_auto", |s| {
            s.exposure_auto = auto;
            Ok(())
        })
    }

    fn set_trigger(&mut self, source: &str) -> GigeResult<()> {
        self.with("set_trigger", |s| {
            s.trigger = Some(source.to_string());
            Ok(())
        })
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> GigeResult<()> {
        self.with("set_pixel_format", |s| {
            if s.rejected_features.contains(features::PIXEL_FORMAT) {
                return Err(GigeError::Feature {
                    feature: features::PIXEL_FORMAT.to_string(),
                    reason: "simulated rejection".to_string(),
                });
            }

            s.pixel_format = format;
            s.features
                .insert(features::PIXEL_FORMAT.to_string(), format.name().to_string());
            Ok(())
        })
    }

    fn payload(&self) -> GigeResult<usize> {
        self.with("payload", |s| Ok(s.payload()))
    }

    fn set_string_feature(&mut self, feature: &str, value: &str) -> GigeResult<()> {
        self.with("set_string_feature", |s| {
            if s.rejected_features.contains(feature) {
                return Err(GigeError::Feature {
                    feature: feature.to_string(),
                    reason: "simulated rejection".to_string(),
                });
            }

            if feature == features::PIXEL_FORMAT {
                s.pixel_format = match value {
                    "Mono8" => PixelFormat::Mono8,
                    "Mono12" => PixelFormat::Mono12,
                    "Mono16" => PixelFormat::Mono16,
                    "BayerGR8" => PixelFormat::BayerGr8,
                    "BayerGR12" => PixelFormat::BayerGr12,
                    other => {
                        return Err(GigeError::Feature {
                            feature: feature.to_string(),
                            reason: format!("unknown pixel format {other}"),
                        });
                    }
                };
            }

            s.features.insert(feature.to_string(), value.to_string());
            Ok(())
        })
    }

    fn float_feature(&self, feature: &str) -> GigeResult<f64> {
        self.with("float_feature", |s| {
            s.float_features
                .get(feature)
                .copied()
                .ok_or_else(|| GigeError::Feature {
                    feature: feature.to_string(),
                    reason: "not available".to_string(),
                })
        })
    }

    fn execute_command(&mut self, command: &str) -> GigeResult<()> {
        self.with("execute_command", |s| {
            s.features.insert(command.to_string(), "executed".to_string());
            Ok(())
        })
    }

    fn create_stream(&mut self) -> GigeResult<SimStream> {
        self.with("create_stream", |s| {
            s.live_streams += 1;
            s.queued.clear();
            Ok(())
        })?;

        Ok(SimStream {
            state: self.state.clone(),
        })
    }

    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> GigeResult<()> {
        self.with("set_acquisition_mode", |s| {
            s.acquisition_mode = mode;
            Ok(())
        })
    }

    fn start_acquisition(&mut self) -> GigeResult<()> {
        self.with("start_acquisition", |s| {
            s.acquiring = true;
            Ok(())
        })
    }

    fn stop_acquisition(&mut self) -> GigeResult<()> {
        self.with("stop_acquisition", |s| {
            s.acquiring = false;
            Ok(())
        })
    }

    fn abort_acquisition(&mut self) -> GigeResult<()> {
        self.with("abort_acquisition", |s| {
            s.acquiring = false;
            if let Some(buffer) = s.queued.front() {
                buffer.finish(BufferStatus::Aborted);
            }
            Ok(())
        })
    }

    fn software_trigger(&mut self) -> GigeResult<()> {
        self.with("software_trigger", |s| {
            if !s.acquiring {
                return Err(GigeError::device("software_trigger", "acquisition not started"));
            }

            s.triggers += 1;

            let script = if s.status_script.is_empty() {
                VecDeque::from([BufferStatus::Cleared, BufferStatus::Filling, BufferStatus::Success])
            } else {
                std::mem::take(&mut s.status_script)
            };

            if let Some(buffer) = s.queued.front() {
                buffer.arm(script);
            }
            Ok(())
        })
    }
}

/// Stream of the simulated camera. Buffers pushed here are filled on the next trigger.
#[derive(Debug)]
pub struct SimStream {
    state: Arc<Mutex<SimState>>,
}

impl SimStream {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AcquisitionStream for SimStream {
    type Buffer = SimBuffer;

    fn new_buffer(&self, size: usize) -> SimBuffer {
        SimBuffer {
            inner: Arc::new(Mutex::new(SimBufferState {
                data: vec![0; size],
                script: VecDeque::new(),
                status: BufferStatus::Cleared,
            })),
        }
    }

    fn push_buffer(&mut self, buffer: SimBuffer) {
        self.lock().queued.push_back(buffer);
    }

    fn try_pop_buffer(&mut self) -> Option<SimBuffer> {
        self.timeout_pop_buffer(Duration::ZERO)
    }

    fn timeout_pop_buffer(&mut self, _timeout: Duration) -> Option<SimBuffer> {
        let mut state = self.lock();
        let done = state.queued.iter().position(|buffer| buffer.is_done())?;
        state.queued.remove(done)
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        let mut state = self.lock();
        state.live_streams = state.live_streams.saturating_sub(1);
        state.queued.clear();
    }
}

#[derive(Debug)]
struct SimBufferState {
    data: Vec<u8>,
    script: VecDeque<BufferStatus>,
    status: BufferStatus,
}

/// A shared handle to a simulated acquisition buffer.
#[derive(Debug, Clone)]
pub struct SimBuffer {
    inner: Arc<Mutex<SimBufferState>>,
}

impl SimBuffer {
    fn lock(&self) -> MutexGuard<'_, SimBufferState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the status walk and fills the frame with noise.
    fn arm(&self, script: VecDeque<BufferStatus>) {
        let mut state = self.lock();
        rand::rng().fill(&mut state.data[..]);
        state.script = script;
    }

    fn finish(&self, status: BufferStatus) {
        let mut state = self.lock();
        state.script.clear();
        state.status = status;
    }

    fn is_done(&self) -> bool {
        !matches!(self.lock().status, BufferStatus::Cleared | BufferStatus::Filling)
    }
}

impl FrameBuffer for SimBuffer {
    fn raw_status(&self) -> i32 {
        let mut state = self.lock();
        if let Some(next) = state.script.pop_front() {
            state.status = next;
        }
        state.status.into()
    }

    fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.lock().data)
    }

    fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
