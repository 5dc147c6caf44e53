use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::*;

use crate::{
    cam::{Applied, ExposureStatus, GigeCamera},
    consts::fits,
    property::BoundedProperty,
    settings::{CcdCapabilities, DriverSettings, FrameType},
    vision::DeviceProvider,
    GigeError, GigeResult,
};

/// Notifications the front-end sends to the host framework.
///
/// Every method defaults to doing nothing, so a host only implements what it publishes.
pub trait CcdHost {
    /// The camera connected: publish its info and gain properties.
    fn define_properties(&mut self, _info: &CameraInfo, _gain: &BoundedProperty<f64>) {}

    /// The camera disconnected: withdraw the properties defined above.
    fn delete_properties(&mut self) {}

    /// The polling timer should run with the given period, or stop when `None`.
    fn set_timer(&mut self, _period: Option<Duration>) {}

    fn gain_updated(&mut self, _gain: f64) {}

    /// The camera didn't take a setting; the driver keeps the requested value locally.
    fn setting_rejected(&mut self, _setting: &str, _error: &GigeError) {}

    fn temperature_updated(&mut self, _celsius: f64) {}

    fn exposure_left(&mut self, _seconds: f64) {}

    /// The chip's frame buffer holds a new frame.
    fn exposure_complete(&mut self, _chip: &CcdChip) {}

    fn exposure_failed(&mut self) {}
}

/// A host that only logs the notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHost;

impl CcdHost for LogHost {
    fn define_properties(&mut self, info: &CameraInfo, gain: &BoundedProperty<f64>) {
        info!(
            "Camera info: {} {} ({}), gain {} in [{}, {}]",
            info.vendor_name,
            info.model_name,
            info.device_id,
            gain.val(),
            gain.min(),
            gain.max()
        );
    }

    fn setting_rejected(&mut self, setting: &str, error: &GigeError) {
        warn!("Camera rejected the {setting} ({error})");
    }

    fn temperature_updated(&mut self, celsius: f64) {
        debug!("CCD temperature is {celsius}");
    }

    fn exposure_complete(&mut self, chip: &CcdChip) {
        info!("Exposure complete, {} bytes", chip.frame_buffer().len());
    }

    fn exposure_failed(&mut self) {
        warn!("Exposure failed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Identity strings of a camera.
pub struct CameraInfo {
    pub vendor_name: String,
    pub model_name: String,
    pub device_id: String,
}

impl CameraInfo {
    fn of<P: DeviceProvider>(camera: &GigeCamera<P>) -> Self {
        Self {
            vendor_name: camera.vendor_name().to_string(),
            model_name: camera.model_name().to_string(),
            device_id: camera.device_id().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// The host's view of the imaging chip.
///
/// Frame coordinates are in unbinned pixels.
pub struct CcdChip {
    pub x_res: i32,
    pub y_res: i32,
    pub bpp: i32,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,

    pub sub_x: i32,
    pub sub_y: i32,
    pub sub_w: i32,
    pub sub_h: i32,
    pub bin_x: i32,
    pub bin_y: i32,

    pub frame_type: FrameType,
    /// Seconds.
    pub exposure_duration: f64,

    frame_buffer: Vec<u8>,
}

impl CcdChip {
    fn set_params(&mut self, x_res: i32, y_res: i32, bpp: i32, pixel_x: f64, pixel_y: f64) {
        self.x_res = x_res;
        self.y_res = y_res;
        self.bpp = bpp;
        self.pixel_size_x = pixel_x;
        self.pixel_size_y = pixel_y;
    }

    fn set_frame(&mut self, x: i32, y: i32, w: i32, h: i32) {
        (self.sub_x, self.sub_y, self.sub_w, self.sub_h) = (x, y, w, h);
    }

    fn set_bin(&mut self, bin_x: i32, bin_y: i32) {
        (self.bin_x, self.bin_y) = (bin_x, bin_y);
    }

    fn set_frame_buffer_size(&mut self, size: usize) {
        if self.frame_buffer.len() != size {
            self.frame_buffer = vec![0; size];
        }
    }

    /// Copies a downloaded frame in. Fails if its size doesn't match the reserved buffer.
    fn receive(&mut self, data: &[u8]) -> bool {
        info!("Receiving {} bytes image", data.len());

        if data.is_empty() || data.len() != self.frame_buffer.len() {
            error!(
                "Unexpected failure during image download. Framebuf has {} bytes, got {}",
                self.frame_buffer.len(),
                data.len()
            );
            return false;
        }

        self.frame_buffer.copy_from_slice(data);
        true
    }

    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    pub fn frame_buffer_size(&self) -> usize {
        self.frame_buffer.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the last exposure ended.
pub enum ExposureOutcome {
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct ExposureSession {
    start: DateTime<Utc>,
    /// Set on the first poll that sees data arriving.
    transfer_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    Float(f64),
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
/// A keyword added to the header of every written frame.
pub struct FitsKeyword {
    pub name: &'static str,
    pub value: FitsValue,
    pub comment: &'static str,
}

/// A GigE camera bound to the host's CCD device interface.
///
/// All methods are meant to be called from the host's single event context: its lifecycle
/// calls plus the periodic [GigeCcd::timer_hit].
pub struct GigeCcd<P: DeviceProvider, H: CcdHost> {
    camera: GigeCamera<P>,
    host: H,
    chip: CcdChip,
    settings: DriverSettings,
    session: Option<ExposureSession>,
    last_exposure: Option<ExposureOutcome>,
    supports_temperature: bool,
    temperature: f64,
    timer_armed: bool,
}

impl<P: DeviceProvider, H: CcdHost> GigeCcd<P, H> {
    pub fn new(camera: GigeCamera<P>, host: H) -> Self {
        Self::with_settings(camera, host, DriverSettings::default())
    }

    pub fn with_settings(mut camera: GigeCamera<P>, host: H, settings: DriverSettings) -> Self {
        camera.set_pop_timeout(settings.pop_timeout);
        camera.set_temperature_sentinel(settings.temperature_sentinel);

        Self {
            camera,
            host,
            chip: CcdChip::default(),
            temperature: settings.temperature_sentinel,
            settings,
            session: None,
            last_exposure: None,
            supports_temperature: false,
            timer_armed: false,
        }
    }

    /// Name the device is published under.
    pub fn device_name(&self) -> &str {
        self.camera.model_name()
    }

    pub fn capabilities(&self) -> CcdCapabilities {
        CcdCapabilities::default()
    }

    pub fn connect(&mut self) -> GigeResult<()> {
        info!("Connecting {}", self.device_name());
        self.camera.connect()
    }

    /// Releases the camera. An exposure in flight is aborted.
    pub fn disconnect(&mut self) -> bool {
        info!("Disconnecting {}", self.device_name());
        self.camera.disconnect();
        self.session = None;
        true
    }

    /// Publishes or withdraws the device properties, following the connection state.
    pub fn update_properties(&mut self) {
        if !self.camera.is_connected() {
            self.timer_armed = false;
            self.host.set_timer(None);
            self.host.delete_properties();
            return;
        }

        let info = CameraInfo::of(&self.camera);
        self.host.define_properties(&info, self.camera.gain());

        let temperature = self.camera.temperature();
        self.supports_temperature = self.settings.is_real_temperature(temperature);
        if self.supports_temperature {
            info!("The CCD temperature is {temperature}");
            self.temperature = temperature;
            self.host.temperature_updated(temperature);
        } else {
            info!("This camera doesn't support temperature");
        }

        let pitch = self.camera.pixel_pitch().val();
        self.chip.set_params(
            self.camera.width().max(),
            self.camera.height().max(),
            self.camera.bpp().val(),
            pitch,
            pitch,
        );
        info!("Calculating framebuf values with {} bpp", self.chip.bpp);

        let _ = self.sync_geometry();

        self.timer_armed = true;
        self.host.set_timer(Some(self.settings.polling_period));
    }

    /// Pulls the geometry from the camera into the chip and reserves the frame buffer.
    ///
    /// Returns `false` (with a zero-sized buffer) if the camera's payload doesn't match
    /// the frame size.
    fn sync_geometry(&mut self) -> bool {
        if let Err(e) = self.camera.update_geometry() {
            debug!("Keeping the local geometry ({e})");
        }

        let (bin_x, bin_y) = (self.camera.bin_x().val(), self.camera.bin_y().val());
        self.chip.set_bin(bin_x, bin_y);
        self.chip.set_frame(
            self.camera.x_offset().val() * bin_x,
            self.camera.y_offset().val() * bin_y,
            self.camera.width().val() * bin_x,
            self.camera.height().val() * bin_y,
        );

        match self.camera.frame_buffer_size() {
            Ok(size) => {
                self.chip.set_frame_buffer_size(size);
                true
            }
            Err(e) => {
                error!("Unexpected image buffer size ({e})");
                error!(
                    "Width: {}, Height: {}, BPP: {}",
                    self.camera.width().val(),
                    self.camera.height().val(),
                    self.camera.bpp().val()
                );
                self.chip.set_frame_buffer_size(0);
                false
            }
        }
    }

    /// Starts an exposure of `duration` seconds.
    pub fn start_exposure(&mut self, duration: f64) -> bool {
        self.start_exposure_at(duration, Utc::now())
    }

    /// Starts an exposure of `duration` seconds, with `now` as its start time.
    pub fn start_exposure_at(&mut self, duration: f64, now: DateTime<Utc>) -> bool {
        info!("Starting exposure, exposure_time={duration:.4}");

        // The camera clamps this to its shortest exposure.
        let duration = if self.chip.frame_type == FrameType::Bias {
            0.0
        } else {
            duration.max(0.0)
        };

        self.chip.exposure_duration = duration;
        let _ = self.sync_geometry();
        let applied = self.camera.set_exposure_time(duration * 1_000_000.0);
        self.report_rejection("exposure time", &applied);

        self.last_exposure = None;
        match self.camera.exposure_start() {
            Ok(()) => {
                self.session = Some(ExposureSession {
                    start: now,
                    transfer_start: None,
                });
                self.camera.is_exposing()
            }
            Err(e) => {
                error!("Encountered stream buffer error when starting exposure ({e})");
                self.session = None;
                self.last_exposure = Some(ExposureOutcome::Failed);
                false
            }
        }
    }

    pub fn abort_exposure(&mut self) -> bool {
        info!("Aborting exposure");
        self.camera.exposure_abort();
        self.session = None;
        true
    }

    /// Sets the subframe, in unbinned pixels.
    pub fn update_ccd_frame(&mut self, x: i32, y: i32, w: i32, h: i32) -> bool {
        info!("Updating CCD frame: x={x} y={y} w={w} h={h}");

        let bin_x = self.camera.bin_x().val().max(1);
        let bin_y = self.camera.bin_y().val().max(1);
        let applied = self
            .camera
            .set_geometry(x / bin_x, y / bin_y, w / bin_x, h / bin_y);

        self.sync_geometry() && applied.warning.is_none()
    }

    pub fn update_ccd_bin(&mut self, bin_x: i32, bin_y: i32) -> bool {
        info!("Updating CCD binning: binx={bin_x} biny={bin_y}");

        let applied = self.camera.set_bin(bin_x, bin_y);
        let _ = self.sync_geometry();

        let (x, y, w, h) = (self.chip.sub_x, self.chip.sub_y, self.chip.sub_w, self.chip.sub_h);
        self.update_ccd_frame(x, y, w, h) && applied.warning.is_none()
    }

    pub fn update_ccd_frame_type(&mut self, frame_type: FrameType) -> bool {
        self.chip.frame_type = frame_type;
        true
    }

    /// Handles a new gain value from the host and publishes the value the camera ended up with.
    pub fn set_gain(&mut self, gain: f64) -> Applied {
        let applied = self.camera.set_gain(gain);
        self.report_rejection("gain", &applied);
        self.host.gain_updated(self.camera.gain().val());
        applied
    }

    fn report_rejection(&mut self, setting: &str, applied: &Applied) {
        if let Some(e) = &applied.warning {
            self.host.setting_rejected(setting, e);
        }
    }

    /// Periodic poll, called by the host on every timer tick.
    pub fn timer_hit(&mut self) {
        self.timer_hit_at(Utc::now());
    }

    /// Periodic poll with an explicit current time.
    pub fn timer_hit_at(&mut self, now: DateTime<Utc>) {
        if !self.camera.is_connected() {
            return;
        }

        if self.camera.is_exposing() {
            let _ = self.sync_geometry();
            self.poll_exposure(now);
        }

        if self.supports_temperature {
            self.temperature = self.camera.temperature();
            self.host.temperature_updated(self.temperature);
        }
    }

    fn poll_exposure(&mut self, now: DateTime<Utc>) {
        let mut delivered = None;
        let chip = &mut self.chip;
        let status = self
            .camera
            .exposure_poll(|data| delivered = Some(chip.receive(data)));

        match status {
            ExposureStatus::Finished => match delivered {
                Some(true) => self.handle_complete(now),
                _ => self.handle_failed(),
            },
            ExposureStatus::Unknown => {
                info!("Unknown exposure state");
                self.handle_failed();
            }
            ExposureStatus::Failed => {
                error!("Camera reports aborted exposure");
                self.handle_failed();
            }
            ExposureStatus::Filling => {
                debug!("Exposure filling");
                let session = self.session_or_start(now);
                if session.transfer_start.is_none() {
                    session.transfer_start = Some(now);
                }
                self.check_timeout(now, self.settings.transfer_timeout);
            }
            ExposureStatus::Busy => self.check_timeout(now, self.settings.exposure_timeout),
        }
    }

    fn session_or_start(&mut self, now: DateTime<Utc>) -> &mut ExposureSession {
        self.session.get_or_insert(ExposureSession {
            start: now,
            transfer_start: None,
        })
    }

    /// Publishes the time left and fails the exposure once it overruns by more than `timeout`.
    fn check_timeout(&mut self, now: DateTime<Utc>, timeout: Duration) {
        let start = self.session_or_start(now).start;

        let exposure = TimeDelta::microseconds(self.camera.exposure_time().val() as i64);
        let elapsed = now - start;
        let left = exposure - elapsed;

        self.host.exposure_left(if left > TimeDelta::zero() {
            left.num_milliseconds() as f64 / 1000.0
        } else {
            0.0
        });

        let deadline = TimeDelta::from_std(timeout)
            .ok()
            .and_then(|timeout| exposure.checked_add(&timeout));

        if deadline.is_some_and(|deadline| elapsed > deadline) {
            error!("Timed out after {}ms", elapsed.num_milliseconds());
            self.handle_failed();
        }
    }

    fn handle_complete(&mut self, now: DateTime<Utc>) {
        if let Some(transfer_start) = self.session.and_then(|s| s.transfer_start) {
            info!("Frame transferred in {}ms", (now - transfer_start).num_milliseconds());
        }

        self.session = None;
        self.last_exposure = Some(ExposureOutcome::Complete);
        self.host.exposure_left(0.0);
        self.host.exposure_complete(&self.chip);
    }

    pub(crate) fn handle_failed(&mut self) {
        error!("Failure occurred, exposure discarded");

        self.camera.exposure_abort();
        self.session = None;
        self.last_exposure = Some(ExposureOutcome::Failed);
        self.host.exposure_left(0.0);
        self.host.exposure_failed();
    }

    /// Keywords for the header of the frame being written.
    pub fn fits_keywords(&self) -> Vec<FitsKeyword> {
        let mut keywords = Vec::with_capacity(3);

        if self.supports_temperature {
            keywords.push(FitsKeyword {
                name: fits::CCD_TEMP,
                value: FitsValue::Float(self.temperature),
                comment: "CCD Temperature (Celsius)",
            });
        }

        keywords.push(FitsKeyword {
            name: fits::EGAIN,
            value: FitsValue::Int(self.camera.gain().val() as i64),
            comment: "CCD gain",
        });

        keywords.push(FitsKeyword {
            name: fits::BAYERPAT,
            value: FitsValue::Text(self.settings.bayer_pattern.clone()),
            comment: "Bayer color pattern",
        });

        keywords
    }

    pub fn camera(&self) -> &GigeCamera<P> {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut GigeCamera<P> {
        &mut self.camera
    }

    pub fn chip(&self) -> &CcdChip {
        &self.chip
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn supports_temperature(&self) -> bool {
        self.supports_temperature
    }

    /// Last published temperature, the sentinel if unsupported.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn is_exposing(&self) -> bool {
        self.camera.is_exposing()
    }

    /// How the last exposure ended; `None` while one is in flight or before the first.
    pub fn last_exposure(&self) -> Option<ExposureOutcome> {
        self.last_exposure
    }
}
