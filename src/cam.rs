use std::time::Duration;

use log::*;

use crate::{
    consts::{self, features},
    model::CameraModel,
    property::{BoundedProperty, Clamp},
    vision::{
        AcquisitionMode, AcquisitionStream, Auto, BufferStatus, CameraDevice, DeviceProvider,
        FrameBuffer, Region,
    },
    GigeError, GigeResult,
};

type DeviceOf<P> = <P as DeviceProvider>::Device;
type StreamOf<P> = <DeviceOf<P> as CameraDevice>::Stream;
type BufferOf<P> = <StreamOf<P> as AcquisitionStream>::Buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of polling an exposure in flight.
pub enum ExposureStatus {
    /// The frame was delivered to the image handler and the stream is torn down.
    Finished,
    /// The exposure failed (timeout, lost packets, size mismatch, abort) and the stream is torn down.
    Failed,
    /// Frame data is arriving.
    Filling,
    /// Armed and triggered, nothing has arrived yet.
    Busy,
    /// No exposure in flight, or the vision layer reported an unknown status.
    Unknown,
}

#[must_use]
#[derive(Debug, Clone, PartialEq)]
/// Report of a setting pushed to the camera.
///
/// The local property always holds the (clamped) requested value. A `warning` means
/// the camera didn't take it, so the property and the device disagree.
pub struct Applied {
    pub clamp: Clamp,
    pub warning: Option<GigeError>,
}

impl Applied {
    /// Whether the value was stored unchanged and the camera accepted it.
    pub fn is_exact(&self) -> bool {
        !self.clamp.is_clamped() && self.warning.is_none()
    }
}

/// A GigE Vision camera, wrapped for use as a CCD.
///
/// Owns the device handle, the acquisition stream and its single frame buffer.
/// A stream and a buffer only ever exist together, and only while a device handle is held.
pub struct GigeCamera<P: DeviceProvider> {
    provider: P,
    model: CameraModel,
    device: Option<DeviceOf<P>>,
    stream: Option<StreamOf<P>>,
    buffer: Option<BufferOf<P>>,

    device_id: String,
    vendor_name: String,
    model_name: String,

    bin_x: BoundedProperty<i32>,
    bin_y: BoundedProperty<i32>,
    x_offset: BoundedProperty<i32>,
    y_offset: BoundedProperty<i32>,
    width: BoundedProperty<i32>,
    height: BoundedProperty<i32>,
    bpp: BoundedProperty<i32>,
    pixel_pitch: BoundedProperty<f64>,
    /// Microseconds.
    exposure_time: BoundedProperty<f64>,
    gain: BoundedProperty<f64>,
    frame_rate: BoundedProperty<f64>,

    pop_timeout: Duration,
    temperature_sentinel: f64,
}

impl<P: DeviceProvider> GigeCamera<P> {
    /// Wraps a freshly opened device.
    ///
    /// Loads the camera's default user set, reads its identity and bounds, then writes the
    /// model's vendor registers. Failing device calls are logged; construction always succeeds.
    ///
    /// * `provider` - Used to reopen the camera by its device id on `connect`.
    /// * `device` - The open handle.
    /// * `model` - The camera family, usually picked by the factory.
    pub fn new(provider: P, mut device: DeviceOf<P>, model: CameraModel) -> Self {
        Self::reset_to_defaults(&mut device);

        let mut cam = Self {
            provider,
            model,
            device: None,
            stream: None,
            buffer: None,
            device_id: consts::UNKNOWN_NAME.to_string(),
            vendor_name: consts::UNKNOWN_NAME.to_string(),
            model_name: consts::UNKNOWN_NAME.to_string(),
            bin_x: BoundedProperty::single(1),
            bin_y: BoundedProperty::single(1),
            x_offset: BoundedProperty::default(),
            y_offset: BoundedProperty::default(),
            width: BoundedProperty::default(),
            height: BoundedProperty::default(),
            bpp: BoundedProperty::single(model.bit_depth()),
            pixel_pitch: BoundedProperty::single(consts::DEFAULT_PIXEL_PITCH_UM),
            exposure_time: BoundedProperty::default(),
            gain: BoundedProperty::default(),
            frame_rate: BoundedProperty::default(),
            pop_timeout: consts::POP_BUFFER_TIMEOUT,
            temperature_sentinel: consts::TEMPERATURE_UNSUPPORTED,
        };

        cam.read_identity(&device);
        cam.read_bounds(&device);

        // Until configured, the full sensor is the only trustworthy size limit.
        match device.sensor_size() {
            Ok((w, h)) => {
                cam.width.update(0, w);
                cam.height.update(0, h);
            }
            Err(e) => warn!("Couldn't read the sensor size ({e})"),
        }

        model.configure_registers(&mut device);
        cam.device = Some(device);

        info!(
            "Created {:?} camera for {} {} ({})",
            model, cam.vendor_name, cam.model_name, cam.device_id
        );

        cam
    }

    /// Sets the longest wait for the finished buffer when retrieving a frame.
    pub fn set_pop_timeout(&mut self, timeout: Duration) {
        self.pop_timeout = timeout;
    }

    /// Sets the value reported as the temperature of cameras without a sensor.
    pub fn set_temperature_sentinel(&mut self, sentinel: f64) {
        self.temperature_sentinel = sentinel;
    }

    /// Loads the factory user set so earlier sessions don't leak settings into this one.
    fn reset_to_defaults(device: &mut DeviceOf<P>) {
        if let Err(e) = device.set_string_feature(features::USER_SET_DEFAULT_SELECTOR, features::DEFAULT) {
            warn!("Couldn't select the default user set ({e})");
        }

        if let Err(e) = device.execute_command(features::USER_SET_LOAD) {
            warn!("Couldn't load the user set ({e})");
        }
    }

    fn read_identity(&mut self, device: &DeviceOf<P>) {
        let read = |what: &str, value: GigeResult<String>, slot: &mut String| match value {
            Ok(value) => *slot = value,
            Err(e) => warn!("Couldn't read the {what} ({e})"),
        };

        read("model name", device.model_name(), &mut self.model_name);
        read("vendor name", device.vendor_name(), &mut self.vendor_name);
        read("device id", device.device_id(), &mut self.device_id);
    }

    fn read_bounds(&mut self, device: &DeviceOf<P>) {
        fn refresh<T: PartialOrd + Copy + std::fmt::Debug>(
            what: &str,
            prop: &mut BoundedProperty<T>,
            bounds: GigeResult<(T, T)>,
        ) {
            match bounds {
                Ok((min, max)) => prop.update(min, max),
                Err(e) => warn!("Couldn't read the {what} bounds ({e})"),
            }
        }

        refresh("x binning", &mut self.bin_x, device.x_binning_bounds());
        refresh("y binning", &mut self.bin_y, device.y_binning_bounds());
        refresh("x offset", &mut self.x_offset, device.x_offset_bounds());
        refresh("y offset", &mut self.y_offset, device.y_offset_bounds());
        refresh("frame rate", &mut self.frame_rate, device.frame_rate_bounds());
        refresh("exposure time", &mut self.exposure_time, device.exposure_time_bounds());
        refresh("gain", &mut self.gain, device.gain_bounds());
    }

    /// Connects to the camera, reopening it by device id if the handle was released,
    /// and puts it into manual mode: 1x1 binning, auto-gain and auto-exposure off,
    /// software trigger.
    ///
    /// Fails only if the camera can't be opened; the camera stays disconnected then.
    pub fn connect(&mut self) -> GigeResult<()> {
        if self.device.is_none() {
            let mut device = self
                .provider
                .open(Some(&self.device_id))
                .inspect_err(|e| error!("Couldn't reconnect to {} ({e})", self.device_id))?;

            self.read_identity(&device);
            self.model.configure_registers(&mut device);
            self.device = Some(device);
        }

        self.apply_manual_mode();
        self.refresh_config();

        info!("Connected to {} {} ({})", self.vendor_name, self.model_name, self.device_id);
        Ok(())
    }

    fn apply_manual_mode(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };

        let steps: [(&str, GigeResult<()>); 4] = [
            ("binning", device.set_binning(1, 1)),
            ("gain auto", device.set_gain_auto(Auto::Off)),
            ("exposure auto", device.set_exposure_time_auto(Auto::Off)),
            ("trigger", device.set_trigger(features::TRIGGER_SOFTWARE)),
        ];

        let mut clean = true;
        for (step, result) in steps {
            if let Err(e) = result {
                warn!("Encountered error in setting initial config: {step} ({e})");
                clean = false;
            }
        }

        if clean {
            let _ = self.bin_x.set(1);
            let _ = self.bin_y.set(1);
            debug!("Manual mode configured");
        }
    }

    /// Pulls every bound and the identity strings from the camera.
    fn refresh_config(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };

        self.read_bounds(&device);

        match device.width_bounds() {
            Ok((min, max)) => self.width.update(min, max),
            Err(e) => warn!("Couldn't read the width bounds ({e})"),
        }
        match device.height_bounds() {
            Ok((min, max)) => self.height.update(min, max),
            Err(e) => warn!("Couldn't read the height bounds ({e})"),
        }

        self.read_identity(&device);
        self.device = Some(device);
    }

    /// Releases the camera, aborting any exposure first. The device id is kept for `connect`.
    pub fn disconnect(&mut self) {
        if self.device.is_some() {
            self.exposure_abort();
            info!("Disconnected from {}", self.device_id);
        }

        self.stream = None;
        self.buffer = None;
        self.device = None;
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    /// Whether an exposure is in flight (armed or filling).
    pub fn is_exposing(&self) -> bool {
        self.stream.is_some()
    }

    /// Pushes one setting to the camera, turning failures into a warning.
    fn push(
        &mut self,
        what: &str,
        clamp: Clamp,
        write: impl FnOnce(&mut DeviceOf<P>) -> GigeResult<()>,
    ) -> Applied {
        if clamp.is_clamped() {
            warn!("Requested {what} is out of range, clamped");
        }

        let warning = match self.device.as_mut() {
            Some(device) => write(device)
                .inspect_err(|e| warn!("Encountered error setting {what} ({e})"))
                .err(),
            None => {
                warn!("Can't set {what}, camera is not connected");
                Some(GigeError::NotConnected)
            }
        };

        Applied { clamp, warning }
    }

    /// Sets the region of interest, in camera (binned) pixels.
    pub fn set_geometry(&mut self, x: i32, y: i32, w: i32, h: i32) -> Applied {
        let clamp = self
            .x_offset
            .set(x)
            .and(self.y_offset.set(y))
            .and(self.width.set(w))
            .and(self.height.set(h));

        let region = Region {
            x: self.x_offset.val(),
            y: self.y_offset.val(),
            width: self.width.val(),
            height: self.height.val(),
        };

        self.push("region", clamp, |device| device.set_region(region))
    }

    pub fn set_bin(&mut self, bin_x: i32, bin_y: i32) -> Applied {
        let clamp = self.bin_x.set(bin_x).and(self.bin_y.set(bin_y));
        let (x, y) = (self.bin_x.val(), self.bin_y.val());

        self.push("binning", clamp, |device| device.set_binning(x, y))
    }

    /// Sets the gain. Aborts an exposure in flight.
    pub fn set_gain(&mut self, gain: f64) -> Applied {
        self.exposure_abort();

        let clamp = self.gain.set(gain);
        let gain = self.gain.val();

        self.push("gain", clamp, |device| device.set_gain(gain))
    }

    /// Sets the exposure time in microseconds. Aborts an exposure in flight.
    pub fn set_exposure_time(&mut self, us: f64) -> Applied {
        self.exposure_abort();

        let clamp = self.exposure_time.set(us);
        let us = self.exposure_time.val();

        self.push("exposure time", clamp, |device| device.set_exposure_time(us))
    }

    /// Pulls the region and binning from the camera. The camera is the source of truth afterwards.
    pub fn update_geometry(&mut self) -> GigeResult<()> {
        let device = self.device.as_ref().ok_or(GigeError::NotConnected)?;

        let (region, (bin_x, bin_y)) = device
            .region()
            .and_then(|region| Ok((region, device.binning()?)))
            .inspect_err(|e| warn!("Encountered error updating geometry ({e})"))?;

        let clamp = self
            .x_offset
            .set(region.x)
            .and(self.y_offset.set(region.y))
            .and(self.width.set(region.width))
            .and(self.height.set(region.height))
            .and(self.bin_x.set(bin_x))
            .and(self.bin_y.set(bin_y));

        if clamp.is_clamped() {
            warn!("Camera reported geometry outside of its own bounds: {region:?}, bin {bin_x}x{bin_y}");
        }

        Ok(())
    }

    /// Size of one frame in bytes, as reported by the camera.
    pub fn frame_byte_size(&self) -> GigeResult<usize> {
        let device = self.device.as_ref().ok_or(GigeError::NotConnected)?;

        device
            .payload()
            .inspect_err(|e| warn!("Couldn't get frame byte size ({e})"))
    }

    /// Size of the frame buffer for the current geometry.
    ///
    /// Fails with `PayloadMismatch` if the camera's payload isn't `width * height * bpp / 8`.
    pub fn frame_buffer_size(&self) -> GigeResult<usize> {
        let payload = self.frame_byte_size()?;

        let bits = i64::from(self.width.val()) * i64::from(self.height.val()) * i64::from(self.bpp.val());
        let expected = usize::try_from(bits / 8).unwrap_or(0);

        if expected != payload {
            return Err(GigeError::PayloadMismatch { expected, payload });
        }

        Ok(payload)
    }

    /// Arms a single-frame acquisition and fires the software trigger.
    ///
    /// An exposure already in flight is aborted first. Fails with `BufferAllocation`
    /// if no stream or buffer could be set up, typically because the camera went away;
    /// nothing is left allocated then.
    pub fn exposure_start(&mut self) -> GigeResult<()> {
        self.exposure_abort();

        let Some(device) = self.device.as_mut() else {
            error!("Can't start an exposure, camera is not connected");
            return Err(GigeError::BufferAllocation);
        };

        let mut stream = device.create_stream().map_err(|e| {
            error!("Error creating stream ({e})");
            GigeError::BufferAllocation
        })?;

        while stream.try_pop_buffer().is_some() {
            debug!("Dropped a stale buffer");
        }

        let payload = match device.payload() {
            Ok(payload) if payload > 0 => payload,
            Ok(_) => {
                error!("Camera reported an empty payload");
                return Err(GigeError::BufferAllocation);
            }
            Err(e) => {
                error!("Encountered error creating new buffer ({e})");
                return Err(GigeError::BufferAllocation);
            }
        };

        let buffer = stream.new_buffer(payload);
        stream.push_buffer(buffer.clone());

        let started = device
            .set_acquisition_mode(AcquisitionMode::SingleFrame)
            .and_then(|_| device.start_acquisition());
        if let Err(e) = started {
            warn!("Encountered error starting stream ({e})");
        }

        if let Err(e) = device.software_trigger() {
            warn!("Encountered error triggering exposure ({e})");
        }

        self.stream = Some(stream);
        self.buffer = Some(buffer);

        debug!("Exposure armed, expecting {payload} bytes");
        Ok(())
    }

    /// Checks the exposure without blocking (beyond a short bounded wait when the frame is ready).
    ///
    /// * `on_image` - Called exactly once with the frame bytes when the result is `Finished`,
    ///   never otherwise. The slice is only valid during the call.
    pub fn exposure_poll(&mut self, on_image: impl FnOnce(&[u8])) -> ExposureStatus {
        let Some(buffer) = self.buffer.as_ref() else {
            return ExposureStatus::Unknown;
        };

        match buffer.status() {
            BufferStatus::Cleared => ExposureStatus::Busy,
            BufferStatus::Filling => ExposureStatus::Filling,
            BufferStatus::Unknown => ExposureStatus::Unknown,
            BufferStatus::Success => {
                let status = self.retrieve_image(on_image);
                self.stream_stop();
                status
            }
            failure @ (BufferStatus::Timeout
            | BufferStatus::MissingPackets
            | BufferStatus::WrongPacketId
            | BufferStatus::SizeMismatch
            | BufferStatus::Aborted) => {
                error!("Exposure failed, buffer status: {failure:?}");
                self.stream_stop();
                ExposureStatus::Failed
            }
        }
    }

    fn retrieve_image(&mut self, on_image: impl FnOnce(&[u8])) -> ExposureStatus {
        let (Some(stream), Some(buffer)) = (self.stream.as_mut(), self.buffer.as_ref()) else {
            return ExposureStatus::Unknown;
        };

        match stream.timeout_pop_buffer(self.pop_timeout) {
            Some(popped) if popped.is_same(buffer) && popped.status() == BufferStatus::Success => {
                popped.with_data(|data| {
                    debug!("Retrieved {} bytes", data.len());
                    on_image(data)
                });
                ExposureStatus::Finished
            }
            Some(popped) => {
                error!("Popped an unexpected buffer (status {:?})", popped.status());
                ExposureStatus::Failed
            }
            None => {
                error!("Finished buffer didn't come off the stream within {:?}", self.pop_timeout);
                ExposureStatus::Failed
            }
        }
    }

    fn stream_stop(&mut self) {
        debug!("Stopping the acquisition stream");

        if let Some(device) = self.device.as_mut() {
            if let Err(e) = device.stop_acquisition() {
                warn!("Encountered error stopping acquisition ({e})");
            }
        }

        self.buffer = None;
        self.stream = None;
    }

    /// Aborts the exposure in flight and releases its stream and buffer. Does nothing when idle.
    pub fn exposure_abort(&mut self) {
        if !self.is_exposing() {
            return;
        }

        if let Some(device) = self.device.as_mut() {
            if let Err(e) = device.abort_acquisition() {
                warn!("Encountered error aborting acquisition ({e})");
            }
        }

        self.stream_stop();
        info!("Exposure aborted");
    }

    /// Sensor temperature in °C, or the sentinel if unsupported or disconnected.
    pub fn temperature(&self) -> f64 {
        self.device
            .as_ref()
            .map(|device| self.model.read_temperature(device, self.temperature_sentinel))
            .unwrap_or(self.temperature_sentinel)
    }

    pub fn model(&self) -> CameraModel {
        self.model
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn bin_x(&self) -> &BoundedProperty<i32> {
        &self.bin_x
    }

    pub fn bin_y(&self) -> &BoundedProperty<i32> {
        &self.bin_y
    }

    pub fn x_offset(&self) -> &BoundedProperty<i32> {
        &self.x_offset
    }

    pub fn y_offset(&self) -> &BoundedProperty<i32> {
        &self.y_offset
    }

    pub fn width(&self) -> &BoundedProperty<i32> {
        &self.width
    }

    pub fn height(&self) -> &BoundedProperty<i32> {
        &self.height
    }

    /// Bits per pixel reported to the host.
    pub fn bpp(&self) -> &BoundedProperty<i32> {
        &self.bpp
    }

    /// Pixel pitch in micrometers.
    pub fn pixel_pitch(&self) -> &BoundedProperty<f64> {
        &self.pixel_pitch
    }

    /// Exposure time in microseconds.
    pub fn exposure_time(&self) -> &BoundedProperty<f64> {
        &self.exposure_time
    }

    pub fn gain(&self) -> &BoundedProperty<f64> {
        &self.gain
    }

    pub fn frame_rate(&self) -> &BoundedProperty<f64> {
        &self.frame_rate
    }
}

impl<P: DeviceProvider> Drop for GigeCamera<P> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
