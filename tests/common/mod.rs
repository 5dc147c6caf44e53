#![allow(dead_code)]

use std::time::Duration;

use gige_ccd::{
    cam::GigeCamera,
    ccd::{CameraInfo, CcdChip, CcdHost, GigeCcd},
    factory,
    property::BoundedProperty,
    sim::SimProvider,
    GigeError,
};

/// Host that records every notification.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub defined: Vec<CameraInfo>,
    pub deleted: usize,
    pub timer: Option<Duration>,
    pub gains: Vec<f64>,
    pub rejections: Vec<String>,
    pub temperatures: Vec<f64>,
    pub exposures_left: Vec<f64>,
    pub completed: Vec<Vec<u8>>,
    pub failed: usize,
}

impl CcdHost for RecordingHost {
    fn define_properties(&mut self, info: &CameraInfo, _gain: &BoundedProperty<f64>) {
        self.defined.push(info.clone());
    }

    fn delete_properties(&mut self) {
        self.deleted += 1;
    }

    fn set_timer(&mut self, period: Option<Duration>) {
        self.timer = period;
    }

    fn gain_updated(&mut self, gain: f64) {
        self.gains.push(gain);
    }

    fn setting_rejected(&mut self, setting: &str, _error: &GigeError) {
        self.rejections.push(setting.to_string());
    }

    fn temperature_updated(&mut self, celsius: f64) {
        self.temperatures.push(celsius);
    }

    fn exposure_left(&mut self, seconds: f64) {
        self.exposures_left.push(seconds);
    }

    fn exposure_complete(&mut self, chip: &CcdChip) {
        self.completed.push(chip.frame_buffer().to_vec());
    }

    fn exposure_failed(&mut self) {
        self.failed += 1;
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn camera(model_name: &str) -> (SimProvider, GigeCamera<SimProvider>) {
    init_logger();

    let provider = SimProvider::new(model_name);
    let camera = factory::find_first_available(provider.clone()).expect("simulated camera is reachable");
    (provider, camera)
}

/// A front-end that went through connect and update_properties.
pub fn connected_ccd(model_name: &str) -> (SimProvider, GigeCcd<SimProvider, RecordingHost>) {
    let (provider, camera) = camera(model_name);

    let mut ccd = GigeCcd::new(camera, RecordingHost::default());
    ccd.connect().expect("connect");
    ccd.update_properties();

    (provider, ccd)
}
