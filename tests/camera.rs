mod common;

use gige_ccd::{
    cam::ExposureStatus,
    consts::{self, features},
    model::CameraModel,
    property::Clamp,
    sim::SimProvider,
    vision::{Auto, BufferStatus, DeviceProvider, PixelFormat},
    GigeError,
};

use common::camera;

const FULL_FRAME: usize = 64 * 48;

#[test]
fn construction_loads_the_default_user_set() {
    let (provider, cam) = camera("XYZ-999");

    assert_eq!(cam.model(), CameraModel::Generic);
    assert_eq!(cam.model_name(), "XYZ-999");
    assert_eq!(provider.feature(features::USER_SET_DEFAULT_SELECTOR).as_deref(), Some(features::DEFAULT));
    assert_eq!(provider.feature(features::USER_SET_LOAD).as_deref(), Some("executed"));
}

#[test]
fn user_set_load_runs_even_if_the_selector_is_rejected() {
    let provider = SimProvider::new("XYZ-999");
    provider.reject_feature(features::USER_SET_DEFAULT_SELECTOR);

    let cam = gige_ccd::factory::find_first_available(provider.clone()).expect("reachable");

    assert_eq!(cam.model(), CameraModel::Generic);
    assert_eq!(provider.feature(features::USER_SET_DEFAULT_SELECTOR), None);
    assert_eq!(provider.feature(features::USER_SET_LOAD).as_deref(), Some("executed"));
}

#[test]
fn connect_puts_the_camera_into_manual_mode() {
    let (provider, mut cam) = camera("XYZ-999");
    cam.connect().unwrap();

    assert_eq!(provider.autos(), (Auto::Off, Auto::Off));
    assert_eq!(provider.trigger_source().as_deref(), Some(features::TRIGGER_SOFTWARE));
    assert_eq!(provider.binning(), (1, 1));
    assert_eq!((cam.bin_x().val(), cam.bin_y().val()), (1, 1));
    assert_eq!(cam.gain().max(), 24.0);
    assert_eq!(cam.width().max(), 64);
}

#[test]
fn reconnect_reopens_by_device_id() {
    let (provider, mut cam) = camera("BFLY-PGE-31S4M");
    assert_eq!(provider.opens(), 1);

    cam.disconnect();
    assert!(!cam.is_connected());

    cam.connect().unwrap();
    assert!(cam.is_connected());
    assert_eq!(provider.opens(), 2);

    provider.set_reachable(false);
    cam.disconnect();
    assert!(cam.connect().is_err());
    assert!(!cam.is_connected());
}

#[test]
fn full_exposure_delivers_exactly_one_frame() {
    let (provider, mut cam) = camera("XYZ-999");
    cam.connect().unwrap();
    provider.script_statuses([BufferStatus::Cleared, BufferStatus::Filling, BufferStatus::Success]);

    cam.exposure_start().unwrap();
    assert!(cam.is_exposing());
    assert!(provider.is_acquiring());
    assert_eq!(provider.triggers(), 1);

    let mut frames: Vec<Vec<u8>> = Vec::new();

    assert_eq!(cam.exposure_poll(|d| frames.push(d.to_vec())), ExposureStatus::Busy);
    assert_eq!(cam.exposure_poll(|d| frames.push(d.to_vec())), ExposureStatus::Filling);
    assert_eq!(cam.exposure_poll(|d| frames.push(d.to_vec())), ExposureStatus::Finished);
    assert_eq!(cam.exposure_poll(|d| frames.push(d.to_vec())), ExposureStatus::Unknown);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), FULL_FRAME);
    assert!(!cam.is_exposing());
    assert!(!provider.is_acquiring());
    assert_eq!(provider.live_streams(), 0);
}

#[test]
fn polls_after_start_never_report_unknown_while_pending() {
    let (provider, mut cam) = camera("XYZ-999");
    provider.script_statuses([BufferStatus::Cleared]);

    cam.exposure_start().unwrap();
    for _ in 0..10 {
        assert_eq!(cam.exposure_poll(|_| panic!("no frame expected")), ExposureStatus::Busy);
    }
}

#[test]
fn every_failure_status_tears_the_stream_down() {
    for failure in [
        BufferStatus::Timeout,
        BufferStatus::MissingPackets,
        BufferStatus::WrongPacketId,
        BufferStatus::SizeMismatch,
        BufferStatus::Aborted,
    ] {
        let (provider, mut cam) = camera("XYZ-999");
        provider.script_statuses([BufferStatus::Filling, failure]);

        cam.exposure_start().unwrap();
        assert_eq!(cam.exposure_poll(|_| panic!("no frame expected")), ExposureStatus::Filling);
        assert_eq!(cam.exposure_poll(|_| panic!("no frame expected")), ExposureStatus::Failed, "{failure:?}");
        assert!(!cam.is_exposing(), "{failure:?}");
        assert_eq!(provider.live_streams(), 0, "{failure:?}");
    }
}

#[test]
fn abort_is_idempotent() {
    let (provider, mut cam) = camera("XYZ-999");

    cam.exposure_abort();
    cam.exposure_abort();
    assert_eq!(provider.call_count("abort_acquisition"), 0);

    cam.exposure_start().unwrap();
    cam.exposure_abort();
    cam.exposure_abort();

    assert_eq!(provider.call_count("abort_acquisition"), 1);
    assert!(!cam.is_exposing());
    assert_eq!(provider.live_streams(), 0);
    assert_eq!(cam.exposure_poll(|_| panic!("no frame expected")), ExposureStatus::Unknown);
}

#[test]
fn starting_twice_aborts_the_first_exposure() {
    let (provider, mut cam) = camera("XYZ-999");

    cam.exposure_start().unwrap();
    cam.exposure_start().unwrap();

    assert_eq!(provider.call_count("abort_acquisition"), 1);
    assert_eq!(provider.live_streams(), 1);
}

#[test]
fn failed_allocation_leaves_nothing_behind() {
    let (provider, mut cam) = camera("XYZ-999");

    provider.fail_call("payload");
    assert_eq!(cam.exposure_start(), Err(GigeError::BufferAllocation));
    assert!(!cam.is_exposing());
    assert_eq!(provider.live_streams(), 0);
    provider.restore_call("payload");

    provider.set_payload_override(Some(0));
    assert_eq!(cam.exposure_start(), Err(GigeError::BufferAllocation));
    assert_eq!(provider.live_streams(), 0);
    provider.set_payload_override(None);

    provider.fail_call("create_stream");
    assert_eq!(cam.exposure_start(), Err(GigeError::BufferAllocation));
    assert_eq!(provider.live_streams(), 0);
    provider.restore_call("create_stream");

    cam.disconnect();
    assert_eq!(cam.exposure_start(), Err(GigeError::BufferAllocation));
}

#[test]
fn trigger_errors_do_not_fail_the_start() {
    let (provider, mut cam) = camera("XYZ-999");
    provider.fail_call("software_trigger");

    assert!(cam.exposure_start().is_ok());
    assert!(cam.is_exposing());
}

#[test]
fn gain_is_clamped_and_reported() {
    let (provider, mut cam) = camera("XYZ-999");
    cam.connect().unwrap();

    let applied = cam.set_gain(12.0);
    assert!(applied.is_exact());
    assert_eq!(provider.gain(), 12.0);

    let applied = cam.set_gain(100.0);
    assert_eq!(applied.clamp, Clamp::Clamped);
    assert_eq!(applied.warning, None);
    assert_eq!(cam.gain().val(), 24.0);
    assert_eq!(provider.gain(), 24.0);
}

#[test]
fn rejected_writes_surface_as_warnings() {
    let (provider, mut cam) = camera("XYZ-999");

    provider.fail_call("set_gain");
    let applied = cam.set_gain(3.0);
    assert_eq!(applied.clamp, Clamp::Exact);
    assert!(matches!(applied.warning, Some(GigeError::Device { call: "set_gain", .. })));
    assert_eq!(cam.gain().val(), 3.0);

    cam.disconnect();
    let applied = cam.set_exposure_time(1000.0);
    assert_eq!(applied.warning, Some(GigeError::NotConnected));
}

#[test]
fn settings_abort_an_exposure_in_flight() {
    let (provider, mut cam) = camera("XYZ-999");

    cam.exposure_start().unwrap();
    let _ = cam.set_exposure_time(500_000.0);
    assert!(!cam.is_exposing());
    assert_eq!(provider.exposure_time(), 500_000.0);

    cam.exposure_start().unwrap();
    let _ = cam.set_gain(1.0);
    assert!(!cam.is_exposing());
    assert_eq!(provider.live_streams(), 0);
}

#[test]
fn payload_must_match_the_geometry() {
    let (provider, mut cam) = camera("XYZ-999");
    cam.connect().unwrap();
    cam.update_geometry().unwrap();

    assert_eq!(cam.frame_buffer_size(), Ok(FULL_FRAME));

    provider.set_payload_override(Some(10));
    assert_eq!(
        cam.frame_buffer_size(),
        Err(GigeError::PayloadMismatch {
            expected: FULL_FRAME,
            payload: 10
        })
    );
}

#[test]
fn geometry_follows_the_camera() {
    let (provider, mut cam) = camera("XYZ-999");
    cam.connect().unwrap();

    assert!(cam.set_geometry(4, 2, 16, 8).is_exact());
    cam.update_geometry().unwrap();

    assert_eq!((cam.x_offset().val(), cam.y_offset().val()), (4, 2));
    assert_eq!((cam.width().val(), cam.height().val()), (16, 8));
    assert_eq!(provider.payload(), 16 * 8);

    // Outside the sensor: the property is clamped and the camera rejects the region.
    let applied = cam.set_geometry(60, 0, 100, 48);
    assert!(applied.clamp.is_clamped());
    assert!(applied.warning.is_some());
}

#[test]
fn blackfly_registers_are_written() {
    let (provider, cam) = camera("BFLY-PGE-31S4M");

    assert_eq!(cam.model(), CameraModel::BlackFly);
    assert_eq!(provider.feature(features::PIXEL_FORMAT).as_deref(), Some(features::MONO8));
    assert_eq!(provider.feature(features::EXPOSURE_COMPENSATION_AUTO).as_deref(), Some(features::OFF));
    assert_eq!(provider.feature(features::SHARPNESS_AUTO).as_deref(), Some(features::OFF));
    assert_eq!(provider.pixel_format(), PixelFormat::Mono8);
}

#[test]
fn rejected_registers_do_not_stop_the_sequence() {
    let provider = SimProvider::new("BFLY-PGE-31S4M");
    provider.reject_feature(features::EXPOSURE_COMPENSATION_AUTO);

    let mut device = provider.open(None).unwrap();
    assert_eq!(CameraModel::BlackFly.configure_registers(&mut device), 1);

    assert_eq!(provider.feature(features::PIXEL_FORMAT).as_deref(), Some(features::MONO8));
    assert_eq!(provider.feature(features::EXPOSURE_COMPENSATION_AUTO), None);
    assert_eq!(provider.feature(features::SHARPNESS_AUTO).as_deref(), Some(features::OFF));
    assert_eq!(provider.call_count("set_binning"), 1);
}

#[test]
fn prosilica_setup_and_temperature() {
    let (provider, cam) = camera("GT6600C");

    assert_eq!(cam.model(), CameraModel::Prosilica);
    assert_eq!(cam.bpp().val(), 16);
    assert_eq!(provider.pixel_format(), PixelFormat::BayerGr12);
    assert_eq!(provider.feature(features::SENSOR_DIGITIZATION_TAPS).as_deref(), Some(features::FOUR));
    assert_eq!(provider.feature(features::BALANCE_WHITE_AUTO).as_deref(), Some(features::OFF));
    assert_eq!(provider.feature(features::DEVICE_TEMPERATURE_SELECTOR).as_deref(), Some(features::MAIN));

    assert_eq!(cam.temperature(), 31.5);

    provider.remove_float_feature(features::DEVICE_TEMPERATURE);
    assert_eq!(cam.temperature(), consts::TEMPERATURE_UNSUPPORTED);
}

#[test]
fn other_models_report_no_temperature() {
    let (_, cam) = camera("BFLY-PGE-31S4M");
    assert_eq!(cam.temperature(), consts::TEMPERATURE_UNSUPPORTED);

    let (_, mut cam) = camera("GT6600C");
    cam.disconnect();
    assert_eq!(cam.temperature(), consts::TEMPERATURE_UNSUPPORTED);
}
