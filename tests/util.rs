mod common;

use std::time::Duration;

use gige_ccd::{ccd::ExposureOutcome, util::CcdUtil, vision::BufferStatus, GigeError};

use common::connected_ccd;

#[tokio::test(start_paused = true)]
async fn capture_frame_returns_the_frame() {
    let (provider, mut ccd) = connected_ccd("XYZ-999");

    let frame = ccd.capture_frame(0.05).await.unwrap();

    assert_eq!(frame.len(), 64 * 48);
    assert_eq!(ccd.host().completed.len(), 1);
    assert_eq!(provider.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn capture_frame_reports_a_failed_exposure() {
    let (provider, mut ccd) = connected_ccd("XYZ-999");
    provider.script_statuses([BufferStatus::Filling, BufferStatus::MissingPackets]);

    let res = ccd.capture_frame(0.05).await;

    assert!(matches!(res, Err(GigeError::ExposureFailed(_))));
    assert_eq!(ccd.last_exposure(), Some(ExposureOutcome::Failed));
}

#[tokio::test(start_paused = true)]
async fn capture_frame_gives_up_on_a_silent_camera() {
    let (provider, mut ccd) = connected_ccd("XYZ-999");
    provider.script_statuses([BufferStatus::Cleared]);
    let started = tokio::time::Instant::now();

    let res = ccd.capture_frame(0.05).await;

    // The trigger guard fires at exposure + exposure_timeout, well before the backstop.
    let waited = started.elapsed();
    assert!(waited > Duration::from_millis(2050), "{waited:?}");
    assert!(waited < Duration::from_millis(2500), "{waited:?}");

    assert!(matches!(res, Err(GigeError::ExposureFailed(_))));
    assert_eq!(ccd.host().failed, 1);
    assert_eq!(ccd.last_exposure(), Some(ExposureOutcome::Failed));
    assert!(!ccd.is_exposing());
    assert_eq!(provider.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn capture_frame_waits_out_a_slow_transfer() {
    let (provider, mut ccd) = connected_ccd("XYZ-999");
    provider.script_statuses([BufferStatus::Filling]);
    let started = tokio::time::Instant::now();

    let res = ccd.capture_frame(0.05).await;

    let waited = started.elapsed();
    assert!(waited > Duration::from_millis(5050), "{waited:?}");
    assert!(matches!(res, Err(GigeError::ExposureFailed(_))));
    assert_eq!(ccd.host().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn capture_frame_needs_a_connection() {
    let (_provider, mut ccd) = connected_ccd("XYZ-999");
    ccd.disconnect();

    assert!(matches!(ccd.capture_frame(0.05).await, Err(GigeError::ExposureFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn run_timer_drives_the_exposure() {
    let (_provider, mut ccd) = connected_ccd("GT6600C");
    assert!(ccd.start_exposure(0.05));

    ccd.run_timer(tokio::time::sleep(Duration::from_secs(1))).await;

    assert_eq!(ccd.host().completed.len(), 1);
    assert_eq!(ccd.host().completed[0].len(), 64 * 48 * 2);
    assert!(ccd.host().temperatures.len() > 3);
}

#[tokio::test(start_paused = true)]
async fn run_timer_idles_while_disarmed() {
    let (_provider, mut ccd) = connected_ccd("GT6600C");
    ccd.disconnect();
    ccd.update_properties();

    ccd.run_timer(tokio::time::sleep(Duration::from_secs(1))).await;

    assert_eq!(ccd.host().temperatures.len(), 1);
}
