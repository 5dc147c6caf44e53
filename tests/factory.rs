mod common;

use gige_ccd::{ccd::LogHost, factory, model::CameraModel, sim::SimProvider};

#[test]
fn routes_by_model_name() {
    for (name, model) in [
        ("BFLY-PGE-31S4M", CameraModel::BlackFly),
        ("GT6600C", CameraModel::Prosilica),
        ("XYZ-999", CameraModel::Generic),
    ] {
        let cam = factory::find_first_available(SimProvider::new(name)).expect("reachable");
        assert_eq!(cam.model(), model, "{name}");
        assert_eq!(cam.model_name(), name);
    }
}

#[test]
fn nothing_reachable_is_not_an_error() {
    common::init_logger();

    assert!(factory::find_first_available(SimProvider::unreachable()).is_none());
    assert!(factory::discover(SimProvider::unreachable(), |_| LogHost).is_empty());
}

#[test]
fn unreadable_model_name_yields_no_camera() {
    let provider = SimProvider::new("GT6600C");
    provider.fail_call("model_name");

    assert!(factory::find_first_available(provider).is_none());
}

#[test]
fn discover_names_the_device_after_the_model() {
    let mut names = Vec::new();
    let devices = factory::discover(SimProvider::new("GT6600C"), |name| {
        names.push(name.to_string());
        LogHost
    });

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_name(), "GT6600C");
    assert_eq!(names, vec!["GT6600C".to_string()]);
}
