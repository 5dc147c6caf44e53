use log::*;

use crate::{
    cam::GigeCamera,
    ccd::{CcdHost, GigeCcd},
    model::CameraModel,
    vision::{CameraDevice, DeviceProvider},
};

/// Opens the first reachable camera and wraps it with the matching model.
///
/// Returns `None` when no camera is reachable. That is a normal outcome at startup,
/// so it is only logged.
pub fn find_first_available<P: DeviceProvider>(provider: P) -> Option<GigeCamera<P>> {
    let device = match provider.open(None) {
        Ok(device) => device,
        Err(e) => {
            info!("No GigE camera available ({e})");
            return None;
        }
    };

    let model_name = match device.model_name() {
        Ok(name) => name,
        Err(e) => {
            warn!("Found a camera, but couldn't read its model name ({e})");
            return None;
        }
    };

    let model = CameraModel::from_model_name(&model_name);
    info!("Creating {model:?} camera for {model_name}");

    Some(GigeCamera::new(provider, device, model))
}

/// Initialization entry point for the hosting process.
///
/// Discovers the available cameras and binds each one to a device front-end.
/// `host_for` builds the notification sink for a camera, given its device name.
pub fn discover<P, H>(provider: P, mut host_for: impl FnMut(&str) -> H) -> Vec<GigeCcd<P, H>>
where
    P: DeviceProvider,
    H: CcdHost,
{
    find_first_available(provider)
        .map(|camera| {
            let host = host_for(camera.model_name());
            GigeCcd::new(camera, host)
        })
        .into_iter()
        .collect()
}
