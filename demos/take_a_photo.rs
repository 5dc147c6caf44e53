use gige_ccd::{ccd::LogHost, factory, sim::SimProvider, util::CcdUtil};

#[tokio::main]
/// This example takes a one second exposure on the simulated camera and saves it as a PNG.
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let provider = SimProvider::new("BFLY-PGE-31S4M");
    let mut devices = factory::discover(provider, |_| LogHost);

    let Some(ccd) = devices.first_mut() else {
        println!("No camera found");
        return Ok(());
    };

    ccd.connect()?;
    ccd.update_properties();

    let frame = ccd.capture_frame(1.0).await?;
    println!("Received an image! Saving it...");

    let (width, height) = (ccd.camera().width().val(), ccd.camera().height().val());
    let img = image::GrayImage::from_raw(width as u32, height as u32, frame)
        .ok_or("frame doesn't match the reported geometry")?;

    img.save("image.png")?;

    for keyword in ccd.fits_keywords() {
        println!("{} = {:?} / {}", keyword.name, keyword.value, keyword.comment);
    }

    ccd.disconnect();
    Ok(())
}
