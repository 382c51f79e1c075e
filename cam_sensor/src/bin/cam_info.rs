//! List what a video device supports, to help picking capture constraints.
//!
use cam_sensor::{
    sensors::{device_label, select_frame_rate, select_resolution},
    Error,
};
use clap::Parser;
use env_logger::TimestampPrecision;
use rscam::Camera;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Video device to inspect
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// FourCC format to list resolutions and frame rates for
    #[clap(long, default_value = "MJPG")]
    format: String,

    /// Maximum width used to preview the resolution selection
    #[clap(long, default_value_t = 1280)]
    width: u32,

    /// Maximum height used to preview the resolution selection
    #[clap(long, default_value_t = 720)]
    height: u32,
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let cam = Camera::new(&args.device)?;
    println!("Device: {} ({})", device_label(&args.device), &args.device);

    for format in cam.formats() {
        match format {
            Ok(format) => println!("Format: {format:?}"),
            Err(err) => log::warn!("Could not query format: {err}"),
        }
    }

    let format = args.format.as_bytes();
    let resolutions = cam.resolutions(format)?;
    println!("Resolutions for {}: {resolutions:?}", &args.format);

    match select_resolution(&resolutions, (args.width, args.height)) {
        Some(resolution) => {
            let intervals = cam.intervals(format, resolution)?;
            println!("Frame intervals at {resolution:?}: {intervals:?}");
            println!(
                "Selected: {resolution:?} with interval {:?}",
                select_frame_rate(&intervals)
            );
        }
        None => log::error!("No resolution available for {}", &args.format),
    }

    Ok(())
}
