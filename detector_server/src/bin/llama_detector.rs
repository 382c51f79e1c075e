//! Llama detector binary.
//!
use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::Parser;
use detector_server::{
    acquirer::{probe_capability, V4l2Acquirer},
    config::Args,
    endpoints::{router, PageAssets},
    meter::spawn_meter_logger,
    nn::OnnxModelLoader,
    session::Detector,
    ui::UiController,
};
use env_logger::TimestampPrecision;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let config = args.detector_config();
    log::debug!("Detector config: {:?}", &config);

    // Without a camera there is nothing to start, tell the page right away
    let ui = Arc::new(UiController::default());
    match probe_capability(&config.constraints.device) {
        Ok(()) => ui.show_supported(),
        Err(err) => ui.show_unsupported(err),
    }

    let loader = OnnxModelLoader::new(args.model_source(), args.top_k);
    let detector = Detector::new(config, ui, Arc::new(V4l2Acquirer), Arc::new(loader));

    spawn_meter_logger();

    // Build HTTP server with endpoints
    let assets = Arc::new(PageAssets {
        sound_file: args.sound_file.clone(),
    });
    let app = router(detector, assets);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving llama detector on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
