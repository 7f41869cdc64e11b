use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use vimbasrc_backend_vmb::{VmbDriver, VmbStream};
use vimbasrc_core::builder::{CameraConfig, FormatRequest};
use vimbasrc_core::frame::FrameStatus;
use vimbasrc_core::pixel_format::FormatFamily;
use vimbasrc_core::traits::{Driver, Stream};
use vimbasrc_simulation::{SimulatedCamera, SimulatedSdk};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== vimbasrc simulated capture ===");

    let sdk = Arc::new(
        SimulatedSdk::new()
            .with_camera(SimulatedCamera::new("DEV_000F314C4C2A"))
            .with_camera(SimulatedCamera::new("DEV_000F314C4C2B").locked()),
    );
    let driver = VmbDriver::new(sdk.clone());

    let devices = driver.list_devices()?;
    println!("Found {} cameras:", devices.len());
    for (i, dev) in devices.iter().enumerate() {
        println!(
            "  [{}] {} ({}) - {}",
            i,
            dev.name,
            dev.id,
            dev.serial.as_deref().unwrap_or("N/A")
        );
    }
    let target = devices.first().context("no cameras")?;

    let config = CameraConfig::new()
        .buffer_count(5)
        .frame_timeout(Duration::from_millis(500))
        .format(FormatRequest::new(1280, 960, FormatFamily::Bayer, "rggb"));
    let engine = driver.open_engine(&target.id, config)?;

    let caps = engine.caps()?;
    println!(
        "Caps: raw={:?} bayer={:?} max={}x{} @ {}/{}",
        caps.raw, caps.bayer, caps.max_width, caps.max_height, caps.framerate.0, caps.framerate.1
    );

    let mut stream = VmbStream::new(engine.clone());
    stream.start().await?;

    // 模拟驱动投递线程：约 30 fps 共 30 帧，每第十帧不完整
    let producer = {
        let sdk = Arc::clone(&sdk);
        thread::spawn(move || {
            for i in 1..=30u32 {
                let status = if i % 10 == 0 {
                    FrameStatus::Incomplete
                } else {
                    FrameStatus::Complete
                };
                sdk.emit_frame(status);
                thread::sleep(Duration::from_millis(33));
            }
        })
    };

    let mut received = 0;
    while let Some(frame) = stream.next_frame().await? {
        received += 1;
        if received % 9 == 1 {
            println!(
                "frame #{:<4} {:>8} bytes  pts={:?}",
                frame.frame_id, frame.length, frame.pts
            );
        }
    }
    producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;

    stream.stop().await?;
    println!("Received {received} frames");
    println!("{}", engine.export_state()?);
    Ok(())
}
