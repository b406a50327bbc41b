use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use photofilter::{
    Backend, CpuDevice, FilterPipeline, FrameOutcome, GpuDevice, GpuOptions, StageKind,
    config::{AppConfig, BACKEND_ENV, BackendChoice},
};

const VIEW_WIDTH: u32 = 1280;
const VIEW_HEIGHT: u32 = 720;
const SWEEP_STEPS: u32 = 120;

fn median_ms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

fn synthetic_image() -> RgbaImage {
    ImageBuffer::from_fn(1920, 1080, |x, y| {
        Rgba([
            ((x * 7 + y * 3) % 256) as u8,
            ((x * 11 + y * 5) % 256) as u8,
            ((x * 13 + y * 17) % 256) as u8,
            255,
        ])
    })
}

/// Position `step` of a triangle wave across `range`.
fn sweep(step: u32, lo: f32, hi: f32) -> f32 {
    let phase = (step % SWEEP_STEPS) as f32 / SWEEP_STEPS as f32;
    let t = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
    lo + (hi - lo) * t
}

struct Samples {
    recompute: Vec<f64>,
    cached: Vec<f64>,
    skipped: usize,
}

fn probe<B: Backend>(device: Arc<B>, image: &RgbaImage, frames: usize) -> Result<Samples> {
    let mut pipeline = FilterPipeline::new(device.clone()).context("pipeline setup failed")?;
    pipeline
        .load_source(image)
        .context("could not upload probe image")?;
    pipeline.resize_display(VIEW_WIDTH, VIEW_HEIGHT);
    let target = device
        .create_target(VIEW_WIDTH, VIEW_HEIGHT)
        .context("could not create render target")?;

    // Slider input arrives from its own thread, faster than frames render.
    let controls = pipeline.controls();
    let sweeper = std::thread::spawn(move || {
        for step in 0..SWEEP_STEPS * 2 {
            controls.set(StageKind::Brightness, sweep(step, -0.3, 0.3));
            controls.set(StageKind::Saturation, sweep(step + 30, -1.0, 1.0));
            controls.set(StageKind::Blur, sweep(step, 0.0, 16.0));
            std::thread::sleep(Duration::from_millis(2));
        }
    });

    let mut samples = Samples {
        recompute: Vec::with_capacity(frames),
        cached: Vec::with_capacity(frames),
        skipped: 0,
    };
    let mut rendered = 0;
    while rendered < frames || !sweeper.is_finished() {
        let t0 = Instant::now();
        let outcome = pipeline.render_frame(Some(&target));
        let ms = t0.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            FrameOutcome::Presented { recomputed: true } => samples.recompute.push(ms),
            FrameOutcome::Presented { recomputed: false } => samples.cached.push(ms),
            FrameOutcome::Skipped(reason) => {
                tracing::warn!(?reason, "probe frame skipped");
                samples.skipped += 1;
            }
        }
        rendered += 1;
    }
    sweeper
        .join()
        .map_err(|_| anyhow::anyhow!("slider thread panicked"))?;

    // Make sure the final frame actually finished before reporting.
    device
        .read_target(&target)
        .context("final readback failed")?;
    Ok(samples)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _bin = args.next();
    let image = match args.next() {
        Some(path) if path != "-" => {
            let path = PathBuf::from(path);
            image::open(&path)
                .with_context(|| format!("could not open {}", path.display()))?
                .into_rgba8()
        }
        _ => synthetic_image(),
    };
    let frames = args
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(200);

    let config = AppConfig::load();
    let env = std::env::var(BACKEND_ENV).ok();
    let choice = config.resolve_backend(env.as_deref());
    tracing::info!(requested = choice.label(), "backend resolved");
    let gpu = match choice {
        BackendChoice::Cpu => None,
        _ => GpuDevice::new(GpuOptions {
            execution_width: config.execution_width,
            ..Default::default()
        })
        .ok(),
    };
    if choice == BackendChoice::Gpu && gpu.is_none() {
        anyhow::bail!("gpu backend requested but no adapter is available");
    }

    let (backend, samples) = match gpu {
        Some(device) => {
            eprintln!("Probing gpu on {}", device.adapter_summary());
            ("gpu", probe(Arc::new(device), &image, frames)?)
        }
        None => {
            eprintln!("Probing cpu reference backend");
            ("cpu", probe(
                    Arc::new(CpuDevice::with_limits(config.execution_limits())),
                    &image,
                    frames,
                )?)
        }
    };

    println!("METRIC backend={}", backend);
    println!("METRIC image={}x{}", image.width(), image.height());
    println!(
        "METRIC frame_count={}",
        samples.recompute.len() + samples.cached.len()
    );
    println!("METRIC recompute_count={}", samples.recompute.len());
    println!("METRIC skipped_count={}", samples.skipped);
    println!(
        "METRIC recompute_ms_median={:.2}",
        median_ms(&samples.recompute)
    );
    println!("METRIC cached_ms_median={:.2}", median_ms(&samples.cached));
    Ok(())
}
