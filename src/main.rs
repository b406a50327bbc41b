use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use photofilter::{
    Backend, CpuDevice, FilterParams, FilterPipeline, FrameOutcome, GpuDevice, GpuOptions,
    config::{AppConfig, BACKEND_ENV, BackendChoice, parse_backend},
    source,
    texture::Texture,
};

#[derive(Parser, Debug)]
#[command(name = "photofilter", about = "Filter an image and render the presented frame")]
struct Args {
    /// Image to filter.
    input: PathBuf,

    /// Where to write the presented frame.
    #[arg(short, long, default_value = "photofilter-out.png")]
    output: PathBuf,

    /// Also write the filtered image at source resolution.
    #[arg(long)]
    filtered: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    brightness: f32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    contrast: f32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    saturation: f32,

    /// Blur radius in pixels; fractions are truncated.
    #[arg(long, default_value_t = 0.0)]
    blur: f32,

    /// View width; defaults to the config file, then the image width.
    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Frames to render. Only the first recomputes unless parameters change.
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// auto, gpu or cpu. Overrides the config file and the environment.
    #[arg(long, value_parser = backend_arg)]
    backend: Option<BackendChoice>,
}

fn backend_arg(value: &str) -> Result<BackendChoice, std::convert::Infallible> {
    Ok(parse_backend(value))
}

impl Args {
    fn params(&self) -> FilterParams {
        FilterParams {
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            blur_radius: self.blur,
        }
    }
}

fn resolve_backend(args: &Args, config: &AppConfig) -> BackendChoice {
    if let Some(choice) = args.backend {
        return choice;
    }
    let env = std::env::var(BACKEND_ENV).ok();
    config.resolve_backend(env.as_deref())
}

fn cpu_device(config: &AppConfig) -> CpuDevice {
    CpuDevice::with_limits(config.execution_limits())
}

fn report_backend(name: &str, detail: &str) {
    eprintln!("photofilter: backend = {} ({})", name, detail);
}

fn run<B: Backend>(device: Arc<B>, args: &Args, config: &AppConfig) -> Result<()> {
    let texture = source::open_texture(device.as_ref(), &args.input)
        .with_context(|| format!("could not load {}", args.input.display()))?;
    let desc = texture.desc();

    let mut pipeline = FilterPipeline::new(device.clone()).context("pipeline setup failed")?;
    pipeline
        .set_source_image(Some(texture))
        .context("could not allocate filter textures")?;
    pipeline.set_parameters(&args.params());

    let view_width = args.width.or(config.view_width).unwrap_or(desc.width);
    let view_height = args.height.or(config.view_height).unwrap_or(desc.height);
    pipeline.resize_display(view_width, view_height);
    let target = device
        .create_target(view_width, view_height)
        .context("could not create render target")?;

    for index in 0..args.frames.max(1) {
        let outcome = pipeline.render_frame(Some(&target));
        tracing::debug!(frame = index, ?outcome, "frame rendered");
        if let FrameOutcome::Skipped(reason) = outcome {
            anyhow::bail!("frame {} was skipped: {:?}", index, reason);
        }
    }

    let presented = device
        .read_target(&target)
        .context("could not read back the presented frame")?;
    presented
        .save(&args.output)
        .with_context(|| format!("could not write {}", args.output.display()))?;
    eprintln!(
        "photofilter: wrote {}x{} frame to {} ({} recompute(s))",
        view_width,
        view_height,
        args.output.display(),
        pipeline.recomputations()
    );

    if let Some(path) = args.filtered.as_ref() {
        let output = pipeline
            .output_texture()
            .context("pipeline has no output texture")?;
        device
            .read_texture(output)
            .context("could not read back the filtered image")?
            .save(path)
            .with_context(|| format!("could not write {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = AppConfig::load();
    let choice = resolve_backend(&args, &config);
    tracing::info!(requested = choice.label(), "backend resolved");

    let gpu_options = GpuOptions {
        execution_width: config.execution_width,
        ..Default::default()
    };
    match choice {
        BackendChoice::Cpu => {
            report_backend("cpu", "requested");
            run(Arc::new(cpu_device(&config)), &args, &config)
        }
        BackendChoice::Gpu => {
            let device = GpuDevice::new(gpu_options).context("gpu backend requested")?;
            report_backend("gpu", &device.adapter_summary());
            run(Arc::new(device), &args, &config)
        }
        BackendChoice::Auto => match GpuDevice::new(gpu_options) {
            Ok(device) => {
                report_backend("gpu", &device.adapter_summary());
                run(Arc::new(device), &args, &config)
            }
            Err(err) => {
                tracing::warn!(%err, "gpu unavailable, using cpu");
                report_backend("cpu", "gpu unavailable");
                run(Arc::new(cpu_device(&config)), &args, &config)
            }
        },
    }
}
