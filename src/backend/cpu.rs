use std::sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicU32, AtomicU64, Ordering},
};

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use super::{Backend, DispatchGrid, ExecutionLimits, KernelArgs, validate_dispatch};
use crate::{
    error::{FrameError, PipelineError},
    present::DisplayScale,
    texture::{PixelFormat, Texture, TextureDesc, TextureUsage},
};

const MAX_TEXTURE_DIMENSION: u32 = 8192;

type Texel = [f32; 4];

#[derive(Clone, Debug)]
/// Texture held in host memory as normalized RGBA floats.
pub struct CpuTexture {
    desc: TextureDesc,
    texels: Arc<RwLock<Vec<Texel>>>,
}

impl Texture for CpuTexture {
    fn desc(&self) -> TextureDesc {
        self.desc
    }

    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.texels, &other.texels)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KernelOp {
    Brightness,
    Contrast,
    Saturation,
    BlurHorizontal,
    BlurVertical,
}

impl KernelOp {
    fn from_name(name: &str) -> Option<(&'static str, Self)> {
        let entry = match name {
            "brightness" => ("brightness", KernelOp::Brightness),
            "contrast" => ("contrast", KernelOp::Contrast),
            "saturation" => ("saturation", KernelOp::Saturation),
            "gaussianBlurHorizontal" => ("gaussianBlurHorizontal", KernelOp::BlurHorizontal),
            "gaussianBlurVertical" => ("gaussianBlurVertical", KernelOp::BlurVertical),
            _ => return None,
        };
        Some(entry)
    }
}

#[derive(Clone, Debug)]
pub struct CpuKernel {
    name: &'static str,
    op: KernelOp,
}

#[derive(Clone, Debug)]
/// Offscreen presentation target backed by an RGBA image.
pub struct CpuTarget {
    image: Arc<Mutex<RgbaImage>>,
}

impl CpuTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: Arc::new(Mutex::new(RgbaImage::new(width, height))),
        }
    }

    pub fn snapshot(&self) -> RgbaImage {
        self.image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

enum Command {
    Dispatch {
        kernel: &'static str,
        op: KernelOp,
        grid: DispatchGrid,
        input: CpuTexture,
        output: CpuTexture,
        value: f32,
        radius: u32,
        weights: Vec<f32>,
    },
    Present {
        source: CpuTexture,
        scale: DisplayScale,
        target: CpuTarget,
    },
}

/// Recorded but not yet executed work.
pub struct CpuFrame {
    label: &'static str,
    commands: Vec<Command>,
}

/// One executed dispatch, kept when the device records its history.
#[derive(Clone, Debug)]
pub struct DispatchRecord {
    pub kernel: &'static str,
    pub input: CpuTexture,
    pub output: CpuTexture,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Work counters, for asserting how much a frame actually did.
pub struct CpuStats {
    pub frames: u64,
    pub dispatches: u64,
    pub presents: u64,
}

/// Reference backend running every kernel on the CPU with rayon.
#[derive(Debug)]
pub struct CpuDevice {
    limits: ExecutionLimits,
    disabled_kernels: Vec<String>,
    frames: AtomicU64,
    dispatches: AtomicU64,
    presents: AtomicU64,
    unavailable_frames: AtomicU32,
    rejected_kernels: Mutex<Vec<String>>,
    history: Option<Mutex<Vec<DispatchRecord>>>,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::with_limits(ExecutionLimits::default())
    }

    pub fn with_limits(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            disabled_kernels: Vec::new(),
            frames: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            presents: AtomicU64::new(0),
            unavailable_frames: AtomicU32::new(0),
            rejected_kernels: Mutex::new(Vec::new()),
            history: None,
        }
    }

    /// Removes `name` from the kernel library, as if it failed to compile.
    pub fn without_kernel(mut self, name: &str) -> Self {
        self.disabled_kernels.push(name.to_string());
        self
    }

    /// Makes the next `count` calls to `begin_frame` fail.
    pub fn fail_next_frames(&self, count: u32) {
        self.unavailable_frames.store(count, Ordering::Relaxed);
    }

    /// Makes the next dispatch of `name` fail to record.
    pub fn reject_next_dispatch(&self, name: &str) {
        self.rejected_kernels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
    }

    /// Keeps a record of every executed dispatch. Records hold their
    /// textures alive, so this is for tests and short runs.
    pub fn with_dispatch_history(mut self) -> Self {
        self.history = Some(Mutex::new(Vec::new()));
        self
    }

    /// Executed dispatches in submission order. Empty unless enabled with
    /// [`Self::with_dispatch_history`].
    pub fn dispatch_history(&self) -> Vec<DispatchRecord> {
        self.history
            .as_ref()
            .map(|h| h.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    fn take_rejection(&self, name: &str) -> bool {
        let mut rejected = self
            .rejected_kernels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match rejected.iter().position(|k| k == name) {
            Some(index) => {
                rejected.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CpuStats {
        CpuStats {
            frames: self.frames.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            presents: self.presents.load(Ordering::Relaxed),
        }
    }

    fn allocate(&self, desc: TextureDesc, texels: Vec<Texel>) -> CpuTexture {
        CpuTexture {
            desc,
            texels: Arc::new(RwLock::new(texels)),
        }
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        if width == 0 || height == 0 || width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION
        {
            return Err(PipelineError::TextureSize {
                width,
                height,
                limit: MAX_TEXTURE_DIMENSION,
            });
        }
        Ok(())
    }
}

impl Backend for CpuDevice {
    type Texture = CpuTexture;
    type Kernel = CpuKernel;
    type Frame = CpuFrame;
    type Target = CpuTarget;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    fn kernel(&self, name: &str) -> Result<CpuKernel, PipelineError> {
        if self.disabled_kernels.iter().any(|k| k == name) {
            return Err(PipelineError::MissingKernel(name.to_string()));
        }
        let (name, op) =
            KernelOp::from_name(name).ok_or_else(|| PipelineError::MissingKernel(name.to_string()))?;
        Ok(CpuKernel { name, op })
    }

    fn kernel_name(&self, kernel: &CpuKernel) -> &'static str {
        kernel.name
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<CpuTexture, PipelineError> {
        self.check_size(desc.width, desc.height)?;
        Ok(self.allocate(*desc, vec![[0.0; 4]; desc.texel_count()]))
    }

    fn upload(&self, image: &RgbaImage) -> Result<CpuTexture, PipelineError> {
        self.check_size(image.width(), image.height())?;
        let desc = TextureDesc::new(
            image.width(),
            image.height(),
            PixelFormat::Rgba8Unorm,
            TextureUsage::SOURCE,
        );
        let texels = image
            .pixels()
            .map(|px| px.0.map(|c| c as f32 / 255.0))
            .collect();
        Ok(self.allocate(desc, texels))
    }

    fn read_texture(&self, texture: &CpuTexture) -> Result<RgbaImage, PipelineError> {
        let texels = texture.texels.read().unwrap_or_else(PoisonError::into_inner);
        let bytes = texels
            .iter()
            .flat_map(|t| t.map(to_byte))
            .collect::<Vec<u8>>();
        RgbaImage::from_raw(texture.desc.width, texture.desc.height, bytes)
            .ok_or_else(|| PipelineError::Readback("texel count does not match extent".into()))
    }

    fn create_target(&self, width: u32, height: u32) -> Result<CpuTarget, PipelineError> {
        self.check_size(width, height)?;
        Ok(CpuTarget::new(width, height))
    }

    fn read_target(&self, target: &CpuTarget) -> Result<RgbaImage, PipelineError> {
        Ok(target.snapshot())
    }

    fn begin_frame(&self, label: &'static str) -> Result<CpuFrame, FrameError> {
        let refused = self
            .unavailable_frames
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(FrameError::EncoderUnavailable);
        }
        Ok(CpuFrame {
            label,
            commands: Vec::new(),
        })
    }

    fn dispatch(
        &self,
        frame: &mut CpuFrame,
        kernel: &CpuKernel,
        input: &CpuTexture,
        output: &CpuTexture,
        args: KernelArgs<'_>,
    ) -> Result<(), FrameError> {
        validate_dispatch(kernel.name, input, output)?;
        if self.take_rejection(kernel.name) {
            return Err(FrameError::Rejected(kernel.name));
        }
        let convolution = matches!(kernel.op, KernelOp::BlurHorizontal | KernelOp::BlurVertical);
        if convolution && args.weights.len() <= args.radius as usize {
            return Err(FrameError::MissingWeights(kernel.name));
        }
        let desc = output.desc;
        frame.commands.push(Command::Dispatch {
            kernel: kernel.name,
            op: kernel.op,
            grid: DispatchGrid::cover(&self.limits, desc.width, desc.height),
            input: input.clone(),
            output: output.clone(),
            value: args.value,
            radius: args.radius,
            weights: args.weights.to_vec(),
        });
        Ok(())
    }

    fn present(
        &self,
        frame: &mut CpuFrame,
        source: &CpuTexture,
        scale: DisplayScale,
        target: &CpuTarget,
    ) -> Result<(), FrameError> {
        if !source.desc.usage.contains(TextureUsage::SAMPLED) {
            return Err(FrameError::Usage("present"));
        }
        frame.commands.push(Command::Present {
            source: source.clone(),
            scale,
            target: target.clone(),
        });
        Ok(())
    }

    fn submit(&self, frame: CpuFrame) {
        tracing::trace!(
            frame = frame.label,
            commands = frame.commands.len(),
            "cpu submit"
        );
        for command in frame.commands {
            match command {
                Command::Dispatch {
                    kernel,
                    op,
                    grid,
                    input,
                    output,
                    value,
                    radius,
                    weights,
                } => {
                    run_dispatch(op, &grid, &input, &output, value, radius, &weights);
                    self.dispatches.fetch_add(1, Ordering::Relaxed);
                    if let Some(history) = self.history.as_ref() {
                        history
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(DispatchRecord {
                                kernel,
                                input,
                                output,
                            });
                    }
                }
                Command::Present {
                    source,
                    scale,
                    target,
                } => {
                    run_present(&source, scale, &target);
                    self.presents.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn luma(px: Texel) -> f32 {
    0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2]
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

fn map_rgb(px: Texel, f: impl Fn(f32) -> f32) -> Texel {
    [f(px[0]), f(px[1]), f(px[2]), px[3]]
}

fn pointwise(op: KernelOp, px: Texel, value: f32) -> Texel {
    match op {
        KernelOp::Brightness => map_rgb(px, |c| c + value),
        KernelOp::Contrast => map_rgb(px, |c| (c - 0.5) * (1.0 + value) + 0.5),
        KernelOp::Saturation => {
            let l = luma(px);
            map_rgb(px, |c| mix(l, c, 1.0 + value))
        }
        KernelOp::BlurHorizontal | KernelOp::BlurVertical => px,
    }
}

fn convolve(
    src: &[Texel],
    desc: &TextureDesc,
    x: usize,
    y: usize,
    horizontal: bool,
    radius: u32,
    weights: &[f32],
) -> Texel {
    let w = desc.width as i64;
    let h = desc.height as i64;
    let r = radius as i64;
    let mut acc = [0.0_f32; 4];
    for k in -r..=r {
        let (sx, sy) = if horizontal {
            ((x as i64 + k).clamp(0, w - 1), y as i64)
        } else {
            (x as i64, (y as i64 + k).clamp(0, h - 1))
        };
        let weight = weights.get(k.unsigned_abs() as usize).copied().unwrap_or(0.0);
        let tap = src[(sy * w + sx) as usize];
        for c in 0..4 {
            acc[c] += tap[c] * weight;
        }
    }
    acc
}

fn run_dispatch(
    op: KernelOp,
    grid: &DispatchGrid,
    input: &CpuTexture,
    output: &CpuTexture,
    value: f32,
    radius: u32,
    weights: &[f32],
) {
    let desc = output.desc;
    let src_guard = input.texels.read().unwrap_or_else(PoisonError::into_inner);
    let src: &[Texel] = &src_guard;
    let mut dst = output.texels.write().unwrap_or_else(PoisonError::into_inner);
    let width = desc.width as usize;
    let height = desc.height as usize;
    let band = grid.group_height as usize;
    let columns = (grid.groups_x * grid.group_width) as usize;
    let format = desc.format;

    // One rayon task per row of work-groups.
    dst.par_chunks_mut(width * band)
        .enumerate()
        .for_each(|(group_y, rows)| {
            for local_y in 0..band {
                let y = group_y * band + local_y;
                for x in 0..columns {
                    if x >= width || y >= height {
                        continue;
                    }
                    let texel = match op {
                        KernelOp::BlurHorizontal => {
                            convolve(src, &input.desc, x, y, true, radius, weights)
                        }
                        KernelOp::BlurVertical => {
                            convolve(src, &input.desc, x, y, false, radius, weights)
                        }
                        _ => pointwise(op, src[y * width + x], value),
                    };
                    rows[local_y * width + x] = texel.map(|c| format.quantize(c));
                }
            }
        });
}

fn sample_bilinear(src: &[Texel], desc: &TextureDesc, u: f32, v: f32) -> Texel {
    let w = desc.width as i64;
    let h = desc.height as i64;
    let tx = u * desc.width as f32 - 0.5;
    let ty = v * desc.height as f32 - 0.5;
    let (fx, fy) = (tx - tx.floor(), ty - ty.floor());
    let (x0, y0) = (tx.floor() as i64, ty.floor() as i64);
    let fetch = |x: i64, y: i64| src[(y.clamp(0, h - 1) * w + x.clamp(0, w - 1)) as usize];
    let (p00, p10) = (fetch(x0, y0), fetch(x0 + 1, y0));
    let (p01, p11) = (fetch(x0, y0 + 1), fetch(x0 + 1, y0 + 1));
    let mut out = [0.0; 4];
    for c in 0..4 {
        let top = mix(p00[c], p10[c], fx);
        let bottom = mix(p01[c], p11[c], fx);
        out[c] = mix(top, bottom, fy);
    }
    out
}

fn run_present(source: &CpuTexture, scale: DisplayScale, target: &CpuTarget) {
    let src_guard = source.texels.read().unwrap_or_else(PoisonError::into_inner);
    let src: &[Texel] = &src_guard;
    let mut image = target.image.lock().unwrap_or_else(PoisonError::into_inner);
    let (tw, th) = image.dimensions();
    let desc = source.desc;
    let row_bytes = tw as usize * 4;

    image
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let ndc_y = 1.0 - (y as f32 + 0.5) / th as f32 * 2.0;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let ndc_x = (x as f32 + 0.5) / tw as f32 * 2.0 - 1.0;
                let qx = ndc_x / scale.x;
                let qy = ndc_y / scale.y;
                let rgba = if qx.abs() > 1.0 || qy.abs() > 1.0 {
                    Rgba([0, 0, 0, 255])
                } else {
                    let u = (qx + 1.0) * 0.5;
                    let v = (1.0 - qy) * 0.5;
                    Rgba(sample_bilinear(src, &desc, u, v).map(to_byte))
                };
                px.copy_from_slice(&rgba.0);
            }
        });
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use super::CpuDevice;
    use crate::{
        backend::{Backend, ExecutionLimits, KernelArgs},
        error::{FrameError, PipelineError},
        present::DisplayScale,
        texture::Texture,
    };

    fn gradient(w: u32, h: u32) -> RgbaImage {
        ImageBuffer::from_fn(w, h, |x, y| {
            Rgba([
                ((x * 7 + y * 3) % 256) as u8,
                ((x * 11 + y * 5) % 256) as u8,
                ((x * 13 + y * 17) % 256) as u8,
                255,
            ])
        })
    }

    fn run(device: &CpuDevice, kernel: &str, img: &RgbaImage, args: KernelArgs<'_>) -> RgbaImage {
        let input = device.upload(img).expect("upload");
        let output = device
            .create_texture(&input.desc().intermediate())
            .expect("output");
        let kernel = device.kernel(kernel).expect("kernel");
        let mut frame = device.begin_frame("test").expect("frame");
        device
            .dispatch(&mut frame, &kernel, &input, &output, args)
            .expect("dispatch");
        device.submit(frame);
        device.read_texture(&output).expect("readback")
    }

    #[test]
    fn upload_then_readback_is_lossless() {
        let device = CpuDevice::new();
        let img = gradient(13, 9);
        let tex = device.upload(&img).expect("upload");
        assert_eq!(device.read_texture(&tex).expect("readback"), img);
    }

    #[test]
    fn unknown_kernel_is_a_configuration_error() {
        let device = CpuDevice::new();
        assert!(matches!(
            device.kernel("sharpen"),
            Err(PipelineError::MissingKernel(name)) if name == "sharpen"
        ));
        let device = CpuDevice::new().without_kernel("contrast");
        assert!(device.kernel("contrast").is_err());
        assert!(device.kernel("brightness").is_ok());
    }

    #[test]
    fn zero_sized_textures_are_rejected() {
        let device = CpuDevice::new();
        assert!(device.upload(&RgbaImage::new(0, 4)).is_err());
    }

    #[test]
    fn brightness_adds_and_clamps() {
        let device = CpuDevice::new();
        let img = ImageBuffer::from_pixel(3, 2, Rgba([100, 250, 0, 77]));
        let out = run(&device, "brightness", &img, KernelArgs::scalar(0.2));
        for px in out.pixels() {
            assert_eq!(px.0, [151, 255, 51, 77]);
        }
    }

    #[test]
    fn full_desaturation_produces_gray() {
        let device = CpuDevice::new();
        let img = ImageBuffer::from_pixel(2, 2, Rgba([255, 32, 32, 255]));
        let out = run(&device, "saturation", &img, KernelArgs::scalar(-1.0));
        let px = out.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn non_multiple_extent_is_fully_covered() {
        // 17x5 with 4x2 groups leaves partial groups on both axes.
        let device = CpuDevice::with_limits(ExecutionLimits {
            preferred_width: 4,
            max_threads_per_group: 8,
        });
        let img = ImageBuffer::from_pixel(17, 5, Rgba([10, 10, 10, 255]));
        let out = run(&device, "brightness", &img, KernelArgs::scalar(0.2));
        assert!(out.pixels().all(|px| px.0 == [61, 61, 61, 255]));
    }

    #[test]
    fn blur_pass_clamps_at_edges() {
        let device = CpuDevice::new();
        let mut img = ImageBuffer::from_pixel(5, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let weights = [0.5, 0.25];
        let out = run(
            &device,
            "gaussianBlurHorizontal",
            &img,
            KernelArgs::convolution(1, &weights),
        );
        // Left tap clamps to the white edge pixel: 0.25 + 0.5 = 0.75.
        assert_eq!(out.get_pixel(0, 0)[0], 191);
        assert_eq!(out.get_pixel(1, 0)[0], 64);
        assert_eq!(out.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn aliased_dispatch_is_refused() {
        let device = CpuDevice::new();
        let tex = device
            .create_texture(&device.upload(&gradient(4, 4)).expect("upload").desc().intermediate())
            .expect("texture");
        let kernel = device.kernel("contrast").expect("kernel");
        let mut frame = device.begin_frame("alias").expect("frame");
        assert_eq!(
            device.dispatch(&mut frame, &kernel, &tex, &tex, KernelArgs::scalar(0.1)),
            Err(FrameError::AliasedTextures("contrast"))
        );
    }

    #[test]
    fn writing_into_source_texture_is_refused() {
        let device = CpuDevice::new();
        let a = device.upload(&gradient(4, 4)).expect("upload");
        let b = device.upload(&gradient(4, 4)).expect("upload");
        let kernel = device.kernel("brightness").expect("kernel");
        let mut frame = device.begin_frame("usage").expect("frame");
        assert_eq!(
            device.dispatch(&mut frame, &kernel, &a, &b, KernelArgs::scalar(0.1)),
            Err(FrameError::Usage("brightness"))
        );
    }

    #[test]
    fn injected_encoder_failures_run_out() {
        let device = CpuDevice::new();
        device.fail_next_frames(2);
        assert_eq!(
            device.begin_frame("a").err(),
            Some(FrameError::EncoderUnavailable)
        );
        assert!(device.begin_frame("b").is_err());
        assert!(device.begin_frame("c").is_ok());
    }

    #[test]
    fn rejected_dispatch_fails_once() {
        let device = CpuDevice::new();
        let a = device.upload(&gradient(4, 4)).expect("upload");
        let b = device.create_texture(&a.desc().intermediate()).expect("texture");
        let kernel = device.kernel("saturation").expect("kernel");
        device.reject_next_dispatch("saturation");
        let mut frame = device.begin_frame("reject").expect("frame");
        assert_eq!(
            device.dispatch(&mut frame, &kernel, &a, &b, KernelArgs::scalar(0.1)),
            Err(FrameError::Rejected("saturation"))
        );
        assert!(
            device
                .dispatch(&mut frame, &kernel, &a, &b, KernelArgs::scalar(0.1))
                .is_ok()
        );
    }

    #[test]
    fn history_records_executed_dispatches_in_order() {
        let device = CpuDevice::new().with_dispatch_history();
        let a = device.upload(&gradient(4, 4)).expect("upload");
        let b = device.create_texture(&a.desc().intermediate()).expect("texture");
        let c = device.create_texture(&a.desc().intermediate()).expect("texture");
        let brightness = device.kernel("brightness").expect("kernel");
        let contrast = device.kernel("contrast").expect("kernel");
        let mut frame = device.begin_frame("history").expect("frame");
        device
            .dispatch(&mut frame, &brightness, &a, &b, KernelArgs::scalar(0.1))
            .expect("dispatch");
        device
            .dispatch(&mut frame, &contrast, &b, &c, KernelArgs::scalar(0.1))
            .expect("dispatch");
        assert!(device.dispatch_history().is_empty());
        device.submit(frame);

        let history = device.dispatch_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kernel, "brightness");
        assert!(history[0].input.same_as(&a) && history[0].output.same_as(&b));
        assert_eq!(history[1].kernel, "contrast");
        assert!(history[1].input.same_as(&b) && history[1].output.same_as(&c));
        assert!(CpuDevice::new().dispatch_history().is_empty());
    }

    #[test]
    fn present_letterboxes_wide_source() {
        let device = CpuDevice::new();
        let src = device
            .upload(&ImageBuffer::from_pixel(4, 2, Rgba([200, 100, 50, 255])))
            .expect("upload");
        let output = device
            .create_texture(&src.desc().intermediate())
            .expect("output");
        let kernel = device.kernel("brightness").expect("kernel");
        let target = device.create_target(8, 8).expect("target");
        let mut frame = device.begin_frame("present").expect("frame");
        device
            .dispatch(&mut frame, &kernel, &src, &output, KernelArgs::scalar(0.0))
            .expect("dispatch");
        device
            .present(&mut frame, &output, DisplayScale::fit(2.0, 1.0), &target)
            .expect("present");
        device.submit(frame);

        let shown = device.read_target(&target).expect("target readback");
        // Quad covers the middle half of the rows.
        assert_eq!(shown.get_pixel(4, 0).0, [0, 0, 0, 255]);
        assert_eq!(shown.get_pixel(4, 7).0, [0, 0, 0, 255]);
        assert_eq!(shown.get_pixel(0, 3).0, [200, 100, 50, 255]);
        assert_eq!(shown.get_pixel(7, 4).0, [200, 100, 50, 255]);
        assert_eq!(device.stats().presents, 1);
        assert_eq!(device.stats().dispatches, 1);
    }
}
