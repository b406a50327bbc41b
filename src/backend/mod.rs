//! Device abstraction the filter stages record work against.
//!
//! [`gpu::GpuDevice`] drives wgpu; [`cpu::CpuDevice`] executes the same kernels
//! on the CPU and is what the pipeline tests run on.

pub mod cpu;
pub mod gpu;
mod shaders;

use image::RgbaImage;

use crate::{
    error::{FrameError, PipelineError},
    present::DisplayScale,
    texture::{Texture, TextureDesc},
};

/// Kernel names every backend's library must provide.
pub const KERNEL_NAMES: [&str; 5] = [
    "brightness",
    "contrast",
    "saturation",
    "gaussianBlurHorizontal",
    "gaussianBlurVertical",
];

/// Thread layout figures reported by a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Preferred number of threads executing in lockstep.
    pub preferred_width: u32,
    /// Largest number of threads in one work-group.
    pub max_threads_per_group: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            preferred_width: 16,
            max_threads_per_group: 256,
        }
    }
}

impl ExecutionLimits {
    /// Work-group size as `(width, height)`: `w` threads wide, as many rows
    /// as the per-group thread limit allows.
    pub fn workgroup_size(&self) -> (u32, u32) {
        let w = self.preferred_width.clamp(1, self.max_threads_per_group.max(1));
        let h = (self.max_threads_per_group / w).max(1);
        (w, h)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Work-groups launched to cover one output texture.
pub struct DispatchGrid {
    pub group_width: u32,
    pub group_height: u32,
    pub groups_x: u32,
    pub groups_y: u32,
}

impl DispatchGrid {
    /// Smallest grid of `limits`-sized groups covering `width` x `height`.
    /// The grid is rounded up, so kernels must bounds-check.
    pub fn cover(limits: &ExecutionLimits, width: u32, height: u32) -> Self {
        let (group_width, group_height) = limits.workgroup_size();
        Self {
            group_width,
            group_height,
            groups_x: width.div_ceil(group_width),
            groups_y: height.div_ceil(group_height),
        }
    }
}

/// Values bound alongside a kernel's input and output textures.
#[derive(Clone, Copy, Debug, Default)]
pub struct KernelArgs<'a> {
    /// Scalar parameter of a pointwise kernel.
    pub value: f32,
    /// Convolution radius; `weights` holds `radius + 1` entries.
    pub radius: u32,
    pub weights: &'a [f32],
}

impl<'a> KernelArgs<'a> {
    pub fn scalar(value: f32) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn convolution(radius: u32, weights: &'a [f32]) -> Self {
        Self {
            value: 0.0,
            radius,
            weights,
        }
    }
}

/// A compute-capable device plus its kernel library.
///
/// Work is recorded into a `Frame` and only runs on [`Backend::submit`],
/// in recording order.
pub trait Backend {
    type Texture: Texture;
    type Kernel;
    type Frame;
    type Target;

    fn name(&self) -> &'static str;

    fn limits(&self) -> ExecutionLimits;

    /// Resolves a compiled kernel by name. Failure is a configuration error.
    fn kernel(&self, name: &str) -> Result<Self::Kernel, PipelineError>;

    fn kernel_name(&self, kernel: &Self::Kernel) -> &'static str;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture, PipelineError>;

    /// Copies a decoded image into a new source texture.
    fn upload(&self, image: &RgbaImage) -> Result<Self::Texture, PipelineError>;

    /// Blocks until `texture` can be read back to the CPU.
    fn read_texture(&self, texture: &Self::Texture) -> Result<RgbaImage, PipelineError>;

    /// Creates an offscreen presentation target.
    fn create_target(&self, width: u32, height: u32) -> Result<Self::Target, PipelineError>;

    fn read_target(&self, target: &Self::Target) -> Result<RgbaImage, PipelineError>;

    fn begin_frame(&self, label: &'static str) -> Result<Self::Frame, FrameError>;

    /// Records one dispatch of `kernel` covering `output`.
    fn dispatch(
        &self,
        frame: &mut Self::Frame,
        kernel: &Self::Kernel,
        input: &Self::Texture,
        output: &Self::Texture,
        args: KernelArgs<'_>,
    ) -> Result<(), FrameError>;

    /// Records drawing `source` as a `scale`d quad into `target`.
    fn present(
        &self,
        frame: &mut Self::Frame,
        source: &Self::Texture,
        scale: DisplayScale,
        target: &Self::Target,
    ) -> Result<(), FrameError>;

    /// Hands the frame to the device without waiting for completion.
    fn submit(&self, frame: Self::Frame);
}

/// Shared precondition checks for [`Backend::dispatch`].
pub(crate) fn validate_dispatch<T: Texture>(
    kernel: &'static str,
    input: &T,
    output: &T,
) -> Result<(), FrameError> {
    if input.same_as(output) {
        return Err(FrameError::AliasedTextures(kernel));
    }
    let (i, o) = (input.desc(), output.desc());
    if i.width != o.width || i.height != o.height {
        return Err(FrameError::ExtentMismatch {
            kernel,
            input: (i.width, i.height),
            output: (o.width, o.height),
        });
    }
    if !o
        .usage
        .contains(crate::texture::TextureUsage::COMPUTE_WRITE)
    {
        return Err(FrameError::Usage(kernel));
    }
    Ok(())
}
