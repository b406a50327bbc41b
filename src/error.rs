use thiserror::Error;

/// Configuration-time failures. The pipeline cannot run after one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("kernel `{0}` is not in the kernel library")]
    MissingKernel(String),
    #[error("failed to build `{name}`: {message}")]
    KernelBuild { name: String, message: String },
    #[error("texture {width}x{height} is outside the device limit of {limit}")]
    TextureSize { width: u32, height: u32, limit: u32 },
    #[error("texture readback failed: {0}")]
    Readback(String),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Per-frame failures. The affected work is dropped and retried next frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("no command encoder available for this frame")]
    EncoderUnavailable,
    #[error("dispatch `{0}` reads and writes the same texture")]
    AliasedTextures(&'static str),
    #[error("dispatch `{kernel}` input is {input:?} but output is {output:?}")]
    ExtentMismatch {
        kernel: &'static str,
        input: (u32, u32),
        output: (u32, u32),
    },
    #[error("texture is missing usage required by `{0}`")]
    Usage(&'static str),
    #[error("device rejected dispatch `{0}`")]
    Rejected(&'static str),
    #[error("dispatch `{0}` needs radius + 1 weights")]
    MissingWeights(&'static str),
    #[error("could not allocate frame texture: {0}")]
    Allocation(String),
    #[error("render target is not usable: {0}")]
    Target(String),
}
