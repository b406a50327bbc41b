//! Interactive image filter chain: brightness, contrast, saturation and a
//! separable Gaussian blur, run as compute kernels and presented as a scaled
//! quad.

pub mod backend;
pub mod config;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod present;
pub mod source;
pub mod stage;
pub mod texture;

pub use backend::{
    Backend,
    cpu::CpuDevice,
    gpu::{GpuDevice, GpuOptions},
};
pub use error::{FrameError, PipelineError};
pub use params::{FilterControls, FilterParams, StageKind};
pub use pipeline::{FilterPipeline, FrameOutcome, SkipReason};
pub use present::DisplayScale;
