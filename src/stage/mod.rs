//! Filter stages: one transform each, recorded into a frame.

pub mod blur;

use crate::{
    backend::{Backend, KernelArgs},
    error::{FrameError, PipelineError},
    params::StageKind,
};

pub use blur::{BlurStage, WeightTable};

/// Brightness, contrast or saturation: one scalar, one dispatch.
pub struct PointwiseStage<B: Backend> {
    kind: StageKind,
    kernel: B::Kernel,
    value: f32,
}

impl<B: Backend> PointwiseStage<B> {
    pub fn configure(device: &B, kind: StageKind) -> Result<Self, PipelineError> {
        let kernel = device.kernel(kind.label())?;
        tracing::debug!(
            stage = kind.label(),
            kernel = device.kernel_name(&kernel),
            backend = device.name(),
            "stage configured"
        );
        Ok(Self {
            kind,
            kernel,
            value: 0.0,
        })
    }

    pub fn update_parameter(&mut self, value: f32) {
        self.value = value;
    }

    pub fn encode(
        &self,
        device: &B,
        frame: &mut B::Frame,
        input: &B::Texture,
        output: &B::Texture,
    ) -> Result<(), FrameError> {
        device.dispatch(frame, &self.kernel, input, output, KernelArgs::scalar(self.value))
    }
}

pub enum Stage<B: Backend> {
    Pointwise(PointwiseStage<B>),
    Blur(BlurStage<B>),
}

impl<B: Backend> Stage<B> {
    /// Resolves the kernels `kind` needs. A missing kernel is fatal.
    pub fn configure(device: &B, kind: StageKind) -> Result<Self, PipelineError> {
        Ok(match kind {
            StageKind::Blur => Stage::Blur(BlurStage::configure(device)?),
            _ => Stage::Pointwise(PointwiseStage::configure(device, kind)?),
        })
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Pointwise(stage) => stage.kind,
            Stage::Blur(_) => StageKind::Blur,
        }
    }

    pub fn update_parameter(&mut self, value: f32) {
        match self {
            Stage::Pointwise(stage) => stage.update_parameter(value),
            Stage::Blur(stage) => stage.update_parameter(value),
        }
    }

    /// Records the work turning `input` into `output`. `input` is never
    /// written.
    pub fn encode(
        &mut self,
        device: &B,
        frame: &mut B::Frame,
        input: &B::Texture,
        output: &B::Texture,
    ) -> Result<(), FrameError> {
        match self {
            Stage::Pointwise(stage) => stage.encode(device, frame, input, output),
            Stage::Blur(stage) => stage.encode(device, frame, input, output),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba};

    use super::Stage;
    use crate::{
        backend::{Backend, cpu::CpuDevice},
        params::StageKind,
        texture::Texture,
    };

    #[test]
    fn each_kind_configures_its_own_variant() {
        let device = CpuDevice::new();
        for kind in StageKind::ORDER {
            let stage = Stage::configure(&device, kind).expect("configure");
            assert_eq!(stage.kind(), kind);
            match &stage {
                Stage::Pointwise(p) => assert_eq!(device.kernel_name(&p.kernel), kind.label()),
                Stage::Blur(_) => assert_eq!(kind, StageKind::Blur),
            }
        }
    }

    #[test]
    fn missing_kernel_is_reported_by_name() {
        let device = CpuDevice::new().without_kernel("saturation");
        let err = Stage::configure(&device, StageKind::Saturation)
            .err()
            .expect("saturation kernel was removed");
        assert!(err.to_string().contains("saturation"));
    }

    #[test]
    fn blur_parameter_reads_back_truncated() {
        let device = CpuDevice::new();
        let mut stage = Stage::configure(&device, StageKind::Blur).expect("configure");
        stage.update_parameter(4.6);
        let Stage::Blur(blur) = &stage else {
            panic!("blur kind should build a blur stage");
        };
        assert_eq!(blur.radius(), 4);
    }

    #[test]
    fn contrast_stage_leaves_input_untouched() {
        let device = CpuDevice::new();
        let img = ImageBuffer::from_pixel(6, 4, Rgba([40, 80, 200, 255]));
        let input = device.upload(&img).expect("upload");
        let output = device
            .create_texture(&input.desc().intermediate())
            .expect("output");
        let mut stage = Stage::configure(&device, StageKind::Contrast).expect("configure");
        stage.update_parameter(0.5);

        let mut frame = device.begin_frame("contrast").expect("frame");
        stage
            .encode(&device, &mut frame, &input, &output)
            .expect("encode");
        device.submit(frame);

        assert_eq!(device.read_texture(&input).expect("input"), img);
        let out = device.read_texture(&output).expect("output");
        // (200/255 - 0.5) * 1.5 + 0.5 = 0.9265 -> 236
        assert_eq!(out.get_pixel(0, 0)[2], 236);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
    }
}
