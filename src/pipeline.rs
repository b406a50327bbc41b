use std::sync::Arc;

use image::RgbaImage;

use crate::{
    backend::Backend,
    error::{FrameError, PipelineError},
    params::{FilterControls, FilterParams, StageKind},
    present::{DisplayScale, aspect_of},
    stage::Stage,
    texture::Texture,
};

/// What a call to [`FilterPipeline::render_frame`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The output texture was drawn; `recomputed` is true if the stage chain
    /// ran this frame.
    Presented { recomputed: bool },
    Skipped(SkipReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoSource,
    NoTarget,
    NoEncoder,
    /// The presenter refused the target. Compute work was still submitted.
    Present(FrameError),
}

/// Owns the filter chain and the textures it runs through.
///
/// Parameter setters only record state; all GPU work happens in
/// [`render_frame`](Self::render_frame), which recomputes the chain when it
/// is stale and presents the cached output otherwise.
pub struct FilterPipeline<B: Backend> {
    device: Arc<B>,
    stages: Vec<Stage<B>>,
    params: FilterParams,
    input: Option<B::Texture>,
    output: Option<B::Texture>,
    scratch: Option<[B::Texture; 2]>,
    dirty: bool,
    texture_aspect: Option<f32>,
    view_aspect: Option<f32>,
    scale: DisplayScale,
    controls: FilterControls,
    seen_generation: u64,
    recomputations: u64,
}

impl<B: Backend> FilterPipeline<B> {
    /// Configures every stage. Fails if any kernel is missing.
    pub fn new(device: Arc<B>) -> Result<Self, PipelineError> {
        let stages = StageKind::ORDER
            .into_iter()
            .map(|kind| Stage::configure(device.as_ref(), kind))
            .collect::<Result<Vec<_>, _>>()?;
        let controls = FilterControls::new();
        let seen_generation = controls.generation();
        tracing::info!(
            backend = device.name(),
            stages = stages.len(),
            "filter pipeline configured"
        );
        Ok(Self {
            device,
            stages,
            params: FilterParams::default(),
            input: None,
            output: None,
            scratch: None,
            dirty: true,
            texture_aspect: None,
            // Square until the first resize, so wide sources letterbox
            // straight away.
            view_aspect: Some(1.0),
            scale: DisplayScale::default(),
            controls,
            seen_generation,
            recomputations: 0,
        })
    }

    /// Clamps `value` into the stage's range and forwards it. Marks the
    /// output stale; nothing runs until the next frame. Returns false if the
    /// value was not finite and got ignored.
    pub fn set_parameter(&mut self, kind: StageKind, value: f32) -> bool {
        let Some(value) = kind.clamp(value) else {
            tracing::warn!(stage = kind.label(), value, "ignoring non-finite parameter");
            return false;
        };
        self.params.set(kind, value);
        if let Some(stage) = self.stages.iter_mut().find(|s| s.kind() == kind) {
            stage.update_parameter(value);
        }
        self.dirty = true;
        true
    }

    pub fn set_brightness(&mut self, value: f32) -> bool {
        self.set_parameter(StageKind::Brightness, value)
    }

    pub fn set_contrast(&mut self, value: f32) -> bool {
        self.set_parameter(StageKind::Contrast, value)
    }

    pub fn set_saturation(&mut self, value: f32) -> bool {
        self.set_parameter(StageKind::Saturation, value)
    }

    pub fn set_blur_radius(&mut self, value: f32) -> bool {
        self.set_parameter(StageKind::Blur, value)
    }

    /// Applies every value in `params`.
    pub fn set_parameters(&mut self, params: &FilterParams) {
        for kind in StageKind::ORDER {
            self.set_parameter(kind, params.get(kind));
        }
    }

    pub fn parameters(&self) -> FilterParams {
        self.params
    }

    /// Handle for publishing parameter changes from another thread. Updates
    /// are picked up at the start of the next frame.
    pub fn controls(&self) -> FilterControls {
        self.controls.clone()
    }

    /// Replaces the source image. Output and scratch textures are rebuilt
    /// when the new source differs in extent or format; `None` releases them.
    pub fn set_source_image(&mut self, texture: Option<B::Texture>) -> Result<(), PipelineError> {
        let Some(texture) = texture else {
            self.input = None;
            self.output = None;
            self.scratch = None;
            self.texture_aspect = None;
            self.dirty = true;
            tracing::debug!("source cleared");
            return Ok(());
        };

        let desc = texture.desc().intermediate();
        let reusable = self.output.as_ref().is_some_and(|o| o.desc() == desc);
        if !reusable {
            // Drop the old set first so a failed allocation leaves no source.
            self.input = None;
            self.output = None;
            self.scratch = None;
            let output = self.device.create_texture(&desc)?;
            let scratch = [
                self.device.create_texture(&desc)?,
                self.device.create_texture(&desc)?,
            ];
            self.output = Some(output);
            self.scratch = Some(scratch);
            tracing::debug!(
                width = desc.width,
                height = desc.height,
                "intermediate textures allocated"
            );
        }

        self.texture_aspect = Some(desc.aspect());
        self.input = Some(texture);
        self.update_scale();
        self.dirty = true;
        Ok(())
    }

    /// Uploads `image` and makes it the source.
    pub fn load_source(&mut self, image: &RgbaImage) -> Result<(), PipelineError> {
        let texture = self.device.upload(image)?;
        self.set_source_image(Some(texture))
    }

    /// Records the size of the area the output is shown in.
    pub fn resize_display(&mut self, width: u32, height: u32) {
        match aspect_of(width, height) {
            Some(aspect) => {
                self.view_aspect = Some(aspect);
                self.update_scale();
            }
            None => tracing::warn!(width, height, "ignoring empty display size"),
        }
    }

    pub fn display_scale(&self) -> DisplayScale {
        self.scale
    }

    /// Texture holding the most recent filtered result.
    pub fn output_texture(&self) -> Option<&B::Texture> {
        self.output.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of times the stage chain has been submitted.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Runs one frame: recompute if stale, then present into `target`.
    pub fn render_frame(&mut self, target: Option<&B::Target>) -> FrameOutcome {
        self.apply_controls();

        let (Some(input), Some(output), Some(scratch)) = (
            self.input.clone(),
            self.output.clone(),
            self.scratch.clone(),
        ) else {
            return FrameOutcome::Skipped(SkipReason::NoSource);
        };
        let Some(target) = target else {
            tracing::debug!("no render target this frame");
            return FrameOutcome::Skipped(SkipReason::NoTarget);
        };

        let Some(mut frame) = self.begin_frame() else {
            return FrameOutcome::Skipped(SkipReason::NoEncoder);
        };

        let mut recomputed = false;
        if self.dirty {
            match self.encode_chain(&mut frame, &input, &output, &scratch) {
                Ok(()) => recomputed = true,
                Err(err) => {
                    // The partial chain never reaches the output; discard it
                    // and show the cached result instead.
                    tracing::warn!(%err, "recompute dropped, retrying next frame");
                    drop(frame);
                    frame = match self.begin_frame() {
                        Some(frame) => frame,
                        None => return FrameOutcome::Skipped(SkipReason::NoEncoder),
                    };
                }
            }
        }

        let presented = self
            .device
            .present(&mut frame, &output, self.scale, target);
        self.device.submit(frame);
        if recomputed {
            self.dirty = false;
            self.recomputations += 1;
            tracing::debug!(recomputations = self.recomputations, "chain recomputed");
        }

        match presented {
            Ok(()) => FrameOutcome::Presented { recomputed },
            Err(err) => {
                tracing::warn!(%err, "present skipped");
                FrameOutcome::Skipped(SkipReason::Present(err))
            }
        }
    }

    fn begin_frame(&self) -> Option<B::Frame> {
        match self.device.begin_frame("photofilter_frame") {
            Ok(frame) => Some(frame),
            Err(err) => {
                tracing::warn!(%err, "frame skipped");
                None
            }
        }
    }

    /// Stage `i` reads the previous stage's texture and writes scratch
    /// `i % 2`; the last stage writes `output`.
    fn encode_chain(
        &mut self,
        frame: &mut B::Frame,
        input: &B::Texture,
        output: &B::Texture,
        scratch: &[B::Texture; 2],
    ) -> Result<(), FrameError> {
        let last = self.stages.len().saturating_sub(1);
        let device = self.device.as_ref();
        let mut source = input;
        for (i, stage) in self.stages.iter_mut().enumerate() {
            let dest = if i == last { output } else { &scratch[i % 2] };
            stage.encode(device, frame, source, dest)?;
            source = dest;
        }
        Ok(())
    }

    fn apply_controls(&mut self) {
        for (kind, value) in self.controls.drain(&mut self.seen_generation) {
            self.set_parameter(kind, value);
        }
    }

    fn update_scale(&mut self) {
        if let (Some(texture), Some(view)) = (self.texture_aspect, self.view_aspect) {
            self.scale = DisplayScale::fit(texture, view);
        }
    }
}
