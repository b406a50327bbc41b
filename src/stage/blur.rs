use crate::{
    backend::{Backend, KernelArgs},
    error::{FrameError, PipelineError},
    params::MAX_BLUR_RADIUS,
    texture::Texture,
};

/// Non-negative half of a normalized, symmetric Gaussian kernel.
///
/// Storage is sized once for [`MAX_BLUR_RADIUS`] and reused; only the first
/// `radius + 1` entries are meaningful.
#[derive(Clone, Debug)]
pub struct WeightTable {
    radius: u32,
    weights: Vec<f32>,
}

impl Default for WeightTable {
    fn default() -> Self {
        let mut weights = Vec::with_capacity(MAX_BLUR_RADIUS as usize + 1);
        weights.push(1.0);
        Self { radius: 0, weights }
    }
}

impl WeightTable {
    pub fn for_radius(radius: u32) -> Self {
        let mut table = Self::default();
        table.recompute(radius);
        table
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Weights for offsets `0..=radius`.
    pub fn active(&self) -> &[f32] {
        &self.weights[..=self.radius as usize]
    }

    /// Rebuilds the table for `radius`. Returns false, without touching the
    /// weights, when the radius is unchanged.
    pub fn recompute(&mut self, radius: u32) -> bool {
        let radius = radius.min(MAX_BLUR_RADIUS);
        if radius == self.radius && self.weights.len() == radius as usize + 1 {
            return false;
        }
        let sigma = (radius as f32 / 3.0).max(0.5);
        let two_sigma_sq = 2.0 * sigma * sigma;

        self.weights.clear();
        self.weights
            .extend((0..=radius).map(|i| (-((i * i) as f32) / two_sigma_sq).exp()));
        let sum = self.symmetric_sum();
        for w in &mut self.weights {
            *w /= sum;
        }
        self.radius = radius;
        true
    }

    /// `w[0] + 2 * (w[1] + .. + w[radius])`: the full kernel's total.
    pub fn symmetric_sum(&self) -> f32 {
        let active = self.active();
        active[0] + 2.0 * active[1..].iter().sum::<f32>()
    }
}

/// Separable Gaussian blur: a horizontal pass into a private scratch texture,
/// then a vertical pass into the output.
pub struct BlurStage<B: Backend> {
    horizontal: B::Kernel,
    vertical: B::Kernel,
    table: WeightTable,
    scratch: Option<B::Texture>,
}

impl<B: Backend> BlurStage<B> {
    pub fn configure(device: &B) -> Result<Self, PipelineError> {
        let horizontal = device.kernel("gaussianBlurHorizontal")?;
        let vertical = device.kernel("gaussianBlurVertical")?;
        tracing::debug!(
            stage = "blur",
            horizontal = device.kernel_name(&horizontal),
            vertical = device.kernel_name(&vertical),
            backend = device.name(),
            "stage configured"
        );
        Ok(Self {
            horizontal,
            vertical,
            table: WeightTable::default(),
            scratch: None,
        })
    }

    /// Takes the radius as a float and truncates it.
    pub fn update_parameter(&mut self, value: f32) {
        // `as` saturates: negatives and NaN become 0.
        let radius = (value as u32).min(MAX_BLUR_RADIUS);
        if self.table.recompute(radius) {
            tracing::debug!(radius, "blur weights recomputed");
        }
    }

    pub fn radius(&self) -> u32 {
        self.table.radius()
    }

    pub fn encode(
        &mut self,
        device: &B,
        frame: &mut B::Frame,
        input: &B::Texture,
        output: &B::Texture,
    ) -> Result<(), FrameError> {
        let wanted = input.desc().intermediate();
        let stale = self.scratch.as_ref().is_none_or(|s| s.desc() != wanted);
        if stale {
            let scratch = device
                .create_texture(&wanted)
                .map_err(|err| FrameError::Allocation(err.to_string()))?;
            tracing::debug!(
                width = wanted.width,
                height = wanted.height,
                "blur scratch allocated"
            );
            self.scratch = Some(scratch);
        }
        let Some(scratch) = self.scratch.as_ref() else {
            return Err(FrameError::Allocation("blur scratch".into()));
        };

        let args = KernelArgs::convolution(self.table.radius(), self.table.active());
        device.dispatch(frame, &self.horizontal, input, scratch, args)?;
        device.dispatch(frame, &self.vertical, scratch, output, args)
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use super::{BlurStage, WeightTable};
    use crate::{
        backend::{Backend, cpu::CpuDevice},
        params::MAX_BLUR_RADIUS,
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

    fn blur(device: &CpuDevice, stage: &mut BlurStage<CpuDevice>, img: &RgbaImage) -> RgbaImage {
        let input = device.upload(img).expect("upload");
        let output = device
            .create_texture(&input.desc().intermediate())
            .expect("output");
        let mut frame = device.begin_frame("blur").expect("frame");
        stage
            .encode(device, &mut frame, &input, &output)
            .expect("encode");
        device.submit(frame);
        device.read_texture(&output).expect("readback")
    }

    #[test]
    fn weights_are_normalized_for_every_radius() {
        let mut table = WeightTable::default();
        for radius in 0..=MAX_BLUR_RADIUS {
            table.recompute(radius);
            assert_eq!(table.active().len(), radius as usize + 1);
            let sum = table.symmetric_sum();
            assert!((sum - 1.0).abs() < 1e-5, "radius {radius} sums to {sum}");
            assert!(table.active().iter().all(|w| *w >= 0.0));
        }
    }

    #[test]
    fn radius_zero_is_a_single_unit_weight() {
        assert_eq!(WeightTable::for_radius(0).active(), &[1.0]);
    }

    #[test]
    fn weights_fall_off_from_center() {
        let table = WeightTable::for_radius(9);
        assert!(table.active().windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn unchanged_radius_skips_recompute() {
        let mut table = WeightTable::for_radius(6);
        let ptr = table.active().as_ptr();
        assert!(!table.recompute(6));
        assert!(table.recompute(7));
        assert!(table.recompute(50));
        // Capacity was reserved up front, so growing never reallocates.
        assert_eq!(table.active().as_ptr(), ptr);
    }

    #[test]
    fn float_radius_is_truncated() {
        let device = CpuDevice::new();
        let mut stage = BlurStage::configure(&device).expect("configure");
        stage.update_parameter(3.9);
        assert_eq!(stage.radius(), 3);
        stage.update_parameter(-2.0);
        assert_eq!(stage.radius(), 0);
        stage.update_parameter(f32::NAN);
        assert_eq!(stage.radius(), 0);
        stage.update_parameter(75.0);
        assert_eq!(stage.radius(), MAX_BLUR_RADIUS);
    }

    #[test]
    fn radius_zero_blur_is_identity() {
        let device = CpuDevice::new();
        let mut stage = BlurStage::configure(&device).expect("configure");
        let img = gradient(23, 11);
        assert_eq!(blur(&device, &mut stage, &img), img);
        assert_eq!(device.stats().dispatches, 2);
    }

    #[test]
    fn flat_image_survives_any_radius() {
        let device = CpuDevice::new();
        let mut stage = BlurStage::configure(&device).expect("configure");
        stage.update_parameter(12.0);
        let img = ImageBuffer::from_pixel(9, 7, Rgba([90, 140, 200, 255]));
        let out = blur(&device, &mut stage, &img);
        for px in out.pixels() {
            for (a, b) in px.0.iter().zip([90, 140, 200, 255]) {
                assert!(a.abs_diff(b) <= 1, "{:?}", px.0);
            }
        }
    }

    #[test]
    fn scratch_follows_input_extent() {
        let device = CpuDevice::new();
        let mut stage = BlurStage::configure(&device).expect("configure");
        stage.update_parameter(2.0);
        blur(&device, &mut stage, &gradient(8, 8));
        let out = blur(&device, &mut stage, &gradient(5, 12));
        assert_eq!(out.dimensions(), (5, 12));
    }

    #[test]
    fn missing_blur_kernel_fails_configure() {
        let device = CpuDevice::new().without_kernel("gaussianBlurVertical");
        assert!(BlurStage::configure(&device).is_err());
    }
}
