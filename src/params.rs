use std::ops::RangeInclusive;
use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

/// Largest blur radius the weight table is sized for.
pub const MAX_BLUR_RADIUS: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// One filter in the chain. Declaration order is execution order.
pub enum StageKind {
    Brightness,
    Contrast,
    Saturation,
    Blur,
}

impl StageKind {
    pub const ORDER: [StageKind; 4] = [
        StageKind::Brightness,
        StageKind::Contrast,
        StageKind::Saturation,
        StageKind::Blur,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StageKind::Brightness => "brightness",
            StageKind::Contrast => "contrast",
            StageKind::Saturation => "saturation",
            StageKind::Blur => "blur",
        }
    }

    /// Accepted range for values coming from the UI.
    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            StageKind::Brightness | StageKind::Contrast => -0.5..=0.5,
            StageKind::Saturation => -1.0..=1.0,
            StageKind::Blur => 0.0..=MAX_BLUR_RADIUS as f32,
        }
    }

    /// Clamps `value` into [`Self::range`]. Non-finite input is rejected.
    pub fn clamp(self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }
        let range = self.range();
        Some(value.clamp(*range.start(), *range.end()))
    }

    fn index(self) -> usize {
        match self {
            StageKind::Brightness => 0,
            StageKind::Contrast => 1,
            StageKind::Saturation => 2,
            StageKind::Blur => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Current value of every filter parameter. All zeros is the identity.
pub struct FilterParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur_radius: f32,
}

impl FilterParams {
    pub fn get(&self, kind: StageKind) -> f32 {
        match kind {
            StageKind::Brightness => self.brightness,
            StageKind::Contrast => self.contrast,
            StageKind::Saturation => self.saturation,
            StageKind::Blur => self.blur_radius,
        }
    }

    pub fn set(&mut self, kind: StageKind, value: f32) {
        match kind {
            StageKind::Brightness => self.brightness = value,
            StageKind::Contrast => self.contrast = value,
            StageKind::Saturation => self.saturation = value,
            StageKind::Blur => self.blur_radius = value,
        }
    }
}

/// Thread-safe parameter inbox for a UI running on another thread.
///
/// Setters clamp and publish immediately; the pipeline drains pending values
/// once per frame, so bursts of updates collapse into one recomputation.
#[derive(Clone, Debug, Default)]
pub struct FilterControls {
    inner: Arc<ControlState>,
}

#[derive(Debug, Default)]
struct ControlState {
    values: [AtomicU32; 4],
    pending: AtomicU8,
    generation: AtomicU64,
}

impl FilterControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new value. Returns false if the value was rejected.
    pub fn set(&self, kind: StageKind, value: f32) -> bool {
        let Some(value) = kind.clamp(value) else {
            return false;
        };
        let idx = kind.index();
        self.inner.values[idx].store(value.to_bits(), Ordering::Relaxed);
        self.inner.pending.fetch_or(1 << idx, Ordering::Release);
        self.inner.generation.fetch_add(1, Ordering::Release);
        true
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Takes every value published since the generation in `seen`.
    pub(crate) fn drain(&self, seen: &mut u64) -> Vec<(StageKind, f32)> {
        let generation = self.generation();
        if generation == *seen {
            return Vec::new();
        }
        *seen = generation;
        let mask = self.inner.pending.swap(0, Ordering::AcqRel);
        StageKind::ORDER
            .into_iter()
            .filter(|kind| mask & (1 << kind.index()) != 0)
            .map(|kind| {
                let bits = self.inner.values[kind.index()].load(Ordering::Relaxed);
                (kind, f32::from_bits(bits))
            })
            .collect()
    }
}
