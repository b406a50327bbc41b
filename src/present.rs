/// Per-axis multiplier applied to the presented unit quad.
///
/// One axis is always 1.0; the other shrinks so the whole image is visible
/// at its own aspect ratio, letterboxed inside the view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayScale {
    pub x: f32,
    pub y: f32,
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

impl DisplayScale {
    pub fn fit(texture_aspect: f32, view_aspect: f32) -> Self {
        let mut scale = Self::default();
        if !(texture_aspect > 0.0 && view_aspect > 0.0) {
            return scale;
        }
        if texture_aspect > view_aspect {
            // wider than the view
            scale.y = view_aspect / texture_aspect;
        } else {
            scale.x = texture_aspect / view_aspect;
        }
        scale
    }

    pub fn as_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

/// Aspect ratio of a `width` x `height` area, or `None` if it is empty.
pub fn aspect_of(width: u32, height: u32) -> Option<f32> {
    if width == 0 || height == 0 {
        return None;
    }
    Some(width as f32 / height as f32)
}
