/// Pixel layouts the filter kernels can read and write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm => 4,
        }
    }

    /// Storage format name as spelled in WGSL `texture_storage_2d<...>`.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            PixelFormat::Rgba8Unorm => "rgba8unorm",
        }
    }

    pub fn wgpu(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Rounds a normalized channel value to what the format can hold.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            PixelFormat::Rgba8Unorm => (value.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
/// How a texture may be accessed by kernels, the presenter, and transfers.
pub struct TextureUsage(u8);

impl TextureUsage {
    pub const COMPUTE_READ: Self = Self(1 << 0);
    pub const COMPUTE_WRITE: Self = Self(1 << 1);
    pub const SAMPLED: Self = Self(1 << 2);
    pub const COPY_SRC: Self = Self(1 << 3);
    pub const COPY_DST: Self = Self(1 << 4);

    /// Usage for source images: uploaded once, read by the first stage.
    pub const SOURCE: Self =
        Self(Self::COMPUTE_READ.0 | Self::SAMPLED.0 | Self::COPY_DST.0 | Self::COPY_SRC.0);

    /// Usage for pipeline intermediates and the presented output.
    pub const INTERMEDIATE: Self = Self(
        Self::COMPUTE_READ.0 | Self::COMPUTE_WRITE.0 | Self::SAMPLED.0 | Self::COPY_SRC.0,
    );

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn wgpu(self) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::empty();
        if self.contains(Self::COMPUTE_READ) || self.contains(Self::SAMPLED) {
            usages |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.contains(Self::COMPUTE_WRITE) {
            usages |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if self.contains(Self::COPY_SRC) {
            usages |= wgpu::TextureUsages::COPY_SRC;
        }
        if self.contains(Self::COPY_DST) {
            usages |= wgpu::TextureUsages::COPY_DST;
        }
        usages
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Size, format and usage of a 2D texture.
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
        }
    }

    /// Descriptor for an intermediate matching `self` in size and format.
    pub fn intermediate(&self) -> Self {
        Self {
            usage: TextureUsage::INTERMEDIATE,
            ..*self
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Common view over a backend's texture handle.
pub trait Texture: Clone {
    fn desc(&self) -> TextureDesc;

    /// Whether both handles refer to the same allocation.
    fn same_as(&self, other: &Self) -> bool;
}
