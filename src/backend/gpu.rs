use std::sync::{Arc, mpsc};

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::{
    Backend, DispatchGrid, ExecutionLimits, KernelArgs,
    shaders::{self, KernelSource},
    validate_dispatch,
};
use crate::{
    error::{FrameError, PipelineError},
    present::DisplayScale,
    texture::{PixelFormat, Texture, TextureDesc, TextureUsage},
};

const DEFAULT_EXECUTION_WIDTH: u32 = 16;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct KernelUniforms {
    value: f32,
    radius: u32,
    _pad: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PresentUniforms {
    scale: [f32; 2],
    _pad: [f32; 2],
}

#[derive(Clone, Debug)]
/// Settings fixed when the device is configured.
pub struct GpuOptions {
    /// Work-group width; defaults to 16 capped by the device limit.
    pub execution_width: Option<u32>,
    /// Format of the targets the presenter draws into.
    pub present_format: wgpu::TextureFormat,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            execution_width: None,
            present_format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

struct TextureInner {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[derive(Clone)]
/// Reference-counted GPU texture. Clones share the allocation, which stays
/// alive until the last clone and any submitted work using it are gone.
pub struct GpuTexture {
    desc: TextureDesc,
    inner: Arc<TextureInner>,
}

impl Texture for GpuTexture {
    fn desc(&self) -> TextureDesc {
        self.desc
    }

    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

pub struct GpuKernel {
    name: &'static str,
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    convolution: bool,
}

/// A render target: an offscreen texture or a view onto a surface texture.
pub struct GpuTarget {
    texture: Option<wgpu::Texture>,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl GpuTarget {
    /// Wraps a view the caller owns, such as the current swapchain image.
    pub fn from_view(
        view: wgpu::TextureView,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            texture: None,
            view,
            format,
            width,
            height,
        }
    }
}

/// Command encoder for one frame plus everything it must keep alive until
/// submission.
pub struct GpuFrame {
    encoder: wgpu::CommandEncoder,
    retained_textures: Vec<GpuTexture>,
    retained_buffers: Vec<wgpu::Buffer>,
}

struct Presenter {
    pipeline: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
}

/// wgpu-backed device with the compute kernel library and the presenter.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: ExecutionLimits,
    max_texture_dimension: u32,
    presenter: Presenter,
    adapter_name: String,
    adapter_backend: String,
}

impl GpuDevice {
    /// Opens the default high-performance adapter.
    pub fn new(options: GpuOptions) -> Result<Self, PipelineError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(PipelineError::NoAdapter)?;
        let info = adapter.get_info();
        let options = GpuOptions {
            execution_width: Some(preferred_execution_width(
                options.execution_width,
                adapter.limits().min_subgroup_size,
            )),
            ..options
        };
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("photofilter_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;
        let mut gpu = Self::from_parts(device, queue, options)?;
        gpu.adapter_name = info.name;
        gpu.adapter_backend = info.backend.to_string();
        Ok(gpu)
    }

    /// Builds on a device the host application already owns.
    pub fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        options: GpuOptions,
    ) -> Result<Self, PipelineError> {
        let device_limits = device.limits();
        let preferred_width = options
            .execution_width
            .unwrap_or(DEFAULT_EXECUTION_WIDTH)
            .clamp(1, device_limits.max_compute_workgroup_size_x);
        let max_threads_per_group = device_limits
            .max_compute_invocations_per_workgroup
            .min(preferred_width * device_limits.max_compute_workgroup_size_y);
        let limits = ExecutionLimits {
            preferred_width,
            max_threads_per_group,
        };

        let presenter = with_validation(&device, "present", || {
            create_presenter(&device, options.present_format)
        })?;
        tracing::info!(
            workgroup = ?limits.workgroup_size(),
            present_format = ?options.present_format,
            "gpu device configured"
        );

        Ok(Self {
            max_texture_dimension: device_limits.max_texture_dimension_2d,
            device,
            queue,
            limits,
            presenter,
            adapter_name: "unknown".to_string(),
            adapter_backend: "unknown".to_string(),
        })
    }

    /// Adapter name and graphics API, for diagnostics.
    pub fn adapter_summary(&self) -> String {
        format!("{} ({})", self.adapter_name, self.adapter_backend)
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        let limit = self.max_texture_dimension;
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(PipelineError::TextureSize {
                width,
                height,
                limit,
            });
        }
        Ok(())
    }

    fn readback(
        &self,
        texture: &wgpu::Texture,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, PipelineError> {
        let swap_red_blue = match format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            other => {
                return Err(PipelineError::Readback(format!(
                    "unsupported readback format {other:?}"
                )));
            }
        };
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let unpadded_bytes_per_row = width.saturating_mul(4);
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("photofilter_readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("photofilter_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent,
        );
        self.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::wait());
        rx.recv()
            .map_err(|err| PipelineError::Readback(err.to_string()))?
            .map_err(|err| PipelineError::Readback(err.to_string()))?;

        let mapped = slice.get_mapped_range();
        let unpadded = unpadded_bytes_per_row as usize;
        let padded = padded_bytes_per_row as usize;
        let mut out = vec![0_u8; unpadded * height as usize];
        for row in 0..height as usize {
            out[row * unpadded..(row + 1) * unpadded]
                .copy_from_slice(&mapped[row * padded..row * padded + unpadded]);
        }
        drop(mapped);
        readback.unmap();

        if swap_red_blue {
            for px in out.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        RgbaImage::from_raw(width, height, out)
            .ok_or_else(|| PipelineError::Readback("buffer size does not match extent".into()))
    }
}

impl Backend for GpuDevice {
    type Texture = GpuTexture;
    type Kernel = GpuKernel;
    type Frame = GpuFrame;
    type Target = GpuTarget;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    fn kernel(&self, name: &str) -> Result<GpuKernel, PipelineError> {
        let source = shaders::kernel_source(
            name,
            PixelFormat::Rgba8Unorm,
            self.limits.workgroup_size(),
        )
        .ok_or_else(|| PipelineError::MissingKernel(name.to_string()))?;
        with_validation(&self.device, source.name, || {
            create_kernel(&self.device, &source, PixelFormat::Rgba8Unorm)
        })
    }

    fn kernel_name(&self, kernel: &GpuKernel) -> &'static str {
        kernel.name
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<GpuTexture, PipelineError> {
        self.check_size(desc.width, desc.height)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("photofilter_texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.wgpu(),
            usage: desc.usage.wgpu(),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture {
            desc: *desc,
            inner: Arc::new(TextureInner { texture, view }),
        })
    }

    fn upload(&self, image: &RgbaImage) -> Result<GpuTexture, PipelineError> {
        let desc = TextureDesc::new(
            image.width(),
            image.height(),
            PixelFormat::Rgba8Unorm,
            TextureUsage::SOURCE,
        );
        let texture = self.create_texture(&desc)?;
        self.queue.write_texture(
            texture.inner.texture.as_image_copy(),
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width.saturating_mul(desc.format.bytes_per_pixel())),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(texture)
    }

    fn read_texture(&self, texture: &GpuTexture) -> Result<RgbaImage, PipelineError> {
        if !texture.desc.usage.contains(TextureUsage::COPY_SRC) {
            return Err(PipelineError::Readback("texture lacks COPY_SRC usage".into()));
        }
        self.readback(
            &texture.inner.texture,
            texture.desc.format.wgpu(),
            texture.desc.width,
            texture.desc.height,
        )
    }

    fn create_target(&self, width: u32, height: u32) -> Result<GpuTarget, PipelineError> {
        self.check_size(width, height)?;
        let format = self.presenter.format;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("photofilter_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTarget {
            texture: Some(texture),
            view,
            format,
            width,
            height,
        })
    }

    fn read_target(&self, target: &GpuTarget) -> Result<RgbaImage, PipelineError> {
        let Some(texture) = target.texture.as_ref() else {
            return Err(PipelineError::Readback(
                "target wraps an external view".into(),
            ));
        };
        self.readback(texture, target.format, target.width, target.height)
    }

    fn begin_frame(&self, label: &'static str) -> Result<GpuFrame, FrameError> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        Ok(GpuFrame {
            encoder,
            retained_textures: Vec::new(),
            retained_buffers: Vec::new(),
        })
    }

    fn dispatch(
        &self,
        frame: &mut GpuFrame,
        kernel: &GpuKernel,
        input: &GpuTexture,
        output: &GpuTexture,
        args: KernelArgs<'_>,
    ) -> Result<(), FrameError> {
        validate_dispatch(kernel.name, input, output)?;
        if kernel.convolution && args.weights.len() <= args.radius as usize {
            return Err(FrameError::MissingWeights(kernel.name));
        }
        let desc = output.desc;
        let grid = DispatchGrid::cover(&self.limits, desc.width, desc.height);

        let uniforms = KernelUniforms {
            value: args.value,
            radius: args.radius,
            _pad: [0; 2],
        };
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("photofilter_kernel_params"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&input.inner.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&output.inner.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buffer.as_entire_binding(),
            },
        ];
        let weights_buffer = kernel.convolution.then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("photofilter_blur_weights"),
                    contents: bytemuck::cast_slice(&args.weights[..=args.radius as usize]),
                    usage: wgpu::BufferUsages::STORAGE,
                })
        });
        if let Some(buffer) = weights_buffer.as_ref() {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name),
            layout: &kernel.bgl,
            entries: &entries,
        });
        {
            let mut pass = frame
                .encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(kernel.name),
                    timestamp_writes: None,
                });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(grid.groups_x, grid.groups_y, 1);
        }

        frame.retained_textures.push(input.clone());
        frame.retained_textures.push(output.clone());
        frame.retained_buffers.push(params_buffer);
        frame.retained_buffers.extend(weights_buffer);
        Ok(())
    }

    fn present(
        &self,
        frame: &mut GpuFrame,
        source: &GpuTexture,
        scale: DisplayScale,
        target: &GpuTarget,
    ) -> Result<(), FrameError> {
        if target.format != self.presenter.format {
            return Err(FrameError::Target(format!(
                "target format {:?} does not match presenter format {:?}",
                target.format, self.presenter.format
            )));
        }
        if !source.desc.usage.contains(TextureUsage::SAMPLED) {
            return Err(FrameError::Usage("present"));
        }
        let uniforms = PresentUniforms {
            scale: scale.as_array(),
            _pad: [0.0; 2],
        };
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("photofilter_present_params"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("photofilter_present_bg"),
            layout: &self.presenter.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.inner.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.presenter.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });
        {
            let mut pass = frame
                .encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("photofilter_present_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            pass.set_pipeline(&self.presenter.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..6, 0..1);
        }

        frame.retained_textures.push(source.clone());
        frame.retained_buffers.push(params_buffer);
        Ok(())
    }

    fn submit(&self, frame: GpuFrame) {
        let GpuFrame {
            encoder,
            retained_textures,
            retained_buffers,
        } = frame;
        self.queue.submit([encoder.finish()]);
        // wgpu tracks submitted resources from here on.
        drop(retained_textures);
        drop(retained_buffers);
        let _ = self.device.poll(wgpu::Maintain::Poll);
    }
}

/// Work-group width: the configured value, else the adapter's smallest
/// subgroup size, else 16 when the adapter reports none.
fn preferred_execution_width(configured: Option<u32>, min_subgroup_size: u32) -> u32 {
    match (configured, min_subgroup_size) {
        (Some(width), _) => width,
        (None, 0) => DEFAULT_EXECUTION_WIDTH,
        (None, reported) => reported,
    }
}

/// Runs `build` inside a validation error scope so a rejected shader or
/// pipeline descriptor comes back as an error instead of a panic.
fn with_validation<T>(
    device: &wgpu::Device,
    name: &str,
    build: impl FnOnce() -> T,
) -> Result<T, PipelineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let built = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(PipelineError::KernelBuild {
            name: name.to_string(),
            message: err.to_string(),
        }),
        None => Ok(built),
    }
}

fn kernel_layout_entries(format: PixelFormat, convolution: bool) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: format.wgpu(),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ];
    if convolution {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }
    entries
}

fn create_kernel(device: &wgpu::Device, source: &KernelSource, format: PixelFormat) -> GpuKernel {
    let entries = kernel_layout_entries(format, source.convolution);
    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(source.name),
        entries: &entries,
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(source.name),
        source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(source.name),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(source.name),
        layout: Some(&layout),
        module: &shader,
        entry_point: Some("main"),
        cache: None,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    });
    GpuKernel {
        name: source.name,
        pipeline,
        bgl,
        convolution: source.convolution,
    }
}

fn create_presenter(device: &wgpu::Device, format: wgpu::TextureFormat) -> Presenter {
    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("photofilter_present_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("photofilter_present"),
        source: wgpu::ShaderSource::Wgsl(shaders::PRESENT_SHADER_SRC.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("photofilter_present"),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("photofilter_present"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("photofilter_present_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    Presenter {
        pipeline,
        bgl,
        sampler,
        format,
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use super::{GpuDevice, GpuOptions, preferred_execution_width};
    use crate::{
        backend::{Backend, KernelArgs, cpu::CpuDevice},
        error::PipelineError,
        present::DisplayScale,
        texture::Texture,
    };

    fn gpu() -> Option<GpuDevice> {
        GpuDevice::new(GpuOptions::default()).ok()
    }

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

    fn run<B: Backend>(device: &B, kernel: &str, img: &RgbaImage, args: KernelArgs<'_>) -> RgbaImage {
        let input = device.upload(img).expect("upload");
        let output = device
            .create_texture(&input.desc().intermediate())
            .expect("output");
        let kernel = device.kernel(kernel).expect("kernel");
        let mut frame = device.begin_frame("parity").expect("frame");
        device
            .dispatch(&mut frame, &kernel, &input, &output, args)
            .expect("dispatch");
        device.submit(frame);
        device.read_texture(&output).expect("readback")
    }

    fn assert_rgba_close(cpu: &RgbaImage, gpu: &RgbaImage, tolerance: u8) {
        assert_eq!(cpu.dimensions(), gpu.dimensions());
        for (c, g) in cpu.pixels().zip(gpu.pixels()) {
            for i in 0..4 {
                let d = c[i].abs_diff(g[i]);
                assert!(
                    d <= tolerance,
                    "channel {} differed by {} (cpu={}, gpu={}, tol={})",
                    i,
                    d,
                    c[i],
                    g[i],
                    tolerance
                );
            }
        }
    }

    #[test]
    fn execution_width_prefers_config_then_subgroup_size() {
        assert_eq!(preferred_execution_width(Some(8), 32), 8);
        assert_eq!(preferred_execution_width(None, 32), 32);
        assert_eq!(preferred_execution_width(None, 64), 64);
        assert_eq!(preferred_execution_width(None, 0), 16);
    }

    #[test]
    fn unknown_kernel_is_reported_not_panicked() {
        let Some(device) = gpu() else {
            return;
        };
        assert!(matches!(
            device.kernel("boxBlur"),
            Err(PipelineError::MissingKernel(_))
        ));
    }

    #[test]
    fn upload_readback_round_trips() {
        let Some(device) = gpu() else {
            return;
        };
        // 37 px rows force padded readback.
        let img = gradient(37, 5);
        let tex = device.upload(&img).expect("upload");
        assert_eq!(device.read_texture(&tex).expect("readback"), img);
    }

    #[test]
    fn pointwise_kernels_match_cpu() {
        let Some(device) = gpu() else {
            return;
        };
        let cpu = CpuDevice::new();
        let img = gradient(32, 24);
        for (kernel, value) in [("brightness", 0.2), ("contrast", -0.35), ("saturation", 0.6)] {
            let expected = run(&cpu, kernel, &img, KernelArgs::scalar(value));
            let actual = run(&device, kernel, &img, KernelArgs::scalar(value));
            assert_rgba_close(&expected, &actual, 1);
        }
    }

    #[test]
    fn blur_passes_match_cpu() {
        let Some(device) = gpu() else {
            return;
        };
        let cpu = CpuDevice::new();
        let img = gradient(29, 19);
        let weights = crate::stage::blur::WeightTable::for_radius(4);
        for kernel in ["gaussianBlurHorizontal", "gaussianBlurVertical"] {
            let args = KernelArgs::convolution(4, weights.active());
            let expected = run(&cpu, kernel, &img, args);
            let actual = run(&device, kernel, &img, args);
            assert_rgba_close(&expected, &actual, 1);
        }
    }

    #[test]
    fn present_matches_cpu_letterbox() {
        let Some(device) = gpu() else {
            return;
        };
        let cpu = CpuDevice::new();
        let img = ImageBuffer::from_pixel(8, 4, Rgba([180, 90, 30, 255]));
        let scale = DisplayScale::fit(2.0, 1.0);

        let gpu_out = {
            let src = device.upload(&img).expect("upload");
            let out = device
                .create_texture(&src.desc().intermediate())
                .expect("out");
            let kernel = device.kernel("brightness").expect("kernel");
            let target = device.create_target(16, 16).expect("target");
            let mut frame = device.begin_frame("present").expect("frame");
            device
                .dispatch(&mut frame, &kernel, &src, &out, KernelArgs::scalar(0.0))
                .expect("dispatch");
            device
                .present(&mut frame, &out, scale, &target)
                .expect("present");
            device.submit(frame);
            device.read_target(&target).expect("target")
        };
        let cpu_out = {
            let src = cpu.upload(&img).expect("upload");
            let out = cpu.create_texture(&src.desc().intermediate()).expect("out");
            let kernel = cpu.kernel("brightness").expect("kernel");
            let target = cpu.create_target(16, 16).expect("target");
            let mut frame = cpu.begin_frame("present").expect("frame");
            cpu.dispatch(&mut frame, &kernel, &src, &out, KernelArgs::scalar(0.0))
                .expect("dispatch");
            cpu.present(&mut frame, &out, scale, &target)
                .expect("present");
            cpu.submit(frame);
            cpu.read_target(&target).expect("target")
        };
        assert_rgba_close(&cpu_out, &gpu_out, 1);
    }
}
