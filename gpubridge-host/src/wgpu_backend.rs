//! [`GpuBackend`] on top of wgpu.
//!
//! Every fallible call runs inside a validation + out-of-memory error scope,
//! so a rejected descriptor or a shader that fails to compile comes back as a
//! `BackendError` instead of reaching the device's uncaptured-error handler.
//! Copies and pass boundaries are scoped the same way; commands recorded
//! inside a pass surface their errors when the pass ends.
//! Frames render into an offscreen texture; there is no window surface.
//!
//! Adapter and device requests resolve on the calling thread: the native
//! backends answer them without waiting on an event loop, so the import
//! blocks for the duration of the request and the returned future is
//! already complete. The guest still only hears about it on the next pump.

use std::cell::{Cell, RefCell};
use std::num::NonZeroU64;
use std::sync::Arc;

use futures::future::{self, FutureExt, LocalBoxFuture};
use gpubridge_abi::{
    AddressMode, BlendMode, BufferBindingType, FilterMode, TextureDimension, TextureFormat,
    ViewDimension,
};

use crate::backend::*;
use crate::error::BackendError;

/// Instance-level settings.
#[derive(Debug, Clone)]
pub struct WgpuOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    /// Size of the offscreen frame target.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            frame_width: 1280,
            frame_height: 720,
        }
    }
}

/// A texture plus the device that owns it (views are created in its scope).
pub struct WgpuTexture {
    device: Arc<wgpu::Device>,
    texture: wgpu::Texture,
}

/// A command encoder plus the device it records for.
pub struct WgpuEncoder {
    device: Arc<wgpu::Device>,
    encoder: wgpu::CommandEncoder,
}

/// A compute pass plus the device whose error scopes cover its end.
pub struct WgpuComputePass {
    device: Arc<wgpu::Device>,
    pass: wgpu::ComputePass<'static>,
}

pub struct WgpuRenderPass {
    device: Arc<wgpu::Device>,
    pass: wgpu::RenderPass<'static>,
}

struct FrameTarget {
    device: Arc<wgpu::Device>,
    texture: wgpu::Texture,
}

pub struct WgpuBackend {
    instance: wgpu::Instance,
    options: WgpuOptions,
    frames: RefCell<Vec<FrameTarget>>,
    presented: Cell<u64>,
}

impl WgpuBackend {
    pub const FRAME_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

    pub fn new(options: WgpuOptions) -> Self {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });
        Self {
            instance,
            options,
            frames: RefCell::new(Vec::new()),
            presented: Cell::new(0),
        }
    }

    pub fn adapter_info(&self, adapter: &wgpu::Adapter) -> wgpu::AdapterInfo {
        adapter.get_info()
    }

    /// Frames presented so far, across all devices.
    pub fn frames_presented(&self) -> u64 {
        self.presented.get()
    }

    fn frame_view(&self, device: &Arc<wgpu::Device>) -> BackendResult<wgpu::TextureView> {
        let mut frames = self.frames.borrow_mut();
        if let Some(frame) = frames.iter().find(|f| Arc::ptr_eq(&f.device, device)) {
            return Ok(frame.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        }
        let texture = scoped(device, || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("gpubridge frame target"),
                size: wgpu::Extent3d {
                    width: self.options.frame_width,
                    height: self.options.frame_height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(Self::FRAME_FORMAT),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        log::debug!(
            "frame target created ({}x{})",
            self.options.frame_width,
            self.options.frame_height
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        frames.push(FrameTarget {
            device: device.clone(),
            texture,
        });
        Ok(view)
    }
}

/// Run `op` inside validation and out-of-memory error scopes.
fn scoped<T>(device: &wgpu::Device, op: impl FnOnce() -> T) -> BackendResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = op();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(err) => Err(BackendError::native(err.to_string())),
        None => Ok(value),
    }
}

// ============================================================
// Wire codes to wgpu types
// ============================================================

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
    }
}

fn texture_dimension(dimension: TextureDimension) -> wgpu::TextureDimension {
    match dimension {
        TextureDimension::D1 => wgpu::TextureDimension::D1,
        TextureDimension::D2 => wgpu::TextureDimension::D2,
        TextureDimension::D3 => wgpu::TextureDimension::D3,
    }
}

fn view_dimension(dimension: ViewDimension) -> wgpu::TextureViewDimension {
    match dimension {
        ViewDimension::D1 => wgpu::TextureViewDimension::D1,
        ViewDimension::D2 => wgpu::TextureViewDimension::D2,
        ViewDimension::D2Array => wgpu::TextureViewDimension::D2Array,
        ViewDimension::Cube => wgpu::TextureViewDimension::Cube,
        ViewDimension::CubeArray => wgpu::TextureViewDimension::CubeArray,
        ViewDimension::D3 => wgpu::TextureViewDimension::D3,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::Replace => wgpu::BlendState::REPLACE,
        BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState {
                color: add,
                alpha: add,
            }
        }
    }
}

fn binding_type(layout: &BindingLayout) -> wgpu::BindingType {
    match *layout {
        BindingLayout::Buffer {
            ty,
            has_dynamic_offset,
            min_binding_size,
        } => wgpu::BindingType::Buffer {
            ty: match ty {
                BufferBindingType::Uniform => wgpu::BufferBindingType::Uniform,
                BufferBindingType::Storage => wgpu::BufferBindingType::Storage { read_only: false },
                BufferBindingType::ReadOnlyStorage => {
                    wgpu::BufferBindingType::Storage { read_only: true }
                }
            },
            has_dynamic_offset,
            min_binding_size: min_binding_size.and_then(NonZeroU64::new),
        },
        BindingLayout::Texture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingLayout::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    }
}

// ============================================================
// GpuBackend
// ============================================================

impl GpuBackend for WgpuBackend {
    type Adapter = wgpu::Adapter;
    type Device = Arc<wgpu::Device>;
    type Queue = Arc<wgpu::Queue>;
    type Buffer = wgpu::Buffer;
    type ShaderModule = wgpu::ShaderModule;
    type Texture = WgpuTexture;
    type TextureView = wgpu::TextureView;
    type Sampler = wgpu::Sampler;
    type BindGroupLayout = wgpu::BindGroupLayout;
    type BindGroup = wgpu::BindGroup;
    type PipelineLayout = wgpu::PipelineLayout;
    type ComputePipeline = wgpu::ComputePipeline;
    type RenderPipeline = wgpu::RenderPipeline;
    type CommandEncoder = WgpuEncoder;
    type ComputePass = WgpuComputePass;
    type RenderPass = WgpuRenderPass;
    type CommandBuffer = wgpu::CommandBuffer;

    /// Blocks until the native request resolves; the callback still waits
    /// for the next pump.
    fn request_adapter(&self) -> LocalBoxFuture<'static, BackendResult<wgpu::Adapter>> {
        let adapter = pollster::block_on(self.instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: self.options.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| BackendError::Unsupported("a WebGPU adapter".into()));
        future::ready(adapter).boxed_local()
    }

    /// Blocks like `request_adapter`.
    fn request_device(
        &self,
        adapter: &wgpu::Adapter,
    ) -> LocalBoxFuture<'static, BackendResult<(Arc<wgpu::Device>, Arc<wgpu::Queue>)>> {
        let result = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("gpubridge device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map(|(device, queue)| {
            device.on_uncaptured_error(Box::new(|err| {
                log::error!("uncaptured wgpu error: {err}");
            }));
            (Arc::new(device), Arc::new(queue))
        })
        .map_err(|e| BackendError::native(format!("failed to create device: {e}")));
        future::ready(result).boxed_local()
    }

    fn adapter_name(&self, adapter: &wgpu::Adapter) -> String {
        let info = adapter.get_info();
        format!("{} ({:?})", info.name, info.backend)
    }

    fn preferred_format(&self) -> TextureFormat {
        Self::FRAME_FORMAT
    }

    // ── Resources ──

    fn create_buffer(&self, device: &Arc<wgpu::Device>, desc: &BufferDescriptor) -> BackendResult<wgpu::Buffer> {
        let buffer = scoped(device, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size: desc.size,
                usage: wgpu::BufferUsages::from_bits_truncate(desc.usage),
                mapped_at_creation: desc.mapped_at_creation,
            })
        })?;
        // no map entry points: hand the buffer back unmapped (zero-filled)
        if desc.mapped_at_creation {
            buffer.unmap();
        }
        Ok(buffer)
    }

    fn write_buffer(
        &self,
        device: &Arc<wgpu::Device>,
        queue: &Arc<wgpu::Queue>,
        buffer: &wgpu::Buffer,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()> {
        scoped(device, || queue.write_buffer(buffer, offset, data))
    }

    fn destroy_buffer(&self, buffer: &wgpu::Buffer) {
        buffer.destroy();
    }

    fn create_shader_module(&self, device: &Arc<wgpu::Device>, source: &str) -> BackendResult<wgpu::ShaderModule> {
        scoped(device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: None,
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
    }

    fn create_texture(&self, device: &Arc<wgpu::Device>, desc: &TextureDescriptor) -> BackendResult<WgpuTexture> {
        let texture = scoped(device, || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: None,
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: desc.depth_or_array_layers,
                },
                mip_level_count: desc.mip_level_count,
                sample_count: desc.sample_count,
                dimension: texture_dimension(desc.dimension),
                format: texture_format(desc.format),
                usage: wgpu::TextureUsages::from_bits_truncate(desc.usage),
                view_formats: &[],
            })
        })?;
        Ok(WgpuTexture {
            device: device.clone(),
            texture,
        })
    }

    fn create_texture_view(&self, texture: &WgpuTexture, desc: &TextureViewDescriptor) -> BackendResult<wgpu::TextureView> {
        scoped(&texture.device, || {
            texture.texture.create_view(&wgpu::TextureViewDescriptor {
                format: desc.format.map(texture_format),
                dimension: desc.dimension.map(view_dimension),
                base_mip_level: desc.base_mip_level,
                mip_level_count: desc.mip_level_count,
                base_array_layer: desc.base_array_layer,
                array_layer_count: desc.array_layer_count,
                ..Default::default()
            })
        })
    }

    fn create_sampler(&self, device: &Arc<wgpu::Device>, desc: &SamplerDescriptor) -> BackendResult<wgpu::Sampler> {
        let address = address_mode(desc.address_mode);
        scoped(device, || {
            device.create_sampler(&wgpu::SamplerDescriptor {
                address_mode_u: address,
                address_mode_v: address,
                address_mode_w: address,
                mag_filter: filter_mode(desc.mag_filter),
                min_filter: filter_mode(desc.min_filter),
                mipmap_filter: filter_mode(desc.mipmap_filter),
                ..Default::default()
            })
        })
    }

    fn create_texture_with_data(
        &self,
        device: &Arc<wgpu::Device>,
        queue: &Arc<wgpu::Queue>,
        image: &DecodedImage,
    ) -> BackendResult<WgpuTexture> {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = scoped(device, || {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("gpubridge loaded texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &image.rgba,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * image.width),
                    rows_per_image: Some(image.height),
                },
                size,
            );
            texture
        })?;
        Ok(WgpuTexture {
            device: device.clone(),
            texture,
        })
    }

    // ── Binding and pipelines ──

    fn create_bind_group_layout(
        &self,
        device: &Arc<wgpu::Device>,
        entries: &[LayoutEntry],
    ) -> BackendResult<wgpu::BindGroupLayout> {
        let entries: Vec<_> = entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: wgpu::ShaderStages::from_bits_truncate(entry.visibility),
                ty: binding_type(&entry.layout),
                count: None,
            })
            .collect();
        scoped(device, || {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &entries,
            })
        })
    }

    fn create_bind_group(
        &self,
        device: &Arc<wgpu::Device>,
        layout: &wgpu::BindGroupLayout,
        entries: &[BindGroupEntry<'_, Self>],
    ) -> BackendResult<wgpu::BindGroup> {
        let entries: Vec<_> = entries
            .iter()
            .map(|entry| wgpu::BindGroupEntry {
                binding: entry.binding,
                resource: match entry.resource {
                    BoundResource::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset,
                        size: size.and_then(NonZeroU64::new),
                    }),
                    BoundResource::TextureView(view) => wgpu::BindingResource::TextureView(view),
                    BoundResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        scoped(device, || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout,
                entries: &entries,
            })
        })
    }

    fn create_pipeline_layout(
        &self,
        device: &Arc<wgpu::Device>,
        layouts: &[&wgpu::BindGroupLayout],
    ) -> BackendResult<wgpu::PipelineLayout> {
        scoped(device, || {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: layouts,
                push_constant_ranges: &[],
            })
        })
    }

    fn create_compute_pipeline(
        &self,
        device: &Arc<wgpu::Device>,
        layout: &wgpu::PipelineLayout,
        module: &wgpu::ShaderModule,
        entry_point: &str,
    ) -> BackendResult<wgpu::ComputePipeline> {
        scoped(device, || {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: None,
                layout: Some(layout),
                module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        })
    }

    fn create_render_pipeline(
        &self,
        device: &Arc<wgpu::Device>,
        desc: &RenderPipelineDescriptor<'_, Self>,
    ) -> BackendResult<wgpu::RenderPipeline> {
        let targets = [Some(wgpu::ColorTargetState {
            format: texture_format(desc.target_format),
            blend: Some(blend_state(desc.blend)),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        scoped(device, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: None,
                layout: Some(desc.layout),
                vertex: wgpu::VertexState {
                    module: desc.module,
                    entry_point: Some(desc.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: desc.module,
                    entry_point: Some(desc.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                multiview: None,
                cache: None,
            })
        })
    }

    // ── Encoding and submission ──

    fn create_command_encoder(&self, device: &Arc<wgpu::Device>) -> BackendResult<WgpuEncoder> {
        let encoder = scoped(device, || {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None })
        })?;
        Ok(WgpuEncoder {
            device: device.clone(),
            encoder,
        })
    }

    fn copy_buffer_to_buffer(
        &self,
        encoder: &mut WgpuEncoder,
        src: &wgpu::Buffer,
        src_offset: u64,
        dst: &wgpu::Buffer,
        dst_offset: u64,
        size: u64,
    ) -> BackendResult<()> {
        let WgpuEncoder { device, encoder } = encoder;
        scoped(device, || {
            encoder.copy_buffer_to_buffer(src, src_offset, dst, dst_offset, size)
        })
    }

    fn finish_encoder(&self, encoder: WgpuEncoder) -> BackendResult<wgpu::CommandBuffer> {
        let WgpuEncoder { device, encoder } = encoder;
        scoped(&device, || encoder.finish())
    }

    fn submit(
        &self,
        device: &Arc<wgpu::Device>,
        queue: &Arc<wgpu::Queue>,
        command_buffers: Vec<wgpu::CommandBuffer>,
    ) -> BackendResult<()> {
        scoped(device, || {
            queue.submit(command_buffers);
        })
    }

    // ── Compute passes ──

    fn begin_compute_pass(&self, encoder: &mut WgpuEncoder) -> BackendResult<WgpuComputePass> {
        let WgpuEncoder { device, encoder } = encoder;
        let pass = scoped(device, || {
            encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: None,
                    timestamp_writes: None,
                })
                .forget_lifetime()
        })?;
        Ok(WgpuComputePass {
            device: device.clone(),
            pass,
        })
    }

    fn set_compute_pipeline(&self, pass: &mut WgpuComputePass, pipeline: &wgpu::ComputePipeline) {
        pass.pass.set_pipeline(pipeline);
    }

    fn set_compute_bind_group(
        &self,
        pass: &mut WgpuComputePass,
        index: u32,
        bind_group: &wgpu::BindGroup,
        dynamic_offsets: &[u32],
    ) {
        pass.pass.set_bind_group(index, bind_group, dynamic_offsets);
    }

    fn dispatch_workgroups(&self, pass: &mut WgpuComputePass, x: u32, y: u32, z: u32) {
        pass.pass.dispatch_workgroups(x, y, z);
    }

    fn end_compute_pass(&self, pass: WgpuComputePass) -> BackendResult<()> {
        let WgpuComputePass { device, pass } = pass;
        scoped(&device, || drop(pass))
    }

    // ── Render passes ──

    fn begin_render_pass(
        &self,
        encoder: &mut WgpuEncoder,
        target: &wgpu::TextureView,
        clear: [f64; 4],
    ) -> BackendResult<WgpuRenderPass> {
        let [r, g, b, a] = clear;
        let WgpuEncoder { device, encoder } = encoder;
        let pass = scoped(device, || {
            encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: None,
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime()
        })?;
        Ok(WgpuRenderPass {
            device: device.clone(),
            pass,
        })
    }

    fn set_render_pipeline(&self, pass: &mut WgpuRenderPass, pipeline: &wgpu::RenderPipeline) {
        pass.pass.set_pipeline(pipeline);
    }

    fn set_render_bind_group(
        &self,
        pass: &mut WgpuRenderPass,
        index: u32,
        bind_group: &wgpu::BindGroup,
        dynamic_offsets: &[u32],
    ) {
        pass.pass.set_bind_group(index, bind_group, dynamic_offsets);
    }

    fn draw(
        &self,
        pass: &mut WgpuRenderPass,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        pass.pass.draw(
            first_vertex..first_vertex.saturating_add(vertex_count),
            first_instance..first_instance.saturating_add(instance_count),
        );
    }

    fn end_render_pass(&self, pass: WgpuRenderPass) -> BackendResult<()> {
        let WgpuRenderPass { device, pass } = pass;
        scoped(&device, || drop(pass))
    }

    // ── Frame target ──

    fn current_frame_view(&self, device: &Arc<wgpu::Device>) -> BackendResult<wgpu::TextureView> {
        self.frame_view(device)
    }

    fn present(&self, device: &Arc<wgpu::Device>) {
        let _ = device.poll(wgpu::Maintain::Poll);
        let frame = self.presented.get() + 1;
        self.presented.set(frame);
        log::trace!("frame {frame} presented");
    }
}
