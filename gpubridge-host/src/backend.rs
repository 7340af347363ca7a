//! The native side of the call surface.
//!
//! [`GpuBackend`] is the seam between handle marshalling and the real graphics
//! API. The host only ever sees the associated types through its registries;
//! `WgpuBackend` implements it on top of wgpu, tests implement it with a
//! recording mock.

use futures::future::LocalBoxFuture;
use gpubridge_abi::{
    AddressMode, BlendMode, BufferBindingType, FilterMode, TextureDimension, TextureFormat,
    ViewDimension,
};

use crate::error::BackendError;

pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================
// Decoded descriptors
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub size: u64,
    pub usage: u32,
    pub mapped_at_creation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: u32,
}

/// `None` fields are left for the native API to derive from the texture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureViewDescriptor {
    pub format: Option<TextureFormat>,
    pub dimension: Option<ViewDimension>,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub address_mode: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            address_mode: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLayout {
    Buffer {
        ty: BufferBindingType,
        has_dynamic_offset: bool,
        min_binding_size: Option<u64>,
    },
    /// Filterable float, 2D, single-sampled.
    Texture,
    /// Filtering sampler.
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub binding: u32,
    /// `GPUShaderStage` bits.
    pub visibility: u32,
    pub layout: BindingLayout,
}

/// Tightly packed RGBA8 pixels, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A bind group entry as the guest wrote it, before handle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupResource {
    Buffer {
        handle: u32,
        offset: u64,
        /// `None` binds the rest of the buffer.
        size: Option<u64>,
    },
    TextureView(u32),
    Sampler(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEntry {
    pub binding: u32,
    pub resource: GroupResource,
}

/// A bind group entry with its resource resolved to a native object.
pub enum BoundResource<'a, B: GpuBackend> {
    Buffer {
        buffer: &'a B::Buffer,
        offset: u64,
        size: Option<u64>,
    },
    TextureView(&'a B::TextureView),
    Sampler(&'a B::Sampler),
}

pub struct BindGroupEntry<'a, B: GpuBackend> {
    pub binding: u32,
    pub resource: BoundResource<'a, B>,
}

/// Triangle-list pipeline with one shader module and one colour target.
pub struct RenderPipelineDescriptor<'a, B: GpuBackend> {
    pub layout: &'a B::PipelineLayout,
    pub module: &'a B::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub target_format: TextureFormat,
    pub blend: BlendMode,
}

// ============================================================
// Backend trait
// ============================================================

/// Native GPU operations behind the call surface.
///
/// Creation calls, copies and pass boundaries return `Err` for anything the
/// native API rejects. Commands recorded inside a pass are infallible at this
/// level: the API validates them when the pass ends.
pub trait GpuBackend: Sized + 'static {
    type Adapter;
    type Device;
    type Queue: Clone;
    type Buffer;
    type ShaderModule;
    type Texture;
    type TextureView;
    type Sampler;
    type BindGroupLayout;
    type BindGroup;
    type PipelineLayout;
    type ComputePipeline;
    type RenderPipeline;
    type CommandEncoder;
    type ComputePass;
    type RenderPass;
    type CommandBuffer;

    // ── Acquisition (asynchronous) ──

    /// The returned future may already be complete when this returns. It is
    /// only polled from `Host::take_ready`, so the guest hears about the
    /// result on a later pump either way.
    fn request_adapter(&self) -> LocalBoxFuture<'static, BackendResult<Self::Adapter>>;

    fn request_device(
        &self,
        adapter: &Self::Adapter,
    ) -> LocalBoxFuture<'static, BackendResult<(Self::Device, Self::Queue)>>;

    /// Human-readable adapter description for logs.
    fn adapter_name(&self, adapter: &Self::Adapter) -> String;

    /// Format of the frame target returned by `current_frame_view`.
    fn preferred_format(&self) -> TextureFormat;

    // ── Resources ──

    fn create_buffer(&self, device: &Self::Device, desc: &BufferDescriptor)
        -> BackendResult<Self::Buffer>;

    fn write_buffer(
        &self,
        device: &Self::Device,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()>;

    fn destroy_buffer(&self, buffer: &Self::Buffer);

    fn create_shader_module(&self, device: &Self::Device, source: &str)
        -> BackendResult<Self::ShaderModule>;

    fn create_texture(&self, device: &Self::Device, desc: &TextureDescriptor)
        -> BackendResult<Self::Texture>;

    fn create_texture_view(
        &self,
        texture: &Self::Texture,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<Self::TextureView>;

    fn create_sampler(&self, device: &Self::Device, desc: &SamplerDescriptor)
        -> BackendResult<Self::Sampler>;

    /// Create a 2D rgba8unorm texture (texture binding + copy destination)
    /// and upload `image` into it.
    fn create_texture_with_data(
        &self,
        device: &Self::Device,
        queue: &Self::Queue,
        image: &DecodedImage,
    ) -> BackendResult<Self::Texture>;

    // ── Binding and pipelines ──

    fn create_bind_group_layout(
        &self,
        device: &Self::Device,
        entries: &[LayoutEntry],
    ) -> BackendResult<Self::BindGroupLayout>;

    fn create_bind_group(
        &self,
        device: &Self::Device,
        layout: &Self::BindGroupLayout,
        entries: &[BindGroupEntry<'_, Self>],
    ) -> BackendResult<Self::BindGroup>;

    fn create_pipeline_layout(
        &self,
        device: &Self::Device,
        layouts: &[&Self::BindGroupLayout],
    ) -> BackendResult<Self::PipelineLayout>;

    fn create_compute_pipeline(
        &self,
        device: &Self::Device,
        layout: &Self::PipelineLayout,
        module: &Self::ShaderModule,
        entry_point: &str,
    ) -> BackendResult<Self::ComputePipeline>;

    fn create_render_pipeline(
        &self,
        device: &Self::Device,
        desc: &RenderPipelineDescriptor<'_, Self>,
    ) -> BackendResult<Self::RenderPipeline>;

    // ── Encoding and submission ──

    fn create_command_encoder(&self, device: &Self::Device) -> BackendResult<Self::CommandEncoder>;

    fn copy_buffer_to_buffer(
        &self,
        encoder: &mut Self::CommandEncoder,
        src: &Self::Buffer,
        src_offset: u64,
        dst: &Self::Buffer,
        dst_offset: u64,
        size: u64,
    ) -> BackendResult<()>;

    fn finish_encoder(&self, encoder: Self::CommandEncoder) -> BackendResult<Self::CommandBuffer>;

    fn submit(
        &self,
        device: &Self::Device,
        queue: &Self::Queue,
        command_buffers: Vec<Self::CommandBuffer>,
    ) -> BackendResult<()>;

    // ── Compute passes ──

    fn begin_compute_pass(&self, encoder: &mut Self::CommandEncoder) -> BackendResult<Self::ComputePass>;

    fn set_compute_pipeline(&self, pass: &mut Self::ComputePass, pipeline: &Self::ComputePipeline);

    fn set_compute_bind_group(
        &self,
        pass: &mut Self::ComputePass,
        index: u32,
        bind_group: &Self::BindGroup,
        dynamic_offsets: &[u32],
    );

    fn dispatch_workgroups(&self, pass: &mut Self::ComputePass, x: u32, y: u32, z: u32);

    fn end_compute_pass(&self, pass: Self::ComputePass) -> BackendResult<()>;

    // ── Render passes ──

    /// Begin a pass that clears `target` to `clear` (r, g, b, a).
    fn begin_render_pass(
        &self,
        encoder: &mut Self::CommandEncoder,
        target: &Self::TextureView,
        clear: [f64; 4],
    ) -> BackendResult<Self::RenderPass>;

    fn set_render_pipeline(&self, pass: &mut Self::RenderPass, pipeline: &Self::RenderPipeline);

    fn set_render_bind_group(
        &self,
        pass: &mut Self::RenderPass,
        index: u32,
        bind_group: &Self::BindGroup,
        dynamic_offsets: &[u32],
    );

    fn draw(
        &self,
        pass: &mut Self::RenderPass,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn end_render_pass(&self, pass: Self::RenderPass) -> BackendResult<()>;

    // ── Frame target ──

    /// View of the texture the current frame renders into.
    fn current_frame_view(&self, device: &Self::Device) -> BackendResult<Self::TextureView>;

    /// Finish the current frame.
    fn present(&self, device: &Self::Device);
}
