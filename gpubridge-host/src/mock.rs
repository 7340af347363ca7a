//! Recording GPU backend and guest used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use futures::future::{self, FutureExt, LocalBoxFuture};
use gpubridge_abi::{BufferBindingType, Handle, RawBindGroupLayoutEntry, RawBufferDescriptor, TextureFormat};

use crate::async_bridge::{CallOutcome, GuestExports, GuestValue};
use crate::audio::AudioBackend;
use crate::backend::*;
use crate::error::{BackendError, GuestCallError};
use crate::host::Host;

/// What a mock pass checks when it ends.
#[derive(Debug, Default)]
pub struct MockPass {
    pipeline_set: bool,
    /// Dispatches or draws recorded so far.
    commands: u32,
}

impl MockPass {
    fn end(&self, kind: &str) -> BackendResult<()> {
        if self.commands > 0 && !self.pipeline_set {
            return Err(BackendError::native(format!(
                "{kind} pass: {} command(s) recorded without a pipeline",
                self.commands
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockGpu {
    calls: RefCell<Vec<String>>,
    next_id: Cell<u32>,
    adapter_error: Option<BackendError>,
}

impl MockGpu {
    pub const MAX_BUFFER_SIZE: u64 = 1 << 28;

    pub fn failing_adapter() -> Self {
        Self {
            adapter_error: Some(BackendError::native("no suitable adapter found")),
            ..Self::default()
        }
    }

    pub fn unsupported() -> Self {
        Self {
            adapter_error: Some(BackendError::Unsupported("WebGPU".into())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    fn id(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

impl GpuBackend for MockGpu {
    type Adapter = String;
    type Device = u32;
    type Queue = u32;
    type Buffer = u64;
    type ShaderModule = u32;
    type Texture = TextureDescriptor;
    type TextureView = u32;
    type Sampler = u32;
    type BindGroupLayout = u32;
    type BindGroup = u32;
    type PipelineLayout = u32;
    type ComputePipeline = u32;
    type RenderPipeline = u32;
    type CommandEncoder = Vec<String>;
    type ComputePass = MockPass;
    type RenderPass = MockPass;
    type CommandBuffer = Vec<String>;

    fn request_adapter(&self) -> LocalBoxFuture<'static, BackendResult<String>> {
        self.record("request_adapter");
        let result = match &self.adapter_error {
            Some(err) => Err(err.clone()),
            None => Ok("mock adapter".to_string()),
        };
        future::ready(result).boxed_local()
    }

    fn request_device(&self, _adapter: &String) -> LocalBoxFuture<'static, BackendResult<(u32, u32)>> {
        self.record("request_device");
        let device = self.id();
        future::ready(Ok((device, device))).boxed_local()
    }

    fn adapter_name(&self, adapter: &String) -> String {
        adapter.clone()
    }

    fn preferred_format(&self) -> TextureFormat {
        TextureFormat::Bgra8Unorm
    }

    fn create_buffer(&self, _device: &u32, desc: &BufferDescriptor) -> BackendResult<u64> {
        if desc.size > Self::MAX_BUFFER_SIZE {
            return Err(BackendError::native(format!(
                "buffer size {} exceeds the device limit",
                desc.size
            )));
        }
        self.record(format!(
            "create_buffer size={} usage={:#x} mapped={}",
            desc.size, desc.usage, desc.mapped_at_creation
        ));
        Ok(desc.size)
    }

    fn write_buffer(&self, _device: &u32, _queue: &u32, _buffer: &u64, offset: u64, data: &[u8]) -> BackendResult<()> {
        self.record(format!("write_buffer offset={offset} data={data:?}"));
        Ok(())
    }

    fn destroy_buffer(&self, _buffer: &u64) {
        self.record("destroy_buffer");
    }

    fn create_shader_module(&self, _device: &u32, source: &str) -> BackendResult<u32> {
        let depth = |open: char, close: char| {
            source.matches(open).count() as i64 - source.matches(close).count() as i64
        };
        if depth('(', ')') != 0 || depth('{', '}') != 0 {
            return Err(BackendError::native(format!("shader compilation failed: {source}")));
        }
        self.record("create_shader_module");
        Ok(self.id())
    }

    fn create_texture(&self, _device: &u32, desc: &TextureDescriptor) -> BackendResult<TextureDescriptor> {
        self.record(format!("create_texture {}x{}", desc.width, desc.height));
        Ok(*desc)
    }

    fn create_texture_view(&self, _texture: &TextureDescriptor, _desc: &TextureViewDescriptor) -> BackendResult<u32> {
        self.record("create_texture_view");
        Ok(self.id())
    }

    fn create_sampler(&self, _device: &u32, _desc: &SamplerDescriptor) -> BackendResult<u32> {
        self.record("create_sampler");
        Ok(self.id())
    }

    fn create_texture_with_data(&self, _device: &u32, _queue: &u32, image: &DecodedImage) -> BackendResult<TextureDescriptor> {
        if image.rgba.len() as u64 != 4 * u64::from(image.width) * u64::from(image.height) {
            return Err(BackendError::native(format!(
                "{} bytes do not fill a {}x{} rgba8unorm texture",
                image.rgba.len(),
                image.width,
                image.height
            )));
        }
        self.record(format!("create_texture_with_data {}x{}", image.width, image.height));
        Ok(TextureDescriptor {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
            mip_level_count: 1,
            sample_count: 1,
            dimension: gpubridge_abi::TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: gpubridge_abi::texture_usage::TEXTURE_BINDING | gpubridge_abi::texture_usage::COPY_DST,
        })
    }

    fn create_bind_group_layout(&self, _device: &u32, entries: &[LayoutEntry]) -> BackendResult<u32> {
        self.record(format!("create_bind_group_layout {} entries", entries.len()));
        Ok(self.id())
    }

    fn create_bind_group(
        &self,
        _device: &u32,
        _layout: &u32,
        entries: &[BindGroupEntry<'_, Self>],
    ) -> BackendResult<u32> {
        self.record(format!("create_bind_group {} entries", entries.len()));
        Ok(self.id())
    }

    fn create_pipeline_layout(&self, _device: &u32, layouts: &[&u32]) -> BackendResult<u32> {
        self.record(format!("create_pipeline_layout {} layouts", layouts.len()));
        Ok(self.id())
    }

    fn create_compute_pipeline(&self, _device: &u32, _layout: &u32, _module: &u32, entry_point: &str) -> BackendResult<u32> {
        self.record(format!("create_compute_pipeline {entry_point}"));
        Ok(self.id())
    }

    fn create_render_pipeline(&self, _device: &u32, desc: &RenderPipelineDescriptor<'_, Self>) -> BackendResult<u32> {
        self.record(format!(
            "create_render_pipeline {}/{} {:?} {:?}",
            desc.vertex_entry, desc.fragment_entry, desc.target_format, desc.blend
        ));
        Ok(self.id())
    }

    fn create_command_encoder(&self, _device: &u32) -> BackendResult<Vec<String>> {
        self.record("create_command_encoder");
        Ok(Vec::new())
    }

    fn copy_buffer_to_buffer(
        &self,
        encoder: &mut Vec<String>,
        src: &u64,
        src_offset: u64,
        dst: &u64,
        dst_offset: u64,
        size: u64,
    ) -> BackendResult<()> {
        let fits = |offset: u64, len: u64| offset.checked_add(size).is_some_and(|end| end <= len);
        if !fits(src_offset, *src) || !fits(dst_offset, *dst) {
            return Err(BackendError::native(format!(
                "copy of {size} bytes out of range (source {src} bytes at {src_offset}, destination {dst} bytes at {dst_offset})"
            )));
        }
        self.record(format!("copy_buffer_to_buffer {src_offset} -> {dst_offset} ({size} bytes)"));
        encoder.push("copy_buffer_to_buffer".into());
        Ok(())
    }

    fn finish_encoder(&self, encoder: Vec<String>) -> BackendResult<Vec<String>> {
        self.record(format!("finish_encoder [{}]", encoder.join(", ")));
        Ok(encoder)
    }

    fn submit(&self, _device: &u32, _queue: &u32, command_buffers: Vec<Vec<String>>) -> BackendResult<()> {
        self.record(format!("submit {}", command_buffers.len()));
        Ok(())
    }

    fn begin_compute_pass(&self, encoder: &mut Vec<String>) -> BackendResult<MockPass> {
        self.record("begin_compute_pass");
        encoder.push("begin_compute_pass".into());
        Ok(MockPass::default())
    }

    fn set_compute_pipeline(&self, pass: &mut MockPass, _pipeline: &u32) {
        self.record("set_compute_pipeline");
        pass.pipeline_set = true;
    }

    fn set_compute_bind_group(&self, _pass: &mut MockPass, index: u32, _bind_group: &u32, dynamic_offsets: &[u32]) {
        self.record(format!("set_compute_bind_group {index} {dynamic_offsets:?}"));
    }

    fn dispatch_workgroups(&self, pass: &mut MockPass, x: u32, y: u32, z: u32) {
        self.record(format!("dispatch_workgroups {x} {y} {z}"));
        pass.commands += 1;
    }

    fn end_compute_pass(&self, pass: MockPass) -> BackendResult<()> {
        pass.end("compute")?;
        self.record("end_compute_pass");
        Ok(())
    }

    fn begin_render_pass(&self, encoder: &mut Vec<String>, _target: &u32, clear: [f64; 4]) -> BackendResult<MockPass> {
        let call = format!("begin_render_pass {clear:?}");
        self.record(call.clone());
        encoder.push(call);
        Ok(MockPass::default())
    }

    fn set_render_pipeline(&self, pass: &mut MockPass, _pipeline: &u32) {
        self.record("set_render_pipeline");
        pass.pipeline_set = true;
    }

    fn set_render_bind_group(&self, _pass: &mut MockPass, index: u32, _bind_group: &u32, dynamic_offsets: &[u32]) {
        self.record(format!("set_render_bind_group {index} {dynamic_offsets:?}"));
    }

    fn draw(&self, pass: &mut MockPass, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.record(format!("draw {vertex_count} {instance_count} {first_vertex} {first_instance}"));
        pass.commands += 1;
    }

    fn end_render_pass(&self, pass: MockPass) -> BackendResult<()> {
        pass.end("render")?;
        self.record("end_render_pass");
        Ok(())
    }

    fn current_frame_view(&self, _device: &u32) -> BackendResult<u32> {
        self.record("current_frame_view");
        Ok(self.id())
    }

    fn present(&self, _device: &u32) {
        self.record("present");
    }
}

/// Guest whose exports record their arguments.
#[derive(Default)]
pub struct RecordingGuest {
    pub calls: Vec<(String, Vec<GuestValue>)>,
    /// Exports this guest does not have.
    pub missing: HashSet<String>,
    /// Export that traps when called.
    pub trap_on: Option<String>,
}

impl RecordingGuest {
    pub fn without(exports: &[&str]) -> Self {
        Self {
            missing: exports.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls_to(&self, export: &str) -> Vec<Vec<GuestValue>> {
        self.calls
            .iter()
            .filter(|(name, _)| name == export)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

impl GuestExports for RecordingGuest {
    fn call(&mut self, export: &str, args: &[GuestValue]) -> Result<CallOutcome, GuestCallError> {
        if self.missing.contains(export) {
            return Ok(CallOutcome::Missing);
        }
        self.calls.push((export.to_string(), args.to_vec()));
        if self.trap_on.as_deref() == Some(export) {
            return Err(GuestCallError {
                export: export.to_string(),
                message: "unreachable executed".into(),
            });
        }
        Ok(CallOutcome::Called)
    }
}

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Acquire an adapter and a device the way a guest would, one pump per step.
pub fn ready_device<A: AudioBackend>(host: &mut Host<MockGpu, A>, guest: &mut RecordingGuest) -> Handle {
    host.request_adapter();
    host.pump_with(guest);
    let adapter = match guest.calls_to("receive_adapter").last().map(|args| args[0]) {
        Some(GuestValue::I32(handle)) => handle,
        other => panic!("no adapter delivered: {other:?}"),
    };
    host.adapter_request_device(adapter);
    host.pump_with(guest);
    match guest.calls_to("receive_device").last().map(|args| args[0]) {
        Some(GuestValue::I32(handle)) if handle != 0 => handle,
        other => panic!("no device delivered: {other:?}"),
    }
}

pub fn buffer_descriptor_memory(size: u64, usage: u32) -> Vec<u8> {
    bytemuck::bytes_of(&RawBufferDescriptor::new(size, usage, false)).to_vec()
}

pub fn layout_entry_memory(ty: BufferBindingType) -> Vec<u8> {
    let entry = RawBindGroupLayoutEntry::buffer(0, gpubridge_abi::shader_stage::COMPUTE, ty);
    bytemuck::bytes_of(&entry).to_vec()
}
