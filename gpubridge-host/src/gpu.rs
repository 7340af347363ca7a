//! WebGPU entry points.
//!
//! Each public method is one guest import. It resolves every handle it was
//! given before touching the backend, so an invalid handle never produces a
//! native call. Failures come back as the zero sentinel plus an error-channel
//! message of the form `"<entry>: <reason>"`.

use futures::future::{self, FutureExt};
use gpubridge_abi::names::imports;
use gpubridge_abi::{BlendMode, CallbackStatus, Handle, ResourceKind, TextureFormat};

use crate::async_bridge::Completion;
use crate::audio::AudioBackend;
use crate::backend::{
    BindGroupEntry, BoundResource, GpuBackend, GroupEntry, GroupResource, RenderPipelineDescriptor,
};
use crate::decode;
use crate::error::BridgeError;
use crate::host::{
    lookup, lookup_mut, DeviceSlot, EncoderSlot, GpuObjects, Host, Pass, Pipeline, Settled,
};
use crate::memory::MemoryView;

type Result<T> = std::result::Result<T, BridgeError>;

fn compute_pass<G: GpuBackend>(pass: &mut Pass<G>, handle: Handle) -> Result<&mut G::ComputePass> {
    match pass {
        Pass::Compute(pass) => Ok(pass),
        other => Err(BridgeError::WrongPassKind {
            handle,
            expected: "compute",
            actual: other.kind(),
        }),
    }
}

fn render_pass<G: GpuBackend>(pass: &mut Pass<G>, handle: Handle) -> Result<&mut G::RenderPass> {
    match pass {
        Pass::Render(pass) => Ok(pass),
        other => Err(BridgeError::WrongPassKind {
            handle,
            expected: "render",
            actual: other.kind(),
        }),
    }
}

fn bind_entry<G: GpuBackend>(objects: &GpuObjects<G>, entry: GroupEntry) -> Result<BindGroupEntry<'_, G>> {
    let resource = match entry.resource {
        GroupResource::Buffer {
            handle,
            offset,
            size,
        } => BoundResource::Buffer {
            buffer: lookup(&objects.buffers, ResourceKind::Buffer, handle)?,
            offset,
            size,
        },
        GroupResource::TextureView(handle) => {
            BoundResource::TextureView(lookup(&objects.views, ResourceKind::TextureView, handle)?)
        }
        GroupResource::Sampler(handle) => {
            BoundResource::Sampler(lookup(&objects.samplers, ResourceKind::Sampler, handle)?)
        }
    };
    Ok(BindGroupEntry {
        binding: entry.binding,
        resource,
    })
}

impl<G: GpuBackend, A: AudioBackend> Host<G, A> {
    fn device(&self, handle: Handle) -> Result<&DeviceSlot<G>> {
        lookup(&self.objects.devices, ResourceKind::Device, handle)
    }

    // ============================================================
    // Adapter / device acquisition
    // ============================================================

    /// Result arrives through `receive_adapter(handle, status)`.
    pub fn request_adapter(&mut self) {
        let request = self.gpu.request_adapter().map(Settled::Adapter);
        self.tasks.spawn(request);
    }

    /// Result arrives through `receive_device(handle, status)`. An invalid
    /// adapter still gets its one callback, with handle 0.
    pub fn adapter_request_device(&mut self, adapter: Handle) {
        match lookup(&self.objects.adapters, ResourceKind::Adapter, adapter) {
            Ok(adapter) => {
                let request = self.gpu.request_device(adapter).map(Settled::Device);
                self.tasks.spawn(request);
            }
            Err(err) => {
                self.report(imports::ADAPTER_REQUEST_DEVICE, &err);
                self.tasks.spawn(future::ready(Settled::Rejected(Completion::Device {
                    handle: 0,
                    status: CallbackStatus::Failed,
                })));
            }
        }
    }

    pub fn device_get_queue(&mut self, device: Handle) -> Handle {
        let result = self
            .device(device)
            .map(|slot| slot.queue.clone())
            .map(|queue| self.objects.queues.insert(queue));
        self.or_report(imports::DEVICE_GET_QUEUE, result)
    }

    /// Texture format code of the frame target.
    pub fn get_preferred_format(&self) -> u32 {
        self.gpu.preferred_format().code()
    }

    // ============================================================
    // Buffers
    // ============================================================

    pub fn create_buffer(&mut self, memory: MemoryView<'_>, device: Handle, desc_ptr: u32) -> Handle {
        let result = self.try_create_buffer(memory, device, desc_ptr);
        self.or_report(imports::CREATE_BUFFER, result)
    }

    fn try_create_buffer(&mut self, memory: MemoryView<'_>, device: Handle, desc_ptr: u32) -> Result<Handle> {
        let slot = self.device(device)?;
        let desc = decode::buffer_descriptor(&memory, desc_ptr)?;
        let buffer = self.gpu.create_buffer(&slot.device, &desc)?;
        Ok(self.objects.buffers.insert(buffer))
    }

    pub fn buffer_write(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        buffer: Handle,
        offset: u64,
        data_ptr: u32,
        data_len: u32,
    ) {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let target = lookup(&self.objects.buffers, ResourceKind::Buffer, buffer)?;
            let data = memory.bytes(data_ptr, data_len as u64)?;
            self.gpu
                .write_buffer(&slot.device, &slot.queue, target, offset, data)?;
            Ok(())
        })();
        self.or_report(imports::BUFFER_WRITE, result)
    }

    /// Free the buffer's GPU memory and release its handle.
    pub fn buffer_destroy(&mut self, buffer: Handle) {
        let result = self
            .objects
            .buffers
            .take(buffer)
            .ok_or_else(|| BridgeError::invalid_handle(ResourceKind::Buffer, buffer))
            .map(|target| self.gpu.destroy_buffer(&target));
        self.or_report(imports::BUFFER_DESTROY, result)
    }

    /// Copy through a one-off encoder that is submitted immediately.
    pub fn copy_buffer_to_buffer(
        &mut self,
        device: Handle,
        src: Handle,
        src_offset: u64,
        dst: Handle,
        dst_offset: u64,
        size: u64,
    ) {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let source = lookup(&self.objects.buffers, ResourceKind::Buffer, src)?;
            let target = lookup(&self.objects.buffers, ResourceKind::Buffer, dst)?;
            let mut encoder = self.gpu.create_command_encoder(&slot.device)?;
            self.gpu
                .copy_buffer_to_buffer(&mut encoder, source, src_offset, target, dst_offset, size)?;
            let commands = self.gpu.finish_encoder(encoder)?;
            self.gpu.submit(&slot.device, &slot.queue, vec![commands])?;
            Ok(())
        })();
        self.or_report(imports::COPY_BUFFER_TO_BUFFER, result)
    }

    /// Record a copy into an encoder the guest submits later.
    pub fn copy_buffer_to_buffer_in_encoder(
        &mut self,
        encoder: Handle,
        src: Handle,
        src_offset: u64,
        dst: Handle,
        dst_offset: u64,
        size: u64,
    ) {
        let objects = &mut self.objects;
        let result = (|| -> Result<_> {
            let source = lookup(&objects.buffers, ResourceKind::Buffer, src)?;
            let target = lookup(&objects.buffers, ResourceKind::Buffer, dst)?;
            let slot = lookup_mut(&mut objects.encoders, ResourceKind::CommandEncoder, encoder)?;
            self.gpu.copy_buffer_to_buffer(
                &mut slot.encoder,
                source,
                src_offset,
                target,
                dst_offset,
                size,
            )?;
            Ok(())
        })();
        self.or_report(imports::COPY_BUFFER_TO_BUFFER_IN_ENCODER, result)
    }

    // ============================================================
    // Shaders, textures, samplers
    // ============================================================

    pub fn create_shader_module(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        src_ptr: u32,
        src_len: u32,
    ) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let source = memory.read_str(src_ptr, src_len)?;
            let module = self.gpu.create_shader_module(&slot.device, &source)?;
            Ok(self.objects.shaders.insert(module))
        })();
        self.or_report(imports::CREATE_SHADER_MODULE, result)
    }

    pub fn create_texture(&mut self, memory: MemoryView<'_>, device: Handle, desc_ptr: u32) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let desc = decode::texture_descriptor(&memory, desc_ptr)?;
            let texture = self.gpu.create_texture(&slot.device, &desc)?;
            Ok(self.objects.textures.insert(texture))
        })();
        self.or_report(imports::CREATE_TEXTURE, result)
    }

    /// `desc_ptr` 0 creates a default view of the whole texture.
    pub fn texture_create_view(&mut self, memory: MemoryView<'_>, texture: Handle, desc_ptr: u32) -> Handle {
        let result = (|| -> Result<_> {
            let source = lookup(&self.objects.textures, ResourceKind::Texture, texture)?;
            let desc = decode::texture_view_descriptor(&memory, desc_ptr)?;
            let view = self.gpu.create_texture_view(source, &desc)?;
            Ok(self.objects.views.insert(view))
        })();
        self.or_report(imports::TEXTURE_CREATE_VIEW, result)
    }

    /// `desc_ptr` 0 creates a clamping, linearly filtered sampler.
    pub fn create_sampler(&mut self, memory: MemoryView<'_>, device: Handle, desc_ptr: u32) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let desc = decode::sampler_descriptor(&memory, desc_ptr)?;
            let sampler = self.gpu.create_sampler(&slot.device, &desc)?;
            Ok(self.objects.samplers.insert(sampler))
        })();
        self.or_report(imports::CREATE_SAMPLER, result)
    }

    // ============================================================
    // Bind groups and pipelines
    // ============================================================

    pub fn create_bind_group_layout(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        entries_ptr: u32,
        count: u32,
    ) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let entries = decode::bind_group_layout_entries(&memory, entries_ptr, count)?;
            let layout = self.gpu.create_bind_group_layout(&slot.device, &entries)?;
            Ok(self.objects.bind_group_layouts.insert(layout))
        })();
        self.or_report(imports::CREATE_BIND_GROUP_LAYOUT, result)
    }

    pub fn create_bind_group(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        layout: Handle,
        entries_ptr: u32,
        count: u32,
    ) -> Handle {
        let result = (|| -> Result<_> {
            let objects = &self.objects;
            let slot = self.device(device)?;
            let layout = lookup(&objects.bind_group_layouts, ResourceKind::BindGroupLayout, layout)?;
            let entries = decode::bind_group_entries(&memory, entries_ptr, count)?
                .into_iter()
                .map(|entry| bind_entry(objects, entry))
                .collect::<Result<Vec<_>>>()?;
            let group = self.gpu.create_bind_group(&slot.device, layout, &entries)?;
            Ok(group)
        })();
        let result = result.map(|group| self.objects.bind_groups.insert(group));
        self.or_report(imports::CREATE_BIND_GROUP, result)
    }

    pub fn create_pipeline_layout(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        layouts_ptr: u32,
        count: u32,
    ) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let layouts = decode::handle_array(&memory, layouts_ptr, count)?
                .into_iter()
                .map(|h| lookup(&self.objects.bind_group_layouts, ResourceKind::BindGroupLayout, h))
                .collect::<Result<Vec<_>>>()?;
            self.gpu
                .create_pipeline_layout(&slot.device, &layouts)
                .map_err(BridgeError::from)
        })();
        let result = result.map(|layout| self.objects.pipeline_layouts.insert(layout));
        self.or_report(imports::CREATE_PIPELINE_LAYOUT, result)
    }

    pub fn create_compute_pipeline(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        layout: Handle,
        shader: Handle,
        entry_ptr: u32,
        entry_len: u32,
    ) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let layout = lookup(&self.objects.pipeline_layouts, ResourceKind::PipelineLayout, layout)?;
            let module = lookup(&self.objects.shaders, ResourceKind::ShaderModule, shader)?;
            let entry_point = memory.read_str(entry_ptr, entry_len)?;
            self.gpu
                .create_compute_pipeline(&slot.device, layout, module, &entry_point)
                .map_err(BridgeError::from)
        })();
        let result = result.map(|pipeline| self.objects.pipelines.insert(Pipeline::Compute(pipeline)));
        self.or_report(imports::CREATE_COMPUTE_PIPELINE, result)
    }

    /// Triangle-list pipeline drawing into one `target_format` attachment.
    #[allow(clippy::too_many_arguments)]
    pub fn create_render_pipeline(
        &mut self,
        memory: MemoryView<'_>,
        device: Handle,
        layout: Handle,
        shader: Handle,
        (vs_ptr, vs_len): (u32, u32),
        (fs_ptr, fs_len): (u32, u32),
        target_format: u32,
        blend_mode: u32,
    ) -> Handle {
        let result = (|| -> Result<_> {
            let slot = self.device(device)?;
            let layout = lookup(&self.objects.pipeline_layouts, ResourceKind::PipelineLayout, layout)?;
            let module = lookup(&self.objects.shaders, ResourceKind::ShaderModule, shader)?;
            let vertex_entry = memory.read_str(vs_ptr, vs_len)?;
            let fragment_entry = memory.read_str(fs_ptr, fs_len)?;
            let desc = RenderPipelineDescriptor {
                layout,
                module,
                vertex_entry: &vertex_entry,
                fragment_entry: &fragment_entry,
                target_format: decode::code::<TextureFormat>(target_format)?,
                blend: decode::code::<BlendMode>(blend_mode)?,
            };
            self.gpu
                .create_render_pipeline(&slot.device, &desc)
                .map_err(BridgeError::from)
        })();
        let result = result.map(|pipeline| self.objects.pipelines.insert(Pipeline::Render(pipeline)));
        self.or_report(imports::CREATE_RENDER_PIPELINE, result)
    }

    // ============================================================
    // Command encoding and submission
    // ============================================================

    pub fn create_command_encoder(&mut self, device: Handle) -> Handle {
        let result = self
            .device(device)
            .and_then(|slot| Ok(self.gpu.create_command_encoder(&slot.device)?))
            .map(|encoder| self.objects.encoders.insert(EncoderSlot { device, encoder }));
        self.or_report(imports::CREATE_COMMAND_ENCODER, result)
    }

    /// Finish recording. The encoder handle is released either way.
    pub fn command_encoder_finish(&mut self, encoder: Handle) -> Handle {
        let result = self
            .objects
            .encoders
            .take(encoder)
            .ok_or_else(|| BridgeError::invalid_handle(ResourceKind::CommandEncoder, encoder))
            .and_then(|slot| Ok(self.gpu.finish_encoder(slot.encoder)?))
            .map(|commands| self.objects.command_buffers.insert(commands));
        self.or_report(imports::COMMAND_ENCODER_FINISH, result)
    }

    /// Submit one command buffer; its handle is released.
    pub fn queue_submit(&mut self, device: Handle, command_buffer: Handle) {
        let result = (|| -> Result<_> {
            let slot = lookup(&self.objects.devices, ResourceKind::Device, device)?;
            let commands = self
                .objects
                .command_buffers
                .take(command_buffer)
                .ok_or_else(|| BridgeError::invalid_handle(ResourceKind::CommandBuffer, command_buffer))?;
            self.gpu.submit(&slot.device, &slot.queue, vec![commands])?;
            Ok(())
        })();
        self.or_report(imports::QUEUE_SUBMIT, result)
    }

    // ============================================================
    // Compute passes
    // ============================================================

    pub fn begin_compute_pass(&mut self, encoder: Handle) -> Handle {
        let result = lookup_mut(&mut self.objects.encoders, ResourceKind::CommandEncoder, encoder)
            .and_then(|slot| Ok(self.gpu.begin_compute_pass(&mut slot.encoder)?))
            .map(|pass| self.objects.passes.insert(Pass::Compute(pass)));
        self.or_report(imports::BEGIN_COMPUTE_PASS, result)
    }

    pub fn compute_pass_set_pipeline(&mut self, pass: Handle, pipeline: Handle) {
        let objects = &mut self.objects;
        let result = (|| -> Result<_> {
            let pipeline = match lookup(&objects.pipelines, ResourceKind::Pipeline, pipeline)? {
                Pipeline::Compute(p) => p,
                other => {
                    return Err(BridgeError::WrongPipelineKind {
                        handle: pipeline,
                        expected: "compute",
                        actual: other.kind(),
                    })
                }
            };
            let slot = lookup_mut(&mut objects.passes, ResourceKind::Pass, pass)?;
            self.gpu.set_compute_pipeline(compute_pass(slot, pass)?, pipeline);
            Ok(())
        })();
        self.or_report(imports::COMPUTE_PASS_SET_PIPELINE, result)
    }

    pub fn compute_pass_set_bind_group(&mut self, pass: Handle, index: u32, bind_group: Handle) {
        let result = self.set_compute_bind_group(pass, index, bind_group, &[]);
        self.or_report(imports::COMPUTE_PASS_SET_BIND_GROUP, result)
    }

    pub fn compute_pass_set_bind_group_with_offset(
        &mut self,
        pass: Handle,
        index: u32,
        bind_group: Handle,
        dynamic_offset: u32,
    ) {
        let result = self.set_compute_bind_group(pass, index, bind_group, &[dynamic_offset]);
        self.or_report(imports::COMPUTE_PASS_SET_BIND_GROUP_WITH_OFFSET, result)
    }

    fn set_compute_bind_group(
        &mut self,
        pass: Handle,
        index: u32,
        bind_group: Handle,
        offsets: &[u32],
    ) -> Result<()> {
        let objects = &mut self.objects;
        let group = lookup(&objects.bind_groups, ResourceKind::BindGroup, bind_group)?;
        let slot = lookup_mut(&mut objects.passes, ResourceKind::Pass, pass)?;
        self.gpu
            .set_compute_bind_group(compute_pass(slot, pass)?, index, group, offsets);
        Ok(())
    }

    pub fn compute_pass_dispatch(&mut self, pass: Handle, x: u32, y: u32, z: u32) {
        let result = lookup_mut(&mut self.objects.passes, ResourceKind::Pass, pass)
            .and_then(|slot| compute_pass(slot, pass))
            .map(|p| self.gpu.dispatch_workgroups(p, x, y, z));
        self.or_report(imports::COMPUTE_PASS_DISPATCH, result)
    }

    /// End the pass and release its handle. The handle is released even when
    /// the native API rejects what the pass recorded.
    pub fn compute_pass_end(&mut self, pass: Handle) {
        let result = self.take_pass(pass, "compute").and_then(|ended| {
            if let Pass::Compute(p) = ended {
                self.gpu.end_compute_pass(p)?;
            }
            Ok(())
        });
        self.or_report(imports::COMPUTE_PASS_END, result)
    }

    /// Remove a pass of the expected kind; a pass of the other kind stays open.
    fn take_pass(&mut self, pass: Handle, expected: &'static str) -> Result<Pass<G>> {
        let actual = lookup(&self.objects.passes, ResourceKind::Pass, pass)?.kind();
        if actual != expected {
            return Err(BridgeError::WrongPassKind {
                handle: pass,
                expected,
                actual,
            });
        }
        self.objects
            .passes
            .take(pass)
            .ok_or_else(|| BridgeError::invalid_handle(ResourceKind::Pass, pass))
    }

    // ============================================================
    // Render passes and presentation
    // ============================================================

    /// View of the frame target for this turn.
    pub fn get_current_texture_view(&mut self, device: Handle) -> Handle {
        let result = self
            .device(device)
            .and_then(|slot| Ok(self.gpu.current_frame_view(&slot.device)?))
            .map(|view| self.objects.views.insert(view));
        self.or_report(imports::GET_CURRENT_TEXTURE_VIEW, result)
    }

    /// Begin a pass clearing `view` to (r, g, b, a).
    pub fn begin_render_pass(&mut self, encoder: Handle, view: Handle, r: f64, g: f64, b: f64, a: f64) -> Handle {
        let objects = &mut self.objects;
        let result = (|| -> Result<_> {
            let target = lookup(&objects.views, ResourceKind::TextureView, view)?;
            let slot = lookup_mut(&mut objects.encoders, ResourceKind::CommandEncoder, encoder)?;
            Ok(self.gpu.begin_render_pass(&mut slot.encoder, target, [r, g, b, a])?)
        })();
        let result = result.map(|pass| self.objects.passes.insert(Pass::Render(pass)));
        self.or_report(imports::BEGIN_RENDER_PASS, result)
    }

    pub fn render_pass_set_pipeline(&mut self, pass: Handle, pipeline: Handle) {
        let objects = &mut self.objects;
        let result = (|| -> Result<_> {
            let pipeline = match lookup(&objects.pipelines, ResourceKind::Pipeline, pipeline)? {
                Pipeline::Render(p) => p,
                other => {
                    return Err(BridgeError::WrongPipelineKind {
                        handle: pipeline,
                        expected: "render",
                        actual: other.kind(),
                    })
                }
            };
            let slot = lookup_mut(&mut objects.passes, ResourceKind::Pass, pass)?;
            self.gpu.set_render_pipeline(render_pass(slot, pass)?, pipeline);
            Ok(())
        })();
        self.or_report(imports::RENDER_PASS_SET_PIPELINE, result)
    }

    pub fn render_pass_set_bind_group(&mut self, pass: Handle, index: u32, bind_group: Handle) {
        let objects = &mut self.objects;
        let result = (|| -> Result<_> {
            let group = lookup(&objects.bind_groups, ResourceKind::BindGroup, bind_group)?;
            let slot = lookup_mut(&mut objects.passes, ResourceKind::Pass, pass)?;
            self.gpu
                .set_render_bind_group(render_pass(slot, pass)?, index, group, &[]);
            Ok(())
        })();
        self.or_report(imports::RENDER_PASS_SET_BIND_GROUP, result)
    }

    pub fn render_pass_draw(
        &mut self,
        pass: Handle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        let result = lookup_mut(&mut self.objects.passes, ResourceKind::Pass, pass)
            .and_then(|slot| render_pass(slot, pass))
            .map(|p| {
                self.gpu
                    .draw(p, vertex_count, instance_count, first_vertex, first_instance)
            });
        self.or_report(imports::RENDER_PASS_DRAW, result)
    }

    pub fn render_pass_end(&mut self, pass: Handle) {
        let result = self.take_pass(pass, "render").and_then(|ended| {
            if let Pass::Render(p) = ended {
                self.gpu.end_render_pass(p)?;
            }
            Ok(())
        });
        self.or_report(imports::RENDER_PASS_END, result)
    }

    /// Finish and submit every encoder still open on `device`, in handle
    /// order and as one batch, then present the frame target. The encoder
    /// handles are released.
    pub fn present(&mut self, device: Handle) {
        if let Err(err) = self.device(device) {
            self.report(imports::PRESENT, &err);
            return;
        }

        let open = self.objects.encoders.handles_where(|slot| slot.device == device);
        let mut batch = Vec::with_capacity(open.len());
        for handle in open {
            let Some(slot) = self.objects.encoders.take(handle) else {
                continue;
            };
            match self.gpu.finish_encoder(slot.encoder) {
                Ok(commands) => batch.push(commands),
                Err(err) => self.report(imports::PRESENT, &err.into()),
            }
        }

        let result = self.device(device).and_then(|slot| {
            if !batch.is_empty() {
                self.gpu.submit(&slot.device, &slot.queue, batch)?;
            }
            self.gpu.present(&slot.device);
            Ok(())
        });
        self.or_report(imports::PRESENT, result)
    }
}

#[cfg(test)]
mod tests {
    use gpubridge_abi::{
        buffer_usage, texture_usage, BufferBindingType, GroupEntryType, RawBindGroupEntry,
        RawTextureDescriptor,
    };

    use super::*;
    use crate::async_bridge::GuestValue;
    use crate::audio::NullAudio;
    use crate::memory::MemoryViewMut;
    use crate::mock::{
        buffer_descriptor_memory, init_logging, layout_entry_memory, ready_device, MockGpu,
        RecordingGuest,
    };

    type TestHost = Host<MockGpu, NullAudio>;

    fn host() -> TestHost {
        init_logging();
        Host::new(MockGpu::default(), NullAudio)
    }

    fn with_device() -> (TestHost, Handle) {
        let mut host = host();
        let mut guest = RecordingGuest::default();
        let device = ready_device(&mut host, &mut guest);
        host.gpu().clear_calls();
        (host, device)
    }

    fn put_str(mem: &mut Vec<u8>, s: &str) -> (u32, u32) {
        let ptr = mem.len() as u32;
        mem.extend_from_slice(s.as_bytes());
        (ptr, s.len() as u32)
    }

    /// Device, compute pipeline and bind group ready for a pass.
    fn compute_setup(host: &mut TestHost, device: Handle) -> (Handle, Handle) {
        let mut mem = layout_entry_memory(BufferBindingType::Storage);
        let bgl = host.create_bind_group_layout(MemoryView::new(&mem), device, 0, 1);
        let buffer_desc = buffer_descriptor_memory(256, buffer_usage::STORAGE);
        let buffer = host.create_buffer(MemoryView::new(&buffer_desc), device, 0);

        let entries_ptr = mem.len() as u32;
        mem.extend_from_slice(bytemuck::bytes_of(&RawBindGroupEntry::buffer(0, buffer, 0, 0)));
        let group = host.create_bind_group(MemoryView::new(&mem), device, bgl, entries_ptr, 1);

        let layouts_ptr = mem.len() as u32;
        mem.extend_from_slice(&bgl.to_le_bytes());
        let layout = host.create_pipeline_layout(MemoryView::new(&mem), device, layouts_ptr, 1);
        let (src_ptr, src_len) = put_str(&mut mem, "@compute @workgroup_size(64) fn main() {}");
        let shader = host.create_shader_module(MemoryView::new(&mem), device, src_ptr, src_len);
        let (entry_ptr, entry_len) = put_str(&mut mem, "main");
        let pipeline = host.create_compute_pipeline(
            MemoryView::new(&mem),
            device,
            layout,
            shader,
            entry_ptr,
            entry_len,
        );
        assert_eq!(host.has_last_error(), 0, "{:?}", host.last_error());
        (pipeline, group)
    }

    #[test]
    fn test_request_adapter_success_fires_once() {
        let mut host = host();
        let mut guest = RecordingGuest::default();
        host.request_adapter();
        assert!(guest.calls.is_empty());

        host.pump_with(&mut guest);
        host.pump_with(&mut guest);
        let calls = guest.calls_to("receive_adapter");
        assert_eq!(calls, vec![vec![GuestValue::I32(1), GuestValue::I32(0)]]);
        assert_eq!(guest.calls.len(), 1);
    }

    #[test]
    fn test_request_adapter_failure_fires_once() {
        let mut host = Host::new(MockGpu::failing_adapter(), NullAudio);
        let mut guest = RecordingGuest::default();
        host.request_adapter();
        host.pump_with(&mut guest);
        host.pump_with(&mut guest);
        assert_eq!(
            guest.calls_to("receive_adapter"),
            vec![vec![GuestValue::I32(0), GuestValue::I32(1)]]
        );
        assert_eq!(host.has_last_error(), 1);
        assert!(host.objects().adapters.get(1).is_none());
    }

    #[test]
    fn test_unsupported_gpu_reports_unsupported_status() {
        let mut host = Host::new(MockGpu::unsupported(), NullAudio);
        let mut guest = RecordingGuest::default();
        host.request_adapter();
        host.pump_with(&mut guest);
        assert_eq!(
            guest.calls_to("receive_adapter"),
            vec![vec![GuestValue::I32(0), GuestValue::I32(2)]]
        );
    }

    #[test]
    fn test_request_device_with_invalid_adapter() {
        let mut host = host();
        let mut guest = RecordingGuest::default();
        host.adapter_request_device(7);
        assert_eq!(
            host.last_error().as_deref(),
            Some("adapter_request_device: invalid adapter handle 7")
        );
        assert!(guest.calls.is_empty());
        host.pump_with(&mut guest);
        assert_eq!(
            guest.calls_to("receive_device"),
            vec![vec![GuestValue::I32(0), GuestValue::I32(1)]]
        );
    }

    #[test]
    fn test_device_queue_and_preferred_format() {
        let (mut host, device) = with_device();
        assert_eq!(host.device_get_queue(device), 1);
        assert_eq!(host.device_get_queue(device), 2);
        assert_eq!(host.device_get_queue(0), 0);
        assert_eq!(host.get_preferred_format(), TextureFormat::Bgra8Unorm.code());
    }

    #[test]
    fn test_invalid_handles_return_zero_and_set_error() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(16, buffer_usage::UNIFORM);
        let view = MemoryView::new(&mem);

        for bad in [0, device + 1, u32::MAX] {
            host.errors.clear();
            assert_eq!(host.create_buffer(view, bad, 0), 0);
            assert_eq!(
                host.last_error(),
                Some(format!("create_buffer: invalid device handle {bad}"))
            );
        }

        host.errors.clear();
        assert_eq!(host.texture_create_view(view, 3, 0), 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("texture_create_view: invalid texture handle 3")
        );
        assert_eq!(host.create_command_encoder(9), 0);
        assert_eq!(host.command_encoder_finish(1), 0);
        assert_eq!(host.begin_compute_pass(1), 0);
        assert_eq!(host.get_current_texture_view(0), 0);
        assert_eq!(host.has_last_error(), 1);
        assert!(host.gpu().calls().is_empty());
    }

    #[test]
    fn test_create_buffer_decodes_descriptor() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(65536, 0x20);
        let buffer = host.create_buffer(MemoryView::new(&mem), device, 0);
        assert_eq!(buffer, 1);
        assert_eq!(host.gpu().calls(), vec!["create_buffer size=65536 usage=0x20 mapped=false"]);
    }

    #[test]
    fn test_create_buffer_out_of_bounds_descriptor() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(64, 0x40);
        assert_eq!(host.create_buffer(MemoryView::new(&mem), device, 8), 0);
        assert!(host
            .last_error()
            .unwrap()
            .starts_with("create_buffer: guest memory access out of bounds"));
    }

    #[test]
    fn test_buffer_write_copies_guest_bytes() {
        let (mut host, device) = with_device();
        let mut mem = buffer_descriptor_memory(64, buffer_usage::COPY_DST);
        let buffer = host.create_buffer(MemoryView::new(&mem), device, 0);
        mem.extend_from_slice(&[1, 2, 3, 4]);
        host.buffer_write(MemoryView::new(&mem), device, buffer, 8, 16, 4);
        assert_eq!(host.has_last_error(), 0);
        assert_eq!(
            host.gpu().calls().last().map(String::as_str),
            Some("write_buffer offset=8 data=[1, 2, 3, 4]")
        );

        host.buffer_write(MemoryView::new(&mem), device, buffer, 0, 16, 400);
        assert_eq!(host.has_last_error(), 1);
    }

    #[test]
    fn test_buffer_destroy_releases_handle() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(64, 0x40);
        let buffer = host.create_buffer(MemoryView::new(&mem), device, 0);
        host.buffer_destroy(buffer);
        assert!(host.objects().buffers.get(buffer).is_none());
        assert_eq!(host.gpu().calls().last().map(String::as_str), Some("destroy_buffer"));

        host.buffer_destroy(buffer);
        assert_eq!(
            host.last_error().as_deref(),
            Some("buffer_destroy: invalid buffer handle 1")
        );
    }

    #[test]
    fn test_copy_buffer_to_buffer_submits_immediately() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(64, buffer_usage::COPY_SRC | buffer_usage::COPY_DST);
        let a = host.create_buffer(MemoryView::new(&mem), device, 0);
        let b = host.create_buffer(MemoryView::new(&mem), device, 0);
        host.gpu().clear_calls();

        host.copy_buffer_to_buffer(device, a, 0, b, 16, 32);
        assert_eq!(
            host.gpu().calls(),
            vec![
                "create_command_encoder",
                "copy_buffer_to_buffer 0 -> 16 (32 bytes)",
                "finish_encoder [copy_buffer_to_buffer]",
                "submit 1",
            ]
        );

        host.copy_buffer_to_buffer(device, a, 0, 99, 0, 4);
        assert_eq!(
            host.last_error().as_deref(),
            Some("copy_buffer_to_buffer: invalid buffer handle 99")
        );
    }

    #[test]
    fn test_copy_in_encoder_waits_for_submit() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(64, buffer_usage::COPY_SRC | buffer_usage::COPY_DST);
        let a = host.create_buffer(MemoryView::new(&mem), device, 0);
        let b = host.create_buffer(MemoryView::new(&mem), device, 0);
        let encoder = host.create_command_encoder(device);
        host.copy_buffer_to_buffer_in_encoder(encoder, a, 0, b, 0, 64);
        host.copy_buffer_to_buffer_in_encoder(encoder, b, 0, a, 0, 64);
        assert!(!host.gpu().calls().iter().any(|c| c.starts_with("submit")));

        let commands = host.command_encoder_finish(encoder);
        assert_eq!(commands, 1);
        assert!(host.objects().encoders.get(encoder).is_none());
        host.queue_submit(device, commands);
        assert_eq!(host.gpu().calls().last().map(String::as_str), Some("submit 1"));
        assert!(host.objects().command_buffers.get(commands).is_none());

        host.queue_submit(device, commands);
        assert_eq!(
            host.last_error().as_deref(),
            Some("queue_submit: invalid command buffer handle 1")
        );
    }

    #[test]
    fn test_out_of_range_copy_is_reported() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(16, buffer_usage::COPY_SRC | buffer_usage::COPY_DST);
        let a = host.create_buffer(MemoryView::new(&mem), device, 0);
        let b = host.create_buffer(MemoryView::new(&mem), device, 0);
        host.gpu().clear_calls();

        host.copy_buffer_to_buffer(device, a, 0, b, 0, 64);
        assert_eq!(
            host.last_error().as_deref(),
            Some(
                "copy_buffer_to_buffer: copy of 64 bytes out of range \
                 (source 16 bytes at 0, destination 16 bytes at 0)"
            )
        );
        assert!(!host.gpu().calls().iter().any(|c| c.starts_with("submit")));

        host.errors.clear();
        let encoder = host.create_command_encoder(device);
        host.copy_buffer_to_buffer_in_encoder(encoder, a, 8, b, 0, 16);
        assert_eq!(
            host.last_error().as_deref(),
            Some(
                "copy_buffer_to_buffer_in_encoder: copy of 16 bytes out of range \
                 (source 16 bytes at 8, destination 16 bytes at 0)"
            )
        );
        host.copy_buffer_to_buffer_in_encoder(encoder, a, u64::MAX, b, 0, 1);
        assert_eq!(host.has_last_error(), 1);
    }

    #[test]
    fn test_shader_compile_error_is_reported() {
        let (mut host, device) = with_device();
        let mut mem = Vec::new();
        let (ptr, len) = put_str(&mut mem, "fn broken( {");
        assert_eq!(host.create_shader_module(MemoryView::new(&mem), device, ptr, len), 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("create_shader_module: shader compilation failed: fn broken( {")
        );
        let (ptr, len) = put_str(&mut mem, "@fragment fn fs() {}");
        assert_eq!(host.create_shader_module(MemoryView::new(&mem), device, ptr, len), 1);
    }

    #[test]
    fn test_textures_views_and_samplers() {
        let (mut host, device) = with_device();
        let desc = RawTextureDescriptor::d2(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            texture_usage::TEXTURE_BINDING,
        );
        let mem = bytemuck::bytes_of(&desc).to_vec();
        let texture = host.create_texture(MemoryView::new(&mem), device, 0);
        assert_eq!(texture, 1);
        assert_eq!(host.texture_create_view(MemoryView::new(&mem), texture, 0), 1);
        assert_eq!(host.create_sampler(MemoryView::new(&mem), device, 0), 1);
        assert_eq!(host.has_last_error(), 0);

        let mut bad = desc;
        bad.dimension = 9;
        let mem = bytemuck::bytes_of(&bad).to_vec();
        assert_eq!(host.create_texture(MemoryView::new(&mem), device, 0), 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("create_texture: unknown TextureDimension code 9")
        );
    }

    #[test]
    fn test_bind_group_with_dangling_resource() {
        let (mut host, device) = with_device();
        let mut mem = layout_entry_memory(BufferBindingType::Uniform);
        let bgl = host.create_bind_group_layout(MemoryView::new(&mem), device, 0, 1);
        let entries_ptr = mem.len() as u32;
        mem.extend_from_slice(bytemuck::bytes_of(&RawBindGroupEntry {
            binding: 0,
            entry_type: GroupEntryType::Sampler.code(),
            resource_handle: 4,
            ..Default::default()
        }));
        assert_eq!(host.create_bind_group(MemoryView::new(&mem), device, bgl, entries_ptr, 1), 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("create_bind_group: invalid sampler handle 4")
        );
        assert!(!host.gpu().calls().iter().any(|c| c.starts_with("create_bind_group ")));
    }

    #[test]
    fn test_pipeline_layout_with_bad_layout_handle() {
        let (mut host, device) = with_device();
        let mem = [1u32, 2].iter().flat_map(|h| h.to_le_bytes()).collect::<Vec<_>>();
        assert_eq!(host.create_pipeline_layout(MemoryView::new(&mem), device, 0, 2), 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("create_pipeline_layout: invalid bind group layout handle 1")
        );
    }

    #[test]
    fn test_compute_pass_lifecycle() {
        let (mut host, device) = with_device();
        let (pipeline, group) = compute_setup(&mut host, device);
        let encoder = host.create_command_encoder(device);
        host.gpu().clear_calls();

        let pass = host.begin_compute_pass(encoder);
        assert_eq!(pass, 1);
        host.compute_pass_set_pipeline(pass, pipeline);
        host.compute_pass_set_bind_group(pass, 0, group);
        host.compute_pass_set_bind_group_with_offset(pass, 1, group, 256);
        host.compute_pass_dispatch(pass, 4, 2, 1);
        host.compute_pass_end(pass);
        assert_eq!(host.has_last_error(), 0);
        assert_eq!(
            host.gpu().calls(),
            vec![
                "begin_compute_pass",
                "set_compute_pipeline",
                "set_compute_bind_group 0 []",
                "set_compute_bind_group 1 [256]",
                "dispatch_workgroups 4 2 1",
                "end_compute_pass",
            ]
        );
    }

    #[test]
    fn test_commands_after_end_are_invalid_handles() {
        let (mut host, device) = with_device();
        let (pipeline, group) = compute_setup(&mut host, device);
        let encoder = host.create_command_encoder(device);
        let pass = host.begin_compute_pass(encoder);
        host.compute_pass_end(pass);
        host.gpu().clear_calls();

        host.compute_pass_dispatch(pass, 1, 1, 1);
        assert_eq!(
            host.last_error().as_deref(),
            Some("compute_pass_dispatch: invalid pass handle 1")
        );
        host.compute_pass_set_pipeline(pass, pipeline);
        host.compute_pass_set_bind_group(pass, 0, group);
        host.render_pass_draw(pass, 3, 1, 0, 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("render_pass_draw: invalid pass handle 1")
        );
        host.compute_pass_end(pass);
        assert!(host.gpu().calls().is_empty());
    }

    #[test]
    fn test_rejected_pass_end_is_reported() {
        let (mut host, device) = with_device();
        let encoder = host.create_command_encoder(device);
        let pass = host.begin_compute_pass(encoder);
        host.compute_pass_dispatch(pass, 1, 1, 1);
        assert_eq!(host.has_last_error(), 0);

        host.compute_pass_end(pass);
        assert_eq!(
            host.last_error().as_deref(),
            Some("compute_pass_end: compute pass: 1 command(s) recorded without a pipeline")
        );
        assert!(host.objects().passes.get(pass).is_none());

        host.errors.clear();
        let view = host.get_current_texture_view(device);
        let pass = host.begin_render_pass(encoder, view, 0.0, 0.0, 0.0, 1.0);
        host.render_pass_draw(pass, 3, 1, 0, 0);
        host.render_pass_draw(pass, 3, 1, 0, 0);
        host.render_pass_end(pass);
        assert_eq!(
            host.last_error().as_deref(),
            Some("render_pass_end: render pass: 2 command(s) recorded without a pipeline")
        );
    }

    #[test]
    fn test_pass_kind_mismatch() {
        let (mut host, device) = with_device();
        let encoder = host.create_command_encoder(device);
        let compute = host.begin_compute_pass(encoder);
        host.gpu().clear_calls();

        host.render_pass_draw(compute, 3, 1, 0, 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("render_pass_draw: pass 1 is a compute pass, not a render pass")
        );
        host.render_pass_end(compute);
        assert!(host.objects().passes.get(compute).is_some());
        assert!(host.gpu().calls().is_empty());

        host.errors.clear();
        let (pipeline, _) = compute_setup(&mut host, device);
        let other_encoder = host.create_command_encoder(device);
        let view = host.get_current_texture_view(device);
        let render = host.begin_render_pass(other_encoder, view, 0.0, 0.0, 0.0, 1.0);
        host.render_pass_set_pipeline(render, pipeline);
        assert_eq!(
            host.last_error(),
            Some(format!(
                "render_pass_set_pipeline: pipeline {pipeline} is a compute pipeline, not a render pipeline"
            ))
        );
    }

    #[test]
    fn test_render_pass_and_present() {
        let (mut host, device) = with_device();
        let mut mem = Vec::new();
        let (src_ptr, src_len) = put_str(&mut mem, "@vertex fn vs() {} @fragment fn fs() {}");
        let (vs_ptr, vs_len) = put_str(&mut mem, "vs");
        let (fs_ptr, fs_len) = put_str(&mut mem, "fs");
        let layout = host.create_pipeline_layout(MemoryView::new(&mem), device, 0, 0);
        let shader = host.create_shader_module(MemoryView::new(&mem), device, src_ptr, src_len);
        let pipeline = host.create_render_pipeline(
            MemoryView::new(&mem),
            device,
            layout,
            shader,
            (vs_ptr, vs_len),
            (fs_ptr, fs_len),
            host.get_preferred_format(),
            BlendMode::Alpha.code(),
        );
        assert_eq!(pipeline, 1, "{:?}", host.last_error());

        let first = host.create_command_encoder(device);
        let second = host.create_command_encoder(device);
        let view = host.get_current_texture_view(device);
        let pass = host.begin_render_pass(first, view, 0.1, 0.2, 0.3, 1.0);
        host.render_pass_set_pipeline(pass, pipeline);
        host.render_pass_draw(pass, 3, 1, 0, 0);
        host.render_pass_end(pass);
        host.gpu().clear_calls();

        host.present(device);
        assert_eq!(host.has_last_error(), 0, "{:?}", host.last_error());
        assert_eq!(
            host.gpu().calls(),
            vec![
                "finish_encoder [begin_render_pass [0.1, 0.2, 0.3, 1.0]]",
                "finish_encoder []",
                "submit 2",
                "present",
            ]
        );
        assert!(host.objects().encoders.get(first).is_none());
        assert!(host.objects().encoders.get(second).is_none());
    }

    #[test]
    fn test_render_pipeline_rejects_unknown_blend_mode() {
        let (mut host, device) = with_device();
        let mut mem = Vec::new();
        let (src_ptr, src_len) = put_str(&mut mem, "@vertex fn vs() {}");
        let layout = host.create_pipeline_layout(MemoryView::new(&mem), device, 0, 0);
        let shader = host.create_shader_module(MemoryView::new(&mem), device, src_ptr, src_len);
        let pipeline = host.create_render_pipeline(
            MemoryView::new(&mem),
            device,
            layout,
            shader,
            (0, 0),
            (0, 0),
            TextureFormat::Rgba8Unorm.code(),
            7,
        );
        assert_eq!(pipeline, 0);
        assert_eq!(
            host.last_error().as_deref(),
            Some("create_render_pipeline: unknown BlendMode code 7")
        );
    }

    #[test]
    fn test_present_only_flushes_own_device() {
        let mut host = host();
        let mut guest = RecordingGuest::default();
        let a = ready_device(&mut host, &mut guest);
        let b = ready_device(&mut host, &mut guest);
        let on_a = host.create_command_encoder(a);
        let on_b = host.create_command_encoder(b);
        host.present(a);
        assert!(host.objects().encoders.get(on_a).is_none());
        assert!(host.objects().encoders.get(on_b).is_some());

        host.present(42);
        assert_eq!(host.last_error().as_deref(), Some("present: invalid device handle 42"));
    }

    #[test]
    fn test_native_rejection_keeps_other_objects() {
        let (mut host, device) = with_device();
        let mem = buffer_descriptor_memory(MockGpu::MAX_BUFFER_SIZE + 1, 0x40);
        assert_eq!(host.create_buffer(MemoryView::new(&mem), device, 0), 0);
        assert!(host.objects().devices.get(device).is_some());
        let mut out = vec![0u8; 128];
        let len = host.copy_last_error(MemoryViewMut::new(&mut out), 0, 128);
        assert!(String::from_utf8_lossy(&out[..len as usize])
            .starts_with("create_buffer: buffer size"));
    }
}
