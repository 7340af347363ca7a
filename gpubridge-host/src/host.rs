//! The context object every entry point runs against.
//!
//! One `Host` owns one set of registries, one error slot and one async bridge.
//! The embedder builds it at startup and hands it to the linker as store data;
//! independent hosts share nothing.

use std::collections::HashSet;

use gpubridge_abi::names::imports;
use gpubridge_abi::{CallbackStatus, Handle, ResourceKind, WireCode, NULL_HANDLE};

use crate::async_bridge::{deliver, AsyncBridge, Completion, GuestExports};
use crate::audio::AudioBackend;
use crate::backend::{BackendResult, DecodedImage, GpuBackend};
use crate::error::{BridgeError, ErrorChannel};
use crate::handle::Registry;
use crate::memory::{MemoryView, MemoryViewMut};
use crate::texture::LOAD_TEXTURE;

// ============================================================
// Registry contents
// ============================================================

pub struct DeviceSlot<G: GpuBackend> {
    pub device: G::Device,
    pub queue: G::Queue,
}

pub struct EncoderSlot<G: GpuBackend> {
    /// Device handle the encoder was created on; `present` batches by it.
    pub device: Handle,
    pub encoder: G::CommandEncoder,
}

pub enum Pipeline<G: GpuBackend> {
    Compute(G::ComputePipeline),
    Render(G::RenderPipeline),
}

impl<G: GpuBackend> Pipeline<G> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Compute(_) => "compute",
            Self::Render(_) => "render",
        }
    }
}

/// An open pass. Ending it (or releasing its handle) removes the slot.
pub enum Pass<G: GpuBackend> {
    Compute(G::ComputePass),
    Render(G::RenderPass),
}

impl<G: GpuBackend> Pass<G> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Compute(_) => "compute",
            Self::Render(_) => "render",
        }
    }
}

/// One registry per GPU resource kind.
pub struct GpuObjects<G: GpuBackend> {
    pub adapters: Registry<G::Adapter>,
    pub devices: Registry<DeviceSlot<G>>,
    pub queues: Registry<G::Queue>,
    pub buffers: Registry<G::Buffer>,
    pub shaders: Registry<G::ShaderModule>,
    pub textures: Registry<G::Texture>,
    pub views: Registry<G::TextureView>,
    pub samplers: Registry<G::Sampler>,
    pub bind_group_layouts: Registry<G::BindGroupLayout>,
    pub bind_groups: Registry<G::BindGroup>,
    pub pipeline_layouts: Registry<G::PipelineLayout>,
    pub pipelines: Registry<Pipeline<G>>,
    pub encoders: Registry<EncoderSlot<G>>,
    pub passes: Registry<Pass<G>>,
    pub command_buffers: Registry<G::CommandBuffer>,
}

impl<G: GpuBackend> Default for GpuObjects<G> {
    fn default() -> Self {
        Self {
            adapters: Registry::new(),
            devices: Registry::new(),
            queues: Registry::new(),
            buffers: Registry::new(),
            shaders: Registry::new(),
            textures: Registry::new(),
            views: Registry::new(),
            samplers: Registry::new(),
            bind_group_layouts: Registry::new(),
            bind_groups: Registry::new(),
            pipeline_layouts: Registry::new(),
            pipelines: Registry::new(),
            encoders: Registry::new(),
            passes: Registry::new(),
            command_buffers: Registry::new(),
        }
    }
}

pub struct AudioObjects<A: AudioBackend> {
    pub contexts: Registry<A::Context>,
    pub buffers: Registry<A::Buffer>,
}

impl<A: AudioBackend> Default for AudioObjects<A> {
    fn default() -> Self {
        Self {
            contexts: Registry::new(),
            buffers: Registry::new(),
        }
    }
}

/// Resolve `handle` or produce the invalid-handle error for `kind`.
pub(crate) fn lookup<T>(
    registry: &Registry<T>,
    kind: ResourceKind,
    handle: Handle,
) -> Result<&T, BridgeError> {
    registry
        .get(handle)
        .ok_or_else(|| BridgeError::invalid_handle(kind, handle))
}

pub(crate) fn lookup_mut<T>(
    registry: &mut Registry<T>,
    kind: ResourceKind,
    handle: Handle,
) -> Result<&mut T, BridgeError> {
    registry
        .get_mut(handle)
        .ok_or_else(|| BridgeError::invalid_handle(kind, handle))
}

/// A host future's output, before it is turned into a [`Completion`].
pub(crate) enum Settled<G: GpuBackend, A: AudioBackend> {
    Adapter(BackendResult<G::Adapter>),
    Device(BackendResult<(G::Device, G::Queue)>),
    Audio {
        request_id: u32,
        result: BackendResult<A::Buffer>,
    },
    Texture {
        device: Handle,
        result: BackendResult<DecodedImage>,
    },
    /// Failed before reaching the backend; already reported.
    Rejected(Completion),
}

// ============================================================
// Host
// ============================================================

pub struct Host<G: GpuBackend, A: AudioBackend> {
    pub(crate) gpu: G,
    pub(crate) audio: A,
    pub(crate) objects: GpuObjects<G>,
    pub(crate) sounds: AudioObjects<A>,
    pub(crate) errors: ErrorChannel,
    pub(crate) tasks: AsyncBridge<Settled<G, A>>,
    /// Completions whose guest export was missing at delivery time.
    outbox: Vec<Completion>,
    warned_exports: HashSet<&'static str>,
}

impl<G: GpuBackend, A: AudioBackend> Host<G, A> {
    pub fn new(gpu: G, audio: A) -> Self {
        Self {
            gpu,
            audio,
            objects: GpuObjects::default(),
            sounds: AudioObjects::default(),
            errors: ErrorChannel::new(),
            tasks: AsyncBridge::new(),
            outbox: Vec::new(),
            warned_exports: HashSet::new(),
        }
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn objects(&self) -> &GpuObjects<G> {
        &self.objects
    }

    /// Record a failed entry point: log it and overwrite the error slot.
    pub(crate) fn report(&mut self, entry: &str, err: &BridgeError) {
        let message = format!("{entry}: {err}");
        log::error!("{message}");
        self.errors.set(message);
    }

    /// Unwrap an entry point result, turning a failure into its sentinel.
    pub(crate) fn or_report<T: Default>(&mut self, entry: &str, result: Result<T, BridgeError>) -> T {
        result.unwrap_or_else(|err| {
            self.report(entry, &err);
            T::default()
        })
    }

    // ── Error channel ──

    pub fn has_last_error(&self) -> u32 {
        self.errors.has_error() as u32
    }

    pub fn get_last_error_length(&self) -> u32 {
        self.errors.len()
    }

    pub fn copy_last_error(&mut self, memory: MemoryViewMut<'_>, dest_ptr: u32, dest_len: u32) -> u32 {
        self.errors.copy_into(memory, dest_ptr, dest_len)
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.message()
    }

    // ── Logging ──

    pub fn log_string(&self, memory: MemoryView<'_>, ptr: u32, len: u32) {
        match memory.bytes(ptr, len as u64) {
            Ok(bytes) => log::info!(target: "guest", "{}", String::from_utf8_lossy(bytes)),
            Err(_) => log::warn!(
                target: "guest",
                "log_string: unreadable message ({len} bytes at offset {ptr})"
            ),
        }
    }

    // ── Handle release ──

    /// Release `handle` of the kind named by `type_id`. Releasing a dead
    /// handle does nothing.
    pub fn release_handle(&mut self, type_id: u32, handle: Handle) {
        let result = ResourceKind::from_code(type_id)
            .ok_or(BridgeError::UnknownResourceKind(type_id))
            .map(|kind| {
                if !self.release(kind, handle) {
                    log::debug!("release_handle: {kind} handle {handle} is not live");
                }
            });
        self.or_report(imports::RELEASE_HANDLE, result)
    }

    fn release(&mut self, kind: ResourceKind, handle: Handle) -> bool {
        let objects = &mut self.objects;
        match kind {
            ResourceKind::Adapter => objects.adapters.release(handle),
            ResourceKind::Device => objects.devices.release(handle),
            ResourceKind::Queue => objects.queues.release(handle),
            ResourceKind::Buffer => objects.buffers.release(handle),
            ResourceKind::ShaderModule => objects.shaders.release(handle),
            ResourceKind::Texture => objects.textures.release(handle),
            ResourceKind::TextureView => objects.views.release(handle),
            ResourceKind::Sampler => objects.samplers.release(handle),
            ResourceKind::BindGroupLayout => objects.bind_group_layouts.release(handle),
            ResourceKind::BindGroup => objects.bind_groups.release(handle),
            ResourceKind::PipelineLayout => objects.pipeline_layouts.release(handle),
            ResourceKind::Pipeline => objects.pipelines.release(handle),
            ResourceKind::CommandEncoder => objects.encoders.release(handle),
            ResourceKind::Pass => objects.passes.release(handle),
            ResourceKind::CommandBuffer => objects.command_buffers.release(handle),
            ResourceKind::AudioContext => self.sounds.contexts.release(handle),
            ResourceKind::AudioBuffer => self.sounds.buffers.release(handle),
        }
    }

    // ── Async delivery ──

    /// Number of requests still waiting on the backend.
    pub fn pending_requests(&self) -> usize {
        self.tasks.pending()
    }

    /// Completions to deliver now: held-back ones first, then anything that
    /// settled since the last call.
    pub fn take_ready(&mut self) -> Vec<Completion> {
        let mut ready = std::mem::take(&mut self.outbox);
        for settled in self.tasks.poll_ready() {
            let completion = self.settle(settled);
            ready.push(completion);
        }
        ready
    }

    /// Hold completions the guest could not receive until the next pump.
    pub fn defer(&mut self, mut undelivered: Vec<Completion>) {
        for completion in &undelivered {
            let export = completion.export_name();
            if self.warned_exports.insert(export) {
                log::warn!("guest does not export `{export}`; holding results until it does");
            }
        }
        undelivered.append(&mut self.outbox);
        self.outbox = undelivered;
    }

    /// Deliver ready completions to a guest that does not share this host's
    /// borrow. Returns the number delivered.
    pub fn pump_with<E: GuestExports + ?Sized>(&mut self, guest: &mut E) -> usize {
        let ready = self.take_ready();
        if ready.is_empty() {
            return 0;
        }
        let delivery = deliver(guest, ready);
        self.defer(delivery.undelivered);
        delivery.delivered
    }

    fn settle(&mut self, settled: Settled<G, A>) -> Completion {
        match settled {
            Settled::Adapter(Ok(adapter)) => {
                log::info!("adapter acquired: {}", self.gpu.adapter_name(&adapter));
                let handle = self.objects.adapters.insert(adapter);
                Completion::Adapter {
                    handle,
                    status: status_for(handle),
                }
            }
            Settled::Adapter(Err(err)) => {
                let status = err.status();
                self.report(imports::REQUEST_ADAPTER, &err.into());
                Completion::Adapter {
                    handle: NULL_HANDLE,
                    status,
                }
            }
            Settled::Device(Ok((device, queue))) => {
                let handle = self.objects.devices.insert(DeviceSlot { device, queue });
                log::info!("device {handle} ready");
                Completion::Device {
                    handle,
                    status: status_for(handle),
                }
            }
            Settled::Device(Err(err)) => {
                let status = err.status();
                self.report(imports::ADAPTER_REQUEST_DEVICE, &err.into());
                Completion::Device {
                    handle: NULL_HANDLE,
                    status,
                }
            }
            Settled::Audio {
                request_id,
                result: Ok(buffer),
            } => {
                let info = self.audio.info(&buffer);
                match self.sounds.buffers.insert(buffer) {
                    NULL_HANDLE => Completion::DecodeFailed { request_id },
                    handle => Completion::AudioDecoded {
                        request_id,
                        buffer: handle,
                        duration_ms: info.duration_ms,
                        frame_count: info.frame_count,
                        channel_count: info.channel_count,
                        sample_rate: info.sample_rate,
                    },
                }
            }
            Settled::Audio {
                request_id,
                result: Err(err),
            } => {
                self.report(imports::DECODE_AUDIO_DATA, &err.into());
                Completion::DecodeFailed { request_id }
            }
            Settled::Texture { device, result } => {
                let loaded = result
                    .map_err(BridgeError::from)
                    .and_then(|image| self.upload_texture(device, &image));
                match loaded {
                    Ok((texture, view)) => Completion::TextureLoaded {
                        texture,
                        view,
                        status: CallbackStatus::Ok,
                    },
                    Err(err) => {
                        let status = err.status();
                        self.report(LOAD_TEXTURE, &err);
                        Completion::TextureLoaded {
                            texture: NULL_HANDLE,
                            view: NULL_HANDLE,
                            status,
                        }
                    }
                }
            }
            Settled::Rejected(completion) => completion,
        }
    }
}

fn status_for(handle: Handle) -> CallbackStatus {
    if handle == NULL_HANDLE {
        CallbackStatus::Failed
    } else {
        CallbackStatus::Ok
    }
}
