//! Audio contexts and decode requests.
//!
//! Decoding settles through the async bridge exactly like adapter and device
//! requests, ending in `on_audio_buffer_decoded` or `on_decode_error`.

use futures::future::{self, FutureExt, LocalBoxFuture};
use gpubridge_abi::names::imports;
use gpubridge_abi::{Handle, ResourceKind};

use crate::async_bridge::Completion;
use crate::backend::{BackendResult, GpuBackend};
use crate::error::{BackendError, BridgeError};
use crate::host::{lookup, Host, Settled};
use crate::memory::MemoryView;

/// Shape of a decoded clip as reported to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub duration_ms: u32,
    pub frame_count: u32,
    pub channel_count: u32,
    pub sample_rate: u32,
}

pub trait AudioBackend: 'static {
    type Context;
    type Buffer;

    fn create_context(&self) -> BackendResult<Self::Context>;

    /// Decode an encoded clip. `data` is already a copy of guest memory.
    fn decode(
        &self,
        context: &Self::Context,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, BackendResult<Self::Buffer>>;

    fn info(&self, buffer: &Self::Buffer) -> AudioInfo;
}

/// Host without audio: every request is reported as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioBackend for NullAudio {
    type Context = ();
    type Buffer = ();

    fn create_context(&self) -> BackendResult<()> {
        Err(BackendError::Unsupported("audio".into()))
    }

    fn decode(&self, _context: &(), _data: Vec<u8>) -> LocalBoxFuture<'static, BackendResult<()>> {
        future::ready(Err(BackendError::Unsupported("audio".into()))).boxed_local()
    }

    fn info(&self, _buffer: &()) -> AudioInfo {
        AudioInfo {
            duration_ms: 0,
            frame_count: 0,
            channel_count: 0,
            sample_rate: 0,
        }
    }
}

impl<G: GpuBackend, A: AudioBackend> Host<G, A> {
    pub fn create_audio_context(&mut self) -> Handle {
        let result = self
            .audio
            .create_context()
            .map(|context| self.sounds.contexts.insert(context))
            .map_err(BridgeError::from);
        if let Ok(handle) = result {
            log::info!("audio context {handle} created");
        }
        self.or_report(imports::CREATE_AUDIO_CONTEXT, result)
    }

    /// Start decoding `len` bytes at `ptr`. The bytes are copied before this
    /// returns; the outcome arrives on a later pump.
    pub fn decode_audio_data(
        &mut self,
        memory: MemoryView<'_>,
        context: Handle,
        ptr: u32,
        len: u32,
        request_id: u32,
    ) {
        let started = lookup(&self.sounds.contexts, ResourceKind::AudioContext, context)
            .and_then(|ctx| Ok(self.audio.decode(ctx, memory.copy_bytes(ptr, len)?)));
        match started {
            Ok(decode) => self.tasks.spawn(decode.map(move |result| Settled::Audio {
                request_id,
                result,
            })),
            Err(err) => {
                self.report(imports::DECODE_AUDIO_DATA, &err);
                self.tasks
                    .spawn(future::ready(Settled::Rejected(Completion::DecodeFailed {
                        request_id,
                    })));
            }
        }
    }

    pub fn audio_buffer_info(&self, buffer: Handle) -> Option<AudioInfo> {
        self.sounds.buffers.get(buffer).map(|b| self.audio.info(b))
    }
}
