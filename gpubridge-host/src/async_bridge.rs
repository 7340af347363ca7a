//! Promise-style host operations surfaced to a guest that cannot await.
//!
//! A request entry point pushes a future into the bridge and returns at once.
//! Futures are only ever polled from `Host::take_ready`, which runs on a later
//! turn of the embedding loop than the request, and each settled future turns
//! into exactly one [`Completion`]: a call into a named guest export.

use std::future::Future;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::{noop_waker_ref, Context, Poll};
use gpubridge_abi::names::exports;
use gpubridge_abi::{CallbackStatus, Handle};

use crate::error::GuestCallError;

/// In-flight host operations. Never cancelled, no timeout.
pub struct AsyncBridge<T> {
    pending: FuturesUnordered<LocalBoxFuture<'static, T>>,
}

impl<T: 'static> AsyncBridge<T> {
    pub fn new() -> Self {
        Self {
            pending: FuturesUnordered::new(),
        }
    }

    pub fn spawn(&mut self, future: impl Future<Output = T> + 'static) {
        self.pending.push(Box::pin(future));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Collect every result that is ready right now without blocking.
    pub fn poll_ready(&mut self) -> Vec<T> {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut settled = Vec::new();
        while let Poll::Ready(Some(value)) = self.pending.poll_next_unpin(&mut cx) {
            settled.push(value);
        }
        settled
    }
}

impl<T: 'static> Default for AsyncBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A settled request, ready to be handed to the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Adapter {
        handle: Handle,
        status: CallbackStatus,
    },
    Device {
        handle: Handle,
        status: CallbackStatus,
    },
    AudioDecoded {
        request_id: u32,
        buffer: Handle,
        duration_ms: u32,
        frame_count: u32,
        channel_count: u32,
        sample_rate: u32,
    },
    DecodeFailed {
        request_id: u32,
    },
    /// Both handles are 0 unless `status` is `Ok`.
    TextureLoaded {
        texture: Handle,
        view: Handle,
        status: CallbackStatus,
    },
}

impl Completion {
    pub fn export_name(&self) -> &'static str {
        match self {
            Self::Adapter { .. } => exports::RECEIVE_ADAPTER,
            Self::Device { .. } => exports::RECEIVE_DEVICE,
            Self::AudioDecoded { .. } => exports::ON_AUDIO_BUFFER_DECODED,
            Self::DecodeFailed { .. } => exports::ON_DECODE_ERROR,
            Self::TextureLoaded { .. } => exports::ON_TEXTURE_LOADED,
        }
    }

    pub fn args(&self) -> Vec<GuestValue> {
        use GuestValue::I32;
        match *self {
            Self::Adapter { handle, status } | Self::Device { handle, status } => {
                vec![I32(handle), I32(status.code())]
            }
            Self::AudioDecoded {
                request_id,
                buffer,
                duration_ms,
                frame_count,
                channel_count,
                sample_rate,
            } => vec![
                I32(request_id),
                I32(buffer),
                I32(duration_ms),
                I32(frame_count),
                I32(channel_count),
                I32(sample_rate),
            ],
            Self::DecodeFailed { request_id } => vec![I32(request_id)],
            Self::TextureLoaded {
                texture,
                view,
                status,
            } => vec![I32(texture), I32(view), I32(status.code())],
        }
    }
}

/// Scalar argument of a guest export call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuestValue {
    I32(u32),
    F32(f32),
    F64(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Called,
    /// The guest has no export by that name (yet).
    Missing,
}

/// Calls into functions the guest exports.
pub trait GuestExports {
    fn call(&mut self, export: &str, args: &[GuestValue]) -> Result<CallOutcome, GuestCallError>;
}

#[derive(Debug, Default)]
pub struct Delivery {
    pub delivered: usize,
    /// Completions whose export is missing, in their original order.
    pub undelivered: Vec<Completion>,
}

/// Hand each completion to its guest export.
///
/// A call that traps still counts as delivered: the guest saw the result and
/// a second call would break the one-shot contract.
pub fn deliver<E: GuestExports + ?Sized>(guest: &mut E, completions: Vec<Completion>) -> Delivery {
    let mut delivery = Delivery::default();
    for completion in completions {
        match guest.call(completion.export_name(), &completion.args()) {
            Ok(CallOutcome::Called) => delivery.delivered += 1,
            Ok(CallOutcome::Missing) => delivery.undelivered.push(completion),
            Err(err) => {
                log::error!("{err}");
                delivery.delivered += 1;
            }
        }
    }
    delivery
}
