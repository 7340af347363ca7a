use gpubridge_abi::{CallbackStatus, Handle, ResourceKind};

use crate::memory::MemoryViewMut;

/// Failure raised by a backend's native call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The underlying API rejected the call (validation, compilation, OOM).
    #[error("{0}")]
    Native(String),
    /// The capability is absent from this host entirely.
    #[error("{0} is not supported on this host")]
    Unsupported(String),
}

impl BackendError {
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into())
    }

    /// Status reported to the guest when this error settles an async request.
    pub fn status(&self) -> CallbackStatus {
        match self {
            Self::Native(_) => CallbackStatus::Failed,
            Self::Unsupported(_) => CallbackStatus::Unsupported,
        }
    }
}

/// Everything a single entry point can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid {kind} handle {handle}")]
    InvalidHandle { kind: ResourceKind, handle: Handle },

    #[error("pass {handle} is a {actual} pass, not a {expected} pass")]
    WrongPassKind {
        handle: Handle,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("pipeline {handle} is a {actual} pipeline, not a {expected} pipeline")]
    WrongPipelineKind {
        handle: Handle,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unknown resource type id {0}")]
    UnknownResourceKind(u32),

    #[error("guest memory access out of bounds: {len} bytes at offset {ptr} (memory is {size} bytes)")]
    OutOfBounds { ptr: u32, len: u64, size: usize },

    #[error("guest string at offset {ptr} is not valid UTF-8")]
    InvalidUtf8 { ptr: u32 },

    #[error("unknown {what} code {code}")]
    InvalidCode { what: &'static str, code: u32 },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl BridgeError {
    pub fn invalid_handle(kind: ResourceKind, handle: Handle) -> Self {
        Self::InvalidHandle { kind, handle }
    }

    pub fn status(&self) -> CallbackStatus {
        match self {
            Self::Backend(err) => err.status(),
            _ => CallbackStatus::Failed,
        }
    }
}

/// A guest callback export that trapped or rejected its arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("guest export `{export}` failed: {message}")]
pub struct GuestCallError {
    pub export: String,
    pub message: String,
}

/// Single-slot "last error" transport.
///
/// Only the most recent unconsumed message is kept: a new failure silently
/// replaces one the guest has not read yet. A message is cleared only once the
/// guest has copied all of it, so a short read never loses data.
#[derive(Debug, Default)]
pub struct ErrorChannel {
    pending: Option<Vec<u8>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, message: impl Into<String>) {
        self.pending = Some(message.into().into_bytes());
    }

    pub fn has_error(&self) -> bool {
        self.pending.is_some()
    }

    /// Byte length of the pending message, 0 if none.
    pub fn len(&self) -> u32 {
        self.pending
            .as_ref()
            .map_or(0, |msg| u32::try_from(msg.len()).unwrap_or(u32::MAX))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn message(&self) -> Option<String> {
        self.pending
            .as_ref()
            .map(|msg| String::from_utf8_lossy(msg).into_owned())
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Copy up to `dest_len` bytes of the pending message to `dest_ptr`.
    ///
    /// Returns the number of bytes written. The message is cleared only when
    /// it was copied in full; an out-of-bounds destination writes nothing.
    pub fn copy_into(&mut self, mut memory: MemoryViewMut<'_>, dest_ptr: u32, dest_len: u32) -> u32 {
        let Some(message) = self.pending.as_ref() else {
            return 0;
        };
        let count = message.len().min(dest_len as usize);
        if let Err(err) = memory.write_bytes(dest_ptr, &message[..count]) {
            log::warn!("copy_last_error: {err}");
            return 0;
        }
        if count == message.len() {
            self.pending = None;
        }
        count as u32
    }
}
