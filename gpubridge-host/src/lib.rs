//! gpubridge host: WebGPU and audio for a WASM guest that only speaks integers.
//!
//! The guest holds plain `u32` handles; this crate owns the objects behind
//! them. Calls come in through the imports registered by
//! [`linker::add_to_linker`], read their arguments out of guest memory,
//! forward them to a [`GpuBackend`] or [`AudioBackend`], and report failures
//! through the error channel instead of trapping. Adapter, device, audio
//! and texture-load requests complete asynchronously and are delivered back
//! into guest exports by [`linker::pump`].

pub mod async_bridge;
pub mod audio;
pub mod backend;
mod decode;
pub mod error;
mod gpu;
pub mod handle;
pub mod host;
pub mod input;
pub mod linker;
pub mod memory;
mod texture;
pub mod wav;
pub mod wgpu_backend;

#[cfg(test)]
mod mock;

pub use async_bridge::{CallOutcome, Completion, GuestExports, GuestValue};
pub use audio::{AudioBackend, AudioInfo, NullAudio};
pub use backend::GpuBackend;
pub use error::{BackendError, BridgeError, GuestCallError};
pub use host::Host;
pub use input::{InputDispatcher, InputEvent, WheelDeltaMode};
pub use linker::{add_to_linker, pump, WasmtimeGuest};
pub use memory::{MemoryView, MemoryViewMut};
pub use wav::WavAudio;
pub use wgpu_backend::{WgpuBackend, WgpuOptions};
