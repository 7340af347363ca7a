//! Wire contract between the gpubridge host and a WASM guest.
//!
//! The guest only ever passes integers and offsets into its own linear memory.
//! Everything here describes how those integers and bytes are to be read:
//! resource kinds for `release_handle`, enum codes, fixed little-endian record
//! layouts, and the names of host imports and guest callback exports.
//! Shared between the native host and any guest-side binding.

#[macro_use]
mod macros;

pub mod codes;
pub mod kinds;
pub mod layout;
pub mod names;

pub use codes::*;
pub use kinds::{CallbackStatus, ResourceKind};
pub use layout::*;

/// Integer reference to a host-owned object. Per kind, 1-based.
pub type Handle = u32;

/// Reserved handle value: "no object" or "operation failed".
pub const NULL_HANDLE: Handle = 0;

/// Enum carried on the wire as a `u32` code.
pub trait WireCode: Sized + Copy {
    const WIRE_NAME: &'static str;

    fn code(self) -> u32;

    fn from_code(code: u32) -> Option<Self>;
}
