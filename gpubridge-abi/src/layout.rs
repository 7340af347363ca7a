//! Fixed byte layouts of the descriptors a guest places in its linear memory.
//!
//! All records are little-endian, `#[repr(C)]` and free of implicit padding, so
//! the byte image of a record is exactly what the guest writes. The host reads
//! them with an unaligned copy; guests may place them at any offset.

use bytemuck::{Pod, Zeroable};

/// `create_buffer` descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawBufferDescriptor {
    pub size: u64,
    pub usage: u32,
    /// Nonzero means true.
    pub mapped_at_creation: u8,
    pub _pad: [u8; 3],
}

impl RawBufferDescriptor {
    pub const SIZE: usize = 16;

    pub fn new(size: u64, usage: u32, mapped_at_creation: bool) -> Self {
        Self {
            size,
            usage,
            mapped_at_creation: mapped_at_creation as u8,
            _pad: [0; 3],
        }
    }
}

/// `create_texture` descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawTextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    /// [`crate::TextureDimension`] code.
    pub dimension: u32,
    /// [`crate::TextureFormat`] code.
    pub format: u32,
    pub usage: u32,
}

impl RawTextureDescriptor {
    pub const SIZE: usize = 32;

    /// Single-mip, single-sample 2D texture.
    pub fn d2(width: u32, height: u32, format: crate::TextureFormat, usage: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
            mip_level_count: 1,
            sample_count: 1,
            dimension: crate::TextureDimension::D2.code(),
            format: format.code(),
            usage,
        }
    }
}

/// `texture_create_view` descriptor. A null pointer means "all defaults".
///
/// Optional fields are `(value, present flag)` pairs; a zero flag means the
/// value bytes are ignored.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawTextureViewDescriptor {
    pub format: u32,
    pub has_format: u8,
    pub _pad0: [u8; 3],
    pub dimension: u32,
    pub has_dimension: u8,
    pub _pad1: [u8; 3],
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub has_mip_level_count: u8,
    pub _pad2: [u8; 3],
    pub base_array_layer: u32,
    pub array_layer_count: u32,
    pub has_array_layer_count: u8,
    pub _pad3: [u8; 3],
}

impl RawTextureViewDescriptor {
    pub const SIZE: usize = 40;
}

/// `create_sampler` descriptor. A null pointer means clamp + linear filtering.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawSamplerDescriptor {
    /// [`crate::AddressMode`] code, applied to u, v and w.
    pub address_mode: u32,
    /// [`crate::FilterMode`] codes.
    pub mag_filter: u32,
    pub min_filter: u32,
    pub mipmap_filter: u32,
}

impl RawSamplerDescriptor {
    pub const SIZE: usize = 16;
}

/// One element of the `create_bind_group_layout` entry array (40-byte stride).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawBindGroupLayoutEntry {
    pub binding: u32,
    /// `GPUShaderStage` bits.
    pub visibility: u32,
    /// [`crate::LayoutEntryType`] code.
    pub entry_type: u32,
    /// [`crate::BufferBindingType`] code; read only for buffer entries.
    pub buffer_type: u32,
    pub has_min_size: u32,
    pub has_dynamic_offset: u32,
    pub min_size: u64,
    pub padding: u64,
}

impl RawBindGroupLayoutEntry {
    pub const SIZE: usize = 40;

    pub fn buffer(binding: u32, visibility: u32, ty: crate::BufferBindingType) -> Self {
        Self {
            binding,
            visibility,
            entry_type: crate::LayoutEntryType::Buffer.code(),
            buffer_type: ty.code(),
            ..Self::default()
        }
    }
}

/// One element of the `create_bind_group` entry array (32-byte stride).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawBindGroupEntry {
    pub binding: u32,
    /// [`crate::GroupEntryType`] code.
    pub entry_type: u32,
    pub resource_handle: u32,
    pub padding: u32,
    pub offset: u64,
    /// Zero binds the rest of the buffer from `offset`.
    pub size: u64,
}

impl RawBindGroupEntry {
    pub const SIZE: usize = 32;

    pub fn buffer(binding: u32, buffer: crate::Handle, offset: u64, size: u64) -> Self {
        Self {
            binding,
            entry_type: crate::GroupEntryType::Buffer.code(),
            resource_handle: buffer,
            padding: 0,
            offset,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of::<RawBufferDescriptor>(), RawBufferDescriptor::SIZE);
        assert_eq!(size_of::<RawTextureDescriptor>(), RawTextureDescriptor::SIZE);
        assert_eq!(size_of::<RawTextureViewDescriptor>(), RawTextureViewDescriptor::SIZE);
        assert_eq!(size_of::<RawSamplerDescriptor>(), RawSamplerDescriptor::SIZE);
        assert_eq!(size_of::<RawBindGroupLayoutEntry>(), RawBindGroupLayoutEntry::SIZE);
        assert_eq!(size_of::<RawBindGroupEntry>(), RawBindGroupEntry::SIZE);
    }

    #[test]
    fn test_bind_group_layout_entry_offsets() {
        assert_eq!(offset_of!(RawBindGroupLayoutEntry, entry_type), 8);
        assert_eq!(offset_of!(RawBindGroupLayoutEntry, has_dynamic_offset), 20);
        assert_eq!(offset_of!(RawBindGroupLayoutEntry, min_size), 24);
    }

    #[test]
    fn test_bind_group_entry_offsets() {
        assert_eq!(offset_of!(RawBindGroupEntry, resource_handle), 8);
        assert_eq!(offset_of!(RawBindGroupEntry, offset), 16);
        assert_eq!(offset_of!(RawBindGroupEntry, size), 24);
    }

    #[test]
    fn test_buffer_descriptor_byte_image() {
        let desc = RawBufferDescriptor::new(65536, 0x20, true);
        let bytes = bytemuck::bytes_of(&desc);
        assert_eq!(&bytes[0..8], &65536u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x20u32.to_le_bytes());
        assert_eq!(bytes[12], 1);
    }
}
