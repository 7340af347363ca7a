//! Descriptor decoding: fixed byte layouts in guest memory to typed records.
//!
//! One function per descriptor kind. Shapes are never inferred; an enum code
//! outside its table is a decode failure rather than a silent default.
//!
//! Records are copied out of guest memory as-is, and guest memory is always
//! little-endian, so every multi-byte field goes through `from_le` before it
//! is used. On little-endian hosts that is a no-op.

use gpubridge_abi::{
    BufferBindingType, GroupEntryType, Handle, LayoutEntryType, RawBindGroupEntry,
    RawBindGroupLayoutEntry, RawBufferDescriptor, RawSamplerDescriptor, RawTextureDescriptor,
    RawTextureViewDescriptor, WireCode,
};

use crate::backend::{
    BindingLayout, BufferDescriptor, GroupEntry, GroupResource, LayoutEntry, SamplerDescriptor,
    TextureDescriptor, TextureViewDescriptor,
};
use crate::error::BridgeError;
use crate::memory::MemoryView;

pub(crate) fn code<E: WireCode>(value: u32) -> Result<E, BridgeError> {
    E::from_code(value).ok_or(BridgeError::InvalidCode {
        what: E::WIRE_NAME,
        code: value,
    })
}

fn optional<T>(present: u8, value: T) -> Option<T> {
    (present != 0).then_some(value)
}

pub fn buffer_descriptor(memory: &MemoryView<'_>, ptr: u32) -> Result<BufferDescriptor, BridgeError> {
    let raw: RawBufferDescriptor = memory.read_pod(ptr)?;
    Ok(BufferDescriptor {
        size: u64::from_le(raw.size),
        usage: u32::from_le(raw.usage),
        mapped_at_creation: raw.mapped_at_creation != 0,
    })
}

pub fn texture_descriptor(
    memory: &MemoryView<'_>,
    ptr: u32,
) -> Result<TextureDescriptor, BridgeError> {
    let raw: RawTextureDescriptor = memory.read_pod(ptr)?;
    Ok(TextureDescriptor {
        width: u32::from_le(raw.width),
        height: u32::from_le(raw.height),
        depth_or_array_layers: u32::from_le(raw.depth_or_array_layers),
        mip_level_count: u32::from_le(raw.mip_level_count),
        sample_count: u32::from_le(raw.sample_count),
        dimension: code(u32::from_le(raw.dimension))?,
        format: code(u32::from_le(raw.format))?,
        usage: u32::from_le(raw.usage),
    })
}

/// A null pointer yields the all-defaults view.
pub fn texture_view_descriptor(
    memory: &MemoryView<'_>,
    ptr: u32,
) -> Result<TextureViewDescriptor, BridgeError> {
    if ptr == 0 {
        return Ok(TextureViewDescriptor::default());
    }
    let raw: RawTextureViewDescriptor = memory.read_pod(ptr)?;
    Ok(TextureViewDescriptor {
        format: optional(raw.has_format, u32::from_le(raw.format))
            .map(code)
            .transpose()?,
        dimension: optional(raw.has_dimension, u32::from_le(raw.dimension))
            .map(code)
            .transpose()?,
        base_mip_level: u32::from_le(raw.base_mip_level),
        mip_level_count: optional(raw.has_mip_level_count, u32::from_le(raw.mip_level_count)),
        base_array_layer: u32::from_le(raw.base_array_layer),
        array_layer_count: optional(
            raw.has_array_layer_count,
            u32::from_le(raw.array_layer_count),
        ),
    })
}

/// A null pointer yields clamp-to-edge with linear filtering.
pub fn sampler_descriptor(
    memory: &MemoryView<'_>,
    ptr: u32,
) -> Result<SamplerDescriptor, BridgeError> {
    if ptr == 0 {
        return Ok(SamplerDescriptor::default());
    }
    let raw: RawSamplerDescriptor = memory.read_pod(ptr)?;
    Ok(SamplerDescriptor {
        address_mode: code(u32::from_le(raw.address_mode))?,
        mag_filter: code(u32::from_le(raw.mag_filter))?,
        min_filter: code(u32::from_le(raw.min_filter))?,
        mipmap_filter: code(u32::from_le(raw.mipmap_filter))?,
    })
}

pub fn bind_group_layout_entries(
    memory: &MemoryView<'_>,
    ptr: u32,
    count: u32,
) -> Result<Vec<LayoutEntry>, BridgeError> {
    memory
        .read_pod_array::<RawBindGroupLayoutEntry>(ptr, count)?
        .into_iter()
        .map(|raw| {
            let min_size = u64::from_le(raw.min_size);
            let layout = match code::<LayoutEntryType>(u32::from_le(raw.entry_type))? {
                LayoutEntryType::Buffer => BindingLayout::Buffer {
                    ty: code::<BufferBindingType>(u32::from_le(raw.buffer_type))?,
                    has_dynamic_offset: raw.has_dynamic_offset != 0,
                    min_binding_size: (raw.has_min_size != 0 && min_size != 0).then_some(min_size),
                },
                LayoutEntryType::Texture => BindingLayout::Texture,
                LayoutEntryType::Sampler => BindingLayout::Sampler,
            };
            Ok(LayoutEntry {
                binding: u32::from_le(raw.binding),
                visibility: u32::from_le(raw.visibility),
                layout,
            })
        })
        .collect()
}

pub fn bind_group_entries(
    memory: &MemoryView<'_>,
    ptr: u32,
    count: u32,
) -> Result<Vec<GroupEntry>, BridgeError> {
    memory
        .read_pod_array::<RawBindGroupEntry>(ptr, count)?
        .into_iter()
        .map(|raw| {
            let handle = u32::from_le(raw.resource_handle);
            let size = u64::from_le(raw.size);
            let resource = match code::<GroupEntryType>(u32::from_le(raw.entry_type))? {
                GroupEntryType::Buffer => GroupResource::Buffer {
                    handle,
                    offset: u64::from_le(raw.offset),
                    size: (size != 0).then_some(size),
                },
                GroupEntryType::TextureView => GroupResource::TextureView(handle),
                GroupEntryType::Sampler => GroupResource::Sampler(handle),
            };
            Ok(GroupEntry {
                binding: u32::from_le(raw.binding),
                resource,
            })
        })
        .collect()
}

pub fn handle_array(
    memory: &MemoryView<'_>,
    ptr: u32,
    count: u32,
) -> Result<Vec<Handle>, BridgeError> {
    memory.read_u32_array(ptr, count)
}
