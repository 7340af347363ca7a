//! Numeric enum codes carried inside descriptors and call arguments.
//!
//! Usage and visibility flags are passed through unchanged; their bit values
//! are those of the WebGPU specification and are listed here for guests.

wire_enum! {
    pub enum TextureFormat {
        Rgba16Float = 0,
        Rgba32Float = 1,
        Bgra8Unorm = 2,
        Rgba8Unorm = 3,
        Rgba8UnormSrgb = 4,
        Depth24Plus = 5,
        Depth32Float = 6,
        Bgra8UnormSrgb = 7,
        R32Float = 8,
        R8Unorm = 9,
    }
}

wire_enum! {
    pub enum TextureDimension {
        D1 = 0,
        D2 = 1,
        D3 = 2,
    }
}

wire_enum! {
    pub enum ViewDimension {
        D1 = 0,
        D2 = 1,
        D2Array = 2,
        Cube = 3,
        CubeArray = 4,
        D3 = 5,
    }
}

wire_enum! {
    /// `entry_type` of a bind group layout entry.
    pub enum LayoutEntryType {
        Buffer = 0,
        Texture = 1,
        Sampler = 2,
    }
}

wire_enum! {
    pub enum BufferBindingType {
        Uniform = 0,
        Storage = 1,
        ReadOnlyStorage = 2,
    }
}

wire_enum! {
    /// `entry_type` of a bind group entry; selects the registry that
    /// `resource_handle` is resolved against.
    pub enum GroupEntryType {
        Buffer = 0,
        TextureView = 1,
        Sampler = 2,
    }
}

wire_enum! {
    /// Colour blending of the single render pipeline target.
    pub enum BlendMode {
        /// No blending; the fragment output overwrites the target.
        Replace = 0,
        /// `src-alpha / one-minus-src-alpha`, alpha `one / one-minus-src-alpha`.
        Alpha = 1,
        /// `src-alpha / one`, alpha `one / one`.
        Additive = 2,
    }
}

wire_enum! {
    pub enum AddressMode {
        ClampToEdge = 0,
        Repeat = 1,
        MirrorRepeat = 2,
    }
}

wire_enum! {
    pub enum FilterMode {
        Nearest = 0,
        Linear = 1,
    }
}

/// `GPUBufferUsage` bits.
pub mod buffer_usage {
    pub const MAP_READ: u32 = 0x0001;
    pub const MAP_WRITE: u32 = 0x0002;
    pub const COPY_SRC: u32 = 0x0004;
    pub const COPY_DST: u32 = 0x0008;
    pub const INDEX: u32 = 0x0010;
    pub const VERTEX: u32 = 0x0020;
    pub const UNIFORM: u32 = 0x0040;
    pub const STORAGE: u32 = 0x0080;
    pub const INDIRECT: u32 = 0x0100;
    pub const QUERY_RESOLVE: u32 = 0x0200;
}

/// `GPUTextureUsage` bits.
pub mod texture_usage {
    pub const COPY_SRC: u32 = 0x01;
    pub const COPY_DST: u32 = 0x02;
    pub const TEXTURE_BINDING: u32 = 0x04;
    pub const STORAGE_BINDING: u32 = 0x08;
    pub const RENDER_ATTACHMENT: u32 = 0x10;
}

/// `GPUShaderStage` bits, used for bind group layout visibility.
pub mod shader_stage {
    pub const VERTEX: u32 = 0x1;
    pub const FRAGMENT: u32 = 0x2;
    pub const COMPUTE: u32 = 0x4;
}
