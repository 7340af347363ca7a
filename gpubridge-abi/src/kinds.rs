use std::fmt;

wire_enum! {
    /// Resource kinds as numbered by `release_handle(type_id, handle)`.
    ///
    /// Handles are not tagged with their kind; the guest must always pair a
    /// handle with the entry point (or this id) that implies it.
    pub enum ResourceKind {
        Adapter = 2,
        Device = 3,
        Queue = 4,
        Buffer = 5,
        ShaderModule = 6,
        Texture = 7,
        TextureView = 8,
        Sampler = 9,
        BindGroupLayout = 10,
        BindGroup = 11,
        PipelineLayout = 12,
        Pipeline = 13,
        CommandEncoder = 14,
        Pass = 15,
        CommandBuffer = 16,
        AudioContext = 17,
        AudioBuffer = 18,
    }
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Adapter => "adapter",
            Self::Device => "device",
            Self::Queue => "queue",
            Self::Buffer => "buffer",
            Self::ShaderModule => "shader module",
            Self::Texture => "texture",
            Self::TextureView => "texture view",
            Self::Sampler => "sampler",
            Self::BindGroupLayout => "bind group layout",
            Self::BindGroup => "bind group",
            Self::PipelineLayout => "pipeline layout",
            Self::Pipeline => "pipeline",
            Self::CommandEncoder => "command encoder",
            Self::Pass => "pass",
            Self::CommandBuffer => "command buffer",
            Self::AudioContext => "audio context",
            Self::AudioBuffer => "audio buffer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

wire_enum! {
    /// Status argument of `receive_adapter` / `receive_device`.
    pub enum CallbackStatus {
        Ok = 0,
        /// The host operation was attempted and rejected.
        Failed = 1,
        /// The capability is missing from this host entirely.
        Unsupported = 2,
    }
}
