//! Symbol names on both sides of the boundary.

/// Import module every host function is registered under.
pub const IMPORT_MODULE: &str = "env";

/// Guest memory export read and written by the host.
pub const MEMORY_EXPORT: &str = "memory";

pub mod imports {
    pub const REQUEST_ADAPTER: &str = "request_adapter";
    pub const ADAPTER_REQUEST_DEVICE: &str = "adapter_request_device";
    pub const DEVICE_GET_QUEUE: &str = "device_get_queue";
    pub const GET_PREFERRED_FORMAT: &str = "get_preferred_format";

    pub const CREATE_BUFFER: &str = "create_buffer";
    pub const BUFFER_WRITE: &str = "buffer_write";
    pub const BUFFER_DESTROY: &str = "buffer_destroy";
    pub const COPY_BUFFER_TO_BUFFER: &str = "copy_buffer_to_buffer";
    pub const COPY_BUFFER_TO_BUFFER_IN_ENCODER: &str = "copy_buffer_to_buffer_in_encoder";

    pub const CREATE_SHADER_MODULE: &str = "create_shader_module";
    pub const CREATE_TEXTURE: &str = "create_texture";
    pub const TEXTURE_CREATE_VIEW: &str = "texture_create_view";
    pub const CREATE_SAMPLER: &str = "create_sampler";

    pub const CREATE_BIND_GROUP_LAYOUT: &str = "create_bind_group_layout";
    pub const CREATE_BIND_GROUP: &str = "create_bind_group";
    pub const CREATE_PIPELINE_LAYOUT: &str = "create_pipeline_layout";
    pub const CREATE_COMPUTE_PIPELINE: &str = "create_compute_pipeline";
    pub const CREATE_RENDER_PIPELINE: &str = "create_render_pipeline";

    pub const CREATE_COMMAND_ENCODER: &str = "create_command_encoder";
    pub const COMMAND_ENCODER_FINISH: &str = "command_encoder_finish";
    pub const QUEUE_SUBMIT: &str = "queue_submit";

    pub const BEGIN_COMPUTE_PASS: &str = "begin_compute_pass";
    pub const COMPUTE_PASS_SET_PIPELINE: &str = "compute_pass_set_pipeline";
    pub const COMPUTE_PASS_SET_BIND_GROUP: &str = "compute_pass_set_bind_group";
    pub const COMPUTE_PASS_SET_BIND_GROUP_WITH_OFFSET: &str =
        "compute_pass_set_bind_group_with_offset";
    pub const COMPUTE_PASS_DISPATCH: &str = "compute_pass_dispatch";
    pub const COMPUTE_PASS_END: &str = "compute_pass_end";

    pub const GET_CURRENT_TEXTURE_VIEW: &str = "get_current_texture_view";
    pub const BEGIN_RENDER_PASS: &str = "begin_render_pass";
    pub const RENDER_PASS_SET_PIPELINE: &str = "render_pass_set_pipeline";
    pub const RENDER_PASS_SET_BIND_GROUP: &str = "render_pass_set_bind_group";
    pub const RENDER_PASS_DRAW: &str = "render_pass_draw";
    pub const RENDER_PASS_END: &str = "render_pass_end";
    pub const PRESENT: &str = "present";

    pub const RELEASE_HANDLE: &str = "release_handle";

    pub const HAS_LAST_ERROR: &str = "has_last_error";
    pub const GET_LAST_ERROR_LENGTH: &str = "get_last_error_length";
    pub const COPY_LAST_ERROR: &str = "copy_last_error";

    pub const LOG_STRING: &str = "log_string";

    pub const CREATE_AUDIO_CONTEXT: &str = "create_audio_context";
    pub const DECODE_AUDIO_DATA: &str = "decode_audio_data";

    /// Every import the host provides.
    pub const ALL: &[&str] = &[
        REQUEST_ADAPTER,
        ADAPTER_REQUEST_DEVICE,
        DEVICE_GET_QUEUE,
        GET_PREFERRED_FORMAT,
        CREATE_BUFFER,
        BUFFER_WRITE,
        BUFFER_DESTROY,
        COPY_BUFFER_TO_BUFFER,
        COPY_BUFFER_TO_BUFFER_IN_ENCODER,
        CREATE_SHADER_MODULE,
        CREATE_TEXTURE,
        TEXTURE_CREATE_VIEW,
        CREATE_SAMPLER,
        CREATE_BIND_GROUP_LAYOUT,
        CREATE_BIND_GROUP,
        CREATE_PIPELINE_LAYOUT,
        CREATE_COMPUTE_PIPELINE,
        CREATE_RENDER_PIPELINE,
        CREATE_COMMAND_ENCODER,
        COMMAND_ENCODER_FINISH,
        QUEUE_SUBMIT,
        BEGIN_COMPUTE_PASS,
        COMPUTE_PASS_SET_PIPELINE,
        COMPUTE_PASS_SET_BIND_GROUP,
        COMPUTE_PASS_SET_BIND_GROUP_WITH_OFFSET,
        COMPUTE_PASS_DISPATCH,
        COMPUTE_PASS_END,
        GET_CURRENT_TEXTURE_VIEW,
        BEGIN_RENDER_PASS,
        RENDER_PASS_SET_PIPELINE,
        RENDER_PASS_SET_BIND_GROUP,
        RENDER_PASS_DRAW,
        RENDER_PASS_END,
        PRESENT,
        RELEASE_HANDLE,
        HAS_LAST_ERROR,
        GET_LAST_ERROR_LENGTH,
        COPY_LAST_ERROR,
        LOG_STRING,
        CREATE_AUDIO_CONTEXT,
        DECODE_AUDIO_DATA,
    ];
}

/// Functions the guest exports for the host to call back into.
pub mod exports {
    pub const RECEIVE_ADAPTER: &str = "receive_adapter";
    pub const RECEIVE_DEVICE: &str = "receive_device";
    pub const ON_AUDIO_BUFFER_DECODED: &str = "on_audio_buffer_decoded";
    pub const ON_DECODE_ERROR: &str = "on_decode_error";
    /// `(texture, view, status)` for a host-initiated texture load.
    pub const ON_TEXTURE_LOADED: &str = "on_texture_loaded";

    pub const ON_MOUSE_MOVE: &str = "on_mouse_move";
    pub const ON_MOUSE_BUTTON: &str = "on_mouse_button";
    pub const ON_MOUSE_WHEEL: &str = "on_mouse_wheel";
    pub const ON_KEY_EVENT: &str = "on_key_event";

    /// Async-bridge callbacks; must exist before the matching request is made.
    pub const CALLBACKS: &[&str] = &[
        RECEIVE_ADAPTER,
        RECEIVE_DEVICE,
        ON_AUDIO_BUFFER_DECODED,
        ON_DECODE_ERROR,
        ON_TEXTURE_LOADED,
    ];

    pub const INPUT: &[&str] = &[ON_MOUSE_MOVE, ON_MOUSE_BUTTON, ON_MOUSE_WHEEL, ON_KEY_EVENT];
}
