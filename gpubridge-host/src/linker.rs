//! wasmtime glue: host imports under `env` and dynamic calls into guest exports.
//!
//! Every import closure builds a fresh [`MemoryView`] from the caller's
//! `memory` export, so a view never outlives a single call and always sees
//! the current size after `memory.grow`.

use gpubridge_abi::names::{imports, IMPORT_MODULE, MEMORY_EXPORT};
use wasmtime::{AsContextMut, Caller, Extern, Instance, Linker, Store, Val};

use crate::async_bridge::{deliver, CallOutcome, GuestExports, GuestValue};
use crate::audio::AudioBackend;
use crate::backend::GpuBackend;
use crate::error::GuestCallError;
use crate::host::Host;
use crate::memory::{MemoryView, MemoryViewMut};

/// Run `f` with the host and the caller's linear memory borrowed together.
/// A guest without a memory export sees an empty one.
fn with_memory<G, A, R>(
    caller: &mut Caller<'_, Host<G, A>>,
    f: impl FnOnce(&mut Host<G, A>, &mut [u8]) -> R,
) -> R
where
    G: GpuBackend,
    A: AudioBackend,
{
    match caller.get_export(MEMORY_EXPORT).and_then(Extern::into_memory) {
        Some(memory) => {
            let (data, host) = memory.data_and_store_mut(caller);
            f(host, data)
        }
        None => f(caller.data_mut(), &mut []),
    }
}

/// Register every host import on `linker`.
pub fn add_to_linker<G, A>(linker: &mut Linker<Host<G, A>>) -> wasmtime::Result<()>
where
    G: GpuBackend,
    A: AudioBackend,
{
    type C<'a, Gpu, Audio> = Caller<'a, Host<Gpu, Audio>>;

    // ============================================================
    // Adapter, device, queue
    // ============================================================

    linker.func_wrap(IMPORT_MODULE, imports::REQUEST_ADAPTER, |mut caller: C<'_, G, A>| {
        caller.data_mut().request_adapter()
    })?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::ADAPTER_REQUEST_DEVICE,
        |mut caller: C<'_, G, A>, adapter: u32| caller.data_mut().adapter_request_device(adapter),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::DEVICE_GET_QUEUE,
        |mut caller: C<'_, G, A>, device: u32| -> u32 { caller.data_mut().device_get_queue(device) },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::GET_PREFERRED_FORMAT,
        |caller: C<'_, G, A>| -> u32 { caller.data().get_preferred_format() },
    )?;

    // ============================================================
    // Buffers
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_BUFFER,
        |mut caller: C<'_, G, A>, device: u32, desc_ptr: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_buffer(MemoryView::new(mem), device, desc_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::BUFFER_WRITE,
        |mut caller: C<'_, G, A>, device: u32, buffer: u32, offset: u64, data_ptr: u32, data_len: u32| {
            with_memory(&mut caller, |host, mem| {
                host.buffer_write(MemoryView::new(mem), device, buffer, offset, data_ptr, data_len)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::BUFFER_DESTROY,
        |mut caller: C<'_, G, A>, buffer: u32| caller.data_mut().buffer_destroy(buffer),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COPY_BUFFER_TO_BUFFER,
        |mut caller: C<'_, G, A>, device: u32, src: u32, src_offset: u64, dst: u32, dst_offset: u64, size: u64| {
            caller
                .data_mut()
                .copy_buffer_to_buffer(device, src, src_offset, dst, dst_offset, size)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COPY_BUFFER_TO_BUFFER_IN_ENCODER,
        |mut caller: C<'_, G, A>, encoder: u32, src: u32, src_offset: u64, dst: u32, dst_offset: u64, size: u64| {
            caller
                .data_mut()
                .copy_buffer_to_buffer_in_encoder(encoder, src, src_offset, dst, dst_offset, size)
        },
    )?;

    // ============================================================
    // Shaders, textures, samplers
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_SHADER_MODULE,
        |mut caller: C<'_, G, A>, device: u32, src_ptr: u32, src_len: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_shader_module(MemoryView::new(mem), device, src_ptr, src_len)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_TEXTURE,
        |mut caller: C<'_, G, A>, device: u32, desc_ptr: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_texture(MemoryView::new(mem), device, desc_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::TEXTURE_CREATE_VIEW,
        |mut caller: C<'_, G, A>, texture: u32, desc_ptr: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.texture_create_view(MemoryView::new(mem), texture, desc_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_SAMPLER,
        |mut caller: C<'_, G, A>, device: u32, desc_ptr: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_sampler(MemoryView::new(mem), device, desc_ptr)
            })
        },
    )?;

    // ============================================================
    // Bind groups and pipelines
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_BIND_GROUP_LAYOUT,
        |mut caller: C<'_, G, A>, device: u32, entries_ptr: u32, count: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_bind_group_layout(MemoryView::new(mem), device, entries_ptr, count)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_BIND_GROUP,
        |mut caller: C<'_, G, A>, device: u32, layout: u32, entries_ptr: u32, count: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_bind_group(MemoryView::new(mem), device, layout, entries_ptr, count)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_PIPELINE_LAYOUT,
        |mut caller: C<'_, G, A>, device: u32, layouts_ptr: u32, count: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_pipeline_layout(MemoryView::new(mem), device, layouts_ptr, count)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_COMPUTE_PIPELINE,
        |mut caller: C<'_, G, A>, device: u32, layout: u32, shader: u32, entry_ptr: u32, entry_len: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_compute_pipeline(MemoryView::new(mem), device, layout, shader, entry_ptr, entry_len)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_RENDER_PIPELINE,
        |mut caller: C<'_, G, A>,
         device: u32,
         layout: u32,
         shader: u32,
         vs_ptr: u32,
         vs_len: u32,
         fs_ptr: u32,
         fs_len: u32,
         target_format: u32,
         blend_mode: u32|
         -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.create_render_pipeline(
                    MemoryView::new(mem),
                    device,
                    layout,
                    shader,
                    (vs_ptr, vs_len),
                    (fs_ptr, fs_len),
                    target_format,
                    blend_mode,
                )
            })
        },
    )?;

    // ============================================================
    // Encoders and submission
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_COMMAND_ENCODER,
        |mut caller: C<'_, G, A>, device: u32| -> u32 { caller.data_mut().create_command_encoder(device) },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COMMAND_ENCODER_FINISH,
        |mut caller: C<'_, G, A>, encoder: u32| -> u32 { caller.data_mut().command_encoder_finish(encoder) },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::QUEUE_SUBMIT,
        |mut caller: C<'_, G, A>, device: u32, command_buffer: u32| {
            caller.data_mut().queue_submit(device, command_buffer)
        },
    )?;

    // ============================================================
    // Compute passes
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::BEGIN_COMPUTE_PASS,
        |mut caller: C<'_, G, A>, encoder: u32| -> u32 { caller.data_mut().begin_compute_pass(encoder) },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COMPUTE_PASS_SET_PIPELINE,
        |mut caller: C<'_, G, A>, pass: u32, pipeline: u32| {
            caller.data_mut().compute_pass_set_pipeline(pass, pipeline)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COMPUTE_PASS_SET_BIND_GROUP,
        |mut caller: C<'_, G, A>, pass: u32, index: u32, bind_group: u32| {
            caller.data_mut().compute_pass_set_bind_group(pass, index, bind_group)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COMPUTE_PASS_SET_BIND_GROUP_WITH_OFFSET,
        |mut caller: C<'_, G, A>, pass: u32, index: u32, bind_group: u32, offset: u32| {
            caller
                .data_mut()
                .compute_pass_set_bind_group_with_offset(pass, index, bind_group, offset)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COMPUTE_PASS_DISPATCH,
        |mut caller: C<'_, G, A>, pass: u32, x: u32, y: u32, z: u32| {
            caller.data_mut().compute_pass_dispatch(pass, x, y, z)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COMPUTE_PASS_END,
        |mut caller: C<'_, G, A>, pass: u32| caller.data_mut().compute_pass_end(pass),
    )?;

    // ============================================================
    // Render passes and frames
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::GET_CURRENT_TEXTURE_VIEW,
        |mut caller: C<'_, G, A>, device: u32| -> u32 { caller.data_mut().get_current_texture_view(device) },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::BEGIN_RENDER_PASS,
        |mut caller: C<'_, G, A>, encoder: u32, view: u32, r: f64, g: f64, b: f64, a: f64| -> u32 {
            caller.data_mut().begin_render_pass(encoder, view, r, g, b, a)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::RENDER_PASS_SET_PIPELINE,
        |mut caller: C<'_, G, A>, pass: u32, pipeline: u32| {
            caller.data_mut().render_pass_set_pipeline(pass, pipeline)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::RENDER_PASS_SET_BIND_GROUP,
        |mut caller: C<'_, G, A>, pass: u32, index: u32, bind_group: u32| {
            caller.data_mut().render_pass_set_bind_group(pass, index, bind_group)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::RENDER_PASS_DRAW,
        |mut caller: C<'_, G, A>, pass: u32, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32| {
            caller
                .data_mut()
                .render_pass_draw(pass, vertex_count, instance_count, first_vertex, first_instance)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::RENDER_PASS_END,
        |mut caller: C<'_, G, A>, pass: u32| caller.data_mut().render_pass_end(pass),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::PRESENT,
        |mut caller: C<'_, G, A>, device: u32| caller.data_mut().present(device),
    )?;

    // ============================================================
    // Handles, errors, logging
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::RELEASE_HANDLE,
        |mut caller: C<'_, G, A>, type_id: u32, handle: u32| {
            caller.data_mut().release_handle(type_id, handle)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::HAS_LAST_ERROR,
        |caller: C<'_, G, A>| -> u32 { caller.data().has_last_error() },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::GET_LAST_ERROR_LENGTH,
        |caller: C<'_, G, A>| -> u32 { caller.data().get_last_error_length() },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::COPY_LAST_ERROR,
        |mut caller: C<'_, G, A>, dest_ptr: u32, dest_len: u32| -> u32 {
            with_memory(&mut caller, |host, mem| {
                host.copy_last_error(MemoryViewMut::new(mem), dest_ptr, dest_len)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::LOG_STRING,
        |mut caller: C<'_, G, A>, ptr: u32, len: u32| {
            with_memory(&mut caller, |host, mem| host.log_string(MemoryView::new(mem), ptr, len))
        },
    )?;

    // ============================================================
    // Audio
    // ============================================================

    linker.func_wrap(
        IMPORT_MODULE,
        imports::CREATE_AUDIO_CONTEXT,
        |mut caller: C<'_, G, A>| -> u32 { caller.data_mut().create_audio_context() },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        imports::DECODE_AUDIO_DATA,
        |mut caller: C<'_, G, A>, context: u32, ptr: u32, len: u32, request_id: u32| {
            with_memory(&mut caller, |host, mem| {
                host.decode_audio_data(MemoryView::new(mem), context, ptr, len, request_id)
            })
        },
    )?;

    Ok(())
}

/// A wasmtime instance seen through [`GuestExports`].
pub struct WasmtimeGuest<S> {
    store: S,
    instance: Instance,
}

impl<S: AsContextMut> WasmtimeGuest<S> {
    pub fn new(store: S, instance: Instance) -> Self {
        Self { store, instance }
    }
}

impl<S: AsContextMut> GuestExports for WasmtimeGuest<S> {
    fn call(&mut self, export: &str, args: &[GuestValue]) -> Result<CallOutcome, GuestCallError> {
        let Some(func) = self.instance.get_func(&mut self.store, export) else {
            return Ok(CallOutcome::Missing);
        };
        let params: Vec<Val> = args
            .iter()
            .map(|arg| match *arg {
                GuestValue::I32(v) => Val::I32(v as i32),
                GuestValue::F32(v) => Val::F32(v.to_bits()),
                GuestValue::F64(v) => Val::F64(v.to_bits()),
            })
            .collect();
        let result_count = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_count];
        func.call(&mut self.store, &params, &mut results)
            .map_err(|err| GuestCallError {
                export: export.to_string(),
                message: format!("{err:#}"),
            })?;
        Ok(CallOutcome::Called)
    }
}

/// Deliver every ready async result into the guest. Returns how many
/// callbacks ran; results for missing exports wait for a later pump.
pub fn pump<G, A>(store: &mut Store<Host<G, A>>, instance: &Instance) -> usize
where
    G: GpuBackend,
    A: AudioBackend,
{
    let ready = store.data_mut().take_ready();
    if ready.is_empty() {
        return 0;
    }
    let delivery = deliver(&mut WasmtimeGuest::new(&mut *store, *instance), ready);
    store.data_mut().defer(delivery.undelivered);
    delivery.delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudio;
    use crate::mock::{init_logging, MockGpu};
    use wasmtime::{Engine, Module};

    const GUEST: &str = r#"
        (module
          (import "env" "request_adapter" (func $request_adapter))
          (import "env" "buffer_destroy" (func $buffer_destroy (param i32)))
          (import "env" "copy_last_error" (func $copy_last_error (param i32 i32) (result i32)))
          (import "env" "log_string" (func $log (param i32 i32)))
          (memory (export "memory") 1)
          (data (i32.const 16) "hello")
          (global $adapter (export "adapter") (mut i32) (i32.const 0))
          (global $status (export "status") (mut i32) (i32.const -1))
          (func (export "start")
            call $request_adapter
            i32.const 16
            i32.const 5
            call $log)
          (func (export "fail") (result i32)
            i32.const 99
            call $buffer_destroy
            i32.const 64
            i32.const 256
            call $copy_last_error)
          (func (export "receive_adapter") (param i32 i32)
            local.get 0
            global.set $adapter
            local.get 1
            global.set $status))
    "#;

    fn instantiate(wat: &str) -> (Store<Host<MockGpu, NullAudio>>, Instance) {
        init_logging();
        let engine = Engine::default();
        let mut linker = Linker::new(&engine);
        add_to_linker(&mut linker).unwrap();
        let module = Module::new(&engine, wat).unwrap();
        let mut store = Store::new(&engine, Host::new(MockGpu::default(), NullAudio));
        let instance = linker.instantiate(&mut store, &module).unwrap();
        (store, instance)
    }

    fn global(store: &mut Store<Host<MockGpu, NullAudio>>, instance: &Instance, name: &str) -> i32 {
        instance
            .get_global(&mut *store, name)
            .and_then(|g| g.get(&mut *store).i32())
            .unwrap()
    }

    #[test]
    fn test_every_import_is_registered() {
        let engine = Engine::default();
        let mut linker = Linker::new(&engine);
        add_to_linker::<MockGpu, NullAudio>(&mut linker).unwrap();
        let mut store = Store::new(&engine, Host::new(MockGpu::default(), NullAudio));
        for name in imports::ALL {
            assert!(
                linker.get(&mut store, IMPORT_MODULE, name).is_some(),
                "{name} not registered"
            );
        }
    }

    #[test]
    fn test_adapter_arrives_on_pump() {
        let (mut store, instance) = instantiate(GUEST);
        let start = instance.get_typed_func::<(), ()>(&mut store, "start").unwrap();
        start.call(&mut store, ()).unwrap();

        assert_eq!(global(&mut store, &instance, "status"), -1);
        assert_eq!(pump(&mut store, &instance), 1);
        assert_eq!(global(&mut store, &instance, "adapter"), 1);
        assert_eq!(global(&mut store, &instance, "status"), 0);
        assert_eq!(pump(&mut store, &instance), 0);
    }

    #[test]
    fn test_error_copied_into_guest_memory() {
        let (mut store, instance) = instantiate(GUEST);
        let fail = instance.get_typed_func::<(), i32>(&mut store, "fail").unwrap();
        let written = fail.call(&mut store, ()).unwrap() as usize;

        let memory = instance.get_memory(&mut store, "memory").unwrap();
        let message = std::str::from_utf8(&memory.data(&store)[64..64 + written])
            .unwrap()
            .to_string();
        assert!(message.starts_with("buffer_destroy: "), "{message}");
        assert!(message.contains("99"));
        assert!(store.data().last_error().is_none());
    }

    #[test]
    fn test_guest_without_memory() {
        let (mut store, instance) = instantiate(
            r#"
            (module
              (import "env" "log_string" (func $log (param i32 i32)))
              (import "env" "has_last_error" (func $has_last_error (result i32)))
              (func (export "run") (result i32)
                i32.const 0
                i32.const 4
                call $log
                call $has_last_error))
            "#,
        );
        let run = instance.get_typed_func::<(), i32>(&mut store, "run").unwrap();
        assert_eq!(run.call(&mut store, ()).unwrap(), 0);
    }

    #[test]
    fn test_missing_callback_waits_in_outbox() {
        let (mut store, instance) = instantiate(
            r#"
            (module
              (import "env" "request_adapter" (func $request_adapter))
              (func (export "start") call $request_adapter))
            "#,
        );
        let start = instance.get_typed_func::<(), ()>(&mut store, "start").unwrap();
        start.call(&mut store, ()).unwrap();
        assert_eq!(pump(&mut store, &instance), 0);
        assert_eq!(store.data_mut().take_ready().len(), 1);
    }
}
