use std::path::Path;
use std::time::{Duration, Instant};

use gpubridge_abi::Handle;
use gpubridge_host::{add_to_linker, pump, AudioBackend, Host, NullAudio, WavAudio, WgpuBackend};
use tokio::time::MissedTickBehavior;
use wasmtime::{Engine, Instance, Linker, Module, Store, TypedFunc};

use crate::config::{Config, RunConfig};

pub async fn run(wasm: &Path, config: &Config) -> anyhow::Result<()> {
    let gpu = WgpuBackend::new(config.gpu.wgpu_options()?);
    if config.audio.enabled {
        drive(wasm, Host::new(gpu, WavAudio), &config.run).await
    } else {
        drive(wasm, Host::new(gpu, NullAudio), &config.run).await
    }
}

async fn drive<A: AudioBackend>(
    wasm: &Path,
    host: Host<WgpuBackend, A>,
    run: &RunConfig,
) -> anyhow::Result<()> {
    let engine = Engine::default();
    let module = Module::from_file(&engine, wasm)
        .map_err(|e| anyhow::anyhow!("Could not load {}: {e:#}", wasm.display()))?;
    let mut linker = Linker::new(&engine);
    add_to_linker(&mut linker)?;
    let mut store = Store::new(&engine, host);
    let instance = linker.instantiate(&mut store, &module)?;

    match export::<_, (), ()>(&mut store, &instance, &run.init_export)? {
        Some(init) => init.call(&mut store, ())?,
        None => log::warn!("guest has no `{}` export; skipping init", run.init_export),
    }
    let frame = export::<_, f64, ()>(&mut store, &instance, &run.frame_export)?;
    let mut texture = match &run.texture {
        Some(path) => Some(
            std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Could not read {}: {e}", path.display()))?,
        ),
        None => None,
    };
    if frame.is_none() {
        log::warn!("guest has no `{}` export; only pumping callbacks", run.frame_export);
    }

    println!(
        "Running {} at {} fps{}",
        wasm.display(),
        run.fps,
        if run.frames == 0 {
            String::new()
        } else {
            format!(" for {} frames", run.frames)
        }
    );

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / run.fps.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let started = Instant::now();
    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut interrupt => {
                log::info!("interrupted");
                break;
            }
        }

        let delivered = pump(&mut store, &instance);
        if delivered > 0 {
            log::debug!("delivered {delivered} callbacks");
        }
        if let Some(frame) = &frame {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            frame.call(&mut store, elapsed_ms)?;
        }
        // handed over at the end of a tick so it settles on the next pump
        if let Some(device) = first_device(store.data()) {
            if let Some(encoded) = texture.take() {
                log::info!("loading texture onto device {device}");
                store.data_mut().load_texture(device, encoded);
            }
        }

        ticks += 1;
        if run.frames != 0 && ticks >= run.frames {
            break;
        }
    }

    let host = store.data();
    println!(
        "{ticks} ticks, {} frames presented, {} requests still pending",
        host.gpu().frames_presented(),
        host.pending_requests()
    );
    if let Some(message) = host.last_error() {
        log::warn!("unread guest error: {message}");
    }
    Ok(())
}

fn first_device<A: AudioBackend>(host: &Host<WgpuBackend, A>) -> Option<Handle> {
    host.objects().devices.iter().next().map(|(handle, _)| handle)
}

fn export<T: 'static, P, R>(
    store: &mut Store<T>,
    instance: &Instance,
    name: &str,
) -> anyhow::Result<Option<TypedFunc<P, R>>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    match instance.get_func(&mut *store, name) {
        Some(func) => Ok(Some(func.typed::<P, R>(&*store)?)),
        None => Ok(None),
    }
}
