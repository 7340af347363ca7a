use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gpubridge",
    about = "Run WASM guests against a native WebGPU and audio host",
    version
)]
pub struct Cli {
    /// Config file (defaults to ./gpubridge.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `gpubridge_host=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Instantiate a guest and drive its frame loop headlessly
    Run {
        /// Path to the guest module (.wasm or .wat)
        wasm: PathBuf,
        /// Stop after this many frames (0 runs until interrupted)
        #[arg(long)]
        frames: Option<u64>,
        /// Frame rate of the tick loop
        #[arg(long)]
        fps: Option<u32>,
        /// Report audio entry points as unsupported
        #[arg(long)]
        no_audio: bool,
        /// Image to load onto the guest's first device (PNG or PNM)
        #[arg(long)]
        texture: Option<PathBuf>,
    },
    /// Request an adapter and device and print what was found
    Probe,
    /// List a guest's host imports and callback exports
    Inspect {
        /// Path to the guest module (.wasm or .wat)
        wasm: PathBuf,
    },
}
