mod cli;
mod commands;
mod config;

use clap::Parser;

use cli::{Cli, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    match cli.command {
        Command::Run {
            wasm,
            frames,
            fps,
            no_audio,
            texture,
        } => {
            if let Some(frames) = frames {
                config.run.frames = frames;
            }
            if let Some(fps) = fps {
                config.run.fps = fps;
            }
            if no_audio {
                config.audio.enabled = false;
            }
            if texture.is_some() {
                config.run.texture = texture;
            }
            commands::run_cmd::run(&wasm, &config).await
        }
        Command::Probe => commands::probe_cmd::run(&config).await,
        Command::Inspect { wasm } => commands::inspect_cmd::run(&wasm, &config),
    }
}
