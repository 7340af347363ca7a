use std::path::{Path, PathBuf};

use gpubridge_host::WgpuOptions;
use serde::{Deserialize, Serialize};

/// Looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "gpubridge.toml";

/// Configuration read from gpubridge.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub gpu: GpuConfig,
    pub run: RunConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// "high-performance", "low-power" or "none"
    pub power_preference: String,
    /// "primary", "all", "vulkan", "metal", "dx12" or "gl"
    pub backends: String,
    pub frame_width: u32,
    pub frame_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 0 runs until interrupted.
    pub frames: u64,
    pub fps: u32,
    pub init_export: String,
    pub frame_export: String,
    /// Delivered through `on_texture_loaded` once the guest has a device.
    pub texture: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            gpu: GpuConfig::default(),
            run: RunConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        let options = WgpuOptions::default();
        Self {
            power_preference: "high-performance".into(),
            backends: "primary".into(),
            frame_width: options.frame_width,
            frame_height: options.frame_height,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: 0,
            fps: 60,
            init_export: "init".into(),
            frame_export: "frame".into(),
            texture: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl GpuConfig {
    pub fn wgpu_options(&self) -> anyhow::Result<WgpuOptions> {
        let power_preference = match self.power_preference.to_lowercase().as_str() {
            "high-performance" | "high" => wgpu::PowerPreference::HighPerformance,
            "low-power" | "low" => wgpu::PowerPreference::LowPower,
            "none" => wgpu::PowerPreference::None,
            other => anyhow::bail!(
                "Unknown power preference: {other}. Options: high-performance, low-power, none"
            ),
        };
        let backends = match self.backends.to_lowercase().as_str() {
            "primary" => wgpu::Backends::PRIMARY,
            "all" => wgpu::Backends::all(),
            "vulkan" | "vk" => wgpu::Backends::VULKAN,
            "metal" => wgpu::Backends::METAL,
            "dx12" => wgpu::Backends::DX12,
            "gl" | "opengl" => wgpu::Backends::GL,
            other => anyhow::bail!(
                "Unknown backend: {other}. Options: primary, all, vulkan, metal, dx12, gl"
            ),
        };
        if self.frame_width == 0 || self.frame_height == 0 {
            anyhow::bail!(
                "frame size must be non-zero (got {}x{})",
                self.frame_width,
                self.frame_height
            );
        }
        Ok(WgpuOptions {
            backends,
            power_preference,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
        })
    }
}

/// Load `path`, or ./gpubridge.toml if present, or the defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => load_from(path),
        None if Path::new(CONFIG_FILE).exists() => load_from(Path::new(CONFIG_FILE)),
        None => Ok(Config::default()),
    }
}

pub fn load_from(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Could not read {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
    Ok(config)
}
