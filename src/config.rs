// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Device, swapchain and debug settings for applications built on this crate.
// Every field has a default, so a missing file or a partial file both work.

use crate::backend::ShadingRateMode;
use crate::device::{DeviceCreateInfo, DEFAULT_RESOURCE_DESCRIPTOR_COUNT, DEFAULT_SAMPLER_DESCRIPTOR_COUNT};
use crate::handle::Handle;
use crate::objects::{Queue, Surface};
use crate::swapchain::{PresentMode, SwapchainCreateInfo};
use crate::types::Format;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub swapchain: SwapchainConfig,
    pub debug: DebugConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Vulkan,
    Null,
}

/// Device settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: BackendKind,
    pub adapter_index: usize,
    pub graphics_queues: u32,
    pub compute_queues: u32,
    pub transfer_queues: u32,
    pub validation_layers: bool,
    pub multi_view: bool,
    pub shading_rate_mode: ShadingRateMode,
    pub resource_descriptor_count: u32,
    pub sampler_descriptor_count: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Vulkan,
            adapter_index: 0,
            graphics_queues: 1,
            compute_queues: 0,
            transfer_queues: 0,
            validation_layers: cfg!(debug_assertions),
            multi_view: false,
            shading_rate_mode: ShadingRateMode::None,
            resource_descriptor_count: DEFAULT_RESOURCE_DESCRIPTOR_COUNT,
            sampler_descriptor_count: DEFAULT_SAMPLER_DESCRIPTOR_COUNT,
        }
    }
}

/// Swapchain settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SwapchainConfig {
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub color_format: Format,
    pub depth_format: Format,
    pub present_mode: PresentMode,
    pub headless: bool,
    /// Indirect render target size; `[0, 0]` renders straight to the surface.
    pub render_size: [u32; 2],
    pub absorb_errors: bool,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            image_count: 3,
            color_format: Format::B8G8R8A8Unorm,
            depth_format: Format::Undefined,
            present_mode: PresentMode::Fifo,
            headless: false,
            render_size: [0, 0],
            absorb_errors: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    /// Frames the demo renders before exiting; 0 runs until the window closes.
    pub frame_limit: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frame_limit: 0,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn device_create_info(&self) -> DeviceCreateInfo {
        DeviceCreateInfo {
            adapter_index: self.device.adapter_index,
            graphics_queue_count: self.device.graphics_queues,
            compute_queue_count: self.device.compute_queues,
            transfer_queue_count: self.device.transfer_queues,
            multi_view: self.device.multi_view,
            shading_rate_mode: self.device.shading_rate_mode,
            extensions: Vec::new(),
        }
    }

    /// Swapchain settings for `queue`. A surface is only attached when the
    /// configuration is not headless.
    pub fn swapchain_create_info(&self, queue: Handle<Queue>, surface: Option<Handle<Surface>>) -> SwapchainCreateInfo {
        SwapchainCreateInfo {
            queue,
            surface: if self.swapchain.headless { None } else { surface },
            xr_session: None,
            width: self.swapchain.width,
            height: self.swapchain.height,
            color_format: self.swapchain.color_format,
            depth_format: self.swapchain.depth_format,
            image_count: self.swapchain.image_count,
            present_mode: self.swapchain.present_mode,
        }
    }

    /// Indirect render size, if one is configured.
    pub fn render_size(&self) -> Option<(u32, u32)> {
        match self.swapchain.render_size {
            [0, _] | [_, 0] => None,
            [width, height] => Some((width, height)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.device.backend, BackendKind::Vulkan);
        assert_eq!(config.swapchain.image_count, 3);
        assert!(config.swapchain.absorb_errors);
        assert_eq!(config.render_size(), None);
        assert_eq!(config.device_create_info().graphics_queue_count, 1);
    }

    #[test]
    fn parses_every_section() {
        let config = Config::from_toml(
            r#"
            [device]
            backend = "null"
            compute_queues = 2
            shading_rate_mode = "vrs"

            [swapchain]
            width = 800
            height = 600
            color_format = "r8g8b8a8_srgb"
            depth_format = "d32_sfloat"
            present_mode = "mailbox"
            headless = true
            render_size = [400, 300]

            [debug]
            log_level = "trace"
            frame_limit = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.device.backend, BackendKind::Null);
        assert_eq!(config.device_create_info().compute_queue_count, 2);
        assert_eq!(config.device_create_info().shading_rate_mode, ShadingRateMode::Vrs);
        assert_eq!(config.swapchain.color_format, Format::R8G8B8A8Srgb);
        assert_eq!(config.swapchain.present_mode, PresentMode::Mailbox);
        assert_eq!(config.render_size(), Some((400, 300)));
        assert_eq!(config.debug.frame_limit, 10);

        let info = config.swapchain_create_info(Handle::null(), Some(Handle::null()));
        assert!(info.surface.is_none());
        assert_eq!((info.width, info.height, info.depth_format), (800, 600, Format::D32Float));
    }

    #[test]
    fn unknown_values_are_errors() {
        assert!(Config::from_toml("[device]\nbackend = \"metal\"").is_err());
        assert!(Config::from_toml("[swapchain]\npresent_mode = 3").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.swapchain.width, 1280);
    }
}
