//! Configuration for composers and the wgpu renderer.
//!
//! Both structs deserialize with defaults for every missing field, so a partial
//! JSON document is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::render_target::RenderTargetOptions;

/// Configuration for a [`Composer`](crate::Composer)'s ping-pong buffers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComposerConfig {
    /// Initial buffer width in pixels.
    pub width: u32,
    /// Initial buffer height in pixels.
    pub height: u32,
    /// Allocation options shared by both buffers.
    pub target_options: RenderTargetOptions,
    /// Label prefix for the buffers (`"<label> A"`, `"<label> B"`).
    pub label: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            target_options: RenderTargetOptions::default(),
            label: "Composer".to_string(),
        }
    }
}

impl ComposerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn target_options(mut self, options: RenderTargetOptions) -> Self {
        self.target_options = options;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Configuration for [`WgpuRenderer`](crate::WgpuRenderer) and its GPU context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    /// Wait for vertical blank when presenting (`Fifo`), otherwise present immediately
    /// when the platform allows it.
    pub vsync: bool,
    /// Pick an sRGB surface format when one is available.
    pub prefer_srgb: bool,
    /// Size of the offscreen "screen" used by headless renderers.
    pub headless_width: u32,
    pub headless_height: u32,
    /// Device label, visible in GPU debuggers.
    pub label: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            prefer_srgb: true,
            headless_width: 800,
            headless_height: 600,
            label: "Afterglow Device".to_string(),
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn prefer_srgb(mut self, prefer_srgb: bool) -> Self {
        self.prefer_srgb = prefer_srgb;
        self
    }

    pub fn headless_size(mut self, width: u32, height: u32) -> Self {
        self.headless_width = width;
        self.headless_height = height;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}
