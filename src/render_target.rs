//! Off-screen render targets shared between the composer, passes, and renderers.
//!
//! A [`RenderTarget`] is a lightweight handle: it carries a unique [`TargetId`],
//! the current pixel size, and the allocation options. The GPU storage behind it
//! is owned by the [`Renderer`] and keyed by the id, so a target can be resized
//! or handed to a headless renderer without touching any device.
//!
//! Renderers (re)allocate storage lazily: the first time a target is drawn to or
//! sampled at a given size, the backing texture is created to match. This mirrors
//! the ensure-size pattern used for the ping-pong buffers of a render graph.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::renderer::Renderer;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a render target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, useful for labels and logs.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Texture filtering used when a target is sampled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Color storage format of a target.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetFormat {
    /// 8 bits per channel RGBA.
    #[default]
    Rgba8,
    /// 16-bit float RGBA, for HDR intermediates.
    Rgba16Float,
}

/// Allocation options for a render target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderTargetOptions {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub format: TargetFormat,
    /// Allocate a combined depth/stencil attachment next to the color buffer.
    /// Stencil masking requires it on the composer's buffers.
    pub depth_stencil: bool,
}

impl Default for RenderTargetOptions {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            format: TargetFormat::Rgba8,
            depth_stencil: true,
        }
    }
}

impl RenderTargetOptions {
    /// Options for a color-only intermediate buffer.
    pub fn color_only() -> Self {
        Self {
            depth_stencil: false,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: TargetFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.min_filter = filter;
        self.mag_filter = filter;
        self
    }

    pub fn with_depth_stencil(mut self, depth_stencil: bool) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }
}

/// An off-screen buffer usable both as a draw destination and a sampled texture.
///
/// Targets are deliberately not `Clone`: each handle owns its id, and the
/// renderer's storage for that id is released through [`RenderTarget::release`].
/// Use [`RenderTarget::duplicate`] to allocate a sibling with the same size and
/// options under a fresh id.
///
/// Width and height are always at least 1.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderTarget {
    id: TargetId,
    width: u32,
    height: u32,
    options: RenderTargetOptions,
    label: String,
    released: bool,
}

impl RenderTarget {
    /// Creates a new target handle. Storage is allocated on first use.
    pub fn new(width: u32, height: u32, options: RenderTargetOptions, label: &str) -> Self {
        Self {
            id: TargetId::next(),
            width: width.max(1),
            height: height.max(1),
            options,
            label: label.to_owned(),
            released: false,
        }
    }

    /// Allocates a new target with the same size and options but a fresh id.
    pub fn duplicate(&self, label: &str) -> Self {
        Self::new(self.width, self.height, self.options, label)
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns `(width, height)` in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn options(&self) -> &RenderTargetOptions {
        &self.options
    }

    /// Debug label, visible in GPU debuggers when the wgpu backend allocates storage.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Updates the logical size. The renderer reallocates storage on next use.
    ///
    /// Calling this again with the same size is a no-op.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        // A resized target is live again even if its storage was dropped.
        self.released = false;
    }

    /// Frees the renderer-side storage behind this handle.
    ///
    /// The handle stays valid: drawing to it again reallocates storage.
    pub fn release(&mut self, renderer: &mut dyn Renderer) {
        if !self.released {
            renderer.release_target(self.id);
            self.released = true;
        }
    }

    /// Whether [`release`](Self::release) has been called since the last resize.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RecordingRenderer;

    #[test]
    fn targets_get_distinct_ids() {
        let a = RenderTarget::new(4, 4, RenderTargetOptions::default(), "a");
        let b = a.duplicate("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.size(), b.size());
        assert_eq!(a.options(), b.options());
    }

    #[test]
    fn zero_sizes_clamp_to_one() {
        let mut target = RenderTarget::new(0, 0, RenderTargetOptions::default(), "t");
        assert_eq!(target.size(), (1, 1));
        target.set_size(640, 0);
        assert_eq!(target.size(), (640, 1));
    }

    #[test]
    fn release_reaches_renderer_once() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let mut target = RenderTarget::new(8, 8, RenderTargetOptions::default(), "t");
        target.release(&mut renderer);
        target.release(&mut renderer);
        assert!(target.is_released());
        assert_eq!(renderer.released(), &[target.id()]);
    }
}
