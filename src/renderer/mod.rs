//! The renderer interface passes draw through.
//!
//! Passes never talk to a GPU API directly. They issue scene draws, fullscreen
//! program draws, and clears through the [`Renderer`] trait, and adjust the
//! renderer's global [`RenderState`] (clear color, auto-clear, stencil test,
//! write masks) through a [`StateGuard`] that puts everything back when it drops.
//!
//! Two implementations ship with the crate:
//!
//! - [`WgpuRenderer`]: draws with wgpu, either into a window surface or headless
//! - [`RecordingRenderer`]: records every call and simulates buffer contents,
//!   for tests and for inspecting what a pass chain does
//!
//! # Example
//!
//! ```
//! use afterglow::{RecordingRenderer, Renderer, StateGuard};
//!
//! let mut renderer = RecordingRenderer::new(64, 64);
//! {
//!     let mut guard = StateGuard::new(&mut renderer);
//!     guard.state_mut().auto_clear = false;
//! }
//! assert!(renderer.state().auto_clear);
//! ```

mod recording;
mod wgpu_backend;

pub use recording::{Command, RecordingRenderer};
pub use wgpu_backend::WgpuRenderer;

use std::ops::{Deref, DerefMut};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraView;
use crate::render_target::{RenderTarget, TargetId};
use crate::scene::Scene;
use crate::shader::{ShaderProgram, Uniforms};

/// Comparison used by the stencil test.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

/// What happens to the stored stencil value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
}

/// Stencil test configuration, applied to every draw into a target with a
/// depth/stencil attachment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilState {
    pub enabled: bool,
    pub func: CompareFunction,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunction::Always,
            reference: 0,
            read_mask: 0xffff_ffff,
            write_mask: 0xffff_ffff,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }
}

impl StencilState {
    /// Sets the comparison, reference value, and read mask in one call.
    pub fn set_func(&mut self, func: CompareFunction, reference: u32, read_mask: u32) {
        self.func = func;
        self.reference = reference;
        self.read_mask = read_mask;
    }

    /// Sets the operations for stencil-fail, depth-fail, and pass.
    pub fn set_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.fail = fail;
        self.depth_fail = depth_fail;
        self.pass = pass;
    }

    /// Whether draws are currently restricted by the stencil buffer.
    pub fn is_testing(&self) -> bool {
        self.enabled && self.func != CompareFunction::Always
    }
}

/// Renderer-global state shared by every draw.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderState {
    pub clear_color: Vec3,
    pub clear_alpha: f32,
    /// When set, scene and fullscreen draws clear their destination first
    /// even if the caller did not ask for it.
    pub auto_clear: bool,
    /// Value the stencil buffer is cleared to.
    pub clear_stencil: u32,
    pub stencil: StencilState,
    pub color_write: bool,
    pub depth_write: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            clear_color: Vec3::ZERO,
            clear_alpha: 1.0,
            auto_clear: true,
            clear_stencil: 0,
            stencil: StencilState::default(),
            color_write: true,
            depth_write: true,
        }
    }
}

impl RenderState {
    /// Whether a draw requested with `clear` actually clears.
    pub fn clears(&self, clear: bool) -> bool {
        clear || self.auto_clear
    }
}

/// Which attachments a clear touches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClearBuffers {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearBuffers {
    pub const ALL: Self = Self {
        color: true,
        depth: true,
        stencil: true,
    };
    pub const NONE: Self = Self {
        color: false,
        depth: false,
        stencil: false,
    };
    pub const COLOR: Self = Self {
        color: true,
        depth: false,
        stencil: false,
    };
    pub const DEPTH: Self = Self {
        color: false,
        depth: true,
        stencil: false,
    };
    pub const STENCIL: Self = Self {
        color: false,
        depth: false,
        stencil: true,
    };

    pub fn any(&self) -> bool {
        self.color || self.depth || self.stencil
    }
}

impl Default for ClearBuffers {
    fn default() -> Self {
        Self::ALL
    }
}

/// Material override for a scene draw.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SceneMaterial {
    /// Each drawable's own color, lit by a fixed key light.
    #[default]
    Standard,
    /// Window-space depth packed into RGBA8, sampled by depth-aware effects.
    Depth,
    /// Writes depth/stencil only; color is left untouched.
    StencilOnly,
}

/// Color blending for a fullscreen draw.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Blending {
    #[default]
    Replace,
    /// `dst + src`, used to layer blur results over a copied frame.
    Additive,
}

/// A render target bound to a named texture slot of a program.
#[derive(Copy, Clone, Debug)]
pub struct TextureBinding<'a> {
    pub slot: &'static str,
    pub target: &'a RenderTarget,
}

impl<'a> TextureBinding<'a> {
    pub fn new(slot: &'static str, target: &'a RenderTarget) -> Self {
        Self { slot, target }
    }
}

/// One fullscreen-triangle draw of a shader program.
#[derive(Copy, Clone, Debug)]
pub struct FullscreenDraw<'a> {
    pub program: &'static ShaderProgram,
    pub uniforms: &'a Uniforms,
    pub textures: &'a [TextureBinding<'a>],
    pub blending: Blending,
}

impl<'a> FullscreenDraw<'a> {
    pub fn new(
        program: &'static ShaderProgram,
        uniforms: &'a Uniforms,
        textures: &'a [TextureBinding<'a>],
    ) -> Self {
        Self {
            program,
            uniforms,
            textures,
            blending: Blending::Replace,
        }
    }

    pub fn with_blending(mut self, blending: Blending) -> Self {
        self.blending = blending;
        self
    }

    /// The target bound to `slot`, if any.
    pub fn texture(&self, slot: &str) -> Option<&'a RenderTarget> {
        self.textures.iter().find(|t| t.slot == slot).map(|t| t.target)
    }
}

/// A GPU renderer as seen by the composer and its passes.
///
/// A `target` of `None` means the display (window surface, or the headless
/// screen). Every draw honors [`RenderState`]: a draw clears when asked to or
/// when `auto_clear` is set, and the stencil test and write masks apply when
/// the destination has a depth/stencil attachment.
pub trait Renderer {
    /// Size of the display in pixels.
    fn size(&self) -> (u32, u32);

    fn state(&self) -> &RenderState;

    fn state_mut(&mut self) -> &mut RenderState;

    /// Draws `scene` as seen from `camera`.
    fn render_scene(
        &mut self,
        scene: &Scene,
        camera: &CameraView,
        target: Option<&RenderTarget>,
        clear: bool,
        material: SceneMaterial,
    );

    /// Draws one fullscreen triangle with `draw.program`.
    fn draw_fullscreen(
        &mut self,
        draw: &FullscreenDraw<'_>,
        target: Option<&RenderTarget>,
        clear: bool,
    );

    /// Clears the selected attachments of `target` with the current clear values.
    fn clear_target(&mut self, target: Option<&RenderTarget>, buffers: ClearBuffers);

    /// Copies a region of the display, starting at `origin`, into `target`.
    fn copy_framebuffer_to_texture(&mut self, origin: (u32, u32), target: &RenderTarget);

    /// Frees any storage allocated for the target `id`.
    fn release_target(&mut self, id: TargetId);
}

/// Borrows a renderer and restores its [`RenderState`] when dropped.
///
/// Dereferences to the renderer, so draws can be issued through the guard.
pub struct StateGuard<'a> {
    renderer: &'a mut dyn Renderer,
    saved: RenderState,
}

impl<'a> StateGuard<'a> {
    pub fn new(renderer: &'a mut dyn Renderer) -> Self {
        let saved = *renderer.state();
        Self { renderer, saved }
    }

    /// The state that will be restored.
    pub fn saved(&self) -> &RenderState {
        &self.saved
    }
}

impl<'a> Deref for StateGuard<'a> {
    type Target = dyn Renderer + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.renderer
    }
}

impl<'a> DerefMut for StateGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.renderer
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.renderer.state_mut() = self.saved;
    }
}
