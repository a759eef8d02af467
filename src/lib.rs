//! # Afterglow
//!
//! **Post-processing composition for Rust.**
//!
//! A [`Composer`] owns two ping-pong render targets and an ordered chain of
//! [`Pass`]es. Each frame it hands every enabled pass the current read and
//! write buffers, swaps them after passes that ask for it, and tracks the
//! stencil mask opened by a [`MaskPass`]. Chains serialize to JSON and back,
//! and a [`Camera`] binds a composer to a projection.
//!
//! ## Quick Start
//!
//! ```
//! use afterglow::*;
//!
//! let mut composer = Composer::with_config(ComposerConfig::new().size(320, 240));
//! composer.add_pass(RenderPass::new());
//! composer.add_pass(BloomPass::default());
//! composer.add_pass(CopyPass::new().rendering_to_screen());
//!
//! let json = composer.to_json()?;
//! let restored = Composer::from_json(&json)?;
//! assert_eq!(restored.composer.len(), 3);
//! assert!(restored.warnings.is_empty());
//! # Ok::<(), ComposerError>(())
//! ```
//!
//! Passes draw through the [`Renderer`] trait: [`WgpuRenderer`] renders with
//! wgpu (windowed or headless), [`RecordingRenderer`] records calls and
//! simulates buffer contents for tests.

mod camera;
mod composer;
mod config;
mod error;
mod gpu;
mod pass;
mod render_target;
mod renderer;
mod scene;
mod shader;

pub use camera::{
    Camera, CameraDescriptor, CameraView, FIXED_DELTA_TIME, Projection, RenderTextureDescriptor,
    ResizeMode,
};
pub use composer::{Composer, ComposerDescriptor, Decoded};
pub use config::{ComposerConfig, RendererConfig};
pub use error::{ComposerError, DecodeWarning, GpuError, PassError};
pub use gpu::GpuContext;
pub use pass::{
    BloomParams, BloomPass, BokehParams, BokehPass, ClearMaskPass, ColorifyParams, ColorifyPass,
    CopyParams, CopyPass, DotScreenParams, DotScreenPass, FilmParams, FilmPass, FrameContext,
    FxaaPass, HueSaturationParams, HueSaturationPass, MaskParams, MaskPass, Pass, PassCore,
    PassDescriptor, PassId, PassKind, RenderParams, RenderPass, ShaderParams, ShaderPass,
    SobelPass, SsaoParams, SsaoPass, TechnicolorPass, UnrealBloomParams, UnrealBloomPass,
    decode_pass, hex_to_rgb,
};
pub use render_target::{FilterMode, RenderTarget, RenderTargetOptions, TargetFormat, TargetId};
pub use renderer::{
    Blending, ClearBuffers, Command, CompareFunction, FullscreenDraw, RecordingRenderer,
    RenderState, Renderer, SceneMaterial, StateGuard, StencilOp, StencilState, TextureBinding,
    WgpuRenderer,
};
pub use scene::{Drawable, Mesh, Scene, Transform, Vertex};
pub use shader::{
    FULLSCREEN_PRELUDE, MAX_TEXTURE_SLOTS, MAX_UNIFORM_SLOTS, SCENE_SHADER, ShaderProgram,
    UniformSlot, UniformValue, Uniforms, programs,
};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
