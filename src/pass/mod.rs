//! Post-processing passes and the contract the composer drives them through.
//!
//! A pass is one step of a composer's chain. Each frame the composer calls
//! [`Pass::render`] with its two ping-pong buffers: the pass samples
//! `read_buffer` and draws into `write_buffer`, or into the display when
//! [`PassCore::render_to_screen`] is set. After a pass with `needs_swap` the
//! composer swaps the buffers, so the next pass reads what this one wrote.
//!
//! # Built-in Passes
//!
//! | Pass | Effect |
//! |------|--------|
//! | [`RenderPass`] | Draws the scene |
//! | [`CopyPass`] | Copies the input, scaled by an opacity |
//! | [`ShaderPass`] | Runs any built-in program over the input |
//! | [`FxaaPass`], [`SobelPass`], [`TechnicolorPass`] | Fixed fullscreen filters |
//! | [`ColorifyPass`], [`HueSaturationPass`] | Color grading |
//! | [`DotScreenPass`], [`FilmPass`] | Stylized screen effects |
//! | [`BloomPass`], [`UnrealBloomPass`] | Glow over bright regions |
//! | [`SsaoPass`], [`BokehPass`] | Depth-aware effects |
//! | [`MaskPass`], [`ClearMaskPass`] | Restrict later passes to a stencil region |
//!
//! # Writing a Pass
//!
//! Implement [`Pass`] for a struct that holds a [`PassCore`]. Anything that
//! touches renderer state should go through a [`StateGuard`](crate::StateGuard)
//! so the state is restored when the pass returns.
//!
//! ```
//! use afterglow::{FrameContext, Pass, PassCore, PassKind, RenderTarget};
//!
//! struct Nothing {
//!     core: PassCore,
//! }
//!
//! impl Pass for Nothing {
//!     fn kind(&self) -> PassKind {
//!         PassKind::Copy
//!     }
//!     fn core(&self) -> &PassCore {
//!         &self.core
//!     }
//!     fn core_mut(&mut self) -> &mut PassCore {
//!         &mut self.core
//!     }
//!     fn render(&mut self, _: &mut FrameContext<'_>, _: &RenderTarget, _: &RenderTarget) {}
//! }
//! ```

mod bloom;
mod bokeh;
mod color;
mod decode;
mod dot_screen;
mod film;
mod mask;
mod render_pass;
mod shader_pass;
mod ssao;
mod unreal_bloom;

pub use bloom::{BloomParams, BloomPass};
pub use bokeh::{BokehParams, BokehPass};
pub use color::{ColorifyParams, ColorifyPass, HueSaturationParams, HueSaturationPass};
pub use decode::decode_pass;
pub use dot_screen::{DotScreenParams, DotScreenPass};
pub use film::{FilmParams, FilmPass};
pub use mask::{ClearMaskPass, MaskParams, MaskPass};
pub use render_pass::{RenderParams, RenderPass};
pub use shader_pass::{
    CopyParams, CopyPass, FxaaPass, ShaderParams, ShaderPass, SobelPass, TechnicolorPass,
};
pub use ssao::{SsaoParams, SsaoPass};
pub use unreal_bloom::{UnrealBloomParams, UnrealBloomPass};

use std::any::Any;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::camera::CameraView;
use crate::render_target::RenderTarget;
use crate::renderer::{FullscreenDraw, Renderer, SceneMaterial, StateGuard, TextureBinding};
use crate::scene::Scene;
use crate::shader::{ShaderProgram, Uniforms};

/// Stable identifier of a pass, a UUID v4 string unless set explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(String);

impl PassId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PassId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PassId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Type tag of a pass, as written in serialized descriptors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Render,
    Copy,
    Shader,
    Bloom,
    UnrealBloom,
    Ssao,
    Bokeh,
    Fxaa,
    Film,
    DotScreen,
    Colorify,
    Sobel,
    Technicolor,
    HueSaturation,
    Mask,
    ClearMask,
}

impl PassKind {
    pub const ALL: [PassKind; 16] = [
        PassKind::Render,
        PassKind::Copy,
        PassKind::Shader,
        PassKind::Bloom,
        PassKind::UnrealBloom,
        PassKind::Ssao,
        PassKind::Bokeh,
        PassKind::Fxaa,
        PassKind::Film,
        PassKind::DotScreen,
        PassKind::Colorify,
        PassKind::Sobel,
        PassKind::Technicolor,
        PassKind::HueSaturation,
        PassKind::Mask,
        PassKind::ClearMask,
    ];

    /// The `type` string used in descriptors.
    pub fn tag(self) -> &'static str {
        match self {
            PassKind::Render => "Render",
            PassKind::Copy => "Copy",
            PassKind::Shader => "Shader",
            PassKind::Bloom => "Bloom",
            PassKind::UnrealBloom => "UnrealBloom",
            PassKind::Ssao => "SSAO",
            PassKind::Bokeh => "Bokeh",
            PassKind::Fxaa => "FXAA",
            PassKind::Film => "Film",
            PassKind::DotScreen => "DotScreen",
            PassKind::Colorify => "Colorify",
            PassKind::Sobel => "Sobel",
            PassKind::Technicolor => "Technicolor",
            PassKind::HueSaturation => "HueSaturation",
            PassKind::Mask => "Mask",
            PassKind::ClearMask => "ClearMask",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Flags shared by every pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassCore {
    pub id: PassId,
    /// Disabled passes are skipped entirely by the composer.
    pub enabled: bool,
    /// Swap the composer's buffers after this pass renders.
    pub needs_swap: bool,
    /// Draw into the display instead of the write buffer.
    pub render_to_screen: bool,
    /// Clear the destination before drawing.
    pub clear: bool,
}

impl PassCore {
    pub fn new(needs_swap: bool) -> Self {
        Self {
            id: PassId::new(),
            enabled: true,
            needs_swap,
            render_to_screen: false,
            clear: false,
        }
    }

    /// Where this pass draws: `None` for the display, otherwise `write_buffer`.
    pub fn destination<'t>(&self, write_buffer: &'t RenderTarget) -> Option<&'t RenderTarget> {
        if self.render_to_screen {
            None
        } else {
            Some(write_buffer)
        }
    }
}

impl Default for PassCore {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Everything a pass can see during one frame.
pub struct FrameContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub scene: &'a Scene,
    pub camera: &'a CameraView,
    /// Seconds since the previous frame.
    pub delta: f32,
    /// Whether a [`MaskPass`] is in effect for this pass.
    pub mask_active: bool,
}

/// One step of a composer's chain.
///
/// Passes only see the composer's buffers for the duration of
/// [`render`](Pass::render) and must leave `read_buffer`'s color untouched.
pub trait Pass: Any {
    fn kind(&self) -> PassKind;

    fn core(&self) -> &PassCore;

    fn core_mut(&mut self) -> &mut PassCore;

    /// Draws this pass, sampling `read_buffer` and writing `write_buffer`
    /// (or the display when rendering to screen).
    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        write_buffer: &RenderTarget,
        read_buffer: &RenderTarget,
    );

    /// Resizes private targets and resolution uniforms. Calling it twice with
    /// the same size has no further effect.
    fn set_size(&mut self, _width: u32, _height: u32) {}

    /// Releases private targets.
    fn dispose(&mut self, _renderer: &mut dyn Renderer) {}

    /// Type-specific fields of the descriptor.
    fn serialize_params(&self) -> Map<String, Value> {
        Map::new()
    }

    fn id(&self) -> &PassId {
        &self.core().id
    }

    fn enabled(&self) -> bool {
        self.core().enabled
    }

    fn needs_swap(&self) -> bool {
        self.core().needs_swap
    }

    fn render_to_screen(&self) -> bool {
        self.core().render_to_screen
    }

    /// Serializable description: kind, shared flags, id, and parameters.
    fn to_descriptor(&self) -> PassDescriptor {
        let core = self.core();
        PassDescriptor {
            kind: self.kind().tag().to_owned(),
            id: Some(core.id.to_string()),
            enabled: Some(core.enabled),
            needs_swap: Some(core.needs_swap),
            render_to_screen: Some(core.render_to_screen),
            clear: Some(core.clear),
            params: self.serialize_params(),
            rejected: Vec::new(),
        }
    }

    /// Builder-style: draw into the display.
    fn rendering_to_screen(mut self) -> Self
    where
        Self: Sized,
    {
        self.core_mut().render_to_screen = true;
        self
    }

    /// Builder-style: use a fixed id.
    fn with_id(mut self, id: impl Into<PassId>) -> Self
    where
        Self: Sized,
    {
        self.core_mut().id = id.into();
        self
    }

    /// Builder-style: start disabled.
    fn disabled(mut self) -> Self
    where
        Self: Sized,
    {
        self.core_mut().enabled = false;
        self
    }

    /// Builder-style: clear the destination before drawing.
    fn clearing(mut self, clear: bool) -> Self
    where
        Self: Sized,
    {
        self.core_mut().clear = clear;
        self
    }
}

impl dyn Pass {
    /// Downcasts to a concrete pass type.
    pub fn downcast_ref<T: Pass>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Pass>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self;
        any.downcast_mut::<T>()
    }
}

impl fmt::Debug for dyn Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("kind", &self.kind())
            .field("core", self.core())
            .finish()
    }
}

/// Serialized form of one pass.
///
/// Shared flags are optional so hand-written documents can leave them out;
/// decoding then uses the kind's defaults.
///
/// Deserialization accepts any JSON value. A missing or non-string `type`
/// leaves an unknown tag behind, and a shared field of the wrong JSON type is
/// dropped and remembered so [`decode_pass`] can report it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct PassDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_swap: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_to_screen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
    /// Shared fields dropped while reading a document: (field, problem).
    #[serde(skip)]
    pub(crate) rejected: Vec<(&'static str, String)>,
}

impl PassDescriptor {
    /// A descriptor with only a type tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            enabled: None,
            needs_swap: None,
            render_to_screen: None,
            clear: None,
            params: Map::new(),
            rejected: Vec::new(),
        }
    }

    /// Overrides `core` with every flag present in the descriptor.
    pub(crate) fn apply_flags(&self, core: &mut PassCore) {
        if let Some(id) = &self.id {
            core.id = PassId::from(id.as_str());
        }
        if let Some(enabled) = self.enabled {
            core.enabled = enabled;
        }
        if let Some(needs_swap) = self.needs_swap {
            core.needs_swap = needs_swap;
        }
        if let Some(render_to_screen) = self.render_to_screen {
            core.render_to_screen = render_to_screen;
        }
        if let Some(clear) = self.clear {
            core.clear = clear;
        }
    }

    fn take_flag(&mut self, fields: &mut Map<String, Value>, key: &'static str) -> Option<bool> {
        match fields.remove(key)? {
            Value::Bool(flag) => Some(flag),
            Value::Null => None,
            other => {
                self.rejected.push((key, format!("expected a boolean, found {other}")));
                None
            }
        }
    }
}

impl From<Value> for PassDescriptor {
    fn from(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::new("");
        };
        let kind = match fields.remove("type") {
            Some(Value::String(tag)) => tag,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let mut descriptor = Self::new(kind);

        let id = fields.remove("id");
        let legacy_id = fields.remove("uuid");
        descriptor.id = match id.or(legacy_id) {
            Some(Value::String(id)) => Some(id),
            Some(Value::Null) | None => None,
            Some(other) => {
                descriptor
                    .rejected
                    .push(("id", format!("expected a string, found {other}")));
                None
            }
        };
        descriptor.enabled = descriptor.take_flag(&mut fields, "enabled");
        descriptor.needs_swap = descriptor.take_flag(&mut fields, "needsSwap");
        descriptor.render_to_screen = descriptor.take_flag(&mut fields, "renderToScreen");
        descriptor.clear = descriptor.take_flag(&mut fields, "clear");
        descriptor.params = fields;
        descriptor
    }
}

/// Serializes a parameter struct into descriptor fields.
pub(crate) fn params_map<T: Serialize>(params: &T) -> Map<String, Value> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// `0xRRGGBB` to linear RGB in `[0, 1]`.
pub fn hex_to_rgb(hex: u32) -> Vec3 {
    Vec3::new(
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    )
}

/// Runs `program` over `read_buffer`, bound to `slot`, into the pass destination.
pub(crate) fn draw_effect(
    frame: &mut FrameContext<'_>,
    core: &PassCore,
    program: &'static ShaderProgram,
    slot: &'static str,
    uniforms: &Uniforms,
    write_buffer: &RenderTarget,
    read_buffer: &RenderTarget,
) {
    let textures = [TextureBinding::new(slot, read_buffer)];
    let draw = FullscreenDraw::new(program, uniforms, &textures);
    frame
        .renderer
        .draw_fullscreen(&draw, core.destination(write_buffer), core.clear);
}

/// Draws the frame's scene into `target` as packed depth, cleared to the far plane.
pub(crate) fn render_depth(frame: &mut FrameContext<'_>, target: &RenderTarget) {
    let mut renderer = StateGuard::new(&mut *frame.renderer);
    let state = renderer.state_mut();
    state.clear_color = Vec3::ONE;
    state.clear_alpha = 1.0;
    renderer.render_scene(
        frame.scene,
        frame.camera,
        Some(target),
        true,
        SceneMaterial::Depth,
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::camera::Camera;
    use crate::render_target::RenderTargetOptions;
    use crate::renderer::RecordingRenderer;

    /// Buffers and collaborators for driving a single pass by hand.
    pub struct Harness {
        pub renderer: RecordingRenderer,
        pub scene: Scene,
        pub camera: CameraView,
        pub write: RenderTarget,
        pub read: RenderTarget,
    }

    impl Harness {
        pub fn new() -> Self {
            let mut renderer = RecordingRenderer::new(64, 32);
            let write = RenderTarget::new(64, 32, RenderTargetOptions::default(), "write");
            let read = RenderTarget::new(64, 32, RenderTargetOptions::default(), "read");
            renderer.stamp(Some(&read), "input");
            Self {
                renderer,
                scene: Scene::new("scene"),
                camera: Camera::default().view(),
                write,
                read,
            }
        }

        pub fn run(&mut self, pass: &mut dyn Pass, mask_active: bool) {
            let mut frame = FrameContext {
                renderer: &mut self.renderer,
                scene: &self.scene,
                camera: &self.camera,
                delta: 0.5,
                mask_active,
            };
            pass.render(&mut frame, &self.write, &self.read);
        }

        pub fn write_content(&self) -> &str {
            self.renderer.content(Some(&self.write))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in PassKind::ALL {
            assert_eq!(PassKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(PassKind::from_tag("Glitch"), None);
    }

    #[test]
    fn ids_are_unique_uuids() {
        let a = PassId::new();
        let b = PassId::new();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn descriptor_flags_override_defaults() {
        let descriptor: PassDescriptor = serde_json::from_value(serde_json::json!({
            "type": "Copy",
            "uuid": "abc",
            "renderToScreen": true,
            "opacity": 0.5
        }))
        .unwrap();
        assert_eq!(descriptor.params.get("opacity"), Some(&serde_json::json!(0.5)));

        let mut core = PassCore::new(true);
        descriptor.apply_flags(&mut core);
        assert_eq!(core.id.as_str(), "abc");
        assert!(core.render_to_screen);
        assert!(core.needs_swap);
        assert!(core.enabled);
    }

    #[test]
    fn missing_flags_stay_out_of_serialized_descriptors() {
        let json = serde_json::to_value(PassDescriptor::new("Sobel")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Sobel" }));
    }

    #[test]
    fn hex_colors_split_into_channels() {
        assert_eq!(hex_to_rgb(0xff0000), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(hex_to_rgb(0xffffff), Vec3::ONE);
    }
}
