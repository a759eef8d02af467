//! Passes that run a single fullscreen program over the read buffer.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FrameContext, Pass, PassCore, PassKind, draw_effect, params_map};
use crate::error::PassError;
use crate::render_target::RenderTarget;
use crate::shader::{ShaderProgram, Uniforms, programs};

/// Texture slot every input-sampling program must declare.
pub(crate) const INPUT_SLOT: &str = "tDiffuse";

/// Serialized fields of a [`ShaderPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderParams {
    /// Name of a built-in program.
    pub program: String,
    #[serde(default, skip_serializing_if = "Uniforms::is_empty")]
    pub uniforms: Uniforms,
}

/// Runs any built-in program over the read buffer bound to `tDiffuse`.
pub struct ShaderPass {
    core: PassCore,
    program: &'static ShaderProgram,
    uniforms: Uniforms,
}

impl ShaderPass {
    /// Creates a pass for `program`.
    ///
    /// A program without a `tDiffuse` slot is reported at error level; the
    /// pass is still built, but will not see the chain's input. Use
    /// [`try_new`](Self::try_new) to reject such programs instead.
    pub fn new(program: &'static ShaderProgram) -> Self {
        if !program.has_texture(INPUT_SLOT) {
            log::error!(
                "shader program `{}` has no `{}` slot; the pass will ignore its input",
                program.name(),
                INPUT_SLOT
            );
        }
        Self {
            core: PassCore::new(true),
            program,
            uniforms: Uniforms::new(),
        }
    }

    /// Like [`new`](Self::new), but fails on programs without a `tDiffuse` slot.
    pub fn try_new(program: &'static ShaderProgram) -> Result<Self, PassError> {
        if !program.has_texture(INPUT_SLOT) {
            return Err(PassError::MissingSlot {
                program: program.name(),
                slot: INPUT_SLOT,
            });
        }
        Ok(Self::new(program))
    }

    /// Looks up a built-in program by name.
    pub fn named(name: &str) -> Result<Self, PassError> {
        let program =
            ShaderProgram::builtin(name).ok_or_else(|| PassError::UnknownProgram(name.to_owned()))?;
        Ok(Self::new(program))
    }

    pub(crate) fn from_params(params: ShaderParams) -> Result<Self, PassError> {
        let mut pass = Self::named(&params.program)?;
        pass.uniforms = params.uniforms;
        Ok(pass)
    }

    /// Builder-style uniform assignment.
    pub fn with_uniforms(mut self, uniforms: Uniforms) -> Self {
        self.uniforms = uniforms;
        self
    }

    pub fn program(&self) -> &'static ShaderProgram {
        self.program
    }

    pub fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut Uniforms {
        &mut self.uniforms
    }
}

impl Pass for ShaderPass {
    fn kind(&self) -> PassKind {
        PassKind::Shader
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        write_buffer: &RenderTarget,
        read_buffer: &RenderTarget,
    ) {
        draw_effect(
            frame,
            &self.core,
            self.program,
            INPUT_SLOT,
            &self.uniforms,
            write_buffer,
            read_buffer,
        );
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&ShaderParams {
            program: self.program.name().to_owned(),
            uniforms: self.uniforms.clone(),
        })
    }
}

/// Serialized fields of a [`CopyPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyParams {
    pub opacity: f32,
}

impl Default for CopyParams {
    fn default() -> Self {
        Self { opacity: 1.0 }
    }
}

/// Copies the read buffer, scaled by `opacity`.
pub struct CopyPass {
    core: PassCore,
    params: CopyParams,
}

impl CopyPass {
    pub fn new() -> Self {
        Self::with_params(CopyParams::default())
    }

    pub fn with_params(params: CopyParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.params.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.params.opacity = opacity;
    }
}

impl Default for CopyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for CopyPass {
    fn kind(&self) -> PassKind {
        PassKind::Copy
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        write_buffer: &RenderTarget,
        read_buffer: &RenderTarget,
    ) {
        let uniforms = Uniforms::new().with("opacity", self.params.opacity);
        draw_effect(
            frame,
            &self.core,
            &programs::COPY,
            INPUT_SLOT,
            &uniforms,
            write_buffer,
            read_buffer,
        );
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

/// Fast approximate anti-aliasing.
pub struct FxaaPass {
    core: PassCore,
    resolution: Vec2,
}

impl FxaaPass {
    pub fn new() -> Self {
        Self {
            core: PassCore::new(true),
            resolution: Vec2::ONE,
        }
    }

    /// Texel size, `1 / (width, height)` of the last `set_size`.
    pub fn resolution(&self) -> Vec2 {
        self.resolution
    }
}

impl Default for FxaaPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for FxaaPass {
    fn kind(&self) -> PassKind {
        PassKind::Fxaa
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        write_buffer: &RenderTarget,
        read_buffer: &RenderTarget,
    ) {
        let uniforms = Uniforms::new().with("resolution", self.resolution);
        draw_effect(
            frame,
            &self.core,
            &programs::FXAA,
            INPUT_SLOT,
            &uniforms,
            write_buffer,
            read_buffer,
        );
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.resolution = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
    }
}

/// Sobel edge detection on luminance.
pub struct SobelPass {
    core: PassCore,
    resolution: Vec2,
}

impl SobelPass {
    pub fn new() -> Self {
        Self {
            core: PassCore::new(true),
            resolution: Vec2::ONE,
        }
    }

    /// Frame size in pixels from the last `set_size`.
    pub fn resolution(&self) -> Vec2 {
        self.resolution
    }
}

impl Default for SobelPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for SobelPass {
    fn kind(&self) -> PassKind {
        PassKind::Sobel
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        write_buffer: &RenderTarget,
        read_buffer: &RenderTarget,
    ) {
        let uniforms = Uniforms::new().with("resolution", self.resolution);
        draw_effect(
            frame,
            &self.core,
            &programs::SOBEL,
            INPUT_SLOT,
            &uniforms,
            write_buffer,
            read_buffer,
        );
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.resolution = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }
}

/// Two-strip technicolor film look.
pub struct TechnicolorPass {
    core: PassCore,
}

impl TechnicolorPass {
    pub fn new() -> Self {
        Self {
            core: PassCore::new(true),
        }
    }
}

impl Default for TechnicolorPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for TechnicolorPass {
    fn kind(&self) -> PassKind {
        PassKind::Technicolor
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        write_buffer: &RenderTarget,
        read_buffer: &RenderTarget,
    ) {
        draw_effect(
            frame,
            &self.core,
            &programs::TECHNICOLOR,
            INPUT_SLOT,
            &Uniforms::new(),
            write_buffer,
            read_buffer,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::Command;

    #[test]
    fn copy_passes_input_through() {
        let mut harness = Harness::new();
        harness.run(&mut CopyPass::new(), false);
        assert_eq!(harness.write_content(), "input");
    }

    #[test]
    fn copy_to_screen_leaves_write_buffer() {
        let mut harness = Harness::new();
        harness.run(&mut CopyPass::new().rendering_to_screen(), false);
        assert_eq!(harness.renderer.screen(), "input");
        assert_eq!(harness.write_content(), "");
    }

    #[test]
    fn try_new_rejects_programs_without_input_slot() {
        let err = ShaderPass::try_new(&programs::UNREAL_COMPOSITE).err();
        assert!(matches!(
            err,
            Some(PassError::MissingSlot {
                program: "unreal_composite",
                slot: "tDiffuse"
            })
        ));
        // The lenient constructor still builds.
        assert_eq!(ShaderPass::new(&programs::UNREAL_COMPOSITE).program().name(), "unreal_composite");
    }

    #[test]
    fn named_rejects_unknown_programs() {
        assert!(matches!(
            ShaderPass::named("nope"),
            Err(PassError::UnknownProgram(name)) if name == "nope"
        ));
    }

    #[test]
    fn shader_pass_forwards_its_uniforms() {
        let mut harness = Harness::new();
        let mut pass = ShaderPass::named("hue_saturation")
            .unwrap()
            .with_uniforms(Uniforms::new().with("hue", 0.25_f32));
        harness.run(&mut pass, false);
        assert_eq!(harness.write_content(), "hue_saturation(input)");
        match &harness.renderer.commands()[0] {
            Command::Fullscreen { uniforms, .. } => assert_eq!(uniforms.float("hue"), Some(0.25)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn resolution_tracks_size() {
        let mut fxaa = FxaaPass::new();
        fxaa.set_size(200, 100);
        fxaa.set_size(200, 100);
        assert_eq!(fxaa.resolution(), Vec2::new(0.005, 0.01));

        let mut sobel = SobelPass::new();
        sobel.set_size(200, 100);
        assert_eq!(sobel.resolution(), Vec2::new(200.0, 100.0));
        assert!(sobel.serialize_params().is_empty());
    }
}
