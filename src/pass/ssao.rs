//! Screen-space ambient occlusion.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shader_pass::INPUT_SLOT;
use super::{FrameContext, Pass, PassCore, PassKind, params_map, render_depth};
use crate::render_target::{RenderTarget, RenderTargetOptions};
use crate::renderer::{FullscreenDraw, Renderer, TextureBinding};
use crate::shader::{Uniforms, programs};

/// Serialized fields of an [`SsaoPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SsaoParams {
    /// Output only the occlusion term instead of the shaded frame.
    #[serde(rename = "onlyAO")]
    pub only_ao: bool,
    /// Sampling radius in pixels.
    pub radius: f32,
    pub ao_clamp: f32,
    /// How much bright pixels resist darkening.
    pub lum_influence: f32,
}

impl Default for SsaoParams {
    fn default() -> Self {
        Self {
            only_ao: false,
            radius: 32.0,
            ao_clamp: 0.25,
            lum_influence: 0.7,
        }
    }
}

/// Darkens creases and contact areas using a depth prepass of the scene.
pub struct SsaoPass {
    core: PassCore,
    params: SsaoParams,
    depth: RenderTarget,
}

impl SsaoPass {
    pub fn new() -> Self {
        Self::with_params(SsaoParams::default())
    }

    pub fn with_params(params: SsaoParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
            depth: RenderTarget::new(1, 1, RenderTargetOptions::default(), "SSAO Depth"),
        }
    }

    pub fn only_ao(&self) -> bool {
        self.params.only_ao
    }

    pub fn set_only_ao(&mut self, only_ao: bool) {
        self.params.only_ao = only_ao;
    }

    pub fn radius(&self) -> f32 {
        self.params.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.params.radius = radius;
    }

    pub fn ao_clamp(&self) -> f32 {
        self.params.ao_clamp
    }

    pub fn set_ao_clamp(&mut self, ao_clamp: f32) {
        self.params.ao_clamp = ao_clamp;
    }

    pub fn lum_influence(&self) -> f32 {
        self.params.lum_influence
    }

    pub fn set_lum_influence(&mut self, lum_influence: f32) {
        self.params.lum_influence = lum_influence;
    }

    pub fn depth_target(&self) -> &RenderTarget {
        &self.depth
    }
}

impl Default for SsaoPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for SsaoPass {
    fn kind(&self) -> PassKind {
        PassKind::Ssao
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
        if self.depth.size() != read_buffer.size() {
            let (width, height) = read_buffer.size();
            self.depth.set_size(width, height);
        }
        render_depth(frame, &self.depth);

        let (width, height) = self.depth.size();
        let uniforms = Uniforms::new()
            .with("size", Vec2::new(width as f32, height as f32))
            .with("cameraNear", frame.camera.near)
            .with("cameraFar", frame.camera.far)
            .with("onlyAO", self.params.only_ao)
            .with("aoClamp", self.params.ao_clamp)
            .with("lumInfluence", self.params.lum_influence)
            .with("radius", self.params.radius);
        let textures = [
            TextureBinding::new(INPUT_SLOT, read_buffer),
            TextureBinding::new("tDepth", &self.depth),
        ];
        let draw = FullscreenDraw::new(&programs::SSAO, &uniforms, &textures);
        frame.renderer.draw_fullscreen(
            &draw,
            self.core.destination(write_buffer),
            self.core.clear,
        );
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.depth.set_size(width.max(1), height.max(1));
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        self.depth.release(renderer);
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::{Command, SceneMaterial};

    #[test]
    fn samples_color_and_depth_prepass() {
        let mut harness = Harness::new();
        let mut pass = SsaoPass::new();
        harness.run(&mut pass, false);

        assert_eq!(harness.write_content(), "ssao(input, depth(scene))");
        assert_eq!(pass.depth_target().size(), (64, 32));
        match &harness.renderer.commands()[0] {
            Command::RenderScene {
                material,
                clear,
                state,
                ..
            } => {
                assert_eq!(*material, SceneMaterial::Depth);
                assert!(*clear);
                assert_eq!(state.clear_color, glam::Vec3::ONE);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*harness.renderer.state(), Default::default());
    }

    #[test]
    fn only_ao_uses_upper_case_key() {
        let mut pass = SsaoPass::new();
        pass.set_only_ao(true);
        let params = pass.serialize_params();
        assert_eq!(params.get("onlyAO"), Some(&Value::Bool(true)));
        assert_eq!(params.get("radius"), Some(&serde_json::json!(32.0)));
        assert!(params.contains_key("lumInfluence"));
    }

    #[test]
    fn depth_target_tracks_frame_size() {
        let mut harness = Harness::new();
        let mut pass = SsaoPass::new();
        pass.set_size(320, 200);
        assert_eq!(pass.depth_target().size(), (320, 200));
        pass.dispose(&mut harness.renderer);
        assert_eq!(harness.renderer.released(), &[pass.depth_target().id()]);
    }
}
