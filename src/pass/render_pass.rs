//! Draws the frame's scene into the chain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FrameContext, Pass, PassCore, PassKind, hex_to_rgb, params_map};
use crate::render_target::RenderTarget;
use crate::renderer::{ClearBuffers, SceneMaterial, StateGuard};

/// Serialized fields of a [`RenderPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderParams {
    /// Clear color as `0xRRGGBB`; the renderer's own clear color when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_color: Option<u32>,
    /// Alpha used with `clear_color`.
    pub clear_alpha: f32,
    /// Clear depth before drawing, independent of the camera's flags.
    pub clear_depth: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            clear_color: None,
            clear_alpha: 0.0,
            clear_depth: false,
        }
    }
}

/// Renders the scene with the frame camera.
///
/// When [`PassCore::clear`] is set (the default) the destination is cleared
/// with the camera's clear flags before the scene is drawn.
pub struct RenderPass {
    core: PassCore,
    params: RenderParams,
    material: SceneMaterial,
}

impl RenderPass {
    pub fn new() -> Self {
        Self::with_params(RenderParams::default())
    }

    pub fn with_params(params: RenderParams) -> Self {
        let mut core = PassCore::new(true);
        core.clear = true;
        Self {
            core,
            params,
            material: SceneMaterial::Standard,
        }
    }

    /// Draws every object with `material` instead of its own.
    pub fn with_material(mut self, material: SceneMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn clear_color(&self) -> Option<u32> {
        self.params.clear_color
    }

    pub fn set_clear_color(&mut self, color: Option<u32>, alpha: f32) {
        self.params.clear_color = color;
        self.params.clear_alpha = alpha;
    }

    pub fn set_clear_depth(&mut self, clear_depth: bool) {
        self.params.clear_depth = clear_depth;
    }
}

impl Default for RenderPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for RenderPass {
    fn kind(&self) -> PassKind {
        PassKind::Render
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
        _read_buffer: &RenderTarget,
    ) {
        let destination = self.core.destination(write_buffer);
        let mut renderer = StateGuard::new(&mut *frame.renderer);

        let state = renderer.state_mut();
        state.auto_clear = false;
        if let Some(hex) = self.params.clear_color {
            state.clear_color = hex_to_rgb(hex);
            state.clear_alpha = self.params.clear_alpha;
        }

        if self.params.clear_depth {
            renderer.clear_target(destination, ClearBuffers::DEPTH);
        }
        if self.core.clear && frame.camera.clear.any() {
            renderer.clear_target(destination, frame.camera.clear);
        }
        renderer.render_scene(frame.scene, frame.camera, destination, false, self.material);
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::{Command, Renderer};
    use glam::Vec3;

    #[test]
    fn draws_scene_into_write_buffer() {
        let mut harness = Harness::new();
        let mut pass = RenderPass::new();
        harness.run(&mut pass, false);
        assert_eq!(harness.write_content(), "scene");
        assert_eq!(harness.renderer.content(Some(&harness.read)), "input");
    }

    #[test]
    fn clears_with_camera_flags_then_draws_without_auto_clear() {
        let mut harness = Harness::new();
        let mut pass = RenderPass::new();
        pass.set_clear_color(Some(0x0000ff), 0.5);
        harness.run(&mut pass, false);

        let commands = harness.renderer.commands();
        assert_eq!(commands.len(), 2);
        match &commands[0] {
            Command::Clear { buffers, state, .. } => {
                assert_eq!(*buffers, ClearBuffers::ALL);
                assert_eq!(state.clear_color, Vec3::new(0.0, 0.0, 1.0));
                assert_eq!(state.clear_alpha, 0.5);
            }
            other => panic!("expected clear, got {other:?}"),
        }
        match &commands[1] {
            Command::RenderScene { clear, state, .. } => {
                assert!(!clear);
                assert!(!state.auto_clear);
            }
            other => panic!("expected scene draw, got {other:?}"),
        }
        assert!(harness.renderer.state().auto_clear);
        assert_eq!(harness.renderer.state().clear_color, Vec3::ZERO);
    }

    #[test]
    fn to_screen_skips_write_buffer() {
        let mut harness = Harness::new();
        let mut pass = RenderPass::new().rendering_to_screen().clearing(false);
        harness.run(&mut pass, false);
        assert_eq!(harness.renderer.screen(), "scene");
        assert_eq!(harness.write_content(), "");
        assert_eq!(harness.renderer.commands().len(), 1);
    }

    #[test]
    fn params_omit_unset_clear_color() {
        let pass = RenderPass::new();
        let params = pass.serialize_params();
        assert!(!params.contains_key("clearColor"));
        assert_eq!(params.get("clearDepth"), Some(&Value::Bool(false)));
    }
}
