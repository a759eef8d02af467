//! Stencil masking: restrict later passes to the pixels covered by a mask scene.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FrameContext, Pass, PassCore, PassKind, params_map};
use crate::render_target::RenderTarget;
use crate::renderer::{ClearBuffers, CompareFunction, SceneMaterial, StateGuard, StencilOp};
use crate::scene::Scene;

/// Serialized fields of a [`MaskPass`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    /// Mask everything except the mask geometry.
    pub inverse: bool,
    /// Geometry written into the stencil buffer.
    pub scene: Scene,
}

/// Writes the mask scene into the stencil of both composer buffers and leaves
/// the stencil test on, so later passes only touch masked pixels.
///
/// Draws nothing visible and never swaps.
pub struct MaskPass {
    core: PassCore,
    params: MaskParams,
}

impl MaskPass {
    pub fn new(scene: Scene) -> Self {
        Self::with_params(MaskParams {
            inverse: false,
            scene,
        })
    }

    pub fn with_params(params: MaskParams) -> Self {
        let mut core = PassCore::new(false);
        core.clear = true;
        Self { core, params }
    }

    pub fn inverse(&self) -> bool {
        self.params.inverse
    }

    pub fn set_inverse(&mut self, inverse: bool) {
        self.params.inverse = inverse;
    }

    pub fn scene(&self) -> &Scene {
        &self.params.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.params.scene
    }
}

impl Default for MaskPass {
    fn default() -> Self {
        Self::with_params(MaskParams::default())
    }
}

impl Pass for MaskPass {
    fn kind(&self) -> PassKind {
        PassKind::Mask
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
        let (write_value, clear_value) = if self.params.inverse { (0, 1) } else { (1, 0) };

        {
            let mut renderer = StateGuard::new(&mut *frame.renderer);
            let state = renderer.state_mut();
            state.color_write = false;
            state.depth_write = false;
            state.auto_clear = false;
            state.clear_stencil = clear_value;
            state.stencil.enabled = true;
            state.stencil.set_op(StencilOp::Replace, StencilOp::Replace, StencilOp::Replace);
            state.stencil.set_func(CompareFunction::Always, write_value, 0xffffffff);

            for buffer in [read_buffer, write_buffer] {
                if self.core.clear {
                    renderer.clear_target(Some(buffer), ClearBuffers::STENCIL);
                }
                renderer.render_scene(
                    &self.params.scene,
                    frame.camera,
                    Some(buffer),
                    false,
                    SceneMaterial::StencilOnly,
                );
            }
        }

        let stencil = &mut frame.renderer.state_mut().stencil;
        stencil.enabled = true;
        stencil.set_func(CompareFunction::Equal, 1, 0xffffffff);
        stencil.set_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

/// Turns the stencil test off, ending the region opened by a [`MaskPass`].
pub struct ClearMaskPass {
    core: PassCore,
}

impl ClearMaskPass {
    pub fn new() -> Self {
        Self {
            core: PassCore::new(false),
        }
    }
}

impl Default for ClearMaskPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for ClearMaskPass {
    fn kind(&self) -> PassKind {
        PassKind::ClearMask
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(&mut self, frame: &mut FrameContext<'_>, _: &RenderTarget, _: &RenderTarget) {
        frame.renderer.state_mut().stencil.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::{Command, Renderer};
    use crate::scene::{Drawable, Mesh};

    fn mask_scene() -> Scene {
        Scene::new("mask").with(Drawable::new("window", Mesh::plane(1.0)))
    }

    #[test]
    fn writes_stencil_into_both_buffers_without_color() {
        let mut harness = Harness::new();
        let mut pass = MaskPass::new(mask_scene());
        harness.run(&mut pass, false);

        let commands = harness.renderer.commands();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0].target(), Some(harness.read.id()));
        assert_eq!(commands[3].target(), Some(harness.write.id()));
        match &commands[1] {
            Command::RenderScene {
                scene,
                material,
                state,
                ..
            } => {
                assert_eq!(scene, "mask");
                assert_eq!(*material, SceneMaterial::StencilOnly);
                assert!(!state.color_write);
                assert_eq!(state.stencil.func, CompareFunction::Always);
                assert_eq!(state.stencil.reference, 1);
                assert_eq!(state.stencil.pass, StencilOp::Replace);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(harness.renderer.content(Some(&harness.read)), "input");
    }

    #[test]
    fn leaves_stencil_test_on_for_later_passes() {
        let mut harness = Harness::new();
        harness.run(&mut MaskPass::new(mask_scene()), false);

        let state = harness.renderer.state();
        assert!(state.color_write);
        assert!(state.depth_write);
        assert!(state.auto_clear);
        assert!(state.stencil.enabled);
        assert_eq!(state.stencil.func, CompareFunction::Equal);
        assert_eq!(state.stencil.reference, 1);
        assert_eq!(state.stencil.pass, StencilOp::Keep);

        harness.run(&mut ClearMaskPass::new(), false);
        assert!(!harness.renderer.state().stencil.enabled);
    }

    #[test]
    fn inverse_swaps_write_and_clear_values() {
        let mut harness = Harness::new();
        let mut pass = MaskPass::new(mask_scene());
        pass.set_inverse(true);
        harness.run(&mut pass, false);
        match &harness.renderer.commands()[0] {
            Command::Clear { buffers, state, .. } => {
                assert_eq!(*buffers, ClearBuffers::STENCIL);
                assert_eq!(state.clear_stencil, 1);
                assert_eq!(state.stencil.reference, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_stencil_clear_when_clear_is_off() {
        let mut harness = Harness::new();
        let mut pass = MaskPass::new(mask_scene()).clearing(false);
        harness.run(&mut pass, false);
        assert!(
            harness
                .renderer
                .commands()
                .iter()
                .all(|c| matches!(c, Command::RenderScene { .. }))
        );
    }

    #[test]
    fn mask_scene_serializes_inline() {
        let pass = MaskPass::new(mask_scene());
        let params = pass.serialize_params();
        assert_eq!(params["inverse"], Value::Bool(false));
        assert_eq!(params["scene"]["name"], Value::from("mask"));
        let back: MaskParams = serde_json::from_value(Value::Object(params)).unwrap();
        assert_eq!(back.scene, *pass.scene());
    }
}
