//! Halftone dot pattern.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shader_pass::INPUT_SLOT;
use super::{FrameContext, Pass, PassCore, PassKind, draw_effect, params_map};
use crate::render_target::RenderTarget;
use crate::shader::{Uniforms, programs};

/// Serialized fields of a [`DotScreenPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotScreenParams {
    /// Pattern origin in pixels.
    pub center: Vec2,
    /// Pattern rotation in radians.
    pub angle: f32,
    /// Dot frequency.
    pub scale: f32,
}

impl Default for DotScreenParams {
    fn default() -> Self {
        Self {
            center: Vec2::new(0.5, 0.5),
            angle: 0.5,
            scale: 0.8,
        }
    }
}

/// Renders the input as a monochrome halftone screen.
pub struct DotScreenPass {
    core: PassCore,
    params: DotScreenParams,
    size: Vec2,
}

impl DotScreenPass {
    pub fn new(center: Vec2, angle: f32, scale: f32) -> Self {
        Self::with_params(DotScreenParams {
            center,
            angle,
            scale,
        })
    }

    pub fn with_params(params: DotScreenParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
            size: Vec2::splat(256.0),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.params.center
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.params.center = center;
    }

    pub fn angle(&self) -> f32 {
        self.params.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.params.angle = angle;
    }

    pub fn scale(&self) -> f32 {
        self.params.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.params.scale = scale;
    }
}

impl Default for DotScreenPass {
    fn default() -> Self {
        Self::with_params(DotScreenParams::default())
    }
}

impl Pass for DotScreenPass {
    fn kind(&self) -> PassKind {
        PassKind::DotScreen
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
        let uniforms = Uniforms::new()
            .with("tSize", self.size)
            .with("center", self.params.center)
            .with("angle", self.params.angle)
            .with("scale", self.params.scale);
        draw_effect(
            frame,
            &self.core,
            &programs::DOT_SCREEN,
            INPUT_SLOT,
            &uniforms,
            write_buffer,
            read_buffer,
        );
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::Command;

    #[test]
    fn center_serializes_as_array() {
        let pass = DotScreenPass::default();
        assert_eq!(
            pass.serialize_params().get("center"),
            Some(&serde_json::json!([0.5, 0.5]))
        );
    }

    #[test]
    fn pattern_size_follows_frame() {
        let mut harness = Harness::new();
        let mut pass = DotScreenPass::default();
        pass.set_size(64, 32);
        harness.run(&mut pass, false);
        match &harness.renderer.commands()[0] {
            Command::Fullscreen { uniforms, program, .. } => {
                assert_eq!(*program, "dot_screen");
                assert_eq!(uniforms.get("tSize"), Some(&Vec2::new(64.0, 32.0).into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
