//! Color grading passes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shader_pass::INPUT_SLOT;
use super::{FrameContext, Pass, PassCore, PassKind, draw_effect, hex_to_rgb, params_map};
use crate::render_target::RenderTarget;
use crate::shader::{Uniforms, programs};

/// Serialized fields of a [`ColorifyPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorifyParams {
    /// Tint as `0xRRGGBB`.
    pub color: u32,
}

impl Default for ColorifyParams {
    fn default() -> Self {
        Self { color: 0xffffff }
    }
}

/// Replaces each pixel with its luminance times a tint color.
pub struct ColorifyPass {
    core: PassCore,
    params: ColorifyParams,
}

impl ColorifyPass {
    pub fn new(color: u32) -> Self {
        Self::with_params(ColorifyParams { color })
    }

    pub fn with_params(params: ColorifyParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
        }
    }

    pub fn color(&self) -> u32 {
        self.params.color
    }

    pub fn set_color(&mut self, color: u32) {
        self.params.color = color & 0xffffff;
    }
}

impl Default for ColorifyPass {
    fn default() -> Self {
        Self::with_params(ColorifyParams::default())
    }
}

impl Pass for ColorifyPass {
    fn kind(&self) -> PassKind {
        PassKind::Colorify
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
        let uniforms = Uniforms::new().with("color", hex_to_rgb(self.params.color));
        draw_effect(
            frame,
            &self.core,
            &programs::COLORIFY,
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

/// Serialized fields of a [`HueSaturationPass`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HueSaturationParams {
    /// Hue rotation in `[-1, 1]`, where 1 is a full turn.
    pub hue: f32,
    /// Saturation change in `[-1, 1]`; -1 is grayscale.
    pub saturation: f32,
}

/// Shifts hue and scales saturation.
pub struct HueSaturationPass {
    core: PassCore,
    params: HueSaturationParams,
}

impl HueSaturationPass {
    pub fn new(hue: f32, saturation: f32) -> Self {
        Self::with_params(HueSaturationParams { hue, saturation })
    }

    pub fn with_params(params: HueSaturationParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
        }
    }

    pub fn hue(&self) -> f32 {
        self.params.hue
    }

    pub fn set_hue(&mut self, hue: f32) {
        self.params.hue = hue;
    }

    pub fn saturation(&self) -> f32 {
        self.params.saturation
    }

    pub fn set_saturation(&mut self, saturation: f32) {
        self.params.saturation = saturation;
    }
}

impl Default for HueSaturationPass {
    fn default() -> Self {
        Self::with_params(HueSaturationParams::default())
    }
}

impl Pass for HueSaturationPass {
    fn kind(&self) -> PassKind {
        PassKind::HueSaturation
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
            .with("hue", self.params.hue)
            .with("saturation", self.params.saturation);
        draw_effect(
            frame,
            &self.core,
            &programs::HUE_SATURATION,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::Command;
    use crate::shader::UniformValue;
    use glam::Vec3;

    #[test]
    fn colorify_sends_tint_as_rgb() {
        let mut harness = Harness::new();
        let mut pass = ColorifyPass::new(0x00ff00);
        harness.run(&mut pass, false);
        assert_eq!(harness.write_content(), "colorify(input)");
        match &harness.renderer.commands()[0] {
            Command::Fullscreen { uniforms, .. } => {
                assert_eq!(uniforms.get("color"), Some(&UniformValue::Vec3(Vec3::Y)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn colorify_serializes_hex() {
        let mut pass = ColorifyPass::default();
        assert_eq!(pass.serialize_params().get("color"), Some(&Value::from(0xffffff)));
        pass.set_color(0x1ff0000);
        assert_eq!(pass.color(), 0xff0000);
    }

    #[test]
    fn hue_saturation_defaults_are_neutral() {
        let pass = HueSaturationPass::default();
        assert_eq!(pass.hue(), 0.0);
        assert_eq!(pass.saturation(), 0.0);
    }
}
