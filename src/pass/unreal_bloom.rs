//! Multi-resolution bloom: bright-pass extraction, a chain of blurred mips,
//! and a weighted composite.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shader_pass::INPUT_SLOT;
use super::{FrameContext, Pass, PassCore, PassKind, params_map};
use crate::render_target::{RenderTarget, RenderTargetOptions};
use crate::renderer::{Blending, FullscreenDraw, Renderer, StateGuard, TextureBinding};
use crate::shader::{Uniforms, programs};

/// Number of blur mip levels.
pub const MIP_COUNT: usize = 5;

/// Blur radius per mip, in taps.
const KERNEL_RADII: [u32; MIP_COUNT] = [3, 5, 7, 9, 11];

const BLUR_SLOTS: [&str; MIP_COUNT] = [
    "blurTexture1",
    "blurTexture2",
    "blurTexture3",
    "blurTexture4",
    "blurTexture5",
];

/// Serialized fields of an [`UnrealBloomPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnrealBloomParams {
    pub strength: f32,
    /// Blend between the mip weights and their mirrored values; larger spreads wider.
    pub radius: f32,
    /// Luminance above which pixels bloom.
    pub threshold: f32,
    /// Initial working size before the first `set_size`.
    pub resolution: Vec2,
    /// Weight of each mip in the composite.
    pub bloom_factors: [f32; MIP_COUNT],
    /// Tint of each mip in the composite.
    pub bloom_tint_colors: [Vec3; MIP_COUNT],
}

impl Default for UnrealBloomParams {
    fn default() -> Self {
        Self {
            strength: 1.5,
            radius: 0.4,
            threshold: 0.85,
            resolution: Vec2::new(256.0, 256.0),
            bloom_factors: [1.0, 0.8, 0.6, 0.4, 0.2],
            bloom_tint_colors: [Vec3::ONE; MIP_COUNT],
        }
    }
}

/// One mip: horizontal then vertical blur targets and the blur weights.
struct Mip {
    horizontal: RenderTarget,
    vertical: RenderTarget,
    radius: u32,
    coefficients: Vec<f32>,
}

/// Bloom over progressively halved blur targets.
///
/// The bright parts of the input are extracted at half resolution, blurred
/// into [`MIP_COUNT`] mips, combined with per-mip factors and tints, and
/// added over a copy of the input.
pub struct UnrealBloomPass {
    core: PassCore,
    params: UnrealBloomParams,
    bright: RenderTarget,
    mips: Vec<Mip>,
}

impl UnrealBloomPass {
    pub fn new(resolution: Vec2, strength: f32, radius: f32, threshold: f32) -> Self {
        Self::with_params(UnrealBloomParams {
            resolution,
            strength,
            radius,
            threshold,
            ..Default::default()
        })
    }

    pub fn with_params(params: UnrealBloomParams) -> Self {
        let options = RenderTargetOptions::color_only();
        let (mut width, mut height) = half(
            params.resolution.x.max(1.0) as u32,
            params.resolution.y.max(1.0) as u32,
        );
        let bright = RenderTarget::new(width, height, options, "UnrealBloom Bright");

        let mut mips = Vec::with_capacity(MIP_COUNT);
        for (i, radius) in KERNEL_RADII.into_iter().enumerate() {
            mips.push(Mip {
                horizontal: RenderTarget::new(width, height, options, &format!("Bloom H{i}")),
                vertical: RenderTarget::new(width, height, options, &format!("Bloom V{i}")),
                radius,
                coefficients: gaussian_coefficients(radius),
            });
            (width, height) = half(width, height);
        }

        Self {
            core: PassCore::new(true),
            params,
            bright,
            mips,
        }
    }

    pub fn strength(&self) -> f32 {
        self.params.strength
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.params.strength = strength;
    }

    pub fn radius(&self) -> f32 {
        self.params.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.params.radius = radius;
    }

    pub fn threshold(&self) -> f32 {
        self.params.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.params.threshold = threshold;
    }

    pub fn bloom_factors(&self) -> &[f32; MIP_COUNT] {
        &self.params.bloom_factors
    }

    pub fn set_bloom_factors(&mut self, factors: [f32; MIP_COUNT]) {
        self.params.bloom_factors = factors;
    }

    pub fn bloom_tint_colors(&self) -> &[Vec3; MIP_COUNT] {
        &self.params.bloom_tint_colors
    }

    pub fn set_bloom_tint_colors(&mut self, colors: [Vec3; MIP_COUNT]) {
        self.params.bloom_tint_colors = colors;
    }

    /// Sizes of the bright target followed by each mip.
    pub fn target_sizes(&self) -> Vec<(u32, u32)> {
        std::iter::once(self.bright.size())
            .chain(self.mips.iter().map(|m| m.horizontal.size()))
            .collect()
    }

    fn extract_bright(&self, renderer: &mut dyn Renderer, read_buffer: &RenderTarget) {
        let uniforms = Uniforms::new()
            .with("luminosityThreshold", self.params.threshold)
            .with("smoothWidth", 0.01_f32)
            .with("defaultColor", Vec3::ZERO)
            .with("defaultOpacity", 0.0_f32);
        let textures = [TextureBinding::new(INPUT_SLOT, read_buffer)];
        let draw = FullscreenDraw::new(&programs::LUMINOSITY_HIGH_PASS, &uniforms, &textures);
        renderer.draw_fullscreen(&draw, Some(&self.bright), true);
    }

    fn blur(
        renderer: &mut dyn Renderer,
        mip: &Mip,
        source: &RenderTarget,
        target: &RenderTarget,
        direction: Vec2,
    ) {
        let (width, height) = target.size();
        let uniforms = Uniforms::new()
            .with("texSize", Vec2::new(width as f32, height as f32))
            .with("direction", direction)
            .with("kernelRadius", mip.radius as f32)
            .with("gaussianCoefficients", mip.coefficients.clone());
        let textures = [TextureBinding::new("colorTexture", source)];
        let draw = FullscreenDraw::new(&programs::SEPARABLE_BLUR, &uniforms, &textures);
        renderer.draw_fullscreen(&draw, Some(target), true);
    }

    fn composite(&self, renderer: &mut dyn Renderer) {
        let tints: Vec<f32> = self
            .params
            .bloom_tint_colors
            .iter()
            .flat_map(|c| [c.x, c.y, c.z, 0.0])
            .collect();
        let uniforms = Uniforms::new()
            .with("bloomStrength", self.params.strength)
            .with("bloomRadius", self.params.radius)
            .with("bloomFactors", self.params.bloom_factors.to_vec())
            .with("bloomTintColors", tints);
        let textures: Vec<TextureBinding<'_>> = BLUR_SLOTS
            .into_iter()
            .zip(&self.mips)
            .map(|(slot, mip)| TextureBinding::new(slot, &mip.vertical))
            .collect();
        let draw = FullscreenDraw::new(&programs::UNREAL_COMPOSITE, &uniforms, &textures);
        renderer.draw_fullscreen(&draw, Some(&self.mips[0].horizontal), true);
    }
}

impl Default for UnrealBloomPass {
    fn default() -> Self {
        Self::with_params(UnrealBloomParams::default())
    }
}

impl Pass for UnrealBloomPass {
    fn kind(&self) -> PassKind {
        PassKind::UnrealBloom
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
        let mut renderer = StateGuard::new(&mut *frame.renderer);
        let state = renderer.state_mut();
        state.clear_color = Vec3::ZERO;
        state.clear_alpha = 0.0;
        state.auto_clear = false;
        if frame.mask_active {
            state.stencil.enabled = false;
        }

        self.extract_bright(&mut *renderer, read_buffer);

        let mut source = &self.bright;
        for mip in &self.mips {
            Self::blur(&mut *renderer, mip, source, &mip.horizontal, Vec2::X);
            Self::blur(&mut *renderer, mip, &mip.horizontal, &mip.vertical, Vec2::Y);
            source = &mip.vertical;
        }

        self.composite(&mut *renderer);

        if frame.mask_active {
            renderer.state_mut().stencil.enabled = true;
        }

        let destination = self.core.destination(write_buffer);
        let opaque = Uniforms::new().with("opacity", 1.0_f32);
        let input = [TextureBinding::new(INPUT_SLOT, read_buffer)];
        let copy = FullscreenDraw::new(&programs::COPY, &opaque, &input);
        renderer.draw_fullscreen(&copy, destination, true);

        let bloom = [TextureBinding::new(INPUT_SLOT, &self.mips[0].horizontal)];
        let add = FullscreenDraw::new(&programs::COPY, &opaque, &bloom)
            .with_blending(Blending::Additive);
        renderer.draw_fullscreen(&add, destination, false);
    }

    fn set_size(&mut self, width: u32, height: u32) {
        let (mut width, mut height) = half(width, height);
        self.bright.set_size(width, height);
        for mip in &mut self.mips {
            mip.horizontal.set_size(width, height);
            mip.vertical.set_size(width, height);
            (width, height) = half(width, height);
        }
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        self.bright.release(renderer);
        for mip in &mut self.mips {
            mip.horizontal.release(renderer);
            mip.vertical.release(renderer);
        }
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

fn half(width: u32, height: u32) -> (u32, u32) {
    (
        ((width as f32 / 2.0).round() as u32).max(1),
        ((height as f32 / 2.0).round() as u32).max(1),
    )
}

/// Normal-distribution weights `0..radius` with sigma equal to the radius.
fn gaussian_coefficients(radius: u32) -> Vec<f32> {
    let sigma = radius as f32;
    (0..radius)
        .map(|i| {
            let x = i as f32;
            0.39894 * (-0.5 * x * x / (sigma * sigma)).exp() / sigma
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::Command;

    #[test]
    fn mips_halve_from_frame_size() {
        let mut pass = UnrealBloomPass::default();
        pass.set_size(800, 600);
        assert_eq!(
            pass.target_sizes(),
            [(400, 300), (400, 300), (200, 150), (100, 75), (50, 38), (25, 19)]
        );
    }

    #[test]
    fn renders_bright_pass_blurs_and_composite() {
        let mut harness = Harness::new();
        let mut pass = UnrealBloomPass::default();
        harness.run(&mut pass, false);

        let programs: Vec<&str> = harness
            .renderer
            .commands()
            .iter()
            .filter_map(Command::program)
            .collect();
        assert_eq!(programs.len(), 1 + 2 * MIP_COUNT + 1 + 2);
        assert_eq!(programs[0], "luminosity_high_pass");
        assert_eq!(programs[11], "unreal_composite");
        assert!(harness.write_content().starts_with("input + unreal_composite("));
    }

    #[test]
    fn restores_renderer_state() {
        let mut harness = Harness::new();
        harness.renderer.state_mut().stencil.enabled = true;
        let before = *harness.renderer.state();
        harness.run(&mut UnrealBloomPass::default(), true);
        assert_eq!(*harness.renderer.state(), before);

        let first = harness.renderer.commands()[0].state().copied();
        assert_eq!(first.map(|s| s.stencil.enabled), Some(false));
        let last = harness.renderer.commands().last().and_then(Command::state).copied();
        assert_eq!(last.map(|s| s.stencil.enabled), Some(true));
    }

    #[test]
    fn coefficients_peak_at_center() {
        let c = gaussian_coefficients(3);
        assert_eq!(c.len(), 3);
        assert!(c[0] > c[1] && c[1] > c[2]);
    }

    #[test]
    fn tint_colors_serialize_as_nested_arrays() {
        let params = UnrealBloomPass::default().serialize_params();
        assert_eq!(params["bloomTintColors"][4], serde_json::json!([1.0, 1.0, 1.0]));
        assert_eq!(params["bloomFactors"].as_array().map(Vec::len), Some(5));
    }
}
