//! Separable convolution bloom at a fixed working resolution.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shader_pass::INPUT_SLOT;
use super::{FrameContext, Pass, PassCore, PassKind, params_map};
use crate::render_target::{RenderTarget, RenderTargetOptions};
use crate::renderer::{Blending, FullscreenDraw, Renderer, StateGuard, TextureBinding};
use crate::shader::{Uniforms, programs};

/// Largest kernel the convolution program accepts.
pub const MAX_KERNEL_SIZE: u32 = 25;

/// Blur step along each axis, in UV units of the working target.
const BLUR_STEP: f32 = 0.001953125;

/// Serialized fields of a [`BloomPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BloomParams {
    /// Opacity of the blurred layer added over the frame.
    pub strength: f32,
    /// Taps per convolution, capped at [`MAX_KERNEL_SIZE`].
    pub kernel_size: u32,
    /// Gaussian standard deviation, in taps.
    pub sigma: f32,
    /// Side length of the square blur targets.
    pub resolution: u32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            strength: 1.0,
            kernel_size: 25,
            sigma: 4.0,
            resolution: 256,
        }
    }
}

/// Blurs the frame horizontally then vertically into two square targets,
/// then adds the result over a copy of the input.
pub struct BloomPass {
    core: PassCore,
    params: BloomParams,
    kernel: Vec<f32>,
    blur_x: RenderTarget,
    blur_y: RenderTarget,
}

impl BloomPass {
    pub fn new(strength: f32, kernel_size: u32, sigma: f32, resolution: u32) -> Self {
        Self::with_params(BloomParams {
            strength,
            kernel_size,
            sigma,
            resolution,
        })
    }

    pub fn with_params(params: BloomParams) -> Self {
        let options = RenderTargetOptions::color_only();
        let side = params.resolution.max(1);
        Self {
            core: PassCore::new(true),
            kernel: build_kernel(params.sigma),
            blur_x: RenderTarget::new(side, side, options, "Bloom X"),
            blur_y: RenderTarget::new(side, side, options, "Bloom Y"),
            params,
        }
    }

    pub fn strength(&self) -> f32 {
        self.params.strength
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.params.strength = strength;
    }

    pub fn kernel_size(&self) -> u32 {
        self.params.kernel_size
    }

    pub fn set_kernel_size(&mut self, kernel_size: u32) {
        self.params.kernel_size = kernel_size;
    }

    pub fn sigma(&self) -> f32 {
        self.params.sigma
    }

    pub fn set_sigma(&mut self, sigma: f32) {
        self.params.sigma = sigma;
        self.kernel = build_kernel(sigma);
    }

    pub fn resolution(&self) -> u32 {
        self.params.resolution
    }

    /// Changes the blur targets' side length. Storage is reallocated on next use.
    pub fn set_resolution(&mut self, resolution: u32) {
        self.params.resolution = resolution;
        let side = resolution.max(1);
        self.blur_x.set_size(side, side);
        self.blur_y.set_size(side, side);
    }

    /// Normalized convolution weights built from `sigma`.
    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    /// The horizontal and vertical blur targets.
    pub fn targets(&self) -> (&RenderTarget, &RenderTarget) {
        (&self.blur_x, &self.blur_y)
    }

    fn convolve(
        &self,
        renderer: &mut dyn Renderer,
        source: &RenderTarget,
        target: &RenderTarget,
        increment: Vec2,
    ) {
        let taps = self.params.kernel_size.min(self.kernel.len() as u32);
        let uniforms = Uniforms::new()
            .with("uImageIncrement", increment)
            .with("kernelSize", taps as f32)
            .with("cKernel", self.kernel.clone());
        let textures = [TextureBinding::new(INPUT_SLOT, source)];
        let draw = FullscreenDraw::new(&programs::CONVOLUTION, &uniforms, &textures);
        renderer.draw_fullscreen(&draw, Some(target), true);
    }
}

impl Default for BloomPass {
    fn default() -> Self {
        Self::with_params(BloomParams::default())
    }
}

impl Pass for BloomPass {
    fn kind(&self) -> PassKind {
        PassKind::Bloom
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
        if frame.mask_active {
            renderer.state_mut().stencil.enabled = false;
        }

        self.convolve(
            &mut *renderer,
            read_buffer,
            &self.blur_x,
            Vec2::new(BLUR_STEP, 0.0),
        );
        self.convolve(
            &mut *renderer,
            &self.blur_x,
            &self.blur_y,
            Vec2::new(0.0, BLUR_STEP),
        );

        if frame.mask_active {
            renderer.state_mut().stencil.enabled = true;
        }

        let destination = self.core.destination(write_buffer);
        let opaque = Uniforms::new().with("opacity", 1.0_f32);
        let input = [TextureBinding::new(INPUT_SLOT, read_buffer)];
        let copy = FullscreenDraw::new(&programs::COPY, &opaque, &input);
        renderer.draw_fullscreen(&copy, destination, self.core.clear);

        renderer.state_mut().auto_clear = false;
        let glow = Uniforms::new().with("opacity", self.params.strength);
        let blurred = [TextureBinding::new(INPUT_SLOT, &self.blur_y)];
        let add = FullscreenDraw::new(&programs::COPY, &glow, &blurred)
            .with_blending(Blending::Additive);
        renderer.draw_fullscreen(&add, destination, false);
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        self.blur_x.release(renderer);
        self.blur_y.release(renderer);
    }

    fn serialize_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}

/// Gaussian weights for a kernel sized to cover three standard deviations,
/// normalized to sum to one.
pub fn build_kernel(sigma: f32) -> Vec<f32> {
    let sigma = sigma.max(f32::EPSILON);
    let size = ((2.0 * (sigma * 3.0).ceil()) as u32 + 1).min(MAX_KERNEL_SIZE);
    let half_width = (size as f32 - 1.0) * 0.5;

    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - half_width;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::test_support::Harness;
    use crate::renderer::Command;

    #[test]
    fn kernel_is_normalized_and_capped() {
        let kernel = build_kernel(4.0);
        assert_eq!(kernel.len(), 25);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel[0], kernel[24]);

        assert_eq!(build_kernel(1.0).len(), 7);
    }

    #[test]
    fn composites_blur_over_copied_input() {
        let mut harness = Harness::new();
        let mut pass = BloomPass::default();
        harness.run(&mut pass, false);
        assert_eq!(
            harness.write_content(),
            "input + convolution(convolution(input))"
        );
        assert_eq!(harness.renderer.content(Some(&harness.read)), "input");
        assert_eq!(
            harness.renderer.allocated_size(pass.targets().0.id()),
            Some((256, 256))
        );
    }

    #[test]
    fn internal_blurs_ignore_the_mask() {
        let mut harness = Harness::new();
        harness.renderer.state_mut().stencil.enabled = true;
        let mut pass = BloomPass::default();
        harness.run(&mut pass, true);

        let stencil: Vec<bool> = harness
            .renderer
            .commands()
            .iter()
            .filter_map(Command::state)
            .map(|s| s.stencil.enabled)
            .collect();
        assert_eq!(stencil, [false, false, true, true]);
        assert!(harness.renderer.state().stencil.enabled);
    }

    #[test]
    fn resize_keeps_fixed_resolution() {
        let mut pass = BloomPass::default();
        pass.set_size(1920, 1080);
        assert_eq!(pass.targets().0.size(), (256, 256));
        pass.set_resolution(128);
        assert_eq!(pass.targets().1.size(), (128, 128));
    }

    #[test]
    fn dispose_releases_both_targets() {
        let mut harness = Harness::new();
        let mut pass = BloomPass::default();
        pass.dispose(&mut harness.renderer);
        assert_eq!(
            harness.renderer.released(),
            &[pass.targets().0.id(), pass.targets().1.id()]
        );
    }
}
