//! Film grain and scanlines.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shader_pass::INPUT_SLOT;
use super::{FrameContext, Pass, PassCore, PassKind, draw_effect, params_map};
use crate::render_target::RenderTarget;
use crate::shader::{Uniforms, programs};

/// Serialized fields of a [`FilmPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilmParams {
    pub grayscale: bool,
    /// Grain strength in `[0, 1]`.
    pub noise_intensity: f32,
    /// Scanline strength in `[0, 1]`.
    pub scanlines_intensity: f32,
    pub scanlines_count: f32,
}

impl Default for FilmParams {
    fn default() -> Self {
        Self {
            grayscale: false,
            noise_intensity: 0.35,
            scanlines_intensity: 0.5,
            scanlines_count: 512.0,
        }
    }
}

/// Animated film grain with scanlines, optionally in grayscale.
///
/// The grain is seeded by an internal clock that advances by the frame delta
/// every time the pass renders.
pub struct FilmPass {
    core: PassCore,
    params: FilmParams,
    time: f32,
}

impl FilmPass {
    pub fn new() -> Self {
        Self::with_params(FilmParams::default())
    }

    pub fn with_params(params: FilmParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
            time: 0.0,
        }
    }

    pub fn grayscale(&self) -> bool {
        self.params.grayscale
    }

    pub fn set_grayscale(&mut self, grayscale: bool) {
        self.params.grayscale = grayscale;
    }

    pub fn noise_intensity(&self) -> f32 {
        self.params.noise_intensity
    }

    pub fn set_noise_intensity(&mut self, intensity: f32) {
        self.params.noise_intensity = intensity;
    }

    pub fn scanlines_intensity(&self) -> f32 {
        self.params.scanlines_intensity
    }

    pub fn set_scanlines_intensity(&mut self, intensity: f32) {
        self.params.scanlines_intensity = intensity;
    }

    pub fn scanlines_count(&self) -> f32 {
        self.params.scanlines_count
    }

    pub fn set_scanlines_count(&mut self, count: f32) {
        self.params.scanlines_count = count;
    }

    /// Accumulated frame time.
    pub fn time(&self) -> f32 {
        self.time
    }
}

impl Default for FilmPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for FilmPass {
    fn kind(&self) -> PassKind {
        PassKind::Film
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
        self.time += frame.delta;
        let uniforms = Uniforms::new()
            .with("time", self.time)
            .with("nIntensity", self.params.noise_intensity)
            .with("sIntensity", self.params.scanlines_intensity)
            .with("sCount", self.params.scanlines_count)
            .with("grayscale", self.params.grayscale);
        draw_effect(
            frame,
            &self.core,
            &programs::FILM,
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

    #[test]
    fn time_accumulates_delta() {
        let mut harness = Harness::new();
        let mut pass = FilmPass::new();
        harness.run(&mut pass, false);
        harness.run(&mut pass, false);
        assert_eq!(pass.time(), 1.0);
        match harness.renderer.commands().last() {
            Some(Command::Fullscreen { uniforms, .. }) => {
                assert_eq!(uniforms.float("time"), Some(1.0));
                assert_eq!(uniforms.float("grayscale"), Some(0.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn params_use_camel_case_names() {
        let params = FilmPass::new().serialize_params();
        let mut keys: Vec<&str> = params.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["grayscale", "noiseIntensity", "scanlinesCount", "scanlinesIntensity"]
        );
    }
}
