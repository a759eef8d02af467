//! Depth-of-field blur.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FrameContext, Pass, PassCore, PassKind, params_map, render_depth};
use crate::render_target::{RenderTarget, RenderTargetOptions};
use crate::renderer::{FullscreenDraw, Renderer, TextureBinding};
use crate::shader::{Uniforms, programs};

/// Serialized fields of a [`BokehPass`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BokehParams {
    /// Distance in focus, in world units.
    pub focus: f32,
    pub aperture: f32,
    /// Upper bound of the blur radius, in UV units.
    pub maxblur: f32,
}

impl Default for BokehParams {
    fn default() -> Self {
        Self {
            focus: 1.0,
            aperture: 1.0,
            maxblur: 0.2,
        }
    }
}

/// Blurs pixels by their distance from the focal plane.
pub struct BokehPass {
    core: PassCore,
    params: BokehParams,
    depth: RenderTarget,
}

impl BokehPass {
    pub fn new(focus: f32, aperture: f32, maxblur: f32) -> Self {
        Self::with_params(BokehParams {
            focus,
            aperture,
            maxblur,
        })
    }

    pub fn with_params(params: BokehParams) -> Self {
        Self {
            core: PassCore::new(true),
            params,
            depth: RenderTarget::new(1, 1, RenderTargetOptions::default(), "Bokeh Depth"),
        }
    }

    pub fn focus(&self) -> f32 {
        self.params.focus
    }

    pub fn set_focus(&mut self, focus: f32) {
        self.params.focus = focus;
    }

    pub fn aperture(&self) -> f32 {
        self.params.aperture
    }

    pub fn set_aperture(&mut self, aperture: f32) {
        self.params.aperture = aperture;
    }

    pub fn maxblur(&self) -> f32 {
        self.params.maxblur
    }

    pub fn set_maxblur(&mut self, maxblur: f32) {
        self.params.maxblur = maxblur;
    }

    pub fn depth_target(&self) -> &RenderTarget {
        &self.depth
    }
}

impl Default for BokehPass {
    fn default() -> Self {
        Self::with_params(BokehParams::default())
    }
}

impl Pass for BokehPass {
    fn kind(&self) -> PassKind {
        PassKind::Bokeh
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

        let uniforms = Uniforms::new()
            .with("focus", self.params.focus)
            .with("aperture", self.params.aperture)
            .with("maxblur", self.params.maxblur)
            .with("nearClip", frame.camera.near)
            .with("farClip", frame.camera.far)
            .with("aspect", frame.camera.aspect);
        let textures = [
            TextureBinding::new("tColor", read_buffer),
            TextureBinding::new("tDepth", &self.depth),
        ];
        let draw = FullscreenDraw::new(&programs::BOKEH, &uniforms, &textures);
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
