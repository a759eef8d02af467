//! A headless renderer that records calls and simulates buffer contents.

use std::collections::HashMap;

use crate::camera::CameraView;
use crate::render_target::{RenderTarget, TargetId};
use crate::scene::Scene;
use crate::shader::Uniforms;

use super::{
    Blending, ClearBuffers, FullscreenDraw, RenderState, Renderer, SceneMaterial,
};

/// One recorded renderer call, with the state that was in effect.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    RenderScene {
        scene: String,
        target: Option<TargetId>,
        clear: bool,
        material: SceneMaterial,
        state: RenderState,
    },
    Fullscreen {
        program: &'static str,
        inputs: Vec<(&'static str, TargetId)>,
        uniforms: Uniforms,
        target: Option<TargetId>,
        clear: bool,
        blending: Blending,
        state: RenderState,
    },
    Clear {
        target: Option<TargetId>,
        buffers: ClearBuffers,
        state: RenderState,
    },
    CopyFramebuffer {
        origin: (u32, u32),
        target: TargetId,
    },
}

impl Command {
    /// Destination of the call; `None` is the display.
    pub fn target(&self) -> Option<TargetId> {
        match self {
            Command::RenderScene { target, .. }
            | Command::Fullscreen { target, .. }
            | Command::Clear { target, .. } => *target,
            Command::CopyFramebuffer { target, .. } => Some(*target),
        }
    }

    /// The state snapshot, for calls that depend on it.
    pub fn state(&self) -> Option<&RenderState> {
        match self {
            Command::RenderScene { state, .. }
            | Command::Fullscreen { state, .. }
            | Command::Clear { state, .. } => Some(state),
            Command::CopyFramebuffer { .. } => None,
        }
    }

    pub fn program(&self) -> Option<&'static str> {
        match self {
            Command::Fullscreen { program, .. } => Some(program),
            _ => None,
        }
    }
}

/// Records every call and tracks a symbolic "content" string per buffer.
///
/// Content follows a few simple rules so pass chains can be checked without a GPU:
///
/// - a color clear empties the content
/// - a [`SceneMaterial::Standard`] scene draw writes the scene's name, a
///   [`SceneMaterial::Depth`] draw writes `depth(<name>)`, and a stencil-only draw
///   leaves color alone
/// - the `copy` program at full opacity passes its input through unchanged;
///   every other program writes `<program>(<input>, ...)`
/// - additive blending appends: `<existing> + <new>`
/// - nothing changes color while `color_write` is off
///
/// The stencil test is recorded in each command's state but not simulated.
#[derive(Debug)]
pub struct RecordingRenderer {
    width: u32,
    height: u32,
    state: RenderState,
    commands: Vec<Command>,
    contents: HashMap<Option<TargetId>, String>,
    allocations: HashMap<TargetId, (u32, u32)>,
    released: Vec<TargetId>,
    state_writes: usize,
}

impl RecordingRenderer {
    /// Creates a recorder whose display is `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            state: RenderState::default(),
            commands: Vec::new(),
            contents: HashMap::new(),
            allocations: HashMap::new(),
            released: Vec::new(),
            state_writes: 0,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drops recorded commands, keeping contents and state.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
        self.state_writes = 0;
    }

    /// Simulated content of `target` (`None` for the display).
    pub fn content(&self, target: Option<&RenderTarget>) -> &str {
        self.content_of(target.map(RenderTarget::id))
    }

    pub fn content_of(&self, id: Option<TargetId>) -> &str {
        self.contents.get(&id).map(String::as_str).unwrap_or("")
    }

    /// Simulated content of the display.
    pub fn screen(&self) -> &str {
        self.content_of(None)
    }

    /// Overwrites the simulated content of a target, for test setup.
    pub fn stamp(&mut self, target: Option<&RenderTarget>, content: &str) {
        self.contents
            .insert(target.map(RenderTarget::id), content.to_owned());
    }

    /// Size the target was last drawn at, if its storage is live.
    pub fn allocated_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.allocations.get(&id).copied()
    }

    /// Ids passed to [`Renderer::release_target`], in call order.
    pub fn released(&self) -> &[TargetId] {
        &self.released
    }

    /// Number of `state_mut` calls since creation or the last `clear_commands`.
    pub fn state_writes(&self) -> usize {
        self.state_writes
    }

    fn touch(&mut self, target: Option<&RenderTarget>) -> Option<TargetId> {
        target.map(|t| {
            self.allocations.insert(t.id(), t.size());
            t.id()
        })
    }

    fn write(&mut self, key: Option<TargetId>, clear: bool, blending: Blending, new: Option<String>) {
        if !self.state.color_write {
            return;
        }
        let slot = self.contents.entry(key).or_default();
        if clear {
            slot.clear();
        }
        let Some(new) = new else {
            return;
        };
        match blending {
            Blending::Additive if !slot.is_empty() => {
                slot.push_str(" + ");
                slot.push_str(&new);
            }
            _ => *slot = new,
        }
    }
}

impl Renderer for RecordingRenderer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn state(&self) -> &RenderState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderState {
        self.state_writes += 1;
        &mut self.state
    }

    fn render_scene(
        &mut self,
        scene: &Scene,
        _camera: &CameraView,
        target: Option<&RenderTarget>,
        clear: bool,
        material: SceneMaterial,
    ) {
        let key = self.touch(target);
        let clears = self.state.clears(clear);
        self.commands.push(Command::RenderScene {
            scene: scene.name.clone(),
            target: key,
            clear: clears,
            material,
            state: self.state,
        });
        let new = match material {
            SceneMaterial::Standard => Some(scene.name.clone()),
            SceneMaterial::Depth => Some(format!("depth({})", scene.name)),
            SceneMaterial::StencilOnly => None,
        };
        self.write(key, clears, Blending::Replace, new);
    }

    fn draw_fullscreen(
        &mut self,
        draw: &FullscreenDraw<'_>,
        target: Option<&RenderTarget>,
        clear: bool,
    ) {
        let key = self.touch(target);
        for binding in draw.textures {
            self.touch(Some(binding.target));
        }
        let clears = self.state.clears(clear);
        let inputs: Vec<(&'static str, TargetId)> = draw
            .textures
            .iter()
            .map(|b| (b.slot, b.target.id()))
            .collect();

        let sampled: Vec<String> = inputs
            .iter()
            .map(|(_, id)| self.content_of(Some(*id)).to_owned())
            .collect();
        let name = draw.program.name();
        let passthrough = name == "copy" && draw.uniforms.float("opacity").unwrap_or(1.0) >= 1.0;
        let new = match sampled.as_slice() {
            [only] if passthrough => only.clone(),
            _ => format!("{}({})", name, sampled.join(", ")),
        };

        self.commands.push(Command::Fullscreen {
            program: name,
            inputs,
            uniforms: draw.uniforms.clone(),
            target: key,
            clear: clears,
            blending: draw.blending,
            state: self.state,
        });
        self.write(key, clears, draw.blending, Some(new));
    }

    fn clear_target(&mut self, target: Option<&RenderTarget>, buffers: ClearBuffers) {
        let key = self.touch(target);
        self.commands.push(Command::Clear {
            target: key,
            buffers,
            state: self.state,
        });
        if buffers.color {
            self.write(key, true, Blending::Replace, None);
        }
    }

    fn copy_framebuffer_to_texture(&mut self, origin: (u32, u32), target: &RenderTarget) {
        let key = self.touch(Some(target));
        self.commands.push(Command::CopyFramebuffer {
            origin,
            target: target.id(),
        });
        let screen = self.screen().to_owned();
        self.contents.insert(key, screen);
    }

    fn release_target(&mut self, id: TargetId) {
        self.allocations.remove(&id);
        self.contents.remove(&Some(id));
        self.released.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::render_target::RenderTargetOptions;
    use crate::renderer::TextureBinding;
    use crate::shader::programs;

    fn target(label: &str) -> RenderTarget {
        RenderTarget::new(8, 8, RenderTargetOptions::default(), label)
    }

    #[test]
    fn scene_draws_stamp_the_scene_name() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let scene = Scene::new("teapot");
        let camera = Camera::default();
        let a = target("a");
        renderer.render_scene(&scene, &camera.view(), Some(&a), false, SceneMaterial::Standard);
        assert_eq!(renderer.content(Some(&a)), "teapot");
        renderer.render_scene(&scene, &camera.view(), None, false, SceneMaterial::Depth);
        assert_eq!(renderer.screen(), "depth(teapot)");
        assert_eq!(renderer.allocated_size(a.id()), Some((8, 8)));
    }

    #[test]
    fn copy_passes_content_through_and_others_wrap_it() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let a = target("a");
        let b = target("b");
        renderer.stamp(Some(&a), "scene");

        let uniforms = Uniforms::new().with("opacity", 1.0_f32);
        let textures = [TextureBinding::new("tDiffuse", &a)];
        let draw = FullscreenDraw::new(&programs::COPY, &uniforms, &textures);
        renderer.draw_fullscreen(&draw, Some(&b), false);
        assert_eq!(renderer.content(Some(&b)), "scene");

        let empty = Uniforms::new();
        let draw = FullscreenDraw::new(&programs::FXAA, &empty, &textures);
        renderer.draw_fullscreen(&draw, None, false);
        assert_eq!(renderer.screen(), "fxaa(scene)");
    }

    #[test]
    fn additive_draws_layer_without_clearing() {
        let mut renderer = RecordingRenderer::new(8, 8);
        renderer.state_mut().auto_clear = false;
        let a = target("a");
        let b = target("b");
        renderer.stamp(Some(&a), "blur");
        renderer.stamp(Some(&b), "scene");

        let empty = Uniforms::new();
        let textures = [TextureBinding::new("tDiffuse", &a)];
        let draw = FullscreenDraw::new(&programs::CONVOLUTION, &empty, &textures)
            .with_blending(Blending::Additive);
        renderer.draw_fullscreen(&draw, Some(&b), false);
        assert_eq!(renderer.content(Some(&b)), "scene + convolution(blur)");
    }

    #[test]
    fn color_write_off_keeps_content() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let a = target("a");
        renderer.stamp(Some(&a), "kept");
        renderer.state_mut().color_write = false;
        renderer.clear_target(Some(&a), ClearBuffers::ALL);
        assert_eq!(renderer.content(Some(&a)), "kept");
        assert_eq!(renderer.commands().len(), 1);
    }

    #[test]
    fn framebuffer_copies_read_the_display() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let a = target("a");
        renderer.stamp(None, "final");
        renderer.copy_framebuffer_to_texture((0, 0), &a);
        assert_eq!(renderer.content(Some(&a)), "final");
        assert_eq!(renderer.commands()[0].target(), Some(a.id()));
    }

    #[test]
    fn release_drops_storage() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let a = target("a");
        renderer.clear_target(Some(&a), ClearBuffers::COLOR);
        assert!(renderer.allocated_size(a.id()).is_some());
        renderer.release_target(a.id());
        assert!(renderer.allocated_size(a.id()).is_none());
        assert_eq!(renderer.released(), &[a.id()]);
    }
}
