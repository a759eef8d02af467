//! The effect composer: ping-pong buffers driving an ordered chain of passes.
//!
//! A [`Composer`] owns two same-size render targets and a list of boxed
//! [`Pass`]es. Each frame it walks the list in order, handing every enabled pass
//! the current write and read buffers:
//!
//! ```text
//! Render  : scene      → write(A)        swap
//! Bloom   : read(A)    → write(B)        swap
//! Copy    : read(B)    → display         swap
//! ```
//!
//! Passes that set `needs_swap` flip the buffers afterwards, so the next pass
//! reads what this one wrote. A [`MaskPass`](crate::MaskPass) turns the stencil
//! test on for the passes that follow, until a
//! [`ClearMaskPass`](crate::ClearMaskPass) turns it off again.
//!
//! # Example
//!
//! ```
//! use afterglow::{Camera, Composer, ComposerConfig, CopyPass, FilmPass, Pass};
//! use afterglow::{RecordingRenderer, RenderPass, Scene};
//!
//! let mut composer = Composer::with_config(ComposerConfig::new().size(640, 480));
//! composer.add_pass(RenderPass::new());
//! composer.add_pass(FilmPass::new());
//! composer.add_pass(CopyPass::new().rendering_to_screen());
//!
//! let mut renderer = RecordingRenderer::new(640, 480);
//! let camera = Camera::default();
//! composer
//!     .render(&mut renderer, &Scene::new("demo"), &camera.view(), 0.016)
//!     .unwrap();
//! assert_eq!(renderer.screen(), "film(demo)");
//! ```

mod descriptor;

pub use descriptor::{ComposerDescriptor, Decoded};

use crate::camera::CameraView;
use crate::config::ComposerConfig;
use crate::error::ComposerError;
use crate::pass::{CopyPass, FrameContext, Pass, PassId, PassKind};
use crate::render_target::RenderTarget;
use crate::renderer::{CompareFunction, Renderer, StateGuard};
use crate::scene::Scene;

/// Stencil read mask used while a mask is active.
const MASK_ALL: u32 = 0xffff_ffff;

/// The two buffers a composer alternates between.
struct PingPong {
    write: RenderTarget,
    read: RenderTarget,
}

impl PingPong {
    fn new(config: &ComposerConfig, width: u32, height: u32) -> Self {
        let options = config.target_options;
        Self {
            write: RenderTarget::new(width, height, options, &format!("{} A", config.label)),
            read: RenderTarget::new(width, height, options, &format!("{} B", config.label)),
        }
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.write, &mut self.read);
    }
}

/// Runs an ordered chain of post-processing passes over two ping-pong buffers.
///
/// The composer owns its passes. Buffers are released with
/// [`dispose`](Self::dispose) and can be brought back with
/// [`reset`](Self::reset); in between, frame and resize operations return
/// [`ComposerError::Disposed`].
pub struct Composer {
    id: String,
    config: ComposerConfig,
    width: u32,
    height: u32,
    buffers: Option<PingPong>,
    passes: Vec<Box<dyn Pass>>,
    copy_pass: CopyPass,
}

impl Composer {
    /// Creates an empty composer with 1×1 buffers.
    pub fn new() -> Self {
        Self::with_config(ComposerConfig::default())
    }

    /// Creates an empty composer with buffers sized and formatted per `config`.
    pub fn with_config(config: ComposerConfig) -> Self {
        let width = config.width.max(1);
        let height = config.height.max(1);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            buffers: Some(PingPong::new(&config, width, height)),
            config,
            width,
            height,
            passes: Vec::new(),
            copy_pass: CopyPass::new(),
        }
    }

    /// Renders one frame through every enabled pass.
    ///
    /// # Arguments
    ///
    /// * `renderer` - Backend that executes the draws
    /// * `scene` - Scene drawn by render passes
    /// * `camera` - View the scene is drawn from
    /// * `delta` - Seconds since the previous frame, for animated passes
    ///
    /// # Errors
    ///
    /// [`ComposerError::Disposed`] if the buffers have been released.
    pub fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        scene: &Scene,
        camera: &CameraView,
        delta: f32,
    ) -> Result<(), ComposerError> {
        let buffers = self.buffers.as_mut().ok_or(ComposerError::Disposed)?;
        let mut mask_active = false;

        for pass in self.passes.iter_mut().filter(|pass| pass.enabled()) {
            log::trace!("rendering {} pass {}", pass.kind(), pass.id());
            let mut frame = FrameContext {
                renderer: &mut *renderer,
                scene,
                camera,
                delta,
                mask_active,
            };
            pass.render(&mut frame, &buffers.write, &buffers.read);

            if pass.needs_swap() {
                if mask_active {
                    restore_unmasked(
                        &mut self.copy_pass,
                        renderer,
                        scene,
                        camera,
                        delta,
                        buffers,
                    );
                }
                buffers.swap();
            }

            match pass.kind() {
                PassKind::Mask => mask_active = true,
                PassKind::ClearMask => mask_active = false,
                _ => {}
            }
        }
        Ok(())
    }

    /// Appends a pass to the end of the chain.
    pub fn add_pass(&mut self, pass: impl Pass) {
        self.passes.push(Box::new(pass));
    }

    /// Appends an already boxed pass.
    pub fn add_boxed(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Inserts a pass at `index`, clamped to the end of the chain.
    pub fn insert_pass(&mut self, pass: impl Pass, index: usize) {
        let index = index.min(self.passes.len());
        self.passes.insert(index, Box::new(pass));
    }

    /// Removes the first pass with `id` and hands it back.
    pub fn remove_pass(&mut self, id: &PassId) -> Option<Box<dyn Pass>> {
        let index = self.position(id)?;
        Some(self.passes.remove(index))
    }

    /// Removes the first pass with `id` and releases its private targets.
    ///
    /// Returns whether a pass was removed.
    pub fn remove_pass_and_dispose(&mut self, id: &PassId, renderer: &mut dyn Renderer) -> bool {
        match self.remove_pass(id) {
            Some(mut pass) => {
                pass.dispose(renderer);
                true
            }
            None => false,
        }
    }

    /// Moves a pass one step earlier in the chain. Returns `false` if it is
    /// already first or not found.
    pub fn move_back(&mut self, id: &PassId) -> bool {
        match self.position(id) {
            Some(index) if index > 0 => {
                self.passes.swap(index, index - 1);
                true
            }
            _ => false,
        }
    }

    /// Moves a pass one step later in the chain. Returns `false` if it is
    /// already last or not found.
    pub fn move_forward(&mut self, id: &PassId) -> bool {
        match self.position(id) {
            Some(index) if index + 1 < self.passes.len() => {
                self.passes.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    /// Resizes both buffers and every pass.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), ComposerError> {
        let buffers = self.buffers.as_mut().ok_or(ComposerError::Disposed)?;
        let (width, height) = (width.max(1), height.max(1));
        log::debug!("resizing composer {} to {width}x{height}", self.id);

        self.width = width;
        self.height = height;
        buffers.write.set_size(width, height);
        buffers.read.set_size(width, height);
        for pass in &mut self.passes {
            pass.set_size(width, height);
        }
        Ok(())
    }

    /// Releases both buffers and every pass's private targets.
    ///
    /// The passes stay in the chain; drawing with them after a
    /// [`reset`](Self::reset) reallocates their storage.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        log::debug!("disposing composer {}", self.id);
        self.release_buffers(renderer);
        for pass in &mut self.passes {
            pass.dispose(renderer);
        }
    }

    /// Releases and reallocates both buffers at the current size.
    ///
    /// Works after [`dispose`](Self::dispose) too, which makes it the way to
    /// recover after the GPU context was lost and recreated. Passes are left
    /// alone.
    pub fn reset(&mut self, renderer: &mut dyn Renderer) {
        self.release_buffers(renderer);
        log::debug!("resetting composer {} at {}x{}", self.id, self.width, self.height);
        self.buffers = Some(PingPong::new(&self.config, self.width, self.height));
    }

    /// Exchanges the read and write buffers.
    pub fn swap_buffers(&mut self) -> Result<(), ComposerError> {
        self.buffers
            .as_mut()
            .ok_or(ComposerError::Disposed)?
            .swap();
        Ok(())
    }

    /// Looks a pass up by id.
    pub fn pass(&self, id: &PassId) -> Option<&dyn Pass> {
        self.passes
            .iter()
            .find(|pass| pass.id() == id)
            .map(|pass| pass.as_ref())
    }

    /// Mutable lookup by id; downcast to reach type-specific setters.
    pub fn pass_mut(&mut self, id: &PassId) -> Option<&mut dyn Pass> {
        let index = self.position(id)?;
        Some(self.passes[index].as_mut())
    }

    /// The chain, in execution order.
    pub fn passes(&self) -> &[Box<dyn Pass>] {
        &self.passes
    }

    /// The chain, mutable in place. Use the composer's methods to add or remove.
    pub fn passes_mut(&mut self) -> &mut [Box<dyn Pass>] {
        &mut self.passes
    }

    /// Number of passes, enabled or not.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// The buffer the next pass draws into, `None` after `dispose`.
    pub fn write_buffer(&self) -> Option<&RenderTarget> {
        self.buffers.as_ref().map(|b| &b.write)
    }

    /// The buffer the next pass samples, `None` after `dispose`.
    pub fn read_buffer(&self) -> Option<&RenderTarget> {
        self.buffers.as_ref().map(|b| &b.read)
    }

    /// Current buffer size in pixels, as last set by `set_size`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Identifier written to and read from descriptors.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Buffer options used by `reset` and new buffers.
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    fn release_buffers(&mut self, renderer: &mut dyn Renderer) {
        if let Some(mut buffers) = self.buffers.take() {
            buffers.write.release(renderer);
            buffers.read.release(renderer);
        }
    }

    fn position(&self, id: &PassId) -> Option<usize> {
        self.passes.iter().position(|pass| pass.id() == id)
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("id", &self.id)
            .field("size", &(self.width, self.height))
            .field("passes", &self.passes)
            .field("disposed", &self.buffers.is_none())
            .finish()
    }
}

/// Copies the read buffer into the write buffer outside the mask, so both
/// buffers agree there after the swap.
fn restore_unmasked(
    copy_pass: &mut CopyPass,
    renderer: &mut dyn Renderer,
    scene: &Scene,
    camera: &CameraView,
    delta: f32,
    buffers: &PingPong,
) {
    {
        let mut guard = StateGuard::new(renderer);
        let state = guard.state_mut();
        state.auto_clear = false;
        state.stencil.set_func(CompareFunction::NotEqual, 1, MASK_ALL);

        let mut frame = FrameContext {
            renderer: &mut *guard,
            scene,
            camera,
            delta,
            mask_active: true,
        };
        copy_pass.render(&mut frame, &buffers.write, &buffers.read);
    }
    renderer
        .state_mut()
        .stencil
        .set_func(CompareFunction::Equal, 1, MASK_ALL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::pass::{
        ClearMaskPass, ColorifyPass, MaskPass, PassDescriptor, RenderPass, SsaoPass,
        decode_pass,
    };
    use crate::renderer::{Command, RecordingRenderer};

    struct Fixture {
        renderer: RecordingRenderer,
        scene: Scene,
        camera: CameraView,
        composer: Composer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                renderer: RecordingRenderer::new(64, 32),
                scene: Scene::new("scene"),
                camera: Camera::default().view(),
                composer: Composer::with_config(ComposerConfig::new().size(64, 32)),
            }
        }

        fn render(&mut self) {
            self.composer
                .render(&mut self.renderer, &self.scene, &self.camera, 0.016)
                .unwrap();
        }

        fn buffer_ids(&self) -> (crate::TargetId, crate::TargetId) {
            (
                self.composer.write_buffer().unwrap().id(),
                self.composer.read_buffer().unwrap().id(),
            )
        }

        fn copies(&self) -> Vec<&Command> {
            self.renderer
                .commands()
                .iter()
                .filter(|c| c.program() == Some("copy"))
                .collect()
        }
    }

    #[test]
    fn swap_parity_follows_swapping_passes() {
        let mut f = Fixture::new();
        let (a, b) = f.buffer_ids();

        f.composer.add_pass(RenderPass::new());
        f.render();
        assert_eq!(f.buffer_ids(), (b, a));
        assert_eq!(f.renderer.content(f.composer.read_buffer()), "scene");

        f.composer.add_pass(ColorifyPass::new(0xff0000));
        f.render();
        assert_eq!(f.buffer_ids(), (b, a));
        assert_eq!(f.renderer.content(f.composer.read_buffer()), "colorify(scene)");
    }

    #[test]
    fn render_then_copy_to_screen_shows_the_scene() {
        let mut f = Fixture::new();
        let before = f.buffer_ids();
        f.composer.add_pass(RenderPass::new());
        f.composer.add_pass(CopyPass::new().rendering_to_screen());
        f.render();

        assert_eq!(f.renderer.screen(), "scene");
        assert_eq!(f.buffer_ids(), before);
    }

    #[test]
    fn disabled_pass_has_no_side_effects() {
        let mut f = Fixture::new();
        let before = f.buffer_ids();
        f.composer.add_pass(RenderPass::new().disabled());
        f.composer.add_pass(MaskPass::default().disabled());
        f.render();

        assert!(f.renderer.commands().is_empty());
        assert_eq!(f.renderer.state_writes(), 0);
        assert_eq!(f.buffer_ids(), before);
    }

    #[test]
    fn adjacent_mask_and_clear_mask_leave_the_mask_off() {
        let mut f = Fixture::new();
        f.composer.add_pass(RenderPass::new());
        f.composer.add_pass(MaskPass::default());
        f.composer.add_pass(ClearMaskPass::new());
        f.composer.add_pass(ColorifyPass::default());
        f.render();

        assert!(f.copies().is_empty());
        assert!(!f.renderer.state().stencil.enabled);
    }

    #[test]
    fn masked_swap_restores_pixels_outside_the_mask() {
        let mut f = Fixture::new();
        f.composer.add_pass(RenderPass::new());
        f.composer.add_pass(MaskPass::default());
        f.composer.add_pass(ColorifyPass::default());
        f.composer.add_pass(ClearMaskPass::new());
        f.render();

        let copies = f.copies();
        assert_eq!(copies.len(), 1);
        let state = copies[0].state().unwrap();
        assert!(state.stencil.enabled);
        assert_eq!(state.stencil.func, CompareFunction::NotEqual);
        assert!(!state.auto_clear);

        let stencil = f.renderer.state().stencil;
        assert!(!stencil.enabled);
        assert_eq!(stencil.func, CompareFunction::Equal);
        assert_eq!(stencil.reference, 1);
    }

    #[test]
    fn set_size_resizes_both_buffers_and_passes() {
        let mut f = Fixture::new();
        f.composer.add_pass(SsaoPass::new());
        f.composer.set_size(300, 0).unwrap();

        assert_eq!(f.composer.size(), (300, 1));
        assert_eq!(f.composer.write_buffer().unwrap().size(), (300, 1));
        assert_eq!(f.composer.read_buffer().unwrap().size(), (300, 1));
        let ssao = f.composer.passes()[0].downcast_ref::<SsaoPass>().unwrap();
        assert_eq!(ssao.depth_target().size(), (300, 1));
    }

    #[test]
    fn moves_stop_at_the_ends() {
        let mut composer = Composer::new();
        let first = RenderPass::new().with_id("first");
        let last = CopyPass::new().with_id("last");
        composer.add_pass(first);
        composer.add_pass(last);

        assert!(!composer.move_back(&"first".into()));
        assert!(!composer.move_forward(&"last".into()));
        assert!(!composer.move_forward(&"missing".into()));

        assert!(composer.move_forward(&"first".into()));
        assert_eq!(composer.passes()[1].id().as_str(), "first");
        assert!(composer.move_back(&"first".into()));
        assert_eq!(composer.passes()[0].id().as_str(), "first");
    }

    #[test]
    fn insert_clamps_and_remove_finds_by_id() {
        let mut composer = Composer::new();
        composer.add_pass(RenderPass::new().with_id("render"));
        composer.insert_pass(CopyPass::new().with_id("copy"), 10);
        composer.insert_pass(ColorifyPass::default().with_id("tint"), 1);

        let order: Vec<&str> = composer.passes().iter().map(|p| p.id().as_str()).collect();
        assert_eq!(order, ["render", "tint", "copy"]);

        let removed = composer.remove_pass(&"tint".into()).unwrap();
        assert_eq!(removed.kind(), PassKind::Colorify);
        assert!(composer.remove_pass(&"tint".into()).is_none());
        assert_eq!(composer.len(), 2);
    }

    #[test]
    fn dispose_blocks_frames_until_reset() {
        let mut f = Fixture::new();
        f.composer.add_pass(RenderPass::new());
        let (a, b) = f.buffer_ids();

        f.composer.dispose(&mut f.renderer);
        assert_eq!(f.renderer.released(), &[a, b]);
        assert!(f.composer.write_buffer().is_none());
        assert!(matches!(
            f.composer.render(&mut f.renderer, &f.scene, &f.camera, 0.016),
            Err(ComposerError::Disposed)
        ));
        assert!(matches!(f.composer.set_size(8, 8), Err(ComposerError::Disposed)));
        assert!(matches!(f.composer.swap_buffers(), Err(ComposerError::Disposed)));

        f.composer.reset(&mut f.renderer);
        assert_eq!(f.composer.write_buffer().unwrap().size(), (64, 32));
        f.render();
        assert_eq!(f.renderer.content(f.composer.read_buffer()), "scene");
    }

    #[test]
    fn dispose_releases_pass_targets_and_reset_keeps_them() {
        let mut f = Fixture::new();
        let ssao = SsaoPass::new().with_id("ao");
        let depth = ssao.depth_target().id();
        f.composer.add_pass(ssao);
        let (a, b) = f.buffer_ids();

        f.composer.reset(&mut f.renderer);
        assert_eq!(f.renderer.released(), &[a, b]);
        let ao = f.composer.pass(&"ao".into()).unwrap();
        assert!(!ao.downcast_ref::<SsaoPass>().unwrap().depth_target().is_released());

        let (c, d) = f.buffer_ids();
        f.composer.dispose(&mut f.renderer);
        assert_eq!(f.renderer.released(), &[a, b, c, d, depth]);
        assert_eq!(f.composer.len(), 1);
    }

    #[test]
    fn remove_and_dispose_releases_private_targets() {
        let mut f = Fixture::new();
        let ssao = SsaoPass::new().with_id("ao");
        let depth = ssao.depth_target().id();
        f.composer.add_pass(ssao);

        assert!(f.composer.remove_pass_and_dispose(&"ao".into(), &mut f.renderer));
        assert_eq!(f.renderer.released(), &[depth]);
        assert!(!f.composer.remove_pass_and_dispose(&"ao".into(), &mut f.renderer));
    }

    #[test]
    fn unknown_type_decodes_to_render_in_place() {
        let (pass, warnings) = decode_pass(1, &PassDescriptor::new("Glitch"));
        let mut composer = Composer::new();
        composer.add_pass(CopyPass::new());
        composer.add_boxed(pass);
        assert_eq!(composer.passes()[1].kind(), PassKind::Render);
        assert_eq!(warnings.len(), 1);
    }
}
