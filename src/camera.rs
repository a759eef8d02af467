//! Cameras that own a composer.
//!
//! A [`Camera`] carries a projection, a transform, clear flags, and its own
//! [`Composer`]. Rendering through a camera runs its composer with a fixed
//! frame delta, then optionally draws the scene once more into an attached
//! render texture.
//!
//! Passes never see the camera itself, only a [`CameraView`]: a plain copy of
//! the matrices and clip planes for the current frame.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::composer::{Composer, ComposerDescriptor};
use crate::error::{ComposerError, DecodeWarning};
use crate::pass::{Pass, RenderPass};
use crate::render_target::{RenderTarget, RenderTargetOptions};
use crate::renderer::{ClearBuffers, Renderer, SceneMaterial};
use crate::scene::{Scene, Transform};

/// Frame delta handed to a camera's composer, in seconds.
pub const FIXED_DELTA_TIME: f32 = 0.016;

/// How an orthographic camera keeps its `size` when the aspect changes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResizeMode {
    /// `size` is the visible height; width follows the aspect.
    #[default]
    Horizontal,
    /// `size` is the visible width; height follows the aspect.
    Vertical,
}

/// Projection parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Projection {
    #[serde(rename_all = "camelCase")]
    Perspective {
        /// Vertical field of view in degrees.
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
        zoom: f32,
    },
    #[serde(rename_all = "camelCase")]
    Orthographic {
        size: f32,
        aspect: f32,
        mode: ResizeMode,
        near: f32,
        far: f32,
    },
}

impl Projection {
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov,
            aspect,
            near,
            far,
            zoom: 1.0,
        }
    }

    pub fn orthographic(size: f32, aspect: f32, mode: ResizeMode, near: f32, far: f32) -> Self {
        Projection::Orthographic {
            size,
            aspect,
            mode,
            near,
            far,
        }
    }

    pub fn near(&self) -> f32 {
        match *self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    pub fn far(&self) -> f32 {
        match *self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    pub fn aspect(&self) -> f32 {
        match *self {
            Projection::Perspective { aspect, .. } | Projection::Orthographic { aspect, .. } => {
                aspect
            }
        }
    }

    pub fn set_aspect(&mut self, value: f32) {
        match self {
            Projection::Perspective { aspect, .. } | Projection::Orthographic { aspect, .. } => {
                *aspect = value
            }
        }
    }

    /// OpenGL-convention projection matrix (clip z in `[-1, 1]`) for a
    /// viewport of relative size `viewport`.
    pub fn matrix(&self, viewport: Vec2) -> Mat4 {
        let viewport_aspect = viewport.x / viewport.y.max(f32::EPSILON);
        match *self {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
                zoom,
            } => {
                let top = near * (0.5 * fov).to_radians().tan() / zoom;
                let height = 2.0 * top;
                let width = aspect * height * viewport_aspect;
                let left = -0.5 * width;
                frustum(left, left + width, top, top - height, near, far)
            }
            Projection::Orthographic {
                size,
                aspect,
                mode,
                near,
                far,
            } => {
                let (right, top) = match mode {
                    ResizeMode::Horizontal => {
                        let top = size / 2.0;
                        (top * aspect * viewport_aspect, top)
                    }
                    ResizeMode::Vertical => {
                        let right = size / 2.0;
                        (right, right / aspect * viewport_aspect)
                    }
                };
                Mat4::orthographic_rh_gl(-right, right, -top, top, near, far)
            }
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::perspective(50.0, 1.0, 0.1, 2000.0)
    }
}

/// Builds an off-axis perspective matrix from the near-plane rectangle.
fn frustum(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Mat4 {
    let x = 2.0 * near / (right - left);
    let y = 2.0 * near / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -(far + near) / (far - near);
    let d = -2.0 * far * near / (far - near);
    Mat4::from_cols_array(&[
        x, 0.0, 0.0, 0.0, //
        0.0, y, 0.0, 0.0, //
        a, b, c, -1.0, //
        0.0, 0.0, d, 0.0,
    ])
}

/// The per-frame view of a camera that passes and renderers consume.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraView {
    pub projection: Mat4,
    /// World-to-camera transform.
    pub view: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    /// Attachments a render pass clears before drawing the scene.
    pub clear: ClearBuffers,
}

impl CameraView {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// A secondary target the camera renders the plain scene into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderTextureDescriptor {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub options: RenderTargetOptions,
}

/// Serialized form of a [`Camera`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraDescriptor {
    pub name: String,
    pub projection: Projection,
    pub transform: Transform,
    pub viewport: Vec2,
    pub offset: Vec2,
    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,
    pub order: i32,
    pub render_texture: Option<RenderTextureDescriptor>,
    pub composer: ComposerDescriptor,
    pub children: Vec<CameraDescriptor>,
}

impl Default for CameraDescriptor {
    fn default() -> Self {
        Camera::default().to_descriptor()
    }
}

/// A projection plus the composer that renders through it.
///
/// New cameras start with a single [`RenderPass`] drawing to the screen.
pub struct Camera {
    pub name: String,
    pub transform: Transform,
    /// Relative size of the drawn area, `(1, 1)` for the whole screen.
    pub viewport: Vec2,
    /// Relative position of the drawn area.
    pub offset: Vec2,
    pub clear: ClearBuffers,
    /// Draw order among cameras; lower draws first.
    pub order: i32,
    pub children: Vec<Camera>,
    projection: Projection,
    projection_matrix: Mat4,
    composer: Composer,
    render_texture: Option<RenderTarget>,
}

impl Camera {
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::perspective(fov, aspect, near, far))
    }

    pub fn orthographic(size: f32, aspect: f32, mode: ResizeMode, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::orthographic(size, aspect, mode, near, far))
    }

    pub fn with_projection(projection: Projection) -> Self {
        let mut composer = Composer::new();
        composer.add_pass(RenderPass::new().rendering_to_screen());
        let mut camera = Self {
            name: "camera".to_string(),
            transform: Transform::from_position(Vec3::new(0.0, 0.0, 5.0)),
            viewport: Vec2::ONE,
            offset: Vec2::ZERO,
            clear: ClearBuffers::ALL,
            order: 0,
            children: Vec::new(),
            projection,
            projection_matrix: Mat4::IDENTITY,
            composer,
            render_texture: None,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Changes the projection and recomputes the matrix.
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.update_projection_matrix();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection.set_aspect(aspect);
        self.update_projection_matrix();
    }

    /// Recomputes the projection matrix. Call after editing `viewport`.
    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = self.projection.matrix(self.viewport);
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    /// Points the camera at `target`, keeping +Y up.
    pub fn look_at(&mut self, target: Vec3) {
        let view = Mat4::look_at_rh(self.transform.position, target, Vec3::Y);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.transform.rotation = rotation;
    }

    /// Snapshot of matrices and clip planes for this frame.
    pub fn view(&self) -> CameraView {
        CameraView {
            projection: self.projection_matrix,
            view: self.transform.matrix().inverse(),
            position: self.transform.position,
            near: self.projection.near(),
            far: self.projection.far(),
            aspect: self.projection.aspect(),
            clear: self.clear,
        }
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    /// Replaces the composer, returning the previous one.
    pub fn set_composer(&mut self, composer: Composer) -> Composer {
        std::mem::replace(&mut self.composer, composer)
    }

    /// Renders `scene` through the composer, then into the render texture if
    /// one is attached.
    pub fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        scene: &Scene,
    ) -> Result<(), ComposerError> {
        let view = self.view();
        self.composer.render(renderer, scene, &view, FIXED_DELTA_TIME)?;
        if let Some(texture) = &self.render_texture {
            renderer.render_scene(scene, &view, Some(texture), true, SceneMaterial::Standard);
        }
        Ok(())
    }

    /// Resizes the composer to this camera's share of a `width`×`height`
    /// screen, then resizes every child with the full screen size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ComposerError> {
        let scaled_width = ((width as f32 * self.viewport.x).round() as u32).max(1);
        let scaled_height = ((height as f32 * self.viewport.y).round() as u32).max(1);
        self.composer.set_size(scaled_width, scaled_height)?;
        for child in &mut self.children {
            child.resize(width, height)?;
        }
        Ok(())
    }

    /// Attaches a secondary texture the plain scene is drawn into after the
    /// composer runs. Returns the previously attached texture.
    pub fn attach_render_texture(&mut self, texture: RenderTarget) -> Option<RenderTarget> {
        self.render_texture.replace(texture)
    }

    pub fn detach_render_texture(&mut self) -> Option<RenderTarget> {
        self.render_texture.take()
    }

    pub fn render_texture(&self) -> Option<&RenderTarget> {
        self.render_texture.as_ref()
    }

    /// Releases the composer's buffers, every pass's private targets, and the
    /// render texture, recursively through the children.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        self.composer.dispose(renderer);
        if let Some(texture) = &mut self.render_texture {
            texture.release(renderer);
        }
        for child in &mut self.children {
            child.dispose(renderer);
        }
    }

    pub fn to_descriptor(&self) -> CameraDescriptor {
        CameraDescriptor {
            name: self.name.clone(),
            projection: self.projection,
            transform: self.transform,
            viewport: self.viewport,
            offset: self.offset,
            clear_color: self.clear.color,
            clear_depth: self.clear.depth,
            clear_stencil: self.clear.stencil,
            order: self.order,
            render_texture: self.render_texture.as_ref().map(|t| RenderTextureDescriptor {
                width: t.width(),
                height: t.height(),
                options: *t.options(),
            }),
            composer: self.composer.to_descriptor(),
            children: self.children.iter().map(Camera::to_descriptor).collect(),
        }
    }

    /// Rebuilds a camera tree. Pass substitutions from every composer in the
    /// tree are collected into `warnings`.
    pub fn from_descriptor(
        descriptor: &CameraDescriptor,
        warnings: &mut Vec<DecodeWarning>,
    ) -> Self {
        let decoded = Composer::from_descriptor(&descriptor.composer);
        warnings.extend(decoded.warnings);

        let mut camera = Self::with_projection(descriptor.projection);
        camera.name = descriptor.name.clone();
        camera.transform = descriptor.transform;
        camera.viewport = descriptor.viewport;
        camera.offset = descriptor.offset;
        camera.clear = ClearBuffers {
            color: descriptor.clear_color,
            depth: descriptor.clear_depth,
            stencil: descriptor.clear_stencil,
        };
        camera.order = descriptor.order;
        camera.composer = decoded.composer;
        camera.render_texture = descriptor.render_texture.as_ref().map(|t| {
            RenderTarget::new(t.width, t.height, t.options, &format!("{} Texture", camera.name))
        });
        camera.children = descriptor
            .children
            .iter()
            .map(|child| Camera::from_descriptor(child, warnings))
            .collect();
        camera.update_projection_matrix();
        camera
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::with_projection(Projection::default())
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("name", &self.name)
            .field("projection", &self.projection)
            .field("order", &self.order)
            .field("composer", &self.composer)
            .field("children", &self.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{FilmPass, PassKind};
    use crate::renderer::{Command, RecordingRenderer};

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn symmetric_perspective_matches_glam() {
        let projection = Projection::perspective(60.0, 1.5, 0.1, 100.0);
        let expected = Mat4::perspective_rh_gl(60f32.to_radians(), 1.5, 0.1, 100.0);
        assert!(approx(projection.matrix(Vec2::ONE), expected));
    }

    #[test]
    fn zoom_narrows_the_frustum() {
        let mut projection = Projection::perspective(60.0, 1.0, 0.1, 100.0);
        let wide = projection.matrix(Vec2::ONE);
        if let Projection::Perspective { zoom, .. } = &mut projection {
            *zoom = 2.0;
        }
        let narrow = projection.matrix(Vec2::ONE);
        assert!((narrow.col(1).y - 2.0 * wide.col(1).y).abs() < 1e-4);
    }

    #[test]
    fn orthographic_resize_modes() {
        let horizontal = Projection::orthographic(10.0, 2.0, ResizeMode::Horizontal, 0.1, 100.0);
        assert!(approx(
            horizontal.matrix(Vec2::ONE),
            Mat4::orthographic_rh_gl(-10.0, 10.0, -5.0, 5.0, 0.1, 100.0)
        ));

        let vertical = Projection::orthographic(10.0, 2.0, ResizeMode::Vertical, 0.1, 100.0);
        assert!(approx(
            vertical.matrix(Vec2::ONE),
            Mat4::orthographic_rh_gl(-5.0, 5.0, -2.5, 2.5, 0.1, 100.0)
        ));
    }

    #[test]
    fn default_camera_renders_scene_to_screen() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut camera = Camera::default();
        camera.render(&mut renderer, &Scene::new("level")).unwrap();
        assert_eq!(renderer.screen(), "level");
        assert_eq!(camera.composer().passes()[0].kind(), PassKind::Render);
    }

    #[test]
    fn render_texture_gets_a_cleared_scene_draw() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut camera = Camera::default();
        let texture = RenderTarget::new(16, 16, RenderTargetOptions::default(), "mirror");
        let id = texture.id();
        camera.attach_render_texture(texture);
        camera.render(&mut renderer, &Scene::new("level")).unwrap();

        match renderer.commands().last() {
            Some(Command::RenderScene { target, clear, .. }) => {
                assert_eq!(*target, Some(id));
                assert!(*clear);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(renderer.content_of(Some(id)), "level");
    }

    #[test]
    fn resize_scales_by_viewport_and_recurses() {
        let mut camera = Camera::default();
        camera.viewport = Vec2::new(0.5, 0.25);
        camera.children.push(Camera::default());
        camera.resize(801, 600).unwrap();

        assert_eq!(camera.composer().size(), (401, 150));
        assert_eq!(camera.children[0].composer().size(), (801, 600));
    }

    #[test]
    fn descriptor_round_trip_keeps_composer_and_flags() {
        let mut camera = Camera::orthographic(8.0, 1.0, ResizeMode::Vertical, 1.0, 50.0);
        camera.name = "overlay".into();
        camera.order = 3;
        camera.clear = ClearBuffers::DEPTH;
        camera.composer_mut().add_pass(FilmPass::new());
        camera.attach_render_texture(RenderTarget::new(
            64,
            64,
            RenderTargetOptions::default(),
            "texture",
        ));

        let json = serde_json::to_string(&camera.to_descriptor()).unwrap();
        let descriptor: CameraDescriptor = serde_json::from_str(&json).unwrap();
        let mut warnings = Vec::new();
        let restored = Camera::from_descriptor(&descriptor, &mut warnings);

        assert!(warnings.is_empty());
        assert_eq!(restored.name, "overlay");
        assert_eq!(restored.order, 3);
        assert_eq!(restored.clear, ClearBuffers::DEPTH);
        assert_eq!(restored.projection(), camera.projection());
        assert_eq!(restored.composer().len(), 2);
        assert_eq!(restored.composer().id(), camera.composer().id());
        assert_eq!(restored.render_texture().map(RenderTarget::size), Some((64, 64)));
        assert_eq!(restored.to_descriptor(), camera.to_descriptor());
    }

    #[test]
    fn dispose_releases_everything() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let mut camera = Camera::default();
        camera.attach_render_texture(RenderTarget::new(4, 4, RenderTargetOptions::default(), "t"));
        camera.dispose(&mut renderer);
        assert_eq!(renderer.released().len(), 3);
        assert!(matches!(
            camera.render(&mut renderer, &Scene::new("s")),
            Err(ComposerError::Disposed)
        ));
    }
}
