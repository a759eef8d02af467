//! Plain-data scene description handed to renderers.
//!
//! A [`Scene`] is a named tree of [`Drawable`]s. Each drawable carries CPU-side
//! [`Mesh`] data, a [`Transform`], and a flat color; renderers upload geometry
//! on their own terms. Scenes serialize with serde so mask passes can store
//! their mask geometry inline.
//!
//! # Example
//!
//! ```
//! use afterglow::{Drawable, Mesh, Scene, Transform, Vec3};
//!
//! let scene = Scene::new("stage")
//!     .with(Drawable::new("floor", Mesh::plane(10.0)))
//!     .with(
//!         Drawable::new("crate", Mesh::cube())
//!             .transform(Transform::from_position(Vec3::new(0.0, 0.5, 0.0))),
//!     );
//! assert_eq!(scene.visible().len(), 2);
//! ```

use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Vertex format shared by every mesh: position and normal.
///
/// 24 bytes per vertex; position at location 0, normal at location 1.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    /// The wgpu vertex buffer layout for [`Vertex`].
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }
}

/// Indexed triangle geometry kept on the CPU.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// A unit cube centered at the origin, with per-face normals.
    pub fn cube() -> Self {
        // Each face has its own vertices for correct normals
        #[rustfmt::skip]
        let vertices = vec![
            // Front face (Z+)
            Vertex::new([-0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0]),
            Vertex::new([-0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0]),
            // Back face (Z-)
            Vertex::new([ 0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0]),
            Vertex::new([-0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0]),
            Vertex::new([-0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0]),
            // Top face (Y+)
            Vertex::new([-0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0]),
            Vertex::new([-0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0]),
            // Bottom face (Y-)
            Vertex::new([-0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0]),
            Vertex::new([ 0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0]),
            Vertex::new([-0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0]),
            // Right face (X+)
            Vertex::new([ 0.5, -0.5,  0.5], [ 1.0,  0.0,  0.0]),
            Vertex::new([ 0.5, -0.5, -0.5], [ 1.0,  0.0,  0.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [ 1.0,  0.0,  0.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [ 1.0,  0.0,  0.0]),
            // Left face (X-)
            Vertex::new([-0.5, -0.5, -0.5], [-1.0,  0.0,  0.0]),
            Vertex::new([-0.5, -0.5,  0.5], [-1.0,  0.0,  0.0]),
            Vertex::new([-0.5,  0.5,  0.5], [-1.0,  0.0,  0.0]),
            Vertex::new([-0.5,  0.5, -0.5], [-1.0,  0.0,  0.0]),
        ];

        #[rustfmt::skip]
        let indices = vec![
            0,  1,  2,  2,  3,  0,  // front
            4,  5,  6,  6,  7,  4,  // back
            8,  9,  10, 10, 11, 8,  // top
            12, 13, 14, 14, 15, 12, // bottom
            16, 17, 18, 18, 19, 16, // right
            20, 21, 22, 22, 23, 20, // left
        ];

        Self::new(vertices, indices)
    }

    /// A horizontal square of side `size` in the XZ plane, facing +Y.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-half, 0.0, -half], up),
            Vertex::new([half, 0.0, -half], up),
            Vertex::new([half, 0.0, half], up),
            Vertex::new([-half, 0.0, half], up),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// A `width` x `height` rectangle in the XY plane, facing +Z. Handy as mask geometry.
    pub fn quad(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-hw, -hh, 0.0], normal),
            Vertex::new([hw, -hh, 0.0], normal),
            Vertex::new([hw, hh, 0.0], normal),
            Vertex::new([-hw, hh, 0.0], normal),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Position, rotation, and scale of a drawable relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// A mesh placed in a scene, with optional children that inherit its transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drawable {
    pub name: String,
    pub mesh: Mesh,
    pub transform: Transform,
    pub color: Vec4,
    /// Hidden drawables are skipped together with their children.
    pub visible: bool,
    pub children: Vec<Drawable>,
}

impl Default for Drawable {
    fn default() -> Self {
        Self {
            name: String::new(),
            mesh: Mesh::default(),
            transform: Transform::default(),
            color: Vec4::ONE,
            visible: true,
            children: Vec::new(),
        }
    }
}

impl Drawable {
    pub fn new(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            mesh,
            ..Default::default()
        }
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn child(mut self, child: Drawable) -> Self {
        self.children.push(child);
        self
    }

    fn collect<'a>(&'a self, parent: Mat4, out: &mut Vec<(Mat4, &'a Drawable)>) {
        if !self.visible {
            return;
        }
        let world = parent * self.transform.matrix();
        if !self.mesh.is_empty() {
            out.push((world, self));
        }
        for child in &self.children {
            child.collect(world, out);
        }
    }
}

/// A named collection of drawables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub name: String,
    pub drawables: Vec<Drawable>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            drawables: Vec::new(),
        }
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, drawable: Drawable) -> Self {
        self.add(drawable);
        self
    }

    pub fn add(&mut self, drawable: Drawable) {
        self.drawables.push(drawable);
    }

    /// Every visible drawable with geometry, paired with its world matrix,
    /// in depth-first order.
    pub fn visible(&self) -> Vec<(Mat4, &Drawable)> {
        let mut out = Vec::new();
        for drawable in &self.drawables {
            drawable.collect(Mat4::IDENTITY, &mut out);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_inherit_parent_transform() {
        let scene = Scene::new("s").with(
            Drawable::new("parent", Mesh::cube())
                .transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
                .child(
                    Drawable::new("child", Mesh::cube())
                        .transform(Transform::from_position(Vec3::new(0.0, 2.0, 0.0))),
                ),
        );
        let visible = scene.visible();
        assert_eq!(visible.len(), 2);
        let (world, child) = visible[1];
        assert_eq!(child.name, "child");
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn hidden_subtrees_are_skipped() {
        let scene = Scene::new("s").with(
            Drawable::new("hidden", Mesh::cube())
                .visible(false)
                .child(Drawable::new("child", Mesh::cube())),
        );
        assert!(scene.visible().is_empty());
    }

    #[test]
    fn empty_groups_still_forward_transforms() {
        let scene = Scene::new("s").with(
            Drawable::new("group", Mesh::default())
                .transform(Transform::new().uniform_scale(2.0))
                .child(Drawable::new("leaf", Mesh::quad(1.0, 1.0))),
        );
        let visible = scene.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0.transform_point3(Vec3::ONE), Vec3::splat(2.0));
    }

    #[test]
    fn cube_indices_stay_in_range() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
    }
}
