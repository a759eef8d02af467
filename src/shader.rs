//! Shader programs with named uniform slots, and the built-in effect library.
//!
//! Passes treat a [`ShaderProgram`] as an opaque GPU program: they only know its
//! name, the uniform slot names it reads, and the texture slots it samples.
//! Renderers decide how to compile and bind it.
//!
//! # Uniform Layout
//!
//! Every fullscreen program reads its parameters from one uniform block declared
//! as an array of `vec4f`. Slots are laid out in declaration order; a slot with
//! `len > 1` spans several consecutive `vec4f`s and is used for float arrays.
//!
//! ```wgsl
//! @group(0) @binding(0) var<uniform> u: array<vec4f, 32>;
//! @group(0) @binding(1) var samp: sampler;
//! @group(0) @binding(2) var tDiffuse: texture_2d<f32>;  // first texture slot
//! ```
//!
//! The vertex stage and the declarations above come from [`FULLSCREEN_PRELUDE`];
//! program sources only declare their textures (bindings 2 and up) and an `fs`
//! fragment entry point.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Number of `vec4f` slots in a fullscreen program's uniform block.
pub const MAX_UNIFORM_SLOTS: usize = 32;

/// Maximum number of textures a fullscreen program may sample.
pub const MAX_TEXTURE_SLOTS: usize = 5;

/// Shared vertex stage and bindings prepended to every fullscreen program.
pub const FULLSCREEN_PRELUDE: &str = include_str!("shaders/fullscreen.wgsl");

/// Scene shader used by renderers to draw meshes (standard, depth, and stencil-only).
pub const SCENE_SHADER: &str = include_str!("shaders/scene.wgsl");

/// A named uniform occupying `len` consecutive `vec4f` slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: &'static str,
    pub len: u32,
}

impl UniformSlot {
    pub const fn single(name: &'static str) -> Self {
        Self { name, len: 1 }
    }

    pub const fn array(name: &'static str, len: u32) -> Self {
        Self { name, len }
    }
}

/// An opaque fullscreen GPU program with named uniform and texture slots.
#[derive(Debug, PartialEq, Eq)]
pub struct ShaderProgram {
    name: &'static str,
    source: &'static str,
    uniforms: &'static [UniformSlot],
    textures: &'static [&'static str],
}

impl ShaderProgram {
    /// Declares a program. `source` must define `fs` and the texture bindings
    /// for `textures` in order, starting at binding 2.
    pub const fn new(
        name: &'static str,
        source: &'static str,
        uniforms: &'static [UniformSlot],
        textures: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            source,
            uniforms,
            textures,
        }
    }

    /// Looks up a built-in program by name.
    pub fn builtin(name: &str) -> Option<&'static ShaderProgram> {
        programs::ALL.iter().copied().find(|p| p.name == name)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn uniforms(&self) -> &'static [UniformSlot] {
        self.uniforms
    }

    pub fn textures(&self) -> &'static [&'static str] {
        self.textures
    }

    pub fn has_texture(&self, slot: &str) -> bool {
        self.texture_index(slot).is_some()
    }

    /// Binding order of a texture slot (0 is bound at binding 2).
    pub fn texture_index(&self, slot: &str) -> Option<usize> {
        self.textures.iter().position(|t| *t == slot)
    }

    /// Total `vec4f` slots used by this program's uniforms.
    pub fn slot_count(&self) -> usize {
        self.uniforms.iter().map(|s| s.len as usize).sum()
    }

    /// Packs named values into the program's uniform block.
    ///
    /// Missing values stay zero; values for names the program does not declare
    /// are ignored.
    pub fn pack(&self, uniforms: &Uniforms) -> [[f32; 4]; MAX_UNIFORM_SLOTS] {
        let mut block = [[0.0; 4]; MAX_UNIFORM_SLOTS];
        let mut offset = 0usize;
        for slot in self.uniforms {
            let end = (offset + slot.len as usize).min(MAX_UNIFORM_SLOTS);
            if let Some(value) = uniforms.get(slot.name) {
                value.write_into(&mut block[offset..end]);
            }
            offset = end;
        }
        block
    }
}

/// A single uniform value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Bool(bool),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Floats(Vec<f32>),
}

impl UniformValue {
    fn write_into(&self, slots: &mut [[f32; 4]]) {
        let Some(first) = slots.first_mut() else {
            return;
        };
        match self {
            UniformValue::Bool(v) => first[0] = if *v { 1.0 } else { 0.0 },
            UniformValue::Float(v) => first[0] = *v,
            UniformValue::Vec2(v) => first[..2].copy_from_slice(&v.to_array()),
            UniformValue::Vec3(v) => first[..3].copy_from_slice(&v.to_array()),
            UniformValue::Vec4(v) => *first = v.to_array(),
            UniformValue::Floats(values) => {
                for (slot, chunk) in slots.iter_mut().zip(values.chunks(4)) {
                    slot[..chunk.len()].copy_from_slice(chunk);
                }
            }
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            UniformValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Vec<f32>> for UniformValue {
    fn from(v: Vec<f32>) -> Self {
        UniformValue::Floats(v)
    }
}

/// Named uniform values handed to a renderer for one draw.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uniforms(BTreeMap<String, UniformValue>);

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.0.insert(name.to_owned(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.0.get(name)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(UniformValue::as_f32)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Built-in fullscreen programs used by the effect passes.
pub mod programs {
    use super::{ShaderProgram, UniformSlot};

    pub static COPY: ShaderProgram = ShaderProgram::new(
        "copy",
        include_str!("shaders/copy.wgsl"),
        &[UniformSlot::single("opacity")],
        &["tDiffuse"],
    );

    /// Separable convolution with up to 25 taps.
    pub static CONVOLUTION: ShaderProgram = ShaderProgram::new(
        "convolution",
        include_str!("shaders/convolution.wgsl"),
        &[
            UniformSlot::single("uImageIncrement"),
            UniformSlot::single("kernelSize"),
            UniformSlot::array("cKernel", 7),
        ],
        &["tDiffuse"],
    );

    pub static LUMINOSITY_HIGH_PASS: ShaderProgram = ShaderProgram::new(
        "luminosity_high_pass",
        include_str!("shaders/luminosity_high_pass.wgsl"),
        &[
            UniformSlot::single("luminosityThreshold"),
            UniformSlot::single("smoothWidth"),
            UniformSlot::single("defaultColor"),
            UniformSlot::single("defaultOpacity"),
        ],
        &["tDiffuse"],
    );

    /// Gaussian blur along one direction, radius up to 12 taps.
    pub static SEPARABLE_BLUR: ShaderProgram = ShaderProgram::new(
        "separable_blur",
        include_str!("shaders/separable_blur.wgsl"),
        &[
            UniformSlot::single("texSize"),
            UniformSlot::single("direction"),
            UniformSlot::single("kernelRadius"),
            UniformSlot::array("gaussianCoefficients", 3),
        ],
        &["colorTexture"],
    );

    pub static UNREAL_COMPOSITE: ShaderProgram = ShaderProgram::new(
        "unreal_composite",
        include_str!("shaders/unreal_composite.wgsl"),
        &[
            UniformSlot::single("bloomStrength"),
            UniformSlot::single("bloomRadius"),
            UniformSlot::array("bloomFactors", 2),
            UniformSlot::array("bloomTintColors", 5),
        ],
        &[
            "blurTexture1",
            "blurTexture2",
            "blurTexture3",
            "blurTexture4",
            "blurTexture5",
        ],
    );

    pub static DOT_SCREEN: ShaderProgram = ShaderProgram::new(
        "dot_screen",
        include_str!("shaders/dot_screen.wgsl"),
        &[
            UniformSlot::single("tSize"),
            UniformSlot::single("center"),
            UniformSlot::single("angle"),
            UniformSlot::single("scale"),
        ],
        &["tDiffuse"],
    );

    pub static FILM: ShaderProgram = ShaderProgram::new(
        "film",
        include_str!("shaders/film.wgsl"),
        &[
            UniformSlot::single("time"),
            UniformSlot::single("nIntensity"),
            UniformSlot::single("sIntensity"),
            UniformSlot::single("sCount"),
            UniformSlot::single("grayscale"),
        ],
        &["tDiffuse"],
    );

    pub static HUE_SATURATION: ShaderProgram = ShaderProgram::new(
        "hue_saturation",
        include_str!("shaders/hue_saturation.wgsl"),
        &[UniformSlot::single("hue"), UniformSlot::single("saturation")],
        &["tDiffuse"],
    );

    pub static FXAA: ShaderProgram = ShaderProgram::new(
        "fxaa",
        include_str!("shaders/fxaa.wgsl"),
        &[UniformSlot::single("resolution")],
        &["tDiffuse"],
    );

    pub static COLORIFY: ShaderProgram = ShaderProgram::new(
        "colorify",
        include_str!("shaders/colorify.wgsl"),
        &[UniformSlot::single("color")],
        &["tDiffuse"],
    );

    pub static SOBEL: ShaderProgram = ShaderProgram::new(
        "sobel",
        include_str!("shaders/sobel.wgsl"),
        &[UniformSlot::single("resolution")],
        &["tDiffuse"],
    );

    pub static TECHNICOLOR: ShaderProgram = ShaderProgram::new(
        "technicolor",
        include_str!("shaders/technicolor.wgsl"),
        &[],
        &["tDiffuse"],
    );

    pub static SSAO: ShaderProgram = ShaderProgram::new(
        "ssao",
        include_str!("shaders/ssao.wgsl"),
        &[
            UniformSlot::single("size"),
            UniformSlot::single("cameraNear"),
            UniformSlot::single("cameraFar"),
            UniformSlot::single("onlyAO"),
            UniformSlot::single("aoClamp"),
            UniformSlot::single("lumInfluence"),
            UniformSlot::single("radius"),
        ],
        &["tDiffuse", "tDepth"],
    );

    pub static BOKEH: ShaderProgram = ShaderProgram::new(
        "bokeh",
        include_str!("shaders/bokeh.wgsl"),
        &[
            UniformSlot::single("focus"),
            UniformSlot::single("aperture"),
            UniformSlot::single("maxblur"),
            UniformSlot::single("nearClip"),
            UniformSlot::single("farClip"),
            UniformSlot::single("aspect"),
        ],
        &["tColor", "tDepth"],
    );

    /// Every built-in program, for name lookup.
    pub static ALL: &[&ShaderProgram] = &[
        &COPY,
        &CONVOLUTION,
        &LUMINOSITY_HIGH_PASS,
        &SEPARABLE_BLUR,
        &UNREAL_COMPOSITE,
        &DOT_SCREEN,
        &FILM,
        &HUE_SATURATION,
        &FXAA,
        &COLORIFY,
        &SOBEL,
        &TECHNICOLOR,
        &SSAO,
        &BOKEH,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_programs_fit_their_limits() {
        for program in programs::ALL {
            assert!(program.slot_count() <= MAX_UNIFORM_SLOTS, "{}", program.name());
            assert!(program.textures().len() <= MAX_TEXTURE_SLOTS, "{}", program.name());
            assert!(!program.textures().is_empty(), "{}", program.name());
            assert!(program.source().contains("fn fs"), "{}", program.name());
        }
    }

    #[test]
    fn builtin_lookup_by_name() {
        assert_eq!(ShaderProgram::builtin("copy"), Some(&programs::COPY));
        assert!(ShaderProgram::builtin("nope").is_none());
    }

    #[test]
    fn pack_lays_out_slots_in_order() {
        let uniforms = Uniforms::new()
            .with("uImageIncrement", Vec2::new(0.5, 0.0))
            .with("kernelSize", 5.0_f32)
            .with("cKernel", vec![1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        let block = programs::CONVOLUTION.pack(&uniforms);
        assert_eq!(block[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(block[1], [5.0, 0.0, 0.0, 0.0]);
        assert_eq!(block[2], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(block[3], [5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn pack_ignores_unknown_and_zeroes_missing() {
        let uniforms = Uniforms::new().with("bogus", 3.0_f32).with("grayscale", true);
        let block = programs::FILM.pack(&uniforms);
        assert_eq!(block[0], [0.0; 4]);
        assert_eq!(block[4], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn uniform_values_keep_their_shape_through_json() {
        let uniforms = Uniforms::new()
            .with("a", 0.25_f32)
            .with("b", Vec3::new(1.0, 0.5, 0.0))
            .with("c", false);
        let json = serde_json::to_value(&uniforms).unwrap();
        let back: Uniforms = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), json);
        assert_eq!(back.get("b"), Some(&UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.0))));
    }
}
