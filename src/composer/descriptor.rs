//! Serialized form of a composer's pass chain.

use serde::{Deserialize, Serialize};

use super::Composer;
use crate::config::ComposerConfig;
use crate::error::{ComposerError, DecodeWarning};
use crate::pass::{PassDescriptor, decode_pass};

/// A composer as data: its id and the descriptors of its passes, in order.
///
/// Only the outer shape is strict. Each entry of `passes` accepts any JSON
/// value, so one malformed pass never rejects the rest of the document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposerDescriptor {
    #[serde(default, alias = "uuid", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub passes: Vec<PassDescriptor>,
}

/// A composer rebuilt from data, with every substitution made along the way.
#[derive(Debug)]
pub struct Decoded {
    pub composer: Composer,
    pub warnings: Vec<DecodeWarning>,
}

impl Composer {
    /// Describes the chain as data.
    pub fn to_descriptor(&self) -> ComposerDescriptor {
        ComposerDescriptor {
            id: Some(self.id.clone()),
            passes: self.passes.iter().map(|pass| pass.to_descriptor()).collect(),
        }
    }

    /// Rebuilds a composer with default buffers from `descriptor`.
    pub fn from_descriptor(descriptor: &ComposerDescriptor) -> Decoded {
        Self::from_descriptor_with_config(descriptor, ComposerConfig::default())
    }

    /// Rebuilds a composer from `descriptor`, allocating buffers per `config`.
    ///
    /// Never fails: passes that cannot be decoded as written are replaced
    /// in place and reported in [`Decoded::warnings`].
    pub fn from_descriptor_with_config(
        descriptor: &ComposerDescriptor,
        config: ComposerConfig,
    ) -> Decoded {
        let mut composer = Composer::with_config(config);
        if let Some(id) = &descriptor.id {
            composer.id = id.clone();
        }

        let mut warnings = Vec::new();
        for (index, pass) in descriptor.passes.iter().enumerate() {
            let (pass, pass_warnings) = decode_pass(index, pass);
            composer.add_boxed(pass);
            warnings.extend(pass_warnings);
        }
        Decoded { composer, warnings }
    }

    /// Parses a JSON document and rebuilds the composer it describes.
    ///
    /// # Errors
    ///
    /// [`ComposerError::Json`] if the text is not a composer document at all.
    /// Problems with individual passes are recovered and reported as warnings.
    pub fn from_json(json: &str) -> Result<Decoded, ComposerError> {
        let descriptor: ComposerDescriptor = serde_json::from_str(json)?;
        Ok(Self::from_descriptor(&descriptor))
    }

    pub fn to_json(&self) -> Result<String, ComposerError> {
        Ok(serde_json::to_string(&self.to_descriptor())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{
        BloomPass, BokehPass, ClearMaskPass, ColorifyPass, CopyPass, DotScreenPass, FilmPass,
        FxaaPass, HueSaturationPass, MaskPass, Pass, PassKind, RenderPass, ShaderPass, SobelPass,
        SsaoPass, TechnicolorPass, UnrealBloomPass,
    };
    use crate::scene::{Drawable, Mesh, Scene};
    use crate::shader::programs;
    use glam::{Vec2, Vec3};
    use serde_json::{Value, json};

    #[test]
    fn every_kind_survives_a_round_trip() {
        let descriptor = ComposerDescriptor {
            id: Some("chain".into()),
            passes: PassKind::ALL
                .iter()
                .map(|kind| PassDescriptor::new(kind.tag()))
                .collect(),
        };
        let first = Composer::from_descriptor(&descriptor).composer.to_descriptor();
        let second = Composer::from_descriptor(&first).composer.to_descriptor();

        assert_eq!(first.id.as_deref(), Some("chain"));
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        let kinds: Vec<&str> = second.passes.iter().map(|p| p.kind.as_str()).collect();
        let tags: Vec<&str> = PassKind::ALL.iter().map(|k| k.tag()).collect();
        assert_eq!(kinds, tags);
    }

    #[test]
    fn json_uses_camel_case_flags_and_flat_params() {
        let mut composer = Composer::new();
        composer.add_pass(BloomPass::new(2.0, 15, 3.0, 128).with_id("bloom"));
        let value: Value = serde_json::from_str(&composer.to_json().unwrap()).unwrap();

        let pass = &value["passes"][0];
        assert_eq!(pass["type"], "Bloom");
        assert_eq!(pass["id"], "bloom");
        assert_eq!(pass["needsSwap"], true);
        assert_eq!(pass["renderToScreen"], false);
        assert_eq!(pass["kernelSize"], 15);
        assert_eq!(pass["strength"], 2.0);
    }

    #[test]
    fn legacy_documents_decode() {
        let decoded = Composer::from_json(
            &json!({
                "uuid": "legacy",
                "passes": [
                    { "type": "Render", "uuid": "r", "enabled": true, "needsSwap": true,
                      "renderToScreen": false, "clear": true },
                    { "type": "Glitch", "uuid": "g" },
                    { "type": "Film", "uuid": "f", "grayscale": true, "renderToScreen": true }
                ]
            })
            .to_string(),
        )
        .unwrap();

        let composer = decoded.composer;
        assert_eq!(composer.id(), "legacy");
        assert_eq!(composer.len(), 3);
        assert_eq!(composer.passes()[1].kind(), PassKind::Render);
        assert_eq!(composer.passes()[1].id().as_str(), "g");
        assert_eq!(decoded.warnings.len(), 1);

        let film = composer.pass(&"f".into()).unwrap();
        assert!(film.render_to_screen());
        assert!(film.downcast_ref::<FilmPass>().unwrap().grayscale());
    }

    #[test]
    fn shader_passes_keep_program_and_uniforms() {
        let mut composer = Composer::new();
        let mut pass = ShaderPass::new(&programs::HUE_SATURATION);
        pass.uniforms_mut().set("saturation", -1.0_f32);
        composer.add_pass(pass);
        composer.add_pass(RenderPass::new());

        let decoded = Composer::from_json(&composer.to_json().unwrap()).unwrap();
        assert!(decoded.warnings.is_empty());
        let shader = decoded.composer.passes()[0]
            .downcast_ref::<ShaderPass>()
            .unwrap();
        assert_eq!(shader.program().name(), "hue_saturation");
        assert_eq!(shader.uniforms().float("saturation"), Some(-1.0));
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(matches!(
            Composer::from_json("{ passes: "),
            Err(ComposerError::Json(_))
        ));
        assert!(matches!(
            Composer::from_json(r#"{ "passes": 3 }"#),
            Err(ComposerError::Json(_))
        ));
        let empty = Composer::from_json("{}").unwrap();
        assert!(empty.composer.is_empty());
    }

    #[test]
    fn one_bad_entry_does_not_reject_its_neighbours() {
        let decoded = Composer::from_json(
            &json!({
                "passes": [
                    { "type": "Film", "id": "film" },
                    { "type": "Copy", "id": "copy", "enabled": "yes" },
                    { "type": "Render", "id": "render" }
                ]
            })
            .to_string(),
        )
        .unwrap();

        let composer = decoded.composer;
        let kinds: Vec<PassKind> = composer.passes().iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, [PassKind::Film, PassKind::Copy, PassKind::Render]);
        assert!(composer.pass(&"copy".into()).unwrap().enabled());
        assert!(matches!(
            decoded.warnings.as_slice(),
            [DecodeWarning::InvalidField {
                index: 1,
                field: "enabled",
                ..
            }]
        ));
    }

    #[test]
    fn entries_without_a_usable_type_become_render_passes() {
        let decoded = Composer::from_json(
            r#"{ "passes": [ { "id": "a" }, { "type": false }, 3, { "type": "Fxaa" } ] }"#,
        )
        .unwrap();

        let kinds: Vec<PassKind> = decoded.composer.passes().iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            [PassKind::Render, PassKind::Render, PassKind::Render, PassKind::Fxaa]
        );
        let indices: Vec<usize> = decoded
            .warnings
            .iter()
            .map(|warning| match warning {
                DecodeWarning::UnknownType { index, .. } => *index,
                other => panic!("unexpected warning {other}"),
            })
            .collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn mutated_passes_survive_a_round_trip() {
        let mut render = RenderPass::new();
        render.set_clear_color(Some(0x336699), 0.5);
        render.set_clear_depth(true);

        let mut copy = CopyPass::new();
        copy.set_opacity(0.25);

        let mut shader = ShaderPass::new(&programs::HUE_SATURATION);
        shader.uniforms_mut().set("hue", 0.5_f32);
        shader.uniforms_mut().set("saturation", -0.75_f32);

        let mut bloom = BloomPass::default();
        bloom.set_strength(2.5);
        bloom.set_kernel_size(9);
        bloom.set_sigma(2.0);
        bloom.set_resolution(128);

        let mut unreal = UnrealBloomPass::new(Vec2::new(64.0, 32.0), 1.0, 0.5, 0.25);
        unreal.set_strength(1.5);
        unreal.set_radius(0.75);
        unreal.set_threshold(0.5);
        unreal.set_bloom_factors([1.0, 0.75, 0.5, 0.25, 0.125]);
        unreal.set_bloom_tint_colors([Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE, Vec3::splat(0.5)]);

        let mut ssao = SsaoPass::new();
        ssao.set_only_ao(true);
        ssao.set_radius(16.0);
        ssao.set_ao_clamp(0.5);
        ssao.set_lum_influence(0.25);

        let mut bokeh = BokehPass::new(1.0, 0.025, 1.0);
        bokeh.set_focus(0.5);
        bokeh.set_aperture(0.125);
        bokeh.set_maxblur(0.5);

        let mut film = FilmPass::new();
        film.set_grayscale(true);
        film.set_noise_intensity(0.25);
        film.set_scanlines_intensity(0.125);
        film.set_scanlines_count(256.0);

        let mut dots = DotScreenPass::new(Vec2::new(0.5, 0.5), 1.5, 0.75);
        dots.set_center(Vec2::new(0.25, 0.75));
        dots.set_angle(0.5);
        dots.set_scale(2.0);

        let mut colorify = ColorifyPass::default();
        colorify.set_color(0x00ff80);

        let mut hue = HueSaturationPass::default();
        hue.set_hue(0.25);
        hue.set_saturation(-0.5);

        let mut mask = MaskPass::new(Scene::new("mask"));
        mask.set_inverse(true);
        mask.scene_mut().add(Drawable::new("quad", Mesh::plane(1.0)));

        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(render.with_id("render")),
            Box::new(copy.disabled()),
            Box::new(shader.clearing(true)),
            Box::new(bloom),
            Box::new(unreal),
            Box::new(ssao),
            Box::new(bokeh),
            Box::new(FxaaPass::new().rendering_to_screen()),
            Box::new(film),
            Box::new(dots),
            Box::new(colorify),
            Box::new(SobelPass::new().disabled()),
            Box::new(TechnicolorPass::new().clearing(true)),
            Box::new(hue),
            Box::new(mask),
            Box::new(ClearMaskPass::new().with_id("clear-mask")),
        ];
        let kinds: Vec<PassKind> = passes.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, PassKind::ALL);

        let mut composer = Composer::new();
        for pass in passes {
            composer.add_boxed(pass);
        }
        let decoded = Composer::from_json(&composer.to_json().unwrap()).unwrap();
        assert!(decoded.warnings.is_empty());

        for (before, after) in composer.passes().iter().zip(decoded.composer.passes()) {
            assert_eq!(
                before.to_descriptor(),
                after.to_descriptor(),
                "{:?} changed across a round trip",
                before.kind()
            );
        }
    }
}
