//! Building passes from their serialized descriptors.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    BloomPass, BokehPass, ClearMaskPass, ColorifyPass, CopyPass, DotScreenPass, FilmPass,
    FxaaPass, HueSaturationPass, MaskPass, Pass, PassDescriptor, PassKind, RenderPass,
    ShaderParams, ShaderPass, SobelPass, SsaoPass, TechnicolorPass, UnrealBloomPass,
};
use crate::error::DecodeWarning;
use crate::shader::programs;

/// Builds the pass described by `descriptor`, the `index`-th of its chain.
///
/// Decoding never fails: an unknown or missing type and an unknown shader
/// program become a default [`RenderPass`], parameters of the wrong shape fall
/// back to the kind's defaults, and shared fields of the wrong JSON type are
/// ignored. Each substitution is returned (and logged) as a warning.
pub fn decode_pass(
    index: usize,
    descriptor: &PassDescriptor,
) -> (Box<dyn Pass>, Vec<DecodeWarning>) {
    let mut warnings: Vec<DecodeWarning> = descriptor
        .rejected
        .iter()
        .map(|(field, message)| DecodeWarning::InvalidField {
            index,
            field: *field,
            message: message.clone(),
        })
        .collect();
    let mut pass: Box<dyn Pass> = match PassKind::from_tag(&descriptor.kind) {
        Some(kind) => build(kind, index, descriptor, &mut warnings),
        None => {
            warnings.push(DecodeWarning::UnknownType {
                index,
                tag: descriptor.kind.clone(),
            });
            Box::new(RenderPass::new())
        }
    };
    descriptor.apply_flags(pass.core_mut());

    for warning in &warnings {
        log::warn!("{warning}");
    }
    (pass, warnings)
}

fn build(
    kind: PassKind,
    index: usize,
    descriptor: &PassDescriptor,
    warnings: &mut Vec<DecodeWarning>,
) -> Box<dyn Pass> {
    let mut read = Reader {
        kind,
        index,
        descriptor,
        warnings,
    };
    match kind {
        PassKind::Render => Box::new(RenderPass::with_params(read.params())),
        PassKind::Copy => Box::new(CopyPass::with_params(read.params())),
        PassKind::Shader => read.shader(),
        PassKind::Bloom => Box::new(BloomPass::with_params(read.params())),
        PassKind::UnrealBloom => Box::new(UnrealBloomPass::with_params(read.params())),
        PassKind::Ssao => Box::new(SsaoPass::with_params(read.params())),
        PassKind::Bokeh => Box::new(BokehPass::with_params(read.params())),
        PassKind::Fxaa => Box::new(FxaaPass::new()),
        PassKind::Film => Box::new(FilmPass::with_params(read.params())),
        PassKind::DotScreen => Box::new(DotScreenPass::with_params(read.params())),
        PassKind::Colorify => Box::new(ColorifyPass::with_params(read.params())),
        PassKind::Sobel => Box::new(SobelPass::new()),
        PassKind::Technicolor => Box::new(TechnicolorPass::new()),
        PassKind::HueSaturation => Box::new(HueSaturationPass::with_params(read.params())),
        PassKind::Mask => Box::new(MaskPass::with_params(read.params())),
        PassKind::ClearMask => Box::new(ClearMaskPass::new()),
    }
}

struct Reader<'d, 'w> {
    kind: PassKind,
    index: usize,
    descriptor: &'d PassDescriptor,
    warnings: &'w mut Vec<DecodeWarning>,
}

impl Reader<'_, '_> {
    fn try_params<T: DeserializeOwned>(&mut self) -> Option<T> {
        let fields = Value::Object(self.descriptor.params.clone());
        match serde_json::from_value(fields) {
            Ok(params) => Some(params),
            Err(err) => {
                self.warnings.push(DecodeWarning::InvalidParams {
                    index: self.index,
                    kind: self.kind,
                    message: err.to_string(),
                });
                None
            }
        }
    }

    fn params<T: DeserializeOwned + Default>(&mut self) -> T {
        self.try_params().unwrap_or_default()
    }

    fn shader(&mut self) -> Box<dyn Pass> {
        let Some(params) = self.try_params::<ShaderParams>() else {
            return Box::new(ShaderPass::new(&programs::COPY));
        };
        let program = params.program.clone();
        match ShaderPass::from_params(params) {
            Ok(pass) => Box::new(pass),
            Err(_) => {
                self.warnings.push(DecodeWarning::UnknownProgram {
                    index: self.index,
                    program,
                });
                Box::new(RenderPass::new())
            }
        }
    }
}
