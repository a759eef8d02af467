//! Error types for the composer, passes, and the wgpu backend.

use crate::pass::PassKind;

/// Errors returned by [`Composer`](crate::Composer) operations.
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    /// The composer's render targets were released by `dispose` and
    /// have not been reallocated with `reset`.
    #[error("composer has been disposed")]
    Disposed,

    /// A serialized pipeline document could not be parsed at all.
    #[error("failed to parse pipeline descriptor: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while constructing a pass.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// A shader program lacks a texture slot the pass must bind.
    #[error("shader program `{program}` has no `{slot}` texture slot")]
    MissingSlot {
        program: &'static str,
        slot: &'static str,
    },

    /// No built-in shader program is registered under this name.
    #[error("unknown shader program `{0}`")]
    UnknownProgram(String),
}

/// Errors raised while setting up the wgpu backend.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// A non-fatal problem found while rebuilding a pass chain from a descriptor.
///
/// Decoding never fails on a single bad entry, whatever its shape; each
/// recovered problem is reported here and logged at warn level.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeWarning {
    /// The `type` tag was not recognized; a default render pass was used instead.
    #[error("pass {index}: unknown type `{tag}`, substituted a render pass")]
    UnknownType { index: usize, tag: String },

    /// The type-specific fields did not match the pass kind; defaults were used.
    #[error("pass {index}: invalid {kind:?} parameters ({message}), using defaults")]
    InvalidParams {
        index: usize,
        kind: PassKind,
        message: String,
    },

    /// A shared field (`id` or a flag) had the wrong JSON type; the kind's default was kept.
    #[error("pass {index}: invalid `{field}` ({message}), using the default")]
    InvalidField {
        index: usize,
        field: &'static str,
        message: String,
    },

    /// A shader pass named a program that is not registered; a render pass was used.
    #[error("pass {index}: unknown shader program `{program}`, substituted a render pass")]
    UnknownProgram { index: usize, program: String },
}
