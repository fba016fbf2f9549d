//! Error types for shader compilation, linking, and source loading.

use crate::stage::StageKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building a shader program.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    /// A shader stage failed to compile.
    #[error("shader compile error ({stage}):\n{log}")]
    CompileError {
        /// The stage that failed.
        stage: StageKind,
        /// Numbered source followed by the driver's info log.
        log: String,
    },

    /// A program failed to link.
    #[error("shader link error:\n{0}")]
    LinkError(String),

    /// Shader source text could not be read from disk.
    #[error("shader source unavailable: {}: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// A required stage was not supplied.
    #[error("program has no {0} stage")]
    MissingStage(StageKind),

    /// The stage of a shader file could not be inferred from its extension.
    #[error("cannot infer shader stage from file name: {}", .0.display())]
    UnknownStage(PathBuf),

    /// A program manifest could not be parsed.
    #[error("invalid program manifest: {0}")]
    InvalidManifest(String),
}

impl ShaderError {
    /// Returns the failing stage for compile errors.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            ShaderError::CompileError { stage, .. } => Some(*stage),
            ShaderError::MissingStage(stage) => Some(*stage),
            _ => None,
        }
    }
}
