//! Structured CLI errors with meaningful exit codes.
//!
//! Exit code scheme:
//! - 0:  success
//! - 2:  clap arg parse error (automatic, before our code runs)
//! - 10: compile error
//! - 11: link error
//! - 12: I/O error (unreadable shader or manifest)
//! - 13: input error (bad manifest, unknown extension, missing stage)
//! - 14: serialization error

use shaderkit_core::ShaderError;
use std::fmt;

/// Errors produced by CLI operations, each mapped to a distinct exit code.
pub enum CliError {
    /// A stage failed to compile.
    Compile(ShaderError),
    /// The stages compiled but did not link.
    Link(ShaderError),
    /// A file could not be read.
    Io(String),
    /// The command line or manifest describes no valid program.
    Input(String),
    /// JSON output failure.
    Serialization(String),
}

impl CliError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Compile(_) => 10,
            CliError::Link(_) => 11,
            CliError::Io(_) => 12,
            CliError::Input(_) => 13,
            CliError::Serialization(_) => 14,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Compile(e) | CliError::Link(e) => write!(f, "{e}"),
            CliError::Io(msg) => write!(f, "{msg}"),
            CliError::Input(msg) => write!(f, "{msg}"),
            CliError::Serialization(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<ShaderError> for CliError {
    fn from(e: ShaderError) -> Self {
        match e {
            ShaderError::CompileError { .. } => CliError::Compile(e),
            ShaderError::LinkError(_) => CliError::Link(e),
            ShaderError::SourceUnavailable { .. } => CliError::Io(e.to_string()),
            ShaderError::MissingStage(_)
            | ShaderError::UnknownStage(_)
            | ShaderError::InvalidManifest(_) => CliError::Input(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}
