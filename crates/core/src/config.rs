//! Program configuration and on-disk program manifests.
//!
//! [`ProgramConfig`] carries the per-program policy knobs. A
//! [`ProgramManifest`] is a small JSON document naming the shader files of
//! one program, so tools and hosts can describe programs as data:
//!
//! ```json
//! {
//!   "label": "lit-cube",
//!   "stages": [
//!     { "path": "shaders/cube.vs" },
//!     { "path": "shaders/cube.glsl", "stage": "fragment" }
//!   ],
//!   "config": { "missing_uniform": "warn" }
//! }
//! ```

use crate::error::ShaderError;
use crate::source::ShaderSource;
use crate::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What `set` does when a uniform name does not resolve to an active
/// uniform (misspelt, or optimised out by the compiler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingUniformPolicy {
    /// Silently skip the write, as the driver does.
    #[default]
    Ignore,
    /// Skip the write and log a warning the first time each name misses.
    Warn,
}

/// Per-program settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Name used in log lines.
    pub label: Option<String>,
    pub missing_uniform: MissingUniformPolicy,
    /// Reject programs lacking a vertex or fragment stage before any
    /// driver object is created.
    pub require_vertex_and_fragment: bool,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            label: None,
            missing_uniform: MissingUniformPolicy::Ignore,
            require_vertex_and_fragment: true,
        }
    }
}

impl ProgramConfig {
    /// Returns the label, or `"<unnamed>"`.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed>")
    }
}

/// One shader file of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    pub path: PathBuf,
    /// Explicit stage; inferred from the extension when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
}

/// A program described as a list of shader files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub stages: Vec<StageEntry>,
    #[serde(default)]
    pub config: ProgramConfig,
    /// Directory relative stage paths resolve against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ProgramManifest {
    /// Parses a manifest from JSON. Relative paths resolve against the
    /// current directory.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::InvalidManifest` for malformed JSON, unknown
    /// fields, or an empty stage list.
    pub fn from_json(json: &str) -> Result<Self, ShaderError> {
        let manifest: ProgramManifest =
            serde_json::from_str(json).map_err(|e| ShaderError::InvalidManifest(e.to_string()))?;
        if manifest.stages.is_empty() {
            return Err(ShaderError::InvalidManifest("no stages listed".into()));
        }
        Ok(manifest)
    }

    /// Reads and parses a manifest file; relative stage paths resolve
    /// against the manifest's directory.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::SourceUnavailable` if the file cannot be read,
    /// or `ShaderError::InvalidManifest` if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ShaderError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut manifest = Self::from_json(&json)?;
        manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    /// Resolves every entry into a file-backed [`ShaderSource`].
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::UnknownStage` for an entry with neither an
    /// explicit stage nor a recognised extension.
    pub fn sources(&self) -> Result<Vec<ShaderSource>, ShaderError> {
        self.stages
            .iter()
            .map(|entry| {
                let path = self.base_dir.join(&entry.path);
                match entry.stage {
                    Some(kind) => Ok(ShaderSource::file(kind, path)),
                    None => ShaderSource::from_path(path),
                }
            })
            .collect()
    }

    /// The program config, with the manifest's top-level label applied
    /// when the config has none.
    pub fn program_config(&self) -> ProgramConfig {
        let mut config = self.config.clone();
        if config.label.is_none() {
            config.label = self.label.clone();
        }
        config
    }
}
