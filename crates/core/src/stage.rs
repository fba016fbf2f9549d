//! Shader stage kinds.
//!
//! A `StageKind` names one programmable stage of the GL pipeline. It knows its
//! GL enum value, its conventional file extensions, and its position in the
//! pipeline (used when matching stage interfaces at link time).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// `GL_VERTEX_SHADER`
pub const GL_VERTEX_SHADER: u32 = 0x8B31;
/// `GL_FRAGMENT_SHADER`
pub const GL_FRAGMENT_SHADER: u32 = 0x8B30;
/// `GL_GEOMETRY_SHADER`
pub const GL_GEOMETRY_SHADER: u32 = 0x8DD9;
/// `GL_TESS_CONTROL_SHADER`
pub const GL_TESS_CONTROL_SHADER: u32 = 0x8E88;
/// `GL_TESS_EVALUATION_SHADER`
pub const GL_TESS_EVALUATION_SHADER: u32 = 0x8E87;

/// One programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
}

impl StageKind {
    /// All stage kinds in pipeline order.
    pub const ALL: [StageKind; 5] = [
        StageKind::Vertex,
        StageKind::TessControl,
        StageKind::TessEvaluation,
        StageKind::Geometry,
        StageKind::Fragment,
    ];

    /// Returns the GL enum passed to `glCreateShader` for this stage.
    pub fn gl_enum(self) -> u32 {
        match self {
            StageKind::Vertex => GL_VERTEX_SHADER,
            StageKind::TessControl => GL_TESS_CONTROL_SHADER,
            StageKind::TessEvaluation => GL_TESS_EVALUATION_SHADER,
            StageKind::Geometry => GL_GEOMETRY_SHADER,
            StageKind::Fragment => GL_FRAGMENT_SHADER,
        }
    }

    /// Human-readable lowercase name (e.g. "vertex").
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Vertex => "vertex",
            StageKind::TessControl => "tessellation control",
            StageKind::TessEvaluation => "tessellation evaluation",
            StageKind::Geometry => "geometry",
            StageKind::Fragment => "fragment",
        }
    }

    /// File extensions conventionally used for this stage, without the dot.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            StageKind::Vertex => &["vert", "vs", "vsh", "glslv"],
            StageKind::TessControl => &["tesc"],
            StageKind::TessEvaluation => &["tese"],
            StageKind::Geometry => &["geom", "gs", "gsh"],
            StageKind::Fragment => &["frag", "fs", "fsh", "glslf"],
        }
    }

    /// Infers the stage from a path's extension (case-insensitive).
    ///
    /// Returns `None` when the path has no extension or it is not one of
    /// the conventional stage extensions.
    pub fn from_path(path: &Path) -> Option<StageKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }

    /// Index of this stage in pipeline order (vertex first, fragment last).
    pub fn pipeline_index(self) -> usize {
        match self {
            StageKind::Vertex => 0,
            StageKind::TessControl => 1,
            StageKind::TessEvaluation => 2,
            StageKind::Geometry => 3,
            StageKind::Fragment => 4,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
