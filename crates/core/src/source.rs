//! Shader source text and where it comes from.
//!
//! A [`ShaderSource`] pairs a [`StageKind`] with either inline GLSL or a path
//! to a file on disk. Sources are immutable; file contents are read only when
//! [`ShaderSource::load`] is called, and a read failure surfaces as
//! [`ShaderError::SourceUnavailable`] before any driver object is created.

use crate::error::ShaderError;
use crate::stage::StageKind;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the GLSL text of a stage lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceOrigin {
    Inline(String),
    File(PathBuf),
}

/// A stage kind plus its GLSL source (inline or on disk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    kind: StageKind,
    origin: SourceOrigin,
}

impl ShaderSource {
    /// Creates a source from GLSL text held in memory.
    pub fn inline(kind: StageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            origin: SourceOrigin::Inline(text.into()),
        }
    }

    /// Creates a source that will be read from `path` on [`load`](Self::load).
    pub fn file(kind: StageKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            origin: SourceOrigin::File(path.into()),
        }
    }

    /// Creates a file source, inferring the stage from the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::UnknownStage` if the extension is not a
    /// recognised stage extension (see [`StageKind::extensions`]).
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ShaderError> {
        let path = path.into();
        match StageKind::from_path(&path) {
            Some(kind) => Ok(Self::file(kind, path)),
            None => Err(ShaderError::UnknownStage(path)),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Returns the file path for file-backed sources.
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            SourceOrigin::File(path) => Some(path),
            SourceOrigin::Inline(_) => None,
        }
    }

    /// Returns the GLSL text, reading it from disk for file sources.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::SourceUnavailable` if the file cannot be read
    /// or is not valid UTF-8.
    pub fn load(&self) -> Result<Cow<'_, str>, ShaderError> {
        match &self.origin {
            SourceOrigin::Inline(text) => Ok(Cow::Borrowed(text)),
            SourceOrigin::File(path) => fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|e| ShaderError::SourceUnavailable {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Short description used in log lines: the file path or "<inline>".
    pub fn describe(&self) -> String {
        match self.path() {
            Some(path) => path.display().to_string(),
            None => format!("<inline {}>", self.kind),
        }
    }
}

/// Formats a shader compilation error for human-readable debugging.
///
/// Prepends right-aligned line numbers to each line of `source`, then
/// appends the driver's error `log`. Driver logs reference line numbers,
/// so this puts the offending GLSL right next to the message.
///
/// Both `source` and `log` may be empty.
pub fn format_shader_error(source: &str, log: &str) -> String {
    let source_lines: Vec<&str> = source.lines().collect();

    let width = source_lines.len().max(1).to_string().len();

    let numbered: String = source_lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}: {line}", i + 1, width = width))
        .collect::<Vec<_>>()
        .join("\n");

    match (numbered.is_empty(), log.is_empty()) {
        (true, true) => String::new(),
        (true, false) => log.to_string(),
        (false, true) => numbered,
        (false, false) => format!("{numbered}\n\n{log}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inline_source_loads_without_io() {
        let src = ShaderSource::inline(StageKind::Vertex, "void main() {}");
        assert_eq!(src.load().unwrap(), "void main() {}");
        assert!(src.path().is_none());
    }

    #[test]
    fn file_source_reads_contents() {
        let mut file = tempfile::Builder::new().suffix(".frag").tempfile().unwrap();
        write!(file, "#version 330 core\nvoid main() {{}}\n").unwrap();

        let src = ShaderSource::from_path(file.path()).unwrap();
        assert_eq!(src.kind(), StageKind::Fragment);
        assert!(src.load().unwrap().starts_with("#version 330 core"));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.vs");
        let src = ShaderSource::file(StageKind::Vertex, &path);

        match src.load() {
            Err(ShaderError::SourceUnavailable { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn from_path_rejects_unknown_extension() {
        let err = ShaderSource::from_path("shader.txt").unwrap_err();
        assert!(matches!(err, ShaderError::UnknownStage(_)), "got {err:?}");
    }

    #[test]
    fn describe_distinguishes_inline_and_file() {
        assert_eq!(
            ShaderSource::inline(StageKind::Geometry, "").describe(),
            "<inline geometry>"
        );
        assert_eq!(
            ShaderSource::file(StageKind::Vertex, "a/b.vs").describe(),
            "a/b.vs"
        );
    }

    // --- format_shader_error ---

    #[test]
    fn format_shader_error_prepends_line_numbers() {
        let source = "#version 330 core\nvoid main() {\n}\n";
        let log = "ERROR: 0:2: syntax error";
        let formatted = format_shader_error(source, log);

        assert!(formatted.contains("1: #version 330 core"), "got:\n{formatted}");
        assert!(formatted.contains("2: void main() {"), "got:\n{formatted}");
        assert!(formatted.contains("3: }"), "got:\n{formatted}");
        assert!(formatted.ends_with(log), "got:\n{formatted}");
    }

    #[test]
    fn format_shader_error_handles_empty_inputs() {
        assert_eq!(format_shader_error("", "some error"), "some error");
        assert_eq!(format_shader_error("void main() {}", ""), "1: void main() {}");
        assert!(format_shader_error("", "").is_empty());
    }

    #[test]
    fn format_shader_error_right_aligns_line_numbers() {
        let source = (1..=12)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let formatted = format_shader_error(&source, "err");
        let lines: Vec<&str> = formatted.lines().collect();

        assert!(lines[0].starts_with(" 1: "), "got: '{}'", lines[0]);
        assert!(lines[9].starts_with("10: "), "got: '{}'", lines[9]);
    }
}
