//! Shader program lifecycle: compile stages, link, activate, set uniforms.
//!
//! A program moves through `compile_stage` -> `link` -> [`ShaderProgram`].
//! Every driver object has exactly one owner along the way:
//!
//! - [`CompiledStage`] owns a compiled shader object and deletes it on drop,
//!   so a failure part-way through a build frees the stages already compiled.
//! - [`link`] consumes its stages; none outlives the call whether linking
//!   succeeds or fails.
//! - [`ShaderProgram`] owns the linked program object and deletes it on
//!   drop. It is not `Clone`, so no two values alias one handle.
//!
//! A program is either valid (it holds a linked handle) or invalid (it holds
//! none). `use_program` and `set` on an invalid program do nothing.

use crate::backend::ShaderBackend;
use crate::config::{MissingUniformPolicy, ProgramConfig, ProgramManifest};
use crate::error::ShaderError;
use crate::source::{format_shader_error, ShaderSource};
use crate::stage::StageKind;
use crate::uniform::UniformValue;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// A successfully compiled shader stage, waiting to be linked.
pub struct CompiledStage<'b, B: ShaderBackend> {
    backend: &'b B,
    kind: StageKind,
    handle: B::Stage,
}

impl<'b, B: ShaderBackend> CompiledStage<'b, B> {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn handle(&self) -> B::Stage {
        self.handle
    }
}

impl<B: ShaderBackend> Drop for CompiledStage<'_, B> {
    fn drop(&mut self) {
        self.backend.delete_stage(self.handle);
    }
}

impl<B: ShaderBackend> fmt::Debug for CompiledStage<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledStage")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Compiles a single shader stage.
///
/// On failure the shader object is deleted before returning, and the error
/// carries the numbered source followed by the driver's info log.
///
/// # Errors
///
/// Returns `ShaderError::CompileError` if the driver cannot allocate the
/// shader object or the GLSL fails to compile.
pub fn compile_stage<'b, B: ShaderBackend>(
    backend: &'b B,
    kind: StageKind,
    source: &str,
) -> Result<CompiledStage<'b, B>, ShaderError> {
    let handle = backend
        .create_stage(kind)
        .map_err(|log| ShaderError::CompileError { stage: kind, log })?;

    backend.compile_stage(handle, source);

    if backend.stage_compile_status(handle) {
        log::debug!("compiled {kind} stage {handle:?}");
        Ok(CompiledStage {
            backend,
            kind,
            handle,
        })
    } else {
        let info_log = backend.stage_info_log(handle);
        backend.delete_stage(handle);
        Err(ShaderError::CompileError {
            stage: kind,
            log: format_shader_error(source, &info_log),
        })
    }
}

/// Links compiled stages into a program.
///
/// Attaches every stage, links once, then detaches and deletes the stages
/// regardless of the outcome. On failure the program object is deleted too.
///
/// # Errors
///
/// Returns `ShaderError::MissingStage` if `config` requires vertex and
/// fragment stages and one is absent (checked before any program object is
/// created), or `ShaderError::LinkError` with the driver's info log.
pub fn link<'b, B: ShaderBackend>(
    backend: &'b B,
    stages: Vec<CompiledStage<'b, B>>,
    config: ProgramConfig,
) -> Result<ShaderProgram<'b, B>, ShaderError> {
    if config.require_vertex_and_fragment {
        let kinds: Vec<StageKind> = stages.iter().map(CompiledStage::kind).collect();
        check_required_stages(&kinds)?;
    }

    let program = backend.create_program().map_err(ShaderError::LinkError)?;

    for stage in &stages {
        backend.attach_stage(program, stage.handle);
    }
    backend.link_program(program);
    for stage in &stages {
        backend.detach_stage(program, stage.handle);
    }
    drop(stages);

    if backend.program_link_status(program) {
        log::debug!("linked program {program:?} ({})", config.display_label());
        Ok(ShaderProgram {
            backend,
            handle: Some(program),
            config,
            warned: RefCell::new(HashSet::new()),
        })
    } else {
        let info_log = backend.program_info_log(program);
        backend.delete_program(program);
        Err(ShaderError::LinkError(info_log))
    }
}

fn check_required_stages(kinds: &[StageKind]) -> Result<(), ShaderError> {
    for required in [StageKind::Vertex, StageKind::Fragment] {
        if !kinds.contains(&required) {
            return Err(ShaderError::MissingStage(required));
        }
    }
    Ok(())
}

/// Whether a [`ShaderProgram`] holds a linked program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Valid,
    Invalid,
}

/// A linked GPU program and the typed uniform interface to it.
pub struct ShaderProgram<'b, B: ShaderBackend> {
    backend: &'b B,
    handle: Option<B::Program>,
    config: ProgramConfig,
    /// Uniform names already reported under `MissingUniformPolicy::Warn`.
    warned: RefCell<HashSet<String>>,
}

impl<'b, B: ShaderBackend> ShaderProgram<'b, B> {
    /// A program in the terminal invalid state. `use_program` and `set`
    /// on it are no-ops.
    pub fn invalid(backend: &'b B) -> Self {
        Self::invalid_with_config(backend, ProgramConfig::default())
    }

    fn invalid_with_config(backend: &'b B, config: ProgramConfig) -> Self {
        Self {
            backend,
            handle: None,
            config,
            warned: RefCell::new(HashSet::new()),
        }
    }

    /// The driver handle, `None` for an invalid program.
    pub fn handle(&self) -> Option<B::Program> {
        self.handle
    }

    pub fn state(&self) -> ProgramState {
        if self.handle.is_some() {
            ProgramState::Valid
        } else {
            ProgramState::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    /// Makes this program current for subsequent draw calls.
    ///
    /// Safe to call repeatedly. Does nothing for an invalid program; the
    /// previously bound program stays bound.
    pub fn use_program(&self) {
        if let Some(program) = self.handle {
            self.backend.use_program(Some(program));
        }
    }

    /// Sets the uniform `name` to `value`.
    ///
    /// Activates the program, resolves the name, and issues one upload call
    /// matching the value's shape. A name that is not an active uniform of
    /// the program performs no write (see [`MissingUniformPolicy`]).
    pub fn set(&self, name: &str, value: impl Into<UniformValue>) {
        let Some(program) = self.handle else {
            return;
        };

        let value = value.into();
        self.backend.use_program(Some(program));
        let location = self.backend.uniform_location(program, name);
        if location.is_none() {
            self.report_missing(name, &value);
        }
        upload(self.backend, location.as_ref(), value);
    }

    /// Reads the current value of uniform `name` into `out` (column-major
    /// for matrices). Returns `false` if the program is invalid or the name
    /// is not an active uniform.
    pub fn read_uniform(&self, name: &str, out: &mut [f32]) -> bool {
        let Some(program) = self.handle else {
            return false;
        };
        match self.backend.uniform_location(program, name) {
            Some(location) => {
                self.backend.read_uniform_f32(program, &location, out);
                true
            }
            None => false,
        }
    }

    fn report_missing(&self, name: &str, value: &UniformValue) {
        match self.config.missing_uniform {
            MissingUniformPolicy::Ignore => {}
            MissingUniformPolicy::Warn => {
                if self.warned.borrow_mut().insert(name.to_string()) {
                    log::warn!(
                        "program {}: `{name}` is not an active uniform; {} write skipped",
                        self.config.display_label(),
                        value.glsl_type()
                    );
                }
            }
        }
    }
}

impl<B: ShaderBackend> Drop for ShaderProgram<'_, B> {
    fn drop(&mut self) {
        if let Some(program) = self.handle.take() {
            self.backend.delete_program(program);
        }
    }
}

impl<B: ShaderBackend> fmt::Debug for ShaderProgram<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("handle", &self.handle)
            .field("label", &self.config.label)
            .finish()
    }
}

/// Issues the single upload call for the value's shape.
fn upload<B: ShaderBackend>(backend: &B, location: Option<&B::Location>, value: UniformValue) {
    match value {
        UniformValue::Bool(v) => backend.uniform_1_i32(location, i32::from(v)),
        UniformValue::Int(v) => backend.uniform_1_i32(location, v),
        UniformValue::Float(v) => backend.uniform_1_f32(location, v),
        UniformValue::Vec2(v) => backend.uniform_2_f32(location, v.to_array()),
        UniformValue::Vec3(v) => backend.uniform_3_f32(location, v.to_array()),
        UniformValue::Vec4(v) => backend.uniform_4_f32(location, v.to_array()),
        UniformValue::Mat2(m) => backend.uniform_matrix_2_f32(location, m.to_cols_array()),
        UniformValue::Mat3(m) => backend.uniform_matrix_3_f32(location, m.to_cols_array()),
        UniformValue::Mat4(m) => backend.uniform_matrix_4_f32(location, m.to_cols_array()),
    }
}

/// Collects shader sources and builds a [`ShaderProgram`] from them.
///
/// ```
/// use shaderkit_core::{HeadlessBackend, ProgramBuilder};
///
/// let gl = HeadlessBackend::new();
/// let program = ProgramBuilder::new(&gl)
///     .vertex("#version 330 core\nvoid main(){gl_Position=vec4(0);}")
///     .fragment("#version 330 core\nout vec4 c;void main(){c=vec4(1);}")
///     .build()
///     .unwrap();
/// program.set("nonexistent", 1.0_f32);
/// assert!(program.is_valid());
/// ```
pub struct ProgramBuilder<'b, B: ShaderBackend> {
    backend: &'b B,
    sources: Vec<ShaderSource>,
    config: ProgramConfig,
}

impl<'b, B: ShaderBackend> ProgramBuilder<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self {
            backend,
            sources: Vec::new(),
            config: ProgramConfig::default(),
        }
    }

    /// Starts a builder from a manifest's stage list and config.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::UnknownStage` if an entry's stage cannot be
    /// determined.
    pub fn from_manifest(backend: &'b B, manifest: &ProgramManifest) -> Result<Self, ShaderError> {
        Ok(Self {
            backend,
            sources: manifest.sources()?,
            config: manifest.program_config(),
        })
    }

    pub fn source(mut self, source: ShaderSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Adds an inline stage.
    pub fn stage(self, kind: StageKind, text: impl Into<String>) -> Self {
        self.source(ShaderSource::inline(kind, text))
    }

    pub fn vertex(self, text: impl Into<String>) -> Self {
        self.stage(StageKind::Vertex, text)
    }

    pub fn fragment(self, text: impl Into<String>) -> Self {
        self.stage(StageKind::Fragment, text)
    }

    pub fn geometry(self, text: impl Into<String>) -> Self {
        self.stage(StageKind::Geometry, text)
    }

    /// Adds a stage read from `path` at build time.
    pub fn file(self, kind: StageKind, path: impl Into<PathBuf>) -> Self {
        self.source(ShaderSource::file(kind, path))
    }

    pub fn config(mut self, config: ProgramConfig) -> Self {
        self.config = config;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Loads every source, compiles every stage, and links.
    ///
    /// Sources are all read before the first driver call, so a missing file
    /// allocates nothing. A compile failure releases the stages compiled so
    /// far; no program object is created.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable`, `MissingStage`, `CompileError`, or `LinkError`.
    pub fn build(self) -> Result<ShaderProgram<'b, B>, ShaderError> {
        if self.config.require_vertex_and_fragment {
            let kinds: Vec<StageKind> = self.sources.iter().map(ShaderSource::kind).collect();
            check_required_stages(&kinds)?;
        }

        let texts = self
            .sources
            .iter()
            .map(|s| s.load().map(|text| (s.kind(), text)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stages = Vec::with_capacity(texts.len());
        for (kind, text) in &texts {
            stages.push(compile_stage(self.backend, *kind, text)?);
        }

        link(self.backend, stages, self.config)
    }

    /// Like [`build`](Self::build), but logs a failure and returns an
    /// invalid program instead.
    pub fn build_or_invalid(self) -> ShaderProgram<'b, B> {
        let backend = self.backend;
        let config = self.config.clone();
        match self.build() {
            Ok(program) => program,
            Err(e) => {
                log::error!("program {}: {e}", config.display_label());
                ShaderProgram::invalid_with_config(backend, config)
            }
        }
    }
}
