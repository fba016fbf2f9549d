//! Driver-facing interface.
//!
//! [`ShaderBackend`] is the slice of a GL-style graphics API the shader core
//! needs: shader-object creation and compilation, program linking, status
//! and info-log queries, program activation, and one uniform upload entry
//! point per value shape. It mirrors the driver one call per method and adds
//! no policy of its own; lifecycle rules live in [`crate::program`].
//!
//! - [`HeadlessBackend`] -- in-process stand-in that front-end checks GLSL.
//! - `glow::Context` (feature `gl`) -- a real OpenGL / WebGL2 context.

#[cfg(feature = "gl")]
mod gl;
mod headless;

pub use headless::{HeadlessBackend, HeadlessLocation, HeadlessProgram, HeadlessStage, UniformInfo};

use crate::stage::StageKind;
use std::fmt;

/// A graphics driver capable of compiling and linking GLSL programs.
///
/// All methods are immediate, synchronous driver calls issued on the thread
/// that owns the context. Handles are plain copyable identifiers; ownership
/// of the underlying driver objects is tracked by the callers in
/// [`crate::program`].
pub trait ShaderBackend {
    /// Handle of one shader-stage object.
    type Stage: Copy + fmt::Debug;
    /// Handle of one program object.
    type Program: Copy + fmt::Debug + PartialEq;
    /// Resolved location of an active uniform.
    type Location: fmt::Debug;

    /// Allocates a shader object for `kind`.
    fn create_stage(&self, kind: StageKind) -> Result<Self::Stage, String>;
    /// Sets the source of `stage` and compiles it.
    fn compile_stage(&self, stage: Self::Stage, source: &str);
    fn stage_compile_status(&self, stage: Self::Stage) -> bool;
    fn stage_info_log(&self, stage: Self::Stage) -> String;
    fn delete_stage(&self, stage: Self::Stage);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_stage(&self, program: Self::Program, stage: Self::Stage);
    fn detach_stage(&self, program: Self::Program, stage: Self::Stage);
    fn link_program(&self, program: Self::Program);
    fn program_link_status(&self, program: Self::Program) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);

    /// Makes `program` current; `None` unbinds.
    fn use_program(&self, program: Option<Self::Program>);

    /// Resolves an active uniform by name. `None` when the program has no
    /// active uniform of that name.
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Location>;

    // Uploads target the current program. A `None` location is a silent
    // no-op, matching GL's handling of location -1.
    fn uniform_1_i32(&self, location: Option<&Self::Location>, value: i32);
    fn uniform_1_f32(&self, location: Option<&Self::Location>, value: f32);
    fn uniform_2_f32(&self, location: Option<&Self::Location>, value: [f32; 2]);
    fn uniform_3_f32(&self, location: Option<&Self::Location>, value: [f32; 3]);
    fn uniform_4_f32(&self, location: Option<&Self::Location>, value: [f32; 4]);
    /// Column-major 2x2 matrix upload.
    fn uniform_matrix_2_f32(&self, location: Option<&Self::Location>, value: [f32; 4]);
    /// Column-major 3x3 matrix upload.
    fn uniform_matrix_3_f32(&self, location: Option<&Self::Location>, value: [f32; 9]);
    /// Column-major 4x4 matrix upload.
    fn uniform_matrix_4_f32(&self, location: Option<&Self::Location>, value: [f32; 16]);

    /// Reads a uniform's current value back as floats.
    fn read_uniform_f32(&self, program: Self::Program, location: &Self::Location, out: &mut [f32]);
}
