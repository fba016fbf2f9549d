#![deny(unsafe_code)]
//! Compile, link, and drive OpenGL shader programs.
//!
//! A [`ProgramBuilder`] collects GLSL stages (inline or from files), compiles
//! each one, and links them into a [`ShaderProgram`]. The program owns its
//! driver handle, activates itself with [`ShaderProgram::use_program`], and
//! binds typed values by name with [`ShaderProgram::set`].
//!
//! All driver calls go through the [`ShaderBackend`] trait. With the `gl`
//! feature it is implemented for `glow::Context`; [`HeadlessBackend`] runs
//! the same lifecycle in-process with front-end GLSL checks and no GPU.

pub mod backend;
pub mod config;
pub mod error;
pub mod glsl;
pub mod logging;
pub mod program;
pub mod source;
pub mod stage;
pub mod uniform;

pub use backend::{HeadlessBackend, ShaderBackend};
pub use config::{MissingUniformPolicy, ProgramConfig, ProgramManifest, StageEntry};
pub use error::ShaderError;
pub use logging::{init_logging, LoggingConfig};
pub use program::{compile_stage, link, CompiledStage, ProgramBuilder, ProgramState, ShaderProgram};
pub use source::ShaderSource;
pub use stage::StageKind;
pub use uniform::UniformValue;
