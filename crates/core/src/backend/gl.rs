//! [`ShaderBackend`] for a live `glow::Context`.
//!
//! Every call maps onto exactly one GL entry point. glow marks raw GL calls
//! as unsafe; the context must be current on the calling thread and the
//! handles passed in must come from this same context, which the lifecycle
//! types in [`crate::program`] guarantee.

#![allow(unsafe_code)]

use super::ShaderBackend;
use crate::stage::StageKind;
use glow::HasContext;

impl ShaderBackend for glow::Context {
    type Stage = glow::Shader;
    type Program = glow::Program;
    type Location = glow::UniformLocation;

    fn create_stage(&self, kind: StageKind) -> Result<glow::Shader, String> {
        // SAFETY: kind.gl_enum() is always a valid shader type constant.
        unsafe { self.create_shader(kind.gl_enum()) }
    }

    fn compile_stage(&self, stage: glow::Shader, source: &str) {
        // SAFETY: stage was returned by create_stage on this context.
        unsafe {
            self.shader_source(stage, source);
            self.compile_shader(stage);
        }
    }

    fn stage_compile_status(&self, stage: glow::Shader) -> bool {
        // SAFETY: stage is a live shader object of this context.
        unsafe { self.get_shader_compile_status(stage) }
    }

    fn stage_info_log(&self, stage: glow::Shader) -> String {
        // SAFETY: stage is a live shader object of this context.
        unsafe { self.get_shader_info_log(stage) }
    }

    fn delete_stage(&self, stage: glow::Shader) {
        // SAFETY: stage is live and its single owner deletes it once.
        unsafe { self.delete_shader(stage) }
    }

    fn create_program(&self) -> Result<glow::Program, String> {
        // SAFETY: no handles are involved; failure is returned as Err.
        unsafe { HasContext::create_program(self) }
    }

    fn attach_stage(&self, program: glow::Program, stage: glow::Shader) {
        // SAFETY: program and stage are live objects of this context.
        unsafe { self.attach_shader(program, stage) }
    }

    fn detach_stage(&self, program: glow::Program, stage: glow::Shader) {
        // SAFETY: stage was attached to program by attach_stage.
        unsafe { self.detach_shader(program, stage) }
    }

    fn link_program(&self, program: glow::Program) {
        // SAFETY: program is a live program object of this context.
        unsafe { HasContext::link_program(self, program) }
    }

    fn program_link_status(&self, program: glow::Program) -> bool {
        // SAFETY: program is a live program object of this context.
        unsafe { self.get_program_link_status(program) }
    }

    fn program_info_log(&self, program: glow::Program) -> String {
        // SAFETY: program is a live program object of this context.
        unsafe { self.get_program_info_log(program) }
    }

    fn delete_program(&self, program: glow::Program) {
        // SAFETY: program is live and its single owner deletes it once.
        unsafe { HasContext::delete_program(self, program) }
    }

    fn use_program(&self, program: Option<glow::Program>) {
        // SAFETY: program is None or a linked program of this context.
        unsafe { HasContext::use_program(self, program) }
    }

    fn uniform_location(&self, program: glow::Program, name: &str) -> Option<glow::UniformLocation> {
        // SAFETY: program is a linked program of this context.
        unsafe { self.get_uniform_location(program, name) }
    }

    fn uniform_1_i32(&self, location: Option<&glow::UniformLocation>, value: i32) {
        // SAFETY: location was resolved from the current program; None is ignored by GL.
        unsafe { HasContext::uniform_1_i32(self, location, value) }
    }

    fn uniform_1_f32(&self, location: Option<&glow::UniformLocation>, value: f32) {
        // SAFETY: location was resolved from the current program; None is ignored by GL.
        unsafe { HasContext::uniform_1_f32(self, location, value) }
    }

    fn uniform_2_f32(&self, location: Option<&glow::UniformLocation>, value: [f32; 2]) {
        // SAFETY: location was resolved from the current program; the slice holds 2 floats.
        unsafe { self.uniform_2_f32_slice(location, &value) }
    }

    fn uniform_3_f32(&self, location: Option<&glow::UniformLocation>, value: [f32; 3]) {
        // SAFETY: location was resolved from the current program; the slice holds 3 floats.
        unsafe { self.uniform_3_f32_slice(location, &value) }
    }

    fn uniform_4_f32(&self, location: Option<&glow::UniformLocation>, value: [f32; 4]) {
        // SAFETY: location was resolved from the current program; the slice holds 4 floats.
        unsafe { self.uniform_4_f32_slice(location, &value) }
    }

    fn uniform_matrix_2_f32(&self, location: Option<&glow::UniformLocation>, value: [f32; 4]) {
        // SAFETY: the slice holds one column-major 2x2 matrix.
        unsafe { self.uniform_matrix_2_f32_slice(location, false, &value) }
    }

    fn uniform_matrix_3_f32(&self, location: Option<&glow::UniformLocation>, value: [f32; 9]) {
        // SAFETY: the slice holds one column-major 3x3 matrix.
        unsafe { self.uniform_matrix_3_f32_slice(location, false, &value) }
    }

    fn uniform_matrix_4_f32(&self, location: Option<&glow::UniformLocation>, value: [f32; 16]) {
        // SAFETY: the slice holds one column-major 4x4 matrix.
        unsafe { self.uniform_matrix_4_f32_slice(location, false, &value) }
    }

    fn read_uniform_f32(
        &self,
        program: glow::Program,
        location: &glow::UniformLocation,
        out: &mut [f32],
    ) {
        // SAFETY: location belongs to program; callers size out for the uniform type.
        unsafe { self.get_uniform_f32(program, location, out) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glow_context_implements_shader_backend() {
        fn assert_backend<B: ShaderBackend>() {}
        assert_backend::<glow::Context>();
    }
}
