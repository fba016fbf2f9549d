//! Typed uniform values.
//!
//! `UniformValue` is the closed set of shapes a program uniform can be set
//! to. Every Rust type that can be passed to
//! [`ShaderProgram::set`](crate::program::ShaderProgram::set) has a `From`
//! conversion into it; anything else is rejected at compile time.

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// A value that can be uploaded to a single uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    /// The GLSL type this value uploads to.
    pub fn glsl_type(&self) -> &'static str {
        match self {
            UniformValue::Bool(_) => "bool",
            UniformValue::Int(_) => "int",
            UniformValue::Float(_) => "float",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Mat2(_) => "mat2",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(v: $ty) -> Self {
                    UniformValue::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i16 => Int,
    i8 => Int,
    u16 => Int,
    u8 => Int,
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    [f32; 2] => Vec2,
    [f32; 3] => Vec3,
    [f32; 4] => Vec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

impl From<&Mat4> for UniformValue {
    fn from(m: &Mat4) -> Self {
        UniformValue::Mat4(*m)
    }
}

impl From<&Mat3> for UniformValue {
    fn from(m: &Mat3) -> Self {
        UniformValue::Mat3(*m)
    }
}

impl From<&Vec3> for UniformValue {
    fn from(v: &Vec3) -> Self {
        UniformValue::Vec3(*v)
    }
}
