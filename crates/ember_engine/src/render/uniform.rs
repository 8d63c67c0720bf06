//! Typed shader uniform values
//!
//! Uniforms are stored in material descriptions with a compact tagged-string
//! encoding, `"<type>:<value>"`:
//!
//! ```text
//! bool:true   int:-3   uint:7   float:0.25
//! vec3:1.500000,-2.000000,0.000000
//! mat2:1.000000,0.000000,0.000000,1.000000
//! ```
//!
//! Vectors and matrices are comma-separated floats written with six decimals;
//! matrices are column-major. Decoding requires the exact element count of the
//! type.

use crate::foundation::math::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Uniform decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UniformError {
    /// Missing `:` separator
    #[error("parse error, invalid format: '{0}'")]
    InvalidFormat(String),

    /// Type tag not recognized
    #[error("parse error, unknown data type: {0}")]
    UnknownType(String),

    /// Element count does not match the type
    #[error("parse error, invalid number of elements for {kind}: expected {expected}, found {found}")]
    InvalidElementCount {
        /// Type tag
        kind: &'static str,
        /// Required count
        expected: usize,
        /// Parsed count
        found: usize,
    },

    /// A literal failed to parse
    #[error("parse error, invalid {kind} value '{value}'")]
    InvalidValue {
        /// Type tag
        kind: &'static str,
        /// Offending text
        value: String,
    },
}

/// A typed uniform value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UniformValue {
    /// `bool`
    Bool(bool),
    /// `int`
    Int(i32),
    /// `uint`
    Uint(u32),
    /// `float`
    Float(f32),
    /// `vec2`
    Vec2(Vec2),
    /// `vec3`
    Vec3(Vec3),
    /// `vec4`
    Vec4(Vec4),
    /// `mat2`
    Mat2(Mat2),
    /// `mat3`
    Mat3(Mat3),
    /// `mat4`
    Mat4(Mat4),
}

impl UniformValue {
    /// Type tag used in the encoding
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat2(_) => "mat2",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
        }
    }

    /// Float components in column-major order; empty for scalars
    pub fn components(&self) -> &[f32] {
        match self {
            Self::Bool(_) | Self::Int(_) | Self::Uint(_) | Self::Float(_) => &[],
            Self::Vec2(v) => v.as_slice(),
            Self::Vec3(v) => v.as_slice(),
            Self::Vec4(v) => v.as_slice(),
            Self::Mat2(m) => m.as_slice(),
            Self::Mat3(m) => m.as_slice(),
            Self::Mat4(m) => m.as_slice(),
        }
    }
}

fn parse_scalar<T: FromStr>(kind: &'static str, value: &str) -> Result<T, UniformError> {
    value.trim().parse().map_err(|_| UniformError::InvalidValue {
        kind,
        value: value.to_string(),
    })
}

fn parse_floats(kind: &'static str, value: &str, expected: usize) -> Result<Vec<f32>, UniformError> {
    let floats = value
        .split(',')
        .map(|item| parse_scalar::<f32>(kind, item))
        .collect::<Result<Vec<_>, _>>()?;

    if floats.len() != expected {
        return Err(UniformError::InvalidElementCount {
            kind,
            expected,
            found: floats.len(),
        });
    }
    Ok(floats)
}

impl FromStr for UniformValue {
    type Err = UniformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| UniformError::InvalidFormat(s.to_string()))?;

        match kind {
            "bool" => Ok(Self::Bool(parse_scalar("bool", value)?)),
            "int" => Ok(Self::Int(parse_scalar("int", value)?)),
            "uint" => Ok(Self::Uint(parse_scalar("uint", value)?)),
            "float" => Ok(Self::Float(parse_scalar("float", value)?)),
            "vec2" => Ok(Self::Vec2(Vec2::from_column_slice(&parse_floats("vec2", value, 2)?))),
            "vec3" => Ok(Self::Vec3(Vec3::from_column_slice(&parse_floats("vec3", value, 3)?))),
            "vec4" => Ok(Self::Vec4(Vec4::from_column_slice(&parse_floats("vec4", value, 4)?))),
            "mat2" => Ok(Self::Mat2(Mat2::from_column_slice(&parse_floats("mat2", value, 4)?))),
            "mat3" => Ok(Self::Mat3(Mat3::from_column_slice(&parse_floats("mat3", value, 9)?))),
            "mat4" => Ok(Self::Mat4(Mat4::from_column_slice(&parse_floats("mat4", value, 16)?))),
            other => Err(UniformError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.type_name())?;
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            _ => {
                for (i, component) in self.components().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{component:.6}")?;
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for UniformValue {
    type Error = UniformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UniformValue> for String {
    fn from(value: UniformValue) -> Self {
        value.to_string()
    }
}
