//! Light component

use crate::foundation::math::Vec3;
use crate::scene::component::Component;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;

/// Light type
///
/// Serialized as a lowercase string so scene payloads stay plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LightKind {
    /// Parallel rays, e.g. the sun
    #[default]
    Directional,
    /// Omnidirectional point light
    Point,
    /// Cone light
    Spot,
}

impl fmt::Display for LightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directional => "directional",
            Self::Point => "point",
            Self::Spot => "spot",
        })
    }
}

impl FromStr for LightKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directional" => Ok(Self::Directional),
            "point" => Ok(Self::Point),
            "spot" => Ok(Self::Spot),
            other => Err(format!("unknown light kind '{other}'")),
        }
    }
}

impl TryFrom<String> for LightKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LightKind> for String {
    fn from(kind: LightKind) -> Self {
        kind.to_string()
    }
}

/// Light source attached to a game object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    /// Light type
    pub kind: LightKind,
    /// Linear RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
        }
    }
}

impl Light {
    /// Create a white light of the given kind
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Color scaled by intensity
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

impl Component for Light {
    fn type_name(&self) -> &'static str {
        "light"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kind_strings() {
        assert_eq!("spot".parse::<LightKind>(), Ok(LightKind::Spot));
        assert!("area".parse::<LightKind>().is_err());
        assert_eq!(String::from(LightKind::Point), "point");
    }

    #[test]
    fn test_radiance() {
        let light = Light {
            intensity: 2.0,
            ..Light::new(LightKind::Point)
        };
        assert_relative_eq!(light.radiance(), Vec3::new(2.0, 2.0, 2.0));
    }
}
