//! Conversion between physical units and the integers devices work in.

use serde::Deserialize;

/// The kind of motion an axis performs, which decides its physical units.
///
/// Linear axes work in meters, rotary axes in degrees.
///
/// Device tables may give it as a name (`"rotary"`) or as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "MotionTypeField")]
pub enum MotionType {
    #[default]
    None,
    Linear,
    Rotary,
    Tangential,
    Other,
}

impl MotionType {
    /// Converts the numeric code used in device tables.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => MotionType::None,
            1 => MotionType::Linear,
            2 => MotionType::Rotary,
            3 => MotionType::Tangential,
            _ => MotionType::Other,
        }
    }

    /// True when positions of this motion type have a physical meaning.
    pub fn has_units(self) -> bool {
        self != MotionType::None
    }
}

/// How a motion type is written in a device table.
#[derive(Deserialize)]
#[serde(untagged)]
enum MotionTypeField {
    Code(u8),
    Name(String),
}

impl TryFrom<MotionTypeField> for MotionType {
    type Error = String;

    fn try_from(field: MotionTypeField) -> Result<Self, Self::Error> {
        match field {
            MotionTypeField::Code(code) => Ok(MotionType::from_code(code)),
            MotionTypeField::Name(name) => match name.to_ascii_lowercase().as_str() {
                "none" => Ok(MotionType::None),
                "linear" => Ok(MotionType::Linear),
                "rotary" => Ok(MotionType::Rotary),
                "tangential" => Ok(MotionType::Tangential),
                "other" => Ok(MotionType::Other),
                _ => Err(format!("unknown motion type '{}'", name)),
            },
        }
    }
}

/// Degrees in one revolution of a rotary axis.
pub const DEGREES_PER_REVOLUTION: f64 = 360.0;

/// Converts between physical quantities and native device integers.
///
/// Position, velocity and acceleration are additionally multiplied by the
/// microstep resolution for mechanisms whose scale depends on it. Force is
/// never resolution dependent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    position_scale: f64,
    velocity_scale: f64,
    acceleration_scale: f64,
    force_scale: f64,
    resolution: u32,
    resolution_dependent: bool,
}

impl UnitConverter {
    /// Creates a converter with a resolution of 1.
    pub fn new(
        position_scale: f64,
        velocity_scale: f64,
        acceleration_scale: f64,
        force_scale: f64,
        resolution_dependent: bool,
    ) -> Self {
        UnitConverter {
            position_scale,
            velocity_scale,
            acceleration_scale,
            force_scale,
            resolution: 1,
            resolution_dependent,
        }
    }

    /// Returns a copy using the given microstep resolution.
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn is_resolution_dependent(&self) -> bool {
        self.resolution_dependent
    }

    fn factor(&self, scale: f64) -> f64 {
        if self.resolution_dependent {
            scale * self.resolution as f64
        } else {
            scale
        }
    }

    pub fn position_to_native(&self, position: f64) -> i64 {
        (position * self.factor(self.position_scale)).round() as i64
    }

    pub fn native_to_position(&self, native: i64) -> f64 {
        native as f64 / self.factor(self.position_scale)
    }

    pub fn velocity_to_native(&self, velocity: f64) -> i64 {
        (velocity * self.factor(self.velocity_scale)).round() as i64
    }

    pub fn native_to_velocity(&self, native: i64) -> f64 {
        native as f64 / self.factor(self.velocity_scale)
    }

    pub fn acceleration_to_native(&self, acceleration: f64) -> i64 {
        (acceleration * self.factor(self.acceleration_scale)).round() as i64
    }

    pub fn native_to_acceleration(&self, native: i64) -> f64 {
        native as f64 / self.factor(self.acceleration_scale)
    }

    pub fn force_to_native(&self, force: f64) -> i64 {
        (force * self.force_scale).round() as i64
    }

    pub fn native_to_force(&self, native: i64) -> f64 {
        native as f64 / self.force_scale
    }
}
