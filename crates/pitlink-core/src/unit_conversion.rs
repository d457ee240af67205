//! Unit Conversion Functions
//!
//! Everything on the wire is Celsius. Fahrenheit only exists at the edges:
//! setpoints typed by the user and readings rendered back to them.

use serde::{Deserialize, Serialize};

/// Temperature unit chosen by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    /// Display suffix, e.g. "°F"
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }

    /// Convert a reading in Celsius into this unit
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(celsius),
            TemperatureUnit::Celsius => celsius,
        }
    }

    /// Convert a whole-degree setpoint in this unit to whole-degree Celsius
    pub fn setpoint_to_celsius(&self, value: i32) -> i32 {
        match self {
            TemperatureUnit::Fahrenheit => fahrenheit_to_celsius_rounded(value),
            TemperatureUnit::Celsius => value,
        }
    }
}

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert a whole-degree Fahrenheit setpoint to the nearest whole degree Celsius
///
/// `round((f - 32) * 5 / 9)`, halves rounding away from zero.
pub fn fahrenheit_to_celsius_rounded(f: i32) -> i32 {
    fahrenheit_to_celsius(f as f64).round() as i32
}
