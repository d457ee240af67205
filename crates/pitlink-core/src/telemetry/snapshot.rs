//! Decoded telemetry values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::unit_conversion::TemperatureUnit;

/// Temperature above which the controller performs an emergency shutdown
pub const SAFETY_LIMIT_C: f32 = 316.0;

/// Thermocouple fault flags reported alongside each temperature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFaults {
    pub chamber: bool,
    pub cook_left: bool,
    pub cook_right: bool,
}

impl ProbeFaults {
    pub fn any(&self) -> bool {
        self.chamber || self.cook_left || self.cook_right
    }
}

/// One telemetry frame from the controller
///
/// Temperatures are Celsius, exactly as sent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Smoke chamber temperature
    pub chamber_temp_c: f32,
    /// Left meat probe temperature
    pub cook_temp_left_c: f32,
    /// Right meat probe temperature
    pub cook_temp_right_c: f32,
    /// Blow fan duty cycle (0-100)
    pub fan_duty_percent: i8,
    /// Hopper auger is dispensing fuel
    pub hopper_active: bool,
    /// Damper is open
    pub damper_open: bool,
    pub faults: ProbeFaults,
}

impl TelemetrySnapshot {
    /// Chamber temperature in the requested unit
    pub fn chamber_temp(&self, unit: TemperatureUnit) -> f64 {
        unit.from_celsius(self.chamber_temp_c as f64)
    }

    /// Left cook probe temperature in the requested unit
    pub fn cook_temp_left(&self, unit: TemperatureUnit) -> f64 {
        unit.from_celsius(self.cook_temp_left_c as f64)
    }

    /// Right cook probe temperature in the requested unit
    pub fn cook_temp_right(&self, unit: TemperatureUnit) -> f64 {
        unit.from_celsius(self.cook_temp_right_c as f64)
    }

    /// True when any healthy probe reads above the controller's shutdown limit
    pub fn exceeds_safety_limit(&self) -> bool {
        [
            (self.chamber_temp_c, self.faults.chamber),
            (self.cook_temp_left_c, self.faults.cook_left),
            (self.cook_temp_right_c, self.faults.cook_right),
        ]
        .iter()
        .any(|&(temp, fault)| !fault && temp > SAFETY_LIMIT_C)
    }
}

/// A snapshot stamped with its arrival time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub received_at: DateTime<Utc>,
    pub snapshot: TelemetrySnapshot,
}

impl TelemetryReading {
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self {
            received_at: Utc::now(),
            snapshot,
        }
    }
}
