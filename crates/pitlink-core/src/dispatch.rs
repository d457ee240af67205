//! Command dispatch
//!
//! Validates user commands against the controller's accepted ranges, encodes
//! them and writes them through the shared connection. Nothing is written
//! when validation fails.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::protocol::{encode_command, Command, ConnectionManager, TransportError};
use crate::telemetry::AlertTargets;
use crate::unit_conversion::TemperatureUnit;

/// Accepted setpoint range in Fahrenheit
pub const TARGET_RANGE_F: RangeInclusive<i32> = 100..=600;

/// Accepted setpoint range in Celsius
pub const TARGET_RANGE_C: RangeInclusive<i32> = 37..=315;

/// Accepted fan duty range in percent
pub const FAN_DUTY_RANGE: RangeInclusive<i32> = 0..=100;

/// Which end of a range a value fell outside of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Min,
    Max,
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Min => write!(f, "minimum"),
            RangeBound::Max => write!(f, "maximum"),
        }
    }
}

/// Dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{setting} {value}{unit} is outside the {bound} of {limit}{unit}")]
    OutOfRange {
        setting: &'static str,
        value: i32,
        bound: RangeBound,
        limit: i32,
        unit: &'static str,
    },

    #[error("Smoker is not connected")]
    TransportUnavailable,

    #[error("Failed to send command: {0}")]
    SendFailed(String),
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => DispatchError::TransportUnavailable,
            TransportError::WriteFailed(msg) => DispatchError::SendFailed(msg),
            other => DispatchError::SendFailed(other.to_string()),
        }
    }
}

/// Accepted setpoint range for a unit
pub fn target_range(unit: TemperatureUnit) -> RangeInclusive<i32> {
    match unit {
        TemperatureUnit::Fahrenheit => TARGET_RANGE_F,
        TemperatureUnit::Celsius => TARGET_RANGE_C,
    }
}

/// Check `value` against an inclusive range
pub fn check_range(
    setting: &'static str,
    value: i32,
    range: &RangeInclusive<i32>,
    unit: &'static str,
) -> Result<(), DispatchError> {
    let (bound, limit) = if value < *range.start() {
        (RangeBound::Min, *range.start())
    } else if value > *range.end() {
        (RangeBound::Max, *range.end())
    } else {
        return Ok(());
    };
    Err(DispatchError::OutOfRange {
        setting,
        value,
        bound,
        limit,
        unit,
    })
}

/// Validate a command as the user entered it
pub fn validate(cmd: &Command, unit: TemperatureUnit) -> Result<(), DispatchError> {
    match *cmd {
        Command::SetChamberTarget(value) | Command::SetCookTarget(value) => {
            check_range(cmd.name(), value as i32, &target_range(unit), unit.symbol())
        }
        Command::SetFanDuty(percent) => check_range(cmd.name(), percent as i32, &FAN_DUTY_RANGE, "%"),
        Command::SetMode(_) | Command::DispenseFuel | Command::SetDamper(_) => Ok(()),
    }
}

/// Sends validated commands to the controller
#[derive(Clone)]
pub struct CommandDispatcher {
    connection: Arc<ConnectionManager>,
    targets: Arc<watch::Sender<AlertTargets>>,
}

impl CommandDispatcher {
    pub fn new(connection: Arc<ConnectionManager>, targets: Arc<watch::Sender<AlertTargets>>) -> Self {
        Self {
            connection,
            targets,
        }
    }

    /// Validate, encode and send one command
    ///
    /// Blocks for as long as the transport write takes. A successfully sent
    /// setpoint becomes the alert target, in Celsius.
    pub fn dispatch(&self, cmd: Command, unit: TemperatureUnit) -> Result<(), DispatchError> {
        validate(&cmd, unit)?;

        let bytes = encode_command(&cmd, unit);
        self.connection.send(&bytes)?;
        info!("sent {} command", cmd.name());

        match cmd {
            Command::SetChamberTarget(value) => {
                let celsius = unit.setpoint_to_celsius(value as i32) as f32;
                self.targets.send_modify(|t| t.chamber_c = Some(celsius));
                debug!(celsius, "chamber alert target updated");
            }
            Command::SetCookTarget(value) => {
                let celsius = unit.setpoint_to_celsius(value as i32) as f32;
                self.targets.send_modify(|t| t.cook_c = Some(celsius));
                debug!(celsius, "cook alert target updated");
            }
            _ => {}
        }
        Ok(())
    }

    /// Current alert targets
    pub fn targets(&self) -> AlertTargets {
        *self.targets.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_target_bounds() {
        assert!(validate(&Command::SetChamberTarget(100), TemperatureUnit::Fahrenheit).is_ok());
        assert!(validate(&Command::SetChamberTarget(600), TemperatureUnit::Fahrenheit).is_ok());
        assert!(validate(&Command::SetCookTarget(37), TemperatureUnit::Celsius).is_ok());
        assert!(validate(&Command::SetCookTarget(315), TemperatureUnit::Celsius).is_ok());

        assert_eq!(
            validate(&Command::SetChamberTarget(650), TemperatureUnit::Fahrenheit),
            Err(DispatchError::OutOfRange {
                setting: "chamber target",
                value: 650,
                bound: RangeBound::Max,
                limit: 600,
                unit: "°F",
            })
        );
        assert_eq!(
            validate(&Command::SetCookTarget(20), TemperatureUnit::Celsius),
            Err(DispatchError::OutOfRange {
                setting: "cook target",
                value: 20,
                bound: RangeBound::Min,
                limit: 37,
                unit: "°C",
            })
        );
    }

    #[test]
    fn test_fan_duty_bounds() {
        assert!(validate(&Command::SetFanDuty(100), TemperatureUnit::Celsius).is_ok());
        let err = validate(&Command::SetFanDuty(101), TemperatureUnit::Celsius).unwrap_err();
        assert_eq!(err.to_string(), "fan duty 101% is outside the maximum of 100%");
    }

    #[test]
    fn test_transport_error_mapping() {
        assert_eq!(
            DispatchError::from(TransportError::NotConnected),
            DispatchError::TransportUnavailable
        );
        assert_eq!(
            DispatchError::from(TransportError::WriteFailed("broken pipe".into())),
            DispatchError::SendFailed("broken pipe".into())
        );
    }
}
