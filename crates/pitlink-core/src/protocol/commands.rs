//! Protocol commands
//!
//! Defines the commands the smoker controller accepts over the serial link.

use serde::{Deserialize, Serialize};

/// Controller operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// PID loop drives fan, damper and hopper
    Auto,
    /// User drives actuators directly
    Manual,
}

impl Mode {
    /// Payload byte for the mode message
    pub fn payload(&self) -> u8 {
        match self {
            Mode::Auto => 0,
            Mode::Manual => 1,
        }
    }
}

/// Wire opcodes (first byte of every outbound message)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Mode = 0,
    ChamberTarget = 1,
    CookTarget = 2,
    /// Second meat probe target. Accepted by the controller, never sent by the client.
    CookTargetRight = 3,
    FanDuty = 4,
    DispenseFuel = 5,
    Damper = 6,
}

impl Opcode {
    /// Map a raw byte back to an opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Opcode::Mode),
            1 => Some(Opcode::ChamberTarget),
            2 => Some(Opcode::CookTarget),
            3 => Some(Opcode::CookTargetRight),
            4 => Some(Opcode::FanDuty),
            5 => Some(Opcode::DispenseFuel),
            6 => Some(Opcode::Damper),
            _ => None,
        }
    }

    /// Total message length including the opcode byte
    pub fn message_len(&self) -> usize {
        if self.carries_temperature() {
            3
        } else {
            2
        }
    }

    /// Whether the payload is a 16-bit temperature
    pub fn carries_temperature(&self) -> bool {
        matches!(
            self,
            Opcode::ChamberTarget | Opcode::CookTarget | Opcode::CookTargetRight
        )
    }
}

/// Commands sent to the smoker controller
///
/// Target temperatures are whole degrees in the caller's unit; they are
/// converted to Celsius when the command is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Switch between autonomous and manual control
    SetMode(Mode),

    /// Set the chamber (pit) setpoint
    SetChamberTarget(i16),

    /// Set the meat probe setpoint
    SetCookTarget(i16),

    /// Run the hopper auger for one fuel charge
    DispenseFuel,

    /// Open or close the damper
    SetDamper(bool),

    /// Set the blow fan duty cycle in percent
    SetFanDuty(u8),
}

impl Command {
    /// Opcode this command is sent with
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SetMode(_) => Opcode::Mode,
            Command::SetChamberTarget(_) => Opcode::ChamberTarget,
            Command::SetCookTarget(_) => Opcode::CookTarget,
            Command::DispenseFuel => Opcode::DispenseFuel,
            Command::SetDamper(_) => Opcode::Damper,
            Command::SetFanDuty(_) => Opcode::FanDuty,
        }
    }

    /// Short human-readable name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetMode(_) => "mode",
            Command::SetChamberTarget(_) => "chamber target",
            Command::SetCookTarget(_) => "cook target",
            Command::DispenseFuel => "dispense fuel",
            Command::SetDamper(_) => "damper",
            Command::SetFanDuty(_) => "fan duty",
        }
    }
}
