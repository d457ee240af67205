//! Frame encoding/decoding
//!
//! Outbound (client to controller) messages are 2 or 3 bytes:
//! - `[opcode, payload]` for mode, fan duty, dispense fuel and damper
//! - `[opcode, byte1, byte2]` for temperature setpoints, where the setpoint is
//!   whole degrees Celsius as an unsigned 16-bit value and
//!   byte 1 = bits 8-15, byte 2 = bits 0-7, independent of host endianness
//!
//! Inbound (controller to client) telemetry is a fixed 18-byte frame:
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | chamber temperature, f32               |
//! | 4      | 1    | chamber thermocouple fault             |
//! | 5      | 4    | left cook probe temperature, f32       |
//! | 9      | 1    | left cook probe fault                  |
//! | 10     | 4    | right cook probe temperature, f32      |
//! | 14     | 1    | right cook probe fault                 |
//! | 15     | 1    | fan duty percent, i8                   |
//! | 16     | 1    | hopper dispensing, 0/1                 |
//! | 17     | 1    | damper open, 0/1                       |
//!
//! Each 4-byte float region is reversed in place and then read big-endian,
//! which amounts to the controller's native little-endian layout.
//!
//! Every function here is pure: no logging, no shared state.

use byteorder::{BigEndian, ByteOrder};

use super::{Command, DecodeError, Mode, Opcode, TELEMETRY_FRAME_LEN};
use crate::telemetry::{ProbeFaults, TelemetrySnapshot};
use crate::unit_conversion::TemperatureUnit;

const CHAMBER_OFFSET: usize = 0;
const COOK_LEFT_OFFSET: usize = 5;
const COOK_RIGHT_OFFSET: usize = 10;
const FLOAT_OFFSETS: [usize; 3] = [CHAMBER_OFFSET, COOK_LEFT_OFFSET, COOK_RIGHT_OFFSET];
const FAULT_OFFSET: usize = 4;
const FAN_DUTY_OFFSET: usize = 15;
const HOPPER_OFFSET: usize = 16;
const DAMPER_OFFSET: usize = 17;

/// Encode a command for the controller
///
/// Setpoints in `SetChamberTarget`/`SetCookTarget` are interpreted in `unit`.
/// Range checks belong to the caller; this only formats. A setpoint that
/// converts below zero is sent as 0.
pub fn encode_command(cmd: &Command, unit: TemperatureUnit) -> Vec<u8> {
    let opcode = cmd.opcode() as u8;
    match *cmd {
        Command::SetMode(mode) => vec![opcode, mode.payload()],
        Command::SetChamberTarget(value) | Command::SetCookTarget(value) => {
            let celsius = unit.setpoint_to_celsius(value as i32);
            let [high, low] = temperature_bytes(celsius);
            vec![opcode, high, low]
        }
        Command::DispenseFuel => vec![opcode, 1],
        Command::SetDamper(open) => vec![opcode, open as u8],
        Command::SetFanDuty(percent) => vec![opcode, percent],
    }
}

/// Split a whole-degree Celsius value into `[bits 8-15, bits 0-7]`
fn temperature_bytes(celsius: i32) -> [u8; 2] {
    let magnitude = celsius.clamp(0, u16::MAX as i32) as u16;
    let mut bytes = [0u8; 2];
    BigEndian::write_u16(&mut bytes, magnitude);
    bytes
}

/// Decode an outbound message the way the controller does
///
/// Returns the command (setpoints in Celsius) and the number of bytes consumed.
pub fn decode_command(data: &[u8]) -> Result<(Command, usize), DecodeError> {
    let Some(&first) = data.first() else {
        return Err(DecodeError::ShortFrame {
            expected: 2,
            actual: 0,
        });
    };
    let opcode = Opcode::from_byte(first).ok_or(DecodeError::UnknownOpcode(first))?;
    let len = opcode.message_len();
    if data.len() < len {
        return Err(DecodeError::ShortFrame {
            expected: len,
            actual: data.len(),
        });
    }

    let command = match opcode {
        Opcode::Mode => Command::SetMode(if data[1] == 0 {
            Mode::Auto
        } else {
            Mode::Manual
        }),
        Opcode::ChamberTarget => Command::SetChamberTarget(read_setpoint(&data[1..3])),
        Opcode::CookTarget => Command::SetCookTarget(read_setpoint(&data[1..3])),
        Opcode::CookTargetRight => return Err(DecodeError::UnknownOpcode(first)),
        Opcode::FanDuty => Command::SetFanDuty(data[1]),
        Opcode::DispenseFuel => Command::DispenseFuel,
        Opcode::Damper => Command::SetDamper(data[1] != 0),
    };
    Ok((command, len))
}

fn read_setpoint(bytes: &[u8]) -> i16 {
    BigEndian::read_u16(bytes).min(i16::MAX as u16) as i16
}

/// Decode an 18-byte telemetry frame
///
/// Only the first 18 bytes are looked at; anything beyond belongs to the next frame.
pub fn decode_telemetry(frame: &[u8]) -> Result<TelemetrySnapshot, DecodeError> {
    if frame.len() < TELEMETRY_FRAME_LEN {
        return Err(DecodeError::ShortFrame {
            expected: TELEMETRY_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let mut buf = [0u8; TELEMETRY_FRAME_LEN];
    buf.copy_from_slice(&frame[..TELEMETRY_FRAME_LEN]);
    for offset in FLOAT_OFFSETS {
        buf[offset..offset + 4].reverse();
    }

    Ok(TelemetrySnapshot {
        chamber_temp_c: read_temperature(&buf, CHAMBER_OFFSET, "chamber temperature")?,
        cook_temp_left_c: read_temperature(&buf, COOK_LEFT_OFFSET, "left cook temperature")?,
        cook_temp_right_c: read_temperature(&buf, COOK_RIGHT_OFFSET, "right cook temperature")?,
        fan_duty_percent: buf[FAN_DUTY_OFFSET] as i8,
        hopper_active: buf[HOPPER_OFFSET] != 0,
        damper_open: buf[DAMPER_OFFSET] != 0,
        faults: ProbeFaults {
            chamber: buf[CHAMBER_OFFSET + FAULT_OFFSET] != 0,
            cook_left: buf[COOK_LEFT_OFFSET + FAULT_OFFSET] != 0,
            cook_right: buf[COOK_RIGHT_OFFSET + FAULT_OFFSET] != 0,
        },
    })
}

fn read_temperature(buf: &[u8], offset: usize, field: &'static str) -> Result<f32, DecodeError> {
    let value = BigEndian::read_f32(&buf[offset..offset + 4]);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::InvalidFrame { field })
    }
}

/// Pack a snapshot into the 18-byte frame the controller sends
///
/// Inverse of [`decode_telemetry`]; used by the simulated smoker and tests.
pub fn encode_telemetry(snapshot: &TelemetrySnapshot) -> [u8; TELEMETRY_FRAME_LEN] {
    let mut frame = [0u8; TELEMETRY_FRAME_LEN];
    let probes = [
        (CHAMBER_OFFSET, snapshot.chamber_temp_c, snapshot.faults.chamber),
        (COOK_LEFT_OFFSET, snapshot.cook_temp_left_c, snapshot.faults.cook_left),
        (COOK_RIGHT_OFFSET, snapshot.cook_temp_right_c, snapshot.faults.cook_right),
    ];
    for (offset, value, fault) in probes {
        BigEndian::write_f32(&mut frame[offset..offset + 4], value);
        frame[offset..offset + 4].reverse();
        frame[offset + FAULT_OFFSET] = fault as u8;
    }
    frame[FAN_DUTY_OFFSET] = snapshot.fan_duty_percent as u8;
    frame[HOPPER_OFFSET] = snapshot.hopper_active as u8;
    frame[DAMPER_OFFSET] = snapshot.damper_open as u8;
    frame
}
