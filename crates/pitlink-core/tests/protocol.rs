use pitlink_core::protocol::{
    decode_command, decode_telemetry, encode_command, encode_telemetry, Command, DecodeError,
    TELEMETRY_FRAME_LEN,
};
use pitlink_core::telemetry::{ProbeFaults, TelemetrySnapshot};
use pitlink_core::unit_conversion::{fahrenheit_to_celsius, TemperatureUnit};
use pretty_assertions::assert_eq;

/// Frame as the controller lays it out: little-endian floats with a fault
/// byte after each, then fan duty, hopper and damper.
fn device_frame(temps: [f32; 3], faults: [u8; 3], status: [u8; 3]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(TELEMETRY_FRAME_LEN);
    for (temp, fault) in temps.iter().zip(faults) {
        frame.extend_from_slice(&temp.to_le_bytes());
        frame.push(fault);
    }
    frame.extend_from_slice(&status);
    frame
}

#[test]
fn test_fahrenheit_targets_survive_encoding() {
    for f in 100..=600i16 {
        let bytes = encode_command(&Command::SetChamberTarget(f), TemperatureUnit::Fahrenheit);
        assert_eq!(bytes.len(), 3);
        let celsius = u16::from_be_bytes([bytes[1], bytes[2]]) as f64;
        let exact = fahrenheit_to_celsius(f as f64);
        assert!((celsius - exact).abs() <= 1.0, "{}°F sent as {}°C", f, celsius);

        let (decoded, used) = decode_command(&bytes).unwrap();
        assert_eq!(used, 3);
        assert_eq!(decoded, Command::SetChamberTarget(celsius as i16));
    }
}

#[test]
fn test_known_frame_decodes_exactly() {
    let frame = device_frame([107.25, 63.5, -1.75], [0, 0, 1], [42, 1, 0]);
    let snapshot = decode_telemetry(&frame).unwrap();
    assert_eq!(
        snapshot,
        TelemetrySnapshot {
            chamber_temp_c: 107.25,
            cook_temp_left_c: 63.5,
            cook_temp_right_c: -1.75,
            fan_duty_percent: 42,
            hopper_active: true,
            damper_open: false,
            faults: ProbeFaults {
                chamber: false,
                cook_left: false,
                cook_right: true,
            },
        }
    );
    assert_eq!(encode_telemetry(&snapshot).to_vec(), frame);
}

#[test]
fn test_decode_is_pure() {
    let frame = device_frame([98.6, 71.1, 70.9], [0, 0, 0], [100, 0, 1]);
    let a = decode_telemetry(&frame).unwrap();
    let b = decode_telemetry(&frame).unwrap();
    assert_eq!(a.chamber_temp_c.to_bits(), b.chamber_temp_c.to_bits());
    assert_eq!(a.cook_temp_left_c.to_bits(), b.cook_temp_left_c.to_bits());
    assert_eq!(a.cook_temp_right_c.to_bits(), b.cook_temp_right_c.to_bits());
    assert_eq!(a, b);
}

#[test]
fn test_any_nonzero_status_byte_is_true() {
    let frame = device_frame([20.0, 20.0, 20.0], [0, 0, 0], [0xFF, 0x80, 0x02]);
    let snapshot = decode_telemetry(&frame).unwrap();
    assert_eq!(snapshot.fan_duty_percent, -1);
    assert!(snapshot.hopper_active);
    assert!(snapshot.damper_open);
}

#[test]
fn test_short_frames_rejected() {
    let frame = device_frame([20.0, 20.0, 20.0], [0, 0, 0], [0, 0, 0]);
    for len in 0..TELEMETRY_FRAME_LEN {
        assert_eq!(
            decode_telemetry(&frame[..len]),
            Err(DecodeError::ShortFrame {
                expected: TELEMETRY_FRAME_LEN,
                actual: len,
            })
        );
    }
}

#[test]
fn test_non_finite_rejected() {
    let frame = device_frame([20.0, f32::NAN, 20.0], [0, 0, 0], [0, 0, 0]);
    assert!(matches!(
        decode_telemetry(&frame),
        Err(DecodeError::InvalidFrame { .. })
    ));

    let frame = device_frame([f32::INFINITY, 20.0, 20.0], [0, 0, 0], [0, 0, 0]);
    assert!(matches!(
        decode_telemetry(&frame),
        Err(DecodeError::InvalidFrame { .. })
    ));
}
