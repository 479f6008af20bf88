//! Decoders for vehicle identity and supply voltage

use super::response::{parse_reply, ServiceReply};
use super::service_id;

/// Mode 09 info type for the VIN
pub const PID_VIN: u8 = 0x02;

/// Mode 01 PID for control module voltage
pub const PID_MODULE_VOLTAGE: u8 = 0x42;

const VIN_LEN: usize = 17;

/// Extract the VIN from a Mode 09 PID 02 response
///
/// Handles single-message CAN replies (`49 02 01 <17 chars>`) as well as
/// legacy replies split over numbered lines. Padding bytes are dropped and
/// the trailing 17 characters are kept.
pub fn decode_vin(text: &str) -> Option<String> {
    let ServiceReply::Positive(messages) = parse_reply(text, service_id::OBD_VEHICLE_INFO) else {
        return None;
    };

    let mut chars = String::new();
    for message in &messages {
        if let [PID_VIN, _sequence, data @ ..] = message.data.as_slice() {
            chars.extend(
                data.iter()
                    .filter(|b| b.is_ascii_alphanumeric())
                    .map(|b| (*b as char).to_ascii_uppercase()),
            );
        }
    }

    if chars.len() < VIN_LEN {
        return None;
    }
    let vin = chars.split_off(chars.len() - VIN_LEN);
    // I, O and Q never appear in a VIN
    if vin.contains(['I', 'O', 'Q']) {
        return None;
    }
    Some(vin)
}

/// Control module voltage from a Mode 01 PID 42 response, in volts
pub fn decode_module_voltage(text: &str) -> Option<f32> {
    let ServiceReply::Positive(messages) = parse_reply(text, service_id::OBD_CURRENT_DATA) else {
        return None;
    };
    messages.iter().find_map(|m| match m.data.as_slice() {
        [PID_MODULE_VOLTAGE, a, b, ..] => {
            Some((u16::from(*a) * 256 + u16::from(*b)) as f32 / 1000.0)
        }
        _ => None,
    })
}

/// Battery voltage from the adapter's `AT RV` reply (e.g. `12.6V`)
pub fn decode_adapter_voltage(text: &str) -> Option<f32> {
    text.split(['\r', '\n', '>'])
        .map(str::trim)
        .filter_map(|line| line.strip_suffix(['V', 'v']))
        .find_map(|value| value.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vin_single_can_message() {
        let text = "7E8 10 14 49 02 01 31 44 34\r7E8 21 47 50 30 30 52 35 35\r7E8 22 42 31 32 33 34 35 36\r>";
        assert_eq!(decode_vin(text).as_deref(), Some("1D4GP00R55B123456"));
    }

    #[test]
    fn test_vin_indexed_frames_without_headers() {
        let text = "014\r0: 49 02 01 57 56 57\r1: 5A 5A 5A 31 4B 5A 36\r2: 57 30 30 30 30 30 31\r>";
        assert_eq!(decode_vin(text).as_deref(), Some("WVWZZZ1KZ6W000001"));
    }

    #[test]
    fn test_vin_legacy_numbered_lines() {
        let text = "49 02 01 00 00 00 57\r\
                    49 02 02 42 41 33 44\r\
                    49 02 03 35 31 30 30\r\
                    49 02 04 46 30 30 30\r\
                    49 02 05 30 30 30 31\r>";
        assert_eq!(decode_vin(text).as_deref(), Some("WBA3D5100F0000001"));
    }

    #[test]
    fn test_vin_rejects_short_or_missing() {
        assert_eq!(decode_vin("NO DATA\r>"), None);
        assert_eq!(decode_vin("49 02 01 31 32 33\r>"), None);
        assert_eq!(decode_vin("7F 09 12\r>"), None);
    }

    #[test]
    fn test_module_voltage() {
        // 0x3070 = 12400 mV
        assert_eq!(decode_module_voltage("41 42 30 70\r>"), Some(12.4));
        assert_eq!(decode_module_voltage("7E8 04 41 42 30 70\r>"), Some(12.4));
        assert_eq!(decode_module_voltage("NO DATA\r>"), None);
    }

    #[test]
    fn test_adapter_voltage() {
        assert_eq!(decode_adapter_voltage("12.6V\r\r>"), Some(12.6));
        assert_eq!(decode_adapter_voltage("11.9v"), Some(11.9));
        assert_eq!(decode_adapter_voltage("?\r>"), None);
        assert_eq!(decode_adapter_voltage(""), None);
    }
}
