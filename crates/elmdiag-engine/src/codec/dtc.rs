//! Trouble-code decoding for OBD-II Mode 03 and UDS ReadDTCInformation

use elmdiag_core::{DtcCode, DtcSource, ParsedDtc};

use super::response::{parse_reply, NegativeResponse, ServiceReply};
use super::{service_id, sub_function};

/// Code family for the first nibble of a DTC's high byte
const FAMILY: [&str; 16] = [
    "P0", "P1", "P2", "P3", "C0", "C1", "C2", "C3", "B0", "B1", "B2", "B3", "U0", "U1", "U2",
    "U3",
];

/// Width of one 0x19 0x02 record: three DTC bytes plus status
const UDS_RECORD_LEN: usize = 4;

/// Outcome of one trouble-code read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtcRead {
    /// At least one code
    Codes(Vec<ParsedDtc>),
    /// Module answered and has nothing stored
    NoErrors,
    /// Adapter reported `NO DATA` (module absent or silent)
    NoData,
    Negative(NegativeResponse),
    /// Empty, malformed, or an adapter error
    Unusable,
}

impl DtcRead {
    /// Decoded codes, empty for every non-`Codes` outcome
    pub fn codes(&self) -> &[ParsedDtc] {
        match self {
            DtcRead::Codes(codes) => codes,
            _ => &[],
        }
    }

    pub fn into_codes(self) -> Vec<ParsedDtc> {
        match self {
            DtcRead::Codes(codes) => codes,
            _ => Vec::new(),
        }
    }

    /// The module gave a readable answer (with or without codes)
    pub fn is_answer(&self) -> bool {
        matches!(self, DtcRead::Codes(_) | DtcRead::NoErrors)
    }
}

/// Decode the two leading DTC bytes into a code such as `C0420`
pub fn decode_dtc_bytes(high: u8, low: u8) -> Option<DtcCode> {
    let family = FAMILY[(high >> 4) as usize];
    let rest = ((u16::from(high) & 0x0F) << 8) | u16::from(low);
    DtcCode::parse(&format!("{}{:03X}", family, rest)).ok()
}

/// Inverse of [`decode_dtc_bytes`]; `None` for codes outside the family table
pub fn encode_dtc(code: &DtcCode) -> Option<[u8; 2]> {
    let prefix = &code.as_str()[..2];
    let nibble = FAMILY.iter().position(|f| *f == prefix)? as u16;
    let rest = u16::from_str_radix(&code.as_str()[2..], 16).ok()?;
    let value = (nibble << 12) | rest;
    Some(value.to_be_bytes())
}

/// Synthetic CAN-style Mode 03 response (`43 <count> <pairs>`)
///
/// Codes without a byte encoding are left out.
pub fn encode_mode03_response(codes: &[DtcCode]) -> String {
    let pairs: Vec<[u8; 2]> = codes.iter().filter_map(encode_dtc).collect();
    let mut text = format!("{:02X} {:02X}", 0x43, pairs.len());
    for [high, low] in pairs {
        text.push_str(&format!(" {:02X} {:02X}", high, low));
    }
    text
}

fn push_unique(found: &mut Vec<ParsedDtc>, dtc: ParsedDtc) {
    if !found.iter().any(|d| d.code == dtc.code) {
        found.push(dtc);
    }
}

fn classify(reply: ServiceReply, decode: impl Fn(&[u8], &mut Vec<ParsedDtc>)) -> DtcRead {
    match reply {
        ServiceReply::Positive(messages) => {
            let mut found = Vec::new();
            for message in &messages {
                decode(&message.data, &mut found);
            }
            if found.is_empty() {
                DtcRead::NoErrors
            } else {
                DtcRead::Codes(found)
            }
        }
        ServiceReply::Negative(negative) => DtcRead::Negative(negative),
        ServiceReply::NoData => DtcRead::NoData,
        ServiceReply::Ack | ServiceReply::Invalid => DtcRead::Unusable,
    }
}

/// Decode a Mode 03 (stored codes) response
///
/// CAN responses carry a count byte, which shows up as an odd payload
/// length. All-zero pairs are padding.
pub fn decode_mode03(text: &str) -> DtcRead {
    classify(parse_reply(text, service_id::OBD_STORED_DTCS), |payload, found| {
        let pairs = if payload.len() % 2 == 1 {
            &payload[1..]
        } else {
            payload
        };
        for pair in pairs.chunks_exact(2) {
            if pair == [0, 0] {
                continue;
            }
            if let Some(code) = decode_dtc_bytes(pair[0], pair[1]) {
                push_unique(found, ParsedDtc::new(code, hex::encode_upper(pair), DtcSource::Obd));
            }
        }
    })
}

/// Decode a 0x19 0x02 (report DTC by status mask) response
///
/// Trailing bytes that do not fill a whole record are dropped.
pub fn decode_uds_dtcs(text: &str) -> DtcRead {
    classify(parse_reply(text, service_id::READ_DTC_INFORMATION), |payload, found| {
        let records = match payload {
            [sub, _availability, records @ ..] if *sub == sub_function::REPORT_DTC_BY_STATUS_MASK => {
                records
            }
            _ => return,
        };
        for record in records.chunks_exact(UDS_RECORD_LEN) {
            if record[..3] == [0, 0, 0] {
                continue;
            }
            if let Some(code) = decode_dtc_bytes(record[0], record[1]) {
                let dtc = ParsedDtc::new(code, hex::encode_upper(record), DtcSource::Uds)
                    .with_status(record[3]);
                push_unique(found, dtc);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::nrc::NegativeResponseCode;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn codes(read: &DtcRead) -> Vec<&str> {
        read.codes().iter().map(|d| d.code.as_str()).collect()
    }

    #[rstest]
    #[case(0x0, "P0")]
    #[case(0x1, "P1")]
    #[case(0x2, "P2")]
    #[case(0x3, "P3")]
    #[case(0x4, "C0")]
    #[case(0x5, "C1")]
    #[case(0x6, "C2")]
    #[case(0x7, "C3")]
    #[case(0x8, "B0")]
    #[case(0x9, "B1")]
    #[case(0xA, "B2")]
    #[case(0xB, "B3")]
    #[case(0xC, "U0")]
    #[case(0xD, "U1")]
    #[case(0xE, "U2")]
    #[case(0xF, "U3")]
    fn test_family_nibble_table(#[case] nibble: u8, #[case] prefix: &str) {
        let code = decode_dtc_bytes(nibble << 4 | 0x01, 0x23).unwrap();
        assert_eq!(code.as_str(), format!("{}123", prefix));
    }

    #[test]
    fn test_decode_dtc_bytes() {
        assert_eq!(decode_dtc_bytes(0x01, 0x01).unwrap().as_str(), "P0101");
        assert_eq!(decode_dtc_bytes(0x44, 0x20).unwrap().as_str(), "C0420");
        assert_eq!(decode_dtc_bytes(0xC1, 0xAB).unwrap().as_str(), "U01AB");
    }

    #[test]
    fn test_mode03_can_with_count_byte() {
        let read = decode_mode03("7E8 06 43 02 01 01 03 00\r\r>");
        assert_eq!(codes(&read), vec!["P0101", "P0300"]);
        assert_eq!(read.codes()[0].raw, "0101");
        assert!(read.codes()[0].module.is_none());
    }

    #[test]
    fn test_mode03_legacy_protocol_with_headers() {
        let read = decode_mode03("48 6B 10 43 01 33 00 00 00 00 C4\r\r>");
        assert_eq!(codes(&read), vec!["P0133"]);
        assert_eq!(read.codes()[0].raw, "0133");
    }

    #[test]
    fn test_mode03_legacy_padded() {
        let read = decode_mode03("43 01 33 00 00 00 00\r>");
        assert_eq!(codes(&read), vec!["P0133"]);
    }

    #[test]
    fn test_mode03_sentinels() {
        assert_eq!(decode_mode03("43 00\r>"), DtcRead::NoErrors);
        assert_eq!(decode_mode03("43 00 00 00 00 00 00\r>"), DtcRead::NoErrors);
        assert_eq!(decode_mode03("NO DATA\r>"), DtcRead::NoData);
        assert_eq!(decode_mode03(""), DtcRead::Unusable);
        assert_eq!(decode_mode03(">"), DtcRead::Unusable);
        assert_eq!(decode_mode03("CAN ERROR\r>"), DtcRead::Unusable);
    }

    #[test]
    fn test_mode03_negative() {
        let DtcRead::Negative(negative) = decode_mode03("7F 03 11\r>") else {
            panic!("expected negative response");
        };
        assert_eq!(negative.nrc, NegativeResponseCode::ServiceNotSupported);
    }

    #[test]
    fn test_mode03_duplicate_codes_collapse() {
        let read = decode_mode03("7E8 04 43 01 03 00\r7E9 04 43 01 03 00\r>");
        assert_eq!(codes(&read), vec!["P0300"]);
    }

    #[test]
    fn test_uds_records_with_status() {
        let read = decode_uds_dtcs("7E8 0B 59 02 FF 01 01 00 09 44 20 00 08\r>");
        assert_eq!(codes(&read), vec!["P0101", "C0420"]);
        assert_eq!(read.codes()[0].status_byte, Some(0x09));
        assert_eq!(read.codes()[0].source, DtcSource::Uds);
        assert_eq!(read.codes()[1].raw, "44200008");
    }

    #[test]
    fn test_uds_malformed_trailing_bytes_are_dropped() {
        let read = decode_uds_dtcs("59 02 FF 01 01 00 09 44 20\r>");
        assert_eq!(codes(&read), vec!["P0101"]);
    }

    #[test]
    fn test_uds_empty_report_is_no_errors() {
        assert_eq!(decode_uds_dtcs("59 02 FF\r>"), DtcRead::NoErrors);
    }

    #[test]
    fn test_uds_negative_response() {
        let DtcRead::Negative(negative) = decode_uds_dtcs("7F 19 78\r>") else {
            panic!("expected negative response");
        };
        assert_eq!(negative.nrc, NegativeResponseCode::ResponsePending);
    }

    #[test]
    fn test_encode_then_decode_preserves_set() {
        let original: BTreeSet<DtcCode> = ["P0101", "C0420", "B1234", "U0100", "P3FFF"]
            .iter()
            .map(|c| DtcCode::parse(c).unwrap())
            .collect();
        let list: Vec<DtcCode> = original.iter().cloned().collect();

        let decoded: BTreeSet<DtcCode> = decode_mode03(&encode_mode03_response(&list))
            .into_codes()
            .into_iter()
            .map(|d| d.code)
            .collect();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decoding_is_idempotent() {
        let text = "7E8 10 0A 43 04 01 01 03 00\r7E8 21 04 20 01 71 00 00 00\r>";
        let first = decode_mode03(text);
        let second = decode_mode03(text);
        assert_eq!(first, second);
        assert_eq!(codes(&first), vec!["P0101", "P0300", "P0420", "P0171"]);
    }

    #[test]
    fn test_encode_rejects_codes_outside_table() {
        assert!(encode_dtc(&DtcCode::parse("P4000").unwrap()).is_none());
        assert_eq!(encode_dtc(&DtcCode::parse("U0100").unwrap()), Some([0xC1, 0x00]));
    }
}
