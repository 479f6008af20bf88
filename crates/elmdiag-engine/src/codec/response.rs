//! Tokenizer for raw adapter text
//!
//! Turns what the adapter prints (prompt, CR/LF, optional CAN headers,
//! ISO-TP PCI bytes, multi-frame index prefixes) into typed values, so the
//! orchestration code never inspects response substrings directly.

use std::fmt;

use elmdiag_core::CanHeader;

use super::nrc::{NegativeResponseCode, NrcAction};

/// Positive responses echo the request SID plus this offset
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// Negative response service identifier
pub const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Header bytes the adapter shows for non-CAN protocols with headers on
const LEGACY_HEADER_LEN: usize = 3;

/// Adapter status words that carry no vehicle data
const ADAPTER_ERRORS: &[&str] = &[
    "?",
    "ERROR",
    "CANERROR",
    "BUSERROR",
    "BUSBUSY",
    "BUFFERFULL",
    "DATAERROR",
    "FBERROR",
    "<RXERROR",
    "RXERROR",
    "STOPPED",
    "UNABLETOCONNECT",
    "LVRESET",
    "ACTALERT",
];

/// One reassembled message from one responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Responder's CAN ID when headers are shown
    pub header: Option<CanHeader>,
    /// Message bytes, starting at the service identifier
    pub data: Vec<u8>,
}

/// Adapter text classified without regard to the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterResponse {
    /// Empty, prompt-only or without any hex content
    Invalid,
    /// Adapter reported `NO DATA`
    NoData,
    /// `OK` acknowledgement of an AT command
    Ok,
    /// Adapter-level error word (`?`, `CAN ERROR`, `STOPPED`, ...)
    Error(String),
    /// Hex messages, one per responder (multi-frame already joined)
    Messages(Vec<Message>),
}

/// A UDS/OBD negative response (`7F <sid> <nrc>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativeResponse {
    /// Echoed request service
    pub service: u8,
    pub nrc: NegativeResponseCode,
}

impl NegativeResponse {
    pub fn action(&self) -> NrcAction {
        self.nrc.action()
    }
}

impl fmt::Display for NegativeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service 0x{:02X} rejected: {} (NRC 0x{:02X})",
            self.service,
            self.nrc.description(),
            u8::from(self.nrc)
        )
    }
}

/// Adapter text interpreted as the answer to one request service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceReply {
    /// Positive messages; each `data` starts after the response SID
    Positive(Vec<Message>),
    Negative(NegativeResponse),
    NoData,
    /// Plain `OK`
    Ack,
    /// Nothing usable (empty, adapter error, or unrelated bytes)
    Invalid,
}

impl ServiceReply {
    /// Positive reply, or "no data" meaning nothing to report
    pub fn is_success_or_no_data(&self) -> bool {
        matches!(self, ServiceReply::Positive(_) | ServiceReply::NoData)
    }
}

/// Uppercase, whitespace-free form used for sentinel matching
fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn is_hex_pair(token: &str) -> bool {
    token.len() == 2 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// A single hex line before reassembly
struct Frame {
    header: Option<CanHeader>,
    /// Line carried a `n:` multi-frame index (headers off)
    indexed: bool,
    bytes: Vec<u8>,
}

enum Line {
    Frame(Frame),
    /// Bare three-digit total length preceding indexed frames
    Length(usize),
    Other,
}

fn parse_pairs(tokens: &[&str]) -> Option<Vec<u8>> {
    if tokens.is_empty() || !tokens.iter().all(|t| is_hex_pair(t)) {
        return None;
    }
    hex::decode(tokens.concat()).ok()
}

fn parse_line(line: &str) -> Line {
    let upper = line.trim().to_ascii_uppercase();
    let mut tokens: Vec<&str> = upper.split_whitespace().collect();
    if tokens.is_empty() {
        return Line::Other;
    }

    // "0: 49 02 01 ..." (index prefix, headers off)
    let mut indexed = false;
    if let Some(first) = tokens.first() {
        if let Some(index) = first.strip_suffix(':') {
            if index.chars().all(|c| c.is_ascii_hexdigit()) {
                indexed = true;
                tokens.remove(0);
            }
        }
    }

    if tokens.len() == 1 && !indexed {
        let token = tokens[0];
        if !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Line::Other;
        }
        if token.len() == 3 {
            return usize::from_str_radix(token, 16)
                .map(Line::Length)
                .unwrap_or(Line::Other);
        }
        // Spaces off: an odd length means a leading 11-bit header
        let (header, body) = if token.len() % 2 == 1 {
            (CanHeader::parse(&token[..3]).ok(), &token[3..])
        } else {
            (None, token)
        };
        return match hex::decode(body) {
            Ok(bytes) if !bytes.is_empty() => Line::Frame(Frame {
                header,
                indexed,
                bytes,
            }),
            _ => Line::Other,
        };
    }

    let header = match tokens.first() {
        Some(t) if t.len() == 3 => match CanHeader::parse(t) {
            Ok(h) => {
                tokens.remove(0);
                Some(h)
            }
            Err(_) => return Line::Other,
        },
        _ => None,
    };

    match parse_pairs(&tokens) {
        Some(bytes) => Line::Frame(Frame {
            header,
            indexed,
            bytes,
        }),
        None => Line::Other,
    }
}

/// Join ISO-TP frames shown with headers on (PCI bytes visible)
fn reassemble_isotp(header: CanHeader, frames: Vec<Vec<u8>>) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut pending: Option<(usize, Vec<u8>)> = None;

    for bytes in frames {
        let pci = bytes[0] >> 4;
        match pci {
            0x0 => {
                let len = (bytes[0] & 0x0F) as usize;
                let data = if len > 0 && len < bytes.len() {
                    bytes[1..=len].to_vec()
                } else {
                    bytes
                };
                messages.push(Message {
                    header: Some(header),
                    data,
                });
            }
            0x1 if bytes.len() >= 2 => {
                if let Some((_, data)) = pending.take() {
                    messages.push(Message {
                        header: Some(header),
                        data,
                    });
                }
                let total = (((bytes[0] & 0x0F) as usize) << 8) | bytes[1] as usize;
                pending = Some((total, bytes[2..].to_vec()));
            }
            0x2 if pending.is_some() => {
                if let Some((total, data)) = pending.as_mut() {
                    data.extend_from_slice(&bytes[1..]);
                    if data.len() >= *total {
                        data.truncate(*total);
                        messages.push(Message {
                            header: Some(header),
                            data: std::mem::take(data),
                        });
                        pending = None;
                    }
                }
            }
            _ => messages.push(Message {
                header: Some(header),
                data: bytes,
            }),
        }
    }

    if let Some((_, data)) = pending {
        messages.push(Message {
            header: Some(header),
            data,
        });
    }
    messages
}

impl AdapterResponse {
    /// Classify raw adapter text
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text
            .split(['\r', '\n', '>'])
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter(|l| !compact(l).starts_with("SEARCHING"))
            .collect();

        if lines.is_empty() {
            return AdapterResponse::Invalid;
        }

        if lines.iter().any(|l| compact(l).contains("NODATA")) {
            return AdapterResponse::NoData;
        }

        let mut headed: Vec<(CanHeader, Vec<Vec<u8>>)> = Vec::new();
        let mut indexed: Vec<u8> = Vec::new();
        let mut expected_len: Option<usize> = None;
        let mut plain: Vec<Message> = Vec::new();
        let mut error: Option<String> = None;
        let mut ok = false;

        for line in &lines {
            let word = compact(line);
            if ADAPTER_ERRORS.contains(&word.as_str()) {
                error.get_or_insert_with(|| line.to_string());
                continue;
            }
            if word == "OK" {
                ok = true;
                continue;
            }

            match parse_line(line) {
                Line::Frame(frame) => match frame.header {
                    Some(header) => match headed.iter_mut().find(|(h, _)| *h == header) {
                        Some((_, frames)) => frames.push(frame.bytes),
                        None => headed.push((header, vec![frame.bytes])),
                    },
                    None if frame.indexed => indexed.extend(frame.bytes),
                    None => plain.push(Message {
                        header: None,
                        data: frame.bytes,
                    }),
                },
                Line::Length(len) => expected_len = Some(len),
                Line::Other => {}
            }
        }

        let mut messages: Vec<Message> = headed
            .into_iter()
            .flat_map(|(header, frames)| reassemble_isotp(header, frames))
            .collect();
        if !indexed.is_empty() {
            if let Some(len) = expected_len {
                indexed.truncate(len);
            }
            messages.push(Message {
                header: None,
                data: indexed,
            });
        }
        messages.extend(plain);
        messages.retain(|m| !m.data.is_empty());

        if !messages.is_empty() {
            AdapterResponse::Messages(messages)
        } else if let Some(error) = error {
            AdapterResponse::Error(error)
        } else if ok {
            AdapterResponse::Ok
        } else {
            AdapterResponse::Invalid
        }
    }

    /// Interpret as the reply to `service`
    pub fn for_service(self, service: u8) -> ServiceReply {
        let messages = match self {
            AdapterResponse::Messages(messages) => messages,
            AdapterResponse::NoData => return ServiceReply::NoData,
            AdapterResponse::Ok => return ServiceReply::Ack,
            AdapterResponse::Invalid | AdapterResponse::Error(_) => {
                return ServiceReply::Invalid
            }
        };

        let positive_sid = service.wrapping_add(POSITIVE_RESPONSE_OFFSET);
        let is_start = |data: &[u8]| match data {
            [sid, ..] if *sid == positive_sid => true,
            [NEGATIVE_RESPONSE, sid, _, ..] => *sid == service,
            _ => false,
        };

        let mut positives = Vec::new();
        let mut negative = None;

        for message in messages {
            let mut data = message.data;
            if !is_start(&data) {
                if data.len() > 1 && is_start(&data[1..]) && (data[0] as usize) < data.len() {
                    // Length byte ahead of the service identifier
                    data.remove(0);
                } else if message.header.is_none()
                    && data.len() > LEGACY_HEADER_LEN + 1
                    && is_start(&data[LEGACY_HEADER_LEN..])
                {
                    // J1850 / ISO 9141 / KWP frame: three header bytes
                    // (priority, target, source) and a trailing checksum
                    data.pop();
                    data.drain(..LEGACY_HEADER_LEN);
                }
            }

            match data.as_slice() {
                [sid, rest @ ..] if *sid == positive_sid => positives.push(Message {
                    header: message.header,
                    data: rest.to_vec(),
                }),
                [NEGATIVE_RESPONSE, sid, nrc, ..] if *sid == service => {
                    negative.get_or_insert(NegativeResponse {
                        service,
                        nrc: NegativeResponseCode::from(*nrc),
                    });
                }
                _ => {}
            }
        }

        if !positives.is_empty() {
            ServiceReply::Positive(positives)
        } else if let Some(negative) = negative {
            ServiceReply::Negative(negative)
        } else {
            ServiceReply::Invalid
        }
    }
}

/// Classify `text` as the reply to `service`
pub fn parse_reply(text: &str, service: u8) -> ServiceReply {
    AdapterResponse::parse(text).for_service(service)
}
