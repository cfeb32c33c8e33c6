//! APDU (Application Protocol Data Unit) handling
//!
//! Command header decoding for ISO 7816-4 APDUs as they reach the card
//! session, plus the response and status word types handed back.
//!
//! # Example
//! ```ignore
//! use gpcard_open::apdu::{parse_apdu, Response};
//!
//! // SET STATUS: lock the application D2 76 00 01 18 00
//! let raw = &[0x80, 0xF0, 0x40, 0x80, 0x06, 0xD2, 0x76, 0x00, 0x01, 0x18, 0x00];
//! let apdu = parse_apdu(raw).unwrap();
//! println!("INS: 0x{:02X}", apdu.ins);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,
}

/// A parsed APDU command
///
/// - `cla`: Class byte (proprietary bit, secure messaging, logical channel)
/// - `ins`: Instruction byte
/// - `p1`, `p2`: Parameter bytes
/// - `data`: Command data copied out of the raw buffer (may be empty)
/// - `le`: Expected response length, `None` if absent
/// - `extended`: whether Lc/Le used the three/two byte extended encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: Option<u32>,
    pub extended: bool,
}

impl APDU {
    /// Create a header-only APDU (case 1)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
            extended: false,
        }
    }

    /// Create an APDU carrying command data (case 3)
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::new(cla, ins, p1, p2)
        }
    }

    /// Lc, the number of command data bytes
    pub fn lc(&self) -> usize {
        self.data.len()
    }

    /// ISO 7816-4 command case (1 to 4)
    pub fn case(&self) -> u8 {
        match (self.data.is_empty(), self.le.is_some()) {
            (true, false) => 1,
            (true, true) => 2,
            (false, false) => 3,
            (false, true) => 4,
        }
    }

    /// Check if the class byte marks a proprietary (GlobalPlatform) command
    pub fn is_proprietary(&self) -> bool {
        (self.cla & 0x80) != 0
    }

    /// Check if the class byte announces secure messaging
    pub fn has_secure_messaging(&self) -> bool {
        (self.cla & 0x0C) != 0
    }

    /// Logical channel number encoded in the first interindustry class range
    pub fn channel(&self) -> u8 {
        self.cla & 0x03
    }

    /// Get P1-P2 combined as a u16
    pub fn p1p2(&self) -> u16 {
        ((self.p1 as u16) << 8) | (self.p2 as u16)
    }
}

/// Parse raw bytes into an APDU
///
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 [Lc1 Lc2 Data] [Le1 Le2]
///
/// A zero byte right after the header announces extended lengths whenever
/// at least two more bytes follow it; a lone trailing zero is a short Le of
/// 256.
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let (cla, ins, p1, p2) = (data[0], data[1], data[2], data[3]);
    let body = &data[4..];

    match body {
        // Case 1
        [] => Ok(APDU::new(cla, ins, p1, p2)),
        // Case 2S
        [le] => Ok(APDU {
            le: Some(short_length(*le)),
            ..APDU::new(cla, ins, p1, p2)
        }),
        [0x00, ext @ ..] if ext.len() >= 2 => parse_extended_apdu(cla, ins, p1, p2, ext),
        // Short Lc may not be zero
        [0x00, ..] => Err(APDUError::InvalidLength),
        [lc, rest @ ..] => parse_short_apdu(cla, ins, p1, p2, *lc as usize, rest),
    }
}

fn short_length(byte: u8) -> u32 {
    if byte == 0 {
        256
    } else {
        byte as u32
    }
}

fn extended_length(word: u32) -> u32 {
    if word == 0 {
        65536
    } else {
        word
    }
}

/// Short Lc already consumed; `rest` is data plus an optional Le byte
fn parse_short_apdu(
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    lc: usize,
    rest: &[u8],
) -> Result<APDU, APDUError> {
    if rest.len() < lc {
        return Err(APDUError::InvalidLength);
    }

    let le = match rest.len() - lc {
        // Case 3S
        0 => None,
        // Case 4S
        1 => Some(short_length(rest[lc])),
        _ => return Err(APDUError::InvalidLength),
    };

    Ok(APDU {
        le,
        ..APDU::with_data(cla, ins, p1, p2, rest[..lc].to_vec())
    })
}

/// `remaining` starts after the 0x00 extended marker
fn parse_extended_apdu(
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    remaining: &[u8],
) -> Result<APDU, APDUError> {
    let first_word = ((remaining[0] as u32) << 8) | (remaining[1] as u32);

    // Case 2E
    if remaining.len() == 2 {
        return Ok(APDU {
            le: Some(extended_length(first_word)),
            extended: true,
            ..APDU::new(cla, ins, p1, p2)
        });
    }

    let lc = first_word as usize;
    if lc == 0 {
        return Err(APDUError::InvalidExtendedFormat);
    }

    let rest = &remaining[2..];
    if rest.len() < lc {
        return Err(APDUError::InvalidLength);
    }

    let le = match rest.len() - lc {
        // Case 3E
        0 => None,
        // Case 4E
        2 => Some(extended_length(
            ((rest[lc] as u32) << 8) | (rest[lc + 1] as u32),
        )),
        _ => return Err(APDUError::InvalidExtendedFormat),
    };

    Ok(APDU {
        le,
        extended: true,
        ..APDU::with_data(cla, ins, p1, p2, rest[..lc].to_vec())
    })
}

/// Format bytes as space separated upper-case hex for log lines
pub fn hexify(value: &[u8]) -> String {
    value
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// GlobalPlatform instruction bytes handled by the card session
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const SET_STATUS: u8 = 0xF0;
    pub const GET_STATUS: u8 = 0xF2;
}
