//! Response APDUs

use std::fmt;

use super::status::SW;

/// A response APDU: optional data and a status word
///
/// # Example
/// ```ignore
/// let response = Response::success(vec![0x6F, 0x00]);
/// assert!(response.is_success());
/// assert_eq!(Response::error(SW::FILE_NOT_FOUND).to_bytes(), vec![0x6A, 0x82]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status word)
    pub data: Vec<u8>,
    pub sw: u16,
}

impl Response {
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self { data, sw }
    }

    /// Data with 9000
    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    /// Bare 9000
    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// A status word without data
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    pub fn is_success(&self) -> bool {
        SW::is_success(self.sw)
    }

    pub fn sw(&self) -> u16 {
        self.sw
    }

    pub fn sw1(&self) -> u8 {
        (self.sw >> 8) as u8
    }

    pub fn sw2(&self) -> u8 {
        self.sw as u8
    }

    /// Data followed by SW1 SW2
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.data.len() + 2);
        result.extend_from_slice(&self.data);
        result.extend_from_slice(&self.sw.to_be_bytes());
        result
    }

    /// Split raw response bytes into data and status word
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let split = raw.len().checked_sub(2)?;
        let (data, sw) = raw.split_at(split);
        Some(Self::new(data.to_vec(), u16::from_be_bytes([sw[0], sw[1]])))
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<u16> for Response {
    fn from(sw: u16) -> Self {
        Self::error(sw)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X} ({})", self.sw, SW::describe(self.sw))?;
        if !self.data.is_empty() {
            write!(f, ", {} data bytes", self.data.len())?;
        }
        Ok(())
    }
}
