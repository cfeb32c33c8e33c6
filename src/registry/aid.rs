//! Application Identifiers
//!
//! AIDs are 5 to 16 bytes (RID + PIX) and compare by exact byte equality.
//! They are stored inline so a record never allocates for its identity.

use std::fmt;

use super::error::RegistryError;
use crate::apdu::hexify;

/// Shortest legal AID (a bare RID)
pub const AID_MIN_LEN: usize = 5;
/// Longest legal AID
pub const AID_MAX_LEN: usize = 16;

/// Default Issuer Security Domain AID (GlobalPlatform RID A000000151)
pub const ISD_AID: &[u8] = &[0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];

/// An Application Identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aid {
    bytes: [u8; AID_MAX_LEN],
    len: u8,
}

impl Aid {
    /// Create an AID, rejecting lengths outside 5..=16
    pub fn new(bytes: &[u8]) -> Result<Self, RegistryError> {
        if !(AID_MIN_LEN..=AID_MAX_LEN).contains(&bytes.len()) {
            return Err(RegistryError::InvalidAid(bytes.len()));
        }
        let mut stored = [0u8; AID_MAX_LEN];
        stored[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: stored,
            len: bytes.len() as u8,
        })
    }

    /// The default Issuer Security Domain AID
    pub fn issuer_security_domain() -> Self {
        let mut stored = [0u8; AID_MAX_LEN];
        stored[..ISD_AID.len()].copy_from_slice(ISD_AID);
        Self {
            bytes: stored,
            len: ISD_AID.len() as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Registered application provider identifier (first five bytes)
    pub fn rid(&self) -> &[u8] {
        &self.bytes[..AID_MIN_LEN]
    }

    /// Partial-AID match used by SELECT and GET STATUS search criteria
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.as_bytes().starts_with(prefix)
    }
}

impl TryFrom<&[u8]> for Aid {
    type Error = RegistryError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::new(bytes)
    }
}

impl PartialEq<[u8]> for Aid {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hexify(self.as_bytes()).replace(' ', ""))
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({})", self)
    }
}
