//! Privilege bit model
//!
//! Privileges are coded on three bytes, most significant bit of the first
//! byte first (GlobalPlatform Card Specification v2.2.1, section 6.6).

use serde::{Deserialize, Serialize};

use super::error::RegistryError;

/// Named privileges, valued by their bit number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Privilege {
    SecurityDomain = 0x00,
    DapVerification = 0x01,
    DelegatedManagement = 0x02,
    CardLock = 0x03,
    CardTerminate = 0x04,
    CardReset = 0x05,
    CvmManagement = 0x06,
    MandatedDapVerification = 0x07,
    TrustedPath = 0x08,
    AuthorizedManagement = 0x09,
    TokenVerification = 0x0A,
    GlobalDelete = 0x0B,
    GlobalLock = 0x0C,
    GlobalRegistry = 0x0D,
    FinalApplication = 0x0E,
    GlobalService = 0x0F,
    ReceiptGeneration = 0x10,
    CipheredLoadFileDataBlock = 0x11,
    ContactlessActivation = 0x12,
    ContactlessSelfActivation = 0x13,
}

impl Privilege {
    pub const ALL: [Privilege; 20] = [
        Privilege::SecurityDomain,
        Privilege::DapVerification,
        Privilege::DelegatedManagement,
        Privilege::CardLock,
        Privilege::CardTerminate,
        Privilege::CardReset,
        Privilege::CvmManagement,
        Privilege::MandatedDapVerification,
        Privilege::TrustedPath,
        Privilege::AuthorizedManagement,
        Privilege::TokenVerification,
        Privilege::GlobalDelete,
        Privilege::GlobalLock,
        Privilege::GlobalRegistry,
        Privilege::FinalApplication,
        Privilege::GlobalService,
        Privilege::ReceiptGeneration,
        Privilege::CipheredLoadFileDataBlock,
        Privilege::ContactlessActivation,
        Privilege::ContactlessSelfActivation,
    ];

    /// Highest defined privilege number
    pub const MAX_BIT: u8 = Privilege::ContactlessSelfActivation as u8;

    pub fn bit(self) -> u8 {
        self as u8
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(bit as usize).copied()
    }
}

/// Three-byte privilege vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Privileges([u8; 3]);

impl Privileges {
    pub const LEN: usize = 3;

    pub const fn empty() -> Self {
        Self([0; 3])
    }

    /// Every defined privilege, as held by the Issuer Security Domain
    pub fn all() -> Self {
        Privilege::ALL.iter().copied().collect()
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Test a privilege by number; numbers past the last defined privilege
    /// are never held
    pub fn is_privileged(&self, bit: u8) -> bool {
        if bit > Privilege::MAX_BIT {
            return false;
        }
        let byte = self.0[(bit / 8) as usize];
        (byte >> (7 - bit % 8)) & 0x01 != 0
    }

    pub fn has(&self, privilege: Privilege) -> bool {
        self.is_privileged(privilege.bit())
    }

    pub fn with(mut self, privilege: Privilege) -> Self {
        let bit = privilege.bit();
        self.0[(bit / 8) as usize] |= 0x80 >> (bit % 8);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = Privilege> + '_ {
        Privilege::ALL.iter().copied().filter(|p| self.has(*p))
    }

    /// Copy the raw vector into `buffer` at `offset`, returning the offset
    /// just past the copied bytes
    pub fn copy_to(&self, buffer: &mut [u8], offset: usize) -> Result<usize, RegistryError> {
        let end = offset
            .checked_add(Self::LEN)
            .filter(|end| *end <= buffer.len())
            .ok_or(RegistryError::BufferTooSmall {
                len: buffer.len(),
                offset,
                needed: Self::LEN,
            })?;
        buffer[offset..end].copy_from_slice(&self.0);
        Ok(end)
    }
}

impl FromIterator<Privilege> for Privileges {
    fn from_iter<I: IntoIterator<Item = Privilege>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}
