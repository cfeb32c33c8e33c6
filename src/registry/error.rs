//! Registry errors and their status words

use thiserror::Error;

use super::aid::Aid;
use super::services::ServiceName;
use crate::apdu::{Response, SW};

/// Errors signalled by registry, registrar and install operations
///
/// Life-cycle transitions never produce these; they report `false`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("AID length {0} outside 5..=16 bytes")]
    InvalidAid(usize),

    #[error("AID {0} is already registered")]
    DuplicateAid(Aid),

    #[error("AID {0} is not registered")]
    UnknownAid(Aid),

    #[error("no registry entry at index {0}")]
    UnknownIndex(usize),

    #[error("entity {0} is not {1}")]
    WrongKind(Aid, &'static str),

    #[error("life cycle state 0x{0:02X} is not valid here")]
    InvalidLifeCycleState(u8),

    #[error("capacity exhausted: {0}")]
    CapacityExceeded(&'static str),

    #[error("0x{0:04X} is not a service name")]
    InvalidServiceName(u16),

    #[error("caller does not hold the Global Service privilege")]
    MissingGlobalService,

    #[error("services may only be (de)registered by their owner")]
    NotOwnEntry,

    #[error("service {0} is not declared by the caller")]
    ServiceNotDeclared(ServiceName),

    #[error("service {0} is already registered by entry {1}")]
    ServiceAlreadyRegistered(ServiceName, usize),

    #[error("service {0} is not registered by the caller")]
    ServiceNotRegistered(ServiceName),

    #[error("unique service table is full")]
    ServiceTableFull,

    #[error("buffer of {len} bytes cannot take {needed} bytes at offset {offset}")]
    BufferTooSmall {
        len: usize,
        offset: usize,
        needed: usize,
    },
}

impl RegistryError {
    /// ISO 7816-4 status word reported for this error
    pub fn status_word(&self) -> u16 {
        match self {
            RegistryError::InvalidAid(_) | RegistryError::InvalidServiceName(_) => SW::WRONG_DATA,
            RegistryError::DuplicateAid(_) => SW::DF_NAME_ALREADY_EXISTS,
            RegistryError::UnknownAid(_) | RegistryError::UnknownIndex(_) => {
                SW::REFERENCED_DATA_NOT_FOUND
            }
            RegistryError::WrongKind(..) | RegistryError::InvalidLifeCycleState(_) => {
                SW::CONDITIONS_NOT_SATISFIED
            }
            RegistryError::CapacityExceeded(_) => SW::NOT_ENOUGH_MEMORY,
            RegistryError::MissingGlobalService | RegistryError::NotOwnEntry => {
                SW::SECURITY_STATUS_NOT_SATISFIED
            }
            RegistryError::ServiceNotDeclared(_)
            | RegistryError::ServiceAlreadyRegistered(..)
            | RegistryError::ServiceNotRegistered(_) => SW::CONDITIONS_NOT_SATISFIED,
            RegistryError::ServiceTableFull => SW::MEMORY_FAILURE,
            RegistryError::BufferTooSmall { .. } => SW::WRONG_LENGTH,
        }
    }
}

impl From<RegistryError> for Response {
    fn from(err: RegistryError) -> Self {
        Response::error(err.status_word())
    }
}
