//! Global service names and the card-wide uniqueness registrar
//!
//! A service name is 16 bits: the high byte is the family, the low byte the
//! service within the family. A low byte of 0x00 stands for the whole
//! family, both when registering and when looking up.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::aid::Aid;
use super::error::RegistryError;
use super::privileges::Privilege;
use super::table::Registry;

/// A 2-byte global service name
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ServiceName(u16);

impl ServiceName {
    /// Wire value of an empty declaration slot; never a valid name
    pub const EMPTY: u16 = 0xFFFF;
    /// Service id standing for every service of a family
    pub const FAMILY_WILDCARD: u8 = 0x00;

    pub fn new(raw: u16) -> Option<Self> {
        (raw != Self::EMPTY).then_some(Self(raw))
    }

    pub fn from_parts(family: u8, id: u8) -> Self {
        Self(((family as u16) << 8) | id as u16)
    }

    /// The whole-family name for `family`
    pub fn family_wide(family: u8) -> Self {
        Self::from_parts(family, Self::FAMILY_WILDCARD)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn family(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn id(self) -> u8 {
        self.0 as u8
    }

    pub fn is_family_wide(self) -> bool {
        self.id() == Self::FAMILY_WILDCARD
    }

    /// Exact equality, or same family when either side is family-wide
    pub fn matches(self, other: ServiceName) -> bool {
        self == other
            || ((self.is_family_wide() || other.is_family_wide()) && self.family() == other.family())
    }

    /// Whether a declaration of `self` allows offering `other`
    pub fn covers(self, other: ServiceName) -> bool {
        self == other || (self.is_family_wide() && self.family() == other.family())
    }
}

impl TryFrom<u16> for ServiceName {
    type Error = RegistryError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(RegistryError::InvalidServiceName(raw))
    }
}

impl From<ServiceName> for u16 {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl fmt::Debug for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceName({:04X})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    owner: usize,
    name: ServiceName,
}

/// Fixed-capacity table of unique service registrations
#[derive(Debug, Clone)]
pub struct UniqueServiceTable {
    slots: Box<[Option<Registration>]>,
}

impl UniqueServiceTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owner of the first registration matching `name`
    pub fn owner_of(&self, name: ServiceName) -> Option<usize> {
        self.slots
            .iter()
            .flatten()
            .find(|r| r.name.matches(name))
            .map(|r| r.owner)
    }

    /// First registered name of `family`
    pub fn family_member(&self, family: u8) -> Option<ServiceName> {
        self.slots
            .iter()
            .flatten()
            .find(|r| r.name.family() == family)
            .map(|r| r.name)
    }

    /// Take the first free slot; conflicts are checked by the caller
    fn insert(&mut self, owner: usize, name: ServiceName) -> Result<(), RegistryError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::ServiceTableFull)?;
        self.slots[slot] = Some(Registration { owner, name });
        Ok(())
    }

    fn remove(&mut self, owner: usize, name: ServiceName) -> Result<(), RegistryError> {
        let wanted = Some(Registration { owner, name });
        let slot = self
            .slots
            .iter()
            .position(|r| *r == wanted)
            .ok_or(RegistryError::ServiceNotRegistered(name))?;
        self.slots[slot] = None;
        Ok(())
    }

    /// Registrations as (owner, name)
    pub fn iter(&self) -> impl Iterator<Item = (usize, ServiceName)> + '_ {
        self.slots.iter().flatten().map(|r| (r.owner, r.name))
    }
}

/// A resolved global service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHandle {
    pub owner: usize,
    pub owner_aid: Aid,
    pub name: ServiceName,
}

impl Registry {
    /// Uniquely register `name` for entry `target`, on behalf of `caller`
    pub fn register_service(
        &mut self,
        target: usize,
        caller: usize,
        name: ServiceName,
    ) -> Result<(), RegistryError> {
        let aid = self.check_service_owner(target, caller)?;

        if !self.record(target).declares(name) {
            return Err(RegistryError::ServiceNotDeclared(name));
        }
        if let Some(owner) = self.services.owner_of(name) {
            debug!("Service {} already registered by entry {}", name, owner);
            return Err(RegistryError::ServiceAlreadyRegistered(name, owner));
        }

        self.services.insert(target, name)?;
        info!("Registered global service {} for {}", name, aid);
        Ok(())
    }

    /// Remove the unique registration of `name` held by `target`
    pub fn deregister_service(
        &mut self,
        target: usize,
        caller: usize,
        name: ServiceName,
    ) -> Result<(), RegistryError> {
        let aid = self.check_service_owner(target, caller)?;
        self.services.remove(target, name)?;
        info!("Deregistered global service {} for {}", name, aid);
        Ok(())
    }

    fn check_service_owner(&self, target: usize, caller: usize) -> Result<Aid, RegistryError> {
        let record = self.get(target).ok_or(RegistryError::UnknownIndex(target))?;
        if !record.privileges().has(Privilege::GlobalService) {
            return Err(RegistryError::MissingGlobalService);
        }
        if caller != target {
            return Err(RegistryError::NotOwnEntry);
        }
        Ok(record.aid())
    }

    /// Index of the entry holding a registration matching `name`
    pub fn is_registered_uniquely(&self, name: ServiceName) -> Option<usize> {
        self.services.owner_of(name)
    }

    pub fn find_uniquely_registered_family_member(&self, family: u8) -> Option<ServiceName> {
        self.services.family_member(family)
    }

    pub fn unique_services(&self) -> &UniqueServiceTable {
        &self.services
    }

    /// Resolve a global service, either offered by the entity `aid` or,
    /// without an AID, through the unique registrations
    pub fn service(&self, aid: Option<&Aid>, name: ServiceName) -> Option<ServiceHandle> {
        let (owner, name) = match aid {
            Some(aid) => {
                let index = self.find_by_aid(aid)?;
                let record = self.record(index);
                if !record.privileges().has(Privilege::GlobalService) || !record.declares(name) {
                    return None;
                }
                (index, name)
            }
            None if name.is_family_wide() => {
                let member = self.services.family_member(name.family())?;
                (self.services.owner_of(member)?, member)
            }
            None => (self.services.owner_of(name)?, name),
        };

        let record = self.record(owner);
        if record.is_locked() {
            debug!("Service {} owner {} is locked", name, record.aid());
            return None;
        }
        Some(ServiceHandle {
            owner,
            owner_aid: record.aid(),
            name,
        })
    }
}
