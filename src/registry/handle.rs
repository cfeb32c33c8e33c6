//! Capabilities handed out to entities
//!
//! An entity never touches the [`Registry`] directly. It is given an
//! [`EntryHandle`] bound to a target record and to the calling entity, and
//! works through three separate traits: a read-only view, life cycle
//! administration and the global service catalog. [`EntryRef`] carries the
//! read-only view alone.

use super::aid::Aid;
use super::entry::EntityRecord;
use super::error::RegistryError;
use super::services::{ServiceHandle, ServiceName};
use super::table::Registry;

/// Read-only questions about one registry record
pub trait RegistryView {
    fn aid(&self) -> Aid;

    fn state(&self) -> u8;

    /// The card life cycle state, whichever record is viewed
    fn card_state(&self) -> u8;

    /// Whether this record's association chain reaches `target`
    fn is_associated(&self, target: &Aid) -> bool;

    /// Fail-closed: bits past the last defined privilege report false
    fn is_privileged(&self, bit: u8) -> bool;

    /// Copy the 3-byte privilege vector into `buffer` at `offset`
    fn privileges(&self, buffer: &mut [u8], offset: usize) -> Result<usize, RegistryError>;

    /// Read-only view of another record
    fn registry_entry(&self, aid: &Aid) -> Option<EntryRef<'_>>;
}

/// Life cycle requests made on the record by the calling entity
pub trait LifeCycleAdmin {
    fn set_state(&mut self, requested: u8) -> bool;

    fn set_card_life_cycle_state(&mut self, requested: u8) -> bool;
}

/// Global services offered by the record
pub trait ServiceCatalog {
    fn register_service(&mut self, name: ServiceName) -> Result<(), RegistryError>;

    fn deregister_service(&mut self, name: ServiceName) -> Result<(), RegistryError>;

    /// Look up a service offered by `aid`, or uniquely registered when no
    /// AID is given
    fn service(&self, aid: Option<&Aid>, name: ServiceName) -> Option<ServiceHandle>;
}

/// Read-only access to one record
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'r> {
    registry: &'r Registry,
    index: usize,
}

impl<'r> EntryRef<'r> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn record(&self) -> &'r EntityRecord {
        self.registry.record(self.index)
    }
}

impl RegistryView for EntryRef<'_> {
    fn aid(&self) -> Aid {
        self.record().aid()
    }

    fn state(&self) -> u8 {
        self.record().state()
    }

    fn card_state(&self) -> u8 {
        self.registry.card_life_cycle_state()
    }

    fn is_associated(&self, target: &Aid) -> bool {
        self.registry.is_associated(self.index, target)
    }

    fn is_privileged(&self, bit: u8) -> bool {
        self.record().privileges().is_privileged(bit)
    }

    fn privileges(&self, buffer: &mut [u8], offset: usize) -> Result<usize, RegistryError> {
        self.record().privileges().copy_to(buffer, offset)
    }

    fn registry_entry(&self, aid: &Aid) -> Option<EntryRef<'_>> {
        self.registry.registry_entry(aid)
    }
}

/// A record as seen and acted upon by `caller`
#[derive(Debug)]
pub struct EntryHandle<'r> {
    registry: &'r mut Registry,
    index: usize,
    caller: usize,
}

impl EntryHandle<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn caller(&self) -> usize {
        self.caller
    }

    fn view(&self) -> EntryRef<'_> {
        EntryRef {
            registry: &*self.registry,
            index: self.index,
        }
    }

    /// Handle on another record, still acting as the same caller
    pub fn entry_for(&mut self, aid: &Aid) -> Option<EntryHandle<'_>> {
        let index = self.registry.find_by_aid(aid)?;
        Some(EntryHandle {
            registry: &mut *self.registry,
            index,
            caller: self.caller,
        })
    }
}

impl RegistryView for EntryHandle<'_> {
    fn aid(&self) -> Aid {
        self.view().aid()
    }

    fn state(&self) -> u8 {
        self.view().state()
    }

    fn card_state(&self) -> u8 {
        self.registry.card_life_cycle_state()
    }

    fn is_associated(&self, target: &Aid) -> bool {
        self.registry.is_associated(self.index, target)
    }

    fn is_privileged(&self, bit: u8) -> bool {
        self.view().is_privileged(bit)
    }

    fn privileges(&self, buffer: &mut [u8], offset: usize) -> Result<usize, RegistryError> {
        self.view().privileges(buffer, offset)
    }

    fn registry_entry(&self, aid: &Aid) -> Option<EntryRef<'_>> {
        self.registry.registry_entry(aid)
    }
}

impl LifeCycleAdmin for EntryHandle<'_> {
    fn set_state(&mut self, requested: u8) -> bool {
        self.registry.set_state(self.index, self.caller, requested)
    }

    fn set_card_life_cycle_state(&mut self, requested: u8) -> bool {
        self.registry.set_card_life_cycle_state(self.caller, requested)
    }
}

impl ServiceCatalog for EntryHandle<'_> {
    fn register_service(&mut self, name: ServiceName) -> Result<(), RegistryError> {
        self.registry.register_service(self.index, self.caller, name)
    }

    fn deregister_service(&mut self, name: ServiceName) -> Result<(), RegistryError> {
        self.registry.deregister_service(self.index, self.caller, name)
    }

    fn service(&self, aid: Option<&Aid>, name: ServiceName) -> Option<ServiceHandle> {
        self.registry.service(aid, name)
    }
}

impl Registry {
    /// Read-only view of the record with `aid`
    pub fn registry_entry(&self, aid: &Aid) -> Option<EntryRef<'_>> {
        self.find_by_aid(aid).map(|index| EntryRef {
            registry: self,
            index,
        })
    }

    /// Read-only view of the record at `index`
    pub fn entry_ref(&self, index: usize) -> Option<EntryRef<'_>> {
        self.get(index).map(|_| EntryRef {
            registry: self,
            index,
        })
    }

    /// Handle on record `target` for the entity at `caller`
    pub fn entry(&mut self, target: usize, caller: usize) -> Option<EntryHandle<'_>> {
        if self.get(target).is_none() || self.get(caller).is_none() {
            return None;
        }
        Some(EntryHandle {
            registry: self,
            index: target,
            caller,
        })
    }

    /// Handle an entity holds on its own record
    pub fn own_entry(&mut self, index: usize) -> Option<EntryHandle<'_>> {
        self.entry(index, index)
    }
}
