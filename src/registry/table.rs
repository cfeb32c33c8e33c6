//! The entity registry
//!
//! A fixed-capacity table of records. Slot 0 always holds the Issuer
//! Security Domain, whose life cycle is the card life cycle. Records are
//! added at manufacturing/installation time and never removed.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::aid::Aid;
use super::entry::{EntityKind, EntityRecord};
use super::error::RegistryError;
use super::lifecycle::{state, EntityClass, LifeCycle};
use super::privileges::{Privilege, Privileges};
use super::services::{ServiceName, UniqueServiceTable};

/// Index of the Issuer Security Domain
pub const ISD_INDEX: usize = 0;

/// Sizes fixed when the registry is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryLimits {
    pub max_load_files: usize,
    pub max_modules_per_file: usize,
    pub max_instances_per_module: usize,
    /// Declaration slots per entity
    pub max_global_services: usize,
    /// Size of the card-wide uniqueness table
    pub max_unique_services: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_load_files: 4,
            max_modules_per_file: 4,
            max_instances_per_module: 4,
            max_global_services: 8,
            max_unique_services: 16,
        }
    }
}

impl RegistryLimits {
    /// Total number of registry records
    pub fn capacity(&self) -> usize {
        self.max_load_files
            .saturating_mul(self.max_modules_per_file)
            .saturating_mul(self.max_instances_per_module)
    }
}

/// Installation parameters of an Application or Security Domain
///
/// Holding [`Privilege::SecurityDomain`] makes the instance a Security
/// Domain.
#[derive(Debug, Clone)]
pub struct InstallParams {
    pub aid: Aid,
    pub privileges: Privileges,
    /// Associated Security Domain, the ISD when absent
    pub parent: Option<Aid>,
    pub services: Vec<ServiceName>,
    pub state: u8,
}

impl InstallParams {
    pub fn new(aid: Aid) -> Self {
        Self {
            aid,
            privileges: Privileges::empty(),
            parent: None,
            services: Vec::new(),
            state: state::APPLICATION_INSTALLED,
        }
    }

    pub fn privileges(mut self, privileges: Privileges) -> Self {
        self.privileges = privileges;
        self
    }

    pub fn parent(mut self, parent: Aid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn services(mut self, services: Vec<ServiceName>) -> Self {
        self.services = services;
        self
    }

    pub fn state(mut self, state: u8) -> Self {
        self.state = state;
        self
    }
}

/// The OPEN registry
#[derive(Debug, Clone)]
pub struct Registry {
    limits: RegistryLimits,
    entries: Vec<EntityRecord>,
    pub(super) services: UniqueServiceTable,
}

impl Registry {
    /// Build a registry holding only the Issuer Security Domain
    pub fn new(limits: RegistryLimits, isd_aid: Aid, card_state: u8) -> Result<Self, RegistryError> {
        if !state::is_card_state(card_state) {
            return Err(RegistryError::InvalidLifeCycleState(card_state));
        }
        if limits.capacity() == 0 {
            return Err(RegistryError::CapacityExceeded("registry entries"));
        }
        Ok(Self::build(limits, isd_aid, card_state))
    }

    /// Default limits, the GlobalPlatform ISD AID and a SECURED card
    pub fn with_defaults() -> Self {
        Self::build(
            RegistryLimits::default(),
            Aid::issuer_security_domain(),
            state::CARD_SECURED,
        )
    }

    fn build(limits: RegistryLimits, isd_aid: Aid, card_state: u8) -> Self {
        let mut entries = Vec::with_capacity(limits.capacity());
        entries.push(EntityRecord::new(
            isd_aid,
            EntityKind::Instance {
                class: EntityClass::IssuerSecurityDomain,
                module: None,
            },
            card_state,
            isd_aid,
            Privileges::all(),
            vec![None; limits.max_global_services].into_boxed_slice(),
        ));
        // A card built LOCKED unlocks to SECURED, the only state it can be locked from
        if card_state == state::CARD_LOCKED {
            entries[ISD_INDEX].commit_life_cycle(LifeCycle {
                current: state::CARD_LOCKED,
                previous: state::CARD_SECURED,
            });
        }
        debug!("Registry created for {} records, ISD {}", limits.capacity(), isd_aid);
        Self {
            limits,
            entries,
            services: UniqueServiceTable::with_capacity(limits.max_unique_services),
        }
    }

    pub fn limits(&self) -> &RegistryLimits {
        &self.limits
    }

    pub fn capacity(&self) -> usize {
        self.limits.capacity()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Index of the first record with `aid`
    pub fn find_by_aid(&self, aid: &Aid) -> Option<usize> {
        self.entries.iter().position(|r| r.aid() == *aid)
    }

    pub fn get(&self, index: usize) -> Option<&EntityRecord> {
        self.entries.get(index)
    }

    /// Record at an index already known to exist
    pub(crate) fn record(&self, index: usize) -> &EntityRecord {
        &self.entries[index]
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> &mut EntityRecord {
        &mut self.entries[index]
    }

    pub fn isd(&self) -> &EntityRecord {
        self.record(ISD_INDEX)
    }

    pub fn card_life_cycle_state(&self) -> u8 {
        self.isd().state()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &EntityRecord)> {
        self.entries.iter().enumerate()
    }

    /// Register an Executable Load File associated with `parent`
    pub fn load_file(&mut self, aid: Aid, parent: Option<Aid>) -> Result<usize, RegistryError> {
        let parent = self.security_domain(parent)?;
        let load_files = self
            .entries
            .iter()
            .filter(|r| matches!(r.kind(), EntityKind::ExecutableLoadFile { .. }))
            .count();
        if load_files >= self.limits.max_load_files {
            return Err(RegistryError::CapacityExceeded("executable load files"));
        }

        let record = EntityRecord::new(
            aid,
            EntityKind::ExecutableLoadFile {
                modules: Vec::with_capacity(self.limits.max_modules_per_file),
            },
            state::LOADED,
            parent,
            Privileges::empty(),
            Box::new([]),
        );
        let index = self.push(record)?;
        info!("Loaded executable load file {} under {}", aid, parent);
        Ok(index)
    }

    /// Register an Executable Module of load file `load_file`
    pub fn add_module(&mut self, load_file: usize, aid: Aid) -> Result<usize, RegistryError> {
        let elf = self.get(load_file).ok_or(RegistryError::UnknownIndex(load_file))?;
        let EntityKind::ExecutableLoadFile { modules } = elf.kind() else {
            return Err(RegistryError::WrongKind(elf.aid(), "an executable load file"));
        };
        if modules.len() >= self.limits.max_modules_per_file {
            return Err(RegistryError::CapacityExceeded("modules per load file"));
        }

        let record = EntityRecord::new(
            aid,
            EntityKind::ExecutableModule {
                load_file,
                instances: Vec::with_capacity(self.limits.max_instances_per_module),
            },
            state::LOADED,
            elf.parent(),
            Privileges::empty(),
            Box::new([]),
        );
        let index = self.push(record)?;
        if let EntityKind::ExecutableLoadFile { modules } = self.record_mut(load_file).kind_mut() {
            modules.push(index);
        }
        debug!("Added executable module {} to entry {}", aid, load_file);
        Ok(index)
    }

    /// Create an Application or Security Domain from module `module`
    pub fn install_instance(
        &mut self,
        module: usize,
        params: InstallParams,
    ) -> Result<usize, RegistryError> {
        let em = self.get(module).ok_or(RegistryError::UnknownIndex(module))?;
        let EntityKind::ExecutableModule { instances, .. } = em.kind() else {
            return Err(RegistryError::WrongKind(em.aid(), "an executable module"));
        };
        if instances.len() >= self.limits.max_instances_per_module {
            return Err(RegistryError::CapacityExceeded("instances per module"));
        }
        if params.services.len() > self.limits.max_global_services {
            return Err(RegistryError::CapacityExceeded("global service names"));
        }

        let class = if params.privileges.has(Privilege::SecurityDomain) {
            EntityClass::SecurityDomain
        } else {
            EntityClass::Application
        };
        let valid_state = match (class, params.state) {
            (_, state::APPLICATION_INSTALLED | state::APPLICATION_SELECTABLE) => true,
            (EntityClass::SecurityDomain, s) => s == state::SECURITY_DOMAIN_PERSONALIZED,
            (_, s) => state::is_application_specific(s),
        };
        if !valid_state {
            return Err(RegistryError::InvalidLifeCycleState(params.state));
        }
        let parent = self.security_domain(params.parent)?;

        let mut slots = vec![None; self.limits.max_global_services];
        for (slot, name) in slots.iter_mut().zip(&params.services) {
            *slot = Some(*name);
        }

        let record = EntityRecord::new(
            params.aid,
            EntityKind::Instance {
                class,
                module: Some(module),
            },
            params.state,
            parent,
            params.privileges,
            slots.into_boxed_slice(),
        );
        let index = self.push(record)?;
        if let EntityKind::ExecutableModule { instances, .. } = self.record_mut(module).kind_mut() {
            instances.push(index);
        }
        info!(
            "Installed {:?} {} (state {:02X}) under {}",
            class, params.aid, params.state, parent
        );
        Ok(index)
    }

    /// Resolve an association target, defaulting to the ISD
    fn security_domain(&self, aid: Option<Aid>) -> Result<Aid, RegistryError> {
        let aid = aid.unwrap_or_else(|| self.isd().aid());
        let index = self.find_by_aid(&aid).ok_or(RegistryError::UnknownAid(aid))?;
        if !self.record(index).is_security_domain() {
            return Err(RegistryError::WrongKind(aid, "a security domain"));
        }
        Ok(aid)
    }

    fn push(&mut self, record: EntityRecord) -> Result<usize, RegistryError> {
        if self.find_by_aid(&record.aid()).is_some() {
            return Err(RegistryError::DuplicateAid(record.aid()));
        }
        if self.entries.len() >= self.capacity() {
            return Err(RegistryError::CapacityExceeded("registry entries"));
        }
        self.entries.push(record);
        Ok(self.entries.len() - 1)
    }

    /// Append a record without any checks, for malformed-registry tests
    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, record: EntityRecord) -> usize {
        self.entries.push(record);
        self.entries.len() - 1
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
