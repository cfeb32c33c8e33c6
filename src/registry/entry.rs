//! Registry entries
//!
//! One record per Executable Load File, Executable Module and instance.
//! Identity, kind, association and privileges are fixed at creation; only
//! the life cycle ever changes afterwards.

use super::aid::Aid;
use super::lifecycle::{self, EntityClass, LifeCycle};
use super::privileges::{Privilege, Privileges};
use super::services::ServiceName;

/// What a registry record stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    ExecutableLoadFile {
        modules: Vec<usize>,
    },
    ExecutableModule {
        load_file: usize,
        instances: Vec<usize>,
    },
    Instance {
        class: EntityClass,
        /// Module the instance was created from; none for the ISD
        module: Option<usize>,
    },
}

/// A registry record
#[derive(Debug, Clone)]
pub struct EntityRecord {
    aid: Aid,
    kind: EntityKind,
    life_cycle: LifeCycle,
    parent: Aid,
    privileges: Privileges,
    global_services: Box<[Option<ServiceName>]>,
}

impl EntityRecord {
    pub(crate) fn new(
        aid: Aid,
        kind: EntityKind,
        initial_state: u8,
        parent: Aid,
        privileges: Privileges,
        global_services: Box<[Option<ServiceName>]>,
    ) -> Self {
        Self {
            aid,
            kind,
            life_cycle: LifeCycle::new(initial_state),
            parent,
            privileges,
            global_services,
        }
    }

    pub fn aid(&self) -> Aid {
        self.aid
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut EntityKind {
        &mut self.kind
    }

    /// Life cycle class; ELF and EM records have none
    pub fn class(&self) -> Option<EntityClass> {
        match self.kind {
            EntityKind::Instance { class, .. } => Some(class),
            _ => None,
        }
    }

    pub fn life_cycle(&self) -> LifeCycle {
        self.life_cycle
    }

    pub fn state(&self) -> u8 {
        self.life_cycle.current
    }

    pub fn previous_state(&self) -> u8 {
        self.life_cycle.previous
    }

    pub(crate) fn commit_life_cycle(&mut self, next: LifeCycle) {
        self.life_cycle = next;
    }

    pub fn is_locked(&self) -> bool {
        self.class()
            .is_some_and(|class| lifecycle::is_locked(class, self.life_cycle.current))
    }

    /// AID of the Security Domain this record is associated with
    pub fn parent(&self) -> Aid {
        self.parent
    }

    /// The root of every association chain is its own parent
    pub fn is_root(&self) -> bool {
        self.parent == self.aid
    }

    pub fn privileges(&self) -> Privileges {
        self.privileges
    }

    pub fn is_security_domain(&self) -> bool {
        matches!(
            self.class(),
            Some(EntityClass::SecurityDomain | EntityClass::IssuerSecurityDomain)
        )
    }

    /// Declared global service names, skipping empty slots
    pub fn global_services(&self) -> impl Iterator<Item = ServiceName> + '_ {
        self.global_services.iter().flatten().copied()
    }

    /// Number of declaration slots, used or not
    pub fn global_service_slots(&self) -> usize {
        self.global_services.len()
    }

    /// Whether the declarations allow offering `name`
    pub fn declares(&self, name: ServiceName) -> bool {
        self.global_services().any(|declared| declared.covers(name))
    }

    /// Privilege byte reported by the legacy GET STATUS format
    pub fn legacy_privilege_byte(&self) -> u8 {
        self.privileges.as_bytes()[0]
    }

    pub fn holds(&self, privilege: Privilege) -> bool {
        self.privileges.has(privilege)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lifecycle::state;

    fn record(kind: EntityKind, services: &[u16]) -> EntityRecord {
        let mut slots = vec![None; 4];
        for (slot, raw) in slots.iter_mut().zip(services) {
            *slot = ServiceName::new(*raw);
        }
        EntityRecord::new(
            Aid::new(&[0xA0, 0x00, 0x00, 0x00, 0x10, 0x01]).unwrap(),
            kind,
            state::APPLICATION_INSTALLED,
            Aid::issuer_security_domain(),
            Privileges::empty().with(Privilege::GlobalService),
            slots.into_boxed_slice(),
        )
    }

    #[test]
    fn test_declared_services() {
        let r = record(
            EntityKind::Instance {
                class: EntityClass::Application,
                module: Some(2),
            },
            &[0x8101, 0xFFFF, 0x8200],
        );
        assert_eq!(r.global_services().count(), 2);
        assert_eq!(r.global_service_slots(), 4);
        assert!(r.declares(ServiceName::from_parts(0x81, 0x01)));
        assert!(!r.declares(ServiceName::from_parts(0x81, 0x02)));
        assert!(r.declares(ServiceName::from_parts(0x82, 0x33)));
    }

    #[test]
    fn test_initial_life_cycle() {
        let r = record(
            EntityKind::Instance {
                class: EntityClass::Application,
                module: None,
            },
            &[],
        );
        assert_eq!(r.state(), state::APPLICATION_INSTALLED);
        assert_eq!(r.previous_state(), state::APPLICATION_INSTALLED);
        assert!(!r.is_locked());
        assert!(!r.is_root());
        assert!(!r.is_security_domain());
        assert!(r.holds(Privilege::GlobalService));
    }

    #[test]
    fn test_load_files_have_no_class() {
        let r = record(EntityKind::ExecutableLoadFile { modules: vec![] }, &[]);
        assert_eq!(r.class(), None);
        assert!(!r.is_locked());
    }
}
