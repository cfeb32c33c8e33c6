//! Association chains
//!
//! Every entity is associated with a Security Domain, which in turn is
//! associated with another, up to the Issuer Security Domain at the root.

use super::aid::Aid;
use super::table::Registry;

impl Registry {
    /// Whether the chain starting at entry `index` passes through `target`
    ///
    /// Reflexive: an entity is associated with itself. The walk is bounded
    /// by the registry capacity, so a malformed cyclic chain ends as `false`.
    pub fn is_associated(&self, index: usize, target: &Aid) -> bool {
        let Some(mut current) = self.get(index) else {
            return false;
        };
        for _ in 0..self.capacity() {
            if current.aid() == *target {
                return true;
            }
            if current.is_root() {
                return false;
            }
            match self.find_by_aid(&current.parent()) {
                Some(parent) => current = self.record(parent),
                None => return false,
            }
        }
        false
    }

    /// Entries from `index` up to the root, `index` first
    pub fn association_chain(&self, index: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut next = self.get(index).map(|_| index);
        while let Some(current) = next {
            if chain.len() >= self.capacity() || chain.contains(&current) {
                break;
            }
            chain.push(current);
            let record = self.record(current);
            next = if record.is_root() {
                None
            } else {
                self.find_by_aid(&record.parent())
            };
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::aid::Aid;
    use crate::registry::entry::{EntityKind, EntityRecord};
    use crate::registry::lifecycle::{state, EntityClass};
    use crate::registry::privileges::{Privilege, Privileges};
    use crate::registry::table::{InstallParams, Registry, ISD_INDEX};

    fn aid(last: u8) -> Aid {
        Aid::new(&[0xA0, 0x00, 0x00, 0x00, 0x55, last]).unwrap()
    }

    fn sd() -> Privileges {
        Privileges::empty().with(Privilege::SecurityDomain)
    }

    /// ISD <- sd1 <- sd2 <- app
    fn nested() -> (Registry, usize, usize, usize) {
        let mut registry = Registry::with_defaults();
        let elf = registry.load_file(aid(0x10), None).unwrap();
        let em = registry.add_module(elf, aid(0x11)).unwrap();
        let sd1 = registry
            .install_instance(em, InstallParams::new(aid(0x01)).privileges(sd()))
            .unwrap();
        let sd2 = registry
            .install_instance(
                em,
                InstallParams::new(aid(0x02)).privileges(sd()).parent(aid(0x01)),
            )
            .unwrap();
        let app = registry
            .install_instance(em, InstallParams::new(aid(0x03)).parent(aid(0x02)))
            .unwrap();
        (registry, sd1, sd2, app)
    }

    #[test]
    fn test_reflexive() {
        let (registry, _, _, _) = nested();
        for (index, record) in registry.iter() {
            assert!(registry.is_associated(index, &record.aid()), "{}", record.aid());
        }
    }

    #[test]
    fn test_transitive_up_to_isd() {
        let (registry, sd1, sd2, app) = nested();
        let isd = Aid::issuer_security_domain();
        assert!(registry.is_associated(app, &aid(0x02)));
        assert!(registry.is_associated(app, &aid(0x01)));
        assert!(registry.is_associated(app, &isd));
        assert!(registry.is_associated(sd2, &aid(0x01)));

        // Never downwards
        assert!(!registry.is_associated(sd1, &aid(0x02)));
        assert!(!registry.is_associated(ISD_INDEX, &aid(0x01)));
        assert!(!registry.is_associated(app, &aid(0x7F)));
        assert!(!registry.is_associated(99, &isd));

        assert_eq!(registry.association_chain(app), vec![app, sd2, sd1, ISD_INDEX]);
        assert!(registry.association_chain(99).is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let mut registry = Registry::with_defaults();
        let class = EntityKind::Instance {
            class: EntityClass::SecurityDomain,
            module: None,
        };
        let a = registry.push_unchecked(EntityRecord::new(
            aid(0x01),
            class.clone(),
            state::APPLICATION_SELECTABLE,
            aid(0x02),
            sd(),
            Box::new([]),
        ));
        let b = registry.push_unchecked(EntityRecord::new(
            aid(0x02),
            class,
            state::APPLICATION_SELECTABLE,
            aid(0x01),
            sd(),
            Box::new([]),
        ));

        assert!(registry.is_associated(a, &aid(0x02)));
        assert!(!registry.is_associated(a, &Aid::issuer_security_domain()));
        assert!(!registry.is_associated(b, &aid(0x7F)));
        assert_eq!(registry.association_chain(a), vec![a, b]);
    }

    #[test]
    fn test_dangling_parent() {
        let mut registry = Registry::with_defaults();
        let orphan = registry.push_unchecked(EntityRecord::new(
            aid(0x01),
            EntityKind::Instance {
                class: EntityClass::Application,
                module: None,
            },
            state::APPLICATION_INSTALLED,
            aid(0x33),
            Privileges::empty(),
            Box::new([]),
        ));
        assert!(!registry.is_associated(orphan, &Aid::issuer_security_domain()));
        assert_eq!(registry.association_chain(orphan), vec![orphan]);
    }
}
