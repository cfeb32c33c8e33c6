//! Life cycle state machine
//!
//! Every permitted transition is one row of [`RULES`]: the entity class, a
//! pattern on the state the entity is in (or, for unlocking, the state it
//! was locked from), the kind of move and who may request it. A request
//! that matches no row, or whose caller fails the row's authorization,
//! leaves the entity untouched and reports `false`.

use log::{debug, info, warn};

use super::privileges::{Privilege, Privileges};
use super::table::{Registry, ISD_INDEX};

/// Life cycle state byte codes
pub mod state {
    /// Executable Load Files and Modules
    pub const LOADED: u8 = 0x01;

    pub const APPLICATION_INSTALLED: u8 = 0x03;
    pub const APPLICATION_SELECTABLE: u8 = 0x07;
    /// Flag OR'd onto the state the entity was locked from
    pub const APPLICATION_LOCKED: u8 = 0x80;
    pub const SECURITY_DOMAIN_PERSONALIZED: u8 = 0x0F;

    pub const CARD_OP_READY: u8 = 0x01;
    pub const CARD_INITIALIZED: u8 = 0x07;
    pub const CARD_SECURED: u8 = 0x0F;
    pub const CARD_LOCKED: u8 = 0x7F;
    pub const CARD_TERMINATED: u8 = 0xFF;

    /// Application specific states keep b1-b3 set and b8 clear
    pub fn is_application_specific(state: u8) -> bool {
        state & APPLICATION_LOCKED == 0
            && state & APPLICATION_SELECTABLE == APPLICATION_SELECTABLE
            && state != APPLICATION_SELECTABLE
    }

    pub fn is_card_state(state: u8) -> bool {
        matches!(
            state,
            CARD_OP_READY | CARD_INITIALIZED | CARD_SECURED | CARD_LOCKED | CARD_TERMINATED
        )
    }
}

use state::*;

/// Classes of entities with their own transition rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    /// Carries the card life cycle
    IssuerSecurityDomain,
    SecurityDomain,
    Application,
}

/// Current state and the state remembered for unlocking
///
/// Written as a whole so the pair can never be observed half updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeCycle {
    pub current: u8,
    pub previous: u8,
}

impl LifeCycle {
    pub fn new(initial: u8) -> Self {
        Self {
            current: initial,
            previous: initial,
        }
    }
}

/// Whether `state` is a LOCKED state for an entity of `class`
pub fn is_locked(class: EntityClass, state: u8) -> bool {
    match class {
        EntityClass::IssuerSecurityDomain => state == CARD_LOCKED,
        _ => state & APPLICATION_LOCKED != 0,
    }
}

/// State byte pattern used by the rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePattern {
    Is(u8),
    ApplicationSpecific,
}

impl StatePattern {
    pub fn matches(self, state: u8) -> bool {
        match self {
            StatePattern::Is(expected) => state == expected,
            StatePattern::ApplicationSpecific => is_application_specific(state),
        }
    }
}

/// What a rule does to the life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// From `from` to a state matching the pattern
    To(StatePattern),
    /// From `from` to LOCKED, remembering `from`
    Lock,
    /// From LOCKED back to the remembered state, which must match `from`
    Unlock,
}

/// Who may request a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The caller holds the privilege
    Holds(Privilege),
    /// An associated Security Domain with Authorized or Delegated Management
    ManagingSecurityDomain,
    /// Only the entity itself
    SelfOnly,
    /// Global Lock holder or an associated Security Domain
    LockAuthority,
    /// Lock authority, or the entity itself
    LockAuthorityOrSelf,
}

/// What the registry knows about a caller relative to the target
#[derive(Debug, Clone, Copy)]
pub struct CallerFacts {
    pub privileges: Privileges,
    pub is_target: bool,
    /// The target's association chain reaches the caller
    pub target_associated: bool,
}

impl CallerFacts {
    fn is_associated_security_domain(&self) -> bool {
        !self.is_target
            && self.target_associated
            && self.privileges.has(Privilege::SecurityDomain)
    }
}

impl Authorization {
    pub fn permits(self, caller: &CallerFacts) -> bool {
        match self {
            Authorization::Holds(privilege) => caller.privileges.has(privilege),
            Authorization::ManagingSecurityDomain => {
                caller.is_associated_security_domain()
                    && (caller.privileges.has(Privilege::AuthorizedManagement)
                        || caller.privileges.has(Privilege::DelegatedManagement))
            }
            Authorization::SelfOnly => caller.is_target,
            Authorization::LockAuthority => {
                caller.privileges.has(Privilege::GlobalLock)
                    || caller.is_associated_security_domain()
            }
            Authorization::LockAuthorityOrSelf => {
                Authorization::LockAuthority.permits(caller) || caller.is_target
            }
        }
    }
}

/// One permitted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub class: EntityClass,
    pub from: StatePattern,
    pub movement: Move,
    pub authorization: Authorization,
}

const fn rule(
    class: EntityClass,
    from: StatePattern,
    movement: Move,
    authorization: Authorization,
) -> Rule {
    Rule {
        class,
        from,
        movement,
        authorization,
    }
}

use Authorization::*;
use EntityClass::*;
use StatePattern::*;

/// The transition table
pub const RULES: &[Rule] = &[
    // Card
    rule(IssuerSecurityDomain, Is(CARD_SECURED), Move::Lock, Holds(Privilege::CardLock)),
    rule(IssuerSecurityDomain, Is(CARD_SECURED), Move::Unlock, Holds(Privilege::CardLock)),
    rule(
        IssuerSecurityDomain,
        Is(CARD_SECURED),
        Move::To(Is(CARD_TERMINATED)),
        Holds(Privilege::CardTerminate),
    ),
    rule(
        IssuerSecurityDomain,
        Is(CARD_LOCKED),
        Move::To(Is(CARD_TERMINATED)),
        Holds(Privilege::CardTerminate),
    ),
    // Applications
    rule(
        Application,
        Is(APPLICATION_INSTALLED),
        Move::To(Is(APPLICATION_SELECTABLE)),
        ManagingSecurityDomain,
    ),
    rule(Application, Is(APPLICATION_SELECTABLE), Move::To(ApplicationSpecific), SelfOnly),
    rule(Application, ApplicationSpecific, Move::To(ApplicationSpecific), SelfOnly),
    rule(Application, Is(APPLICATION_INSTALLED), Move::Lock, LockAuthority),
    rule(Application, Is(APPLICATION_SELECTABLE), Move::Lock, LockAuthorityOrSelf),
    rule(Application, ApplicationSpecific, Move::Lock, LockAuthorityOrSelf),
    rule(Application, Is(APPLICATION_INSTALLED), Move::Unlock, LockAuthority),
    rule(Application, Is(APPLICATION_SELECTABLE), Move::Unlock, LockAuthorityOrSelf),
    rule(Application, ApplicationSpecific, Move::Unlock, LockAuthorityOrSelf),
    // Security Domains
    rule(
        SecurityDomain,
        Is(APPLICATION_INSTALLED),
        Move::To(Is(APPLICATION_SELECTABLE)),
        ManagingSecurityDomain,
    ),
    rule(
        SecurityDomain,
        Is(APPLICATION_SELECTABLE),
        Move::To(Is(SECURITY_DOMAIN_PERSONALIZED)),
        SelfOnly,
    ),
    rule(SecurityDomain, Is(APPLICATION_INSTALLED), Move::Lock, LockAuthority),
    rule(SecurityDomain, Is(APPLICATION_SELECTABLE), Move::Lock, LockAuthorityOrSelf),
    rule(SecurityDomain, Is(SECURITY_DOMAIN_PERSONALIZED), Move::Lock, LockAuthority),
    rule(SecurityDomain, Is(APPLICATION_INSTALLED), Move::Unlock, LockAuthority),
    rule(SecurityDomain, Is(APPLICATION_SELECTABLE), Move::Unlock, LockAuthorityOrSelf),
    rule(SecurityDomain, Is(SECURITY_DOMAIN_PERSONALIZED), Move::Unlock, LockAuthority),
];

/// State written when locking from `current`
fn locked_state(class: EntityClass, current: u8) -> u8 {
    match class {
        IssuerSecurityDomain => CARD_LOCKED,
        _ => current | APPLICATION_LOCKED,
    }
}

impl Rule {
    /// The life cycle this rule produces for `requested`, if it applies
    fn apply(&self, class: EntityClass, life: LifeCycle, requested: u8) -> Option<LifeCycle> {
        if self.class != class {
            return None;
        }
        match self.movement {
            Move::To(target) => (self.from.matches(life.current) && target.matches(requested))
                .then_some(LifeCycle {
                    current: requested,
                    previous: life.previous,
                }),
            Move::Lock => {
                let locked = locked_state(class, life.current);
                let asks_lock = requested == locked
                    || (class != IssuerSecurityDomain && requested == APPLICATION_LOCKED);
                (self.from.matches(life.current) && asks_lock).then_some(LifeCycle {
                    current: locked,
                    previous: life.current,
                })
            }
            Move::Unlock => (is_locked(class, life.current)
                && self.from.matches(life.previous)
                && requested == life.previous)
                .then_some(LifeCycle {
                    current: life.previous,
                    previous: life.previous,
                }),
        }
    }
}

/// Find the rule covering `requested` and the life cycle it would produce
pub fn plan(class: EntityClass, life: LifeCycle, requested: u8) -> Option<(&'static Rule, LifeCycle)> {
    RULES
        .iter()
        .find_map(|rule| rule.apply(class, life, requested).map(|next| (rule, next)))
}

impl Registry {
    /// Request a life cycle change of entry `target` on behalf of `caller`
    ///
    /// Returns false, with nothing changed, when the transition is not in
    /// the table or the caller is not allowed to make it.
    pub fn set_state(&mut self, target: usize, caller: usize, requested: u8) -> bool {
        let class = match self.get(target).and_then(|r| r.class()) {
            Some(IssuerSecurityDomain) | None => {
                debug!("setState on entry {} rejected: not an application or security domain", target);
                return false;
            }
            Some(class) => class,
        };
        self.transition(target, caller, class, requested)
    }

    /// Request a card life cycle change on behalf of `caller`
    pub fn set_card_life_cycle_state(&mut self, caller: usize, requested: u8) -> bool {
        self.transition(ISD_INDEX, caller, IssuerSecurityDomain, requested)
    }

    fn transition(&mut self, target: usize, caller: usize, class: EntityClass, requested: u8) -> bool {
        let Some(caller_record) = self.get(caller) else {
            warn!("Life cycle request from unknown entry {}", caller);
            return false;
        };
        let facts = CallerFacts {
            privileges: caller_record.privileges(),
            is_target: caller == target,
            target_associated: self.is_associated(target, &caller_record.aid()),
        };

        let record = self.record(target);
        let life = record.life_cycle();
        debug!(
            "Life cycle request {} {:02X} -> {:02X} by entry {}",
            record.aid(),
            life.current,
            requested,
            caller
        );

        let Some((rule, next)) = plan(class, life, requested) else {
            warn!(
                "No transition {:02X} -> {:02X} for {:?} {}",
                life.current,
                requested,
                class,
                record.aid()
            );
            return false;
        };
        if !rule.authorization.permits(&facts) {
            warn!(
                "Transition {:02X} -> {:02X} of {} refused: {:?} not satisfied by entry {}",
                life.current,
                requested,
                record.aid(),
                rule.authorization,
                caller
            );
            return false;
        }

        self.record_mut(target).commit_life_cycle(next);
        info!(
            "{} life cycle {:02X} -> {:02X}",
            self.record(target).aid(),
            life.current,
            next.current
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::aid::Aid;
    use crate::registry::table::{InstallParams, RegistryLimits};

    fn aid(last: u8) -> Aid {
        Aid::new(&[0xA0, 0x00, 0x00, 0x00, 0x77, last]).unwrap()
    }

    struct Card {
        registry: Registry,
        /// Security Domain with Authorized Management
        sd: usize,
        /// Application associated with `sd`
        app: usize,
        /// Security Domain associated with the ISD, no management privileges
        other_sd: usize,
        /// Application associated with `other_sd`
        stranger: usize,
        /// Application holding Global Lock, associated with the ISD
        locker: usize,
    }

    fn card() -> Card {
        let mut registry = Registry::with_defaults();
        let elf = registry.load_file(aid(0xE0), None).unwrap();
        let em = registry.add_module(elf, aid(0xE1)).unwrap();

        let sd = registry
            .install_instance(
                em,
                InstallParams::new(aid(0x01))
                    .privileges(
                        [Privilege::SecurityDomain, Privilege::AuthorizedManagement]
                            .into_iter()
                            .collect(),
                    )
                    .state(APPLICATION_SELECTABLE),
            )
            .unwrap();
        let other_sd = registry
            .install_instance(
                em,
                InstallParams::new(aid(0x02))
                    .privileges(Privileges::empty().with(Privilege::SecurityDomain))
                    .state(APPLICATION_SELECTABLE),
            )
            .unwrap();
        let app = registry
            .install_instance(em, InstallParams::new(aid(0x03)).parent(aid(0x01)))
            .unwrap();
        let stranger = registry
            .install_instance(em, InstallParams::new(aid(0x04)).parent(aid(0x02)))
            .unwrap();

        let em2 = registry.add_module(elf, aid(0xE2)).unwrap();
        let locker = registry
            .install_instance(
                em2,
                InstallParams::new(aid(0x05))
                    .privileges(Privileges::empty().with(Privilege::GlobalLock))
                    .state(APPLICATION_SELECTABLE),
            )
            .unwrap();

        Card {
            registry,
            sd,
            app,
            other_sd,
            stranger,
            locker,
        }
    }

    fn life(card: &Card, index: usize) -> LifeCycle {
        card.registry.get(index).unwrap().life_cycle()
    }

    #[test]
    fn test_application_specific_range() {
        assert!(is_application_specific(0x0F));
        assert!(is_application_specific(0x7F));
        assert!(!is_application_specific(APPLICATION_SELECTABLE));
        assert!(!is_application_specific(APPLICATION_INSTALLED));
        assert!(!is_application_specific(0x8F));
        assert!(!is_application_specific(0x0B));
    }

    #[test]
    fn test_make_selectable_by_managing_sd() {
        let mut c = card();
        assert!(c.registry.set_state(c.app, c.sd, APPLICATION_SELECTABLE));
        assert_eq!(
            life(&c, c.app),
            LifeCycle {
                current: APPLICATION_SELECTABLE,
                previous: APPLICATION_INSTALLED
            }
        );
    }

    #[test]
    fn test_make_selectable_refused_for_unrelated_caller() {
        let mut c = card();
        // No management privilege and not associated
        assert!(!c.registry.set_state(c.app, c.locker, APPLICATION_SELECTABLE));
        // Security Domain, but not the one the application belongs to
        assert!(!c.registry.set_state(c.app, c.other_sd, APPLICATION_SELECTABLE));
        // Managing privilege, but not associated
        assert!(!c.registry.set_state(c.stranger, c.sd, APPLICATION_SELECTABLE));
        // Not even itself
        assert!(!c.registry.set_state(c.app, c.app, APPLICATION_SELECTABLE));
        assert_eq!(life(&c, c.app).current, APPLICATION_INSTALLED);
    }

    #[test]
    fn test_isd_manages_everything() {
        let mut c = card();
        assert!(c.registry.set_state(c.stranger, ISD_INDEX, APPLICATION_SELECTABLE));
    }

    #[test]
    fn test_application_specific_is_self_only() {
        let mut c = card();
        assert!(c.registry.set_state(c.app, c.sd, APPLICATION_SELECTABLE));

        assert!(!c.registry.set_state(c.app, c.sd, 0x0F));
        assert!(!c.registry.set_state(c.app, ISD_INDEX, 0x0F));
        assert!(c.registry.set_state(c.app, c.app, 0x0F));
        assert!(c.registry.set_state(c.app, c.app, 0x1F));
        assert_eq!(life(&c, c.app).current, 0x1F);

        // Not back to SELECTABLE, not out of range
        assert!(!c.registry.set_state(c.app, c.app, APPLICATION_SELECTABLE));
        assert!(!c.registry.set_state(c.app, c.app, 0x0B));
    }

    #[test]
    fn test_application_specific_needs_selectable() {
        let mut c = card();
        assert!(!c.registry.set_state(c.app, c.app, 0x0F));
        assert_eq!(life(&c, c.app).current, APPLICATION_INSTALLED);
    }

    #[test]
    fn test_lock_unlock_with_global_lock_restores_state() {
        let mut c = card();
        assert!(c.registry.set_state(c.app, c.sd, APPLICATION_SELECTABLE));
        assert!(c.registry.set_state(c.app, c.app, 0x3F));

        assert!(c.registry.set_state(c.app, c.locker, APPLICATION_LOCKED));
        assert_eq!(
            life(&c, c.app),
            LifeCycle {
                current: 0xBF,
                previous: 0x3F
            }
        );

        // Locking twice is not a transition
        assert!(!c.registry.set_state(c.app, c.locker, APPLICATION_LOCKED));

        // Unlock only to the remembered state
        assert!(!c.registry.set_state(c.app, c.locker, APPLICATION_SELECTABLE));
        assert!(c.registry.set_state(c.app, c.locker, 0x3F));
        assert_eq!(life(&c, c.app).current, 0x3F);
    }

    #[test]
    fn test_lock_installed_application() {
        let mut c = card();
        // The application cannot lock itself while only installed
        assert!(!c.registry.set_state(c.app, c.app, APPLICATION_LOCKED));
        // Its Security Domain can
        assert!(c.registry.set_state(c.app, c.sd, APPLICATION_LOCKED));
        assert_eq!(life(&c, c.app).current, APPLICATION_INSTALLED | APPLICATION_LOCKED);
        assert!(!c.registry.set_state(c.app, c.app, APPLICATION_INSTALLED));
        assert!(c.registry.set_state(c.app, c.sd, APPLICATION_INSTALLED));
    }

    #[test]
    fn test_self_lock_when_selectable() {
        let mut c = card();
        assert!(c.registry.set_state(c.locker, c.locker, APPLICATION_SELECTABLE | APPLICATION_LOCKED));
        assert_eq!(life(&c, c.locker).previous, APPLICATION_SELECTABLE);
        // Unrelated Security Domain cannot unlock it
        assert!(!c.registry.set_state(c.locker, c.other_sd, APPLICATION_SELECTABLE));
        assert!(c.registry.set_state(c.locker, ISD_INDEX, APPLICATION_SELECTABLE));
    }

    #[test]
    fn test_security_domain_personalization() {
        let mut c = card();
        assert!(!c.registry.set_state(c.other_sd, ISD_INDEX, SECURITY_DOMAIN_PERSONALIZED));
        assert!(c.registry.set_state(c.other_sd, c.other_sd, SECURITY_DOMAIN_PERSONALIZED));

        // Personalized Security Domains are locked by lock authorities only
        assert!(!c.registry.set_state(c.other_sd, c.other_sd, APPLICATION_LOCKED));
        assert!(c.registry.set_state(c.other_sd, c.locker, APPLICATION_LOCKED));
        assert_eq!(life(&c, c.other_sd).current, 0x8F);
        assert!(c.registry.set_state(c.other_sd, ISD_INDEX, SECURITY_DOMAIN_PERSONALIZED));
        assert_eq!(life(&c, c.other_sd).current, SECURITY_DOMAIN_PERSONALIZED);
    }

    #[test]
    fn test_set_state_rejects_isd_and_load_files() {
        let mut c = card();
        assert!(!c.registry.set_state(ISD_INDEX, ISD_INDEX, APPLICATION_LOCKED));
        let elf = c.registry.find_by_aid(&aid(0xE0)).unwrap();
        assert!(!c.registry.set_state(elf, ISD_INDEX, APPLICATION_LOCKED));
        assert!(!c.registry.set_state(999, ISD_INDEX, APPLICATION_LOCKED));
        assert!(!c.registry.set_state(c.app, 999, APPLICATION_LOCKED));
    }

    #[test]
    fn test_card_lock_requires_card_lock_privilege() {
        let mut c = card();
        assert!(!c.registry.set_card_life_cycle_state(c.locker, CARD_LOCKED));
        assert_eq!(c.registry.card_life_cycle_state(), CARD_SECURED);

        assert!(c.registry.set_card_life_cycle_state(ISD_INDEX, CARD_LOCKED));
        assert_eq!(
            life(&c, ISD_INDEX),
            LifeCycle {
                current: CARD_LOCKED,
                previous: CARD_SECURED
            }
        );
        assert!(c.registry.set_card_life_cycle_state(ISD_INDEX, CARD_SECURED));
        assert_eq!(c.registry.card_life_cycle_state(), CARD_SECURED);
    }

    #[test]
    fn test_card_terminate() {
        let mut c = card();
        let lock_only = {
            let em = c.registry.find_by_aid(&aid(0xE2)).unwrap();
            c.registry
                .install_instance(
                    em,
                    InstallParams::new(aid(0x06))
                        .privileges(Privileges::empty().with(Privilege::CardLock)),
                )
                .unwrap()
        };
        assert!(c.registry.set_card_life_cycle_state(lock_only, CARD_LOCKED));
        assert!(!c.registry.set_card_life_cycle_state(lock_only, CARD_TERMINATED));
        assert!(c.registry.set_card_life_cycle_state(ISD_INDEX, CARD_TERMINATED));

        // Absorbing
        for requested in [CARD_SECURED, CARD_LOCKED, CARD_OP_READY, CARD_INITIALIZED, CARD_TERMINATED] {
            assert!(!c.registry.set_card_life_cycle_state(ISD_INDEX, requested));
        }
        assert_eq!(c.registry.card_life_cycle_state(), CARD_TERMINATED);
    }

    #[test]
    fn test_card_states_not_reachable_through_api() {
        let mut c = card();
        assert!(!c.registry.set_card_life_cycle_state(ISD_INDEX, CARD_OP_READY));
        assert!(!c.registry.set_card_life_cycle_state(ISD_INDEX, CARD_INITIALIZED));

        let mut early = Registry::new(
            RegistryLimits::default(),
            Aid::issuer_security_domain(),
            CARD_INITIALIZED,
        )
        .unwrap();
        assert!(!early.set_card_life_cycle_state(ISD_INDEX, CARD_SECURED));
        assert!(!early.set_card_life_cycle_state(ISD_INDEX, CARD_LOCKED));
    }

    #[test]
    fn test_every_rule_is_reachable_in_plan() {
        for rule in RULES {
            let from = match rule.from {
                Is(state) => state,
                ApplicationSpecific => 0x0F,
            };
            let (life, requested) = match rule.movement {
                Move::To(Is(target)) => (LifeCycle::new(from), target),
                Move::To(ApplicationSpecific) => (LifeCycle::new(from), 0x1F),
                Move::Lock => (LifeCycle::new(from), locked_state(rule.class, from)),
                Move::Unlock => (
                    LifeCycle {
                        current: locked_state(rule.class, from),
                        previous: from,
                    },
                    from,
                ),
            };
            assert!(plan(rule.class, life, requested).is_some(), "{:?}", rule);
        }
    }
}
