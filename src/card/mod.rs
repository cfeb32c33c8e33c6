//! The simulated card
//!
//! A [`CardSession`] owns the registry and answers APDUs on the basic
//! logical channel. The Issuer Security Domain handles SELECT, SET STATUS
//! and GET STATUS; the commands of other applications are not simulated.

pub mod atr;
pub mod profile;
pub mod storage;

pub use atr::{build_atr, card_atr};
pub use profile::{CardProfile, InstanceProfile, LoadFileProfile, ModuleProfile, ProfileError};
pub use storage::ProfileStore;

use log::{debug, info, warn};

use crate::apdu::{hexify, ins, parse_apdu, Response, APDU, SW};
use crate::registry::{state, Aid, EntityClass, EntityKind, EntityRecord, Registry, ISD_INDEX};
use crate::tlv::{tags, TLVBuilder, TLVParser};

/// GET STATUS subsets (P1)
pub mod status_scope {
    pub const ISSUER_SECURITY_DOMAIN: u8 = 0x80;
    pub const APPLICATIONS: u8 = 0x40;
    pub const LOAD_FILES: u8 = 0x20;
    pub const LOAD_FILES_AND_MODULES: u8 = 0x10;
}

/// SET STATUS targets (P1)
pub mod status_target {
    pub const CARD: u8 = 0x80;
    pub const APPLICATION: u8 = 0x40;
}

/// GET STATUS response formats (P2)
pub mod status_format {
    pub const LEGACY: u8 = 0x00;
    pub const TLV: u8 = 0x02;
    /// P2 b1: continue after the last returned record
    pub const NEXT_OCCURRENCE: u8 = 0x01;
}

/// Le assumed when the command carries none
const DEFAULT_LE: usize = 256;

/// Where a truncated GET STATUS resumes
#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusCursor {
    scope: u8,
    format: u8,
    prefix: Vec<u8>,
    next: usize,
}

/// A powered card holding the OPEN registry
pub struct CardSession {
    registry: Registry,
    selected: Option<usize>,
    powered: bool,
    status_cursor: Option<StatusCursor>,
}

impl CardSession {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            selected: None,
            powered: false,
            status_cursor: None,
        }
    }

    pub fn from_profile(profile: &CardProfile) -> Result<Self, ProfileError> {
        Ok(Self::new(profile.build()?))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// ATR for the current card life cycle state
    pub fn atr(&self) -> Vec<u8> {
        card_atr(self.registry.card_life_cycle_state())
    }

    /// Power on the card
    pub fn power_on(&mut self) -> Vec<u8> {
        self.powered = true;
        self.selected = None;
        self.status_cursor = None;
        info!(
            "Card powered on, life cycle {:02X}",
            self.registry.card_life_cycle_state()
        );
        self.atr()
    }

    /// Power off the card
    pub fn power_off(&mut self) {
        self.powered = false;
        self.selected = None;
        self.status_cursor = None;
        info!("Card powered off");
    }

    /// Reset the card
    pub fn reset(&mut self) -> Vec<u8> {
        self.selected = None;
        self.powered = true;
        self.status_cursor = None;
        info!("Card reset");
        self.atr()
    }

    /// Process a raw APDU, returning data followed by SW1 SW2
    pub fn process_apdu(&mut self, apdu_bytes: &[u8]) -> Vec<u8> {
        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED).to_bytes();
        }

        let cmd = match parse_apdu(apdu_bytes) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Failed to parse APDU {}: {}", hexify(apdu_bytes), e);
                return Response::error(SW::WRONG_LENGTH).to_bytes();
            }
        };

        let response = self.transmit(&cmd);
        debug!("Response {}", response);
        response.to_bytes()
    }

    /// Process a parsed command
    pub fn transmit(&mut self, cmd: &APDU) -> Response {
        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={}",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.lc()
        );

        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }
        if cmd.channel() != 0 {
            return Response::error(SW::LOGICAL_CHANNEL_NOT_SUPPORTED);
        }
        if cmd.has_secure_messaging() {
            return Response::error(SW::SECURE_MESSAGING_NOT_SUPPORTED);
        }

        if cmd.ins == ins::SELECT {
            if cmd.p1 == 0x04 {
                return self.handle_select(cmd);
            }
            return Response::error(SW::INCORRECT_P1_P2);
        }

        match self.selected {
            Some(ISD_INDEX) => self.handle_isd_command(cmd),
            Some(_) => Response::error(SW::INS_NOT_SUPPORTED),
            None => Response::error(SW::CONDITIONS_NOT_SATISFIED),
        }
    }

    /// SELECT by DF name: an exact match, else the first selectable
    /// instance whose AID starts with the given bytes
    fn handle_select(&mut self, cmd: &APDU) -> Response {
        self.status_cursor = None;
        let found = if cmd.data.is_empty() {
            Some(ISD_INDEX)
        } else {
            let session: &Self = self;
            let candidates = move || {
                session.registry.iter().filter(move |(index, record)| {
                    record.class().is_some() && session.is_selectable(*index)
                })
            };
            candidates()
                .find(|(_, record)| record.aid() == *cmd.data.as_slice())
                .or_else(|| candidates().find(|(_, record)| record.aid().starts_with(&cmd.data)))
                .map(|(index, _)| index)
        };

        let Some(index) = found else {
            debug!("No selectable application for {}", hexify(&cmd.data));
            return Response::error(SW::FILE_NOT_FOUND);
        };

        self.selected = Some(index);
        let aid = self.registry.record(index).aid();
        info!("Selected {}", aid);
        Response::success(file_control_information(&aid))
    }

    /// The ISD answers always; other instances once SELECTABLE, unlocked,
    /// and while the card itself is usable
    fn is_selectable(&self, index: usize) -> bool {
        if index == ISD_INDEX {
            return true;
        }
        if matches!(
            self.registry.card_life_cycle_state(),
            state::CARD_LOCKED | state::CARD_TERMINATED
        ) {
            return false;
        }
        let Some(record) = self.registry.get(index) else {
            return false;
        };
        let current = record.state();
        let reached_selectable = match record.class() {
            Some(EntityClass::Application) => {
                current == state::APPLICATION_SELECTABLE || state::is_application_specific(current)
            }
            Some(EntityClass::SecurityDomain) => {
                current == state::APPLICATION_SELECTABLE
                    || current == state::SECURITY_DOMAIN_PERSONALIZED
            }
            _ => false,
        };
        reached_selectable && !record.is_locked()
    }

    fn handle_isd_command(&mut self, cmd: &APDU) -> Response {
        if !cmd.is_proprietary() {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }
        match cmd.ins {
            ins::SET_STATUS => self.handle_set_status(cmd),
            ins::GET_STATUS => self.handle_get_status(cmd),
            _ => Response::error(SW::INS_NOT_SUPPORTED),
        }
    }

    /// SET STATUS, on behalf of the Issuer Security Domain
    fn handle_set_status(&mut self, cmd: &APDU) -> Response {
        let changed = match cmd.p1 {
            status_target::CARD => self.registry.set_card_life_cycle_state(ISD_INDEX, cmd.p2),
            status_target::APPLICATION => {
                let aid = match Aid::new(&cmd.data) {
                    Ok(aid) => aid,
                    Err(e) => return e.into(),
                };
                let Some(target) = self.registry.find_by_aid(&aid) else {
                    return Response::error(SW::REFERENCED_DATA_NOT_FOUND);
                };
                self.registry.set_state(target, ISD_INDEX, cmd.p2)
            }
            _ => return Response::error(SW::INCORRECT_P1_P2),
        };

        if changed {
            Response::ok()
        } else {
            Response::error(SW::CONDITIONS_NOT_SATISFIED)
        }
    }

    /// GET STATUS, legacy (P2 0x00) or TLV (P2 0x02) records
    ///
    /// Whole records are returned up to Le. When more remain the answer is
    /// 6310, and the same command with P2 b1 set continues the listing.
    fn handle_get_status(&mut self, cmd: &APDU) -> Response {
        let format = match cmd.p2 & !status_format::NEXT_OCCURRENCE {
            status_format::LEGACY => status_format::LEGACY,
            status_format::TLV => status_format::TLV,
            _ => return Response::error(SW::INCORRECT_P1_P2),
        };
        let Some(wanted) = status_filter(cmd.p1) else {
            return Response::error(SW::INCORRECT_P1_P2);
        };

        let cursor = if cmd.p2 & status_format::NEXT_OCCURRENCE != 0 {
            match self.status_cursor.take() {
                Some(cursor) if cursor.scope == cmd.p1 && cursor.format == format => cursor,
                _ => {
                    debug!("GET STATUS next occurrence without a matching first call");
                    return Response::error(SW::CONDITIONS_NOT_SATISFIED);
                }
            }
        } else {
            self.status_cursor = None;
            // Missing or empty 4F matches every AID
            let prefix = match TLVParser::find(&cmd.data, tags::AID) {
                Ok(prefix) => prefix.unwrap_or_default(),
                Err(e) => {
                    debug!("Bad GET STATUS search criteria: {}", e);
                    return Response::error(SW::WRONG_DATA);
                }
            };
            StatusCursor {
                scope: cmd.p1,
                format,
                prefix,
                next: 0,
            }
        };
        let with_modules = cmd.p1 == status_scope::LOAD_FILES_AND_MODULES;
        let limit = cmd.le.map_or(DEFAULT_LE, |le| le as usize);

        let mut data = Vec::new();
        let mut resume = None;
        for (index, record) in self
            .registry
            .iter()
            .skip(cursor.next)
            .filter(|(_, r)| wanted(r) && r.aid().starts_with(&cursor.prefix))
        {
            let encoded = if format == status_format::TLV {
                self.tlv_status_record(record, with_modules)
            } else {
                self.legacy_status_record(record, with_modules)
            };
            if data.len() + encoded.len() > limit {
                resume = Some(index);
                break;
            }
            data.extend(encoded);
        }

        match resume {
            // Not even one record fits
            Some(_) if data.is_empty() => Response::error(SW::WRONG_LENGTH),
            Some(next) => {
                debug!("GET STATUS truncated at {} bytes, resuming at entry {}", data.len(), next);
                self.status_cursor = Some(StatusCursor { next, ..cursor });
                Response::new(data, SW::MORE_DATA_AVAILABLE)
            }
            None if data.is_empty() => Response::error(SW::REFERENCED_DATA_NOT_FOUND),
            None => Response::success(data),
        }
    }

    fn module_aids<'a>(&'a self, record: &'a EntityRecord) -> impl Iterator<Item = Aid> + 'a {
        let modules: &[usize] = match record.kind() {
            EntityKind::ExecutableLoadFile { modules } => modules,
            _ => &[],
        };
        modules.iter().map(|module| self.registry.record(*module).aid())
    }

    /// AID length, AID, state, first privilege byte; then module count and
    /// modules for load files
    fn legacy_status_record(&self, record: &EntityRecord, with_modules: bool) -> Vec<u8> {
        let mut out = Vec::new();
        push_lv(&mut out, record.aid().as_bytes());
        out.push(record.state());
        out.push(record.legacy_privilege_byte());
        if with_modules {
            let modules: Vec<Aid> = self.module_aids(record).collect();
            out.push(modules.len() as u8);
            for module in modules {
                push_lv(&mut out, module.as_bytes());
            }
        }
        out
    }

    /// E3 { 4F, 9F70, C5, C4, 84.., CC }
    fn tlv_status_record(&self, record: &EntityRecord, with_modules: bool) -> Vec<u8> {
        let load_file = match record.kind() {
            EntityKind::Instance {
                module: Some(module),
                ..
            } => match self.registry.record(*module).kind() {
                EntityKind::ExecutableModule { load_file, .. } => {
                    Some(self.registry.record(*load_file).aid())
                }
                _ => None,
            },
            _ => None,
        };
        let privileges = record.class().map(|_| record.privileges());

        let mut builder = TLVBuilder::new()
            .add(tags::AID, record.aid().as_bytes())
            .add(tags::LIFE_CYCLE_STATE, &[record.state()])
            .add_opt(tags::PRIVILEGES, privileges.as_ref().map(|p| &p.as_bytes()[..]))
            .add_opt(tags::LOAD_FILE_AID, load_file.as_ref().map(Aid::as_bytes));
        if with_modules {
            for module in self.module_aids(record) {
                builder = builder.add(tags::DF_NAME, module.as_bytes());
            }
        }
        builder
            .add(tags::ASSOCIATED_SECURITY_DOMAIN, record.parent().as_bytes())
            .wrap(tags::REGISTRY_DATA)
            .build()
    }
}

/// Records reported for a GET STATUS subset (P1)
fn status_filter(scope: u8) -> Option<fn(&EntityRecord) -> bool> {
    let wanted: fn(&EntityRecord) -> bool = match scope {
        status_scope::ISSUER_SECURITY_DOMAIN => {
            |r| r.class() == Some(EntityClass::IssuerSecurityDomain)
        }
        status_scope::APPLICATIONS => |r| {
            matches!(
                r.class(),
                Some(EntityClass::Application | EntityClass::SecurityDomain)
            )
        },
        status_scope::LOAD_FILES | status_scope::LOAD_FILES_AND_MODULES => {
            |r| matches!(r.kind(), EntityKind::ExecutableLoadFile { .. })
        }
        _ => return None,
    };
    Some(wanted)
}

fn push_lv(out: &mut Vec<u8>, value: &[u8]) {
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// Minimal FCI template: 6F { 84 AID }
fn file_control_information(aid: &Aid) -> Vec<u8> {
    TLVBuilder::new()
        .add(tags::DF_NAME, aid.as_bytes())
        .wrap(tags::FCI)
        .build()
}

impl Default for CardSession {
    fn default() -> Self {
        Self::new(Registry::with_defaults())
    }
}
