//! Card profile
//!
//! The manufacturing state of a card as JSON: registry limits, the Issuer
//! Security Domain and the load files, modules and instances to install.
//! AIDs are stored base64 encoded, privileges by name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{
    state, Aid, InstallParams, Privilege, Registry, RegistryError, RegistryLimits, ServiceName,
};

/// Errors reading or applying a profile
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed profile: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Profile rejected by the registry: {0}")]
    Registry(#[from] RegistryError),
}

/// Serde helpers storing an AID as a base64 string
mod base64_aid {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::registry::Aid;

    pub fn serialize<S>(aid: &Aid, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(aid.as_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Aid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        Aid::new(&bytes).map_err(serde::de::Error::custom)
    }

    /// Optional AIDs; an empty string means none
    pub mod option {
        use super::*;

        pub fn serialize<S>(aid: &Option<Aid>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match aid {
                Some(aid) => super::serialize(aid, serializer),
                None => serializer.serialize_str(""),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Aid>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s: String = Deserialize::deserialize(deserializer)?;
            if s.is_empty() {
                return Ok(None);
            }
            let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
            Aid::new(&bytes).map(Some).map_err(serde::de::Error::custom)
        }
    }
}

fn installed() -> u8 {
    state::APPLICATION_INSTALLED
}

/// An Application or Security Domain to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceProfile {
    #[serde(with = "base64_aid")]
    pub aid: Aid,
    #[serde(default)]
    pub privileges: Vec<Privilege>,
    /// Associated Security Domain; the ISD when empty
    #[serde(default, with = "base64_aid::option")]
    pub security_domain: Option<Aid>,
    #[serde(default)]
    pub services: Vec<ServiceName>,
    #[serde(default = "installed")]
    pub state: u8,
}

impl InstanceProfile {
    fn install_params(&self) -> InstallParams {
        let params = InstallParams::new(self.aid)
            .privileges(self.privileges.iter().copied().collect())
            .services(self.services.clone())
            .state(self.state);
        match self.security_domain {
            Some(sd) => params.parent(sd),
            None => params,
        }
    }
}

/// An Executable Module and the instances created from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProfile {
    #[serde(with = "base64_aid")]
    pub aid: Aid,
    #[serde(default)]
    pub instances: Vec<InstanceProfile>,
}

/// An Executable Load File and its modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFileProfile {
    #[serde(with = "base64_aid")]
    pub aid: Aid,
    #[serde(default, with = "base64_aid::option")]
    pub security_domain: Option<Aid>,
    #[serde(default)]
    pub modules: Vec<ModuleProfile>,
}

/// A complete card profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardProfile {
    pub limits: RegistryLimits,
    #[serde(with = "base64_aid")]
    pub isd_aid: Aid,
    pub card_state: u8,
    /// Installed in order; a Security Domain must come before anything
    /// associated with it
    pub load_files: Vec<LoadFileProfile>,
}

impl Default for CardProfile {
    fn default() -> Self {
        Self {
            limits: RegistryLimits::default(),
            isd_aid: Aid::issuer_security_domain(),
            card_state: state::CARD_SECURED,
            load_files: Vec::new(),
        }
    }
}

impl CardProfile {
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Create the registry this profile describes
    pub fn build(&self) -> Result<Registry, ProfileError> {
        let mut registry = Registry::new(self.limits, self.isd_aid, self.card_state)?;
        for file in &self.load_files {
            let elf = registry.load_file(file.aid, file.security_domain)?;
            for module in &file.modules {
                let em = registry.add_module(elf, module.aid)?;
                for instance in &module.instances {
                    registry.install_instance(em, instance.install_params())?;
                }
            }
        }
        Ok(registry)
    }

    /// A small demonstration card: a supplementary Security Domain with
    /// Authorized Management, a service provider and a locking application
    pub fn sample() -> Self {
        let aid = |tail: &[u8]| {
            let mut bytes = vec![0xA0, 0x00, 0x00, 0x00, 0x62];
            bytes.extend_from_slice(tail);
            Aid::new(&bytes).unwrap_or_else(|_| Aid::issuer_security_domain())
        };
        let sd = aid(&[0x53, 0x44]);

        Self {
            load_files: vec![
                LoadFileProfile {
                    aid: aid(&[0x01]),
                    security_domain: None,
                    modules: vec![ModuleProfile {
                        aid: aid(&[0x01, 0x01]),
                        instances: vec![InstanceProfile {
                            aid: sd,
                            privileges: vec![
                                Privilege::SecurityDomain,
                                Privilege::AuthorizedManagement,
                            ],
                            security_domain: None,
                            services: Vec::new(),
                            state: state::APPLICATION_SELECTABLE,
                        }],
                    }],
                },
                LoadFileProfile {
                    aid: aid(&[0x02]),
                    security_domain: Some(sd),
                    modules: vec![ModuleProfile {
                        aid: aid(&[0x02, 0x01]),
                        instances: vec![
                            InstanceProfile {
                                aid: aid(&[0x02, 0x01, 0x01]),
                                privileges: vec![Privilege::GlobalService],
                                security_domain: Some(sd),
                                services: vec![
                                    ServiceName::from_parts(0x81, 0x01),
                                    ServiceName::family_wide(0x82),
                                ],
                                state: state::APPLICATION_SELECTABLE,
                            },
                            InstanceProfile {
                                aid: aid(&[0x02, 0x01, 0x02]),
                                privileges: vec![Privilege::GlobalLock],
                                security_domain: None,
                                services: Vec::new(),
                                state: state::APPLICATION_INSTALLED,
                            },
                        ],
                    }],
                },
            ],
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EntityClass, ISD_INDEX};

    #[test]
    fn test_default_builds_isd_only() {
        let registry = CardProfile::default().build().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.card_life_cycle_state(), state::CARD_SECURED);
        assert_eq!(registry.get(ISD_INDEX).unwrap().aid(), Aid::issuer_security_domain());
    }

    #[test]
    fn test_sample_builds() {
        let registry = CardProfile::sample().build().unwrap();
        // ISD + 2 load files + 2 modules + 3 instances
        assert_eq!(registry.len(), 8);

        let sd = registry
            .iter()
            .find(|(_, r)| r.class() == Some(EntityClass::SecurityDomain))
            .map(|(index, _)| index)
            .unwrap();
        let sd_aid = registry.get(sd).unwrap().aid();
        let provider = registry
            .iter()
            .find(|(_, r)| r.holds(Privilege::GlobalService) && !r.is_security_domain())
            .map(|(index, _)| index)
            .unwrap();
        assert!(registry.is_associated(provider, &sd_aid));
    }

    #[test]
    fn test_json_layout() {
        let json = r#"{
            "card_state": 15,
            "load_files": [{
                "aid": "oAAAAGIB",
                "modules": [{
                    "aid": "oAAAAGIBAQ==",
                    "instances": [{
                        "aid": "oAAAAGIBAQE=",
                        "privileges": ["global_service", "card_lock"],
                        "services": [33025],
                        "state": 7
                    }]
                }]
            }]
        }"#;
        let profile = CardProfile::from_json(json).unwrap();
        assert_eq!(profile.isd_aid, Aid::issuer_security_domain());
        assert_eq!(profile.limits, RegistryLimits::default());

        let instance = &profile.load_files[0].modules[0].instances[0];
        assert_eq!(instance.aid.as_bytes(), &[0xA0, 0x00, 0x00, 0x00, 0x62, 0x01, 0x01, 0x01]);
        assert_eq!(instance.privileges, vec![Privilege::GlobalService, Privilege::CardLock]);
        assert_eq!(instance.services, vec![ServiceName::from_parts(0x81, 0x01)]);
        assert_eq!(instance.security_domain, None);

        let registry = profile.build().unwrap();
        let index = registry.find_by_aid(&instance.aid).unwrap();
        assert_eq!(registry.get(index).unwrap().state(), state::APPLICATION_SELECTABLE);
    }

    #[test]
    fn test_round_trip() {
        let profile = CardProfile::sample();
        let json = profile.to_json().unwrap();
        assert_eq!(CardProfile::from_json(&json).unwrap(), profile);
    }

    #[test]
    fn test_rejects_bad_values() {
        // Short AID
        let json = r#"{ "isd_aid": "oAAA" }"#;
        assert!(matches!(CardProfile::from_json(json), Err(ProfileError::Json(_))));

        // The empty service slot marker is not a name
        let json = r#"{ "load_files": [{ "aid": "oAAAAGIB", "modules": [{
            "aid": "oAAAAGIBAQ==", "instances": [{ "aid": "oAAAAGIBAQE=", "services": [65535] }]
        }]}]}"#;
        assert!(matches!(CardProfile::from_json(json), Err(ProfileError::Json(_))));

        // Not a card state
        let profile = CardProfile {
            card_state: 0x42,
            ..Default::default()
        };
        assert!(matches!(
            profile.build(),
            Err(ProfileError::Registry(RegistryError::InvalidLifeCycleState(0x42)))
        ));
    }
}
