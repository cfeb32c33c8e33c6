//! The GlobalPlatform OPEN registry
//!
//! Records for every Executable Load File, Executable Module, Application
//! and Security Domain on the card, the life cycle rules between their
//! states, their privileges, association chains and global services.

pub mod aid;
mod association;
pub mod entry;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod privileges;
pub mod services;
pub mod table;

pub use aid::Aid;
pub use entry::{EntityKind, EntityRecord};
pub use error::RegistryError;
pub use handle::{EntryHandle, EntryRef, LifeCycleAdmin, RegistryView, ServiceCatalog};
pub use lifecycle::{state, EntityClass, LifeCycle};
pub use privileges::{Privilege, Privileges};
pub use services::{ServiceHandle, ServiceName, UniqueServiceTable};
pub use table::{InstallParams, Registry, RegistryLimits, ISD_INDEX};
