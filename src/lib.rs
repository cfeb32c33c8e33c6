//! Simulated GlobalPlatform OPEN
//!
//! The card-side registry of a GlobalPlatform card: the entities on the card
//! and their life cycles, privileges, associations and global services,
//! together with a small card session that answers SELECT, SET STATUS and
//! GET STATUS on behalf of the Issuer Security Domain.
//!
//! - [`registry`]: the OPEN registry and the capabilities entities act through
//! - [`apdu`]: ISO/IEC 7816-4 command parsing, responses and status words
//! - [`tlv`]: BER-TLV for command data and response records
//! - [`card`]: card session, ATR and the JSON card profile

pub mod apdu;
pub mod card;
pub mod registry;
pub mod tlv;

pub use card::{CardProfile, CardSession, ProfileStore};
pub use registry::{
    Aid, EntryHandle, EntryRef, LifeCycleAdmin, Privilege, Privileges, Registry, RegistryError,
    RegistryView, ServiceCatalog, ServiceName,
};
