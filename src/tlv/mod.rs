//! BER-TLV encoding and decoding
//!
//! Just enough of ISO/IEC 7816-4 BER-TLV for GlobalPlatform card content
//! management: search criteria in command data, FCI templates and GET
//! STATUS records in responses.

mod encoder;
mod parser;

pub use encoder::{TLVBuilder, TLVEncoder};
pub use parser::{TLVError, TLVParser, TLV};

/// GlobalPlatform tags
pub mod tags {
    /// Application or file AID, also the GET STATUS search criterion
    pub const AID: u32 = 0x4F;
    /// File Control Information template
    pub const FCI: u32 = 0x6F;
    /// DF name in an FCI; Executable Module AID in a GET STATUS record
    pub const DF_NAME: u32 = 0x84;
    /// GlobalPlatform Registry related data (one GET STATUS record)
    pub const REGISTRY_DATA: u32 = 0xE3;
    pub const LIFE_CYCLE_STATE: u32 = 0x9F70;
    pub const PRIVILEGES: u32 = 0xC5;
    pub const LOAD_FILE_AID: u32 = 0xC4;
    pub const ASSOCIATED_SECURITY_DOMAIN: u32 = 0xCC;
}
