//! ISO/IEC 7816-4 status words used by the OPEN and the card session

/// Status word constants
pub struct SW;

impl SW {
    pub const SUCCESS: u16 = 0x9000;

    // Warnings, non-volatile memory unchanged
    pub const MORE_DATA_AVAILABLE: u16 = 0x6310;

    // Execution errors, non-volatile memory may have changed
    pub const MEMORY_FAILURE: u16 = 0x6581;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;
    pub const LOGICAL_CHANNEL_NOT_SUPPORTED: u16 = 0x6881;
    pub const SECURE_MESSAGING_NOT_SUPPORTED: u16 = 0x6882;
    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const NOT_ENOUGH_MEMORY: u16 = 0x6A84;
    pub const INCORRECT_P1_P2: u16 = 0x6A86;
    pub const REFERENCED_DATA_NOT_FOUND: u16 = 0x6A88;
    pub const DF_NAME_ALREADY_EXISTS: u16 = 0x6A8A;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    /// 9000, or 61xx with more data available
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS || sw >> 8 == 0x61
    }

    /// Short description for logs and tooling
    pub fn describe(sw: u16) -> &'static str {
        match sw {
            Self::SUCCESS => "success",
            Self::MORE_DATA_AVAILABLE => "more records available",
            Self::MEMORY_FAILURE => "memory failure",
            Self::WRONG_LENGTH => "wrong length",
            Self::LOGICAL_CHANNEL_NOT_SUPPORTED => "logical channel not supported",
            Self::SECURE_MESSAGING_NOT_SUPPORTED => "secure messaging not supported",
            Self::SECURITY_STATUS_NOT_SATISFIED => "security status not satisfied",
            Self::CONDITIONS_NOT_SATISFIED => "conditions of use not satisfied",
            Self::WRONG_DATA => "incorrect data",
            Self::FILE_NOT_FOUND => "application not found",
            Self::NOT_ENOUGH_MEMORY => "not enough memory",
            Self::INCORRECT_P1_P2 => "incorrect P1 P2",
            Self::REFERENCED_DATA_NOT_FOUND => "referenced data not found",
            Self::DF_NAME_ALREADY_EXISTS => "AID already registered",
            Self::INS_NOT_SUPPORTED => "instruction not supported",
            Self::CLA_NOT_SUPPORTED => "class not supported",
            sw if sw >> 8 == 0x61 => "more data available",
            sw if matches!(sw >> 8, 0x64 | 0x65) => "execution error",
            _ => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        assert!(SW::is_success(0x9000));
        assert!(SW::is_success(0x6110));
        assert!(!SW::is_success(SW::SECURITY_STATUS_NOT_SATISFIED));
    }

    #[test]
    fn test_describe() {
        assert_eq!(SW::describe(SW::MEMORY_FAILURE), "memory failure");
        assert_eq!(SW::describe(0x6110), "more data available");
        assert_eq!(SW::describe(SW::MORE_DATA_AVAILABLE), "more records available");
        assert_eq!(SW::describe(0x6400), "execution error");
        assert_eq!(SW::describe(0x1234), "unknown");
    }
}
