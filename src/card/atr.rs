//! ATR (Answer To Reset) handling
//!
//! The historical bytes carry an ISO 7816-4 status indicator whose life
//! cycle status byte follows the card life cycle state.

use crate::registry::state;

/// Build a T=1 ATR with specific historical bytes
pub fn build_atr(historical_bytes: &[u8]) -> Vec<u8> {
    let mut atr = Vec::with_capacity(20);

    // TS - direct convention
    atr.push(0x3B);

    // T0 - TD1 present, K historical bytes (max 15)
    let hist_len = historical_bytes.len().min(15) as u8;
    atr.push(0x80 | hist_len);

    // TD1 - T=1, no more interface bytes
    atr.push(0x01);

    atr.extend_from_slice(&historical_bytes[..hist_len as usize]);

    // TCK - XOR of T0 up to the last historical byte
    let tck: u8 = atr[1..].iter().fold(0u8, |acc, &b| acc ^ b);
    atr.push(tck);

    atr
}

/// ISO 7816-4 life cycle status byte for a card life cycle state
pub fn life_cycle_status(card_state: u8) -> u8 {
    match card_state {
        state::CARD_OP_READY => 0x01,
        state::CARD_INITIALIZED => 0x03,
        state::CARD_SECURED => 0x05,
        state::CARD_LOCKED => 0x04,
        state::CARD_TERMINATED => 0x0C,
        _ => 0x00,
    }
}

/// Offset of the life cycle status byte in a card ATR
pub const LIFE_CYCLE_OFFSET: usize = 3 + 8;

/// ATR of a card in `card_state`
pub fn card_atr(card_state: u8) -> Vec<u8> {
    let historical = [
        0x80, // Category indicator: COMPACT-TLV, status indicator last
        0x31, 0x80, // Card service data: selection by full DF name
        0x73, 0x80, 0x21, 0x40, // Card capabilities
        0x81, // Status indicator, one byte
        life_cycle_status(card_state),
    ];
    build_atr(&historical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_atr() {
        let hist = [0x01, 0x02, 0x03, 0x04];
        let atr = build_atr(&hist);

        assert_eq!(atr[0], 0x3B);
        assert_eq!(atr[1] & 0x0F, 4);
        assert_eq!(&atr[3..7], &hist);
    }

    #[test]
    fn test_atr_checksum() {
        let atr = card_atr(state::CARD_SECURED);
        let calculated_tck: u8 = atr[1..atr.len() - 1].iter().fold(0u8, |acc, &b| acc ^ b);
        assert_eq!(atr[atr.len() - 1], calculated_tck);
    }

    #[test]
    fn test_life_cycle_byte_follows_card_state() {
        let secured = card_atr(state::CARD_SECURED);
        let locked = card_atr(state::CARD_LOCKED);
        assert_eq!(secured[LIFE_CYCLE_OFFSET], 0x05);
        assert_eq!(locked[LIFE_CYCLE_OFFSET], 0x04);
        assert_eq!(card_atr(state::CARD_TERMINATED)[LIFE_CYCLE_OFFSET], 0x0C);
        assert_eq!(secured.len(), locked.len());
        assert_ne!(secured.last(), locked.last());
    }

    #[test]
    fn test_historical_bytes_truncated() {
        let atr = build_atr(&[0xAA; 20]);
        assert_eq!(atr[1], 0x8F);
        assert_eq!(atr.len(), 3 + 15 + 1);
    }
}
