//! The byte accompanying every sync update, matching the wire layout exactly.

use crate::error::SyncError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFlags: u8 {
        const FULL_STATE      = 0x01;
        const NO_CHAIN        = 0x40;
        const PACEMAKER_PULSE = 0x80;
    }
}

impl SyncFlags {
    /// Any bit outside the three named ones is a protocol violation, not
    /// a silently-ignored extension point.
    pub fn validate(bits: u8) -> Result<Self, SyncError> {
        SyncFlags::from_bits(bits)
            .ok_or_else(|| SyncError::IllegalMessage(format!("reserved SyncFlags bits set: {bits:#04x}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_bits_round_trip() {
        let flags = SyncFlags::FULL_STATE | SyncFlags::PACEMAKER_PULSE;
        assert_eq!(SyncFlags::validate(flags.bits()).unwrap(), flags);
    }

    #[test]
    fn reserved_bit_is_rejected() {
        assert!(SyncFlags::validate(0b0010_0000).is_err());
    }
}
