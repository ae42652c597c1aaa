//! UDP time-sync broadcast packet (spec §6). The broadcast socket loop
//! itself is an external collaborator (spec §1); this is the wire shape a
//! receiver would deserialize and the clock-offset writer would apply to
//! `kharon_core::TimeBase`.

use bitflags::bitflags;

bitflags! {
    /// Command bits carried in a sync broadcast. Multiple bits may be set
    /// on the same packet (e.g. `TIME | CONTINUE`).
    pub struct SyncFlags: u8 {
        const PAUSE     = 0b0000_0001;
        const CONTINUE  = 0b0000_0010;
        const START_ACQ = 0b0000_0100;
        const STOP_ACQ  = 0b0000_1000;
        const TIME      = 0b0001_0000;
        const EXIT      = 0b0010_0000;
    }
}

/// A broadcast sync packet: command bits plus a text timestamp receivers
/// use to derive their clock offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPacket {
    pub flags: SyncFlags,
    /// Seconds since epoch, as sent by the time-keeper.
    pub timestamp: f64,
}

impl SyncPacket {
    pub fn time_ping(timestamp: f64) -> Self {
        SyncPacket {
            flags: SyncFlags::TIME,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let f = SyncFlags::TIME | SyncFlags::CONTINUE;
        assert!(f.contains(SyncFlags::TIME));
        assert!(f.contains(SyncFlags::CONTINUE));
        assert!(!f.contains(SyncFlags::EXIT));
    }
}
