//! Per-node dirty bitmask.
//!
//! Every replicable attribute group owns one bit. Mutators set bits, the
//! replication flush reads them to decide which attribute records to write and
//! then clears the whole mask. Node kinds share four private bits
//! ([`KIND_A`](DirtyState::KIND_A) .. [`KIND_D`](DirtyState::KIND_D)) whose
//! meaning is defined by the kind.

use std::ops::{BitOr, BitOrAssign};

/// Set of dirty attribute groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirtyState(u32);

impl DirtyState {
    pub const EMPTY: DirtyState = DirtyState(0);

    /// Node was created (or must be re-created) on the peer.
    pub const CREATE: DirtyState = DirtyState(1 << 0);
    pub const PARENT: DirtyState = DirtyState(1 << 1);
    pub const SIZE: DirtyState = DirtyState(1 << 2);
    pub const POSITION: DirtyState = DirtyState(1 << 3);
    pub const SCALE: DirtyState = DirtyState(1 << 4);
    pub const ROTATION: DirtyState = DirtyState(1 << 5);
    pub const CENTER: DirtyState = DirtyState(1 << 6);
    pub const COLOR: DirtyState = DirtyState(1 << 7);
    pub const OPACITY: DirtyState = DirtyState(1 << 8);
    /// Visible, enabled, transparent and draw-sorted flags.
    pub const FLAGS: DirtyState = DirtyState(1 << 9);
    pub const Z_LEVEL: DirtyState = DirtyState(1 << 10);

    pub const KIND_A: DirtyState = DirtyState(1 << 16);
    pub const KIND_B: DirtyState = DirtyState(1 << 17);
    pub const KIND_C: DirtyState = DirtyState(1 << 18);
    pub const KIND_D: DirtyState = DirtyState(1 << 19);

    /// Every base group (everything except the kind bits).
    pub const BASE: DirtyState = DirtyState(0x0000_07ff);
    /// Every kind bit.
    pub const KIND: DirtyState = DirtyState(0x000f_0000);
    pub const ALL: DirtyState = DirtyState(Self::BASE.0 | Self::KIND.0);

    /// Whether any of the groups in `other` is set.
    pub fn has(self, other: DirtyState) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: DirtyState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DirtyState) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for DirtyState {
    type Output = DirtyState;

    fn bitor(self, rhs: DirtyState) -> DirtyState {
        DirtyState(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyState {
    fn bitor_assign(&mut self, rhs: DirtyState) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_has() {
        let mut dirty = DirtyState::EMPTY;
        assert!(dirty.is_empty());

        dirty.insert(DirtyState::POSITION);
        assert!(dirty.has(DirtyState::POSITION));
        assert!(!dirty.has(DirtyState::SCALE));
        assert!(dirty.has(DirtyState::POSITION | DirtyState::SCALE));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut dirty = DirtyState::POSITION | DirtyState::KIND_B;
        dirty.remove(DirtyState::POSITION);
        assert!(!dirty.has(DirtyState::POSITION));
        assert!(dirty.has(DirtyState::KIND_B));

        dirty.clear();
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_all_covers_every_group() {
        for group in [
            DirtyState::CREATE,
            DirtyState::PARENT,
            DirtyState::SIZE,
            DirtyState::POSITION,
            DirtyState::SCALE,
            DirtyState::ROTATION,
            DirtyState::CENTER,
            DirtyState::COLOR,
            DirtyState::OPACITY,
            DirtyState::FLAGS,
            DirtyState::Z_LEVEL,
            DirtyState::KIND_A,
            DirtyState::KIND_B,
            DirtyState::KIND_C,
            DirtyState::KIND_D,
        ] {
            assert!(DirtyState::ALL.has(group));
        }
        assert!(!DirtyState::BASE.has(DirtyState::KIND));
    }
}
