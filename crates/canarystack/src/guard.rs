//! Guarded backing buffer: `[leading sentinel][capacity x slot][trailing sentinel]`.
//!
//! The buffer is one owned, contiguous byte allocation. Higher layers only see
//! slot indices; the sentinel words and their offsets never leave this module.
//! Every guarded allocation in the process is stamped with the same secret,
//! drawn from a random source the first time it is needed.
//!
//! Builds without `canary-protection` lay out zero-width sentinels, so the
//! buffer is exactly `capacity x slot` bytes.

use std::fmt;
use std::mem::size_of;
use std::ops::Range;
use std::sync::OnceLock;

use crate::config::CANARY_PROTECTION;
use crate::error::StackError;

/// Element type stored in the stack.
pub type Element = i32;

/// Reserved value marking unused slots. Diagnostic only: a caller may push
/// it like any other value.
pub const POISON: Element = Element::MAX;

/// Bytes per payload slot.
pub const SLOT_SIZE: usize = size_of::<Element>();

/// Bytes per sentinel word (zero when canary protection is compiled out).
pub const CANARY_SIZE: usize = if CANARY_PROTECTION {
    size_of::<u64>()
} else {
    0
};

/// A sentinel word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Canary(pub u64);

impl Canary {
    /// Value written over sentinels when a stack is destroyed.
    pub const DEAD: Self = Self(0);

    #[must_use]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for Canary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

static SECRET: OnceLock<Canary> = OnceLock::new();

/// Process-wide sentinel secret. Generated once, read-only afterwards.
#[must_use]
pub fn secret() -> Canary {
    *SECRET.get_or_init(|| {
        let raw = rand::random::<u64>();
        // A zero secret would be indistinguishable from a wiped sentinel.
        if raw == 0 {
            Canary(0xDEAD_BEEF_CAFE_BABE)
        } else {
            Canary(raw)
        }
    })
}

/// Total allocation length for `capacity` slots, or `None` on overflow.
#[must_use]
pub fn byte_len_for(capacity: usize) -> Option<usize> {
    capacity
        .checked_mul(SLOT_SIZE)?
        .checked_add(2 * CANARY_SIZE)
}

/// Owned backing storage with sentinels at both ends.
#[derive(Debug)]
pub struct GuardedBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    /// Injected ceiling on the allocation length; growth past it fails.
    pub(crate) allocation_limit: Option<usize>,
}

impl GuardedBuffer {
    /// Allocate room for `capacity` slots, stamp both sentinels with the
    /// process secret, and poison every slot.
    pub fn allocate(capacity: usize) -> Result<Self, StackError> {
        let total = byte_len_for(capacity).ok_or(StackError::OutOfMemory {
            requested_bytes: usize::MAX,
        })?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(total)
            .map_err(|_| StackError::OutOfMemory {
                requested_bytes: total,
            })?;
        bytes.resize(total, 0);

        let mut buffer = Self {
            bytes,
            capacity,
            allocation_limit: None,
        };
        let canary = secret();
        buffer.write_sentinel(Edge::Leading, canary);
        buffer.write_sentinel(Edge::Trailing, canary);
        buffer.poison(0..capacity);
        Ok(buffer)
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exact length of the allocation, sentinels included.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// The whole allocation, sentinels included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Read slot `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Element> {
        let range = self.slot_range(index)?;
        let mut word = [0u8; SLOT_SIZE];
        word.copy_from_slice(self.bytes.get(range)?);
        Some(Element::from_le_bytes(word))
    }

    /// Overwrite slot `index`.
    pub fn set(&mut self, index: usize, value: Element) -> Result<(), StackError> {
        let out_of_bounds = StackError::OutOfBounds {
            size: index,
            capacity: self.capacity,
        };
        let Some(range) = self.slot_range(index) else {
            return Err(out_of_bounds);
        };
        let Some(slot) = self.bytes.get_mut(range) else {
            return Err(out_of_bounds);
        };
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Fill the given slots with [`POISON`]. Indices past capacity are ignored.
    pub fn poison(&mut self, slots: Range<usize>) {
        let end = slots.end.min(self.capacity);
        for index in slots.start..end {
            let _ = self.set(index, POISON);
        }
    }

    /// Leading sentinel as stored, or `None` when sentinels are compiled out.
    #[must_use]
    pub fn leading_sentinel(&self) -> Option<Canary> {
        self.read_sentinel(Edge::Leading)
    }

    /// Trailing sentinel as stored, or `None` when sentinels are compiled out.
    #[must_use]
    pub fn trailing_sentinel(&self) -> Option<Canary> {
        self.read_sentinel(Edge::Trailing)
    }

    /// Move the layout to `new_capacity` slots.
    ///
    /// The trailing sentinel is read out, cleared while the slack bytes are
    /// copied, and written back at the new end. Slots gained by growth are
    /// poisoned. On allocation failure the old layout, sentinel included, is
    /// restored before the error is returned.
    pub fn relocate(&mut self, new_capacity: usize) -> Result<(), StackError> {
        let new_total = byte_len_for(new_capacity).ok_or(StackError::OutOfMemory {
            requested_bytes: usize::MAX,
        })?;
        let old_capacity = self.capacity;
        let trailing = self.read_sentinel(Edge::Trailing);
        self.write_sentinel(Edge::Trailing, Canary::DEAD);

        if new_total > self.bytes.len() {
            let extra = new_total - self.bytes.len();
            let over_limit = self.allocation_limit.is_some_and(|limit| new_total > limit);
            if over_limit || self.bytes.try_reserve_exact(extra).is_err() {
                if let Some(canary) = trailing {
                    self.write_sentinel(Edge::Trailing, canary);
                }
                return Err(StackError::OutOfMemory {
                    requested_bytes: new_total,
                });
            }
        }
        self.bytes.resize(new_total, 0);
        self.bytes.shrink_to_fit();
        self.capacity = new_capacity;

        if let Some(canary) = trailing {
            self.write_sentinel(Edge::Trailing, canary);
        }
        self.poison(old_capacity..new_capacity);
        Ok(())
    }

    /// Destroy-time wipe: every slot poisoned, both sentinels dead.
    pub fn wipe(&mut self) {
        self.poison(0..self.capacity);
        self.write_sentinel(Edge::Leading, Canary::DEAD);
        self.write_sentinel(Edge::Trailing, Canary::DEAD);
    }

    /// Byte range of a sentinel word inside the allocation.
    pub(crate) fn sentinel_range(&self, edge: Edge) -> Option<Range<usize>> {
        if CANARY_SIZE == 0 || self.bytes.len() < 2 * CANARY_SIZE {
            return None;
        }
        Some(match edge {
            Edge::Leading => 0..CANARY_SIZE,
            Edge::Trailing => self.bytes.len() - CANARY_SIZE..self.bytes.len(),
        })
    }

    fn slot_range(&self, index: usize) -> Option<Range<usize>> {
        if index >= self.capacity {
            return None;
        }
        let start = CANARY_SIZE + index * SLOT_SIZE;
        Some(start..start + SLOT_SIZE)
    }

    fn read_sentinel(&self, edge: Edge) -> Option<Canary> {
        let range = self.sentinel_range(edge)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(self.bytes.get(range)?);
        Some(Canary::from_bytes(word))
    }

    fn write_sentinel(&mut self, edge: Edge, canary: Canary) {
        if let Some(range) = self.sentinel_range(edge) {
            self.bytes[range].copy_from_slice(&canary.to_bytes());
        }
    }
}

/// Which end of the buffer a sentinel sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Leading,
    Trailing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_stable_and_nonzero() {
        assert_eq!(secret(), secret());
        assert_ne!(secret(), Canary::DEAD);
    }

    #[test]
    fn allocate_poisons_every_slot() {
        let buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.byte_len(), byte_len_for(8).unwrap());
        for i in 0..8 {
            assert_eq!(buffer.get(i), Some(POISON));
        }
        assert_eq!(buffer.get(8), None);
    }

    #[test]
    fn sentinels_carry_the_secret() {
        let buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        if CANARY_PROTECTION {
            assert_eq!(buffer.leading_sentinel(), Some(secret()));
            assert_eq!(buffer.trailing_sentinel(), Some(secret()));
        } else {
            assert_eq!(buffer.leading_sentinel(), None);
            assert_eq!(buffer.trailing_sentinel(), None);
        }
    }

    #[test]
    fn set_past_capacity_is_rejected() {
        let mut buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        assert!(buffer.set(7, 1).is_ok());
        assert!(matches!(
            buffer.set(8, 1),
            Err(StackError::OutOfBounds { capacity: 8, .. })
        ));
    }

    #[test]
    fn grow_preserves_slots_and_moves_trailing_sentinel() {
        let mut buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        for i in 0..8 {
            buffer.set(i, i as Element * 10).unwrap();
        }
        buffer.relocate(16).expect("grow should succeed");
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.byte_len(), byte_len_for(16).unwrap());
        for i in 0..8 {
            assert_eq!(buffer.get(i), Some(i as Element * 10));
        }
        for i in 8..16 {
            assert_eq!(buffer.get(i), Some(POISON), "slot {i} not poisoned");
        }
        if CANARY_PROTECTION {
            assert_eq!(buffer.trailing_sentinel(), Some(secret()));
            assert_eq!(buffer.leading_sentinel(), Some(secret()));
        }
    }

    #[test]
    fn shrink_keeps_prefix_and_trailing_sentinel() {
        let mut buffer = GuardedBuffer::allocate(32).expect("allocation should succeed");
        for i in 0..4 {
            buffer.set(i, -(i as Element)).unwrap();
        }
        buffer.relocate(8).expect("shrink should succeed");
        assert_eq!(buffer.capacity(), 8);
        for i in 0..4 {
            assert_eq!(buffer.get(i), Some(-(i as Element)));
        }
        if CANARY_PROTECTION {
            assert_eq!(buffer.trailing_sentinel(), Some(secret()));
        }
    }

    #[test]
    fn overflowing_capacity_reports_out_of_memory() {
        let mut buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        let before = buffer.as_bytes().to_vec();
        let err = buffer.relocate(usize::MAX).unwrap_err();
        assert!(matches!(err, StackError::OutOfMemory { .. }));
        assert_eq!(buffer.as_bytes(), before.as_slice());
    }

    #[test]
    fn failed_reservation_restores_trailing_sentinel() {
        let mut buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        let before = buffer.as_bytes().to_vec();
        // Representable but far beyond any address space.
        let err = buffer.relocate(usize::MAX / 8).unwrap_err();
        assert!(matches!(err, StackError::OutOfMemory { .. }));
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.as_bytes(), before.as_slice());
    }

    #[test]
    fn growth_past_allocation_limit_fails_cleanly() {
        let mut buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        buffer.set(3, 42).unwrap();
        let before = buffer.as_bytes().to_vec();
        buffer.allocation_limit = Some(buffer.byte_len());
        let err = buffer.relocate(16).unwrap_err();
        assert!(matches!(err, StackError::OutOfMemory { .. }));
        assert_eq!(buffer.as_bytes(), before.as_slice());
        // Shrinking needs no new memory and ignores the limit.
        buffer.allocation_limit = Some(0);
        assert!(buffer.relocate(8).is_ok());
    }

    #[test]
    fn wipe_kills_sentinels() {
        let mut buffer = GuardedBuffer::allocate(8).expect("allocation should succeed");
        buffer.set(0, 5).unwrap();
        buffer.wipe();
        assert_eq!(buffer.get(0), Some(POISON));
        if CANARY_PROTECTION {
            assert_eq!(buffer.leading_sentinel(), Some(Canary::DEAD));
            assert_eq!(buffer.trailing_sentinel(), Some(Canary::DEAD));
        }
    }
}
