//! Fault injection for tests and demonstrations.
//!
//! Each primitive writes around the sanctioned Push/Pop path, exactly as a
//! stray pointer or an overrun would, and leaves the checksums untouched so
//! the verifier can observe the damage.

use crate::error::SentinelSite;
use crate::guard::{CANARY_SIZE, Edge, SLOT_SIZE};
use crate::stack::GuardStack;

/// Borrowed corruption handle for one stack.
#[derive(Debug)]
pub struct Tamper<'a> {
    stack: &'a mut GuardStack,
}

impl GuardStack {
    /// Obtain the fault-injection handle.
    pub fn tamper(&mut self) -> Tamper<'_> {
        Tamper { stack: self }
    }
}

impl Tamper<'_> {
    /// XOR one byte of a sentinel word with `0xFF`.
    ///
    /// Returns false when sentinels are compiled out or `byte` is past the word.
    pub fn flip_sentinel_byte(&mut self, site: SentinelSite, byte: usize) -> bool {
        if byte >= CANARY_SIZE {
            return false;
        }
        let mask = 0xFFu64 << (8 * byte);
        match site {
            SentinelSite::ControlOrigin => self.stack.origin_canary.0 ^= mask,
            SentinelSite::ControlTermination => self.stack.termination_canary.0 ^= mask,
            SentinelSite::BufferLeading | SentinelSite::BufferTrailing => {
                let edge = if site == SentinelSite::BufferLeading {
                    Edge::Leading
                } else {
                    Edge::Trailing
                };
                let Some(range) = self.stack.buffer.sentinel_range(edge) else {
                    return false;
                };
                self.stack.buffer.as_bytes_mut()[range.start + byte] ^= 0xFF;
            }
        }
        true
    }

    /// XOR one byte of payload slot `index` with `0xFF`.
    ///
    /// Returns false when the slot does not exist.
    pub fn flip_slot_byte(&mut self, index: usize, byte: usize) -> bool {
        if index >= self.stack.buffer.capacity() || byte >= SLOT_SIZE {
            return false;
        }
        let offset = CANARY_SIZE + index * SLOT_SIZE + byte;
        match self.stack.buffer.as_bytes_mut().get_mut(offset) {
            Some(b) => {
                *b ^= 0xFF;
                true
            }
            None => false,
        }
    }

    /// Overwrite the size field.
    pub fn set_size(&mut self, size: usize) {
        self.stack.size = size;
    }

    /// Overwrite the capacity field.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.stack.capacity = capacity;
    }

    /// Overwrite the stored payload checksum.
    pub fn set_payload_checksum(&mut self, value: u64) {
        self.stack.payload_checksum = value;
    }

    /// Make any growth of the buffer past `max_bytes` fail as if the
    /// allocator refused it. `None` lifts the limit.
    pub fn limit_allocation(&mut self, max_bytes: Option<usize>) {
        self.stack.buffer.allocation_limit = max_bytes;
    }
}
