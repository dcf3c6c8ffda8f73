//! Capacity policy: double when full, quarter when usage falls to a quarter.
//!
//! - Grow: `size == capacity` -> `capacity * GROW_FACTOR`.
//! - Shrink: `capacity > MIN_CAPACITY && size <= capacity / GROW_FACTOR^2`
//!   -> `capacity / GROW_FACTOR^2`, clamped to `MIN_CAPACITY`.
//! - Otherwise capacity is left alone.

use crate::config::{GROW_FACTOR, MIN_CAPACITY};
use crate::error::StackError;
use crate::metrics::{StackMetrics, global_metrics};
use crate::stack::GuardStack;

/// Decision taken by the resize policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    Keep,
    Grow(usize),
    Shrink(usize),
}

impl ResizePlan {
    /// Decide the new capacity for a stack holding `size` of `capacity` slots.
    #[must_use]
    pub fn for_usage(size: usize, capacity: usize) -> Self {
        if size == capacity {
            return Self::Grow(capacity.saturating_mul(GROW_FACTOR));
        }
        let quarter = capacity / (GROW_FACTOR * GROW_FACTOR);
        if capacity > MIN_CAPACITY && size <= quarter {
            return Self::Shrink(quarter.max(MIN_CAPACITY));
        }
        Self::Keep
    }

    #[must_use]
    pub fn target(self) -> Option<usize> {
        match self {
            Self::Keep => None,
            Self::Grow(cap) | Self::Shrink(cap) => Some(cap),
        }
    }
}

impl GuardStack {
    /// Apply the resize policy to the current size.
    ///
    /// On failure the stack keeps its pre-resize layout and stays valid.
    /// Checksums are left for the caller to re-derive.
    pub(crate) fn maybe_resize(&mut self) -> Result<ResizePlan, StackError> {
        let plan = ResizePlan::for_usage(self.size, self.capacity);
        let Some(new_capacity) = plan.target() else {
            return Ok(plan);
        };

        let metrics = global_metrics();
        self.buffer.relocate(new_capacity).inspect_err(|_| {
            StackMetrics::inc(&metrics.out_of_memory);
        })?;
        self.buffer.poison(self.size..new_capacity);
        self.capacity = new_capacity;
        self.allocated_byte_length = self.buffer.byte_len();

        match plan {
            ResizePlan::Grow(_) => StackMetrics::inc(&metrics.grows),
            ResizePlan::Shrink(_) => StackMetrics::inc(&metrics.shrinks),
            ResizePlan::Keep => {}
        }
        Ok(plan)
    }
}
