//! Integrity verifier.
//!
//! Checks, in order:
//! 1. `size <= capacity`
//! 2. `capacity >= MIN_CAPACITY` and the buffer matches `capacity` and
//!    `allocated_byte_length`
//! 3. the four boundary sentinels (with `canary-protection`)
//! 4. the payload checksum, then the control-block checksum (with
//!    `checksum-protection`)
//!
//! [`verify`] stops at the first failing check. [`inspect`] runs every check
//! and returns all failures. Neither touches the stack nor the process
//! metrics; callers in `stack` count verdicts.

use std::ops::ControlFlow;

use crate::config::{CANARY_PROTECTION, CHECKSUM_PROTECTION, MIN_CAPACITY};
use crate::error::{ChecksumRegion, SentinelSite, StackError};
use crate::guard::{Canary, secret};
use crate::stack::GuardStack;

/// A single failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    OutOfBounds { size: usize, capacity: usize },
    DeadSentinel(SentinelSite),
    BadChecksum(ChecksumRegion),
}

impl From<Fault> for StackError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::OutOfBounds { size, capacity } => Self::OutOfBounds { size, capacity },
            Fault::DeadSentinel(site) => Self::DeadSentinel(site),
            Fault::BadChecksum(region) => Self::BadChecksum(region),
        }
    }
}

/// Every failing check of one inspection, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub faults: Vec<Fault>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_fine(&self) -> bool {
        self.faults.is_empty()
    }

    /// The verdict [`verify`] would have returned.
    #[must_use]
    pub fn first_failure(&self) -> Option<StackError> {
        self.faults.first().copied().map(StackError::from)
    }

    #[must_use]
    pub fn has_dead_sentinel(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, Fault::DeadSentinel(_)))
    }

    #[must_use]
    pub fn has_bad_checksum(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, Fault::BadChecksum(_)))
    }
}

/// Stored versus expected value of one sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelReading {
    pub site: SentinelSite,
    pub stored: Option<Canary>,
    pub expected: Canary,
}

impl SentinelReading {
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.stored == Some(self.expected)
    }
}

/// Read all four sentinels. Empty when sentinels are compiled out.
#[must_use]
pub fn sentinel_readings(stack: &GuardStack) -> Vec<SentinelReading> {
    if !CANARY_PROTECTION {
        return Vec::new();
    }
    let expected = secret();
    SentinelSite::ALL
        .iter()
        .map(|&site| {
            let stored = match site {
                SentinelSite::ControlOrigin => Some(stack.origin_canary),
                SentinelSite::ControlTermination => Some(stack.termination_canary),
                SentinelSite::BufferLeading => stack.buffer.leading_sentinel(),
                SentinelSite::BufferTrailing => stack.buffer.trailing_sentinel(),
            };
            SentinelReading {
                site,
                stored,
                expected,
            }
        })
        .collect()
}

/// First failing check, or `Ok(())` when every enabled check passes.
pub fn verify(stack: &GuardStack) -> Result<(), StackError> {
    let mut first = None;
    scan(stack, |fault| {
        first = Some(fault);
        ControlFlow::Break(())
    });
    first.map_or(Ok(()), |fault| Err(fault.into()))
}

/// Run every check and collect all failures.
#[must_use]
pub fn inspect(stack: &GuardStack) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    scan(stack, |fault| {
        report.faults.push(fault);
        ControlFlow::Continue(())
    });
    report
}

/// Sentinel checks only; used right after a mutation.
pub(crate) fn verify_sentinels(stack: &GuardStack) -> Result<(), StackError> {
    let mut first = None;
    let _ = scan_sentinels(stack, &mut |fault| {
        first = Some(fault);
        ControlFlow::Break(())
    });
    first.map_or(Ok(()), |fault| Err(fault.into()))
}

fn scan(stack: &GuardStack, mut visit: impl FnMut(Fault) -> ControlFlow<()>) {
    let _ = scan_all(stack, &mut visit);
}

fn scan_all(
    stack: &GuardStack,
    visit: &mut impl FnMut(Fault) -> ControlFlow<()>,
) -> ControlFlow<()> {
    let (size, capacity) = (stack.size, stack.capacity);
    if capacity < size {
        visit(Fault::OutOfBounds { size, capacity })?;
    }
    if capacity < MIN_CAPACITY
        || stack.buffer.capacity() != capacity
        || stack.buffer.byte_len() != stack.allocated_byte_length
    {
        visit(Fault::OutOfBounds { size, capacity })?;
    }
    scan_sentinels(stack, visit)?;
    if CHECKSUM_PROTECTION {
        if stack.payload_checksum != stack.payload_checksum_now() {
            visit(Fault::BadChecksum(ChecksumRegion::Payload))?;
        }
        if stack.struct_checksum != stack.struct_checksum_now() {
            visit(Fault::BadChecksum(ChecksumRegion::Control))?;
        }
    }
    ControlFlow::Continue(())
}

fn scan_sentinels(
    stack: &GuardStack,
    visit: &mut impl FnMut(Fault) -> ControlFlow<()>,
) -> ControlFlow<()> {
    for reading in sentinel_readings(stack) {
        if !reading.is_intact() {
            visit(Fault::DeadSentinel(reading.site))?;
        }
    }
    ControlFlow::Continue(())
}
