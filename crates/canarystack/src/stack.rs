//! The guarded stack: Init / Push / Pop / Destroy.
//!
//! Every public call verifies integrity first, performs its effect, resizes
//! if needed, re-checks the sentinels, and re-derives the checksums. A
//! detected integrity failure short-circuits the call, is routed to the
//! diagnostic dump (when `diagnostics` is enabled), and is returned.

use crate::checksum::checksum;
use crate::config::{CHECKSUM_PROTECTION, CHECKSUM_SEED, DIAGNOSTICS, MIN_CAPACITY};
use crate::dump::{DumpSink, write_dump};
use crate::error::StackError;
use crate::guard::{Canary, Element, GuardedBuffer, POISON, secret};
use crate::metrics::{StackMetrics, global_metrics};
use crate::origin::Origin;

/// Value written over `size` and `capacity` on destroy.
pub(crate) const WIPED: usize = POISON as usize;

/// Bytes of the control-block image fed to the struct checksum.
const CONTROL_IMAGE_LEN: usize = 8 * 8;

/// Control block of a guarded stack.
///
/// Owns its backing buffer exclusively. Not safe for concurrent mutation;
/// the handle is meant to live on one thread.
#[derive(Debug)]
pub struct GuardStack {
    pub(crate) origin_canary: Canary,
    pub(crate) buffer: GuardedBuffer,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
    pub(crate) allocated_byte_length: usize,
    pub(crate) origin: Origin,
    pub(crate) payload_checksum: u64,
    pub(crate) struct_checksum: u64,
    pub(crate) dump_sink: DumpSink,
    pub(crate) termination_canary: Canary,
}

impl GuardStack {
    /// Create an empty stack with [`MIN_CAPACITY`] poisoned slots.
    ///
    /// Prefer [`guard_stack!`](crate::guard_stack), which records the call site.
    pub fn init(origin: Origin) -> Result<Self, StackError> {
        let buffer = GuardedBuffer::allocate(MIN_CAPACITY).inspect_err(|_| {
            StackMetrics::inc(&global_metrics().out_of_memory);
        })?;
        let canary = secret();
        let allocated_byte_length = buffer.byte_len();
        let mut stack = Self {
            origin_canary: canary,
            buffer,
            size: 0,
            capacity: MIN_CAPACITY,
            allocated_byte_length,
            origin,
            payload_checksum: 0,
            struct_checksum: 0,
            dump_sink: crate::config::default_dump_sink(),
            termination_canary: canary,
        };
        stack.restamp();
        StackMetrics::inc(&global_metrics().stacks_created);
        Ok(stack)
    }

    /// Route automatic dumps of this stack to `sink`.
    #[must_use]
    pub fn with_dump_sink(mut self, sink: DumpSink) -> Self {
        self.dump_sink = sink;
        self
    }

    pub fn set_dump_sink(&mut self, sink: DumpSink) {
        self.dump_sink = sink;
    }

    /// Push `value` on top of the stack.
    #[track_caller]
    pub fn push(&mut self, value: Element) -> Result<(), StackError> {
        let call_site = Origin::caller("push");
        self.guarded(&call_site, |stack| {
            stack.maybe_resize()?;
            stack.buffer.set(stack.size, value)?;
            stack.size += 1;
            stack.verify_sentinels()?;
            stack.restamp();
            StackMetrics::inc(&global_metrics().pushes);
            Ok(())
        })
    }

    /// Remove and return the top value.
    ///
    /// An empty stack yields [`StackError::EmptyPop`]; that is an ordinary
    /// outcome, not corruption. See [`GuardStack::pop_or_poison`] for the
    /// value/error pair form.
    #[track_caller]
    pub fn pop(&mut self) -> Result<Element, StackError> {
        let call_site = Origin::caller("pop");
        self.guarded(&call_site, |stack| {
            if stack.size == 0 {
                StackMetrics::inc(&global_metrics().empty_pops);
                return Err(StackError::EmptyPop);
            }
            let top = stack.size - 1;
            let value = stack.buffer.get(top).ok_or(StackError::OutOfBounds {
                size: stack.size,
                capacity: stack.capacity,
            })?;
            stack.buffer.set(top, POISON)?;
            stack.size = top;

            // Shrinking never needs new memory; keep the state consistent
            // even if the policy reports a failure.
            let resized = stack.maybe_resize();
            stack.verify_sentinels()?;
            stack.restamp();
            resized?;
            StackMetrics::inc(&global_metrics().pops);
            Ok(value)
        })
    }

    /// Pop returning the value/error pair: the value is [`POISON`] whenever
    /// the error is set.
    #[track_caller]
    pub fn pop_or_poison(&mut self) -> (Element, Option<StackError>) {
        match self.pop() {
            Ok(value) => (value, None),
            Err(err) => (POISON, Some(err)),
        }
    }

    /// Verify, wipe, and release the stack.
    ///
    /// Integrity failures are reported (and dumped) but release proceeds.
    #[track_caller]
    pub fn destroy(mut self) -> Result<(), StackError> {
        let call_site = Origin::caller("destroy");
        let verdict = self.counted_verify();
        if let Err(err) = &verdict {
            self.report(&call_site, err);
        }
        self.wipe();
        StackMetrics::inc(&global_metrics().stacks_destroyed);
        drop(self);
        verdict
    }

    /// Run every enabled integrity check and return the first failure.
    ///
    /// Side-effect free; safe to call on a corrupted handle.
    pub fn verify(&self) -> Result<(), StackError> {
        crate::verify::verify(self)
    }

    /// Run every enabled check and return all failures, not just the first.
    #[must_use]
    pub fn inspect(&self) -> crate::verify::IntegrityReport {
        crate::verify::inspect(self)
    }

    /// Write a full diagnostic report to `sink`.
    #[track_caller]
    pub fn dump(
        &self,
        sink: &mut dyn std::io::Write,
        observed: Option<&StackError>,
    ) -> Result<(), StackError> {
        let call_site = Origin::caller("dump");
        write_dump(sink, self, None, &call_site, observed)
    }

    /// Number of live elements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of usable slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exact byte length of the backing allocation, sentinels included.
    #[must_use]
    pub fn allocated_byte_length(&self) -> usize {
        self.allocated_byte_length
    }

    /// Where this stack was created.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Raw slot contents, for diagnostics. Slots at or past `size` hold [`POISON`].
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<Element> {
        self.buffer.get(index)
    }

    pub(crate) fn payload_checksum_now(&self) -> u64 {
        checksum(self.buffer.as_bytes(), CHECKSUM_SEED)
    }

    pub(crate) fn struct_checksum_now(&self) -> u64 {
        checksum(&self.control_image(), CHECKSUM_SEED)
    }

    /// Control block as bytes, with both checksum fields zeroed.
    fn control_image(&self) -> [u8; CONTROL_IMAGE_LEN] {
        let fields: [u64; 8] = [
            self.origin_canary.0,
            self.size as u64,
            self.capacity as u64,
            self.allocated_byte_length as u64,
            self.origin.digest(),
            0,
            0,
            self.termination_canary.0,
        ];
        let mut image = [0u8; CONTROL_IMAGE_LEN];
        for (chunk, field) in image.chunks_exact_mut(8).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        image
    }

    /// Re-derive both checksums from the current state.
    pub(crate) fn restamp(&mut self) {
        if CHECKSUM_PROTECTION {
            self.payload_checksum = self.payload_checksum_now();
            self.struct_checksum = self.struct_checksum_now();
        }
    }

    /// [`GuardStack::verify`] plus the verification and failure counters.
    fn counted_verify(&self) -> Result<(), StackError> {
        StackMetrics::inc(&global_metrics().verifications);
        crate::verify::verify(self).inspect_err(count_failure)
    }

    fn verify_sentinels(&self) -> Result<(), StackError> {
        crate::verify::verify_sentinels(self).inspect_err(count_failure)
    }

    /// Verify, run `op`, and route any corruption it reports to the dump.
    fn guarded<T>(
        &mut self,
        call_site: &Origin,
        op: impl FnOnce(&mut Self) -> Result<T, StackError>,
    ) -> Result<T, StackError> {
        if let Err(err) = self.counted_verify() {
            self.report(call_site, &err);
            return Err(err);
        }
        let out = op(self);
        if let Err(err) = &out {
            if err.is_corruption() {
                self.report(call_site, err);
            }
        }
        out
    }

    /// Record an observed failure and, for corruption, write the automatic dump.
    fn report(&self, call_site: &Origin, err: &StackError) {
        let metrics = global_metrics();
        if !err.is_corruption() {
            return;
        }
        StackMetrics::inc(&metrics.corruption_reports);
        if !DIAGNOSTICS {
            return;
        }
        match self
            .dump_sink
            .emit(|sink| write_dump(sink, self, None, call_site, Some(err)))
        {
            Ok(true) => StackMetrics::inc(&metrics.dumps_written),
            Ok(false) => {}
            Err(_) => StackMetrics::inc(&metrics.dump_failures),
        }
    }

    fn wipe(&mut self) {
        self.buffer.wipe();
        self.size = WIPED;
        self.capacity = WIPED;
        self.origin_canary = Canary::DEAD;
        self.termination_canary = Canary::DEAD;
        self.payload_checksum = 0;
        self.struct_checksum = 0;
    }
}

fn count_failure(err: &StackError) {
    let metrics = global_metrics();
    match err {
        StackError::OutOfBounds { .. } => StackMetrics::inc(&metrics.bounds_failures),
        StackError::DeadSentinel(_) => StackMetrics::inc(&metrics.canary_failures),
        StackError::BadChecksum(_) => StackMetrics::inc(&metrics.checksum_failures),
        _ => {}
    }
}
