//! Harness runs: scenario, corruption demos, and seeded stress.
//!
//! Every run logs one JSONL line per observable step through a
//! [`LogEmitter`]. Stack errors propagate to the caller unchanged so the
//! binary can apply the abort policy.

use std::path::PathBuf;
use std::time::Instant;

use canarystack::config::{CANARY_PROTECTION, CHECKSUM_PROTECTION, MIN_CAPACITY};
use canarystack::{
    DumpSink, GuardStack, IntegrityReport, POISON, SentinelSite, StackError, guard_stack,
};

use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, StackOp, artifact_ref};

/// Values pushed by the scenario run.
const SCENARIO_VALUES: std::ops::Range<i32> = 0..10;

/// Stress runs do a full verify + poison sweep this often.
const FULL_CHECK_EVERY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invariant violated at step {step}: {detail}")]
    Invariant { step: usize, detail: String },
}

impl HarnessError {
    /// Whether the binary must abort instead of exiting normally.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Stack(err) if err.is_fatal())
    }
}

/// Fault injected by the `corrupt` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CorruptTarget {
    BufferLeading,
    BufferTrailing,
    ControlOrigin,
    ControlTermination,
    Payload,
    Size,
}

impl CorruptTarget {
    pub const ALL: [Self; 6] = [
        Self::BufferLeading,
        Self::BufferTrailing,
        Self::ControlOrigin,
        Self::ControlTermination,
        Self::Payload,
        Self::Size,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BufferLeading => "buffer-leading",
            Self::BufferTrailing => "buffer-trailing",
            Self::ControlOrigin => "control-origin",
            Self::ControlTermination => "control-termination",
            Self::Payload => "payload",
            Self::Size => "size",
        }
    }

    fn sentinel(self) -> Option<SentinelSite> {
        match self {
            Self::BufferLeading => Some(SentinelSite::BufferLeading),
            Self::BufferTrailing => Some(SentinelSite::BufferTrailing),
            Self::ControlOrigin => Some(SentinelSite::ControlOrigin),
            Self::ControlTermination => Some(SentinelSite::ControlTermination),
            Self::Payload | Self::Size => None,
        }
    }

    /// Whether this build has a check that catches the fault.
    #[must_use]
    pub fn detectable(self) -> bool {
        match self {
            Self::Payload => CHECKSUM_PROTECTION,
            Self::Size => true,
            _ => CANARY_PROTECTION,
        }
    }

    /// Inject the fault. Returns false when the target does not exist in this build.
    pub fn apply(self, stack: &mut GuardStack) -> bool {
        if let Some(site) = self.sentinel() {
            return stack.tamper().flip_sentinel_byte(site, 0);
        }
        match self {
            Self::Payload => stack.tamper().flip_slot_byte(0, 0),
            _ => {
                let past_end = stack.capacity() + 3;
                stack.tamper().set_size(past_end);
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSummary {
    pub pushes: usize,
    pub pops: usize,
    pub peak_capacity: usize,
    pub final_capacity: usize,
}

#[derive(Debug)]
pub struct CorruptReport {
    pub target: CorruptTarget,
    pub applied: bool,
    /// Error returned by the first operation after the fault.
    pub observed: Option<StackError>,
    /// Every failing check right after the fault.
    pub integrity: IntegrityReport,
}

impl CorruptReport {
    /// The fault was injected and the next operation refused to proceed.
    #[must_use]
    pub fn detected(&self) -> bool {
        self.applied && self.observed.as_ref().is_some_and(StackError::is_corruption)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressSummary {
    pub seed: u64,
    pub steps: usize,
    pub pushes: usize,
    pub pops: usize,
    pub empty_pops: usize,
    pub peak_capacity: usize,
    pub final_size: usize,
}

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

/// Drives guarded stacks and logs what it observes.
pub struct StackRunner {
    emitter: LogEmitter,
    dump_sink: DumpSink,
}

impl StackRunner {
    #[must_use]
    pub fn new(emitter: LogEmitter, dump_sink: DumpSink) -> Self {
        Self { emitter, dump_sink }
    }

    pub fn emitter_mut(&mut self) -> &mut LogEmitter {
        &mut self.emitter
    }

    #[must_use]
    pub fn into_emitter(self) -> LogEmitter {
        self.emitter
    }

    fn new_stack(&self) -> Result<GuardStack, StackError> {
        Ok(guard_stack!()?.with_dump_sink(self.dump_sink.clone()))
    }

    fn step(&mut self, level: LogLevel, event: &str, op: StackOp, stack: &GuardStack) -> LogEntry {
        self.emitter
            .entry(level, event)
            .with_op(op)
            .with_shape(stack.size(), stack.capacity())
    }

    fn dump_file(&self) -> Option<&PathBuf> {
        match &self.dump_sink {
            DumpSink::File(path) => Some(path),
            _ => None,
        }
    }

    /// Artifact references for the dump file, when dumps go to one that exists.
    fn dump_artifacts(&self) -> Result<Vec<String>, HarnessError> {
        match self.dump_file() {
            Some(path) if path.exists() => Ok(vec![artifact_ref(path)?]),
            _ => Ok(Vec::new()),
        }
    }

    /// Push 0..9, dump twice, pop everything back, destroy.
    pub fn scenario(&mut self) -> Result<ScenarioSummary, HarnessError> {
        let started = Instant::now();
        let mut stack = self.new_stack()?;
        let entry = self
            .step(LogLevel::Info, "stack_init", StackOp::Init, &stack)
            .with_origin(stack.origin().to_string());
        self.emitter.emit_entry(entry)?;

        let mut peak_capacity = stack.capacity();
        for value in SCENARIO_VALUES {
            stack.push(value)?;
            peak_capacity = peak_capacity.max(stack.capacity());
            let entry = self
                .step(LogLevel::Debug, "push", StackOp::Push, &stack)
                .with_value(value);
            self.emitter.emit_entry(entry)?;
        }

        for _ in 0..2 {
            let wrote = self
                .dump_sink
                .emit(|w| canarystack::dump_stack!(w, stack))?;
            let entry = self
                .step(LogLevel::Info, "explicit_dump", StackOp::Dump, &stack)
                .with_details(serde_json::json!({ "written": wrote }));
            self.emitter.emit_entry(entry)?;
        }

        let mut pops = 0;
        for (step, expected) in SCENARIO_VALUES.rev().enumerate() {
            let value = stack.pop()?;
            if value != expected {
                return Err(HarnessError::Invariant {
                    step,
                    detail: format!("popped {value}, expected {expected}"),
                });
            }
            pops += 1;
            let entry = self
                .step(LogLevel::Debug, "pop", StackOp::Pop, &stack)
                .with_value(value);
            self.emitter.emit_entry(entry)?;
        }

        match stack.pop() {
            Err(err @ StackError::EmptyPop) => {
                let entry = self
                    .step(LogLevel::Info, "empty_pop", StackOp::Pop, &stack)
                    .with_error(&err)
                    .with_outcome(Outcome::Pass);
                self.emitter.emit_entry(entry)?;
            }
            Ok(value) => {
                return Err(HarnessError::Invariant {
                    step: pops,
                    detail: format!("pop on an empty stack returned {value}"),
                });
            }
            Err(err) => return Err(err.into()),
        }

        let final_capacity = stack.capacity();
        stack.destroy()?;

        let entry = self
            .emitter
            .entry(LogLevel::Info, "scenario_complete")
            .with_op(StackOp::Destroy)
            .with_outcome(Outcome::Pass)
            .with_duration_ms(started.elapsed().as_millis() as u64)
            .with_artifacts(self.dump_artifacts()?);
        self.emitter.emit_entry(entry)?;

        Ok(ScenarioSummary {
            pushes: SCENARIO_VALUES.len(),
            pops,
            peak_capacity,
            final_capacity,
        })
    }

    /// Inject one fault into a five-element stack and attempt a push.
    pub fn corrupt(&mut self, target: CorruptTarget) -> Result<CorruptReport, HarnessError> {
        let mut stack = self.new_stack()?;
        for value in 0..5 {
            stack.push(value)?;
        }

        let applied = target.apply(&mut stack);
        let entry = self
            .step(LogLevel::Warn, "fault_injected", StackOp::Tamper, &stack)
            .with_details(serde_json::json!({
                "target": target.as_str(),
                "applied": applied,
            }));
        self.emitter.emit_entry(entry)?;

        let integrity = stack.inspect();
        let observed = stack.push(99).err();

        let report = CorruptReport {
            target,
            applied,
            observed,
            integrity,
        };
        let outcome = match (target.detectable() && applied, report.detected()) {
            (false, _) => Outcome::Skip,
            (true, true) => Outcome::Pass,
            (true, false) => Outcome::Fail,
        };
        let faults: Vec<String> = report
            .integrity
            .faults
            .iter()
            .map(|f| format!("{f:?}"))
            .collect();
        let level = if report.observed.is_some() {
            LogLevel::Error
        } else {
            LogLevel::Warn
        };
        let mut entry = self
            .step(level, "corruption_check", StackOp::Push, &stack)
            .with_value(99)
            .with_outcome(outcome)
            .with_details(serde_json::json!({
                "target": target.as_str(),
                "faults": faults,
                "fatal": report.observed.as_ref().is_some_and(StackError::is_fatal),
            }))
            .with_artifacts(self.dump_artifacts()?);
        if let Some(err) = &report.observed {
            entry = entry.with_error(err);
        }
        self.emitter.emit_entry(entry)?;

        // The automatic dump already captured the damage.
        stack.set_dump_sink(DumpSink::Off);
        if let Err(err) = stack.destroy() {
            let entry = self
                .emitter
                .entry(LogLevel::Warn, "destroy_reported")
                .with_op(StackOp::Destroy)
                .with_error(&err);
            self.emitter.emit_entry(entry)?;
        }

        Ok(report)
    }

    /// Seeded random push/pop, checked against a `Vec` model.
    pub fn stress(&mut self, seed: u64, steps: usize) -> Result<StressSummary, HarnessError> {
        let started = Instant::now();
        let mut rng = XorShift64::new(seed);
        let mut stack = self.new_stack()?;
        let mut model: Vec<i32> = Vec::new();
        let mut summary = StressSummary {
            seed,
            steps,
            pushes: 0,
            pops: 0,
            empty_pops: 0,
            peak_capacity: stack.capacity(),
            final_size: 0,
        };

        for step in 0..steps {
            // Push-heavy first half, pop-heavy second half.
            let push_bias = if step < steps / 2 { 60 } else { 35 };
            if rng.next_u64() % 100 < push_bias {
                let value = rng.next_u64() as i32;
                stack.push(value)?;
                model.push(value);
                summary.pushes += 1;
            } else {
                match stack.pop() {
                    Ok(value) => {
                        let expected = model.pop();
                        if Some(value) != expected {
                            return Err(HarnessError::Invariant {
                                step,
                                detail: format!("popped {value}, model had {expected:?}"),
                            });
                        }
                        summary.pops += 1;
                    }
                    Err(StackError::EmptyPop) if model.is_empty() => summary.empty_pops += 1,
                    Err(StackError::EmptyPop) => {
                        return Err(HarnessError::Invariant {
                            step,
                            detail: format!("empty pop with {} modelled elements", model.len()),
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            summary.peak_capacity = summary.peak_capacity.max(stack.capacity());
            check_shape(&stack, &model, step)?;
            if step % FULL_CHECK_EVERY == 0 {
                check_contents(&stack, &model, step)?;
            }
        }
        check_contents(&stack, &model, steps)?;
        summary.final_size = stack.size();
        stack.destroy()?;

        let entry = self
            .emitter
            .entry(LogLevel::Info, "stress_complete")
            .with_outcome(Outcome::Pass)
            .with_duration_ms(started.elapsed().as_millis() as u64)
            .with_details(serde_json::json!({
                "seed": format!("{seed:#x}"),
                "steps": steps,
                "pushes": summary.pushes,
                "pops": summary.pops,
                "empty_pops": summary.empty_pops,
                "peak_capacity": summary.peak_capacity,
                "final_size": summary.final_size,
            }));
        self.emitter.emit_entry(entry)?;
        Ok(summary)
    }
}

fn check_shape(stack: &GuardStack, model: &[i32], step: usize) -> Result<(), HarnessError> {
    let violation = |detail: String| HarnessError::Invariant { step, detail };
    if stack.size() != model.len() {
        return Err(violation(format!(
            "size {} but model holds {}",
            stack.size(),
            model.len()
        )));
    }
    if stack.capacity() < stack.size() || stack.capacity() < MIN_CAPACITY {
        return Err(violation(format!(
            "capacity {} with size {}",
            stack.capacity(),
            stack.size()
        )));
    }
    Ok(())
}

fn check_contents(stack: &GuardStack, model: &[i32], step: usize) -> Result<(), HarnessError> {
    stack.verify()?;
    for (index, &expected) in model.iter().enumerate() {
        if stack.slot(index) != Some(expected) {
            return Err(HarnessError::Invariant {
                step,
                detail: format!("slot {index} is {:?}, expected {expected}", stack.slot(index)),
            });
        }
    }
    for index in stack.size()..stack.capacity() {
        if stack.slot(index) != Some(POISON) {
            return Err(HarnessError::Invariant {
                step,
                detail: format!("slot {index} past size is not poisoned"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_runner() -> StackRunner {
        StackRunner::new(
            LogEmitter::to_writer(Box::new(std::io::sink()), "unit", "run-0"),
            DumpSink::Off,
        )
    }

    #[test]
    fn scenario_round_trips() {
        let summary = quiet_runner().scenario().unwrap();
        assert_eq!(
            summary,
            ScenarioSummary {
                pushes: 10,
                pops: 10,
                peak_capacity: 16,
                final_capacity: MIN_CAPACITY,
            }
        );
    }

    #[test]
    fn every_detectable_target_is_detected() {
        let mut runner = quiet_runner();
        for target in CorruptTarget::ALL {
            let report = runner.corrupt(target).unwrap();
            assert_eq!(
                report.detected(),
                target.detectable(),
                "{}: {:?}",
                target.as_str(),
                report.observed
            );
        }
    }

    #[test]
    fn size_target_is_out_of_bounds() {
        let report = quiet_runner().corrupt(CorruptTarget::Size).unwrap();
        assert!(matches!(report.observed, Some(StackError::OutOfBounds { .. })));
    }

    #[test]
    fn stress_is_deterministic_per_seed() {
        let a = quiet_runner().stress(7, 2_000).unwrap();
        let b = quiet_runner().stress(7, 2_000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.pushes + a.pops + a.empty_pops, 2_000);
        assert_eq!(a.final_size, a.pushes - a.pops);
    }

    #[test]
    fn zero_seed_still_varies() {
        let mut rng = XorShift64::new(0);
        assert_ne!(rng.next_u64(), rng.next_u64());
    }
}
