//! Driving program for canarystack.
//!
//! This crate provides:
//! - Scenario: the canonical push/dump/pop/destroy run
//! - Corruption demos: inject one fault and observe the report
//! - Stress: seeded random push/pop with invariant checks after every step
//! - Structured logging: JSONL records with SHA-256 artifact references
//!
//! The harness is the top-level caller, so it owns the abort policy: the
//! core library reports corruption and the binary aborts when the error is
//! classified fatal.

#![forbid(unsafe_code)]

pub mod runner;
pub mod structured_log;

pub use runner::{
    CorruptReport, CorruptTarget, HarnessError, ScenarioSummary, StackRunner, StressSummary,
};
