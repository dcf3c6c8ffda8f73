//! Hardened, self-verifying growable stack.
//!
//! Every mutating operation checks the structure before and after it acts,
//! and reports exactly where and what failed when it finds heap corruption,
//! an overrun, or an overwrite of internal bookkeeping.
//!
//! # Architecture
//!
//! - **Checksum** (`checksum`): seeded SipHash-2-4 (or keyed BLAKE3) over byte ranges
//! - **Guarded buffer** (`guard`): `[sentinel][slots][sentinel]` storage and the process secret
//! - **Resize policy** (`resize`): double when full, quarter at a quarter full
//! - **Integrity verifier** (`verify`): bounds, sentinel, and checksum checks
//! - **Stack operations** (`stack`): Init / Push / Pop / Destroy
//! - **Diagnostic dump** (`dump`): full state report, written automatically on corruption
//! - **Provenance** (`origin`): call-site records and the `guard_stack!` macro
//! - **Fault injection** (`tamper`): controlled corruption for tests and demos
//! - **C ABI** (`abi`): raw-handle entry points with null-handle checks
//! - **Configuration** (`config`): build-time protection switches, dump sink selection
//! - **Metrics** (`metrics`): atomic counters for observability

#![deny(unsafe_code)]

pub mod abi;
pub mod checksum;
pub mod config;
pub mod dump;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod origin;
pub mod resize;
pub mod stack;
pub mod tamper;
pub mod verify;

pub use dump::{DumpSink, SharedBuffer};
pub use error::{ChecksumRegion, SentinelSite, StackError};
pub use guard::{Element, POISON};
pub use metrics::{MetricsSnapshot, StackMetrics, global_metrics};
pub use origin::Origin;
pub use resize::ResizePlan;
pub use stack::GuardStack;
pub use tamper::Tamper;
pub use verify::{Fault, IntegrityReport};

