//! Protection switches, layout constants, and diagnostic sink selection.
//!
//! Protection is chosen at build time through Cargo features and surfaces here
//! as `const bool`s, so a disabled check compiles away instead of branching on
//! state at runtime:
//! - `canary-protection`: sentinel words bracket the control block and buffer.
//! - `checksum-protection`: payload and control-block checksums are stored and
//!   compared.
//! - `diagnostics`: a mutating operation that observes corruption writes a dump
//!   before returning the error.
//! - `abort-on-corruption`: sentinel and checksum failures are classified fatal.
//!   The top-level caller performs the abort, never the core.
//!
//! The automatic dump sink is a runtime setting read once from
//! `CANARYSTACK_DUMP`:
//! - `stderr` (default)
//! - `off`: no automatic dumps
//! - anything else: a file path, appended to

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::dump::DumpSink;

/// Sentinel words are laid out and compared.
pub const CANARY_PROTECTION: bool = cfg!(feature = "canary-protection");

/// Payload and control-block checksums are maintained and compared.
pub const CHECKSUM_PROTECTION: bool = cfg!(feature = "checksum-protection");

/// Corruption observed by a mutating operation triggers a dump.
pub const DIAGNOSTICS: bool = cfg!(feature = "diagnostics");

/// Sentinel and checksum failures are fatal to the process.
pub const ABORT_ON_CORRUPTION: bool = cfg!(feature = "abort-on-corruption");

/// Smallest capacity a live stack may have.
pub const MIN_CAPACITY: usize = 8;

/// Capacity multiplier on growth; shrink divides by its square.
pub const GROW_FACTOR: usize = 2;

/// Seed shared by every checksum call site in this build.
pub const CHECKSUM_SEED: u64 = 0x5EED_CA4A_2F1B_7D03;

/// Environment variable naming the automatic dump sink.
pub const DUMP_ENV: &str = "CANARYSTACK_DUMP";

impl DumpSink {
    /// Parse a sink selector (case-insensitive for the keywords).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "stderr" | "default" => Self::Stderr,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::File(PathBuf::from(trimmed)),
        }
    }
}

static DEFAULT_SINK: OnceLock<DumpSink> = OnceLock::new();

/// Sink new stacks dump to (reads the env var on first call, caches thereafter).
#[must_use]
pub fn default_dump_sink() -> DumpSink {
    DEFAULT_SINK
        .get_or_init(|| {
            std::env::var(DUMP_ENV)
                .map(|v| DumpSink::from_str_loose(&v))
                .unwrap_or_default()
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dump_sinks() {
        assert!(matches!(DumpSink::from_str_loose("stderr"), DumpSink::Stderr));
        assert!(matches!(DumpSink::from_str_loose("STDERR"), DumpSink::Stderr));
        assert!(matches!(DumpSink::from_str_loose(""), DumpSink::Stderr));
        assert!(matches!(DumpSink::from_str_loose("off"), DumpSink::Off));
        assert!(matches!(DumpSink::from_str_loose("None"), DumpSink::Off));
        match DumpSink::from_str_loose(" /tmp/stack.dump ") {
            DumpSink::File(path) => assert_eq!(path, PathBuf::from("/tmp/stack.dump")),
            other => panic!("expected file sink, got {other:?}"),
        }
    }

    #[test]
    fn shrink_threshold_is_a_quarter() {
        assert_eq!(GROW_FACTOR * GROW_FACTOR, 4);
        assert!(MIN_CAPACITY >= GROW_FACTOR);
    }
}
