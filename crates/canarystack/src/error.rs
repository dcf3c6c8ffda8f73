//! Error taxonomy for guarded stack operations.
//!
//! Every detectable failure is returned to the immediate caller as a
//! categorized [`StackError`]. Sentinel and checksum failures mean the internal
//! state is no longer trustworthy; empty pops and allocation failures are
//! ordinary, recoverable outcomes.

use std::fmt;

use thiserror::Error;

use crate::config;

/// Which boundary sentinel failed comparison against the process secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentinelSite {
    /// Leading word of the control block.
    ControlOrigin,
    /// Trailing word of the control block.
    ControlTermination,
    /// Word immediately before the first payload slot.
    BufferLeading,
    /// Word immediately after the last payload slot.
    BufferTrailing,
}

impl SentinelSite {
    /// All sites, in the order the verifier checks them.
    pub const ALL: [Self; 4] = [
        Self::ControlOrigin,
        Self::ControlTermination,
        Self::BufferLeading,
        Self::BufferTrailing,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ControlOrigin => "control origin sentinel",
            Self::ControlTermination => "control termination sentinel",
            Self::BufferLeading => "buffer leading sentinel",
            Self::BufferTrailing => "buffer trailing sentinel",
        }
    }
}

impl fmt::Display for SentinelSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fingerprinted region disagreed with its stored checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumRegion {
    /// The whole backing allocation, sentinels included.
    Payload,
    /// The control block with both checksum fields zeroed.
    Control,
}

impl fmt::Display for ChecksumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload => f.write_str("payload"),
            Self::Control => f.write_str("control block"),
        }
    }
}

/// Categorized failure of a stack operation.
#[derive(Debug, Error)]
pub enum StackError {
    /// Operation invoked on a missing handle.
    #[error("operation on a null stack handle")]
    NullReference,
    /// The control block no longer describes a consistent layout
    /// (`capacity < size`, capacity under the minimum, or a buffer whose
    /// length disagrees with `capacity`).
    #[error("bounds violated: size {size}, capacity {capacity}")]
    OutOfBounds { size: usize, capacity: usize },
    /// Allocation or reallocation failed; prior state is preserved.
    #[error("allocation of {requested_bytes} bytes failed")]
    OutOfMemory { requested_bytes: usize },
    /// Pop on an empty stack.
    #[error("pop from an empty stack")]
    EmptyPop,
    /// A boundary sentinel no longer matches the process secret.
    #[error("dead sentinel: {0}")]
    DeadSentinel(SentinelSite),
    /// A recomputed checksum disagrees with the stored one.
    #[error("bad checksum over {0}")]
    BadChecksum(ChecksumRegion),
    /// The diagnostic sink could not be opened or written.
    #[error("diagnostic sink failed: {0}")]
    BadSink(#[from] std::io::Error),
}

impl StackError {
    /// Stable numeric code for the C ABI. `0` is reserved for success.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::NullReference => 1,
            Self::OutOfBounds { .. } => 2,
            Self::OutOfMemory { .. } => 3,
            Self::EmptyPop => 4,
            Self::DeadSentinel(_) => 5,
            Self::BadChecksum(_) => 6,
            Self::BadSink(_) => 7,
        }
    }

    /// Short category name used in dumps and structured logs.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::NullReference => "null_reference",
            Self::OutOfBounds { .. } => "out_of_bounds",
            Self::OutOfMemory { .. } => "out_of_memory",
            Self::EmptyPop => "empty_pop",
            Self::DeadSentinel(_) => "dead_sentinel",
            Self::BadChecksum(_) => "bad_checksum",
            Self::BadSink(_) => "bad_sink",
        }
    }

    /// Returns true when the error means the structure itself is damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. } | Self::DeadSentinel(_) | Self::BadChecksum(_)
        )
    }

    /// Returns true when the build classifies this error as process-fatal.
    ///
    /// Only sentinel and checksum failures can be fatal, and only in builds
    /// with the `abort-on-corruption` feature. The core never aborts; the
    /// top-level caller decides what to do with a fatal error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        config::ABORT_ON_CORRUPTION
            && matches!(self, Self::DeadSentinel(_) | Self::BadChecksum(_))
    }
}
