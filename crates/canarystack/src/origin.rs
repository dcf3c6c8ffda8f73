//! Provenance records: where a stack was created and where an operation was called.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;

use crate::checksum::checksum;
use crate::config::CHECKSUM_SEED;

/// Source file, line, and routine of a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub file: Cow<'static, str>,
    pub line: u32,
    pub routine: Cow<'static, str>,
}

impl Origin {
    #[must_use]
    pub const fn new(file: &'static str, line: u32, routine: &'static str) -> Self {
        Self {
            file: Cow::Borrowed(file),
            line,
            routine: Cow::Borrowed(routine),
        }
    }

    /// Build an origin from runtime strings (C callers, deserialized traces).
    #[must_use]
    pub fn owned(file: impl Into<String>, line: u32, routine: impl Into<String>) -> Self {
        Self {
            file: Cow::Owned(file.into()),
            line,
            routine: Cow::Owned(routine.into()),
        }
    }

    /// Origin of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    #[must_use]
    pub fn caller(routine: &'static str) -> Self {
        let location = Location::caller();
        Self {
            file: Cow::Borrowed(location.file()),
            line: location.line(),
            routine: Cow::Borrowed(routine),
        }
    }

    /// Fingerprint folded into the control-block checksum.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut bytes = Vec::with_capacity(self.file.len() + self.routine.len() + 5);
        bytes.extend_from_slice(self.file.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&self.line.to_le_bytes());
        bytes.extend_from_slice(self.routine.as_bytes());
        checksum(&bytes, CHECKSUM_SEED)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) {}()", self.file, self.line, self.routine)
    }
}

/// Create a [`GuardStack`](crate::GuardStack) recording the call site as its origin.
///
/// ```
/// let stack = canarystack::guard_stack!().expect("allocation");
/// assert_eq!(stack.size(), 0);
/// ```
#[macro_export]
macro_rules! guard_stack {
    () => {
        $crate::GuardStack::init($crate::Origin::new(file!(), line!(), module_path!()))
    };
}

/// Dump a stack to `sink`, naming it after the expression passed in.
///
/// Evaluates to `Result<(), StackError>`.
#[macro_export]
macro_rules! dump_stack {
    ($sink:expr, $stack:expr) => {
        $crate::dump::write_dump(
            $sink,
            &$stack,
            Some(stringify!($stack)),
            &$crate::Origin::new(file!(), line!(), module_path!()),
            None,
        )
    };
}
