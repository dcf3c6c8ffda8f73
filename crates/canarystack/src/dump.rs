//! Human-readable diagnostic dump of a stack's full internal state.
//!
//! One block per call, line-oriented, not meant for machine parsing. The
//! layout depends on which protections are compiled in.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{CANARY_PROTECTION, CHECKSUM_PROTECTION};
use crate::error::StackError;
use crate::guard::POISON;
use crate::origin::Origin;
use crate::stack::GuardStack;
use crate::verify::sentinel_readings;

/// In-memory sink shared between a stack and whoever inspects its dumps.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Destination for automatic dumps.
#[derive(Debug, Clone, Default)]
pub enum DumpSink {
    /// Standard error.
    #[default]
    Stderr,
    /// Automatic dumps disabled for this stack.
    Off,
    /// Append to a file, created if missing.
    File(PathBuf),
    /// Append to a shared in-memory buffer.
    Memory(SharedBuffer),
}

impl DumpSink {
    /// Run `write` against the sink. Returns `Ok(false)` when the sink is off.
    pub fn emit(
        &self,
        write: impl FnOnce(&mut dyn Write) -> Result<(), StackError>,
    ) -> Result<bool, StackError> {
        match self {
            Self::Off => return Ok(false),
            Self::Stderr => {
                let mut handle = io::stderr().lock();
                write(&mut handle)?;
            }
            Self::File(path) => {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                write(&mut file)?;
                file.flush()?;
            }
            Self::Memory(buffer) => {
                // Render first so one report lands as one contiguous block.
                let mut staged = Vec::new();
                write(&mut staged)?;
                buffer.0.lock().extend_from_slice(&staged);
            }
        }
        Ok(true)
    }
}

/// Write the full report for `stack` to `sink`.
///
/// `name` is the expression the caller used for the stack, when known;
/// `call_site` is where the dump was requested; `observed` is the error that
/// triggered it, if any. Never mutates the stack.
pub fn write_dump(
    sink: &mut dyn Write,
    stack: &GuardStack,
    name: Option<&str>,
    call_site: &Origin,
    observed: Option<&StackError>,
) -> Result<(), StackError> {
    render(sink, stack, name, call_site, observed)?;
    crate::metrics::StackMetrics::inc(&crate::metrics::global_metrics().dumps_rendered);
    Ok(())
}

fn render(
    w: &mut dyn Write,
    stack: &GuardStack,
    name: Option<&str>,
    call_site: &Origin,
    observed: Option<&StackError>,
) -> io::Result<()> {
    let label = name.map(|n| format!(" \"{n}\"")).unwrap_or_default();
    writeln!(
        w,
        "GuardStack[{:p}]{label} from {}",
        stack as *const GuardStack, stack.origin
    )?;
    writeln!(w, "called from {call_site}")?;
    match observed {
        Some(err) => writeln!(
            w,
            "observed error: {} (code {}): {err}",
            err.category(),
            err.code()
        )?,
        None => writeln!(w, "observed error: none")?,
    }

    if CHECKSUM_PROTECTION {
        checksum_line(
            w,
            "payload checksum",
            stack.payload_checksum,
            stack.payload_checksum_now(),
        )?;
        checksum_line(
            w,
            "control checksum",
            stack.struct_checksum,
            stack.struct_checksum_now(),
        )?;
    } else {
        writeln!(w, "checksums: disabled")?;
    }

    let readings = sentinel_readings(stack);
    let sentinel_line = |w: &mut dyn Write, index: usize, indent: &str| -> io::Result<()> {
        match readings.get(index) {
            Some(r) => {
                let stored = r
                    .stored
                    .map_or_else(|| "<missing>".to_string(), |c| c.to_string());
                let flag = if r.is_intact() { "" } else { "  <-- MISMATCH" };
                writeln!(
                    w,
                    "{indent}{} = {stored} (expected {}){flag}",
                    r.site, r.expected
                )
            }
            None => Ok(()),
        }
    };

    if !CANARY_PROTECTION {
        writeln!(w, "sentinels: disabled")?;
    }
    sentinel_line(w, 0, "")?;
    sentinel_line(w, 1, "")?;
    writeln!(w, "{{")?;
    writeln!(w, "    size = {}", stack.size)?;
    writeln!(w, "    capacity = {}", stack.capacity)?;
    writeln!(w, "    allocated bytes = {}", stack.allocated_byte_length)?;
    sentinel_line(w, 2, "    ")?;

    let visible = stack.capacity.min(stack.buffer.capacity());
    for index in 0..visible {
        let Some(value) = stack.buffer.get(index) else {
            break;
        };
        let live = index < stack.size;
        let mark = if live { '*' } else { ' ' };
        let note = if !live && value == POISON {
            " (POISON)"
        } else if !live {
            " <-- expected POISON"
        } else {
            ""
        };
        writeln!(w, "    {mark}[{index}] = {value}{note}")?;
    }
    if visible < stack.capacity {
        writeln!(
            w,
            "    ... {} slots claimed by capacity but absent from the buffer",
            stack.capacity - visible
        )?;
    }

    sentinel_line(w, 3, "    ")?;
    writeln!(w, "}}")?;
    Ok(())
}

fn checksum_line(w: &mut dyn Write, label: &str, stored: u64, fresh: u64) -> io::Result<()> {
    let flag = if stored == fresh { "" } else { "  <-- MISMATCH" };
    writeln!(w, "{label} = {stored:#018x} (recomputed {fresh:#018x}){flag}")
}
