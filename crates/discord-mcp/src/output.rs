// crates/discord-mcp/src/output.rs
// ============================================================================
// Module: Shared Output Sink
// Description: Line-oriented writer shared by responses and notifications.
// Purpose: Serialize and write each envelope as one contiguous line.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`SharedWriter`] is the single guarded output sink. The session's response
//! path and the notification path both write through it, and each write holds
//! the lock across "serialize envelope + write line + flush", so bytes from two
//! envelopes never interleave within or across lines.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Boxed writer stored behind the shared lock.
type BoxedWriter = Box<dyn Write + Send>;

/// Cloneable handle to one guarded output sink.
///
/// # Invariants
/// - All clones share one lock and one underlying writer.
#[derive(Clone)]
pub struct SharedWriter {
    /// Underlying writer guarded by the envelope lock.
    inner: Arc<Mutex<BoxedWriter>>,
}

impl SharedWriter {
    /// Wraps a writer in a shared sink.
    #[must_use]
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Builds a sink over process stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Builds a sink over an in-memory buffer and returns a reader handle.
    #[must_use]
    pub fn in_memory() -> (Self, OutputBuffer) {
        let buffer = OutputBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    /// Serializes `envelope` and writes it as one newline-terminated line.
    ///
    /// Returns the number of bytes written, newline excluded.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] when serialization or the write fails.
    pub fn write_envelope<T>(&self, envelope: &T) -> Result<usize, OutputError>
    where
        T: Serialize + ?Sized,
    {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = serde_json::to_vec(envelope)
            .map_err(|err| OutputError::Serialization(err.to_string()))?;
        let len = line.len();
        line.push(b'\n');
        writer.write_all(&line).map_err(|err| OutputError::Io(err.to_string()))?;
        writer.flush().map_err(|err| OutputError::Io(err.to_string()))?;
        drop(writer);
        Ok(len)
    }
}

/// In-memory capture buffer usable as a [`SharedWriter`] target.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    /// Captured bytes.
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    /// Returns the captured output as UTF-8 (lossy).
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Returns the captured output split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Output sink errors.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Envelope serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// Writing to the sink failed.
    #[error("write failed: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
