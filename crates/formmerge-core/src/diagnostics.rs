//! Diagnostic sink for conditions worth telling the user about
//!
//! Recoverable problems (a row whose date will not split, a form missing a
//! mapped field, a value a rule cannot parse) are reported here and the run
//! carries on. Fatal problems are `Err(Error)` values; the caller reports
//! them with [`Severity::Fatal`] before stopping.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// How bad a reported condition is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged and counted; the affected value is treated as absent
    Recoverable,
    /// The run stops after the sink is flushed
    Fatal,
}

/// One logged condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub detail: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn recoverable(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            severity: Severity::Recoverable,
        }
    }

    pub fn fatal(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            severity: Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let detail = std::error::Error::source(err)
            .map(|s| s.to_string())
            .unwrap_or_default();
        Diagnostic::fatal(format!("Error: {}", err), detail)
    }
}

/// Receives diagnostics from the engine
pub trait DiagnosticSink {
    /// Record one diagnostic
    fn report(&mut self, diagnostic: Diagnostic);

    /// Number of diagnostics reported so far
    fn error_count(&self) -> usize;

    /// Push buffered entries to their destination
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn trace(diagnostic: &Diagnostic) {
    match diagnostic.severity {
        Severity::Recoverable => warn!("{} {}", diagnostic.message, diagnostic.detail),
        Severity::Fatal => error!("{} {}", diagnostic.message, diagnostic.detail),
    }
}

/// Keeps diagnostics in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub entries: Vec<Diagnostic>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of every entry, in report order
    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.message.as_str()).collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&mut self, diagnostic: Diagnostic) {
        trace(&diagnostic);
        self.entries.push(diagnostic);
    }

    fn error_count(&self) -> usize {
        self.entries.len()
    }
}

/// Append-only plain-text error log
pub struct ErrorLog {
    path: PathBuf,
    writer: BufWriter<File>,
    count: usize,
}

impl ErrorLog {
    /// Open the log, discarding any log left by a previous run
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| Error::FileWrite {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticSink for ErrorLog {
    fn report(&mut self, diagnostic: Diagnostic) {
        trace(&diagnostic);
        self.count += 1;

        let written = write!(self.writer, "\n{}\n{}", diagnostic.message, diagnostic.detail);
        if let Err(e) = written {
            error!("could not write to {}: {}", self.path.display(), e);
        }
        if diagnostic.is_fatal() {
            if let Err(e) = self.writer.flush() {
                error!("could not flush {}: {}", self.path.display(), e);
            }
        }
    }

    fn error_count(&self) -> usize {
        self.count
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
