//! Crate-wide error carrier.
//!
//! Every fallible operation in this crate returns `Result<T>` where the
//! error side is this module's [`Error`]. `NotFound` is reserved for
//! signalling "no such entry" through `Option<T>` return types — it is
//! never constructed as an `Err` at a public API boundary (see `Store::get`).

use std::fmt;

use crate::codec::CodecError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a failure, mirrored on every [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// On-disk or in-memory data failed a structural check (bad magic,
    /// CRC mismatch, malformed varint, out-of-order restart entry, ...).
    Corruption,
    /// A read, write, or sync against the file system failed.
    Io,
    /// A point lookup found nothing. Surfaced through `Option`, not `Err`,
    /// at public boundaries; kept as a kind so internal code can still
    /// propagate it with `?` before translating to `Ok(None)`.
    NotFound,
    /// A caller violated a documented precondition (comparator-name
    /// mismatch on open, out-of-order `Add` to a builder, ...).
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Corruption => "corruption",
            ErrorKind::Io => "io error",
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}

/// The crate's single error type.
///
/// Carries a [`ErrorKind`], a message, and a breadcrumb trail built up by
/// [`Error::trace`] as the error is propagated back through call frames —
/// a stand-in for the source project's stream-concatenation `Status`
/// operator.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    trace: Vec<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if !self.trace.is_empty() {
            write!(f, " (via {})", self.trace.join(" <- "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl Error {
    /// Builds a new error of `kind` with a display `message`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            trace: Vec::new(),
            source: None,
        }
    }

    /// Shorthand for `Error::new(ErrorKind::Corruption, ..)`.
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Corruption, message)
    }

    /// Shorthand for `Error::new(ErrorKind::Io, ..)`.
    pub fn io(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Io, message)
    }

    /// Shorthand for `Error::new(ErrorKind::NotFound, ..)`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for `Error::new(ErrorKind::InvalidArgument, ..)`.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, message)
    }

    /// This error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// True iff this error is a [`ErrorKind::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Appends a breadcrumb and returns `self`, for use at re-throw sites:
    /// `foo().map_err(|e| e.trace("sstable::reader::open"))?`.
    pub fn trace(mut self, context: impl Into<String>) -> Self {
        self.trace.push(context.into());
        self
    }

    /// Attaches a lower-level error as the source, for use via `map_err`.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io(e.to_string()).with_source(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::corruption(e.to_string()).with_source(e)
    }
}
