//! Store error taxonomy
//!
//! A closed set of numeric codes. Every fallible store operation returns
//! one of these as a value; nothing panics across the public API.

use serde::Serialize;
use thiserror::Error;

/// Boxed underlying fault carried by a [`StoreError`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind of failure, with its stable numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    Unknown = 0,
    Serialize = 191,
    AlreadyExists = 192,
    InvalidDocument = 193,
    Write = 194,
    Read = 195,
    Parse = 196,
    Encrypt = 197,
    Decrypt = 198,
}

impl ErrorKind {
    /// Map a numeric code back to its kind. Unrecognised codes become `Unknown`.
    pub fn from_code(code: u16) -> Self {
        match code {
            191 => Self::Serialize,
            192 => Self::AlreadyExists,
            193 => Self::InvalidDocument,
            194 => Self::Write,
            195 => Self::Read,
            196 => Self::Parse,
            197 => Self::Encrypt,
            198 => Self::Decrypt,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown error",
            Self::Serialize => "Document could not be serialized to JSON",
            Self::AlreadyExists => {
                "Store file already exists and overwriting it is not allowed"
            }
            Self::InvalidDocument => "Value is not a JSON object",
            Self::Write => "Failed to write store file",
            Self::Read => "Failed to read store file",
            Self::Parse => "Store file does not contain a valid JSON document",
            Self::Encrypt => "Failed to encrypt document with the given password",
            Self::Decrypt => "Failed to decrypt document with the given password",
        }
    }
}

#[derive(Error, Debug)]
#[error("{} (code {})", .kind.message(), .code)]
pub struct StoreError {
    kind: ErrorKind,
    /// The code as given; differs from `kind.code()` only for unknown codes
    code: u16,
    #[source]
    cause: Option<Cause>,
}

/// Flat view of a [`StoreError`] for logs and API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub message: &'static str,
    pub code: u16,
    pub cause: Option<String>,
}

impl StoreError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: kind.code(),
            cause: None,
        }
    }

    pub fn with_cause(kind: ErrorKind, cause: impl Into<Cause>) -> Self {
        Self {
            kind,
            code: kind.code(),
            cause: Some(cause.into()),
        }
    }

    /// Build from a raw code. Never fails: an unknown code keeps its number
    /// but takes the `Unknown` kind and message.
    pub fn from_code(code: u16, cause: Option<Cause>) -> Self {
        Self {
            kind: ErrorKind::from_code(code),
            code,
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn record(&self) -> ErrorRecord {
        ErrorRecord {
            message: self.message(),
            code: self.code(),
            cause: self.cause.as_ref().map(|c| c.to_string()),
        }
    }

    /// Emit the error as a single structured log event.
    pub fn report(&self) {
        let record = self.record();
        tracing::error!(
            code = record.code,
            cause = record.cause.as_deref().unwrap_or("none"),
            "{}",
            record.message
        );
    }
}

impl From<ErrorKind> for StoreError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
