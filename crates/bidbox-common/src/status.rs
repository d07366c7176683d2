//! Status Taxonomy
//!
//! Every fallible operation in bidbox reports a [`Status`]: a [`StatusKind`]
//! plus a human-readable message. The kinds follow the canonical RPC status
//! space so they survive a round trip through the wire protocol unchanged:
//!
//! | Kind                 | Canonical code | Typical cause                                   |
//! |----------------------|----------------|-------------------------------------------------|
//! | `InvalidArgument`    | 3              | malformed input, script compile/runtime error   |
//! | `NotFound`           | 5              | unknown function URI, missing config file       |
//! | `PermissionDenied`   | 7              | remote script server rejected the fetch         |
//! | `FailedPrecondition` | 9              | script output shape mismatch, sandbox misuse    |
//! | `Internal`           | 13             | unexpected engine or IPC failure                |
//! | `Unavailable`        | 14             | configured script failed to compile at refresh  |
//!
//! Messages never carry stack traces; they are safe to return to callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// The caller supplied something malformed: bad input, unparseable
    /// configuration, a script that does not compile or run, or a rejected
    /// promise.
    InvalidArgument,
    /// The named resource does not exist (function URI, config file).
    NotFound,
    /// The remote script server refused to serve the fetch.
    PermissionDenied,
    /// A contract the operation relies on does not hold, e.g. the script
    /// output did not match the expected shape.
    FailedPrecondition,
    /// Unexpected failure inside the engine, the sandbox or a transport.
    Internal,
    /// The resource is configured but not currently usable.
    Unavailable,
}

impl StatusKind {
    /// Canonical numeric code for this kind.
    pub fn canonical_code(self) -> i32 {
        match self {
            StatusKind::InvalidArgument => 3,
            StatusKind::NotFound => 5,
            StatusKind::PermissionDenied => 7,
            StatusKind::FailedPrecondition => 9,
            StatusKind::Internal => 13,
            StatusKind::Unavailable => 14,
        }
    }

    /// Inverse of [`StatusKind::canonical_code`].
    pub fn from_canonical_code(code: i32) -> Option<Self> {
        match code {
            3 => Some(StatusKind::InvalidArgument),
            5 => Some(StatusKind::NotFound),
            7 => Some(StatusKind::PermissionDenied),
            9 => Some(StatusKind::FailedPrecondition),
            13 => Some(StatusKind::Internal),
            14 => Some(StatusKind::Unavailable),
            _ => None,
        }
    }

    /// SCREAMING_SNAKE_CASE name used on the wire.
    pub fn as_str_name(self) -> &'static str {
        match self {
            StatusKind::InvalidArgument => "INVALID_ARGUMENT",
            StatusKind::NotFound => "NOT_FOUND",
            StatusKind::PermissionDenied => "PERMISSION_DENIED",
            StatusKind::FailedPrecondition => "FAILED_PRECONDITION",
            StatusKind::Internal => "INTERNAL",
            StatusKind::Unavailable => "UNAVAILABLE",
        }
    }

    /// Inverse of [`StatusKind::as_str_name`].
    pub fn from_str_name(name: &str) -> Option<Self> {
        match name {
            "INVALID_ARGUMENT" => Some(StatusKind::InvalidArgument),
            "NOT_FOUND" => Some(StatusKind::NotFound),
            "PERMISSION_DENIED" => Some(StatusKind::PermissionDenied),
            "FAILED_PRECONDITION" => Some(StatusKind::FailedPrecondition),
            "INTERNAL" => Some(StatusKind::Internal),
            "UNAVAILABLE" => Some(StatusKind::Unavailable),
            _ => None,
        }
    }
}

/// An error with a [`StatusKind`] and a human-readable message.
///
/// Constructed through the per-kind helpers:
///
/// ```
/// use bidbox_common::status::{Status, StatusKind};
///
/// let status = Status::not_found("bidding function local://missing not found");
/// assert_eq!(status.kind(), StatusKind::NotFound);
/// assert!(status.message().contains("not found"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct Status {
    kind: StatusKind,
    message: String,
}

/// Result alias used across the workspace.
pub type Result<T, E = Status> = std::result::Result<T, E>;

impl Status {
    /// Creates a status with an explicit kind.
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StatusKind::PermissionDenied, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(StatusKind::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Unavailable, message)
    }

    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
