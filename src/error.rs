//! Errors returned while resolving events and driving a measurement.

use std::io;

use thiserror::Error;

/// An error raised by this crate, carrying its [`ErrorKind`] and, where one
/// exists, the underlying OS or loader error.
///
/// [`ErrorKind`]: enum.ErrorKind.html
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
	kind: ErrorKind,
	#[source]
	cause: Option<io::Error>,
}

/// The reason an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
	/// An unknown error
	#[error("unknown error")]
	Unknown,

	/// The kperf or kperfdata framework could not be loaded.
	#[error("counter framework unavailable")]
	LibraryUnavailable,

	/// A framework was loaded but does not export the named function.
	#[error("missing framework function {0}")]
	MissingSymbol(String),

	/// The counters are unavailable to the current privilege level.
	///
	/// kpc requires root.
	#[error("permission denied, kpc requires root privileges")]
	PermissionDenied,

	/// The backend cannot identify the running CPU.
	#[error("unknown CPU")]
	UnknownSystem,

	/// No usable event database exists for the running CPU.
	#[error("event database unavailable")]
	DatabaseUnavailable,

	/// The backend failed to allocate a configuration.
	#[error("out of memory")]
	OutOfMemory,

	/// A backend id contains an interior NUL byte.
	#[error("invalid event name")]
	InvalidEventName,

	/// A requested event does not exist in the event database.
	///
	/// Resolution stops at the first missing event so that later events are
	/// never attributed to the wrong counter.
	#[error("cannot find event for {label}: \"{backend_id}\"")]
	EventNotFound {
		/// The label the event was pushed with.
		label: String,
		/// The name that was looked up.
		backend_id: String,
	},

	/// The requested events cannot share the counter bank.
	///
	/// Bit `n` of `bitmap` is set when request `n` conflicts. Remove events
	/// and retry; conflicts are never resolved automatically.
	#[error("conflicting events (bitmap {bitmap:#b})")]
	ConflictingEvents {
		/// The conflicting requests, one bit each.
		bitmap: u32,
	},

	/// The counter bank is held by another subsystem and could not be forced.
	#[error("counters held by another subsystem")]
	CountersUnavailable,

	/// More events were requested than the counter bank can hold.
	#[error("too many events requested")]
	CapacityExceeded,

	/// The backend returned a counter map or configuration that does not fit
	/// the counter bank.
	#[error("backend returned a malformed counter configuration")]
	MalformedResolution,

	/// The backend cannot serve the requested [scope].
	///
	/// [scope]: ../enum.Scope.html
	#[error("unsupported counter scope")]
	BadScope,

	/// Another measurement is already running in this process.
	#[error("a measurement is already running")]
	SessionActive,
}

#[doc(hidden)]
impl PartialEq for Error {
	fn eq(&self, other: &Error) -> bool {
		self.kind == other.kind
	}
}

impl Error {
	/// The kind of failure.
	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Self {
		new_error(kind)
	}
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn new_os_error(kind: ErrorKind) -> Error {
	// Get the last OS error to reference as the cause
	new_error_with_cause(kind, io::Error::last_os_error())
}

pub(crate) fn new_error_with_cause(kind: ErrorKind, cause: io::Error) -> Error {
	Error {
		kind,
		cause: Some(cause),
	}
}

pub(crate) fn new_error(kind: ErrorKind) -> Error {
	Error { kind, cause: None }
}
