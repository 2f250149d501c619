// Error types for the wildlife-call analysis engine
//
// The engine returns every failure as a typed `EngineError` variant rather
// than panicking or propagating an exception. This mirrors the teacher
// crate's `error/audio.rs` shape: a numeric code range, a `Display` impl,
// and a small `ErrorCode` trait so callers (and the out-of-scope FFI/HTTP
// wrappers) can report errors uniformly.

use std::fmt;

/// Error codes for structured error reporting
///
/// Provides a standard way to get error codes and messages from the engine's
/// error type, enabling consistent error handling across callers.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Engine error code constants.
///
/// Error code range: 2001-2010.
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    pub const CONFIGURATION_ERROR: i32 = 2001;
    pub const SESSION_NOT_FOUND: i32 = 2002;
    pub const MASTER_NOT_FOUND: i32 = 2003;
    pub const DECODE_FAILED: i32 = 2004;
    pub const BAD_FORMAT: i32 = 2005;
    pub const NOT_READY: i32 = 2006;
    pub const FINALIZED: i32 = 2007;
    pub const NO_MASTER: i32 = 2008;
    pub const NO_DATA: i32 = 2009;
    pub const RESOURCE_EXHAUSTED: i32 = 2010;
    pub const INTERNAL: i32 = 2011;
}

/// Log an engine error with structured context.
pub fn log_engine_error(err: &EngineError, context: &str) {
    log::error!(
        "Engine error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors returned by every public `Engine`/`Session` operation.
///
/// Every public call returns one of these typed variants; none of the
/// engine's internal control flow escapes a call boundary as a panic or
/// exception.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid sample rate, unsupported window/hop combination, or
    /// inconsistent score weights.
    ConfigurationError { details: String },

    /// Operation referenced an unknown or already-destroyed session id.
    SessionNotFound { session_id: u64 },

    /// Master identifier could not be resolved by the master source.
    MasterNotFound { master_id: String },

    /// Master audio was resolved but failed to decode.
    DecodeFailed { master_id: String, reason: String },

    /// Chunk sample rate mismatch, zero-length chunk, or non-finite samples.
    BadFormat { details: String },

    /// Similarity/finalize results requested before readiness/finalize.
    NotReady,

    /// `process_chunk` called after `finalize`.
    Finalized,

    /// `finalize` called without a bound master.
    NoMaster,

    /// `finalize` found no usable active segment.
    NoData,

    /// Allocation or buffer-capacity failure.
    ResourceExhausted { details: String },

    /// An internal invariant was violated; should not occur in practice.
    Internal { details: String },
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::ConfigurationError { .. } => EngineErrorCodes::CONFIGURATION_ERROR,
            EngineError::SessionNotFound { .. } => EngineErrorCodes::SESSION_NOT_FOUND,
            EngineError::MasterNotFound { .. } => EngineErrorCodes::MASTER_NOT_FOUND,
            EngineError::DecodeFailed { .. } => EngineErrorCodes::DECODE_FAILED,
            EngineError::BadFormat { .. } => EngineErrorCodes::BAD_FORMAT,
            EngineError::NotReady => EngineErrorCodes::NOT_READY,
            EngineError::Finalized => EngineErrorCodes::FINALIZED,
            EngineError::NoMaster => EngineErrorCodes::NO_MASTER,
            EngineError::NoData => EngineErrorCodes::NO_DATA,
            EngineError::ResourceExhausted { .. } => EngineErrorCodes::RESOURCE_EXHAUSTED,
            EngineError::Internal { .. } => EngineErrorCodes::INTERNAL,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::ConfigurationError { details } => {
                format!("Invalid configuration: {}", details)
            }
            EngineError::SessionNotFound { session_id } => {
                format!("No session with id {}", session_id)
            }
            EngineError::MasterNotFound { master_id } => {
                format!("Master call '{}' could not be resolved", master_id)
            }
            EngineError::DecodeFailed { master_id, reason } => {
                format!("Failed to decode master call '{}': {}", master_id, reason)
            }
            EngineError::BadFormat { details } => format!("Malformed audio chunk: {}", details),
            EngineError::NotReady => {
                "Session has not yet reached readiness; poll get_realtime_state".to_string()
            }
            EngineError::Finalized => "Session has already been finalized".to_string(),
            EngineError::NoMaster => "finalize() called without a bound master call".to_string(),
            EngineError::NoData => {
                "finalize() found no active segment of usable audio".to_string()
            }
            EngineError::ResourceExhausted { details } => {
                format!("Resource exhausted: {}", details)
            }
            EngineError::Internal { details } => format!("Internal invariant violation: {}", details),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::NotReady.code(),
            EngineErrorCodes::NOT_READY
        );
        assert_eq!(
            EngineError::SessionNotFound { session_id: 3 }.code(),
            EngineErrorCodes::SESSION_NOT_FOUND
        );
        assert_eq!(
            EngineError::NoData.code(),
            EngineErrorCodes::NO_DATA
        );
    }

    #[test]
    fn test_messages_reference_arguments() {
        let err = EngineError::SessionNotFound { session_id: 42 };
        assert!(err.message().contains("42"));

        let err = EngineError::MasterNotFound {
            master_id: "buck_grunt".to_string(),
        };
        assert!(err.message().contains("buck_grunt"));
    }

    #[test]
    fn test_display_includes_code() {
        let err = EngineError::Finalized;
        let rendered = format!("{}", err);
        assert!(rendered.contains(&err.code().to_string()));
    }
}
