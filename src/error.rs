//! # Error Handling for notilog
//!
//! A single error enum ([`Error`]) covers every failure mode of the event
//! store, the notification log, and channel publishing. Callers match on the
//! variant to decide whether to fix their input, investigate the data, or
//! simply retry.
//!
//! ## Error Categories
//!
//! | Category | Variants | Typical Response |
//! |----------|----------|------------------|
//! | Argument | `InvalidArgument`, `InvalidWindow`, `InvalidWindowFormat` | Fix the caller, never retry |
//! | Data | `UnknownEventType`, `Decode`, `Encode` | Hard failure: data corruption or deployment skew |
//! | Transport | `Transport`, `PublishTimeout`, `SubscriptionLagged` | Retry; the cursor was not advanced |
//! | Internal | `Sqlite`, `Schema`, `Internal` | Log and investigate |
//!
//! Undecodable records are never skipped. Skipping one would let a consumer
//! observe a hole in the sequence and break the ordering guarantee.

use thiserror::Error;

use crate::publisher::TransportError;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in notilog operations.
///
/// # Example
///
/// ```rust
/// use notilog::{Error, WindowId};
///
/// let err = WindowId::new(15, 11).unwrap_err();
/// assert!(matches!(err, Error::InvalidWindow { low: 15, high: 11 }));
/// assert!(!err.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Argument Errors (caller bug, never retried)
    // =========================================================================

    /// A required input was absent or malformed.
    ///
    /// Raised for an absent event on append, an empty channel name, or a
    /// zero batch size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A window was constructed with `low > high`.
    #[error("invalid window: low bound {low} is greater than high bound {high}")]
    InvalidWindow {
        /// The requested low bound
        low: i64,
        /// The requested high bound
        high: i64,
    },

    /// A window id string was not of the form `"<low>,<high>"`.
    #[error("invalid window id '{0}': expected \"<low>,<high>\"")]
    InvalidWindowFormat(String),

    // =========================================================================
    // Data Errors (fatal for the affected record)
    // =========================================================================

    /// A stored record's type tag has no registered decoder.
    ///
    /// # When This Happens
    ///
    /// - A producer running newer code stored an event this process does not
    ///   know about (deployment skew)
    /// - The decoder registry was not populated at startup
    ///
    /// # Recovery
    ///
    /// Register the missing decoder and redeploy. The record stays in the
    /// store untouched; reads resume once the tag resolves.
    #[error("unknown event type '{event_type}': no decoder registered")]
    UnknownEventType {
        /// The unresolved type tag
        event_type: String,
    },

    /// A stored body could not be parsed by the decoder for its type tag.
    #[error("failed to decode event of type '{event_type}': {source}")]
    Decode {
        /// The type tag whose decoder rejected the body
        event_type: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// An event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    // =========================================================================
    // Transport Errors (recoverable, retry resumes from the cursor)
    // =========================================================================

    /// The external publisher failed to ship a batch.
    ///
    /// # Recovery
    ///
    /// Call publish again. The cursor was left where it was, so the same
    /// notifications (and possibly newer ones) are sent again. Consumers
    /// deduplicate on `(event_type, stored_event_id)`.
    #[error("publish to channel '{channel}' failed: {source}")]
    Transport {
        /// The channel being published
        channel: String,
        /// What the transport reported
        #[source]
        source: TransportError,
    },

    /// The publisher did not finish within the configured timeout.
    ///
    /// Treated exactly like a failed publish: the cursor is not advanced.
    #[error("publish to channel '{channel}' timed out after {timeout_ms}ms")]
    PublishTimeout {
        /// The channel being published
        channel: String,
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// An in-process subscriber fell behind and missed notifications.
    #[error("subscription lagged: {0} notifications were missed")]
    SubscriptionLagged(u64),

    // =========================================================================
    // Internal Errors (investigate and fix)
    // =========================================================================

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema version mismatch or corruption detected.
    #[error("schema error: {0}")]
    Schema(String),

    /// An invariant of this crate was violated at runtime.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if retrying the same call may succeed.
    ///
    /// Only transport failures qualify. Argument and data errors will fail
    /// the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::PublishTimeout { .. })
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
