#![forbid(unsafe_code)]

//! Error taxonomy for page fetching.
//!
//! # Failure Modes
//!
//! | Error | Cause | Caller behavior |
//! |-------|-------|-----------------|
//! | `StillLoading` | fetch requested while one is in flight | usually ignored |
//! | `EndOfPagination` | cursor already exhausted | hide "load more" |
//! | `Api` | non-2xx response | show `description` |
//! | `Transport` | connection failure or timeout | show message / retry |
//! | `Decode` | body did not match the envelope | report |
//! | `CacheReconciliation` | reset cleanup failed | retry the reset |
//! | `Worker` | background thread could not be spawned | retry |
//!
//! Cancellation is never surfaced through [`PaginationError`]; it only exists
//! inside the fetch pipeline ([`FetchError::Cancelled`]).

use std::fmt;
use std::io;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Description used when an error body carries no recognised field.
pub const GENERIC_ERROR_DESCRIPTION: &str = "Something went wrong. Please try again.";

/// Error-body fields checked for a human readable message, in priority order.
pub const ERROR_FIELDS: &[&str] = &[
    "username",
    "id",
    "first_name",
    "last_name",
    "phone",
    "birth_date",
    "email",
    "gender",
    "token",
    "password",
    "photo",
    "non_field_errors",
    "detail",
    "image",
    "provider",
];

/// A non-success response from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status_code: u16,
    pub description: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status_code: u16, description: impl Into<String>) -> Self {
        Self {
            status_code,
            description: description.into(),
        }
    }

    /// An error with the generic description.
    #[must_use]
    pub fn generic(status_code: u16) -> Self {
        Self::new(status_code, GENERIC_ERROR_DESCRIPTION)
    }

    /// Build an error from a response body.
    ///
    /// The body is parsed as a JSON object and [`ERROR_FIELDS`] are checked
    /// in order; the first field holding a message wins. Anything else falls
    /// back to [`GENERIC_ERROR_DESCRIPTION`].
    #[must_use]
    pub fn from_body(status_code: u16, body: &[u8]) -> Self {
        let description = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => describe(&map, ERROR_FIELDS),
            _ => None,
        };
        Self::new(
            status_code,
            description.unwrap_or_else(|| GENERIC_ERROR_DESCRIPTION.to_string()),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api error {}: {}", self.status_code, self.description)
    }
}

impl std::error::Error for ApiError {}

/// Fields whose message may arrive as a bare string rather than a list.
pub const PLAIN_STRING_FIELDS: &[&str] = &["email"];

/// First message found under `fields`, checked in order.
///
/// A field holds a message if it is an array whose first element is a
/// string. Fields in [`PLAIN_STRING_FIELDS`] may also hold a bare string.
#[must_use]
pub fn describe(body: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| body.get(*field).and_then(|value| field_message(field, value)))
}

fn field_message(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::String(message) if PLAIN_STRING_FIELDS.contains(&field) => Some(message.clone()),
        Value::Array(messages) => messages.first()?.as_str().map(str::to_owned),
        _ => None,
    }
}

/// Failure reported by a [`Transport`](crate::fetch::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request observed its cancel token.
    Cancelled,
    /// The transport's own timeout elapsed.
    Timeout,
    /// Connection-level failure.
    Connection(String),
    /// The endpoint could not be turned into a URL.
    InvalidUrl(url::ParseError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "request cancelled"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Connection(msg) => write!(f, "connection failed: {msg}"),
            Self::InvalidUrl(err) => write!(f, "invalid request url: {err}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidUrl(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure reported by a [`PageFetcher`](crate::fetch::PageFetcher).
#[derive(Debug)]
pub enum FetchError {
    Cancelled,
    Transport(TransportError),
    Api(ApiError),
    Decode(serde_json::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "fetch cancelled"),
            Self::Transport(err) => fmt::Display::fmt(err, f),
            Self::Api(err) => fmt::Display::fmt(err, f),
            Self::Decode(err) => write!(f, "invalid page body: {err}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cancelled => None,
            Self::Transport(err) => Some(err),
            Self::Api(err) => Some(err),
            Self::Decode(err) => Some(err),
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err)
    }
}

/// Failure reported by a [`LocalCache`](crate::cache::LocalCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    message: String,
}

impl CacheError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache error: {}", self.message)
    }
}

impl std::error::Error for CacheError {}

/// Reset-time cache cleanup did not complete.
///
/// Deletions that succeeded before or after the failing one stay applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileError {
    /// Stale items successfully deleted.
    pub removed: usize,
    /// Stale items whose deletion failed.
    pub failed: usize,
    /// The query failure, or the first deletion failure.
    pub cause: CacheError,
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache reconciliation failed ({} removed, {} failed): {}",
            self.removed, self.failed, self.cause
        )
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Error delivered to a `fetch_next_page` callback.
#[derive(Debug, Clone)]
pub enum PaginationError {
    /// A fetch is already in flight on this paginator.
    StillLoading,
    /// The listing has no further pages.
    EndOfPagination,
    Api(ApiError),
    Transport(TransportError),
    Decode(Arc<serde_json::Error>),
    CacheReconciliation(ReconcileError),
    /// The background worker could not be started.
    Worker(Arc<io::Error>),
}

impl PaginationError {
    #[must_use]
    pub fn is_still_loading(&self) -> bool {
        matches!(self, Self::StillLoading)
    }

    #[must_use]
    pub fn is_end_of_pagination(&self) -> bool {
        matches!(self, Self::EndOfPagination)
    }

    /// HTTP status for API errors.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status_code),
            _ => None,
        }
    }

    /// Message suitable for showing to a user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.description.clone(),
            _ => GENERIC_ERROR_DESCRIPTION.to_string(),
        }
    }

    /// Map a fetcher failure. `Cancelled` has no public counterpart.
    pub(crate) fn from_fetch(err: FetchError) -> Option<Self> {
        match err {
            FetchError::Cancelled => None,
            FetchError::Transport(TransportError::Cancelled) => None,
            FetchError::Transport(err) => Some(Self::Transport(err)),
            FetchError::Api(err) => Some(Self::Api(err)),
            FetchError::Decode(err) => Some(Self::Decode(Arc::new(err))),
        }
    }
}

impl fmt::Display for PaginationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StillLoading => write!(f, "still loading results"),
            Self::EndOfPagination => write!(f, "end of pagination"),
            Self::Api(err) => fmt::Display::fmt(err, f),
            Self::Transport(err) => fmt::Display::fmt(err, f),
            Self::Decode(err) => write!(f, "invalid page body: {err}"),
            Self::CacheReconciliation(err) => fmt::Display::fmt(err, f),
            Self::Worker(err) => write!(f, "failed to start fetch worker: {err}"),
        }
    }
}

impl std::error::Error for PaginationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StillLoading | Self::EndOfPagination => None,
            Self::Api(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Decode(err) => Some(&**err),
            Self::CacheReconciliation(err) => Some(err),
            Self::Worker(err) => Some(&**err),
        }
    }
}

impl From<ReconcileError> for PaginationError {
    fn from(err: ReconcileError) -> Self {
        Self::CacheReconciliation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_listed_field_wins() {
        let err = ApiError::from_body(
            400,
            br#"{"password": ["Too short."], "email": ["Enter a valid email."]}"#,
        );
        assert_eq!(err.status_code, 400);
        assert_eq!(err.description, "Enter a valid email.");
    }

    #[test]
    fn plain_string_email_matches() {
        let err = ApiError::from_body(400, br#"{"email": "Enter a valid email."}"#);
        assert_eq!(err.description, "Enter a valid email.");
    }

    #[test]
    fn plain_string_elsewhere_is_ignored() {
        let err = ApiError::from_body(404, br#"{"detail": "Not found."}"#);
        assert_eq!(err.description, GENERIC_ERROR_DESCRIPTION);

        let err = ApiError::from_body(
            400,
            br#"{"username": "Taken.", "detail": ["Not found."]}"#,
        );
        assert_eq!(err.description, "Not found.");
    }

    #[test]
    fn non_field_errors_match() {
        let err = ApiError::from_body(
            400,
            br#"{"non_field_errors": ["Unable to log in with provided credentials."]}"#,
        );
        assert_eq!(
            err.description,
            "Unable to log in with provided credentials."
        );
    }

    #[test]
    fn empty_array_falls_through_to_next_field() {
        let err = ApiError::from_body(400, br#"{"username": [], "token": ["Invalid token."]}"#);
        assert_eq!(err.description, "Invalid token.");
    }

    #[test]
    fn unknown_fields_fall_back_to_generic() {
        let err = ApiError::from_body(500, br#"{"trace": ["boom"]}"#);
        assert_eq!(err.description, GENERIC_ERROR_DESCRIPTION);
    }

    #[test]
    fn non_object_body_falls_back_to_generic() {
        assert_eq!(
            ApiError::from_body(502, b"<html>bad gateway</html>").description,
            GENERIC_ERROR_DESCRIPTION
        );
        assert_eq!(
            ApiError::from_body(400, br#"["a"]"#).description,
            GENERIC_ERROR_DESCRIPTION
        );
    }

    #[test]
    fn describe_honours_custom_order() {
        let body: Map<String, Value> =
            serde_json::from_str(r#"{"a": ["first"], "b": ["second"]}"#).unwrap();
        assert_eq!(describe(&body, &["b", "a"]), Some("second".to_string()));
        assert_eq!(describe(&body, &["c"]), None);
    }

    #[test]
    fn transport_cancel_becomes_fetch_cancel() {
        assert!(matches!(
            FetchError::from(TransportError::Cancelled),
            FetchError::Cancelled
        ));
        assert!(matches!(
            FetchError::from(TransportError::Timeout),
            FetchError::Transport(TransportError::Timeout)
        ));
    }

    #[test]
    fn cancellation_has_no_public_error() {
        assert!(PaginationError::from_fetch(FetchError::Cancelled).is_none());
        let api = PaginationError::from_fetch(FetchError::Api(ApiError::generic(503))).unwrap();
        assert_eq!(api.status_code(), Some(503));
    }

    #[test]
    fn user_message_prefers_api_description() {
        let err = PaginationError::Api(ApiError::new(400, "Nope."));
        assert_eq!(err.user_message(), "Nope.");
        assert_eq!(
            PaginationError::Transport(TransportError::Timeout).user_message(),
            GENERIC_ERROR_DESCRIPTION
        );
    }

    #[test]
    fn display_messages() {
        assert_eq!(PaginationError::StillLoading.to_string(), "still loading results");
        assert_eq!(PaginationError::EndOfPagination.to_string(), "end of pagination");
        let reconcile = ReconcileError {
            removed: 2,
            failed: 1,
            cause: CacheError::new("disk full"),
        };
        assert_eq!(
            PaginationError::from(reconcile).to_string(),
            "cache reconciliation failed (2 removed, 1 failed): cache error: disk full"
        );
    }
}
