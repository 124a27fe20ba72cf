//! Error taxonomy shared by every provider
//!
//! Upstream failures are classified by structured keys first (HTTP status,
//! S3-style error code). Message fragments are only consulted together with a
//! status, never on their own.

use std::fmt;

/// Kind of failure reported by a provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthenticated,
    Forbidden,
    Validation,
    Conflict,
    RateLimited,
    ServerError,
    Transport,
    Canceled,
    Timeout,
    /// Provider configuration is missing or malformed
    Config,
    /// Caller input rejected before any upstream call
    Invalid,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::ServerError => "server error",
            ErrorKind::Transport => "transport error",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Config => "configuration error",
            ErrorKind::Invalid => "invalid input",
            ErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

/// Result of classifying an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
}

impl Classification {
    pub const fn new(kind: ErrorKind, retryable: bool) -> Self {
        Self { kind, retryable }
    }
}

/// Classify an HTTP status code
pub fn classify_status(status: u16) -> Classification {
    match status {
        401 => Classification::new(ErrorKind::Unauthenticated, false),
        403 => Classification::new(ErrorKind::Forbidden, false),
        404 => Classification::new(ErrorKind::NotFound, false),
        409 => Classification::new(ErrorKind::Conflict, false),
        400 | 422 => Classification::new(ErrorKind::Validation, false),
        429 => Classification::new(ErrorKind::RateLimited, true),
        500..=599 => Classification::new(ErrorKind::ServerError, true),
        _ => Classification::new(ErrorKind::Other, false),
    }
}

/// Classify an S3-compatible error code (e.g. `NoSuchKey`)
pub fn classify_s3_code(code: &str) -> Classification {
    match code {
        "NoSuchBucket" | "NoSuchKey" | "NoSuchBucketPolicy" | "BucketDeleted" | "NotFound"
        | "NoSuchLifecycleConfiguration" | "NoSuchCORSConfiguration" => {
            Classification::new(ErrorKind::NotFound, false)
        }
        "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
            Classification::new(ErrorKind::Unauthenticated, false)
        }
        "AccessDenied" => Classification::new(ErrorKind::Forbidden, false),
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" | "BucketNotEmpty" => {
            Classification::new(ErrorKind::Conflict, false)
        }
        "MalformedPolicy" | "InvalidArgument" | "InvalidBucketName" | "MalformedXML" => {
            Classification::new(ErrorKind::Validation, false)
        }
        "SlowDown" | "TooManyRequests" => Classification::new(ErrorKind::RateLimited, true),
        "InternalError" | "ServiceUnavailable" => {
            Classification::new(ErrorKind::ServerError, true)
        }
        _ => Classification::new(ErrorKind::Other, false),
    }
}

/// Case-insensitive substring match used alongside a status check
pub fn message_contains(message: &str, fragment: &str) -> bool {
    message.to_lowercase().contains(&fragment.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_kinds() {
        assert_eq!(classify_status(404).kind, ErrorKind::NotFound);
        assert_eq!(classify_status(401).kind, ErrorKind::Unauthenticated);
        assert_eq!(classify_status(403).kind, ErrorKind::Forbidden);
        assert_eq!(classify_status(422).kind, ErrorKind::Validation);
        assert_eq!(classify_status(409).kind, ErrorKind::Conflict);
        assert!(classify_status(429).retryable);
        assert!(classify_status(503).retryable);
        assert!(!classify_status(422).retryable);
    }

    #[test]
    fn s3_codes_map_to_kinds() {
        assert_eq!(classify_s3_code("NoSuchKey").kind, ErrorKind::NotFound);
        assert_eq!(classify_s3_code("BucketDeleted").kind, ErrorKind::NotFound);
        assert_eq!(classify_s3_code("AccessDenied").kind, ErrorKind::Forbidden);
        assert_eq!(classify_s3_code("SlowDown").kind, ErrorKind::RateLimited);
        assert_eq!(classify_s3_code("Whatever").kind, ErrorKind::Other);
    }

    #[test]
    fn message_match_ignores_case() {
        assert!(message_contains("Droplet Is Not Attached", "not attached"));
        assert!(!message_contains("attached", "detached"));
    }
}
