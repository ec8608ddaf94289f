//! Body size and timeout enforcement, consulted inside every wait.

use crate::error::ReceiveError;

/// Checks the running buffered-body size against the configured ceiling.
///
/// Exactly-at-limit passes; one byte over fails. No limit is enforced when
/// `max_body` is `None`.
pub(crate) fn check_max_body(max_body: Option<usize>, size: usize) -> Result<(), ReceiveError> {
    match max_body {
        Some(limit) if limit.checked_sub(size).is_none() => Err(ReceiveError::body_too_large(limit, size)),
        _ => Ok(()),
    }
}
