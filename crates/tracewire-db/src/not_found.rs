//! "Record not found" detection

use std::error::Error as StdError;
use thiserror::Error;

/// A lookup matched no row
///
/// Data layers without their own not-found error can return this so the
/// interceptor recognises the condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("record not found")]
pub struct RecordNotFound;

/// Check if an error, or anything in its source chain, means "no row"
///
/// Recognises [`RecordNotFound`], plus `diesel::result::Error::NotFound` and
/// `sqlx::Error::RowNotFound` when the matching features are enabled.
pub fn is_record_not_found(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if is_not_found_variant(err) {
            return true;
        }
        current = err.source();
    }
    false
}

fn is_not_found_variant(err: &(dyn StdError + 'static)) -> bool {
    if err.is::<RecordNotFound>() {
        return true;
    }

    #[cfg(feature = "diesel")]
    if matches!(
        err.downcast_ref::<diesel::result::Error>(),
        Some(diesel::result::Error::NotFound)
    ) {
        return true;
    }

    #[cfg(feature = "sqlx")]
    if matches!(err.downcast_ref::<sqlx::Error>(), Some(sqlx::Error::RowNotFound)) {
        return true;
    }

    false
}
