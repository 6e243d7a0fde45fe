use bureau_core::AppError;

/// Maps a storage failure to the application error taxonomy.
///
/// Connection-level failures become `Unavailable` so callers can fail closed
/// or retry; everything else is `Internal`.
pub(crate) fn store_error(error: sqlx::Error, action: &str) -> AppError {
    match error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => AppError::Unavailable(format!("failed to {action}: {error}")),
        error => AppError::Internal(format!("failed to {action}: {error}")),
    }
}

/// Returns whether the error is a PostgreSQL unique violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(database_error) if database_error.code().as_deref() == Some("23505")
    )
}

#[cfg(test)]
mod tests {
    use bureau_core::AppError;

    use super::{is_unique_violation, store_error};

    #[test]
    fn connection_failures_are_unavailable() {
        let error = store_error(sqlx::Error::PoolTimedOut, "load grants");
        assert!(matches!(error, AppError::Unavailable(message) if message.contains("load grants")));
    }

    #[test]
    fn other_failures_are_internal() {
        let error = store_error(sqlx::Error::RowNotFound, "load grants");
        assert!(matches!(error, AppError::Internal(_)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
