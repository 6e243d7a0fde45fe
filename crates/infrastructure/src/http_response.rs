use bureau_core::{AppError, AppResult};
use reqwest::{Response, StatusCode};

/// Returns whether an upstream status is worth retrying.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Passes successful responses through and classifies the rest.
///
/// Server errors and throttling become `Unavailable`, which the automation
/// engine retries; other statuses are `Validation` and fail the action.
pub(crate) async fn checked(response: Response, operation: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if is_transient_status(status) {
        return Err(AppError::Unavailable(format!(
            "{operation} returned transient HTTP status {status}"
        )));
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
    Err(AppError::Validation(format!(
        "{operation} failed with status {status}: {body}"
    )))
}

/// Maps a transport failure such as a refused connection or timeout.
pub(crate) fn transport_error(error: &reqwest::Error, operation: &str) -> AppError {
    AppError::Unavailable(format!("{operation} transport error: {error}"))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::is_transient_status;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
    }
}
