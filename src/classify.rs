
//! Maps HTTP exchanges onto [`UncertainResult`].
//!
//! | outcome                                  | result    |
//! |------------------------------------------|-----------|
//! | 200 with a usable body                   | Success   |
//! | 200 with an empty or unparsable body     | Failure   |
//! | 429, 500..=599                           | Retryable |
//! | any other status                         | Failure   |
//! | cancelled before or during the call      | Retryable |
//! | connect, timeout or other transport error| Retryable |
//! | anything else                            | Failure   |

use std::future::Future;

use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::error_chain;
use crate::error_body::ErrorBody;
use crate::uncertain::UncertainResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Failure,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200 => StatusClass::Success,
        429 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Failure,
    }
}

/// Result for a non-200 response.
pub fn classify_rejection<T>(status: StatusCode, body: &str) -> UncertainResult<T> {
    let mut detail = format!(
        "the API returned status code:({}){} with response -> {}.",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        body,
    );
    if let Some(summary) = ErrorBody::parse(body).and_then(|body| body.summary()) {
        detail.push_str(" Detail -> ");
        detail.push_str(&summary);
    }

    match classify_status(status) {
        StatusClass::Retryable => UncertainResult::retry(format!("Retryable because {}", detail)),
        StatusClass::Success | StatusClass::Failure => UncertainResult::fail(format!("Failed because {}", detail)),
    }
}

pub fn classify_transport_error<T>(err: &reqwest::Error) -> UncertainResult<T> {
    let detail = error_chain(err);
    if err.is_builder() || err.is_redirect() {
        UncertainResult::fail(format!("Failed because the request could not be sent -> {}.", detail))
    } else if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        UncertainResult::retry(format!(
            "Retryable because an HTTP transport error was thrown during calling the API -> {}.",
            detail
        ))
    } else {
        UncertainResult::fail(format!(
            "Failed because an unhandled error was thrown when calling the API -> {}.",
            detail
        ))
    }
}

pub fn cancelled_before_send<T>() -> UncertainResult<T> {
    UncertainResult::retry("Retryable because cancellation has been already requested.")
}

pub fn cancelled_in_flight<T>() -> UncertainResult<T> {
    UncertainResult::retry("Retryable because the call was cancelled by the caller during calling the API.")
}

/// Sends `request` and classifies the exchange. A 200 response is handed to `on_ok`.
///
/// `cancel` is raced against the send, the handling of a 200 response and the read of an
/// error body.
pub(crate) async fn exchange<T, F, Fut>(
    request: RequestBuilder,
    cancel: &CancellationToken,
    on_ok: F,
) -> UncertainResult<T>
where
    F: FnOnce(Response) -> Fut,
    Fut: Future<Output = UncertainResult<T>>,
{
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return cancelled_in_flight(),
        response = request.send() => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => return classify_transport_error(&e),
    };

    let status = response.status();
    if classify_status(status) == StatusClass::Success {
        return tokio::select! {
            biased;
            _ = cancel.cancelled() => cancelled_in_flight(),
            result = on_ok(response) => result,
        };
    }

    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return cancelled_in_flight(),
        body = response.text() => body.unwrap_or_else(|e| format!("<unreadable body: {}>", error_chain(&e))),
    };
    log::debug!("API rejected the request with status {}", status);
    classify_rejection(status, &body)
}
