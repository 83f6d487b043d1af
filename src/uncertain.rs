
use crate::{ClientError, ClientErrorDescription};

/// Outcome of a single call attempt.
///
/// `Retryable` means the same call may succeed later (network trouble, rate limiting,
/// server faults, cancellation). `Failure` means repeating it will not help.
/// Reasons are diagnostic text and are not meant to be parsed.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum UncertainResult<T> {
    Success(T),
    Retryable(String),
    Failure(String),
}

impl<T> UncertainResult<T> {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retryable(reason.into())
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Retryable(reason) | Self::Failure(reason) => Some(reason),
        }
    }

    pub fn as_ref(&self) -> UncertainResult<&T> {
        match self {
            Self::Success(value) => UncertainResult::Success(value),
            Self::Retryable(reason) => UncertainResult::Retryable(reason.clone()),
            Self::Failure(reason) => UncertainResult::Failure(reason.clone()),
        }
    }

    pub fn map<U, F>(self, f: F) -> UncertainResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => UncertainResult::Success(f(value)),
            Self::Retryable(reason) => UncertainResult::Retryable(reason),
            Self::Failure(reason) => UncertainResult::Failure(reason),
        }
    }

    pub fn into_result(self) -> Result<T, ClientError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Retryable(reason) => Err(ClientError::new(ClientErrorDescription::Retryable(reason))),
            Self::Failure(reason) => Err(ClientError::new(ClientErrorDescription::Failure(reason))),
        }
    }
}
