
//! Client for the VOICEVOX engine HTTP API.
//!
//! Speech is produced in two steps: [`VoicevoxClient::create_query`] turns text into an
//! [`AudioQuery`], and [`VoicevoxClient::synthesize`] renders that query as a WAV stream.
//! Every call returns an [`UncertainResult`] telling apart success, failures worth retrying
//! and permanent failures; [`policy`] provides the retry and circuit-breaker wrappers.

pub mod classify;
mod client;
pub mod decode;
pub mod error;
pub mod error_body;
pub mod policy;
pub mod query_params;
mod query_creation;
mod speech;
mod synthesis;
pub mod types;
mod uncertain;

pub mod deps {
    pub use reqwest;
    pub use serde;
    pub use serde_json;
    pub use tokio_util;
}

pub use client::{initialize, ClientConfig, VoicevoxClient, DEFAULT_BASE_URL};
pub use decode::{AudioDecoder, DecodedAudio, WavDecoder};
pub use error::{ErrorDescription, GenericError};
pub use policy::{Backoff, CircuitBreaker, CircuitState, Policy, RetryPolicy, SingleAttempt};
pub use query_creation::{AUDIO_QUERY_ENDPOINT, AUDIO_QUERY_FROM_PRESET_ENDPOINT};
pub use speech::{SpeechPipeline, SpeechRequest, Voice};
pub use synthesis::{AudioStream, CANCELLABLE_SYNTHESIS_ENDPOINT, SYNTHESIS_ENDPOINT};
pub use types::{AccentPhrase, AudioQuery, Mora};
pub use uncertain::UncertainResult;

pub use tokio_util::sync::CancellationToken;

#[non_exhaustive]
#[derive(Debug)]
pub enum ClientErrorDescription {
    AlreadyInitialized,
    NotInitialized,
    InvalidBaseUrl(String),
    ClientBuildFailed(reqwest::Error),
    /// An unsuccessful call that may succeed when repeated.
    Retryable(String),
    /// An unsuccessful call that will not succeed when repeated.
    Failure(String),
    Stream(reqwest::Error),
    Decode(hound::Error),
    UnsupportedAudio(String),
}

impl ErrorDescription for ClientErrorDescription {
    #[allow(refining_impl_trait)]
    fn description(&self) -> String {
        match self {
            Self::AlreadyInitialized => "Client is already initialized".to_string(),
            Self::NotInitialized => "Client is not initialized".to_string(),
            Self::InvalidBaseUrl(url) => format!("Invalid base URL: {}", url),
            Self::ClientBuildFailed(e) => format!("Failed to build HTTP client: {}", e),
            Self::Retryable(reason) | Self::Failure(reason) => reason.clone(),
            Self::Stream(e) => format!("Failed to read audio stream: {}", error::error_chain(e)),
            Self::Decode(e) => format!("Failed to decode audio: {}", e),
            Self::UnsupportedAudio(format) => format!("Unsupported audio format: {}", format),
        }
    }

    fn code(&self) -> Option<i32> {
        match self {
            Self::Stream(e) => e.status().map(|status| status.as_u16() as i32),
            _ => None,
        }
    }

    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ClientBuildFailed(e) | Self::Stream(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Stream(_))
    }
}

pub type ClientError = GenericError<ClientErrorDescription>;
