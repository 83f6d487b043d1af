
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::classify::{cancelled_before_send, exchange};
use crate::client::VoicevoxClient;
use crate::query_params::QueryParameters;
use crate::types::AudioQuery;
use crate::uncertain::UncertainResult;
use crate::{ClientError, ClientErrorDescription};

pub const SYNTHESIS_ENDPOINT: &str = "/synthesis";
pub const CANCELLABLE_SYNTHESIS_ENDPOINT: &str = "/cancellable_synthesis";

/// Unread WAV body of a successful synthesis.
///
/// The handle owns the underlying connection; dropping it, on any path, releases it.
///
/// A response without a `Content-Length` (chunked) may still turn out to be empty. That only
/// shows on read, as a first [`chunk`](Self::chunk) of `None` or zero [`bytes`](Self::bytes).
#[derive(Debug)]
pub struct AudioStream {
    response: Response,
}

impl AudioStream {
    pub(crate) fn new(response: Response) -> Self {
        Self { response }
    }

    /// Length advertised by the engine, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Next chunk of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        self.response.chunk().await.map_err(stream_error)
    }

    /// Reads the rest of the body into memory.
    pub async fn bytes(self) -> Result<Bytes, ClientError> {
        self.response.bytes().await.map_err(stream_error)
    }

    pub fn into_byte_stream(self) -> impl Stream<Item = Result<Bytes, ClientError>> + Send {
        self.response.bytes_stream().map_err(stream_error)
    }

    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(Box::pin(
            self.response
                .bytes_stream()
                .map_err(std::io::Error::other),
        ))
    }
}

fn stream_error(err: reqwest::Error) -> ClientError {
    ClientError::new(ClientErrorDescription::Stream(err))
}

impl VoicevoxClient {
    /// `POST /synthesis`: renders `audio_query` as WAV.
    pub async fn synthesize(
        &self,
        audio_query: &AudioQuery,
        speaker: u32,
        enable_interrogative_upspeak: Option<bool>,
        core_version: Option<&str>,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioStream> {
        let mut params = QueryParameters::new();
        params
            .push("speaker", speaker)
            .push_optional("enable_interrogative_upspeak", enable_interrogative_upspeak)
            .push_optional("core_version", core_version);

        self.request_synthesis(SYNTHESIS_ENDPOINT, audio_query, params, cancel).await
    }

    /// `POST /cancellable_synthesis`. The endpoint takes no `enable_interrogative_upspeak`.
    pub async fn cancellable_synthesize(
        &self,
        audio_query: &AudioQuery,
        speaker: u32,
        core_version: Option<&str>,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioStream> {
        let mut params = QueryParameters::new();
        params
            .push("speaker", speaker)
            .push_optional("core_version", core_version);

        self.request_synthesis(CANCELLABLE_SYNTHESIS_ENDPOINT, audio_query, params, cancel).await
    }

    async fn request_synthesis(
        &self,
        endpoint: &str,
        audio_query: &AudioQuery,
        params: QueryParameters,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioStream> {
        if cancel.is_cancelled() {
            return cancelled_before_send();
        }

        let body = match serde_json::to_vec(audio_query) {
            Ok(body) => body,
            Err(e) => {
                return UncertainResult::fail(format!("Failed to serialize AudioQuery because -> {}.", e));
            }
        };

        let url = self.endpoint_url(endpoint, &params.build());
        log::debug!("POST {} ({} bytes of query)", endpoint, body.len());

        let request = self
            .http()
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        exchange(request, cancel, |response| async move {
            // Only an advertised zero length is caught here; a chunked empty body passes.
            if response.content_length() == Some(0) {
                return UncertainResult::fail("Failed because response stream is empty.");
            }
            UncertainResult::Success(AudioStream::new(response))
        })
        .await
    }
}
