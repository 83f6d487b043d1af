
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::classify::{cancelled_before_send, classify_transport_error, exchange};
use crate::client::VoicevoxClient;
use crate::query_params::QueryParameters;
use crate::types::AudioQuery;
use crate::uncertain::UncertainResult;

pub const AUDIO_QUERY_ENDPOINT: &str = "/audio_query";
pub const AUDIO_QUERY_FROM_PRESET_ENDPOINT: &str = "/audio_query_from_preset";

impl VoicevoxClient {
    /// `POST /audio_query`: builds an [`AudioQuery`] for `text` spoken by `speaker`.
    pub async fn create_query(
        &self,
        text: &str,
        speaker: u32,
        core_version: Option<&str>,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioQuery> {
        self.request_query(AUDIO_QUERY_ENDPOINT, text, ("speaker", speaker), core_version, cancel)
            .await
    }

    /// `POST /audio_query_from_preset`: same as [`create_query`](Self::create_query) with the
    /// voice and prosody taken from a preset registered in the engine.
    pub async fn create_query_from_preset(
        &self,
        text: &str,
        preset_id: u32,
        core_version: Option<&str>,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioQuery> {
        self.request_query(AUDIO_QUERY_FROM_PRESET_ENDPOINT, text, ("preset_id", preset_id), core_version, cancel)
            .await
    }

    async fn request_query(
        &self,
        endpoint: &str,
        text: &str,
        voice: (&str, u32),
        core_version: Option<&str>,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioQuery> {
        if text.is_empty() {
            return UncertainResult::fail("Failed because text is empty.");
        }

        if cancel.is_cancelled() {
            return cancelled_before_send();
        }

        let mut params = QueryParameters::new();
        params
            .push("text", text)
            .push(voice.0, voice.1)
            .push_optional("core_version", core_version);

        let url = self.endpoint_url(endpoint, &params.build());
        log::debug!("POST {}", endpoint);

        exchange(self.http().post(url), cancel, parse_audio_query).await
    }
}

async fn parse_audio_query(response: Response) -> UncertainResult<AudioQuery> {
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return classify_transport_error(&e),
    };

    if text.trim().is_empty() {
        return UncertainResult::fail("Failed because response body is empty.");
    }

    match AudioQuery::from_json(&text) {
        Ok(query) => UncertainResult::Success(query),
        Err(e) => UncertainResult::fail(format!(
            "Failed to deserialize response to AudioQuery because -> {}.",
            e
        )),
    }
}
