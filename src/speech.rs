
use tokio_util::sync::CancellationToken;

use crate::client::VoicevoxClient;
use crate::policy::Policy;
use crate::synthesis::AudioStream;
use crate::types::AudioQuery;
use crate::uncertain::UncertainResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Speaker(u32),
    /// Preset registered in the engine. Synthesis uses the preset's speaker.
    Preset { preset_id: u32, speaker: u32 },
}

impl Voice {
    pub fn speaker(&self) -> u32 {
        match *self {
            Self::Speaker(speaker) => speaker,
            Self::Preset { speaker, .. } => speaker,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
    pub enable_interrogative_upspeak: Option<bool>,
    pub core_version: Option<String>,
    /// Use `/cancellable_synthesis`, which ignores `enable_interrogative_upspeak`.
    pub cancellable: bool,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
            enable_interrogative_upspeak: None,
            core_version: None,
            cancellable: false,
        }
    }
}

/// Text to WAV: query creation then synthesis, each stage behind its own policy.
#[derive(Debug, Clone)]
pub struct SpeechPipeline<QP, SP> {
    client: VoicevoxClient,
    query_policy: QP,
    synthesis_policy: SP,
}

impl<QP, SP> SpeechPipeline<QP, SP>
where
    QP: Policy,
    SP: Policy,
{
    pub fn new(client: VoicevoxClient, query_policy: QP, synthesis_policy: SP) -> Self {
        Self {
            client,
            query_policy,
            synthesis_policy,
        }
    }

    pub fn client(&self) -> &VoicevoxClient {
        &self.client
    }

    pub async fn create_query(&self, request: &SpeechRequest, cancel: &CancellationToken) -> UncertainResult<AudioQuery> {
        let client = &self.client;
        let text = request.text.as_str();
        let core_version = request.core_version.as_deref();
        let voice = request.voice;

        self.query_policy
            .execute(cancel, move |token| async move {
                match voice {
                    Voice::Speaker(speaker) => client.create_query(text, speaker, core_version, &token).await,
                    Voice::Preset { preset_id, .. } => {
                        client.create_query_from_preset(text, preset_id, core_version, &token).await
                    }
                }
            })
            .await
    }

    pub async fn synthesize(
        &self,
        request: &SpeechRequest,
        audio_query: &AudioQuery,
        cancel: &CancellationToken,
    ) -> UncertainResult<AudioStream> {
        let client = &self.client;
        let speaker = request.voice.speaker();
        let core_version = request.core_version.as_deref();
        let upspeak = request.enable_interrogative_upspeak;
        let cancellable = request.cancellable;

        self.synthesis_policy
            .execute(cancel, move |token| async move {
                if cancellable {
                    client.cancellable_synthesize(audio_query, speaker, core_version, &token).await
                } else {
                    client.synthesize(audio_query, speaker, upspeak, core_version, &token).await
                }
            })
            .await
    }

    pub async fn speak(&self, request: &SpeechRequest, cancel: &CancellationToken) -> UncertainResult<AudioStream> {
        let audio_query = match self.create_query(request, cancel).await {
            UncertainResult::Success(query) => query,
            UncertainResult::Retryable(reason) => return UncertainResult::Retryable(reason),
            UncertainResult::Failure(reason) => return UncertainResult::Failure(reason),
        };
        log::debug!(
            "Created audio query with {} accent phrases ({} moras)",
            audio_query.accent_phrases.len(),
            audio_query.mora_count()
        );

        self.synthesize(request, &audio_query, cancel).await
    }
}
