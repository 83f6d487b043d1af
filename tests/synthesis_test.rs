mod common;

use std::io::Cursor;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use voicevox_api::{
    AudioDecoder, Backoff, CancellationToken, ClientConfig, RetryPolicy, SingleAttempt, SpeechPipeline,
    SpeechRequest, UncertainResult, Voice, VoicevoxClient, WavDecoder,
};
use wiremock::matchers::{any, body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{audio_query, client_for, wav_bytes, QUERY_JSON};

#[tokio::test]
async fn synthesizes_wav_stream() {
    let server = MockServer::start().await;
    let query = audio_query();
    let wav = wav_bytes();

    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .and(query_param("speaker", "0"))
        .and(query_param("enable_interrogative_upspeak", "true"))
        .and(query_param("core_version", "0.14.3"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::to_value(&query).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav.clone(), "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .synthesize(&query, 0, Some(true), Some("0.14.3"), &CancellationToken::new())
        .await;

    let stream = result.success().expect("synthesis should succeed");
    assert_eq!(stream.content_length(), Some(wav.len() as u64));
    assert_eq!(stream.content_type(), Some("audio/wav"));
    assert_eq!(stream.bytes().await.unwrap().as_ref(), wav.as_slice());
}

#[tokio::test]
async fn cancellable_synthesis_omits_upspeak() {
    let server = MockServer::start().await;
    let query = audio_query();

    Mock::given(method("POST"))
        .and(path("/cancellable_synthesis"))
        .and(query_param("speaker", "3"))
        .and(query_param_is_missing("enable_interrogative_upspeak"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav_bytes(), "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .cancellable_synthesize(&query, 3, None, &CancellationToken::new())
        .await;
    assert!(result.is_success());
}

#[tokio::test]
async fn stream_can_be_read_in_chunks_or_as_reader() {
    let server = MockServer::start().await;
    let wav = wav_bytes();
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav.clone(), "audio/wav"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = audio_query();
    let cancel = CancellationToken::new();

    let mut stream = client.synthesize(&query, 0, None, None, &cancel).await.success().unwrap();
    let mut received = Vec::new();
    while let Some(chunk) = stream.chunk().await.unwrap() {
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, wav);

    let stream = client.synthesize(&query, 0, None, None, &cancel).await.success().unwrap();
    let mut reader = stream.into_async_read();
    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, wav);
}

#[tokio::test]
async fn cancelled_token_skips_both_endpoints() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav_bytes(), "audio/wav"))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = audio_query();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(client.synthesize(&query, 0, None, None, &cancel).await.is_retryable());
    assert!(client.cancellable_synthesize(&query, 0, None, &cancel).await.is_retryable());
}

#[tokio::test]
async fn classifies_synthesis_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("speaker", "1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine crashed"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("speaker", "2"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"detail":"Not Found"}"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("speaker", "3"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = audio_query();
    let cancel = CancellationToken::new();

    let result = client.synthesize(&query, 1, None, None, &cancel).await;
    assert!(result.is_retryable());
    assert!(result.reason().unwrap().contains("engine crashed"));

    let result = client.synthesize(&query, 2, None, None, &cancel).await;
    assert!(result.is_failure());
    assert!(result.reason().unwrap().contains("(404)Not Found"));

    let result = client.synthesize(&query, 3, None, None, &cancel).await;
    assert!(result.is_failure());
    assert_eq!(result.reason(), Some("Failed because response stream is empty."));
}

#[tokio::test]
async fn connection_refused_is_retryable_with_cause() {
    let client = VoicevoxClient::new(ClientConfig::new(common::refused_base_url())).unwrap();

    let result = client
        .synthesize(&audio_query(), 0, None, None, &CancellationToken::new())
        .await;
    assert!(result.is_retryable());
    assert!(result.reason().unwrap().contains("Connection refused"), "{}", result.reason().unwrap());
}

#[tokio::test]
async fn speaks_text_end_to_end() {
    let server = MockServer::start().await;
    let wav = wav_bytes();

    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .and(query_param("text", "テスト"))
        .and(query_param("speaker", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(QUERY_JSON))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .and(query_param("speaker", "0"))
        .and(body_json(serde_json::to_value(audio_query()).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav.clone(), "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = SpeechPipeline::new(client_for(&server), SingleAttempt, SingleAttempt);
    let request = SpeechRequest::new("テスト", Voice::Speaker(0));

    let stream = pipeline
        .speak(&request, &CancellationToken::new())
        .await
        .success()
        .expect("speech should succeed");
    assert_eq!(stream.content_length(), Some(wav.len() as u64));

    let bytes = stream.bytes().await.unwrap();
    let audio = WavDecoder.decode(Cursor::new(bytes), "Synthesis.wav").unwrap();
    assert_eq!(audio.sample_rate, 24000);
    assert_eq!(audio.frames(), 2400);
}

#[tokio::test]
async fn pipeline_uses_preset_speaker_and_retries_synthesis() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio_query_from_preset"))
        .and(query_param("preset_id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(QUERY_JSON))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cancellable_synthesis"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cancellable_synthesis"))
        .and(query_param("speaker", "4"))
        .and(query_param_is_missing("enable_interrogative_upspeak"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav_bytes(), "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;

    let retry = RetryPolicy::new(3).with_backoff(Backoff::Constant(Duration::from_millis(5)));
    let pipeline = SpeechPipeline::new(client_for(&server), retry.clone(), retry);

    let mut request = SpeechRequest::new("テスト", Voice::Preset { preset_id: 7, speaker: 4 });
    request.enable_interrogative_upspeak = Some(true);
    request.cancellable = true;

    let result = pipeline.speak(&request, &CancellationToken::new()).await;
    assert!(matches!(result, UncertainResult::Success(_)));
}

#[tokio::test]
async fn pipeline_stops_when_query_creation_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav_bytes(), "audio/wav"))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = SpeechPipeline::new(client_for(&server), RetryPolicy::new(3), RetryPolicy::new(3));
    let result = pipeline
        .speak(&SpeechRequest::new("テスト", Voice::Speaker(0)), &CancellationToken::new())
        .await;
    assert!(result.is_failure());
}
