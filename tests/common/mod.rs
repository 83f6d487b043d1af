#![allow(dead_code)]

use std::io::Cursor;

use voicevox_api::{AudioQuery, ClientConfig, VoicevoxClient};
use wiremock::MockServer;

pub const QUERY_JSON: &str = r#"{
    "accent_phrases": [
        {
            "moras": [
                {"text": "テ", "consonant": "t", "consonant_length": 0.07, "vowel": "e", "vowel_length": 0.12, "pitch": 5.6},
                {"text": "ス", "consonant": "s", "consonant_length": 0.06, "vowel": "U", "vowel_length": 0.05, "pitch": 0.0},
                {"text": "ト", "consonant": "t", "consonant_length": 0.05, "vowel": "o", "vowel_length": 0.1, "pitch": 5.4}
            ],
            "accent": 1,
            "pause_mora": null,
            "is_interrogative": false
        }
    ],
    "speedScale": 1.0,
    "pitchScale": 0.0,
    "intonationScale": 1.0,
    "volumeScale": 1.0,
    "prePhonemeLength": 0.1,
    "postPhonemeLength": 0.1,
    "outputSamplingRate": 24000,
    "outputStereo": false,
    "kana": "テ'_スト"
}"#;

pub fn audio_query() -> AudioQuery {
    AudioQuery::from_json(QUERY_JSON).unwrap()
}

pub fn client_for(server: &MockServer) -> VoicevoxClient {
    VoicevoxClient::new(ClientConfig::new(server.uri())).unwrap()
}

/// 100 ms of 16-bit mono silence at 24 kHz.
pub fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..2400 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A local address nothing listens on.
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
