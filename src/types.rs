
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prosody and phoneme description of a text, created by the engine and sent back for synthesis.
///
/// The client never edits a query it receives: fields it does not model are kept in `extra`
/// and serialized back unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AudioQuery {
    pub accent_phrases: Vec<AccentPhrase>,
    #[serde(rename = "speedScale")]
    pub speed_scale: f64,
    #[serde(rename = "pitchScale")]
    pub pitch_scale: f64,
    #[serde(rename = "intonationScale")]
    pub intonation_scale: f64,
    #[serde(rename = "volumeScale")]
    pub volume_scale: f64,
    #[serde(rename = "prePhonemeLength")]
    pub pre_phoneme_length: f64,
    #[serde(rename = "postPhonemeLength")]
    pub post_phoneme_length: f64,
    #[serde(rename = "outputSamplingRate")]
    pub output_sampling_rate: i32,
    #[serde(rename = "outputStereo")]
    pub output_stereo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kana: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_mora: Option<Mora>,
    #[serde(default)]
    pub is_interrogative: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mora {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant_length: Option<f64>,
    pub vowel: String,
    pub vowel_length: f64,
    pub pitch: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AudioQuery {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn mora_count(&self) -> usize {
        self.accent_phrases.iter().map(|phrase| phrase.moras.len()).sum()
    }
}
