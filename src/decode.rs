
use std::io::Read;
use std::time::Duration;

use hound::{SampleFormat, WavReader};

use crate::{ClientError, ClientErrorDescription};

/// Turns a synthesized byte stream into playable audio.
pub trait AudioDecoder {
    fn decode<R: Read>(&self, reader: R, file_name: &str) -> Result<DecodedAudio, ClientError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub file_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// WAV decoder for the PCM formats the engine produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode<R: Read>(&self, reader: R, file_name: &str) -> Result<DecodedAudio, ClientError> {
        let reader = WavReader::new(reader).map_err(decode_error)?;
        let spec = reader.spec();

        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .map(|sample| sample.map(|s| s as f32 / 32768.0))
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode_error)?,
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode_error)?,
            (format, bits) => {
                return Err(ClientError::new(ClientErrorDescription::UnsupportedAudio(format!(
                    "{}: {:?} / {} bits",
                    file_name, format, bits
                ))));
            }
        };

        Ok(DecodedAudio {
            file_name: file_name.to_string(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

fn decode_error(err: hound::Error) -> ClientError {
    ClientError::new(ClientErrorDescription::Decode(err))
}
