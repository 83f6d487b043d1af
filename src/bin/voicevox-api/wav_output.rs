
use std::io::Cursor;
use std::io::Write;
use std::path::Path;

use voicevox_api::{AudioDecoder, WavDecoder};

pub(crate) fn log_wav_info(wav: &[u8], file_name: &str) -> anyhow::Result<()> {
    let audio = WavDecoder.decode(Cursor::new(wav), file_name)?;
    log::info!(
        "{}: {} samples, {} Hz, {} channel(s), {:.2} s",
        audio.file_name,
        audio.samples.len(),
        audio.sample_rate,
        audio.channels,
        audio.duration().as_secs_f64()
    );
    Ok(())
}

/// Writes to `path`, or to stdout when none is given.
pub(crate) fn write_wav(wav: &[u8], path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, wav)?;
            log::info!("Wrote {} bytes to {}", wav.len(), path.display());
        },
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(wav)?;
            stdout.flush()?;
        },
    }
    Ok(())
}
