use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use std::path::Path;

/// Read a stereo WAV file, returning interleaved f32 samples and the rate.
///
/// Accepts f32, i16, i24, and i32 sample formats. Non-stereo input is
/// rejected; the engine validates the sample rate itself.
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    if spec.channels != 2 {
        bail!(
            "Expected stereo (2 channels), got {} channel(s). \
             Mono-to-stereo conversion is not supported.",
            spec.channels
        );
    }

    let sample_rate = spec.sample_rate;
    let samples = read_samples(reader, spec)?;
    Ok((samples, sample_rate))
}

/// Read interleaved samples from a WAV reader, normalizing to f32 in [-1, 1].
fn read_samples(
    reader: WavReader<std::io::BufReader<std::fs::File>>,
    spec: WavSpec,
) -> Result<Vec<f32>> {
    match spec.sample_format {
        SampleFormat::Float => {
            let samples: hound::Result<Vec<f32>> = reader.into_samples::<f32>().collect();
            Ok(samples.context("Failed to read f32 samples")?)
        }
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1u32 << (bits - 1)) as f32;
            let samples: hound::Result<Vec<i32>> = reader.into_samples::<i32>().collect();
            let samples = samples.context("Failed to read integer samples")?;
            Ok(samples.iter().map(|&s| s as f32 / max_val).collect())
        }
    }
}
