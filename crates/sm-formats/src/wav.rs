//! WAV encoding and decoding.

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sm_engine::{Capture, Frame};
use sm_ir::{AudioBuffer, RecordingFormat};

use crate::error::{FormatError, FormatResult};
use crate::resample::resample_linear;

// --- Writing ---

fn spec_for(format: RecordingFormat, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: format.bits_per_sample(),
        sample_format: match format {
            RecordingFormat::WavPcm16 => SampleFormat::Int,
            RecordingFormat::WavFloat32 => SampleFormat::Float,
        },
    }
}

fn write_samples<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    samples: &[f32],
    format: RecordingFormat,
) -> FormatResult<()> {
    match format {
        RecordingFormat::WavPcm16 => {
            let mut w = writer.get_i16_writer(samples.len() as u32);
            for &s in samples {
                w.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16);
            }
            w.flush()?;
        }
        RecordingFormat::WavFloat32 => {
            for &s in samples {
                writer.write_sample(s)?;
            }
        }
    }
    Ok(())
}

/// Encode interleaved stereo samples as a WAV blob.
pub fn encode_wav(samples: &[f32], sample_rate: u32, format: RecordingFormat) -> FormatResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
    {
        let mut writer = WavWriter::new(&mut cursor, spec_for(format, sample_rate))?;
        write_samples(&mut writer, samples, format)?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode a finished recording in its own format.
pub fn encode_capture(capture: &Capture) -> FormatResult<Vec<u8>> {
    encode_wav(&capture.samples, capture.sample_rate, capture.format)
}

/// Encode rendered frames.
pub fn encode_frames(frames: &[Frame], sample_rate: u32, format: RecordingFormat) -> FormatResult<Vec<u8>> {
    let samples: Vec<f32> = frames.iter().flat_map(|f| [f.left, f.right]).collect();
    encode_wav(&samples, sample_rate, format)
}

/// Write interleaved stereo samples to a WAV file.
pub fn write_wav_file(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    format: RecordingFormat,
) -> FormatResult<()> {
    let mut writer = WavWriter::create(path, spec_for(format, sample_rate))?;
    write_samples(&mut writer, samples, format)?;
    writer.finalize()?;
    log::info!("wrote {}", path.display());
    Ok(())
}

// --- Reading ---

fn read_buffer<R: Read>(reader: WavReader<R>) -> FormatResult<(AudioBuffer, u32)> {
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(FormatError::UnsupportedChannels(spec.channels));
    }
    let frames = samples.len() / channels;
    if frames == 0 {
        return Err(FormatError::Empty);
    }

    let mut buffer = AudioBuffer::new(2, frames);
    for (i, frame) in samples.chunks_exact(channels).enumerate() {
        let left = frame[0];
        // mono is duplicated; channels past the second are dropped
        let right = if channels == 1 { left } else { frame[1] };
        buffer.channel_mut(0)[i] = left;
        buffer.channel_mut(1)[i] = right;
    }
    Ok((buffer, spec.sample_rate))
}

/// Decode WAV bytes into a stereo buffer at `target_rate`.
pub fn decode_wav(bytes: &[u8], target_rate: u32) -> FormatResult<AudioBuffer> {
    let (buffer, rate) = read_buffer(WavReader::new(Cursor::new(bytes))?)?;
    if rate != target_rate {
        log::debug!("resampling {rate} Hz to {target_rate} Hz");
    }
    Ok(resample_linear(&buffer, rate, target_rate))
}

/// Decode a WAV file into a stereo buffer at `target_rate`.
pub fn load_wav_file(path: &Path, target_rate: u32) -> FormatResult<AudioBuffer> {
    let (buffer, rate) = read_buffer(WavReader::open(path)?)?;
    Ok(resample_linear(&buffer, rate, target_rate))
}
