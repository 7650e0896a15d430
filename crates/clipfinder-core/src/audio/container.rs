//! Container demuxing and audio extraction using Symphonia

use super::AudioData;
use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open media file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        prebuild_seek_index: false,
        seek_index_fill_rate: 20,
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .with_context(|| format!("Failed to probe media file: {}", path.display()))?;

    Ok(probed.format)
}

/// Duration in whole seconds of the first audio track, read from the
/// container headers without decoding
pub fn probe_duration(path: &Path) -> Result<u64> {
    let format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio track found in {}", path.display()))?;

    let params = &track.codec_params;
    match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(frames / rate as u64),
        _ => anyhow::bail!("Duration unknown for {}", path.display()),
    }
}

/// Decode the first audio track of any container Symphonia can probe
pub fn decode_container(path: &Path) -> Result<AudioData> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio track found in {}", path.display()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create audio decoder for {}", path.display()))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::trace!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(anyhow::anyhow!("Decode error: {}", e)),
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }

        match decoded {
            AudioBufferRef::F32(buf) => interleave(&*buf, &mut samples, |v| v),
            AudioBufferRef::F64(buf) => interleave(&*buf, &mut samples, |v| v as f32),
            AudioBufferRef::S32(buf) => {
                interleave(&*buf, &mut samples, |v| v as f32 / i32::MAX as f32)
            }
            AudioBufferRef::S16(buf) => {
                interleave(&*buf, &mut samples, |v| v as f32 / i16::MAX as f32)
            }
            AudioBufferRef::U8(buf) => {
                interleave(&*buf, &mut samples, |v| (v as f32 - 128.0) / 128.0)
            }
            _ => anyhow::bail!("Unsupported audio buffer format in {}", path.display()),
        }
    }

    Ok(AudioData::new(samples, sample_rate, channels.max(1)))
}

fn interleave<S, F>(buf: &AudioBuffer<S>, out: &mut Vec<f32>, convert: F)
where
    S: Sample,
    F: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    for frame_idx in 0..buf.frames() {
        for ch in 0..channels {
            out.push(convert(buf.chan(ch)[frame_idx]));
        }
    }
}
