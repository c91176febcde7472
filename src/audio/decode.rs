// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decodes a whole audio file into memory so the delivery path can read any position
//! without touching the disk or the decoder.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::error::DecodeError;
use super::resample::resample_interleaved;
use super::source::MemorySource;

/// Decodes the file at `path` (WAV, AIFF, MP3, FLAC, Ogg and anything else symphonia
/// probes) and converts it to `target_rate` if needed.
pub fn decode_file<P: AsRef<Path>>(path: P, target_rate: u32) -> Result<MemorySource, DecodeError> {
    let path = path.as_ref();
    let file_path = path.to_string_lossy().to_string();

    // Include the path in the error so the user sees which file failed.
    let file = File::open(path).map_err(|e| {
        DecodeError::IoError(std::io::Error::new(e.kind(), format!("{}: {}", file_path, e)))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| DecodeError::Unsupported(file_path.clone(), e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(file_path.clone()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let source_rate = params
        .sample_rate
        .ok_or_else(|| DecodeError::UnknownSampleRate(file_path.clone()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| DecodeError::Unsupported(file_path.clone(), e.to_string()))?;

    let (samples, channels) = decode_all(format_reader.as_mut(), decoder.as_mut(), track_id)?;
    // Prefer what the decoder actually produced; fall back to the container metadata.
    let channels = if channels > 0 {
        channels
    } else {
        params.channels.map(|c| c.count() as u16).unwrap_or(1)
    };

    debug!(
        path = file_path,
        channels,
        sample_rate = source_rate,
        frames = samples.len() / channels.max(1) as usize,
        "Decoded audio file"
    );

    let samples = if source_rate != target_rate && !samples.is_empty() {
        info!(
            source_rate,
            target_rate, "Resampling decoded audio to the output rate"
        );
        resample_interleaved(&samples, channels, source_rate, target_rate)?
    } else {
        samples
    };

    Ok(MemorySource::new(samples, channels, target_rate))
}

/// Reads the next packet, treating the end of the stream as `None`.
///
/// ResetRequired errors are propagated so the caller can reset the decoder.
fn read_next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>, DecodeError> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        // Some formats return DecodeError at EOF instead of IoError.
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(DecodeError::AudioError(e)),
    }
}

/// Decodes every packet of the given track into interleaved f32 samples. Returns the samples
/// and the channel count observed in the decoded buffers (0 if nothing was decoded).
fn decode_all(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<(Vec<f32>, u16), DecodeError> {
    let mut samples: Vec<f32> = Vec::new();
    let mut channels: u16 = 0;
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match read_next_packet(format_reader) {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(DecodeError::AudioError(SymphoniaError::ResetRequired)) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skipped rather than failing the whole file.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(DecodeError::AudioError(e)),
        };

        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let needs_new_buffer = sample_buffer
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity() * spec.channels.count());
        if needs_new_buffer {
            sample_buffer = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
        channels = spec.channels.count() as u16;
    }

    Ok((samples, channels))
}
