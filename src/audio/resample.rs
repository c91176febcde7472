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
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::error::DecodeError;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Resamples a whole interleaved buffer from `source_rate` to `target_rate`. The output
/// has exactly `ceil(frames * target_rate / source_rate)` frames with the resampler delay
/// trimmed off the front.
pub fn resample_interleaved(
    samples: &[f32],
    channels: u16,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    let failed = |_e| DecodeError::ResamplingFailed(source_rate, target_rate);
    let num_channels = channels.max(1) as usize;

    let planar = deinterleave(samples, num_channels);
    let source_frames = planar.first().map(|c| c.len()).unwrap_or(0);
    let ratio = target_rate as f64 / source_rate as f64;
    let expected_frames =
        (source_frames as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, num_channels)
            .map_err(|_e| DecodeError::ResamplingFailed(source_rate, target_rate))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected_frames;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); num_channels];

    let mut position = 0;
    while source_frames - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let block: Vec<&[f32]> = planar
            .iter()
            .map(|ch| &ch[position..position + needed])
            .collect();
        let processed = resampler.process(&block, None).map_err(failed)?;
        append_planar(&mut output, processed);
        position += needed;
    }

    if position < source_frames {
        let rest: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..]).collect();
        let processed = resampler
            .process_partial(Some(rest.as_slice()), None)
            .map_err(failed)?;
        append_planar(&mut output, processed);
    }

    // Flush the resampler until the delayed tail has come out.
    let mut flushes = 0;
    while output[0].len() < wanted && flushes < 8 {
        let processed = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(failed)?;
        append_planar(&mut output, processed);
        flushes += 1;
    }

    let mut interleaved = Vec::with_capacity(expected_frames * num_channels);
    for frame in 0..expected_frames {
        for channel in output.iter() {
            interleaved.push(channel.get(delay + frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    planar
}

fn append_planar(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (out, chunk) in output.iter_mut().zip(processed) {
        out.extend_from_slice(&chunk);
    }
}

#[cfg(test)]
mod test {
    use super::{deinterleave, resample_interleaved};

    #[test]
    fn test_deinterleave() {
        let planar = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0], 2);
        assert_eq!(vec![vec![1.0, 2.0], vec![-1.0, -2.0]], planar);
    }

    #[test]
    fn test_resample_length() {
        let source: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();

        let result = resample_interleaved(&source, 1, 44100, 48000).unwrap();
        assert_eq!(4800, result.len());
    }

    #[test]
    fn test_resample_keeps_channels_apart() {
        // Stereo with a constant left and right level.
        let source: Vec<f32> = (0..8820)
            .flat_map(|_| [0.5f32, -0.5f32])
            .collect();

        let result = resample_interleaved(&source, 2, 44100, 22050).unwrap();
        assert_eq!(4410 * 2, result.len());

        // Away from the edges, the levels should survive the sinc filter.
        let middle = &result[2000 * 2..2002 * 2];
        assert!((middle[0] - 0.5).abs() < 0.05);
        assert!((middle[1] + 0.5).abs() < 0.05);
    }
}
