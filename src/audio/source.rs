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
use std::sync::Arc;

/// A seekable, already decoded audio stream. The transport only ever asks it for its
/// length and for a block of frames at an absolute frame position.
///
/// `read` is called from the real-time delivery path, so implementations must not block,
/// allocate or take locks.
pub trait AudioSource: Send + Sync {
    /// Reads frames starting at `start_frame` into `output`, which is interleaved with
    /// `output_channels` channels. Frames past the end of the stream are written as silence.
    /// Returns the number of frames that came from the stream.
    fn read(&self, start_frame: u64, output: &mut [f32], output_channels: u16) -> usize;

    /// Total number of frames in the stream.
    fn total_frames(&self) -> u64;

    /// Sample rate of the stream.
    fn sample_rate(&self) -> u32;

    /// Number of channels in the stream.
    fn channel_count(&self) -> u16;

    /// Duration of the stream in seconds.
    fn duration(&self) -> f64 {
        if self.sample_rate() == 0 {
            return 0.0;
        }
        self.total_frames() as f64 / self.sample_rate() as f64
    }
}

/// Decoded audio held entirely in memory as interleaved f32 samples.
#[derive(Clone)]
pub struct MemorySource {
    samples: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl MemorySource {
    /// Creates a new memory source from interleaved samples. Trailing samples that do not
    /// make up a whole frame are ignored.
    pub fn new(samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> MemorySource {
        MemorySource {
            samples: Arc::new(samples),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// The interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Memory used by the sample data in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

impl AudioSource for MemorySource {
    fn read(&self, start_frame: u64, output: &mut [f32], output_channels: u16) -> usize {
        let out_channels = output_channels.max(1) as usize;
        let src_channels = self.channel_count as usize;
        let total_frames = self.total_frames();

        let requested = output.len() / out_channels;
        let available = total_frames.saturating_sub(start_frame).min(requested as u64) as usize;

        for (frame_idx, frame) in output.chunks_exact_mut(out_channels).enumerate() {
            if frame_idx >= available {
                frame.fill(0.0);
                continue;
            }
            let base = (start_frame as usize + frame_idx) * src_channels;
            for (ch_idx, sample) in frame.iter_mut().enumerate() {
                *sample = self.samples[base + ch_idx % src_channels];
            }
        }
        // A partial trailing frame in the output is never read from the stream.
        output[requested * out_channels..].fill(0.0);

        available
    }

    fn total_frames(&self) -> u64 {
        (self.samples.len() / self.channel_count as usize) as u64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }
}

#[cfg(test)]
mod test {
    use super::{AudioSource, MemorySource};

    #[test]
    fn test_duration() {
        let source = MemorySource::new(vec![0.0; 44100 * 2], 2, 44100);
        assert_eq!(44100, source.total_frames());
        assert!((source.duration() - 1.0).abs() < f64::EPSILON);

        let empty = MemorySource::new(Vec::new(), 2, 44100);
        assert_eq!(0.0, empty.duration());
    }

    #[test]
    fn test_read_stereo_to_stereo() {
        let source = MemorySource::new(vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 48000);
        let mut output = [9.0f32; 4];

        assert_eq!(2, source.read(1, &mut output, 2));
        assert_eq!([0.2, -0.2, 0.3, -0.3], output);
    }

    #[test]
    fn test_read_past_end_is_silence() {
        let source = MemorySource::new(vec![0.5, 0.5, 0.5], 1, 48000);
        let mut output = [9.0f32; 4];

        assert_eq!(1, source.read(2, &mut output, 1));
        assert_eq!([0.5, 0.0, 0.0, 0.0], output);

        assert_eq!(0, source.read(10, &mut output, 1));
        assert_eq!([0.0; 4], output);
    }

    #[test]
    fn test_read_mono_duplicates_to_all_outputs() {
        let source = MemorySource::new(vec![0.25, 0.75], 1, 44100);
        let mut output = [0.0f32; 4];

        assert_eq!(2, source.read(0, &mut output, 2));
        assert_eq!([0.25, 0.25, 0.75, 0.75], output);
    }

    #[test]
    fn test_read_folds_extra_output_channels() {
        let source = MemorySource::new(vec![1.0, 2.0], 2, 44100);
        let mut output = [0.0f32; 4];

        assert_eq!(1, source.read(0, &mut output, 4));
        assert_eq!([1.0, 2.0, 1.0, 2.0], output);
    }

    #[test]
    fn test_read_downmix_takes_leading_channels() {
        let source = MemorySource::new(vec![1.0, 2.0, 3.0, 4.0], 4, 44100);
        let mut output = [0.0f32; 2];

        assert_eq!(1, source.read(0, &mut output, 2));
        assert_eq!([1.0, 2.0], output);
    }
}
