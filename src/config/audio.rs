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
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{thread_priority::DEFAULT_CALLBACK_THREAD_PRIORITY, SampleFormat};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;
const DEFAULT_BUFFER_SIZE: u32 = 512;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The audio device.
    device: Option<String>,

    /// Stream sample rate in Hz (default: 44100). Decoded audio is resampled to it.
    sample_rate: Option<u32>,

    /// Stream sample format, "float" or "int" (default: "float")
    sample_format: Option<String>,

    /// Bits per sample for integer streams (default: 32)
    bits_per_sample: Option<u16>,

    /// Stream buffer size in frames (default: 512). 0 leaves it to the backend.
    buffer_size: Option<u32>,

    /// Priority of the delivery thread, 0-99 (default: 70)
    thread_priority: Option<u8>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Replaces the configured device.
    pub fn set_device(&mut self, device: &str) {
        self.device = Some(device.to_string());
    }

    /// Returns the stream sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the stream sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            None | Some("float") | Some("Float") => Ok(SampleFormat::Float),
            Some("int") | Some("Int") => Ok(SampleFormat::Int),
            Some(other) => Err(ConfigError::InvalidSampleFormat(other.to_string())),
        }
    }

    /// Returns the bits per sample for integer streams (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// Returns the fixed stream buffer size, or None for the backend default.
    pub fn buffer_size(&self) -> Option<u32> {
        match self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE) {
            0 => None,
            frames => Some(frames),
        }
    }

    /// Returns the delivery thread priority (default: 70)
    pub fn thread_priority(&self) -> u8 {
        self.thread_priority
            .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY)
            .min(99)
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use crate::audio::SampleFormat;

    use super::Audio;

    fn parse(yaml: &str) -> Audio {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert_eq!("default", audio.device());
        assert_eq!(44100, audio.sample_rate());
        assert_eq!(SampleFormat::Float, audio.sample_format().unwrap());
        assert_eq!(32, audio.bits_per_sample());
        assert_eq!(Some(512), audio.buffer_size());
        assert_eq!(70, audio.thread_priority());
    }

    #[test]
    fn test_deserialize() {
        let audio = parse(
            r#"
            device: UltraLite-mk5
            sample_rate: 48000
            sample_format: int
            bits_per_sample: 16
            buffer_size: 0
            thread_priority: 120
        "#,
        );

        assert_eq!("UltraLite-mk5", audio.device());
        assert_eq!(48000, audio.sample_rate());
        assert_eq!(SampleFormat::Int, audio.sample_format().unwrap());
        assert_eq!(16, audio.bits_per_sample());
        assert_eq!(None, audio.buffer_size());
        assert_eq!(99, audio.thread_priority());
    }

    #[test]
    fn test_invalid_sample_format() {
        let audio = parse("sample_format: double");
        assert!(audio.sample_format().is_err());
    }

    #[test]
    fn test_set_device() {
        let mut audio = Audio::new("mock-one");
        audio.set_device("mock-two");
        assert_eq!("mock-two", audio.device());
    }
}
