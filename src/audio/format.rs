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
use std::{error::Error, fmt};

/// The sample type the output stream is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int,
    Float,
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The format of the output stream. The transport always produces f32 samples at
/// `sample_rate`; integer streams are converted in the device callback.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    /// Sample rate in Hz. Decoded audio is resampled to this rate at load time.
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    /// Bits per sample for integer output, 16 or 32.
    pub bits_per_sample: u16,
}

impl OutputFormat {
    pub fn new(
        sample_rate: u32,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, Box<dyn Error>> {
        if sample_rate == 0 {
            return Err("Sample rate must be greater than 0".into());
        }
        if sample_format == SampleFormat::Int && bits_per_sample != 16 && bits_per_sample != 32 {
            return Err(format!(
                "Unsupported bit depth {} for integer output, use 16 or 32",
                bits_per_sample
            )
            .into());
        }

        Ok(OutputFormat {
            sample_rate,
            sample_format,
            bits_per_sample,
        })
    }
}

impl Default for OutputFormat {
    /// 44.1kHz, 32-bit float.
    fn default() -> Self {
        OutputFormat {
            sample_rate: 44100,
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}-bit {}",
            self.sample_rate, self.bits_per_sample, self.sample_format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_display() {
        assert_eq!(format!("{}", SampleFormat::Float), "float");
        assert_eq!(format!("{}", SampleFormat::Int), "int");
    }

    #[test]
    fn test_output_format_new() {
        let format = OutputFormat::new(48000, SampleFormat::Int, 16).unwrap();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.sample_format, SampleFormat::Int);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!("48000Hz 16-bit int", format.to_string());
    }

    #[test]
    fn test_output_format_new_invalid() {
        assert!(OutputFormat::new(0, SampleFormat::Float, 32).is_err());
        assert!(OutputFormat::new(44100, SampleFormat::Int, 24).is_err());
        // Float output ignores the bit depth.
        assert!(OutputFormat::new(44100, SampleFormat::Float, 24).is_ok());
    }

    #[test]
    fn test_output_format_default() {
        let format = OutputFormat::default();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.sample_format, SampleFormat::Float);
    }
}
