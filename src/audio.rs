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
use std::{error::Error, fmt, sync::Arc, thread};

use crossbeam_channel::Sender;
use tracing::error;

use crate::config;
use crate::transport::Transport;

pub mod cpal;
pub mod decode;
pub mod error;
pub mod format;
pub mod mock;
pub mod resample;
pub mod source;
pub mod thread_priority;

pub use format::{OutputFormat, SampleFormat};

/// An output device that pulls audio from a transport.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Opens an output stream whose delivery path calls `Transport::read_block`. The
    /// stream runs until the returned handle is dropped.
    fn open(&self, transport: Arc<Transport>) -> Result<OutputHandle, Box<dyn Error>>;

    /// The format the stream is opened with.
    fn format(&self) -> &OutputFormat;

    /// The number of interleaved channels delivered per frame.
    fn channels(&self) -> u16;
}

/// Keeps an output stream alive. Dropping it shuts the stream down and waits for the
/// output thread to exit.
pub struct OutputHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl OutputHandle {
    /// Wraps an output thread that exits once `shutdown` is disconnected.
    pub(crate) fn new(shutdown: Sender<()>, thread: thread::JoinHandle<()>) -> OutputHandle {
        OutputHandle {
            shutdown: Some(shutdown),
            thread: Some(thread),
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        // Disconnecting the channel is the shutdown signal.
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked.");
            }
        }
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the configured device. Names starting with "mock" give a mock device.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let format = OutputFormat::new(
        config.sample_rate(),
        config.sample_format()?,
        config.bits_per_sample(),
    )?;

    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, format)));
    };

    Ok(Arc::new(cpal::Device::get(config, format)?))
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use crate::config;

    use super::{get_device, SampleFormat};

    #[test]
    fn test_get_mock_device() -> Result<(), Box<dyn Error>> {
        let device = get_device(&config::Audio::new("mock-device"))?;
        assert_eq!("mock-device (Mock)", device.to_string());
        assert_eq!(44100, device.format().sample_rate);
        assert_eq!(SampleFormat::Float, device.format().sample_format);
        assert_eq!(2, device.channels());
        Ok(())
    }
}
