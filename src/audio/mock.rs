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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::TryRecvError;
use tracing::{info, span, Level};

use super::{OutputFormat, OutputHandle};
use crate::transport::Transport;

/// How often the mock device pulls a block.
const BLOCK_PERIOD: Duration = Duration::from_millis(5);

/// A mock device. Pulls blocks from the transport at the pace a sound card would and
/// throws them away.
#[derive(Clone)]
pub struct Device {
    name: String,
    format: OutputFormat,
    channels: u16,
    is_open: Arc<AtomicBool>,
    /// Blocks pulled so far.
    blocks: Arc<AtomicU64>,
    /// Frames that came from the source rather than silence.
    frames_played: Arc<AtomicU64>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, format: OutputFormat) -> Device {
        Device {
            name: name.to_string(),
            format,
            channels: 2,
            is_open: Arc::new(AtomicBool::new(false)),
            blocks: Arc::new(AtomicU64::new(0)),
            frames_played: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns true while a stream is open.
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    /// Frames per block at the device rate.
    fn block_frames(&self) -> usize {
        let frames = self.format.sample_rate as u128 * BLOCK_PERIOD.as_millis() / 1000;
        (frames as usize).max(1)
    }
}

impl super::Device for Device {
    fn open(&self, transport: Arc<Transport>) -> Result<OutputHandle, Box<dyn Error>> {
        let span = span!(Level::INFO, "output (mock)");
        let _enter = span.enter();

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let channels = self.channels;
        let mut block = vec![0.0f32; self.block_frames() * channels as usize];
        let is_open = self.is_open.clone();
        let blocks = self.blocks.clone();
        let frames_played = self.frames_played.clone();

        info!(device = self.name, format = %self.format, "Opening stream.");
        is_open.store(true, Ordering::Relaxed);
        let thread = thread::Builder::new()
            .name("chopdeck-mock-output".to_string())
            .spawn(move || {
                while let Err(TryRecvError::Empty) = shutdown_rx.try_recv() {
                    let read = transport.read_block(&mut block, channels);
                    blocks.fetch_add(1, Ordering::Relaxed);
                    frames_played.fetch_add(read as u64, Ordering::Relaxed);
                    spin_sleep::sleep(BLOCK_PERIOD);
                }
                is_open.store(false, Ordering::Relaxed);
            })?;

        Ok(OutputHandle::new(shutdown_tx, thread))
    }

    fn format(&self) -> &OutputFormat {
        &self.format
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
