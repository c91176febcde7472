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
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, span, Level, Span};

use crate::audio::source::AudioSource;
use crate::notify::{Notification, Notifier};

/// The playback state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// Not producing audio. The initial state.
    Stopped = 0,
    /// Actively streaming audio from the current position.
    Starting = 1,
    /// Streaming has been halted and the transport is rewinding.
    Stopping = 2,
}

impl TransportState {
    fn from_u8(value: u8) -> TransportState {
        match value {
            1 => TransportState::Starting,
            2 => TransportState::Stopping,
            _ => TransportState::Stopped,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Stopped => "stopped",
            TransportState::Starting => "playing",
            TransportState::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// Number of low bits of the packed playhead that hold the frame position.
const FRAME_BITS: u32 = 48;
const FRAME_MASK: u64 = (1 << FRAME_BITS) - 1;

/// The playhead frame position packed together with a 16 bit epoch in a single atomic.
/// Every control-path write bumps the epoch, so the delivery path can only advance the
/// position it actually read from. A seek or rewind that lands mid-block always wins.
struct Playhead(AtomicU64);

impl Playhead {
    fn new() -> Playhead {
        Playhead(AtomicU64::new(0))
    }

    #[inline]
    fn load_raw(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn frame_of(raw: u64) -> u64 {
        raw & FRAME_MASK
    }

    fn frame(&self) -> u64 {
        Self::frame_of(self.load_raw())
    }

    /// Control-path write. Returns the packed value written.
    fn set(&self, frame: u64) -> u64 {
        let next = |raw: u64| {
            let epoch = ((raw >> FRAME_BITS) + 1) << FRAME_BITS;
            epoch | (frame & FRAME_MASK)
        };
        match self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| Some(next(raw)))
        {
            Ok(previous) | Err(previous) => next(previous),
        }
    }

    /// Delivery-path write. Fails if the control path wrote since `observed` was loaded.
    #[inline]
    fn advance(&self, observed: u64, frame: u64) -> bool {
        let next = (observed & !FRAME_MASK) | (frame & FRAME_MASK);
        self.0
            .compare_exchange(observed, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Turns play/stop/seek intents into streamed audio positions.
///
/// `read_block` is the only method the real-time delivery path calls. It never blocks:
/// the source is reached through `try_read` and the playhead through atomics. Every other
/// method belongs to the control path and is serialized by the control lock, which the
/// delivery path never takes.
pub struct Transport {
    /// The current state, stored as a `TransportState` discriminant.
    state: AtomicU8,
    /// The current position.
    playhead: Playhead,
    /// The exact seconds of the last control-path write, valid while the playhead still
    /// holds `anchor_raw`. Frames are rounded, the requested position is not.
    anchor_seconds: AtomicU64,
    anchor_raw: AtomicU64,
    /// The loaded stream. Swapped wholesale, never mutated in place.
    source: RwLock<Option<Arc<dyn AudioSource>>>,
    /// Serializes control-path operations so compound operations are atomic.
    control: Mutex<()>,
    /// Where state changes are announced.
    notifier: Arc<Notifier>,
    /// The logging span.
    span: Span,
}

impl Transport {
    /// Creates a stopped transport with no source.
    pub fn new(notifier: Arc<Notifier>) -> Transport {
        Transport {
            state: AtomicU8::new(TransportState::Stopped as u8),
            playhead: Playhead::new(),
            anchor_seconds: AtomicU64::new(0.0f64.to_bits()),
            anchor_raw: AtomicU64::new(0),
            source: RwLock::new(None),
            control: Mutex::new(()),
            notifier,
            span: span!(Level::INFO, "transport"),
        }
    }

    /// The current state.
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while audio is being streamed.
    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Starting
    }

    /// True if a source has been loaded.
    pub fn has_source(&self) -> bool {
        self.source.read().is_some()
    }

    /// Length of the loaded source in seconds, or 0 if nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.source
            .read()
            .as_ref()
            .map_or(0.0, |source| source.duration())
    }

    /// The current position in seconds. Always 0 if nothing is loaded. Until the delivery
    /// path advances past it, this is exactly the position last set.
    pub fn position(&self) -> f64 {
        let guard = self.source.read();
        let Some(source) = guard.as_ref().filter(|source| source.sample_rate() > 0) else {
            return 0.0;
        };

        let raw = self.playhead.load_raw();
        if self.anchor_raw.load(Ordering::Acquire) == raw {
            let seconds = f64::from_bits(self.anchor_seconds.load(Ordering::Acquire));
            // A write that landed meanwhile changed the playhead first.
            if self.playhead.load_raw() == raw {
                return seconds;
            }
        }
        self.playhead.frame() as f64 / source.sample_rate() as f64
    }

    /// Swaps in a new source (or none). Streaming halts, the position rewinds to the
    /// start and the transport lands in `Stopped`.
    pub fn set_source(&self, source: Option<Arc<dyn AudioSource>>) {
        let _enter = self.span.enter();
        let _control = self.control.lock();

        if self.state() == TransportState::Starting {
            self.transition(TransportState::Stopping);
        }

        let previous = {
            let mut guard = self.source.write();
            std::mem::replace(&mut *guard, source)
        };
        self.set_position(0, 0.0);
        self.transition(TransportState::Stopped);

        info!(
            duration = self.duration(),
            replaced = previous.is_some(),
            "Transport source swapped."
        );
        // The previous source is released here, off the delivery path.
        drop(previous);
    }

    /// Starts streaming from the current position. A no-op if already playing.
    pub fn play(&self) {
        let _enter = self.span.enter();
        let _control = self.control.lock();
        self.start_locked();
    }

    /// Halts streaming and rewinds to the start. Only rewinds if already stopped.
    pub fn stop(&self) {
        let _enter = self.span.enter();
        let _control = self.control.lock();
        self.stop_locked();
    }

    /// Moves the playhead to `seconds`, clamped to the length of the source. Legal in any
    /// state; while playing, the next block is read from the new position. Returns the
    /// position actually set.
    pub fn seek(&self, seconds: f64) -> f64 {
        let _enter = self.span.enter();
        let _control = self.control.lock();
        self.seek_locked(seconds)
    }

    /// Seeks and starts playing as one operation: a concurrent `stop` lands either
    /// before or after it, never in between. Returns the position actually set.
    pub fn jump_to(&self, seconds: f64) -> f64 {
        let _enter = self.span.enter();
        let _control = self.control.lock();
        let position = self.seek_locked(seconds);
        self.start_locked();
        position
    }

    /// Fills `output` (interleaved, `channels` wide) with the next block of audio and
    /// advances the playhead. Produces silence when not playing, when nothing is loaded or
    /// when the source is being swapped. Returns the number of frames read from the source.
    ///
    /// Called from the real-time delivery path.
    pub fn read_block(&self, output: &mut [f32], channels: u16) -> usize {
        if self.state() != TransportState::Starting {
            output.fill(0.0);
            return 0;
        }

        let Some(guard) = self.source.try_read() else {
            output.fill(0.0);
            return 0;
        };
        let Some(source) = guard.as_ref() else {
            output.fill(0.0);
            return 0;
        };

        let observed = self.playhead.load_raw();
        let start = Playhead::frame_of(observed);
        let read = source.read(start, output, channels);

        let frames = (output.len() / channels.max(1) as usize) as u64;
        let end = (start + frames).min(source.total_frames());
        self.playhead.advance(observed, end);
        read
    }

    fn start_locked(&self) {
        if self.transition(TransportState::Starting) {
            info!(position = self.position(), "Playback started.");
        } else {
            debug!("Transport is already playing.");
        }
    }

    fn stop_locked(&self) {
        match self.state() {
            TransportState::Stopping => {
                debug!("Transport is already stopping.");
            }
            TransportState::Stopped => {
                self.set_position(0, 0.0);
                debug!("Transport is not playing, rewound.");
            }
            TransportState::Starting => {
                let position = self.position();
                self.transition(TransportState::Stopping);
                self.set_position(0, 0.0);
                self.transition(TransportState::Stopped);
                info!(position, "Playback stopped.");
            }
        }
    }

    fn seek_locked(&self, seconds: f64) -> f64 {
        let guard = self.source.read();
        let (frame, position) = match guard.as_ref() {
            Some(source) if source.sample_rate() > 0 => {
                let duration = source.duration();
                let clamped = if seconds.is_nan() {
                    0.0
                } else {
                    seconds.clamp(0.0, duration)
                };
                let frame = ((clamped * source.sample_rate() as f64).round() as u64)
                    .min(source.total_frames());
                (frame, clamped)
            }
            _ => (0, 0.0),
        };
        self.set_position(frame, position);
        debug!(requested = seconds, position, "Seek.");
        position
    }

    /// Control-path playhead write that remembers the exact seconds requested.
    fn set_position(&self, frame: u64, seconds: f64) {
        let raw = self.playhead.set(frame);
        self.anchor_seconds
            .store(seconds.to_bits(), Ordering::Release);
        self.anchor_raw.store(raw, Ordering::Release);
    }

    /// Moves to `next`. Returns false, doing nothing, if already there.
    fn transition(&self, next: TransportState) -> bool {
        let previous = TransportState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous == next {
            return false;
        }
        debug!(from = %previous, to = %next, "Transport state changed.");
        self.notifier.emit(Notification::State(next));
        true
    }
}
