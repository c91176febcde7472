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
use std::{path::Path, sync::Arc};

use tokio::time::Interval;
use tracing::{info, span, warn, Level, Span};

use crate::{
    audio::{decode::decode_file, error::DecodeError, source::AudioSource},
    chops::ChopBoard,
    clock::PlayheadClock,
    keys::{Action, ActionTarget, HoldState, KeyId, KeyRouter},
    notify::{Notification, Notifier},
    transport::{Transport, TransportState},
    util::file_stem_display,
};

/// Errors from loading a file into a session.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("'{0}' contains no audio")]
    EmptyStream(String),
}

/// The control-path owner of one player: the transport, the chop board, the key router
/// and the playhead clock.
pub struct Session {
    /// Shared with the output device.
    transport: Arc<Transport>,
    board: ChopBoard,
    router: KeyRouter,
    clock: PlayheadClock,
    notifier: Arc<Notifier>,
    /// Decoded audio is converted to this rate.
    sample_rate: u32,
    /// Stem of the loaded file.
    file_name: Option<String>,
    /// The most recently triggered chop, which the shift keys act on.
    last_chop: Option<usize>,
    /// The logging span.
    span: Span,
}

/// The parts of a session that key actions reach.
struct Deck<'a> {
    transport: &'a Transport,
    board: &'a ChopBoard,
    last_chop: &'a mut Option<usize>,
}

impl ActionTarget for Deck<'_> {
    fn stop(&mut self) {
        self.transport.stop();
    }

    fn play(&mut self) {
        self.transport.play();
    }

    fn trigger(&mut self, index: usize) {
        if self.board.trigger(index, self.transport) {
            *self.last_chop = Some(index);
        }
    }
}

impl Session {
    /// Creates a session with nothing loaded.
    pub fn new(
        notifier: Arc<Notifier>,
        sample_rate: u32,
        clock: PlayheadClock,
        toggle_hold: bool,
    ) -> Session {
        Session {
            transport: Arc::new(Transport::new(notifier.clone())),
            board: ChopBoard::new(),
            router: KeyRouter::new(toggle_hold),
            clock,
            notifier,
            sample_rate,
            file_name: None,
            last_chop: None,
            span: span!(Level::INFO, "session"),
        }
    }

    /// The transport, for handing to an output device.
    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub fn board(&self) -> &ChopBoard {
        &self.board
    }

    pub fn hold(&self) -> &HoldState {
        self.router.hold()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn last_chop(&self) -> Option<usize> {
        self.last_chop
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn position(&self) -> f64 {
        self.transport.position()
    }

    pub fn duration(&self) -> f64 {
        self.transport.duration()
    }

    /// Decodes the file and swaps it in with a freshly spaced chop board. On any error the
    /// previous file and board stay exactly as they were. Returns the new duration.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<f64, LoadError> {
        let _enter = self.span.enter();
        let path = path.as_ref();
        let file_path = path.to_string_lossy().to_string();

        let source = decode_file(path, self.sample_rate).inspect_err(|e| {
            warn!(path = file_path, err = %e, "Unable to load file.");
        })?;
        if source.total_frames() == 0 {
            warn!(path = file_path, "File contains no audio.");
            return Err(LoadError::EmptyStream(file_path));
        }

        // Everything is built before anything is swapped in.
        let duration = source.duration();
        let memory_size = source.memory_size();
        let board = ChopBoard::for_duration(duration);
        let name = file_stem_display(path).to_string();

        self.transport.set_source(Some(Arc::new(source)));
        self.board = board;
        self.file_name = Some(name.clone());
        self.last_chop = None;

        info!(name, duration, memory_size, "Loaded file.");
        self.notifier.emit(Notification::Loaded {
            name,
            duration,
            labels: self.board.labels(),
        });
        Ok(duration)
    }

    /// Starts playing from the current position.
    pub fn play(&mut self) {
        self.deck().play();
    }

    /// Stops and rewinds.
    pub fn stop(&mut self) {
        self.deck().stop();
    }

    /// Jumps to chop `index` and plays. Returns false if nothing is loaded.
    ///
    /// Panics if `index` is not a valid chop index.
    pub fn trigger(&mut self, index: usize) -> bool {
        self.deck().trigger(index);
        self.board.is_initialized()
    }

    /// Nudges chop `index` by `amount` seconds and returns its new label.
    pub fn shift(&mut self, index: usize, amount: f64) -> Option<String> {
        let label = self.board.shift(index, amount)?.to_string();
        info!(index, amount, label, "Shifted chop.");
        Some(label)
    }

    /// Nudges the most recently triggered chop.
    pub fn shift_last(&mut self, amount: f64) -> Option<String> {
        let Some(index) = self.last_chop else {
            info!("No chop has been triggered yet, nothing to shift.");
            return None;
        };
        self.shift(index, amount)
    }

    pub fn key_down(&mut self, key: KeyId) -> Option<Action> {
        let mut deck = Deck {
            transport: &self.transport,
            board: &self.board,
            last_chop: &mut self.last_chop,
        };
        self.router.key_down(key, &mut deck)
    }

    pub fn key_up(&mut self, key: KeyId) {
        let mut deck = Deck {
            transport: &self.transport,
            board: &self.board,
            last_chop: &mut self.last_chop,
        };
        self.router.key_up(key, &mut deck);
    }

    /// Flips toggle hold and returns its new value.
    pub fn toggle_hold(&mut self) -> bool {
        self.router.toggle_hold()
    }

    /// Runs one playhead clock tick. Returns true if it stopped playback.
    pub fn tick(&mut self) -> bool {
        self.clock.tick(&self.transport, &self.notifier)
    }

    /// A ticker at the playhead clock period.
    pub fn schedule(&self) -> Interval {
        self.clock.schedule()
    }

    fn deck(&mut self) -> Deck<'_> {
        Deck {
            transport: &self.transport,
            board: &self.board,
            last_chop: &mut self.last_chop,
        }
    }
}
