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
use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::info;

use crate::notify::{Notification, Notifier};
use crate::transport::{Transport, TransportState};

/// The default playhead polling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(40);

/// Polls the transport on a fixed period. This is the only thing that ends playback at
/// the end of the file.
#[derive(Debug, Clone)]
pub struct PlayheadClock {
    interval: Duration,
    ticks: u64,
}

impl Default for PlayheadClock {
    fn default() -> Self {
        PlayheadClock::new(DEFAULT_INTERVAL)
    }
}

impl PlayheadClock {
    pub fn new(interval: Duration) -> PlayheadClock {
        PlayheadClock { interval, ticks: 0 }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one tick: announces the position, then stops the transport if it has reached
    /// the end of the file. Returns true if this tick stopped playback.
    pub fn tick(&mut self, transport: &Transport, notifier: &Notifier) -> bool {
        self.ticks += 1;

        let seconds = transport.position();
        let duration = transport.duration();
        let state = transport.state();
        notifier.emit(Notification::Position {
            seconds,
            duration,
            state,
        });

        if seconds < duration {
            return false;
        }
        // Stopping while stopped only rewinds.
        transport.stop();
        if state == TransportState::Starting {
            info!(position = seconds, duration, "End of file reached.");
            return true;
        }
        false
    }

    /// A tokio interval firing at the clock period. Ticks missed while the control path
    /// was busy are skipped rather than bunched up.
    pub fn schedule(&self) -> Interval {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}
