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
use std::fmt;

use tracing::debug;

use crate::transport::Transport;
use crate::util::seconds_to_label;

/// The number of chop points on a board.
pub const CHOP_COUNT: usize = 9;

/// One entry of the chop adjustment menu.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftAmount {
    /// Signed shift in seconds.
    pub seconds: f64,
    /// Menu label.
    pub label: &'static str,
}

/// The chop adjustment menu, in display order.
pub const SHIFT_AMOUNTS: [ShiftAmount; 6] = [
    ShiftAmount {
        seconds: -5.0,
        label: "Pull 5s",
    },
    ShiftAmount {
        seconds: -1.0,
        label: "Pull 1s",
    },
    ShiftAmount {
        seconds: -0.1,
        label: "Pull 0.1s",
    },
    ShiftAmount {
        seconds: 0.1,
        label: "Push 0.1s",
    },
    ShiftAmount {
        seconds: 1.0,
        label: "Push 1s",
    },
    ShiftAmount {
        seconds: 5.0,
        label: "Push 5s",
    },
];

/// A timing marker within a track.
#[derive(Debug, Clone, PartialEq)]
pub struct ChopPoint {
    /// Offset into the track in seconds, always within [0, duration].
    timing: f64,
    /// Length of the track the point belongs to.
    duration: f64,
    /// Cached minutes:seconds rendering of `timing`.
    label: String,
}

impl ChopPoint {
    /// Creates a new chop point at `timing` for a track of length `duration`.
    pub fn new(timing: f64, duration: f64) -> ChopPoint {
        let mut point = ChopPoint {
            timing: 0.0,
            duration: duration.max(0.0),
            label: String::new(),
        };
        point.set_timing(timing);
        point
    }

    /// Offset into the track in seconds.
    pub fn timing(&self) -> f64 {
        self.timing
    }

    /// The minutes:seconds label of the current timing.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Moves the point to `timing`, clamped to the track.
    pub fn set_timing(&mut self, timing: f64) {
        self.timing = if timing.is_nan() {
            0.0
        } else {
            timing.clamp(0.0, self.duration)
        };
        self.label = seconds_to_label(self.timing);
    }

    /// Nudges the point by `amount` seconds.
    pub fn shift(&mut self, amount: f64) {
        self.set_timing(self.timing + amount);
    }
}

impl fmt::Display for ChopPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// The nine chop points of the loaded track. Empty until a track is loaded.
#[derive(Debug, Clone, Default)]
pub struct ChopBoard {
    points: Vec<ChopPoint>,
}

impl ChopBoard {
    /// Creates an empty board.
    pub fn new() -> ChopBoard {
        ChopBoard::default()
    }

    /// Creates a board initialized for a track of length `duration`.
    pub fn for_duration(duration: f64) -> ChopBoard {
        let mut board = ChopBoard::new();
        board.initialize(duration);
        board
    }

    /// Replaces every point, spacing them at the tenths of the track.
    pub fn initialize(&mut self, duration: f64) {
        let step = duration.max(0.0) / 10.0;
        self.points = (1..=CHOP_COUNT)
            .map(|i| ChopPoint::new(step * i as f64, duration))
            .collect();
        debug!(duration, "Chop board initialized.");
    }

    /// True once the board has been initialized for a track.
    pub fn is_initialized(&self) -> bool {
        !self.points.is_empty()
    }

    /// The points in trigger order.
    pub fn points(&self) -> &[ChopPoint] {
        &self.points
    }

    /// The labels of every point in trigger order.
    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|p| p.label().to_string()).collect()
    }

    /// The seek target for chop `index`, or None if the board is empty.
    ///
    /// Panics if `index` is not a valid chop index.
    pub fn resolve(&self, index: usize) -> Option<f64> {
        assert!(index < CHOP_COUNT, "chop index {} out of range", index);
        self.points.get(index).map(ChopPoint::timing)
    }

    /// Jumps the transport to chop `index` and makes sure it is playing. Returns false,
    /// touching nothing, if the board is empty.
    ///
    /// Panics if `index` is not a valid chop index.
    pub fn trigger(&self, index: usize, transport: &Transport) -> bool {
        let Some(timing) = self.resolve(index) else {
            debug!(index, "Chop board is empty, ignoring trigger.");
            return false;
        };
        transport.jump_to(timing);
        true
    }

    /// Nudges chop `index` by `amount` seconds. Returns the new label, or None if the
    /// board is empty.
    ///
    /// Panics if `index` is not a valid chop index.
    pub fn shift(&mut self, index: usize, amount: f64) -> Option<&str> {
        assert!(index < CHOP_COUNT, "chop index {} out of range", index);
        let point = self.points.get_mut(index)?;
        point.shift(amount);
        debug!(index, amount, timing = point.timing(), "Chop shifted.");
        Some(point.label())
    }
}
