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
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::transport::TransportState;

/// How many notifications an observer may fall behind before new ones are dropped for it.
const OBSERVER_CAPACITY: usize = 64;

/// Signals emitted by the control path for whatever renders the player.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The transport moved to a new state.
    State(TransportState),
    /// The playhead was polled. Both times are in seconds. The state rides along so an
    /// observer that missed a `State` notification still catches up.
    Position {
        seconds: f64,
        duration: f64,
        state: TransportState,
    },
    /// A file was loaded and the chop board was rebuilt.
    Loaded {
        name: String,
        duration: f64,
        labels: Vec<String>,
    },
}

/// Explicit observer registration. Emitting never blocks: an observer whose queue is
/// full misses the notification, and observers whose receiver is gone are pruned.
#[derive(Default)]
pub struct Notifier {
    observers: Mutex<Vec<Sender<Notification>>>,
}

impl Notifier {
    /// Creates a notifier with no observers.
    pub fn new() -> Notifier {
        Notifier::default()
    }

    /// Registers a new observer and returns its receiving end.
    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = crossbeam_channel::bounded(OBSERVER_CAPACITY);
        self.observers.lock().push(tx);
        rx
    }

    /// Sends the notification to every observer.
    pub fn emit(&self, notification: Notification) {
        let mut observers = self.observers.lock();
        observers.retain(|observer| match observer.try_send(notification.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}
