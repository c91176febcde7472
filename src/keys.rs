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
use std::{collections::HashSet, fmt};

use tracing::{debug, info};

/// The identity of a physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// A numeric-pad digit, 0-9.
    Numpad(u8),
    /// The space bar.
    Space,
    /// Any other character key.
    Char(char),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Numpad(digit) => write!(f, "numpad {}", digit),
            KeyId::Space => write!(f, "space"),
            KeyId::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// What a bound key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stop,
    Play,
    /// Jump to the chop with the given index, 0-8.
    Trigger(usize),
}

/// The fixed key binding table: numpad 0 stops, space plays, numpad 1-9 trigger chops
/// 0-8. Every other key is unbound.
pub fn binding(key: KeyId) -> Option<Action> {
    match key {
        KeyId::Numpad(0) => Some(Action::Stop),
        KeyId::Numpad(digit @ 1..=9) => Some(Action::Trigger(digit as usize - 1)),
        KeyId::Space => Some(Action::Play),
        _ => None,
    }
}

/// Whatever the router dispatches actions to.
pub trait ActionTarget {
    fn stop(&mut self);
    fn play(&mut self);
    fn trigger(&mut self, index: usize);
}

/// Hold and anti-repeat state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldState {
    /// When set, releasing the active key stops playback.
    pub toggle_hold: bool,
    /// The most recent bound key that is still being tracked.
    pub active_key: Option<KeyId>,
}

/// Routes key presses and releases to actions.
#[derive(Debug, Default)]
pub struct KeyRouter {
    hold: HoldState,
    down: HashSet<KeyId>,
}

impl KeyRouter {
    /// Creates a router with the given initial toggle-hold latch.
    pub fn new(toggle_hold: bool) -> KeyRouter {
        KeyRouter {
            hold: HoldState {
                toggle_hold,
                active_key: None,
            },
            down: HashSet::new(),
        }
    }

    pub fn hold(&self) -> &HoldState {
        &self.hold
    }

    /// True if the key has been pressed and not released.
    pub fn is_down(&self, key: KeyId) -> bool {
        self.down.contains(&key)
    }

    /// Handles a key press. Returns the action dispatched, if any. A press of the active
    /// key is a repeat and dispatches nothing. Unbound keys are ignored and leave the
    /// active key alone.
    pub fn key_down<T: ActionTarget + ?Sized>(
        &mut self,
        key: KeyId,
        target: &mut T,
    ) -> Option<Action> {
        self.down.insert(key);

        if self.hold.active_key == Some(key) {
            debug!(%key, "Ignoring repeated key.");
            return None;
        }

        let Some(action) = binding(key) else {
            debug!(%key, "Key is not bound.");
            return None;
        };

        match action {
            Action::Stop => target.stop(),
            Action::Play => target.play(),
            Action::Trigger(index) => target.trigger(index),
        }
        self.hold.active_key = Some(key);
        Some(action)
    }

    /// Handles a key release.
    pub fn key_up<T: ActionTarget + ?Sized>(&mut self, key: KeyId, target: &mut T) {
        self.down.remove(&key);
        let still_down = self
            .hold
            .active_key
            .is_some_and(|active| self.down.contains(&active));
        self.release_if_up(still_down, target);
    }

    /// Re-checks the active key against `is_down`, for callers that track physical key
    /// state themselves.
    pub fn key_state_changed<T, F>(&mut self, is_down: F, target: &mut T)
    where
        T: ActionTarget + ?Sized,
        F: Fn(KeyId) -> bool,
    {
        let still_down = self.hold.active_key.is_some_and(is_down);
        self.release_if_up(still_down, target);
    }

    /// Flips the toggle-hold latch and returns its new value.
    pub fn toggle_hold(&mut self) -> bool {
        self.hold.toggle_hold = !self.hold.toggle_hold;
        info!(toggle_hold = self.hold.toggle_hold, "Toggle hold changed.");
        self.hold.toggle_hold
    }

    fn release_if_up<T: ActionTarget + ?Sized>(&mut self, still_down: bool, target: &mut T) {
        let Some(active) = self.hold.active_key else {
            return;
        };
        if still_down {
            return;
        }

        if self.hold.toggle_hold {
            debug!(key = %active, "Held key released, stopping.");
            target.stop();
        }
        self.hold.active_key = None;
    }
}

#[cfg(test)]
mod test {
    use super::{binding, Action, ActionTarget, KeyId, KeyRouter};

    #[derive(Default)]
    struct Recorder {
        actions: Vec<Action>,
    }

    impl ActionTarget for Recorder {
        fn stop(&mut self) {
            self.actions.push(Action::Stop);
        }

        fn play(&mut self) {
            self.actions.push(Action::Play);
        }

        fn trigger(&mut self, index: usize) {
            self.actions.push(Action::Trigger(index));
        }
    }

    #[test]
    fn test_binding_table() {
        assert_eq!(Some(Action::Stop), binding(KeyId::Numpad(0)));
        assert_eq!(Some(Action::Play), binding(KeyId::Space));
        for digit in 1..=9u8 {
            assert_eq!(
                Some(Action::Trigger(digit as usize - 1)),
                binding(KeyId::Numpad(digit))
            );
        }
        assert_eq!(None, binding(KeyId::Char('a')));
        assert_eq!(None, binding(KeyId::Numpad(10)));
    }

    #[test]
    fn test_anti_repeat() {
        let mut router = KeyRouter::new(false);
        let mut target = Recorder::default();

        router.key_down(KeyId::Numpad(3), &mut target);
        router.key_down(KeyId::Numpad(3), &mut target);
        router.key_down(KeyId::Numpad(3), &mut target);
        assert_eq!(vec![Action::Trigger(2)], target.actions);

        router.key_up(KeyId::Numpad(3), &mut target);
        router.key_down(KeyId::Numpad(3), &mut target);
        assert_eq!(vec![Action::Trigger(2), Action::Trigger(2)], target.actions);
    }

    #[test]
    fn test_different_keys_both_fire() {
        let mut router = KeyRouter::new(false);
        let mut target = Recorder::default();

        router.key_down(KeyId::Numpad(1), &mut target);
        router.key_down(KeyId::Numpad(2), &mut target);
        router.key_down(KeyId::Numpad(0), &mut target);
        assert_eq!(
            vec![Action::Trigger(0), Action::Trigger(1), Action::Stop],
            target.actions
        );
        assert_eq!(Some(KeyId::Numpad(0)), router.hold().active_key);
    }

    #[test]
    fn test_unbound_key_is_ignored() {
        let mut router = KeyRouter::new(false);
        let mut target = Recorder::default();

        router.key_down(KeyId::Numpad(5), &mut target);
        assert_eq!(None, router.key_down(KeyId::Char('a'), &mut target));
        assert_eq!(Some(KeyId::Numpad(5)), router.hold().active_key);

        // Still a repeat of the active key.
        router.key_down(KeyId::Numpad(5), &mut target);
        assert_eq!(vec![Action::Trigger(4)], target.actions);
    }

    #[test]
    fn test_release_without_toggle_hold() {
        let mut router = KeyRouter::new(false);
        let mut target = Recorder::default();

        router.key_down(KeyId::Numpad(4), &mut target);
        router.key_up(KeyId::Numpad(4), &mut target);
        assert_eq!(vec![Action::Trigger(3)], target.actions);
        assert_eq!(None, router.hold().active_key);
    }

    #[test]
    fn test_release_with_toggle_hold_stops() {
        let mut router = KeyRouter::new(true);
        let mut target = Recorder::default();

        router.key_down(KeyId::Numpad(4), &mut target);
        router.key_up(KeyId::Numpad(4), &mut target);
        assert_eq!(vec![Action::Trigger(3), Action::Stop], target.actions);
        assert_eq!(None, router.hold().active_key);
    }

    #[test]
    fn test_release_of_other_key_keeps_hold() {
        let mut router = KeyRouter::new(true);
        let mut target = Recorder::default();

        router.key_down(KeyId::Char('q'), &mut target);
        router.key_down(KeyId::Numpad(4), &mut target);
        router.key_up(KeyId::Char('q'), &mut target);
        assert_eq!(vec![Action::Trigger(3)], target.actions);
        assert_eq!(Some(KeyId::Numpad(4)), router.hold().active_key);
    }

    #[test]
    fn test_key_state_changed_with_external_state() {
        let mut router = KeyRouter::new(true);
        let mut target = Recorder::default();

        router.key_down(KeyId::Numpad(9), &mut target);
        router.key_state_changed(|key| key == KeyId::Numpad(9), &mut target);
        assert_eq!(vec![Action::Trigger(8)], target.actions);

        router.key_state_changed(|_| false, &mut target);
        assert_eq!(vec![Action::Trigger(8), Action::Stop], target.actions);
        assert_eq!(None, router.hold().active_key);

        // Nothing active, nothing to release.
        router.key_state_changed(|_| false, &mut target);
        assert_eq!(2, target.actions.len());
    }

    #[test]
    fn test_toggle_hold() {
        let mut router = KeyRouter::new(false);
        assert!(router.toggle_hold());
        assert!(router.hold().toggle_hold);
        assert!(!router.toggle_hold());
    }

    #[test]
    fn test_is_down() {
        let mut router = KeyRouter::default();
        let mut target = Recorder::default();

        router.key_down(KeyId::Space, &mut target);
        assert!(router.is_down(KeyId::Space));
        router.key_up(KeyId::Space, &mut target);
        assert!(!router.is_down(KeyId::Space));
    }
}
