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
use std::io;
use std::time::{Duration, Instant};

use crossterm::{
    event::{
        self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers,
        KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute, terminal,
};
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::chops::SHIFT_AMOUNTS;
use crate::keys::KeyId;

pub const TOGGLE_HOLD: char = 'h';
pub const QUIT: char = 'q';

/// The shift keys, in the order of the shift menu.
pub const SHIFT_KEYS: [char; 6] = ['z', 'x', 'c', 'v', 'b', 'n'];

/// How long a key has to go without a press before its release is synthesized. Longer than
/// the usual auto-repeat delay.
const RELEASE_AFTER: Duration = Duration::from_millis(700);

/// A controller that reads key presses and releases from the terminal.
pub struct Driver {
    /// Treat top-row digits as numeric-pad keys.
    digits_as_numpad: bool,
}

impl Driver {
    pub fn new(digits_as_numpad: bool) -> Driver {
        Driver { digits_as_numpad }
    }

    /// Turns a terminal key event into a controller event.
    pub fn translate(key: &KeyEvent, digits_as_numpad: bool) -> Option<Event> {
        let down = key.kind != KeyEventKind::Release;
        let pressed = key.kind == KeyEventKind::Press;
        let key_event = |id: KeyId| {
            if down {
                Event::KeyDown(id)
            } else {
                Event::KeyUp(id)
            }
        };

        match key.code {
            // Control keys act on press only. Their releases and repeats are swallowed.
            KeyCode::Esc => pressed.then_some(Event::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                pressed.then_some(Event::Quit)
            }
            KeyCode::Char(QUIT) => pressed.then_some(Event::Quit),
            KeyCode::Char(TOGGLE_HOLD) => pressed.then_some(Event::ToggleHold),
            KeyCode::Char(c) if SHIFT_KEYS.contains(&c) => {
                if !pressed {
                    return None;
                }
                let index = SHIFT_KEYS.iter().position(|k| *k == c)?;
                Some(Event::Shift(SHIFT_AMOUNTS[index].seconds))
            }
            KeyCode::Char(' ') => Some(key_event(KeyId::Space)),
            KeyCode::Char(c) if c.is_ascii_digit() => {
                let keypad = key.state.contains(KeyEventState::KEYPAD);
                let id = match c.to_digit(10) {
                    Some(digit) if keypad || digits_as_numpad => KeyId::Numpad(digit as u8),
                    _ => KeyId::Char(c),
                };
                Some(key_event(id))
            }
            KeyCode::Char(c) => Some(key_event(KeyId::Char(c))),
            _ => None,
        }
    }

    fn monitor_terminal(
        events_tx: &Sender<Event>,
        digits_as_numpad: bool,
        reports_releases: bool,
    ) -> Result<(), io::Error> {
        let mut releases = (!reports_releases).then(|| ReleaseTimer::new(RELEASE_AFTER));

        loop {
            if let Some(timer) = releases.as_mut() {
                if let Some(wait) = timer.remaining(Instant::now()) {
                    if !event::poll(wait)? {
                        if let Some(release) = timer.expire(Instant::now()) {
                            Self::send(events_tx, release)?;
                        }
                        continue;
                    }
                }
            }

            let TermEvent::Key(key) = event::read()? else {
                continue;
            };
            let Some(event) = Self::translate(&key, digits_as_numpad) else {
                continue;
            };

            let quit = event == Event::Quit;
            let events = match releases.as_mut() {
                Some(timer) => timer.press(event, Instant::now()),
                None => vec![event],
            };
            for event in events {
                Self::send(events_tx, event)?;
            }
            if quit {
                return Ok(());
            }
        }
    }

    fn send(events_tx: &Sender<Event>, event: Event) -> Result<(), io::Error> {
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Synthesizes key releases for terminals that only report presses. A key counts as held
/// while its presses keep arriving, so auto-repeat presses are swallowed and the release
/// goes out once the presses stop.
struct ReleaseTimer {
    quiet: Duration,
    /// The held key and when it was last pressed.
    held: Option<(KeyId, Instant)>,
}

impl ReleaseTimer {
    fn new(quiet: Duration) -> ReleaseTimer {
        ReleaseTimer { quiet, held: None }
    }

    /// Filters a translated event. Pressing another key releases the held one first.
    fn press(&mut self, event: Event, now: Instant) -> Vec<Event> {
        let Event::KeyDown(id) = event else {
            return vec![event];
        };

        let previous = self.held.replace((id, now));
        match previous {
            Some((held, last)) if held == id && now.saturating_duration_since(last) < self.quiet => {
                Vec::new()
            }
            Some((held, _)) => vec![Event::KeyUp(held), Event::KeyDown(id)],
            None => vec![Event::KeyDown(id)],
        }
    }

    /// Time left until the held key is released, or None if nothing is held.
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.held
            .map(|(_, last)| self.quiet.saturating_sub(now.saturating_duration_since(last)))
    }

    /// Releases the held key once it has been quiet long enough.
    fn expire(&mut self, now: Instant) -> Option<Event> {
        let (id, last) = self.held?;
        if now.saturating_duration_since(last) < self.quiet {
            return None;
        }
        self.held = None;
        Some(Event::KeyUp(id))
    }
}

/// Puts the terminal into raw mode with key release reporting, and restores it on drop.
struct RawModeGuard {
    enhanced: bool,
}

impl RawModeGuard {
    fn enter() -> Result<RawModeGuard, io::Error> {
        terminal::enable_raw_mode()?;
        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                )
            )?;
        }
        Ok(RawModeGuard { enhanced })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let digits_as_numpad = self.digits_as_numpad;
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            let guard = RawModeGuard::enter()?;
            if !guard.enhanced {
                warn!("Terminal does not report key releases, releases are synthesized after a pause.");
            }
            info!(digits_as_numpad, "Keyboard driver started.");

            Self::monitor_terminal(&events_tx, digits_as_numpad, guard.enhanced)
        })
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};

    use crate::controller::Event;
    use crate::keys::KeyId;

    use super::{Driver, ReleaseTimer};

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, kind)
    }

    fn press(code: KeyCode) -> Option<Event> {
        Driver::translate(&key(code, KeyEventKind::Press), true)
    }

    #[test]
    fn test_digits() {
        assert_eq!(
            Some(Event::KeyDown(KeyId::Numpad(7))),
            press(KeyCode::Char('7'))
        );
        assert_eq!(
            Some(Event::KeyUp(KeyId::Numpad(0))),
            Driver::translate(&key(KeyCode::Char('0'), KeyEventKind::Release), true)
        );
        assert_eq!(
            Some(Event::KeyDown(KeyId::Numpad(7))),
            Driver::translate(&key(KeyCode::Char('7'), KeyEventKind::Repeat), true)
        );
    }

    #[test]
    fn test_top_row_digits() {
        let top_row = key(KeyCode::Char('3'), KeyEventKind::Press);
        assert_eq!(
            Some(Event::KeyDown(KeyId::Char('3'))),
            Driver::translate(&top_row, false)
        );

        let mut keypad = top_row;
        keypad.state = KeyEventState::KEYPAD;
        assert_eq!(
            Some(Event::KeyDown(KeyId::Numpad(3))),
            Driver::translate(&keypad, false)
        );
    }

    #[test]
    fn test_space() {
        assert_eq!(Some(Event::KeyDown(KeyId::Space)), press(KeyCode::Char(' ')));
        assert_eq!(
            Some(Event::KeyUp(KeyId::Space)),
            Driver::translate(&key(KeyCode::Char(' '), KeyEventKind::Release), true)
        );
    }

    #[test]
    fn test_controls() {
        assert_eq!(Some(Event::ToggleHold), press(KeyCode::Char('h')));
        assert_eq!(Some(Event::Quit), press(KeyCode::Char('q')));
        assert_eq!(Some(Event::Quit), press(KeyCode::Esc));
        assert_eq!(
            Some(Event::Quit),
            Driver::translate(
                &KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
                true
            )
        );
        // Releases and repeats of control keys do nothing.
        for code in [KeyCode::Char('h'), KeyCode::Char('q'), KeyCode::Esc] {
            for kind in [KeyEventKind::Release, KeyEventKind::Repeat] {
                assert_eq!(None, Driver::translate(&key(code, kind), true));
            }
        }
        assert_eq!(
            None,
            Driver::translate(
                &KeyEvent::new_with_kind(
                    KeyCode::Char('c'),
                    KeyModifiers::CONTROL,
                    KeyEventKind::Release
                ),
                true
            )
        );
    }

    #[test]
    fn test_shift_keys() {
        assert_eq!(Some(Event::Shift(-5.0)), press(KeyCode::Char('z')));
        assert_eq!(Some(Event::Shift(-1.0)), press(KeyCode::Char('x')));
        assert_eq!(Some(Event::Shift(-0.1)), press(KeyCode::Char('c')));
        assert_eq!(Some(Event::Shift(0.1)), press(KeyCode::Char('v')));
        assert_eq!(Some(Event::Shift(1.0)), press(KeyCode::Char('b')));
        assert_eq!(Some(Event::Shift(5.0)), press(KeyCode::Char('n')));
        assert_eq!(
            None,
            Driver::translate(&key(KeyCode::Char('n'), KeyEventKind::Repeat), true)
        );
    }

    #[test]
    fn test_other_keys() {
        assert_eq!(Some(Event::KeyDown(KeyId::Char('a'))), press(KeyCode::Char('a')));
        assert_eq!(None, press(KeyCode::F(1)));
    }

    #[test]
    fn test_auto_repeat_presses_trigger_once() {
        let quiet = Duration::from_millis(700);
        let mut timer = ReleaseTimer::new(quiet);
        let start = Instant::now();
        let five = Event::KeyDown(KeyId::Numpad(5));

        let mut events = Vec::new();
        // The first press, then auto-repeat every 30ms after the initial delay.
        events.extend(timer.press(five.clone(), start));
        for i in 0..20u64 {
            let at = start + Duration::from_millis(500 + i * 30);
            events.extend(timer.press(five.clone(), at));
            assert_eq!(None, timer.expire(at));
        }
        assert_eq!(vec![five], events);

        let last = start + Duration::from_millis(500 + 19 * 30);
        assert_eq!(Some(quiet), timer.remaining(last));
        assert_eq!(None, timer.expire(last + Duration::from_millis(699)));
        assert_eq!(
            Some(Event::KeyUp(KeyId::Numpad(5))),
            timer.expire(last + quiet)
        );
        assert_eq!(None, timer.remaining(last + quiet));
        assert_eq!(None, timer.expire(last + quiet));
    }

    #[test]
    fn test_pressing_another_key_releases_held_key() {
        let mut timer = ReleaseTimer::new(Duration::from_millis(700));
        let start = Instant::now();

        timer.press(Event::KeyDown(KeyId::Numpad(1)), start);
        assert_eq!(
            vec![
                Event::KeyUp(KeyId::Numpad(1)),
                Event::KeyDown(KeyId::Numpad(2))
            ],
            timer.press(
                Event::KeyDown(KeyId::Numpad(2)),
                start + Duration::from_millis(100)
            )
        );
    }

    #[test]
    fn test_press_after_quiet_period_is_new_press() {
        let mut timer = ReleaseTimer::new(Duration::from_millis(700));
        let start = Instant::now();
        let nine = Event::KeyDown(KeyId::Numpad(9));

        timer.press(nine.clone(), start);
        assert_eq!(
            vec![Event::KeyUp(KeyId::Numpad(9)), nine.clone()],
            timer.press(nine, start + Duration::from_secs(1))
        );
    }

    #[test]
    fn test_other_events_pass_through_release_timer() {
        let mut timer = ReleaseTimer::new(Duration::from_millis(700));
        let start = Instant::now();

        timer.press(Event::KeyDown(KeyId::Space), start);
        assert_eq!(
            vec![Event::ToggleHold],
            timer.press(Event::ToggleHold, start)
        );
        assert_eq!(vec![Event::Shift(1.0)], timer.press(Event::Shift(1.0), start));
        assert_eq!(Some(Duration::from_millis(700)), timer.remaining(start));
    }
}
