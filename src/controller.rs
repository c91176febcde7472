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
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, Instrument, Level};

use crate::keys::KeyId;
use crate::session::Session;

pub mod keyboard;

/// Controller events that will trigger behavior in the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A key was pressed.
    KeyDown(KeyId),

    /// A key was released.
    KeyUp(KeyId),

    /// Flips toggle hold.
    ToggleHold,

    /// Nudges the most recently triggered chop by the given number of seconds.
    Shift(f64),

    /// Loads a new file. On failure the current file stays loaded.
    Load(PathBuf),

    /// Stops the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a session from a driver's events and the playhead clock.
pub struct Controller {
    handle: JoinHandle<Session>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(session: Session, driver: Arc<dyn Driver>) -> Result<Controller, Box<dyn Error>> {
        let span = span!(Level::INFO, "controller");
        Ok(Controller {
            handle: tokio::spawn(Controller::trigger_events(session, driver).instrument(span)),
        })
    }

    /// Join will block until the controller finishes and hands back the session.
    pub async fn join(&mut self) -> Result<Session, JoinError> {
        (&mut self.handle).await
    }

    /// Triggers session events by watching the driver and ticking the playhead clock.
    async fn trigger_events(mut session: Session, driver: Arc<dyn Driver>) -> Session {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);
        let mut ticker = session.schedule();

        info!(file = session.file_name(), "Controller started.");

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        info!("Driver closed.");
                        break;
                    };
                    debug!(event = format!("{:?}", event), "Received event.");
                    if event == Event::Quit {
                        info!("Quit requested.");
                        break;
                    }
                    Controller::handle_event(&mut session, event);
                }
                _ = ticker.tick() => {
                    session.tick();
                }
            }
        }

        session.stop();
        // Dropping the receiver unblocks a driver waiting to send.
        drop(events_rx);
        match join_handle.await {
            Ok(Err(e)) => error!("Driver failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
        info!("Controller closing.");
        session
    }

    fn handle_event(session: &mut Session, event: Event) {
        match event {
            Event::KeyDown(key) => {
                session.key_down(key);
            }
            Event::KeyUp(key) => session.key_up(key),
            Event::ToggleHold => {
                session.toggle_hold();
            }
            Event::Shift(amount) => {
                session.shift_last(amount);
            }
            Event::Load(path) => {
                if let Err(e) = session.load(&path) {
                    error!(path = %path.display(), "Error loading file: {}", e);
                }
            }
            Event::Quit => {}
        }
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io, path::PathBuf, sync::Arc, time::Duration};

    use tempfile::tempdir;
    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::{mock, Device as _, OutputFormat, SampleFormat},
        clock::PlayheadClock,
        keys::KeyId,
        notify::Notifier,
        session::Session,
        testutil::write_wav,
        transport::TransportState,
    };

    use super::{Controller, Driver, Event};

    /// Sends a fixed script of events, pausing where asked.
    struct ScriptDriver {
        script: Vec<(Event, Duration)>,
    }

    impl ScriptDriver {
        fn new(script: Vec<(Event, Duration)>) -> ScriptDriver {
            ScriptDriver { script }
        }
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let script = self.script.clone();
            tokio::task::spawn_blocking(move || {
                for (event, pause) in script {
                    events_tx
                        .blocking_send(event)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                    std::thread::sleep(pause);
                }
                Ok(())
            })
        }
    }

    fn session() -> Session {
        Session::new(
            Arc::new(Notifier::new()),
            1000,
            PlayheadClock::new(Duration::from_millis(10)),
            false,
        )
    }

    fn fixture(seconds: usize) -> Result<(tempfile::TempDir, PathBuf), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("fixture.wav");
        write_wav(path.clone(), vec![0.2f32; seconds * 1000], 1, 1000)?;
        Ok((dir, path))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_routes_events() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = fixture(20)?;
        let short = Duration::from_millis(5);
        let driver = Arc::new(ScriptDriver::new(vec![
            (Event::Load(path), short),
            (Event::KeyDown(KeyId::Numpad(5)), short),
            (Event::KeyUp(KeyId::Numpad(5)), short),
            (Event::Shift(1.0), short),
            (Event::ToggleHold, short),
        ]));

        let mut controller = Controller::new(session(), driver)?;
        let session = controller.join().await?;

        assert_eq!(Some("fixture"), session.file_name());
        assert_eq!(Some(4), session.last_chop());
        assert_eq!(Some(11.0), session.board().resolve(4));
        assert!(session.hold().toggle_hold);
        // The controller stops playback on its way out.
        assert_eq!(TransportState::Stopped, session.state());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_bad_load_keeps_running() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = fixture(10)?;
        let short = Duration::from_millis(5);
        let driver = Arc::new(ScriptDriver::new(vec![
            (Event::Load(path), short),
            (Event::Load(PathBuf::from("/no/such/file.wav")), short),
            (Event::KeyDown(KeyId::Numpad(1)), short),
        ]));

        let mut controller = Controller::new(session(), driver)?;
        let session = controller.join().await?;

        assert_eq!(Some("fixture"), session.file_name());
        assert_eq!(Some(0), session.last_chop());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clock_stops_at_end_of_file() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = fixture(1)?;
        let mut session = session();
        session.load(&path)?;
        let transport = session.transport();

        let device = mock::Device::get(
            "mock-clock",
            OutputFormat::new(1000, SampleFormat::Float, 32)?,
        );
        let _handle = device.open(session.transport())?;

        // Chop 9 sits a tenth of a second from the end.
        let driver = Arc::new(ScriptDriver::new(vec![
            (Event::KeyDown(KeyId::Numpad(9)), Duration::from_millis(500)),
            (Event::Quit, Duration::ZERO),
        ]));
        let mut controller = Controller::new(session, driver)?;
        let session = controller.join().await?;

        assert_eq!(TransportState::Stopped, session.state());
        assert_eq!(0.0, transport.position());
        assert!(device.frames_played() >= 100);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quit_ends_controller() -> Result<(), Box<dyn Error>> {
        let driver = Arc::new(ScriptDriver::new(vec![
            (Event::Quit, Duration::ZERO),
            (Event::ToggleHold, Duration::ZERO),
        ]));

        let mut controller = Controller::new(session(), driver)?;
        let session = controller.join().await?;
        assert!(!session.hold().toggle_hold);
        Ok(())
    }
}
