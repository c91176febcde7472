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
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chopdeck::audio::{self, decode::decode_file, source::AudioSource};
use chopdeck::chops::{ChopBoard, SHIFT_AMOUNTS};
use chopdeck::clock::PlayheadClock;
use chopdeck::config;
use chopdeck::controller::{keyboard, Controller};
use chopdeck::notify::{Notification, Notifier};
use chopdeck::session::Session;
use chopdeck::transport::TransportState;
use chopdeck::util::{file_stem_display, seconds_to_label};
use clap::{crate_version, Parser, Subcommand};
use crossbeam_channel::Receiver;
use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A live-performance chop sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the nine chop points of an audio file.
    Chops {
        /// The audio file to chop.
        path: PathBuf,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Plays an audio file from the keyboard.
    Play {
        /// The audio file to play.
        path: PathBuf,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config.
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr, the status line owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Chops { path, config } => {
            let player = config::load_player(config.as_deref())?;
            let source = decode_file(&path, player.audio().sample_rate())?;
            let duration = source.duration();
            let board = ChopBoard::for_duration(duration);

            println!(
                "{} ({}, {} channels)",
                file_stem_display(&path),
                seconds_to_label(duration),
                source.channel_count()
            );
            for (index, point) in board.points().iter().enumerate() {
                println!("- {}: {} ({:.3}s)", index + 1, point, point.timing());
            }
        }
        Commands::Play {
            path,
            config,
            device,
        } => {
            let mut player = config::load_player(config.as_deref())?;
            if let Some(device) = device {
                player.set_audio_device(&device);
            }
            let device = audio::get_device(&player.audio())?;

            let notifier = Arc::new(Notifier::new());
            let notifications = notifier.subscribe();
            let status = thread::Builder::new()
                .name("chopdeck-status".to_string())
                .spawn(move || show_status(notifications))?;

            let mut session = Session::new(
                notifier.clone(),
                device.format().sample_rate,
                PlayheadClock::new(player.playhead_interval()?),
                player.toggle_hold(),
            );
            session.load(&path)?;
            let output = device.open(session.transport())?;

            print_keys();
            let driver = Arc::new(keyboard::Driver::new(player.digits_as_numpad()));
            let session = Controller::new(session, driver)?.join().await?;

            // Every notifier reference has to go before the status thread will exit.
            drop(output);
            drop(session);
            drop(notifier);
            if status.join().is_err() {
                error!("Status thread panicked.");
            }
            println!();
        }
    }

    Ok(())
}

/// Prints the key layout.
fn print_keys() {
    println!("1-9: chops, 0: stop, space: play");
    let shifts: Vec<String> = keyboard::SHIFT_KEYS
        .iter()
        .zip(SHIFT_AMOUNTS.iter())
        .map(|(key, amount)| format!("{}: {}", key, amount.label))
        .collect();
    println!("{}", shifts.join(", "));
    println!(
        "{}: toggle hold, {}: quit",
        keyboard::TOGGLE_HOLD,
        keyboard::QUIT
    );
}

/// Renders notifications as a single status line until every notifier is gone.
fn show_status(notifications: Receiver<Notification>) {
    let mut stdout = io::stdout();
    let mut name = String::new();
    let mut state = TransportState::Stopped;
    let (mut seconds, mut duration) = (0.0, 0.0);

    for notification in notifications.iter() {
        let prefix = match notification {
            Notification::State(new_state) => {
                state = new_state;
                String::new()
            }
            Notification::Loaded {
                name: loaded,
                duration: loaded_duration,
                labels,
            } => {
                name = loaded;
                duration = loaded_duration;
                seconds = 0.0;
                format!(
                    "{} ({}): {}\r\n",
                    name,
                    seconds_to_label(duration),
                    labels.join(" ")
                )
            }
            Notification::Position {
                seconds: polled_seconds,
                duration: polled_duration,
                state: polled_state,
            } => {
                seconds = polled_seconds;
                duration = polled_duration;
                state = polled_state;
                String::new()
            }
        };

        let line = format!(
            "{}{} [{}] {} / {}",
            prefix,
            name,
            state,
            seconds_to_label(seconds),
            seconds_to_label(duration)
        );
        let _ = queue!(
            stdout,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        );
        let _ = stdout.flush();
    }
}
