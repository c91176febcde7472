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
use std::{path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::clock::DEFAULT_INTERVAL;

/// Playhead clock settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Playhead {
    /// How often the playhead is polled, e.g. "40ms".
    interval: Option<String>,
}

/// Keyboard settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Keyboard {
    /// The initial toggle-hold latch.
    toggle_hold: Option<bool>,
    /// Treat the top-row digits as numeric-pad keys.
    digits_as_numpad: Option<bool>,
}

/// The configuration for the chop player.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Player {
    /// The audio output configuration.
    audio: Option<Audio>,
    /// The playhead clock configuration.
    playhead: Option<Playhead>,
    /// The keyboard configuration.
    keyboard: Option<Keyboard>,
}

impl Player {
    /// Parse a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?)
    }

    /// Returns the audio configuration, defaulted if missing.
    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    /// Overrides the configured audio device.
    pub fn set_audio_device(&mut self, device: &str) {
        self.audio.get_or_insert_with(Audio::default).set_device(device);
    }

    /// Returns the playhead clock period (default: 40ms).
    pub fn playhead_interval(&self) -> Result<Duration, ConfigError> {
        match self.playhead.as_ref().and_then(|p| p.interval.as_ref()) {
            Some(interval) => {
                let duration: Duration = DurationString::from_string(interval.clone())
                    .map_err(|e| ConfigError::InvalidDuration(interval.clone(), e.to_string()))?
                    .into();
                if duration.is_zero() {
                    return Err(ConfigError::InvalidDuration(
                        interval.clone(),
                        "the playhead interval must be greater than zero".to_string(),
                    ));
                }
                Ok(duration)
            }
            None => Ok(DEFAULT_INTERVAL),
        }
    }

    /// Returns the initial toggle-hold latch (default: false).
    pub fn toggle_hold(&self) -> bool {
        self.keyboard
            .as_ref()
            .and_then(|k| k.toggle_hold)
            .unwrap_or(false)
    }

    /// Returns whether top-row digits act as numeric-pad keys (default: true).
    pub fn digits_as_numpad(&self) -> bool {
        self.keyboard
            .as_ref()
            .and_then(|k| k.digits_as_numpad)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, time::Duration};

    use config::{Config, File, FileFormat};
    use tempfile::tempdir;

    use super::Player;

    fn parse(yaml: &str) -> Player {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let player = Player::default();
        assert_eq!("default", player.audio().device());
        assert_eq!(Duration::from_millis(40), player.playhead_interval().unwrap());
        assert!(!player.toggle_hold());
        assert!(player.digits_as_numpad());
    }

    #[test]
    fn test_deserialize() {
        let player = parse(
            r#"
            audio:
              device: mock-device
              sample_rate: 48000
            playhead:
              interval: 20ms
            keyboard:
              toggle_hold: true
              digits_as_numpad: false
        "#,
        );

        assert_eq!("mock-device", player.audio().device());
        assert_eq!(48000, player.audio().sample_rate());
        assert_eq!(Duration::from_millis(20), player.playhead_interval().unwrap());
        assert!(player.toggle_hold());
        assert!(!player.digits_as_numpad());
    }

    #[test]
    fn test_invalid_interval() {
        assert!(parse("playhead:\n  interval: soon\n").playhead_interval().is_err());
        assert!(parse("playhead:\n  interval: 0ms\n").playhead_interval().is_err());
    }

    #[test]
    fn test_set_audio_device() {
        let mut player = parse("keyboard:\n  toggle_hold: true\n");
        player.set_audio_device("mock-override");
        assert_eq!("mock-override", player.audio().device());
        assert_eq!(44100, player.audio().sample_rate());
    }

    #[test]
    fn test_deserialize_file() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("chopdeck.yaml");
        std::fs::write(&path, "audio:\n  device: mock-file\n")?;

        let player = Player::deserialize(&path)?;
        assert_eq!("mock-file", player.audio().device());
        assert!(Player::deserialize(&dir.path().join("missing.yaml")).is_err());
        Ok(())
    }
}
