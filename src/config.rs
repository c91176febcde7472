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
use std::path::Path;

mod audio;
mod error;
mod player;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::player::{Keyboard, Player, Playhead};

/// Loads the player configuration, or the defaults when no path is given.
pub fn load_player(path: Option<&Path>) -> Result<Player, ConfigError> {
    match path {
        Some(path) => Player::deserialize(path),
        None => Ok(Player::default()),
    }
}
