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

//! Synthesizer configuration.
//!
//! Hosts usually construct this from a YAML document; every field has a
//! sensible default so an empty document is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default render block length in frames.
pub const DEFAULT_BLOCK_FRAMES: usize = 128;

/// Default global cap on simultaneously sounding voices.
pub const DEFAULT_VOICE_CAP: usize = 400;

/// Typed error for config load/parse failures so callers can distinguish
/// file problems from malformed documents.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A YAML representation of the synthesizer configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SynthConfig {
    /// The output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// Frames rendered per process() call.
    #[serde(default = "default_block_frames")]
    block_frames: usize,

    /// Global cap on simultaneously sounding voices. Overflow steals the
    /// lowest-velocity voices.
    #[serde(default = "default_voice_cap")]
    voice_cap: usize,

    /// Linear gain applied to the main stereo output after mixing.
    #[serde(default = "default_master_gain")]
    master_gain: f32,

    /// Number of channels available at startup.
    #[serde(default = "default_channel_count")]
    channel_count: usize,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_block_frames() -> usize {
    DEFAULT_BLOCK_FRAMES
}

fn default_voice_cap() -> usize {
    DEFAULT_VOICE_CAP
}

fn default_master_gain() -> f32 {
    1.0
}

fn default_channel_count() -> usize {
    16
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_frames: default_block_frames(),
            voice_cap: default_voice_cap(),
            master_gain: default_master_gain(),
            channel_count: default_channel_count(),
        }
    }
}

impl SynthConfig {
    /// Loads a config from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Parses a config from a YAML string.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Gets the output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Gets the render block length in frames.
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Gets the global voice cap.
    pub fn voice_cap(&self) -> usize {
        self.voice_cap
    }

    /// Gets the master output gain.
    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Gets the number of channels present at startup.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
}
