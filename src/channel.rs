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

//! Per-channel state: the controller table, hold pedal, NRPN vibrato,
//! the live voice list, and the event handlers that mutate them.
//!
//! The controller table holds the 128 MIDI CCs in 14-bit form (7-bit
//! sources are stored shifted left by 7) followed by a tail of non-CC
//! controllers: pitch wheel, pitch-wheel range, channel pressure, channel
//! tuning and transpose.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::soundfont::Preset;
use crate::store::SampleStore;
use crate::voice::{build_voices, next_voice_id, Voice, VoiceContext};

/// Total controller slots per channel: 128 CCs plus the non-CC tail.
pub const CONTROLLER_TABLE_SIZE: usize = 147;

/// First index of the non-CC tail.
pub const NON_CC_INDEX_OFFSET: usize = 128;

/// Non-CC controller indices.
pub const PITCH_WHEEL: usize = NON_CC_INDEX_OFFSET;
pub const PITCH_WHEEL_RANGE: usize = NON_CC_INDEX_OFFSET + 1;
pub const CHANNEL_PRESSURE: usize = NON_CC_INDEX_OFFSET + 2;
pub const CHANNEL_TUNING: usize = NON_CC_INDEX_OFFSET + 3;
pub const CHANNEL_TRANSPOSE: usize = NON_CC_INDEX_OFFSET + 4;

/// MIDI CC numbers the core gives default routes or behavior to.
pub const CC_MODULATION: u8 = 1;
pub const CC_MAIN_VOLUME: u8 = 7;
pub const CC_PAN: u8 = 10;
pub const CC_EXPRESSION: u8 = 11;
pub const CC_SUSTAIN: u8 = 64;
pub const CC_RELEASE_TIME: u8 = 72;
pub const CC_BRIGHTNESS: u8 = 74;
pub const CC_REVERB_DEPTH: u8 = 91;
pub const CC_CHORUS_DEPTH: u8 = 93;

/// The per-channel controller snapshot modulators evaluate against.
pub type ControllerTable = [i16; CONTROLLER_TABLE_SIZE];

/// The release time forced on voices cut off by an exclusive-class mate,
/// in timecents.
pub const EXCLUSIVE_RELEASE_TIMECENTS: i16 = -7200;

/// The near-instant release forced by killNote, in timecents.
pub const KILL_RELEASE_TIMECENTS: i16 = -12000;

/// Default controller values after reset.
pub fn default_controllers() -> ControllerTable {
    let mut controllers = [0i16; CONTROLLER_TABLE_SIZE];
    controllers[usize::from(CC_MAIN_VOLUME)] = 100 << 7;
    controllers[usize::from(CC_EXPRESSION)] = 127 << 7;
    controllers[usize::from(CC_PAN)] = 64 << 7;
    controllers[usize::from(CC_RELEASE_TIME)] = 64 << 7;
    controllers[usize::from(CC_BRIGHTNESS)] = 64 << 7;
    controllers[PITCH_WHEEL] = 8192;
    controllers[PITCH_WHEEL_RANGE] = 2 << 7;
    controllers[CHANNEL_PRESSURE] = 127 << 7;
    controllers
}

/// NRPN-driven channel vibrato, on top of the per-voice vibrato LFO.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelVibrato {
    /// Seconds after voice start before the vibrato fades in.
    pub delay: f64,
    /// Depth in cents.
    pub depth: f64,
    /// Rate in Hz.
    pub rate: f64,
}

/// One MIDI-like channel with its controllers and sounding voices.
pub struct Channel {
    pub(crate) controllers: ControllerTable,
    pub(crate) hold_pedal: bool,
    pub(crate) vibrato: ChannelVibrato,
    pub(crate) voices: Vec<Voice>,
    /// Ids of voices whose note-off arrived while the hold pedal was
    /// down; they keep sounding until the pedal lifts.
    pub(crate) sustained_voices: Vec<u64>,
    pub(crate) muted: bool,
    preset: Option<Arc<Preset>>,
    /// Built-voice cache per (note, velocity). Entries are only created
    /// once every referenced sample has PCM in the store.
    cached_voices: HashMap<(u8, u8), Vec<Voice>>,
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel {
    pub fn new() -> Self {
        Self {
            controllers: default_controllers(),
            hold_pedal: false,
            vibrato: ChannelVibrato::default(),
            voices: Vec::new(),
            sustained_voices: Vec::new(),
            muted: false,
            preset: None,
            cached_voices: HashMap::new(),
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Assigns the preset used for subsequent note-ons. Sounding voices
    /// keep the preset they were built from.
    pub fn set_preset(&mut self, preset: Arc<Preset>) {
        self.cached_voices.clear();
        self.preset = Some(preset);
    }

    pub fn set_vibrato(&mut self, vibrato: ChannelVibrato) {
        self.vibrato = vibrato;
    }

    /// Starts voices for a note, cutting exclusive-class mates first.
    /// Returns the sample ids that still need a dump.
    pub(crate) fn note_on(
        &mut self,
        channel_index: usize,
        midi_note: u8,
        velocity: u8,
        now: f64,
        output_rate: f64,
        store: &mut SampleStore,
    ) -> Vec<u32> {
        let Some(preset) = self.preset.clone() else {
            debug!(channel = channel_index, "Note-on with no preset assigned");
            return Vec::new();
        };

        let mut dump_requests = Vec::new();
        let cached = self.cached_voices.get(&(midi_note, velocity)).cloned();
        let new_voices = match cached {
            Some(mut voices) => {
                for voice in &mut voices {
                    voice.id = next_voice_id();
                    voice.start_time = now;
                }
                voices
            }
            None => {
                let context = VoiceContext {
                    channel_index,
                    controllers: &self.controllers,
                    now,
                    output_rate,
                };
                let built = build_voices(&preset, midi_note, velocity, &context, store);
                dump_requests = built.dump_requests;
                if built.cacheable {
                    self.cached_voices
                        .insert((midi_note, velocity), built.voices.clone());
                }
                built.voices
            }
        };

        for mut voice in new_voices {
            let class = voice.exclusive_class();
            if class != 0 {
                for other in &mut self.voices {
                    if other.exclusive_class() == class && !other.finished {
                        other.force_release_timecents(EXCLUSIVE_RELEASE_TIMECENTS);
                        other.release(now);
                        other.recompute_modulators(&self.controllers);
                    }
                }
            }
            voice.recompute_modulators(&self.controllers);
            self.voices.push(voice);
        }

        dump_requests
    }

    /// Handles note-off: sustains the matching voices if the hold pedal
    /// is down, otherwise releases them.
    pub(crate) fn note_off(&mut self, midi_note: u8, now: f64) {
        for voice in &mut self.voices {
            if voice.midi_note != midi_note || voice.is_releasing() {
                continue;
            }
            if self.hold_pedal {
                self.sustained_voices.push(voice.id);
            } else {
                voice.release(now);
            }
        }
    }

    /// Releases matching voices with a near-instant release time.
    pub(crate) fn kill_note(&mut self, midi_note: u8, now: f64) {
        for voice in &mut self.voices {
            if voice.midi_note != midi_note || voice.finished {
                continue;
            }
            voice.force_release_timecents(KILL_RELEASE_TIMECENTS);
            voice.release(now);
        }
    }

    /// Applies a 7-bit CC change, handling the sustain pedal threshold,
    /// and recomputes every voice's modulated generators.
    pub(crate) fn controller_change(&mut self, cc: u8, value: u8, now: f64) {
        if usize::from(cc) >= NON_CC_INDEX_OFFSET {
            debug!(cc, "Discarding out-of-range controller index");
            return;
        }
        self.controllers[usize::from(cc)] = i16::from(value) << 7;

        if cc == CC_SUSTAIN {
            let engaged = value >= 64;
            if engaged && !self.hold_pedal {
                self.hold_pedal = true;
            } else if !engaged && self.hold_pedal {
                self.hold_pedal = false;
                self.release_sustained(now);
            }
        }

        self.recompute_all_modulators();
    }

    /// Writes a raw 14-bit value into a non-CC controller slot.
    pub(crate) fn set_non_cc_controller(&mut self, index: usize, value: i16) {
        if !(NON_CC_INDEX_OFFSET..CONTROLLER_TABLE_SIZE).contains(&index) {
            debug!(index, "Discarding out-of-range controller index");
            return;
        }
        self.controllers[index] = value;
        self.recompute_all_modulators();
    }

    /// Updates the poly pressure of voices sounding the given note.
    pub(crate) fn poly_pressure(&mut self, midi_note: u8, value: u8) {
        for voice in &mut self.voices {
            if voice.midi_note == midi_note {
                voice.poly_pressure = value;
                voice.recompute_modulators(&self.controllers);
            }
        }
    }

    /// Resets controllers to their defaults, preserving the channel
    /// transpose and any explicitly excluded CCs. The hold pedal and
    /// channel vibrato are reset too.
    pub(crate) fn reset_controllers(&mut self, excluded: &[u8], now: f64) {
        let defaults = default_controllers();
        for index in 0..CONTROLLER_TABLE_SIZE {
            if index == CHANNEL_TRANSPOSE {
                continue;
            }
            if excluded.iter().any(|&cc| usize::from(cc) == index) {
                continue;
            }
            self.controllers[index] = defaults[index];
        }

        if self.hold_pedal {
            self.hold_pedal = false;
            self.release_sustained(now);
        }
        self.vibrato = ChannelVibrato::default();
        self.recompute_all_modulators();
    }

    /// Stops the channel: forced drops everything now, otherwise voices
    /// not yet releasing are put into release.
    pub(crate) fn stop_all(&mut self, force: bool, now: f64) {
        if force {
            self.voices.clear();
            self.sustained_voices.clear();
            return;
        }
        for voice in &mut self.voices {
            if !voice.is_releasing() {
                voice.release(now);
            }
        }
        self.sustained_voices.clear();
    }

    /// Releases every voice held by the sustain pedal.
    fn release_sustained(&mut self, now: f64) {
        for voice in &mut self.voices {
            if self.sustained_voices.contains(&voice.id) {
                voice.release(now);
            }
        }
        self.sustained_voices.clear();
    }

    fn recompute_all_modulators(&mut self) {
        for voice in &mut self.voices {
            voice.recompute_modulators(&self.controllers);
        }
    }

    /// Drops finished voices and stale sustained ids.
    pub(crate) fn compact(&mut self) {
        self.voices.retain(|voice| !voice.finished);
        if !self.sustained_voices.is_empty() {
            self.sustained_voices
                .retain(|id| self.voices.iter().any(|voice| voice.id == *id));
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("voices", &self.voices.len())
            .field("sustained", &self.sustained_voices.len())
            .field("hold_pedal", &self.hold_pedal)
            .field("muted", &self.muted)
            .finish()
    }
}
