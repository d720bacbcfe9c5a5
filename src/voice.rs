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

//! Voices and the voice builder.
//!
//! A voice is the mutable per-note synthesis entity: one sample slice, its
//! generator layers, modulator list, envelopes, filter and tuning state.
//! The builder turns a preset lookup into voices; a per-channel cache
//! short-circuits rebuilds for repeated (note, velocity) pairs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::channel::ControllerTable;
use crate::dsp::envelope::{ModulationEnvelope, VolumeEnvelope};
use crate::dsp::filter::VoiceFilter;
use crate::generator::{
    apply_emu_attenuation, combine, GeneratorType, GeneratorVector,
};
use crate::modulator::{compute_modulated, merge_modulators, Modulator, Snapshot};
use crate::soundfont::{Preset, Sample};
use crate::store::SampleStore;

/// Shortest audible note: release times earlier than this past the voice
/// start are deferred.
pub const MIN_NOTE_LENGTH_SECS: f64 = 0.07;

/// Coarse address offsets step in 32768-frame units.
const COARSE_OFFSET_FRAMES: i64 = 32768;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh unique voice id. Cache hits get a new id per clone.
pub(crate) fn next_voice_id() -> u64 {
    NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed)
}

/// How the oscillator treats the sample's loop points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play through once and finish at the end of the slice.
    #[default]
    None,
    /// Loop between the loop points for the life of the voice.
    Continuous,
    /// Loop while held, then play out past the loop on release.
    UntilRelease,
}

impl LoopMode {
    /// Decodes the low bits of the sampleModes generator.
    fn from_sample_modes(modes: i16) -> Self {
        match modes & 3 {
            1 => LoopMode::Continuous,
            3 => LoopMode::UntilRelease,
            _ => LoopMode::None,
        }
    }
}

/// One sounding note on one channel.
#[derive(Debug, Clone)]
pub struct Voice {
    // Identity.
    pub(crate) id: u64,
    pub(crate) channel_index: usize,
    pub(crate) midi_note: u8,
    pub(crate) velocity: u8,
    pub(crate) target_key: u8,
    pub(crate) start_time: f64,

    // Sample slice.
    pub(crate) sample: Arc<Sample>,
    pub(crate) cursor: f64,
    pub(crate) playback_step: f64,
    pub(crate) root_key: u8,
    pub(crate) loop_start: f64,
    pub(crate) loop_end: f64,
    pub(crate) end: f64,
    pub(crate) loop_mode: LoopMode,

    // Generator layers and the modulator routes into them.
    pub(crate) generators: GeneratorVector,
    pub(crate) modulated: GeneratorVector,
    pub(crate) modulators: Vec<Modulator>,

    // Envelope and filter state.
    pub(crate) volume_envelope: VolumeEnvelope,
    pub(crate) modulation_envelope: ModulationEnvelope,
    pub(crate) filter: VoiceFilter,

    // Tuning cache: last integer cents and its computed ratio.
    pub(crate) current_tuning_cents: i32,
    pub(crate) current_tuning: f64,

    pub(crate) poly_pressure: u8,

    // Lifecycle flags.
    pub(crate) release_start_time: f64,
    pub(crate) is_in_release: bool,
    pub(crate) finished: bool,
}

impl Voice {
    /// The modulated value of a generator slot.
    pub(crate) fn generator(&self, generator: GeneratorType) -> i16 {
        self.modulated[generator as usize]
    }

    pub fn sample_id(&self) -> u32 {
        self.sample.id()
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn midi_note(&self) -> u8 {
        self.midi_note
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_releasing(&self) -> bool {
        self.release_start_time.is_finite()
    }

    pub(crate) fn exclusive_class(&self) -> i16 {
        self.generator(GeneratorType::ExclusiveClass)
    }

    /// Rebuilds the modulated generator vector against the channel's
    /// controller table. Called at birth and on every controller change.
    pub(crate) fn recompute_modulators(&mut self, controllers: &ControllerTable) {
        let snapshot = Snapshot {
            controllers,
            velocity: self.velocity,
            key: self.midi_note,
            poly_pressure: self.poly_pressure,
        };
        self.modulated = compute_modulated(&self.generators, &self.modulators, &snapshot);
    }

    /// Schedules the release. The start never lands before the minimum
    /// note length, and releasing twice keeps the earlier schedule.
    pub(crate) fn release(&mut self, now: f64) {
        if self.release_start_time.is_finite() {
            return;
        }
        self.release_start_time = now.max(self.start_time + MIN_NOTE_LENGTH_SECS);
    }

    /// Overwrites the release time generator on both layers, used by the
    /// exclusive-class cutoff and killNote paths before releasing.
    pub(crate) fn force_release_timecents(&mut self, timecents: i16) {
        self.generators[GeneratorType::ReleaseVolEnv as usize] = timecents;
        self.modulated[GeneratorType::ReleaseVolEnv as usize] = timecents;
    }

    /// Re-derives the cursor and end position after the sample's PCM was
    /// dumped, as if the voice had been playing since its start time.
    pub(crate) fn rehome(&mut self, frame_count: usize, now: f64, output_rate: f64) {
        let end_offset = i64::from(self.generators[GeneratorType::EndAddrsOffset as usize])
            + COARSE_OFFSET_FRAMES
                * i64::from(self.generators[GeneratorType::EndAddrsCoarseOffset as usize]);
        self.end = ((frame_count as i64 - 1 + end_offset).max(0)) as f64;

        self.cursor = self.playback_step * output_rate * (now - self.start_time).max(0.0);

        if self.loop_mode == LoopMode::None {
            if self.cursor >= self.end {
                self.finished = true;
            }
        } else if self.cursor > self.loop_end {
            // The -1 matches the established rehoming behavior for looped
            // samples; see DESIGN.md.
            let loop_length = self.loop_end - self.loop_start;
            self.cursor = self.cursor % loop_length + self.loop_start - 1.0;
        }
    }
}

/// Everything the builder needs from the caller's context.
pub(crate) struct VoiceContext<'a> {
    pub channel_index: usize,
    pub controllers: &'a ControllerTable,
    pub now: f64,
    pub output_rate: f64,
}

/// The voices built for one note-on, plus whether the group may be cached
/// (false while any referenced sample is still undecoded) and the ids that
/// need a dump.
pub(crate) struct BuiltVoices {
    pub voices: Vec<Voice>,
    pub cacheable: bool,
    pub dump_requests: Vec<u32>,
}

/// Builds the voices for (preset, note, velocity).
///
/// Samples with synchronously-available PCM are published to the store on
/// first use; compressed samples without PCM produce a dump request and a
/// voice that stays silent until the dump arrives.
pub(crate) fn build_voices(
    preset: &Preset,
    midi_note: u8,
    velocity: u8,
    context: &VoiceContext<'_>,
    store: &mut SampleStore,
) -> BuiltVoices {
    let mut voices = Vec::new();
    let mut dump_requests = Vec::new();
    let mut cacheable = true;

    for region in preset.regions_for(midi_note, velocity) {
        let sample = region.sample();
        if !store.contains(sample.id()) {
            match sample.audio_data() {
                Some(data) => store.dump(sample.id(), Arc::clone(data)),
                None => {
                    debug!(sample_id = sample.id(), "Sample PCM pending, requesting dump");
                    dump_requests.push(sample.id());
                }
            }
        }
        let data_frames = store.get(sample.id()).map_or(0, |data| data.len());
        if data_frames == 0 {
            cacheable = false;
        }

        let mut generators = combine(region.preset_generators(), region.instrument_generators());
        apply_emu_attenuation(&mut generators);
        let generator = |g: GeneratorType| generators[g as usize];

        let root_key = match generator(GeneratorType::OverridingRootKey) {
            key if key >= 0 => key as u8,
            _ => sample.root_pitch(),
        };
        let target_key = match generator(GeneratorType::KeyNum) {
            key if key >= 0 => key as u8,
            _ => midi_note,
        };
        let voice_velocity = match generator(GeneratorType::Velocity) {
            vel if vel >= 0 => vel as u8,
            _ => velocity,
        };

        let loop_start = (i64::from(sample.loop_start())
            + i64::from(generator(GeneratorType::StartloopAddrsOffset))
            + COARSE_OFFSET_FRAMES * i64::from(generator(GeneratorType::StartloopAddrsCoarseOffset)))
        .max(0) as f64;
        let loop_end = (i64::from(sample.loop_end())
            + i64::from(generator(GeneratorType::EndloopAddrsOffset))
            + COARSE_OFFSET_FRAMES * i64::from(generator(GeneratorType::EndloopAddrsCoarseOffset)))
        .max(0) as f64;

        let loop_mode = if loop_end - loop_start < 1.0 {
            LoopMode::None
        } else {
            LoopMode::from_sample_modes(generator(GeneratorType::SampleModes))
        };

        let playback_step = f64::from(sample.sample_rate()) / context.output_rate
            * (f64::from(sample.pitch_correction()) / 1200.0).exp2();

        let cursor = (i64::from(generator(GeneratorType::StartAddrsOffset))
            + COARSE_OFFSET_FRAMES * i64::from(generator(GeneratorType::StartAddrsCoarseOffset)))
        .max(0) as f64;
        let end = (data_frames as i64 - 1
            + i64::from(generator(GeneratorType::EndAddrsOffset))
            + COARSE_OFFSET_FRAMES * i64::from(generator(GeneratorType::EndAddrsCoarseOffset)))
        .max(0) as f64;

        let mut voice = Voice {
            id: next_voice_id(),
            channel_index: context.channel_index,
            midi_note,
            velocity: voice_velocity,
            target_key,
            start_time: context.now,
            sample: Arc::clone(sample),
            cursor,
            playback_step,
            root_key,
            loop_start,
            loop_end,
            end,
            loop_mode,
            generators,
            modulated: generators,
            modulators: merge_modulators(region.modulators()),
            volume_envelope: VolumeEnvelope::new(),
            modulation_envelope: ModulationEnvelope::new(),
            filter: VoiceFilter::new(),
            current_tuning_cents: 0,
            current_tuning: 1.0,
            poly_pressure: 0,
            release_start_time: f64::INFINITY,
            is_in_release: false,
            finished: false,
        };
        voice.recompute_modulators(context.controllers);
        voices.push(voice);
    }

    BuiltVoices {
        voices,
        cacheable,
        dump_requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::default_controllers;
    use crate::generator::{default_generators, GENERATOR_COUNT};
    use crate::soundfont::PresetRegion;

    fn sample_with_data(id: u32, frames: usize) -> Arc<Sample> {
        Arc::new(Sample::new(
            id,
            44100,
            60,
            0,
            100,
            200,
            false,
            Some(Arc::from(vec![0.1f32; frames])),
        ))
    }

    fn compressed_sample(id: u32) -> Arc<Sample> {
        Arc::new(Sample::new(id, 44100, 60, 0, 100, 200, true, None))
    }

    fn preset_with(sample: Arc<Sample>, instrument: GeneratorVector) -> Preset {
        let region = PresetRegion::new(
            (0, 127),
            (0, 127),
            sample,
            [0; GENERATOR_COUNT],
            instrument,
            Vec::new(),
        );
        Preset::new("test", vec![region])
    }

    fn context(controllers: &ControllerTable) -> VoiceContext<'_> {
        VoiceContext {
            channel_index: 0,
            controllers,
            now: 0.0,
            output_rate: 48000.0,
        }
    }

    #[test]
    fn test_build_basic_voice() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let mut instrument = default_generators();
        instrument[GeneratorType::SampleModes as usize] = 1;

        let preset = preset_with(sample_with_data(1, 400), instrument);
        let built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);

        assert_eq!(built.voices.len(), 1);
        assert!(built.cacheable);
        assert!(built.dump_requests.is_empty());

        let voice = &built.voices[0];
        assert_eq!(voice.root_key, 60);
        assert_eq!(voice.target_key, 60);
        assert_eq!(voice.velocity, 100);
        assert_eq!(voice.loop_mode, LoopMode::Continuous);
        assert_eq!(voice.loop_start, 100.0);
        assert_eq!(voice.loop_end, 200.0);
        assert_eq!(voice.end, 399.0);
        assert!((voice.playback_step - 44100.0 / 48000.0).abs() < 1e-12);
        assert_eq!(voice.release_start_time, f64::INFINITY);
        // Building published the synchronous PCM.
        assert!(store.contains(1));
    }

    #[test]
    fn test_generator_overrides() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let mut instrument = default_generators();
        instrument[GeneratorType::OverridingRootKey as usize] = 48;
        instrument[GeneratorType::KeyNum as usize] = 52;
        instrument[GeneratorType::Velocity as usize] = 99;

        let preset = preset_with(sample_with_data(2, 400), instrument);
        let built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);

        let voice = &built.voices[0];
        assert_eq!(voice.root_key, 48);
        assert_eq!(voice.target_key, 52);
        assert_eq!(voice.velocity, 99);
    }

    #[test]
    fn test_degenerate_loop_forces_one_shot() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let mut instrument = default_generators();
        instrument[GeneratorType::SampleModes as usize] = 1;
        // Collapse the loop onto a single point.
        instrument[GeneratorType::EndloopAddrsOffset as usize] = -100;

        let preset = preset_with(sample_with_data(3, 400), instrument);
        let built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);

        assert_eq!(built.voices[0].loop_mode, LoopMode::None);
    }

    #[test]
    fn test_pending_sample_requests_dump() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let preset = preset_with(compressed_sample(9), default_generators());
        let built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);

        assert_eq!(built.voices.len(), 1);
        assert!(!built.cacheable);
        assert_eq!(built.dump_requests, vec![9]);
        assert_eq!(built.voices[0].end, 0.0);
    }

    #[test]
    fn test_release_is_idempotent_and_respects_min_length() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let preset = preset_with(sample_with_data(4, 400), default_generators());
        let mut built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);
        let voice = &mut built.voices[0];

        voice.release(0.01);
        assert_eq!(voice.release_start_time, MIN_NOTE_LENGTH_SECS);

        // A second release does not move the schedule.
        voice.release(5.0);
        assert_eq!(voice.release_start_time, MIN_NOTE_LENGTH_SECS);
    }

    #[test]
    fn test_rehome_one_shot_past_end_finishes() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let preset = preset_with(compressed_sample(5), default_generators());
        let mut built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);
        let voice = &mut built.voices[0];

        // Dump arrives long after the short sample would have ended.
        voice.rehome(100, 10.0, 48000.0);
        assert!(voice.finished);
        assert_eq!(voice.end, 99.0);
    }

    #[test]
    fn test_rehome_looping_wraps_cursor() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let mut instrument = default_generators();
        instrument[GeneratorType::SampleModes as usize] = 1;
        let preset = preset_with(compressed_sample(6), instrument);
        let mut built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);
        let voice = &mut built.voices[0];

        let now = 0.05;
        voice.rehome(4000, now, 48000.0);
        assert!(!voice.finished);

        let raw = voice.playback_step * 48000.0 * now;
        let expected = raw % (voice.loop_end - voice.loop_start) + voice.loop_start - 1.0;
        assert!((voice.cursor - expected).abs() < 1e-9);
        assert!(voice.cursor >= 0.0);
        assert!(voice.cursor <= voice.end);
    }

    #[test]
    fn test_rehome_within_sample_keeps_cursor() {
        let controllers = default_controllers();
        let mut store = SampleStore::new();
        let preset = preset_with(compressed_sample(7), default_generators());
        let mut built = build_voices(&preset, 60, 100, &context(&controllers), &mut store);
        let voice = &mut built.voices[0];

        // 0.05 s in, with plenty of sample left.
        voice.rehome(40000, 0.05, 48000.0);
        assert!(!voice.finished);
        let expected = voice.playback_step * 48000.0 * 0.05;
        assert!((voice.cursor - expected).abs() < 1e-9);
    }
}
