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

//! The top-level block renderer.
//!
//! One [`Processor::process`] call per audio callback: drain the inbound
//! event queue, run every live voice through the synthesis pipeline into
//! the output planes, drop finished voices, and report voice counts when
//! they change. Nothing on this path blocks or allocates once the first
//! block has been rendered.

use tracing::{debug, warn};

use crate::channel::{
    Channel, ChannelVibrato, ControllerTable, CHANNEL_PRESSURE, CHANNEL_TRANSPOSE, CHANNEL_TUNING,
    PITCH_WHEEL,
};
use crate::config::SynthConfig;
use crate::dsp::envelope::{EnvelopeTiming, ModulationEnvelopeParams, VolumeEnvelopeParams};
use crate::dsp::lfo::lfo_value;
use crate::dsp::oscillator::{self, PlaybackWindow};
use crate::dsp::pan;
use crate::dsp::AudioBlock;
use crate::event::{EventReceiver, OutboundEvent, OutboundSender, SynthEvent};
use crate::generator::GeneratorType;
use crate::store::SampleStore;
use crate::units::{abs_cents_to_hz, timecents_to_seconds};
use crate::voice::Voice;

/// Static attenuation beyond which a voice is inaudible and skipped, in
/// centibels (100 dB; the raw generator threshold of 2500 cB lands here
/// after the EMU scale).
const OVER_ATTENUATION_CB: f32 = 1000.0;

/// The realtime synthesis core.
pub struct Processor {
    channels: Vec<Channel>,
    store: SampleStore,
    events: EventReceiver,
    outbound: OutboundSender,
    output_rate: f64,
    voice_cap: usize,
    master_gain: f32,
    /// Mono scratch buffer shared by every voice render in a block.
    scratch: Vec<f32>,
    /// The audio clock: seconds rendered since construction.
    time: f64,
    last_total_voices: usize,
}

impl Processor {
    pub fn new(config: &SynthConfig, events: EventReceiver, outbound: OutboundSender) -> Self {
        Self {
            channels: (0..config.channel_count()).map(|_| Channel::new()).collect(),
            store: SampleStore::new(),
            events,
            outbound,
            output_rate: f64::from(config.sample_rate()),
            voice_cap: config.voice_cap(),
            master_gain: config.master_gain(),
            scratch: vec![0.0; config.block_frames()],
            time: 0.0,
            last_total_voices: 0,
        }
    }

    /// The audio clock in seconds.
    pub fn now(&self) -> f64 {
        self.time
    }

    /// Total live voices across all channels.
    pub fn total_voices(&self) -> usize {
        self.channels.iter().map(Channel::voice_count).sum()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Renders one block: drains pending events, then synthesizes every
    /// live voice into the (cleared) output planes. Always fills the
    /// block; on an empty synth that means silence.
    pub fn process(&mut self, block: &mut AudioBlock) {
        self.drain_events();

        let frames = block.frames();
        if frames > self.scratch.len() {
            self.scratch.resize(frames, 0.0);
        }
        block.clear();

        let Self {
            channels,
            store,
            scratch,
            time,
            output_rate,
            ..
        } = self;
        let scratch = &mut scratch[..frames];

        for channel in channels.iter_mut() {
            if channel.voices.is_empty() || channel.is_muted() {
                continue;
            }
            let vibrato = channel.vibrato;
            let controllers = channel.controllers;
            for voice in &mut channel.voices {
                render_voice(
                    voice,
                    &vibrato,
                    &controllers,
                    store,
                    scratch,
                    block,
                    *time,
                    *output_rate,
                );
            }
            channel.compact();
        }

        if self.master_gain != 1.0 {
            for plane in [&mut block.left, &mut block.right] {
                for sample in plane.iter_mut() {
                    *sample *= self.master_gain;
                }
            }
        }

        self.time += frames as f64 / self.output_rate;
        self.report_voice_counts();
    }

    /// Applies every queued event, in arrival order.
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                let now = self.time;
                let output_rate = self.output_rate;
                let Some(target) = self.channels.get_mut(channel) else {
                    return;
                };
                let dump_requests =
                    target.note_on(channel, note, velocity, now, output_rate, &mut self.store);
                for sample_id in dump_requests {
                    let _ = self
                        .outbound
                        .try_send(OutboundEvent::DumpRequest { sample_id });
                }

                let total = self.total_voices();
                if total > self.voice_cap {
                    self.steal_voices(total - self.voice_cap);
                }
            }
            SynthEvent::NoteOff { channel, note } => {
                let now = self.time;
                if let Some(target) = self.channels.get_mut(channel) {
                    target.note_off(note, now);
                }
            }
            SynthEvent::KillNote { channel, note } => {
                let now = self.time;
                if let Some(target) = self.channels.get_mut(channel) {
                    target.kill_note(note, now);
                }
            }
            SynthEvent::ControllerChange { channel, cc, value } => {
                let now = self.time;
                if let Some(target) = self.channels.get_mut(channel) {
                    target.controller_change(cc, value, now);
                }
            }
            SynthEvent::ControllerReset { channel, excluded } => {
                let now = self.time;
                if let Some(target) = self.channels.get_mut(channel) {
                    target.reset_controllers(&excluded, now);
                }
            }
            SynthEvent::PitchWheel { channel, value } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_non_cc_controller(PITCH_WHEEL, (value & 0x3fff) as i16);
                }
            }
            SynthEvent::ChannelPressure { channel, value } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_non_cc_controller(CHANNEL_PRESSURE, i16::from(value) << 7);
                }
            }
            SynthEvent::PolyPressure {
                channel,
                note,
                value,
            } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.poly_pressure(note, value);
                }
            }
            SynthEvent::SetChannelTuning { channel, cents } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_non_cc_controller(CHANNEL_TUNING, cents);
                }
            }
            SynthEvent::TransposeChannel { channel, cents } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_non_cc_controller(CHANNEL_TRANSPOSE, cents);
                }
            }
            SynthEvent::SetChannelVibrato { channel, vibrato } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_vibrato(vibrato);
                }
            }
            SynthEvent::SetPreset { channel, preset } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_preset(preset);
                }
            }
            SynthEvent::SampleDump { sample_id, frames } => {
                let frame_count = frames.len();
                self.store.dump(sample_id, frames);
                let now = self.time;
                let output_rate = self.output_rate;
                for channel in &mut self.channels {
                    for voice in &mut channel.voices {
                        if voice.sample_id() == sample_id {
                            voice.rehome(frame_count, now, output_rate);
                        }
                    }
                }
            }
            SynthEvent::ClearCache => {
                if self.total_voices() == 0 {
                    self.store.clear();
                } else {
                    warn!(
                        live_voices = self.total_voices(),
                        "Ignoring sample store clear while voices are live"
                    );
                }
            }
            SynthEvent::StopAll { force } => {
                let now = self.time;
                for channel in &mut self.channels {
                    channel.stop_all(force, now);
                }
                let _ = self.outbound.try_send(OutboundEvent::Stopped);
            }
            SynthEvent::KillVoices { count } => {
                self.steal_voices(count);
            }
            SynthEvent::MuteChannel { channel, muted } => {
                if let Some(target) = self.channels.get_mut(channel) {
                    target.set_muted(muted);
                }
            }
            SynthEvent::AddChannel => {
                self.channels.push(Channel::new());
                debug!(channels = self.channels.len(), "Channel added");
                let _ = self.outbound.try_send(OutboundEvent::ChannelAdded {
                    index: self.channels.len() - 1,
                });
            }
        }
    }

    /// Removes the `count` lowest-velocity voices across all channels,
    /// preserving the relative order of the survivors.
    fn steal_voices(&mut self, count: usize) {
        let mut candidates: Vec<(u8, usize, u64)> = self
            .channels
            .iter()
            .flat_map(|channel| &channel.voices)
            .map(|voice| (voice.velocity(), voice.channel_index, voice.id))
            .collect();
        let count = count.min(candidates.len());
        if count == 0 {
            return;
        }

        candidates.sort_by_key(|&(velocity, _, _)| velocity);
        for &(_, channel_index, id) in &candidates[..count] {
            if let Some(channel) = self.channels.get_mut(channel_index) {
                channel.voices.retain(|voice| voice.id != id);
            }
        }
        warn!(stolen = count, "Voice limit reached, stealing lowest-velocity voices");
    }

    fn report_voice_counts(&mut self) {
        let total = self.total_voices();
        if total == self.last_total_voices {
            return;
        }
        self.last_total_voices = total;
        let counts: Vec<u16> = self
            .channels
            .iter()
            .map(|channel| channel.voice_count() as u16)
            .collect();
        let _ = self.outbound.try_send(OutboundEvent::VoiceCounts(counts));
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("channels", &self.channels.len())
            .field("voices", &self.total_voices())
            .field("time", &self.time)
            .field("store", &self.store)
            .finish()
    }
}

/// Runs one voice through the synthesis pipeline for one block:
/// oscillator into the scratch buffer, filter and volume envelope in
/// place, then pan into the output planes.
#[allow(clippy::too_many_arguments)]
fn render_voice(
    voice: &mut Voice,
    vibrato: &ChannelVibrato,
    controllers: &ControllerTable,
    store: &SampleStore,
    scratch: &mut [f32],
    block: &mut AudioBlock,
    block_start: f64,
    output_rate: f64,
) {
    voice.is_in_release = block_start >= voice.release_start_time;

    // Inaudible voices render nothing; once releasing they can go away.
    let attenuation_cb = f32::from(voice.generator(GeneratorType::InitialAttenuation).max(0));
    if attenuation_cb > OVER_ATTENUATION_CB {
        if voice.is_in_release {
            voice.finished = true;
        }
        return;
    }

    // Undumped sample: stay silent until the PCM arrives.
    let Some(data) = store.get(voice.sample_id()) else {
        return;
    };

    // The modulated vector is copied out so the closure does not hold a
    // borrow of the voice across the mutable envelope and filter calls.
    let modulated = voice.modulated;
    let generator = |g: GeneratorType| modulated[g as usize];

    // Modulation envelope, evaluated once per block.
    let mod_env_timing = EnvelopeTiming::from_timecents(
        generator(GeneratorType::DelayModEnv),
        generator(GeneratorType::AttackModEnv),
        generator(GeneratorType::HoldModEnv),
        generator(GeneratorType::DecayModEnv),
        f64::from(1000 - generator(GeneratorType::SustainModEnv).clamp(0, 1000)) / 1000.0,
        generator(GeneratorType::ReleaseModEnv),
        generator(GeneratorType::KeyNumToModEnvHold),
        generator(GeneratorType::KeyNumToModEnvDecay),
        voice.target_key,
    );
    let mod_env = f64::from(voice.modulation_envelope.value(&ModulationEnvelopeParams {
        timing: mod_env_timing,
        start_time: voice.start_time,
        release_start_time: voice.release_start_time,
        now: block_start,
    }));

    // LFOs, also per block.
    let mod_lfo = f64::from(lfo_value(
        voice.start_time + timecents_to_seconds(i32::from(generator(GeneratorType::DelayModLfo))),
        abs_cents_to_hz(f64::from(generator(GeneratorType::FreqModLfo))),
        block_start,
    ));
    let vib_lfo = f64::from(lfo_value(
        voice.start_time + timecents_to_seconds(i32::from(generator(GeneratorType::DelayVibLfo))),
        abs_cents_to_hz(f64::from(generator(GeneratorType::FreqVibLfo))),
        block_start,
    ));
    let channel_vibrato_cents = if vibrato.depth != 0.0 && vibrato.rate > 0.0 {
        vibrato.depth
            * f64::from(lfo_value(
                voice.start_time + vibrato.delay,
                vibrato.rate,
                block_start,
            ))
    } else {
        0.0
    };

    // Total tuning in cents, cached as an integer.
    let key_distance = i32::from(voice.target_key) - i32::from(voice.root_key);
    let cents = f64::from(generator(GeneratorType::FineTune))
        + 100.0 * f64::from(generator(GeneratorType::CoarseTune))
        + f64::from(key_distance * i32::from(generator(GeneratorType::ScaleTuning)))
        + f64::from(controllers[CHANNEL_TUNING])
        + f64::from(controllers[CHANNEL_TRANSPOSE])
        + vib_lfo * f64::from(generator(GeneratorType::VibLfoToPitch))
        + mod_lfo * f64::from(generator(GeneratorType::ModLfoToPitch))
        + mod_env * f64::from(generator(GeneratorType::ModEnvToPitch))
        + channel_vibrato_cents;
    let cents = cents as i32;
    if cents != voice.current_tuning_cents {
        voice.current_tuning_cents = cents;
        voice.current_tuning = (f64::from(cents) / 1200.0).exp2();
    }

    let window = PlaybackWindow {
        step: voice.playback_step * voice.current_tuning,
        loop_mode: voice.loop_mode,
        loop_start: voice.loop_start,
        loop_end: voice.loop_end,
        end: voice.end,
        in_release: voice.is_in_release,
    };
    let oscillator_finished = oscillator::fill(data, scratch, &mut voice.cursor, &window);

    let cutoff_cents = f64::from(generator(GeneratorType::InitialFilterFc))
        + mod_env * f64::from(generator(GeneratorType::ModEnvToFilterFc))
        + mod_lfo * f64::from(generator(GeneratorType::ModLfoToFilterFc));
    voice.filter.process(
        scratch,
        cutoff_cents,
        generator(GeneratorType::InitialFilterQ),
        output_rate,
    );

    let volume_timing = EnvelopeTiming::from_timecents(
        generator(GeneratorType::DelayVolEnv),
        generator(GeneratorType::AttackVolEnv),
        generator(GeneratorType::HoldVolEnv),
        generator(GeneratorType::DecayVolEnv),
        f64::from(generator(GeneratorType::SustainVolEnv).clamp(0, 1440)) / 10.0,
        generator(GeneratorType::ReleaseVolEnv),
        generator(GeneratorType::KeyNumToVolEnvHold),
        generator(GeneratorType::KeyNumToVolEnvDecay),
        voice.target_key,
    );
    let envelope_finished = voice.volume_envelope.apply(
        scratch,
        &VolumeEnvelopeParams {
            timing: volume_timing,
            start_time: voice.start_time,
            release_start_time: voice.release_start_time,
            block_start,
            frame_period: 1.0 / output_rate,
            attenuation_cb,
            mod_lfo_cb: (mod_lfo * f64::from(generator(GeneratorType::ModLfoToVolume))) as f32,
        },
    );

    pan::mix_into(
        scratch,
        generator(GeneratorType::Pan),
        generator(GeneratorType::ReverbEffectsSend),
        generator(GeneratorType::ChorusEffectsSend),
        block,
    );

    if oscillator_finished || envelope_finished {
        voice.finished = true;
    }
}
