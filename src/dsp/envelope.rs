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

//! The DAHDSR volume envelope and the five-stage modulation envelope.
//!
//! Both are pure functions of the audio clock against the voice's start
//! and release times; the only retained state is the stage marker, the
//! last attenuation, and the values captured at release onset.

use crate::units::{centibels_to_gain, timecents_to_seconds};

/// Attenuation treated as silence, in dB. Voices start here and release
/// ramps back to it.
pub const SILENCE_DB: f32 = 100.0;

/// Envelope stages in order. RELEASE is reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EnvelopeStage {
    #[default]
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

/// Stage durations in seconds, derived from the modulated generators once
/// per block. Key-number scaling of hold and decay is already applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeTiming {
    pub delay: f64,
    pub attack: f64,
    pub hold: f64,
    pub decay: f64,
    /// Sustain attenuation in dB for the volume envelope, or the sustain
    /// level in [0, 1] for the modulation envelope.
    pub sustain: f64,
    pub release: f64,
}

impl EnvelopeTiming {
    /// Builds timing from raw timecent generators. `key_to_hold` and
    /// `key_to_decay` lengthen or shorten those stages by the keyed
    /// distance from middle C, in timecents per key.
    pub fn from_timecents(
        delay: i16,
        attack: i16,
        hold: i16,
        decay: i16,
        sustain: f64,
        release: i16,
        key_to_hold: i16,
        key_to_decay: i16,
        key: u8,
    ) -> Self {
        let keyed = |timecents: i16, per_key: i16| -> f64 {
            let scaled = i32::from(timecents) + i32::from(per_key) * (60 - i32::from(key));
            timecents_to_seconds(scaled)
        };
        Self {
            delay: timecents_to_seconds(i32::from(delay)),
            attack: timecents_to_seconds(i32::from(attack)),
            hold: keyed(hold, key_to_hold),
            decay: keyed(decay, key_to_decay),
            sustain,
            release: timecents_to_seconds(i32::from(release)),
        }
    }
}

/// Inputs for one volume-envelope pass over a block.
pub struct VolumeEnvelopeParams {
    pub timing: EnvelopeTiming,
    /// When the voice started, on the audio clock.
    pub start_time: f64,
    /// When release begins; +inf while the note is held.
    pub release_start_time: f64,
    /// Audio-clock time of the block's first frame.
    pub block_start: f64,
    /// Seconds per output frame.
    pub frame_period: f64,
    /// Static attenuation from the modulated initial-attenuation slot, in
    /// centibels, non-negative.
    pub attenuation_cb: f32,
    /// Mod-LFO tremolo contribution for this block, in centibels.
    pub mod_lfo_cb: f32,
}

/// The volume envelope: attenuation in dB walked through DELAY, ATTACK,
/// HOLD, DECAY, SUSTAIN and RELEASE.
#[derive(Debug, Clone)]
pub struct VolumeEnvelope {
    stage: EnvelopeStage,
    current_attenuation_db: f32,
    release_start_db: f32,
}

impl Default for VolumeEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeEnvelope {
    pub fn new() -> Self {
        Self {
            stage: EnvelopeStage::Delay,
            current_attenuation_db: SILENCE_DB,
            release_start_db: SILENCE_DB,
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// The most recently produced attenuation, in dB.
    pub fn current_attenuation_db(&self) -> f32 {
        self.current_attenuation_db
    }

    /// Envelope attenuation in dB at elapsed time `t` since voice start,
    /// ignoring release. Also reports the stage that time falls in.
    fn held_attenuation_at(&self, timing: &EnvelopeTiming, t: f64) -> (f32, EnvelopeStage) {
        if t < timing.delay {
            return (SILENCE_DB, EnvelopeStage::Delay);
        }
        let t = t - timing.delay;
        if t < timing.attack {
            // Linear-in-gain attack: gain ramps 0 to 1, expressed in dB.
            let db = -20.0 * (t / timing.attack).log10();
            return (db.min(f64::from(SILENCE_DB)) as f32, EnvelopeStage::Attack);
        }
        let t = t - timing.attack;
        if t < timing.hold {
            return (0.0, EnvelopeStage::Hold);
        }
        let t = t - timing.hold;
        if t < timing.decay {
            let db = timing.sustain * (t / timing.decay);
            return (db as f32, EnvelopeStage::Decay);
        }
        (timing.sustain as f32, EnvelopeStage::Sustain)
    }

    /// Scales `buf` by the per-frame envelope gain.
    ///
    /// Returns true once the release ramp has completed, i.e. the voice is
    /// finished.
    pub fn apply(&mut self, buf: &mut [f32], params: &VolumeEnvelopeParams) -> bool {
        let mut finished = false;

        for (i, frame) in buf.iter_mut().enumerate() {
            let now = params.block_start + i as f64 * params.frame_period;

            let db = if now >= params.release_start_time {
                if self.stage != EnvelopeStage::Release {
                    self.release_start_db = self.current_attenuation_db;
                    self.stage = EnvelopeStage::Release;
                }
                let t = now - params.release_start_time;
                if t >= params.timing.release {
                    finished = true;
                    SILENCE_DB
                } else {
                    let fraction = (t / params.timing.release) as f32;
                    self.release_start_db + (SILENCE_DB - self.release_start_db) * fraction
                }
            } else {
                let (db, stage) = self.held_attenuation_at(&params.timing, now - params.start_time);
                if stage > self.stage {
                    self.stage = stage;
                }
                db
            };

            self.current_attenuation_db = db;
            let centibels = db * 10.0 + params.attenuation_cb + params.mod_lfo_cb;
            *frame *= centibels_to_gain(centibels);
        }

        finished
    }
}

/// Inputs for one modulation-envelope evaluation.
pub struct ModulationEnvelopeParams {
    pub timing: EnvelopeTiming,
    pub start_time: f64,
    pub release_start_time: f64,
    pub now: f64,
}

/// The modulation envelope: a unit-ranged value with a linear attack and
/// an exponential decay, evaluated once per block and consumed by the
/// pitch and filter-cutoff routes.
#[derive(Debug, Clone)]
pub struct ModulationEnvelope {
    current_value: f32,
    release_start_value: f32,
    in_release: bool,
}

impl Default for ModulationEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl ModulationEnvelope {
    pub fn new() -> Self {
        Self {
            current_value: 0.0,
            release_start_value: 0.0,
            in_release: false,
        }
    }

    /// The value most recently produced by [`ModulationEnvelope::value`].
    pub fn current_value(&self) -> f32 {
        self.current_value
    }

    /// The envelope value captured when release began.
    pub fn release_start_value(&self) -> f32 {
        self.release_start_value
    }

    /// Evaluates the envelope at `params.now`.
    pub fn value(&mut self, params: &ModulationEnvelopeParams) -> f32 {
        let value = if params.now >= params.release_start_time {
            if !self.in_release {
                self.release_start_value = self.current_value;
                self.in_release = true;
            }
            let t = params.now - params.release_start_time;
            if params.timing.release <= 0.0 || t >= params.timing.release {
                0.0
            } else {
                self.release_start_value * (1.0 - (t / params.timing.release) as f32)
            }
        } else {
            self.held_value_at(&params.timing, params.now - params.start_time)
        };

        self.current_value = value;
        value
    }

    fn held_value_at(&self, timing: &EnvelopeTiming, t: f64) -> f32 {
        if t < timing.delay {
            return 0.0;
        }
        let t = t - timing.delay;
        if t < timing.attack {
            return (t / timing.attack) as f32;
        }
        let t = t - timing.attack;
        if t < timing.hold {
            return 1.0;
        }
        let t = t - timing.hold;
        let sustain = timing.sustain as f32;
        if timing.decay <= 0.0 {
            return sustain;
        }
        // Exponential approach toward the sustain level; effectively
        // settled by the end of the decay duration.
        sustain + (1.0 - sustain) * (-5.0 * t / timing.decay).exp() as f32
    }
}
