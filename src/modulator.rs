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

//! SoundFont modulator evaluation.
//!
//! A modulator routes a controller (or a note-on property) through a curve
//! transform into an additive offset on one generator slot. Rebuilding the
//! modulated generator vector happens on voice birth and on every controller
//! change, never per frame.

use crate::channel::{
    ControllerTable, CC_BRIGHTNESS, CC_CHORUS_DEPTH, CC_EXPRESSION, CC_MAIN_VOLUME, CC_MODULATION,
    CC_PAN, CC_RELEASE_TIME, CC_REVERB_DEPTH, CHANNEL_PRESSURE, PITCH_WHEEL, PITCH_WHEEL_RANGE,
};
use crate::generator::{GeneratorType, GeneratorVector, GENERATOR_COUNT};

/// Maximum value of a 14-bit controller.
const CONTROLLER_MAX: f64 = 16383.0;

/// Non-CC source enumeration from the SoundFont 2.04 specification.
mod source_index {
    pub const NO_CONTROLLER: u8 = 0;
    pub const NOTE_ON_VELOCITY: u8 = 2;
    pub const NOTE_ON_KEY: u8 = 3;
    pub const POLY_PRESSURE: u8 = 10;
    pub const CHANNEL_PRESSURE: u8 = 13;
    pub const PITCH_WHEEL: u8 = 14;
    pub const PITCH_WHEEL_RANGE: u8 = 16;
}

/// The continuity curve a source value is passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurveType {
    #[default]
    Linear,
    Concave,
    Convex,
    Switch,
}

/// One modulator source: which controller it reads and how the raw value
/// is shaped before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModulatorSource {
    /// Controller number when `is_cc`, otherwise a `source_index` value.
    pub index: u8,
    /// Reads the MIDI CC table instead of the non-CC enumeration.
    pub is_cc: bool,
    /// Maps into [-1, 1] instead of [0, 1].
    pub bipolar: bool,
    /// Reverses the direction of the mapping.
    pub negative: bool,
    /// The curve shape.
    pub curve: CurveType,
}

impl ModulatorSource {
    /// A source that always yields 1.0 (SoundFont's "no controller").
    pub fn no_controller() -> Self {
        Self::default()
    }

    /// A source reading a MIDI CC slot.
    pub fn cc(index: u8, curve: CurveType, bipolar: bool, negative: bool) -> Self {
        Self {
            index,
            is_cc: true,
            bipolar,
            negative,
            curve,
        }
    }

    /// A source reading the non-CC enumeration (velocity, key, pressure,
    /// pitch wheel).
    pub fn non_cc(index: u8, curve: CurveType, bipolar: bool, negative: bool) -> Self {
        Self {
            index,
            is_cc: false,
            bipolar,
            negative,
            curve,
        }
    }

    /// Raw 14-bit value of this source under the given snapshot.
    /// Unknown sources yield 0.
    fn raw_value(&self, snapshot: &Snapshot) -> f64 {
        if self.is_cc {
            if usize::from(self.index) >= 128 {
                return 0.0;
            }
            return f64::from(snapshot.controllers[usize::from(self.index)]);
        }
        match self.index {
            source_index::NO_CONTROLLER => CONTROLLER_MAX,
            source_index::NOTE_ON_VELOCITY => f64::from(u16::from(snapshot.velocity) << 7),
            source_index::NOTE_ON_KEY => f64::from(u16::from(snapshot.key) << 7),
            source_index::POLY_PRESSURE => f64::from(u16::from(snapshot.poly_pressure) << 7),
            source_index::CHANNEL_PRESSURE => f64::from(snapshot.controllers[CHANNEL_PRESSURE]),
            source_index::PITCH_WHEEL => f64::from(snapshot.controllers[PITCH_WHEEL]),
            source_index::PITCH_WHEEL_RANGE => f64::from(snapshot.controllers[PITCH_WHEEL_RANGE]),
            _ => 0.0,
        }
    }

    /// Normalized, curved value of this source: [0, 1] unipolar or [-1, 1]
    /// bipolar.
    fn value(&self, snapshot: &Snapshot) -> f64 {
        let mut x = (self.raw_value(snapshot) / CONTROLLER_MAX).clamp(0.0, 1.0);
        if self.negative {
            x = 1.0 - x;
        }
        if self.bipolar {
            let v = 2.0 * x - 1.0;
            v.signum() * apply_curve(self.curve, v.abs())
        } else {
            apply_curve(self.curve, x)
        }
    }
}

fn apply_curve(curve: CurveType, x: f64) -> f64 {
    match curve {
        CurveType::Linear => x,
        CurveType::Switch => {
            if x >= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        CurveType::Concave => concave(x),
        CurveType::Convex => 1.0 - concave(1.0 - x),
    }
}

/// The SoundFont concave curve: slow start, steep finish, expressed in
/// the dB domain over the squared complement.
fn concave(x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    (-(20.0 / 96.0) * (1.0 - x).powi(2).log10()).clamp(0.0, 1.0)
}

/// Controller snapshot a modulator is evaluated against.
pub struct Snapshot<'a> {
    pub controllers: &'a ControllerTable,
    pub velocity: u8,
    pub key: u8,
    pub poly_pressure: u8,
}

/// A modulator record as supplied by the parser (or the default set).
#[derive(Debug, Clone, PartialEq)]
pub struct Modulator {
    pub source: ModulatorSource,
    pub amount_source: ModulatorSource,
    pub destination: GeneratorType,
    pub amount: i16,
}

impl Modulator {
    pub fn new(
        source: ModulatorSource,
        amount_source: ModulatorSource,
        destination: GeneratorType,
        amount: i16,
    ) -> Self {
        Self {
            source,
            amount_source,
            destination,
            amount,
        }
    }

    /// Two modulators with the same identity target the same route; a
    /// preset-supplied one overrides the default entry.
    pub fn same_identity(&self, other: &Modulator) -> bool {
        self.source == other.source
            && self.amount_source == other.amount_source
            && self.destination == other.destination
    }

    /// This modulator's additive contribution to its destination slot.
    pub fn contribution(&self, snapshot: &Snapshot) -> f64 {
        self.source.value(snapshot) * self.amount_source.value(snapshot) * f64::from(self.amount)
    }
}

/// Rebuilds a modulated generator vector from the raw generators and the
/// voice's modulator list under the given controller snapshot.
///
/// Contributions accumulate in i32 and saturate into the i16 slots; range
/// clamping beyond that is left to the consumers (filter, panner, envelope)
/// since modulator offsets legitimately exceed generator value ranges
/// (e.g. pitch wheel into fineTune).
pub fn compute_modulated(
    generators: &GeneratorVector,
    modulators: &[Modulator],
    snapshot: &Snapshot,
) -> GeneratorVector {
    let mut accumulated = [0i32; GENERATOR_COUNT];
    for (accumulator, &generator) in accumulated.iter_mut().zip(generators.iter()) {
        *accumulator = i32::from(generator);
    }

    for modulator in modulators {
        let destination = modulator.destination as usize;
        accumulated[destination] += modulator.contribution(snapshot) as i32;
    }

    let mut modulated = [0i16; GENERATOR_COUNT];
    for (slot, &accumulator) in modulated.iter_mut().zip(accumulated.iter()) {
        *slot = accumulator.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
    modulated
}

/// The default modulator list applied to every voice, merged with the
/// zone's own modulators (zone entries with the same identity win).
pub fn default_modulators() -> Vec<Modulator> {
    vec![
        // Note-on velocity to initial attenuation.
        Modulator::new(
            ModulatorSource::non_cc(source_index::NOTE_ON_VELOCITY, CurveType::Concave, false, true),
            ModulatorSource::no_controller(),
            GeneratorType::InitialAttenuation,
            960,
        ),
        // Main volume and expression to initial attenuation.
        Modulator::new(
            ModulatorSource::cc(CC_MAIN_VOLUME, CurveType::Concave, false, true),
            ModulatorSource::no_controller(),
            GeneratorType::InitialAttenuation,
            960,
        ),
        Modulator::new(
            ModulatorSource::cc(CC_EXPRESSION, CurveType::Concave, false, true),
            ModulatorSource::no_controller(),
            GeneratorType::InitialAttenuation,
            960,
        ),
        // Pan knob.
        Modulator::new(
            ModulatorSource::cc(CC_PAN, CurveType::Linear, true, false),
            ModulatorSource::no_controller(),
            GeneratorType::Pan,
            500,
        ),
        // Pitch wheel scaled by the pitch-wheel range.
        Modulator::new(
            ModulatorSource::non_cc(source_index::PITCH_WHEEL, CurveType::Linear, true, false),
            ModulatorSource::non_cc(
                source_index::PITCH_WHEEL_RANGE,
                CurveType::Linear,
                false,
                false,
            ),
            GeneratorType::FineTune,
            12700,
        ),
        // Mod wheel and channel pressure drive vibrato depth.
        Modulator::new(
            ModulatorSource::cc(CC_MODULATION, CurveType::Linear, false, false),
            ModulatorSource::no_controller(),
            GeneratorType::VibLfoToPitch,
            50,
        ),
        Modulator::new(
            ModulatorSource::non_cc(source_index::CHANNEL_PRESSURE, CurveType::Linear, false, false),
            ModulatorSource::no_controller(),
            GeneratorType::VibLfoToPitch,
            50,
        ),
        // Effects depth knobs into the sends.
        Modulator::new(
            ModulatorSource::cc(CC_REVERB_DEPTH, CurveType::Linear, false, false),
            ModulatorSource::no_controller(),
            GeneratorType::ReverbEffectsSend,
            200,
        ),
        Modulator::new(
            ModulatorSource::cc(CC_CHORUS_DEPTH, CurveType::Linear, false, false),
            ModulatorSource::no_controller(),
            GeneratorType::ChorusEffectsSend,
            200,
        ),
        // Release time and brightness knobs.
        Modulator::new(
            ModulatorSource::cc(CC_RELEASE_TIME, CurveType::Linear, true, false),
            ModulatorSource::no_controller(),
            GeneratorType::ReleaseVolEnv,
            1200,
        ),
        Modulator::new(
            ModulatorSource::cc(CC_BRIGHTNESS, CurveType::Linear, true, false),
            ModulatorSource::no_controller(),
            GeneratorType::InitialFilterFc,
            6000,
        ),
    ]
}

/// Merges zone modulators over the defaults: identical identities replace
/// the default entry, new routes append.
pub fn merge_modulators(zone_modulators: &[Modulator]) -> Vec<Modulator> {
    let mut merged = default_modulators();
    for zone_modulator in zone_modulators {
        match merged
            .iter_mut()
            .find(|modulator| modulator.same_identity(zone_modulator))
        {
            Some(existing) => *existing = zone_modulator.clone(),
            None => merged.push(zone_modulator.clone()),
        }
    }
    merged
}
