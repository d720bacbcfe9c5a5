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

//! Helpers for building in-memory banks and driving the processor in tests.

use std::sync::Arc;

use crate::generator::{default_generators, GeneratorType, GeneratorVector, GENERATOR_COUNT};
use crate::soundfont::{Preset, PresetRegion, Sample};

/// A mono sample holding a constant value, convenient for amplitude
/// assertions.
pub fn constant_sample_with_loop(
    id: u32,
    frames: usize,
    value: f32,
    loop_start: u32,
    loop_end: u32,
) -> Arc<Sample> {
    Arc::new(Sample::new(
        id,
        44100,
        60,
        0,
        loop_start,
        loop_end,
        false,
        Some(Arc::from(vec![value; frames])),
    ))
}

/// A compressed sample whose PCM has not been decoded yet.
pub fn pending_sample(id: u32, loop_start: u32, loop_end: u32) -> Arc<Sample> {
    Arc::new(Sample::new(id, 44100, 60, 0, loop_start, loop_end, true, None))
}

/// Instrument generators with the given `(slot, value)` tweaks applied on
/// top of the defaults.
pub fn instrument_generators(tweaks: &[(GeneratorType, i16)]) -> GeneratorVector {
    let mut generators = default_generators();
    for &(generator, value) in tweaks {
        generators[generator as usize] = value;
    }
    generators
}

/// A one-region preset covering the full key and velocity range.
pub fn single_zone_preset(sample: Arc<Sample>, instrument: GeneratorVector) -> Arc<Preset> {
    let region = PresetRegion::new(
        (0, 127),
        (0, 127),
        sample,
        [0; GENERATOR_COUNT],
        instrument,
        Vec::new(),
    );
    Arc::new(Preset::new("test preset", vec![region]))
}

/// Peak absolute value over a plane.
pub fn peak(plane: &[f32]) -> f32 {
    plane.iter().fold(0.0f32, |max, &sample| max.max(sample.abs()))
}
