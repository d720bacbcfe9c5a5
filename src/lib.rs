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

//! Realtime SoundFont-2/3 synthesis core.
//!
//! Given a bank of sampled instruments and a stream of MIDI-like channel
//! events, the [`Processor`] renders stereo PCM in fixed-size blocks
//! together with reverb and chorus send planes. It is designed to sit
//! behind a realtime audio callback: events arrive on a lock-free queue
//! and are drained at block boundaries, and the render path performs no
//! blocking, I/O, or steady-state allocation.
//!
//! File parsing, Vorbis decoding, MIDI sequencing, and the host audio
//! plumbing live outside this crate; see [`soundfont`] for the records
//! the parser supplies and [`event`] for the control surface.

pub mod channel;
pub mod config;
pub mod dsp;
pub mod event;
pub mod generator;
pub mod midi;
pub mod modulator;
pub mod processor;
pub mod soundfont;
pub mod store;
#[cfg(test)]
mod testutil;
pub mod units;
pub mod voice;

pub use crate::config::SynthConfig;
pub use crate::dsp::AudioBlock;
pub use crate::event::{
    event_channel, outbound_channel, EventReceiver, EventSender, OutboundEvent, OutboundReceiver,
    OutboundSender, SynthEvent,
};
pub use crate::processor::Processor;
