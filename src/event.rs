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

//! The event types flowing between the host and the processor.
//!
//! Inbound events are produced by the sequencer/host thread and drained
//! by the processor at block boundaries, in arrival order. Outbound
//! notifications go the other way and are likewise non-blocking.

use std::sync::Arc;

use crate::channel::ChannelVibrato;
use crate::soundfont::Preset;

/// Inbound control events. Everything that mutates synthesis state goes
/// through here so the realtime thread is the only mutator.
#[derive(Debug, Clone)]
pub enum SynthEvent {
    NoteOn {
        channel: usize,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: usize,
        note: u8,
    },
    /// Note-off with a near-instant forced release.
    KillNote {
        channel: usize,
        note: u8,
    },
    ControllerChange {
        channel: usize,
        cc: u8,
        value: u8,
    },
    /// Reset controllers to defaults, preserving channel transpose and
    /// the listed CCs.
    ControllerReset {
        channel: usize,
        excluded: Vec<u8>,
    },
    PitchWheel {
        channel: usize,
        value: u16,
    },
    ChannelPressure {
        channel: usize,
        value: u8,
    },
    PolyPressure {
        channel: usize,
        note: u8,
        value: u8,
    },
    SetChannelTuning {
        channel: usize,
        cents: i16,
    },
    TransposeChannel {
        channel: usize,
        cents: i16,
    },
    SetChannelVibrato {
        channel: usize,
        vibrato: ChannelVibrato,
    },
    SetPreset {
        channel: usize,
        preset: Arc<Preset>,
    },
    /// Decoded mono PCM for a sample id, published to the store.
    SampleDump {
        sample_id: u32,
        frames: Arc<[f32]>,
    },
    /// Empties the sample store. Only honored while no voices are live.
    ClearCache,
    /// Forced drops every voice now; otherwise everything is released.
    StopAll {
        force: bool,
    },
    /// Steal exactly this many voices, lowest velocity first.
    KillVoices {
        count: usize,
    },
    MuteChannel {
        channel: usize,
        muted: bool,
    },
    AddChannel,
}

/// Outbound notifications from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Per-channel live voice counts, sent whenever the total changes.
    VoiceCounts(Vec<u16>),
    /// A voice was scheduled for a sample whose PCM is not decoded yet.
    DumpRequest { sample_id: u32 },
    /// Acknowledges AddChannel with the new channel's index.
    ChannelAdded { index: usize },
    /// Acknowledges StopAll.
    Stopped,
}

/// Sender for inbound events; cheap to clone into producer threads.
pub type EventSender = crossbeam_channel::Sender<SynthEvent>;

/// Receiver side owned by the processor.
pub type EventReceiver = crossbeam_channel::Receiver<SynthEvent>;

/// Sender for outbound notifications.
pub type OutboundSender = crossbeam_channel::Sender<OutboundEvent>;

/// Receiver for outbound notifications, owned by the host.
pub type OutboundReceiver = crossbeam_channel::Receiver<OutboundEvent>;

/// Creates the inbound event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    crossbeam_channel::unbounded()
}

/// Creates the outbound notification channel.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    crossbeam_channel::unbounded()
}
