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

//! Translation from live MIDI messages to core events.
//!
//! The core's event set is MIDI-like but standalone; this adapter is the
//! one place that speaks `midly`. Hosts that already produce core events
//! can skip it entirely.

use midly::live::LiveEvent;
use midly::MidiMessage;

use crate::event::SynthEvent;

/// Converts a live MIDI event into a core event, if it maps to one.
///
/// Note-on with velocity zero becomes note-off. System and realtime
/// messages return `None`.
pub fn from_live_event(event: &LiveEvent<'_>) -> Option<SynthEvent> {
    let LiveEvent::Midi { channel, message } = event else {
        return None;
    };
    let channel = usize::from(u8::from(*channel));

    match message {
        MidiMessage::NoteOn { key, vel } if u8::from(*vel) == 0 => Some(SynthEvent::NoteOff {
            channel,
            note: u8::from(*key),
        }),
        MidiMessage::NoteOn { key, vel } => Some(SynthEvent::NoteOn {
            channel,
            note: u8::from(*key),
            velocity: u8::from(*vel),
        }),
        MidiMessage::NoteOff { key, .. } => Some(SynthEvent::NoteOff {
            channel,
            note: u8::from(*key),
        }),
        MidiMessage::Controller { controller, value } => Some(SynthEvent::ControllerChange {
            channel,
            cc: u8::from(*controller),
            value: u8::from(*value),
        }),
        MidiMessage::PitchBend { bend } => Some(SynthEvent::PitchWheel {
            channel,
            value: bend.0.as_int(),
        }),
        MidiMessage::ChannelAftertouch { vel } => Some(SynthEvent::ChannelPressure {
            channel,
            value: u8::from(*vel),
        }),
        MidiMessage::Aftertouch { key, vel } => Some(SynthEvent::PolyPressure {
            channel,
            note: u8::from(*key),
            value: u8::from(*vel),
        }),
        MidiMessage::ProgramChange { .. } => None,
    }
}

/// Parses raw MIDI bytes and converts them, dropping unparseable input.
pub fn from_midi_bytes(raw: &[u8]) -> Option<SynthEvent> {
    let event = LiveEvent::parse(raw).ok()?;
    from_live_event(&event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midi(channel: u8, message: MidiMessage) -> LiveEvent<'static> {
        LiveEvent::Midi {
            channel: channel.into(),
            message,
        }
    }

    #[test]
    fn test_note_on_translation() {
        let event = midi(
            3,
            MidiMessage::NoteOn {
                key: 60.into(),
                vel: 100.into(),
            },
        );
        match from_live_event(&event) {
            Some(SynthEvent::NoteOn {
                channel,
                note,
                velocity,
            }) => {
                assert_eq!(channel, 3);
                assert_eq!(note, 60);
                assert_eq!(velocity, 100);
            }
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let event = midi(
            0,
            MidiMessage::NoteOn {
                key: 60.into(),
                vel: 0.into(),
            },
        );
        assert!(matches!(
            from_live_event(&event),
            Some(SynthEvent::NoteOff { note: 60, .. })
        ));
    }

    #[test]
    fn test_pitch_bend_translation() {
        let event = midi(
            0,
            MidiMessage::PitchBend {
                bend: midly::PitchBend::from_int(0),
            },
        );
        match from_live_event(&event) {
            // Centered bend is the 14-bit midpoint.
            Some(SynthEvent::PitchWheel { value, .. }) => assert_eq!(value, 8192),
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    #[test]
    fn test_raw_bytes_roundtrip() {
        // Note On, channel 1, key 60, velocity 100.
        let event = from_midi_bytes(&[0x90, 60, 100]);
        assert!(matches!(event, Some(SynthEvent::NoteOn { .. })));

        // Garbage input is dropped.
        assert!(from_midi_bytes(&[0x00]).is_none());
    }
}
