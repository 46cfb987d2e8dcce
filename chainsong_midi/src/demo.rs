// Built-in demo melody for first runs and tests.
//
// A C major scale with a short rest after every third note: enough
// material for the engine to learn a non-trivial chain from, without
// shipping a binary fixture in the repository.

use crate::error::Result;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

const TICKS_PER_QUARTER: u16 = 480;

/// The demo melody as SMF bytes.
pub fn demo_smf_bytes() -> Result<Vec<u8>> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let mut track: Track<'static> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))), // 120 BPM
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"demo_melody")),
    });

    let scale = [60u8, 62, 64, 65, 67, 69, 71, 72];
    let mut rest_ticks: u32 = 0;
    for (i, &pitch) in scale.iter().enumerate() {
        track.push(TrackEvent {
            delta: u28::new(rest_ticks),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(64),
                },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(u32::from(TICKS_PER_QUARTER)),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                },
            },
        });
        // An eighth-note rest after every third scale degree.
        rest_ticks = if i % 3 == 2 {
            u32::from(TICKS_PER_QUARTER) / 2
        } else {
            0
        };
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}
