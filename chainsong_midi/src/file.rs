// Standard MIDI File reading and writing.
//
// Uses the `midly` crate. Reading converts each track's delta ticks to
// seconds (first tempo meta wins, default 120 BPM; tempo changes after the
// first are ignored) and keeps only the note messages the engine's
// extractor understands. Writing serializes an assembled Track back to a
// single-track SMF with a tempo meta, note-on/note-off pairs, and explicit
// end-of-track. Rests occupy time but emit no messages.
//
// The engine never sees bytes: this module is the whole boundary.

use crate::error::{MidiError, Result};
use chainsong_engine::event::{MusicalEvent, Track as EngineTrack};
use chainsong_engine::extract::{RawEvent, RawEventKind};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in written files.
const TICKS_PER_QUARTER: u16 = 480;

/// One source track's note messages, delta-timed in seconds.
#[derive(Debug, Clone)]
pub struct NamedRawTrack {
    pub name: String,
    pub events: Vec<RawEvent>,
}

/// Parse an SMF byte stream into per-track raw event streams.
///
/// Tracks without any note messages (tempo/meta-only tracks) are skipped.
/// Fails with `NoNotes` when nothing playable remains.
pub fn load_tracks(data: &[u8]) -> Result<Vec<NamedRawTrack>> {
    let smf = Smf::parse(data)?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => return Err(MidiError::UnsupportedTiming),
    };
    let tempo_bpm = first_tempo(&smf).unwrap_or(120.0);
    let seconds_per_tick = 60.0 / tempo_bpm / ticks_per_beat as f64;
    log::debug!(
        "parsing SMF: {} tracks, {} ticks per beat, {:.1} BPM",
        smf.tracks.len(),
        ticks_per_beat,
        tempo_bpm
    );

    let mut tracks = Vec::new();
    for (i, track) in smf.tracks.iter().enumerate() {
        let mut name = format!("track_{i}");
        let mut events = Vec::new();
        let mut pending_ticks: u64 = 0;

        for event in track {
            pending_ticks += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    if let Ok(text) = std::str::from_utf8(bytes) {
                        let text = text.trim();
                        if !text.is_empty() {
                            name = text.to_string();
                        }
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let kind = match message {
                        MidiMessage::NoteOn { key, vel } => Some(RawEventKind::NoteOn {
                            channel: channel.as_int(),
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        }),
                        MidiMessage::NoteOff { key, .. } => Some(RawEventKind::NoteOff {
                            channel: channel.as_int(),
                            pitch: key.as_int(),
                        }),
                        _ => None,
                    };
                    if let Some(kind) = kind {
                        events.push(RawEvent {
                            delta: pending_ticks as f64 * seconds_per_tick,
                            kind,
                        });
                        pending_ticks = 0;
                    }
                }
                _ => {}
            }
        }

        if !events.is_empty() {
            tracks.push(NamedRawTrack { name, events });
        }
    }

    if tracks.is_empty() {
        return Err(MidiError::NoNotes);
    }
    Ok(tracks)
}

/// The first tempo meta event anywhere in the file, as BPM.
fn first_tempo(smf: &Smf) -> Option<f64> {
    for track in &smf.tracks {
        for event in track {
            if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_beat)) = event.kind {
                return Some(60_000_000.0 / us_per_beat.as_int() as f64);
            }
        }
    }
    None
}

/// Serialize an assembled track to SMF bytes.
pub fn track_to_smf_bytes(track: &EngineTrack, tempo_bpm: u32) -> Result<Vec<u8>> {
    let smf = track_to_smf(track, tempo_bpm);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

/// Serialize an assembled track and write it to a file.
pub fn write_track(track: &EngineTrack, tempo_bpm: u32, path: &Path) -> Result<()> {
    let bytes = track_to_smf_bytes(track, tempo_bpm)?;
    std::fs::write(path, &bytes)?;
    Ok(())
}

fn track_to_smf(track: &EngineTrack, tempo_bpm: u32) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    let seconds_per_tick = 60.0 / tempo_bpm as f64 / TICKS_PER_QUARTER as f64;

    // Absolute-tick message list; note-offs sort before note-ons at the
    // same tick so back-to-back repeats of a pitch stay well formed.
    let mut messages: Vec<(u64, u8, MidiMessage)> = Vec::new();
    for event in track.events() {
        if let MusicalEvent::Note {
            pitch,
            velocity,
            duration,
            onset,
        } = *event
        {
            let start = (onset / seconds_per_tick).round() as u64;
            let end = ((onset + duration) / seconds_per_tick).round() as u64;
            messages.push((
                start,
                1,
                MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(velocity),
                },
            ));
            messages.push((
                end,
                0,
                MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                },
            ));
        }
    }
    messages.sort_by_key(|&(tick, order, _)| (tick, order));

    let mut events: Track<'static> = Vec::new();
    let tempo_microseconds = 60_000_000 / tempo_bpm;
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"chainsong")),
    });

    let mut last_tick: u64 = 0;
    for (tick, _, message) in messages {
        events.push(TrackEvent {
            delta: u28::new((tick - last_tick) as u32),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        });
        last_tick = tick;
    }
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(events);
    smf
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsong_engine::extract::{ExtractConfig, extract_events};

    fn simple_track() -> EngineTrack {
        EngineTrack::from_events(vec![
            MusicalEvent::Note {
                pitch: 60,
                velocity: 64,
                duration: 0.5,
                onset: 0.0,
            },
            MusicalEvent::Rest {
                duration: 0.5,
                onset: 0.5,
            },
            MusicalEvent::Note {
                pitch: 64,
                velocity: 80,
                duration: 0.5,
                onset: 1.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn write_then_load_roundtrips_notes() {
        let bytes = track_to_smf_bytes(&simple_track(), 120).unwrap();
        let raw = load_tracks(&bytes).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].name, "chainsong");

        let track = extract_events(&raw[0].events, &ExtractConfig::default()).unwrap();
        let notes: Vec<_> = track.notes().collect();
        assert_eq!(notes.len(), 2);
        match *notes[0] {
            MusicalEvent::Note {
                pitch,
                velocity,
                duration,
                onset,
            } => {
                assert_eq!(pitch, 60);
                assert_eq!(velocity, 64);
                assert!((duration - 0.5).abs() < 1e-6);
                assert!(onset.abs() < 1e-6);
            }
            _ => panic!("expected a note"),
        }
        // The rest survives the byte roundtrip as a timing gap.
        assert_eq!(track.rests().count(), 1);
    }

    #[test]
    fn meta_only_tracks_are_skipped() {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        let tempo_track: Track<'static> = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        smf.tracks.push(tempo_track);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();

        assert!(matches!(load_tracks(&buf), Err(MidiError::NoNotes)));
    }

    #[test]
    fn tempo_scales_deltas() {
        // Half-second note at 120 BPM spans 480 ticks = one quarter.
        let bytes = track_to_smf_bytes(&simple_track(), 120).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let note_off_delta = smf.tracks[0]
            .iter()
            .find_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => Some(e.delta.as_int()),
                _ => None,
            })
            .unwrap();
        assert_eq!(note_off_delta, 480);
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        assert!(matches!(
            load_tracks(b"not a midi file"),
            Err(MidiError::Parse(_))
        ));
    }
}
