// Event extraction: raw delta-timed messages to a canonical Track.
//
// The MIDI collaborator hands the engine a per-track stream of note-on and
// note-off messages with deltas already resolved to seconds. This module
// pairs them into Note events and materializes audible gaps as explicit
// Rest events.
//
// Pairing rules:
// - a note-off matches the earliest open note-on for the same
//   (channel, pitch), FIFO, so retriggered pitches pair in arrival order;
// - a note-on with velocity 0 is a note-off (running-status convention);
// - a note-off with nothing open is a malformed sequence and an error;
// - note-ons still open when the stream ends are closed at the final
//   timestamp rather than dropped.
//
// Overlapping notes (polyphony) come out as independent events with
// overlapping onsets; the extractor never merges or reorders them.

use crate::error::{EngineError, Result};
use crate::event::{MusicalEvent, Track};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One message in a raw per-track event stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Time since the previous message, in seconds.
    pub delta: f64,
    pub kind: RawEventKind,
}

/// The message kinds the extractor understands. Anything else in the
/// source stream is the collaborator's job to filter out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RawEventKind {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
}

/// Extraction policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Minimum silent gap, in seconds, that becomes an explicit Rest.
    /// Gaps below this are absorbed so quantization jitter does not
    /// manufacture spurious silence. The right value relative to the
    /// source's quantization is a policy choice, so it is a config field
    /// rather than a hidden constant.
    pub rest_threshold: f64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            rest_threshold: 0.05,
        }
    }
}

/// Convert a raw message stream into a canonical Track.
pub fn extract_events(raw: &[RawEvent], config: &ExtractConfig) -> Result<Track> {
    // Open note-ons awaiting their note-off, FIFO per (channel, pitch).
    let mut open: BTreeMap<(u8, u8), Vec<(f64, u8)>> = BTreeMap::new();
    let mut notes: Vec<MusicalEvent> = Vec::new();
    let mut now = 0.0f64;

    for ev in raw {
        if !ev.delta.is_finite() || ev.delta < 0.0 {
            return Err(EngineError::InvalidTrack(format!(
                "raw event has invalid delta {}",
                ev.delta
            )));
        }
        now += ev.delta;
        match ev.kind {
            RawEventKind::NoteOn {
                channel,
                pitch,
                velocity,
            } if velocity > 0 => {
                open.entry((channel, pitch)).or_default().push((now, velocity));
            }
            RawEventKind::NoteOn { channel, pitch, .. }
            | RawEventKind::NoteOff { channel, pitch } => {
                let queue = open.get_mut(&(channel, pitch));
                match queue.and_then(|q| if q.is_empty() { None } else { Some(q.remove(0)) }) {
                    Some((start, velocity)) => notes.push(MusicalEvent::Note {
                        pitch,
                        velocity,
                        duration: now - start,
                        onset: start,
                    }),
                    None => {
                        return Err(EngineError::MalformedSequence {
                            channel,
                            pitch,
                            at: now,
                        });
                    }
                }
            }
        }
    }

    // Close anything left sounding at the end of the stream.
    for ((_, pitch), queue) in open {
        for (start, velocity) in queue {
            notes.push(MusicalEvent::Note {
                pitch,
                velocity,
                duration: now - start,
                onset: start,
            });
        }
    }

    notes.sort_by(|a, b| a.onset().total_cmp(&b.onset()));

    Track::from_events(insert_rests(notes, config.rest_threshold))
}

/// Walk the onset-sorted notes and materialize gaps longer than the
/// threshold as Rest events. `covered` tracks the furthest sounding end so
/// overlapping notes never produce a rest inside a still-sounding region.
fn insert_rests(notes: Vec<MusicalEvent>, threshold: f64) -> Vec<MusicalEvent> {
    let mut out: Vec<MusicalEvent> = Vec::with_capacity(notes.len());
    let mut covered = 0.0f64;

    for note in notes {
        let gap = note.onset() - covered;
        if !out.is_empty() && gap > threshold {
            out.push(MusicalEvent::Rest {
                duration: gap,
                onset: covered,
            });
        }
        covered = covered.max(note.onset() + note.duration());
        out.push(note);
    }
    out
}
