// Musical events and tracks: the canonical sequence representation.
//
// A Track is an ordered sequence of Note and Rest events with resolved
// timing. It is the engine's "source of truth": models are learned from it
// and generated material is packaged back into one. MIDI byte streams are
// the collaborator's concern, never represented here.
//
// Tracks are immutable once constructed: the extractor and the assembler
// each produce a fresh Track, and every invariant is checked (or holds by
// construction) at the single construction point.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// A single musical event. Closed set: every consumer pattern-matches
/// exhaustively over these two kinds.
///
/// Durations and onsets are in seconds (or any consistent real time unit
/// chosen by the collaborator that produced the raw stream).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MusicalEvent {
    Note {
        /// MIDI pitch number, 0-127.
        pitch: u8,
        /// MIDI velocity, 0-127.
        velocity: u8,
        /// Sounding length, non-negative.
        duration: f64,
        /// Start offset from the beginning of the track, non-negative.
        onset: f64,
    },
    Rest {
        /// Length of the silence, non-negative.
        duration: f64,
        /// Start offset from the beginning of the track, non-negative.
        onset: f64,
    },
}

impl MusicalEvent {
    /// Start offset of the event.
    pub fn onset(&self) -> f64 {
        match *self {
            MusicalEvent::Note { onset, .. } | MusicalEvent::Rest { onset, .. } => onset,
        }
    }

    /// Duration of the event.
    pub fn duration(&self) -> f64 {
        match *self {
            MusicalEvent::Note { duration, .. } | MusicalEvent::Rest { duration, .. } => duration,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, MusicalEvent::Note { .. })
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, MusicalEvent::Rest { .. })
    }
}

/// An ordered, immutable sequence of musical events.
///
/// Invariants, checked at construction:
/// - events are ordered by non-decreasing onset;
/// - all durations and onsets are non-negative and finite;
/// - pitch and velocity are within MIDI range (guaranteed by `u8` width
///   plus the 0-127 check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    events: Vec<MusicalEvent>,
}

impl Track {
    /// Build a track from an event sequence, validating the track invariants.
    pub fn from_events(events: Vec<MusicalEvent>) -> Result<Self> {
        let mut prev_onset = 0.0f64;
        for (i, ev) in events.iter().enumerate() {
            let onset = ev.onset();
            let duration = ev.duration();
            if !onset.is_finite() || !duration.is_finite() || onset < 0.0 || duration < 0.0 {
                return Err(EngineError::InvalidTrack(format!(
                    "event {i} has invalid timing (onset {onset}, duration {duration})"
                )));
            }
            if onset < prev_onset {
                return Err(EngineError::InvalidTrack(format!(
                    "event {i} starts at {onset} before previous onset {prev_onset}"
                )));
            }
            prev_onset = onset;
            if let MusicalEvent::Note {
                pitch, velocity, ..
            } = *ev
            {
                if pitch > 127 || velocity > 127 {
                    return Err(EngineError::InvalidTrack(format!(
                        "event {i} outside MIDI range (pitch {pitch}, velocity {velocity})"
                    )));
                }
            }
        }
        Ok(Track { events })
    }

    /// All events in onset order.
    pub fn events(&self) -> &[MusicalEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Read-only projection over the note events.
    pub fn notes(&self) -> impl Iterator<Item = &MusicalEvent> {
        self.events.iter().filter(|e| e.is_note())
    }

    /// Read-only projection over the rest events.
    pub fn rests(&self) -> impl Iterator<Item = &MusicalEvent> {
        self.events.iter().filter(|e| e.is_rest())
    }
}
