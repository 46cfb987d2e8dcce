// Error types for the MIDI I/O boundary.
//
// Engine failures pass through transparently: the boundary never catches
// and reinterprets a modeling error, it only adds the file-level failure
// modes the engine itself cannot see.

use chainsong_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MidiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI parse error: {0}")]
    Parse(String),

    #[error("unsupported SMPTE timing; only metrical (ticks per beat) files are handled")]
    UnsupportedTiming,

    #[error("no track with note events found in the file")]
    NoNotes,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<midly::Error> for MidiError {
    fn from(e: midly::Error) -> Self {
        MidiError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MidiError>;
