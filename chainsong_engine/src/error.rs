// Engine error types.
//
// All failures in the engine are deterministic given the same input: they
// are raised at the point of detection and propagated unchanged. The engine
// never substitutes default values for undefined statistics and never
// retries.

use thiserror::Error;

/// Errors produced by the modeling and generation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A note-off arrived with no matching open note-on.
    #[error("malformed sequence: note-off for pitch {pitch} on channel {channel} at {at:.4} has no matching note-on")]
    MalformedSequence { channel: u8, pitch: u8, at: f64 },

    /// An event sequence violates the track invariants (onset ordering,
    /// non-negative durations, MIDI value ranges).
    #[error("invalid track: {0}")]
    InvalidTrack(String),

    /// There are no transitions to learn from or generate against.
    #[error("empty model: {0}")]
    EmptyModel(String),

    /// The caller referenced a track or state absent from the model.
    #[error("unknown state: {0}")]
    UnknownState(String),

    /// An explicit generation seed state is not present in the model.
    #[error("unknown seed state: {0}")]
    UnknownSeedState(String),

    /// The Kemeny constant was requested on a reducible or periodic chain.
    #[error("chain is not ergodic: {0}")]
    NotErgodic(String),

    /// An iterative linear-algebra step exceeded its cap, or a solve hit a
    /// degenerate pivot.
    #[error("numerical non-convergence: {0}")]
    NumericalNonConvergence(String),

    /// A model failed to serialize or deserialize.
    #[error("model serialization: {0}")]
    ModelFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
