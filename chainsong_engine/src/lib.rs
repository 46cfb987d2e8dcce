// Chainsong engine
//
// Learns a Markov model of musical structure from an existing performance
// and resamples stylistically related material from it. The engine is
// agnostic to musical semantics beyond the event attributes it is given;
// MIDI bytes, ports, and files are the `chainsong_midi` collaborator's
// concern.
//
// Architecture, leaf first:
// - event.rs: MusicalEvent / Track, the canonical ordered event sequence
// - extract.rs: raw delta-timed note messages -> Track, with rest detection
// - chain.rs: states, transition counting, and the frozen TransitionModel
// - linalg.rs: small dense-matrix solve utility for the analyzer
// - analysis.rs: per-state entropy, entropy timeline, stationary
//   distribution, Kemeny constant
// - generate.rs: seeded inverse-CDF walk producing new state sequences
// - assemble.rs: generated states -> Track, with attribute synthesis
// - composer.rs: per-track orchestration and the caller-facing report
//
// Everything is deterministic given a seed: models build bit-for-bit
// reproducibly, and generation threads an explicit PRNG instance through
// every call. Models and analysis results are immutable after
// construction and safe to share across threads.

pub mod analysis;
pub mod assemble;
pub mod chain;
pub mod composer;
pub mod error;
pub mod event;
pub mod extract;
pub mod generate;
pub mod linalg;

pub use analysis::{AnalysisConfig, AnalysisResult, StationaryDistribution};
pub use assemble::{AssembleConfig, AttributePools};
pub use chain::{ChainConfig, Context, Smoothing, State, StateKind, TransitionModel};
pub use composer::{Composer, GenerationRequest, TrackReport};
pub use error::{EngineError, Result};
pub use event::{MusicalEvent, Track};
pub use extract::{ExtractConfig, RawEvent, RawEventKind};
pub use generate::GenerateConfig;
