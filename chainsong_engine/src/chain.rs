// Markov chain construction: states, transition counting, and the frozen
// probability model.
//
// A State is the discretized identity of an event: its pitch (or a rest
// marker), optionally composited with a duration bucket. The chain builder
// counts transitions between consecutive length-k context windows in a
// single left-to-right pass, then freezes the integer counts into
// probability rows. The frozen TransitionModel is immutable; analysis and
// generation only ever read it.
//
// All maps are BTreeMaps so iteration order, and therefore every
// accumulated sum and every inverse-CDF walk downstream, is fixed by the
// key order, never by hash state. Given the same sequence and order, the
// model is bit-for-bit reproducible.

use crate::error::{EngineError, Result};
use crate::event::{MusicalEvent, Track};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The discretized identity a transition is defined over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct State {
    pub kind: StateKind,
    /// Present only when the model is configured with composite
    /// pitch-and-duration states.
    pub duration_bucket: Option<u32>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StateKind {
    /// A sounding note, identified by MIDI pitch.
    Pitch(u8),
    /// Silence.
    Rest,
}

impl State {
    pub fn pitch(pitch: u8) -> State {
        State {
            kind: StateKind::Pitch(pitch),
            duration_bucket: None,
        }
    }

    pub fn rest() -> State {
        State {
            kind: StateKind::Rest,
            duration_bucket: None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StateKind::Pitch(p) => write!(f, "{}", pitch_name(p))?,
            StateKind::Rest => write!(f, "rest")?,
        }
        if let Some(bucket) = self.duration_bucket {
            write!(f, "@{bucket}")?;
        }
        Ok(())
    }
}

/// A length-k window of preceding states. A single state when k = 1.
pub type Context = Vec<State>;

/// Render a context for error messages.
pub fn context_label(context: &[State]) -> String {
    context
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Policy for contexts and next-states with zero observed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Smoothing {
    /// No smoothing: unobserved contexts are terminal.
    None,
    /// Terminal contexts get a uniform row over all known states.
    Uniform,
    /// Add-alpha smoothing over all known states, for every context.
    Laplace(f64),
}

/// Chain construction policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Markov order: the number of preceding states a transition is
    /// conditioned on.
    pub order: usize,
    /// When set, states composite the pitch identity with
    /// `floor(duration / width)` so rhythm participates in the model.
    pub duration_bucket: Option<f64>,
    pub smoothing: Smoothing,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            order: 1,
            duration_bucket: None,
            smoothing: Smoothing::None,
        }
    }
}

/// Derive the state sequence for a track. Deterministic: equal events map
/// to equal states.
pub fn states_of(track: &Track, config: &ChainConfig) -> Vec<State> {
    track
        .events()
        .iter()
        .map(|ev| {
            let bucket = config
                .duration_bucket
                .map(|width| (ev.duration() / width).floor() as u32);
            let kind = match *ev {
                MusicalEvent::Note { pitch, .. } => StateKind::Pitch(pitch),
                MusicalEvent::Rest { .. } => StateKind::Rest,
            };
            State {
                kind,
                duration_bucket: bucket,
            }
        })
        .collect()
}

/// A probability row: next state to probability. Sums to 1 within 1e-9 for
/// every non-terminal context.
pub type Row = BTreeMap<State, f64>;

/// The frozen transition-probability model.
///
/// Built once from a fixed state sequence, immutable afterwards. Safely
/// shared by reference for concurrent reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ModelDisk", into = "ModelDisk")]
pub struct TransitionModel {
    order: usize,
    smoothing: Smoothing,
    /// Raw transition counts, kept for inspection and persistence.
    counts: BTreeMap<Context, BTreeMap<State, u64>>,
    /// Frozen probability rows derived from `counts` (+ smoothing).
    probs: BTreeMap<Context, Row>,
    /// How many times each context window occurs in the source sequence,
    /// including the final window with no successor.
    visits: BTreeMap<Context, u64>,
    /// Every state observed in the source sequence.
    alphabet: BTreeSet<State>,
    /// Length of the source state sequence.
    source_len: usize,
}

impl TransitionModel {
    /// Count transitions over the state sequence and freeze them into
    /// probabilities.
    ///
    /// Fails with `EmptyModel` when the sequence has fewer than
    /// `order + 1` states; there is nothing to learn from.
    pub fn build(states: &[State], config: &ChainConfig) -> Result<TransitionModel> {
        let order = config.order.max(1);
        if states.len() < order + 1 {
            return Err(EngineError::EmptyModel(format!(
                "need at least {} states for an order-{} chain, got {}",
                order + 1,
                order,
                states.len()
            )));
        }

        let mut counts: BTreeMap<Context, BTreeMap<State, u64>> = BTreeMap::new();
        let mut visits: BTreeMap<Context, u64> = BTreeMap::new();
        let mut alphabet: BTreeSet<State> = BTreeSet::new();

        // Single pass, accumulation order fixed by sequence order.
        for start in 0..=states.len() - order {
            let context = states[start..start + order].to_vec();
            *visits.entry(context.clone()).or_insert(0) += 1;
            if let Some(&next) = states.get(start + order) {
                *counts.entry(context).or_default().entry(next).or_insert(0) += 1;
            }
        }
        alphabet.extend(states.iter().copied());

        let probs = freeze(&counts, &visits, &alphabet, config.smoothing);
        log::debug!(
            "built order-{} model: {} contexts, {} states, {} transitions",
            order,
            visits.len(),
            alphabet.len(),
            states.len() - order,
        );

        Ok(TransitionModel {
            order,
            smoothing: config.smoothing,
            counts,
            probs,
            visits,
            alphabet,
            source_len: states.len(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of distinct contexts the model knows.
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// The probability row for a context. `None` for terminal contexts
    /// (no observed outgoing transitions and no smoothing) and for
    /// contexts the model has never seen.
    pub fn row(&self, context: &[State]) -> Option<&Row> {
        self.probs.get(context)
    }

    /// Raw transition counts for a context.
    pub fn counts(&self, context: &[State]) -> Option<&BTreeMap<State, u64>> {
        self.counts.get(context)
    }

    /// All known contexts, in deterministic order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.visits.keys()
    }

    /// How often a context was visited in the source sequence.
    pub fn visits(&self, context: &[State]) -> u64 {
        self.visits.get(context).copied().unwrap_or(0)
    }

    /// Every state observed in the source sequence.
    pub fn alphabet(&self) -> &BTreeSet<State> {
        &self.alphabet
    }

    /// Length of the source state sequence the model was built from.
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Serialize the model to JSON. Only counts are persisted; probability
    /// rows are re-frozen on load, so the two can never disagree.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load a model previously saved with [`TransitionModel::to_json`].
    pub fn from_json(json: &str) -> Result<TransitionModel> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Divide each context's counts by their sum, applying the smoothing
/// policy. Iteration over BTreeMaps keeps the division order fixed.
fn freeze(
    counts: &BTreeMap<Context, BTreeMap<State, u64>>,
    visits: &BTreeMap<Context, u64>,
    alphabet: &BTreeSet<State>,
    smoothing: Smoothing,
) -> BTreeMap<Context, Row> {
    let mut probs: BTreeMap<Context, Row> = BTreeMap::new();

    for context in visits.keys() {
        let observed = counts.get(context);
        let row: Row = match smoothing {
            Smoothing::None => match observed {
                None => continue, // terminal
                Some(row_counts) => {
                    let total: u64 = row_counts.values().sum();
                    row_counts
                        .iter()
                        .map(|(&s, &c)| (s, c as f64 / total as f64))
                        .collect()
                }
            },
            Smoothing::Uniform => match observed {
                Some(row_counts) => {
                    let total: u64 = row_counts.values().sum();
                    row_counts
                        .iter()
                        .map(|(&s, &c)| (s, c as f64 / total as f64))
                        .collect()
                }
                None => {
                    let p = 1.0 / alphabet.len() as f64;
                    alphabet.iter().map(|&s| (s, p)).collect()
                }
            },
            Smoothing::Laplace(alpha) => {
                let observed_total: u64 = observed
                    .map(|row| row.values().sum())
                    .unwrap_or(0);
                let denom = observed_total as f64 + alpha * alphabet.len() as f64;
                alphabet
                    .iter()
                    .map(|&s| {
                        let c = observed.and_then(|row| row.get(&s)).copied().unwrap_or(0);
                        (s, (c as f64 + alpha) / denom)
                    })
                    .collect()
            }
        };
        probs.insert(context.clone(), row);
    }
    probs
}

/// Serialized form: counts only, probabilities re-frozen on load.
#[derive(Serialize, Deserialize)]
struct ModelDisk {
    order: usize,
    smoothing: Smoothing,
    counts: Vec<(Context, Vec<(State, u64)>)>,
    visits: Vec<(Context, u64)>,
    source_len: usize,
}

impl From<TransitionModel> for ModelDisk {
    fn from(model: TransitionModel) -> ModelDisk {
        ModelDisk {
            order: model.order,
            smoothing: model.smoothing,
            counts: model
                .counts
                .into_iter()
                .map(|(ctx, row)| (ctx, row.into_iter().collect()))
                .collect(),
            visits: model.visits.into_iter().collect(),
            source_len: model.source_len,
        }
    }
}

impl TryFrom<ModelDisk> for TransitionModel {
    type Error = String;

    fn try_from(disk: ModelDisk) -> std::result::Result<TransitionModel, String> {
        if disk.order == 0 {
            return Err("model order must be at least 1".to_string());
        }
        let counts: BTreeMap<Context, BTreeMap<State, u64>> = disk
            .counts
            .into_iter()
            .map(|(ctx, row)| (ctx, row.into_iter().collect()))
            .collect();
        let visits: BTreeMap<Context, u64> = disk.visits.into_iter().collect();
        let mut alphabet: BTreeSet<State> = BTreeSet::new();
        for (ctx, row) in &counts {
            alphabet.extend(ctx.iter().copied());
            alphabet.extend(row.keys().copied());
        }
        for ctx in visits.keys() {
            alphabet.extend(ctx.iter().copied());
        }
        let probs = freeze(&counts, &visits, &alphabet, disk.smoothing);
        Ok(TransitionModel {
            order: disk.order,
            smoothing: disk.smoothing,
            counts,
            probs,
            visits,
            alphabet,
            source_len: disk.source_len,
        })
    }
}

/// Convert a MIDI pitch to a compact note name (e.g., "C4", "F#3").
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
    ];
    let octave = (pitch / 12) as i8 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn pitch_states(pitches: &[u8]) -> Vec<State> {
        pitches.iter().map(|&p| State::pitch(p)).collect()
    }

    #[test]
    fn counts_match_observed_transitions() {
        // From 62: twice to 64, once to 60, over 3 outgoing transitions.
        let states = pitch_states(&[60, 62, 64, 62, 60, 62, 64, 72]);
        let model = TransitionModel::build(&states, &ChainConfig::default()).unwrap();

        let counts = model.counts(&[State::pitch(62)]).unwrap();
        assert_eq!(counts.get(&State::pitch(64)), Some(&2));
        assert_eq!(counts.get(&State::pitch(60)), Some(&1));

        let row = model.row(&[State::pitch(62)]).unwrap();
        assert_eq!(row[&State::pitch(64)], 2.0 / 3.0);
        assert_eq!(row[&State::pitch(60)], 1.0 / 3.0);
    }

    #[test]
    fn rows_sum_to_one() {
        let states = pitch_states(&[60, 62, 64, 62, 60, 62, 64, 72, 60, 64]);
        let model = TransitionModel::build(&states, &ChainConfig::default()).unwrap();
        for context in model.contexts() {
            if let Some(row) = model.row(context) {
                let sum: f64 = row.values().sum();
                assert!((sum - 1.0).abs() < 1e-9, "row sum {sum} for {context:?}");
            }
        }
    }

    #[test]
    fn terminal_state_has_no_row() {
        let states = pitch_states(&[60, 62, 72]);
        let model = TransitionModel::build(&states, &ChainConfig::default()).unwrap();
        // 72 only appears at the very end.
        assert!(model.row(&[State::pitch(72)]).is_none());
        assert_eq!(model.visits(&[State::pitch(72)]), 1);
    }

    #[test]
    fn uniform_smoothing_fills_terminal_rows() {
        let states = pitch_states(&[60, 62, 72]);
        let config = ChainConfig {
            smoothing: Smoothing::Uniform,
            ..ChainConfig::default()
        };
        let model = TransitionModel::build(&states, &config).unwrap();
        let row = model.row(&[State::pitch(72)]).unwrap();
        assert_eq!(row.len(), 3);
        for &p in row.values() {
            assert!((p - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn laplace_smoothing_covers_the_alphabet() {
        let states = pitch_states(&[60, 62, 60, 62]);
        let config = ChainConfig {
            smoothing: Smoothing::Laplace(1.0),
            ..ChainConfig::default()
        };
        let model = TransitionModel::build(&states, &config).unwrap();
        let row = model.row(&[State::pitch(60)]).unwrap();
        // Both known states get mass, observed one gets more.
        assert!(row[&State::pitch(62)] > row[&State::pitch(60)]);
        assert!(row[&State::pitch(60)] > 0.0);
        let sum: f64 = row.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn too_short_sequence_is_empty_model() {
        let states = pitch_states(&[60]);
        let err = TransitionModel::build(&states, &ChainConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyModel(_)));

        let config = ChainConfig {
            order: 2,
            ..ChainConfig::default()
        };
        let err = TransitionModel::build(&pitch_states(&[60, 62]), &config).unwrap_err();
        assert!(matches!(err, EngineError::EmptyModel(_)));
    }

    #[test]
    fn order_two_contexts_are_windows() {
        let states = pitch_states(&[60, 62, 64, 60, 62, 67]);
        let config = ChainConfig {
            order: 2,
            ..ChainConfig::default()
        };
        let model = TransitionModel::build(&states, &config).unwrap();
        let ctx = vec![State::pitch(60), State::pitch(62)];
        let row = model.row(&ctx).unwrap();
        assert_eq!(row[&State::pitch(64)], 0.5);
        assert_eq!(row[&State::pitch(67)], 0.5);
        assert_eq!(model.visits(&ctx), 2);
    }

    #[test]
    fn identical_input_builds_identical_models() {
        let states = pitch_states(&[60, 64, 67, 64, 60, 64, 67, 72]);
        let a = TransitionModel::build(&states, &ChainConfig::default()).unwrap();
        let b = TransitionModel::build(&states, &ChainConfig::default()).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn json_roundtrip_preserves_rows() {
        let states = pitch_states(&[60, 62, 64, 62, 60, 62, 64, 72]);
        let model = TransitionModel::build(&states, &ChainConfig::default()).unwrap();
        let json = model.to_json().unwrap();
        let restored = TransitionModel::from_json(&json).unwrap();
        assert_eq!(restored.order(), model.order());
        assert_eq!(restored.source_len(), model.source_len());
        let row = restored.row(&[State::pitch(62)]).unwrap();
        assert_eq!(row[&State::pitch(64)], 2.0 / 3.0);
    }

    #[test]
    fn duration_buckets_split_states() {
        use crate::event::MusicalEvent;
        let track = crate::event::Track::from_events(vec![
            MusicalEvent::Note {
                pitch: 60,
                velocity: 64,
                duration: 0.25,
                onset: 0.0,
            },
            MusicalEvent::Note {
                pitch: 60,
                velocity: 64,
                duration: 1.0,
                onset: 0.25,
            },
        ])
        .unwrap();
        let config = ChainConfig {
            duration_bucket: Some(0.5),
            ..ChainConfig::default()
        };
        let states = states_of(&track, &config);
        assert_ne!(states[0], states[1]);
        assert_eq!(states[0].duration_bucket, Some(0));
        assert_eq!(states[1].duration_bucket, Some(2));
    }

    #[test]
    fn pitch_names() {
        assert_eq!(pitch_name(60), "C4");
        assert_eq!(pitch_name(61), "C#4");
        assert_eq!(pitch_name(69), "A4");
        assert_eq!(State::pitch(60).to_string(), "C4");
        assert_eq!(State::rest().to_string(), "rest");
    }
}
