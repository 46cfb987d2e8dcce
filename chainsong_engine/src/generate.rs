// Stochastic sequence generation: a seeded walk over the transition model.
//
// Each step draws exactly one f64 from the caller's PRNG and inverse-CDF
// samples the current context's row. Rows are BTreeMaps, so the cumulative
// walk visits candidates in a fixed order and a fixed seed reproduces the
// generated sequence exactly. The model is only read; the PRNG is the sole
// mutable state, owned by this generation run.

use crate::chain::{Context, Row, State, TransitionModel, context_label};
use crate::error::{EngineError, Result};
use chainsong_prng::MusicRng;
use serde::{Deserialize, Serialize};

/// Generation request parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Number of states to produce. The walk may stop earlier if it
    /// reaches a terminal context.
    pub length: usize,
    /// Explicit starting context. When absent, the start is sampled from
    /// the model's contexts proportionally to their source visitation
    /// counts.
    pub start: Option<Context>,
}

/// Walk the model and produce up to `config.length` states.
pub fn generate(
    model: &TransitionModel,
    config: &GenerateConfig,
    rng: &mut MusicRng,
) -> Result<Vec<State>> {
    if model.is_empty() {
        return Err(EngineError::EmptyModel(
            "model has no states to generate from".to_string(),
        ));
    }

    let mut context: Context = match &config.start {
        Some(start) => {
            if model.visits(start) == 0 {
                return Err(EngineError::UnknownSeedState(context_label(start)));
            }
            start.clone()
        }
        None => sample_start(model, rng),
    };

    let mut output: Vec<State> = Vec::with_capacity(config.length);
    while output.len() < config.length {
        let Some(row) = model.row(&context) else {
            break; // terminal context, end the piece early
        };
        let next = sample_row(row, rng.next_f64());
        output.push(next);
        context.remove(0);
        context.push(next);
    }
    Ok(output)
}

/// Sample a starting context proportionally to how often each context was
/// visited in the source sequence. A context observed more often is more
/// likely to seed generation.
fn sample_start(model: &TransitionModel, rng: &mut MusicRng) -> Context {
    let total: u64 = model.contexts().map(|c| model.visits(c)).sum();
    let mut target = rng.range_u64(0, total.max(1));
    for context in model.contexts() {
        let visits = model.visits(context);
        if target < visits {
            return context.clone();
        }
        target -= visits;
    }
    // Unreachable while visits sum to total; satisfy the compiler with the
    // deterministic first context.
    model
        .contexts()
        .next()
        .cloned()
        .unwrap_or_default()
}

/// Inverse-CDF sampling over one probability row with a single uniform
/// draw in [0, 1).
fn sample_row(row: &Row, draw: f64) -> State {
    let mut cumulative = 0.0;
    let mut last = None;
    for (&state, &p) in row {
        cumulative += p;
        last = Some(state);
        if draw < cumulative {
            return state;
        }
    }
    // Floating-point slack at the top of the CDF: fall back to the final
    // candidate.
    last.unwrap_or_else(State::rest)
}
