// Chain analysis: entropy, stationary distribution, Kemeny constant.
//
// Everything here is a read-only derivation over a frozen TransitionModel.
// Results are recomputed on request and never cached inside the model, so
// the model stays side-effect-free and safely shared across threads.
//
// The chain analyzed is the one the model actually defines: for order k
// the states of that chain are the length-k context windows, and a
// transition shifts the window by one sampled state. For k = 1 this
// degenerates to the plain state-to-state chain.
//
// Numerical notes:
// - the stationary distribution comes from power iteration of the lazy
//   chain (I + P) / 2, which has the same stationary vector as P but never
//   oscillates on periodic chains;
// - the Kemeny constant uses the fundamental-matrix identity
//   K = trace(Z) - 1 with Z solving (I - P + Pi) Z = I, computed with the
//   dense solver in linalg.rs;
// - both iterative steps carry hard caps and fail with
//   NumericalNonConvergence instead of spinning.

use crate::chain::{Context, Row, State, TransitionModel, context_label};
use crate::error::{EngineError, Result};
use crate::linalg::{Matrix, total_variation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Power iteration stops when successive vectors are closer than this in
/// total variation distance.
const POWER_TOLERANCE: f64 = 1e-10;

/// Analysis policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sliding-window size for the entropy timeline, in events.
    pub entropy_window: usize,
    /// Hard cap on power-iteration steps.
    pub max_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            entropy_window: 16,
            max_iterations: 10_000,
        }
    }
}

/// The stationary distribution of a model's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationaryDistribution {
    /// Long-run visitation probability per context. Contexts outside the
    /// analyzed component carry exactly 0.0.
    pub probabilities: Vec<(Context, f64)>,
    /// True when the chain was reducible and the iteration was restricted
    /// to the communicating component containing the most-visited context,
    /// with the remainder assigned zero mass.
    pub restricted: bool,
    /// Power-iteration steps taken.
    pub iterations: usize,
}

/// A read-only analysis snapshot of one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Shannon entropy (bits) of each context's outgoing distribution.
    /// Terminal contexts have entropy 0.
    pub per_state_entropy: Vec<(Context, f64)>,
    /// Mean entropy over contexts with observed outgoing transitions.
    pub mean_entropy: f64,
    /// Local entropy over sliding windows of the source sequence.
    pub entropy_timeline: Vec<f64>,
    pub stationary: StationaryDistribution,
    /// `None` exactly when the chain is not ergodic, in which case the
    /// Kemeny constant is undefined.
    pub kemeny_constant: Option<f64>,
}

/// Shannon entropy in bits of one outgoing distribution: -sum p log2 p
/// over nonzero p. Zero for an empty (terminal) row and for a point mass.
pub fn state_entropy(row: &Row) -> f64 {
    let mut h = 0.0;
    for &p in row.values() {
        if p > 0.0 {
            h -= p * p.log2();
        }
    }
    // -0.0 from a point mass normalizes to 0.0.
    h.max(0.0)
}

/// Mean entropy over all non-terminal contexts of the model.
pub fn mean_entropy(model: &TransitionModel) -> f64 {
    let mut total = 0.0;
    let mut rows = 0usize;
    for context in model.contexts() {
        if let Some(row) = model.row(context) {
            total += state_entropy(row);
            rows += 1;
        }
    }
    if rows == 0 { 0.0 } else { total / rows as f64 }
}

/// Entropy of the empirical transition distribution inside each sliding
/// window of `window` consecutive events.
///
/// Produces `len - window + 1` values; empty when the sequence is shorter
/// than `window + 1` events. Only transitions strictly inside a window
/// count toward that window's distribution.
pub fn entropy_timeline(states: &[State], window: usize) -> Vec<f64> {
    if window < 2 || states.len() < window + 1 {
        return Vec::new();
    }
    let mut timeline = Vec::with_capacity(states.len() - window + 1);
    for start in 0..=states.len() - window {
        let slice = &states[start..start + window];
        let mut pair_counts: BTreeMap<(State, State), u64> = BTreeMap::new();
        for pair in slice.windows(2) {
            *pair_counts.entry((pair[0], pair[1])).or_insert(0) += 1;
        }
        let total = (window - 1) as f64;
        let mut h = 0.0;
        for &count in pair_counts.values() {
            let p = count as f64 / total;
            h -= p * p.log2();
        }
        timeline.push(h.max(0.0));
    }
    timeline
}

/// Compute the stationary distribution of the model's chain.
///
/// Power iteration from a uniform vector until the change drops below the
/// total-variation tolerance. For a reducible chain the iteration is
/// restricted to the strongly connected component containing the
/// most-visited context; everything else gets zero mass and the result is
/// flagged `restricted`.
pub fn stationary_distribution(
    model: &TransitionModel,
    config: &AnalysisConfig,
) -> Result<StationaryDistribution> {
    let chain = IndexedChain::from_model(model);
    let n = chain.contexts.len();
    if n == 0 {
        return Err(EngineError::EmptyModel(
            "no contexts to analyze".to_string(),
        ));
    }

    let components = chain.strongly_connected_components();
    let whole = components.len() == 1 && !chain.has_terminal_row();

    let (member_indices, restricted) = if whole {
        ((0..n).collect::<Vec<_>>(), false)
    } else {
        let anchor = chain.most_visited(model);
        let component = components
            .iter()
            .find(|c| c.contains(&anchor))
            .cloned()
            .unwrap_or_else(|| vec![anchor]);
        log::warn!(
            "chain is reducible; restricting stationary distribution to the \
             {}-context component around {}",
            component.len(),
            context_label(&chain.contexts[anchor]),
        );
        (component, true)
    };

    let (pi, iterations) = chain.power_iterate(&member_indices, config.max_iterations)?;

    let mut probabilities: Vec<(Context, f64)> =
        chain.contexts.iter().map(|c| (c.clone(), 0.0)).collect();
    for (local, &global) in member_indices.iter().enumerate() {
        probabilities[global].1 = pi[local];
    }

    Ok(StationaryDistribution {
        probabilities,
        restricted,
        iterations,
    })
}

/// Compute the Kemeny constant of an ergodic chain.
///
/// Solves (I - P + Pi) Z = I, where Pi has every row equal to the
/// stationary vector, and returns trace(Z) - 1. For a reducible or
/// periodic chain the constant is undefined and this returns `NotErgodic`.
pub fn kemeny_constant(model: &TransitionModel, config: &AnalysisConfig) -> Result<f64> {
    let chain = IndexedChain::from_model(model);
    let n = chain.contexts.len();
    if n == 0 {
        return Err(EngineError::EmptyModel(
            "no contexts to analyze".to_string(),
        ));
    }
    chain.require_ergodic()?;

    let all: Vec<usize> = (0..n).collect();
    let (pi, _) = chain.power_iterate(&all, config.max_iterations)?;

    // A = I - P + Pi.
    let mut a = Matrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let identity = if i == j { 1.0 } else { 0.0 };
            a.set(i, j, identity - chain.matrix.get(i, j) + pi[j]);
        }
    }
    let z = a.solve(&Matrix::identity(n))?;
    Ok(z.trace() - 1.0)
}

/// Produce the full read-only analysis snapshot for a model and its source
/// state sequence.
///
/// A non-ergodic chain yields `kemeny_constant: None` rather than a value
/// computed on a degenerate matrix; numerical failures still propagate as
/// errors.
pub fn analyze(
    model: &TransitionModel,
    states: &[State],
    config: &AnalysisConfig,
) -> Result<AnalysisResult> {
    let per_state_entropy: Vec<(Context, f64)> = model
        .contexts()
        .map(|context| {
            let entropy = model.row(context).map(state_entropy).unwrap_or(0.0);
            (context.clone(), entropy)
        })
        .collect();

    let stationary = stationary_distribution(model, config)?;
    let kemeny = match kemeny_constant(model, config) {
        Ok(k) => Some(k),
        Err(EngineError::NotErgodic(_)) => None,
        Err(other) => return Err(other),
    };

    Ok(AnalysisResult {
        per_state_entropy,
        mean_entropy: mean_entropy(model),
        entropy_timeline: entropy_timeline(states, config.entropy_window),
        stationary,
        kemeny_constant: kemeny,
    })
}

/// The model's chain with contexts assigned dense indices, plus its dense
/// transition matrix. Transitions whose shifted context never occurs in
/// the source (possible only with smoothing at order > 1) are dropped and
/// the row renormalized over the known targets.
struct IndexedChain {
    contexts: Vec<Context>,
    matrix: Matrix,
}

impl IndexedChain {
    fn from_model(model: &TransitionModel) -> IndexedChain {
        let contexts: Vec<Context> = model.contexts().cloned().collect();
        let index: BTreeMap<&Context, usize> =
            contexts.iter().enumerate().map(|(i, c)| (c, i)).collect();
        let n = contexts.len();
        let mut matrix = Matrix::zeros(n, n);

        for (i, context) in contexts.iter().enumerate() {
            let Some(row) = model.row(context) else {
                continue; // terminal: all-zero row
            };
            let mut kept = 0.0;
            let mut entries: Vec<(usize, f64)> = Vec::with_capacity(row.len());
            for (&next, &p) in row {
                let mut shifted = context[1..].to_vec();
                shifted.push(next);
                if let Some(&j) = index.get(&shifted) {
                    entries.push((j, p));
                    kept += p;
                }
            }
            if kept > 0.0 {
                for (j, p) in entries {
                    matrix.set(i, j, matrix.get(i, j) + p / kept);
                }
            }
        }
        IndexedChain { contexts, matrix }
    }

    fn has_terminal_row(&self) -> bool {
        (0..self.contexts.len())
            .any(|i| (0..self.contexts.len()).all(|j| self.matrix.get(i, j) == 0.0))
    }

    fn most_visited(&self, model: &TransitionModel) -> usize {
        let mut best = 0;
        let mut best_visits = 0;
        for (i, context) in self.contexts.iter().enumerate() {
            let visits = model.visits(context);
            if visits > best_visits {
                best = i;
                best_visits = visits;
            }
        }
        best
    }

    /// Adjacency lists of the positive-probability digraph.
    fn adjacency(&self) -> Vec<Vec<usize>> {
        let n = self.contexts.len();
        (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| self.matrix.get(i, j) > 0.0)
                    .collect()
            })
            .collect()
    }

    /// Kosaraju's algorithm with explicit stacks.
    fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        let adj = self.adjacency();
        let n = adj.len();

        // Pass 1: finish order.
        let mut finish_order = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        for root in 0..n {
            if visited[root] {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            visited[root] = true;
            while let Some(&mut (node, ref mut edge)) = stack.last_mut() {
                if *edge < adj[node].len() {
                    let next = adj[node][*edge];
                    *edge += 1;
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, 0));
                    }
                } else {
                    finish_order.push(node);
                    stack.pop();
                }
            }
        }

        // Pass 2: reverse graph, components in reverse finish order.
        let mut rev = vec![Vec::new(); n];
        for (u, targets) in adj.iter().enumerate() {
            for &v in targets {
                rev[v].push(u);
            }
        }
        let mut component_of = vec![usize::MAX; n];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for &root in finish_order.iter().rev() {
            if component_of[root] != usize::MAX {
                continue;
            }
            let id = components.len();
            let mut members = Vec::new();
            let mut stack = vec![root];
            component_of[root] = id;
            while let Some(node) = stack.pop() {
                members.push(node);
                for &prev in &rev[node] {
                    if component_of[prev] == usize::MAX {
                        component_of[prev] = id;
                        stack.push(prev);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }

    /// Irreducible (one component spanning every context, no terminal
    /// rows) and aperiodic (graph period 1), or `NotErgodic`.
    fn require_ergodic(&self) -> Result<()> {
        let components = self.strongly_connected_components();
        if components.len() != 1 || self.has_terminal_row() {
            return Err(EngineError::NotErgodic(format!(
                "chain is reducible ({} communicating components)",
                components.len()
            )));
        }
        let period = self.period();
        if period != 1 {
            return Err(EngineError::NotErgodic(format!(
                "chain is periodic with period {period}"
            )));
        }
        Ok(())
    }

    /// Period of a strongly connected chain: the gcd over all edges
    /// (u, v) of level(u) + 1 - level(v) for BFS levels from any root.
    fn period(&self) -> u64 {
        let adj = self.adjacency();
        let n = adj.len();
        let mut level = vec![i64::MIN; n];
        let mut queue = std::collections::VecDeque::new();
        level[0] = 0;
        queue.push_back(0usize);
        while let Some(u) = queue.pop_front() {
            for &v in &adj[u] {
                if level[v] == i64::MIN {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        let mut g: u64 = 0;
        for (u, targets) in adj.iter().enumerate() {
            for &v in targets {
                let diff = (level[u] + 1 - level[v]).unsigned_abs();
                g = gcd(g, diff);
            }
        }
        g.max(1)
    }

    /// Power-iterate the lazy chain (I + P) / 2 restricted to `members`,
    /// with rows renormalized over within-component mass. Returns the
    /// stationary vector over `members` and the iterations taken.
    fn power_iterate(&self, members: &[usize], max_iterations: usize) -> Result<(Vec<f64>, usize)> {
        let m = members.len();
        if m == 1 {
            return Ok((vec![1.0], 0));
        }

        // Restricted, renormalized sub-matrix. A member row with no mass
        // inside the component behaves as a self-loop so the iteration
        // stays a stochastic process.
        let mut sub = Matrix::zeros(m, m);
        for (i, &gi) in members.iter().enumerate() {
            let mass: f64 = members.iter().map(|&gj| self.matrix.get(gi, gj)).sum();
            if mass <= 0.0 {
                sub.set(i, i, 1.0);
                continue;
            }
            for (j, &gj) in members.iter().enumerate() {
                sub.set(i, j, self.matrix.get(gi, gj) / mass);
            }
        }

        let mut pi = vec![1.0 / m as f64; m];
        for iteration in 1..=max_iterations {
            let stepped = sub.vec_mat(&pi);
            // Lazy step: same stationary vector, immune to periodicity.
            let mut next: Vec<f64> = pi
                .iter()
                .zip(stepped.iter())
                .map(|(a, b)| 0.5 * a + 0.5 * b)
                .collect();
            let sum: f64 = next.iter().sum();
            for v in &mut next {
                *v /= sum;
            }
            let delta = total_variation(&pi, &next);
            pi = next;
            if delta < POWER_TOLERANCE {
                return Ok((pi, iteration));
            }
        }
        Err(EngineError::NumericalNonConvergence(format!(
            "power iteration did not converge within {max_iterations} steps"
        )))
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}
