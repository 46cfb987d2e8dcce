// Track assembly: generated states back into a playable Track.
//
// A state only captures an event's discretized identity, so the attributes
// it dropped (duration, velocity) are synthesized by sampling from the
// empirical pool of values observed for that state in the source track.
// States with no observations fall back to configured defaults; this can
// only happen for attributes a smoothed model invented, or when assembling
// against pools from a different track.
//
// Onsets accumulate from the synthesized durations, so the assembled Track
// satisfies the ordering invariant by construction.

use crate::chain::{ChainConfig, State, states_of};
use crate::error::Result;
use crate::event::{MusicalEvent, Track};
use chainsong_prng::MusicRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fallback attributes for states with no empirical observations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssembleConfig {
    /// Duration, in seconds, for a state with an empty duration pool.
    pub default_duration: f64,
    /// Velocity for a note state with an empty velocity pool.
    pub default_velocity: u8,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        AssembleConfig {
            default_duration: 0.5,
            default_velocity: 64,
        }
    }
}

/// Per-state empirical attribute distributions gathered from a source
/// track, in source order. Immutable once collected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributePools {
    durations: Vec<(State, Vec<f64>)>,
    velocities: Vec<(State, Vec<u8>)>,
}

impl AttributePools {
    /// Gather the observed durations and velocities for every state of
    /// the track, using the same state derivation as the chain builder.
    pub fn collect(track: &Track, config: &ChainConfig) -> AttributePools {
        let states = states_of(track, config);
        let mut durations: BTreeMap<State, Vec<f64>> = BTreeMap::new();
        let mut velocities: BTreeMap<State, Vec<u8>> = BTreeMap::new();

        for (state, event) in states.iter().zip(track.events()) {
            durations.entry(*state).or_default().push(event.duration());
            if let MusicalEvent::Note { velocity, .. } = *event {
                velocities.entry(*state).or_default().push(velocity);
            }
        }
        AttributePools {
            durations: durations.into_iter().collect(),
            velocities: velocities.into_iter().collect(),
        }
    }

    fn durations_for(&self, state: &State) -> Option<&[f64]> {
        self.durations
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, pool)| pool.as_slice())
    }

    fn velocities_for(&self, state: &State) -> Option<&[u8]> {
        self.velocities
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, pool)| pool.as_slice())
    }
}

/// Map a generated state sequence to musical events with synthesized
/// attributes and cumulative onsets.
pub fn assemble(
    states: &[State],
    pools: &AttributePools,
    config: &AssembleConfig,
    rng: &mut MusicRng,
) -> Result<Track> {
    let mut events = Vec::with_capacity(states.len());
    let mut onset = 0.0f64;

    for state in states {
        let duration = match pools.durations_for(state) {
            Some(pool) if !pool.is_empty() => *rng.choose(pool),
            _ => config.default_duration,
        };
        let event = match state.kind {
            crate::chain::StateKind::Pitch(pitch) => {
                let velocity = match pools.velocities_for(state) {
                    Some(pool) if !pool.is_empty() => *rng.choose(pool),
                    _ => config.default_velocity,
                };
                MusicalEvent::Note {
                    pitch,
                    velocity,
                    duration,
                    onset,
                }
            }
            crate::chain::StateKind::Rest => MusicalEvent::Rest { duration, onset },
        };
        onset += duration;
        events.push(event);
    }
    Track::from_events(events)
}
