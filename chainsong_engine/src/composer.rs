// Caller-facing orchestration: learn per-track models, report analysis,
// generate new tracks.
//
// A Composer owns one learned bundle per named track. Bundles are
// independent and immutable once learned, so a caller may analyze or
// generate from different tracks on different threads; each generation run
// seeds its own PRNG, keeping concurrent runs reproducible and isolated.

use crate::analysis::{self, AnalysisConfig};
use crate::assemble::{AssembleConfig, AttributePools, assemble};
use crate::chain::{ChainConfig, Context, State, TransitionModel, states_of};
use crate::error::{EngineError, Result};
use crate::event::Track;
use crate::generate::{GenerateConfig, generate};
use chainsong_prng::MusicRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything learned from one source track.
#[derive(Debug, Clone)]
pub struct TrackModel {
    pub track: Track,
    pub states: Vec<State>,
    pub model: TransitionModel,
    pub pools: AttributePools,
}

/// The externally observable result of analyzing one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackReport {
    pub notes: usize,
    pub rests: usize,
    /// `None` when the track's chain is not ergodic and the constant is
    /// therefore undefined.
    pub kemeny_constant: Option<f64>,
    /// Mean entropy over the track's non-terminal states, in bits.
    pub entropy: f64,
    pub entropy_timeline: Vec<f64>,
}

/// A request to generate a new track from learned material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Name of the learned track to generate from.
    pub track: String,
    /// Number of musical events to produce.
    pub length: usize,
    /// Optional explicit starting context.
    pub start: Option<Context>,
    /// PRNG seed; a fixed seed reproduces the composition exactly.
    pub seed: u64,
}

/// Orchestrates model learning, analysis, and generation across tracks.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    chain_config: ChainConfig,
    analysis_config: AnalysisConfig,
    assemble_config: AssembleConfig,
    tracks: BTreeMap<String, TrackModel>,
}

impl Composer {
    pub fn new() -> Composer {
        Composer::default()
    }

    pub fn with_configs(
        chain: ChainConfig,
        analysis: AnalysisConfig,
        assemble: AssembleConfig,
    ) -> Composer {
        Composer {
            chain_config: chain,
            analysis_config: analysis,
            assemble_config: assemble,
            tracks: BTreeMap::new(),
        }
    }

    /// Learn a transition model and attribute pools from a track and store
    /// them under `name`. A track too short to learn from is rejected with
    /// `EmptyModel` and nothing is stored.
    pub fn learn_track(&mut self, name: &str, track: Track) -> Result<()> {
        let states = states_of(&track, &self.chain_config);
        let model = TransitionModel::build(&states, &self.chain_config)?;
        let pools = AttributePools::collect(&track, &self.chain_config);
        self.tracks.insert(
            name.to_string(),
            TrackModel {
                track,
                states,
                model,
                pools,
            },
        );
        Ok(())
    }

    /// Names of all learned tracks.
    pub fn track_names(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(|s| s.as_str())
    }

    /// The learned bundle for one track.
    pub fn track_model(&self, name: &str) -> Option<&TrackModel> {
        self.tracks.get(name)
    }

    /// Analyze one learned track.
    pub fn analyze(&self, name: &str) -> Result<TrackReport> {
        let learned = self
            .tracks
            .get(name)
            .ok_or_else(|| EngineError::UnknownState(format!("no learned track named {name:?}")))?;
        let result = analysis::analyze(&learned.model, &learned.states, &self.analysis_config)?;
        Ok(TrackReport {
            notes: learned.track.notes().count(),
            rests: learned.track.rests().count(),
            kemeny_constant: result.kemeny_constant,
            entropy: result.mean_entropy,
            entropy_timeline: result.entropy_timeline,
        })
    }

    /// Analyze every learned track, keyed by track name.
    pub fn analyze_all(&self) -> Result<BTreeMap<String, TrackReport>> {
        let mut reports = BTreeMap::new();
        for name in self.tracks.keys() {
            reports.insert(name.clone(), self.analyze(name)?);
        }
        Ok(reports)
    }

    /// Generate a new track in the style of a learned one.
    ///
    /// Fails with `UnknownState` for an unlearned track name, and with
    /// `UnknownSeedState` when the request names a starting context the
    /// model has never seen.
    pub fn generate(&self, request: &GenerationRequest) -> Result<Track> {
        let learned = self.tracks.get(&request.track).ok_or_else(|| {
            EngineError::UnknownState(format!("no learned track named {:?}", request.track))
        })?;

        let mut rng = MusicRng::new(request.seed);
        let states = generate(
            &learned.model,
            &GenerateConfig {
                length: request.length,
                start: request.start.clone(),
            },
            &mut rng,
        )?;
        assemble(&states, &learned.pools, &self.assemble_config, &mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MusicalEvent;

    fn melody_track() -> Track {
        // C major noodling with one rest, long enough to learn from.
        let pitches = [60u8, 62, 64, 62, 60, 62, 64, 67, 64, 62, 60, 64, 62, 60];
        let mut events = Vec::new();
        let mut onset = 0.0;
        for (i, &pitch) in pitches.iter().enumerate() {
            events.push(MusicalEvent::Note {
                pitch,
                velocity: 64 + (i % 3) as u8,
                duration: 0.25,
                onset,
            });
            onset += 0.25;
            if i == 6 {
                events.push(MusicalEvent::Rest {
                    duration: 0.5,
                    onset,
                });
                onset += 0.5;
            }
        }
        Track::from_events(events).unwrap()
    }

    #[test]
    fn learn_and_report() {
        let mut composer = Composer::new();
        composer.learn_track("melody", melody_track()).unwrap();

        let report = composer.analyze("melody").unwrap();
        assert_eq!(report.notes, 14);
        assert_eq!(report.rests, 1);
        assert!(report.entropy >= 0.0);

        let all = composer.analyze_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("melody"));
    }

    #[test]
    fn generation_is_seed_reproducible() {
        let mut composer = Composer::new();
        composer.learn_track("melody", melody_track()).unwrap();

        let request = GenerationRequest {
            track: "melody".to_string(),
            length: 30,
            start: None,
            seed: 99,
        };
        let a = composer.generate(&request).unwrap();
        let b = composer.generate(&request).unwrap();
        assert_eq!(a.events(), b.events());
        assert!(!a.is_empty());
    }

    #[test]
    fn unknown_track_is_rejected() {
        let composer = Composer::new();
        assert!(matches!(
            composer.analyze("nope"),
            Err(EngineError::UnknownState(_))
        ));
        let request = GenerationRequest {
            track: "nope".to_string(),
            length: 5,
            start: None,
            seed: 0,
        };
        assert!(matches!(
            composer.generate(&request),
            Err(EngineError::UnknownState(_))
        ));
    }

    #[test]
    fn degenerate_track_is_rejected_at_learn_time() {
        let mut composer = Composer::new();
        let tiny = Track::from_events(vec![MusicalEvent::Note {
            pitch: 60,
            velocity: 64,
            duration: 0.25,
            onset: 0.0,
        }])
        .unwrap();
        assert!(matches!(
            composer.learn_track("tiny", tiny),
            Err(EngineError::EmptyModel(_))
        ));
        assert_eq!(composer.track_names().count(), 0);
    }

    #[test]
    fn explicit_start_context_is_honored() {
        let mut composer = Composer::new();
        composer.learn_track("melody", melody_track()).unwrap();
        let request = GenerationRequest {
            track: "melody".to_string(),
            length: 10,
            start: Some(vec![State::pitch(67)]),
            seed: 5,
        };
        let track = composer.generate(&request).unwrap();
        // 67 only ever goes to 64 in the source.
        match track.events()[0] {
            MusicalEvent::Note { pitch, .. } => assert_eq!(pitch, 64),
            _ => panic!("expected a note"),
        }
    }

    #[test]
    fn models_are_shared_across_threads_for_concurrent_runs() {
        let mut composer = Composer::new();
        composer.learn_track("melody", melody_track()).unwrap();
        let composer = &composer;

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4u64)
                .map(|seed| {
                    scope.spawn(move || {
                        let request = GenerationRequest {
                            track: "melody".to_string(),
                            length: 20,
                            start: None,
                            seed,
                        };
                        composer.generate(&request).unwrap()
                    })
                })
                .collect();
            let tracks: Vec<Track> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            // Same seeds generated on one thread must agree.
            for (seed, track) in tracks.iter().enumerate() {
                let request = GenerationRequest {
                    track: "melody".to_string(),
                    length: 20,
                    start: None,
                    seed: seed as u64,
                };
                assert_eq!(composer.generate(&request).unwrap().events(), track.events());
            }
        });
    }
}
