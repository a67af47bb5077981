//! Simulated-annealing chain evolver.
//!
//! One chain at a time is grafted onto a fixed layout prefix and evolved
//! until the combined layout reaches zero energy. Stage 1 runs a
//! geometric cooling schedule with Metropolis acceptance: improvements
//! are always kept, regressions survive with probability
//! `exp(-dE / T)`. A cycle that accepts nothing repeats at the same
//! temperature instead of cooling further. Stage 2 reseeds the chain at
//! random and reruns stage 1; face chains skip stage 2 — they carry
//! their own cyclic constraints and a fresh reseed is no better than the
//! first, so a failed face chain reports failure straight back to the
//! planner.

use crate::chains::Chain;
use crate::errors::GenerationError;
use crate::layout::{Layout, LayoutOps};
use crate::planner::RunBudget;
use crate::prng::Pcg32;
use crate::types::AnnealingConfig;

pub struct ChainEvolver<'a> {
    pub ops: &'a LayoutOps<'a>,
    pub config: &'a AnnealingConfig,
    /// Resolved starting temperature (config override or the average
    /// shape size).
    pub initial_temperature: f64,
}

/// What one chain evolution produced. `Stopped` and `Failed` carry the
/// best layout reached, which is partial and usually invalid.
pub enum EvolveOutcome {
    Valid(Layout),
    Stopped(Layout),
    Failed(Layout),
}

enum StageOutcome {
    Valid(Layout),
    Stopped(Layout),
    Exhausted(Layout),
}

impl<'a> ChainEvolver<'a> {
    /// Evolve `chain` on top of `prefix`. `emit` fires for every
    /// accepted perturbation.
    pub fn evolve(
        &self,
        prefix: &Layout,
        chain: &Chain,
        rng: &mut Pcg32,
        budget: &mut RunBudget,
        emit: &mut dyn FnMut(&Layout),
    ) -> Result<EvolveOutcome, GenerationError> {
        let mut seed = self.ops.seed_chain(prefix, &chain.nodes, rng)?;
        if seed.is_valid() {
            return Ok(EvolveOutcome::Valid(seed));
        }

        let mut best = seed.clone();
        let mut failures = 0u32;
        loop {
            match self.cool(&seed, chain, rng, budget, emit)? {
                StageOutcome::Valid(layout) => return Ok(EvolveOutcome::Valid(layout)),
                StageOutcome::Stopped(stage_best) => {
                    if stage_best.total_energy() < best.total_energy() {
                        best = stage_best;
                    }
                    return Ok(EvolveOutcome::Stopped(best));
                }
                StageOutcome::Exhausted(stage_best) => {
                    if stage_best.total_energy() < best.total_energy() {
                        best = stage_best;
                    }
                    failures += 1;
                    if chain.from_face || failures >= self.config.max_stage_two_failures
                    {
                        log::debug!(
                            "chain {} failed after {failures} attempt(s), best energy {}",
                            chain.index,
                            best.total_energy(),
                        );
                        return Ok(EvolveOutcome::Failed(best));
                    }
                    seed = self.ops.seed_chain(prefix, &chain.nodes, rng)?;
                    if seed.is_valid() {
                        return Ok(EvolveOutcome::Valid(seed));
                    }
                }
            }
        }
    }

    /// Stage 1: `cycles` temperature steps of `trials_per_cycle`
    /// perturbations each.
    fn cool(
        &self,
        seed: &Layout,
        chain: &Chain,
        rng: &mut Pcg32,
        budget: &mut RunBudget,
        emit: &mut dyn FnMut(&Layout),
    ) -> Result<StageOutcome, GenerationError> {
        let cfg = self.config;
        let total_trials = cfg.cycles as u64 * cfg.trials_per_cycle as u64;
        let mut current = seed.clone();
        let mut best = current.clone();
        let mut best_energy = best.total_energy();
        let mut stalls = 0u32;
        let mut cycle = 0i32;
        let mut trials = 0u64;

        while trials < total_trials {
            let temperature =
                self.initial_temperature * cfg.cooling_ratio.powi(cycle);
            let mut accepted_any = false;

            let mut in_cycle = 0u32;
            while in_cycle < cfg.trials_per_cycle && trials < total_trials {
                if !budget.tick() {
                    return Ok(StageOutcome::Stopped(best));
                }
                trials += 1;
                in_cycle += 1;

                let candidate = self.ops.perturb(&current, &chain.nodes, rng)?;
                let energy = candidate.total_energy();
                if energy == 0 {
                    emit(&candidate);
                    return Ok(StageOutcome::Valid(candidate));
                }

                let delta = energy - current.total_energy();
                let accepted = delta <= 0
                    || rng.chance((-(delta as f64) / temperature).exp());
                if accepted {
                    current = candidate;
                    accepted_any = true;
                    emit(&current);
                    if energy < best_energy {
                        best_energy = energy;
                        best = current.clone();
                        stalls = 0;
                    } else {
                        stalls += 1;
                    }
                } else {
                    stalls += 1;
                }

                if stalls >= cfg.max_iterations_without_success {
                    // Stalled: fall back to the best layout seen and
                    // reheat.
                    current = best.clone();
                    cycle = 0;
                    stalls = 0;
                }
            }

            if accepted_any {
                cycle += 1;
            }
        }
        Ok(StageOutcome::Exhausted(best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_spaces::ConfigSpaces;
    use crate::energy::ConstraintSet;
    use crate::events::CancellationToken;
    use crate::mapping::LevelMapping;
    use crate::types::{
        GeneratorConfig, LevelDescription, Passage, RoomDef, ShapeDef,
    };

    struct Fixture {
        mapping: LevelMapping,
        spaces: ConfigSpaces,
    }

    impl Fixture {
        fn new(level: &LevelDescription) -> Self {
            let mapping =
                LevelMapping::build(level, &GeneratorConfig::default()).unwrap();
            let spaces =
                ConfigSpaces::build(&mapping.shapes, &mapping.corridor_shape_ids());
            Fixture { mapping, spaces }
        }

        fn ops(&self) -> LayoutOps<'_> {
            LayoutOps {
                mapping: &self.mapping,
                constraints: ConstraintSet::new(&self.mapping, &self.spaces, 0, true),
                throw_on_repeat: false,
            }
        }
    }

    fn triangle_level() -> LevelDescription {
        LevelDescription {
            shapes: vec![
                ShapeDef::rectangle("square_4", 4, 4),
                ShapeDef::rectangle("tall_4x6", 4, 6),
            ],
            rooms: vec![
                RoomDef::room("a", &["square_4", "tall_4x6"]),
                RoomDef::room("b", &["square_4", "tall_4x6"]),
                RoomDef::room("c", &["square_4", "tall_4x6"]),
            ],
            passages: vec![
                Passage::new("a", "b"),
                Passage::new("b", "c"),
                Passage::new("a", "c"),
            ],
            min_room_distance: 0,
        }
    }

    fn face_chain(nodes: &[usize]) -> Chain {
        Chain { index: 0, nodes: nodes.to_vec(), from_face: true }
    }

    #[test]
    fn triangle_chain_reaches_zero_energy() {
        let fixture = Fixture::new(&triangle_level());
        let ops = fixture.ops();
        let config = AnnealingConfig::default();
        let evolver = ChainEvolver {
            ops: &ops,
            config: &config,
            initial_temperature: fixture.spaces.average_size(),
        };
        let mut rng = Pcg32::new(0, 0);
        let mut budget = RunBudget::unbounded();
        let outcome = evolver
            .evolve(
                &Layout::new(3),
                &face_chain(&[0, 1, 2]),
                &mut rng,
                &mut budget,
                &mut |_| {},
            )
            .unwrap();
        match outcome {
            EvolveOutcome::Valid(layout) => {
                assert!(layout.is_valid());
                assert_eq!(layout.placed_count(), 3);
            }
            _ => panic!("triangle chain should evolve to a valid layout"),
        }
    }

    #[test]
    fn evolution_is_deterministic() {
        let fixture = Fixture::new(&triangle_level());
        let ops = fixture.ops();
        let config = AnnealingConfig::default();
        let evolver = ChainEvolver {
            ops: &ops,
            config: &config,
            initial_temperature: fixture.spaces.average_size(),
        };
        let run = || {
            let mut rng = Pcg32::new(3, 0);
            let mut budget = RunBudget::unbounded();
            match evolver
                .evolve(
                    &Layout::new(3),
                    &face_chain(&[0, 1, 2]),
                    &mut rng,
                    &mut budget,
                    &mut |_| {},
                )
                .unwrap()
            {
                EvolveOutcome::Valid(layout) => layout,
                _ => panic!("expected a valid layout"),
            }
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn cancellation_stops_the_chain() {
        let fixture = Fixture::new(&triangle_level());
        let ops = fixture.ops();
        let config = AnnealingConfig::default();
        let evolver = ChainEvolver {
            ops: &ops,
            config: &config,
            initial_temperature: fixture.spaces.average_size(),
        };
        let token = CancellationToken::new();
        token.cancel();
        let mut rng = Pcg32::new(11, 0);
        let mut budget = RunBudget::new(None, None, Some(&token));
        let outcome = evolver
            .evolve(
                &Layout::new(3),
                &face_chain(&[0, 1, 2]),
                &mut rng,
                &mut budget,
                &mut |_| {},
            )
            .unwrap();
        // Either the random seed happened to be valid before the first
        // trial, or the evolver observed the flag and stopped.
        match outcome {
            EvolveOutcome::Stopped(_) | EvolveOutcome::Valid(_) => {}
            EvolveOutcome::Failed(_) => panic!("cancellation must not report failure"),
        }
    }

    #[test]
    fn accepted_perturbations_are_emitted() {
        let fixture = Fixture::new(&triangle_level());
        let ops = fixture.ops();
        let config = AnnealingConfig::default();
        let evolver = ChainEvolver {
            ops: &ops,
            config: &config,
            initial_temperature: fixture.spaces.average_size(),
        };
        let mut rng = Pcg32::new(0, 0);
        let mut budget = RunBudget::unbounded();
        let mut snapshots = 0usize;
        let outcome = evolver
            .evolve(
                &Layout::new(3),
                &face_chain(&[0, 1, 2]),
                &mut rng,
                &mut budget,
                &mut |_| snapshots += 1,
            )
            .unwrap();
        if let EvolveOutcome::Valid(layout) = outcome {
            // The final valid candidate is always emitted unless the
            // very first seed was already valid.
            if budget.iterations() > 0 {
                assert!(snapshots > 0);
            }
            assert!(layout.is_valid());
        }
    }
}
