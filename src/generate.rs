//! Generation pipeline: validate, precompute, plan, convert.

use std::time::{Duration, Instant};

use crate::chains;
use crate::config_spaces::ConfigSpaces;
use crate::convert::to_map_layout;
use crate::energy::ConstraintSet;
use crate::errors::{ConfigError, GenerationError};
use crate::events::{CancellationToken, GenerationObserver, NoopObserver};
use crate::layout::LayoutOps;
use crate::mapping::LevelMapping;
use crate::planner::{Planner, RunBudget};
use crate::prng::Pcg32;
use crate::types::{GeneratorConfig, LevelDescription, MapLayout};

/// A finished generation: the layout plus run accounting.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub layout: MapLayout,
    /// Perturbations performed across all chains and retries.
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Run a full generation with a fresh PCG32 stream seeded from `seed`.
pub fn generate(
    level: &LevelDescription,
    config: &GeneratorConfig,
    seed: u64,
) -> Result<GenerationReport, GenerationError> {
    let mut rng = Pcg32::new(seed, 0);
    generate_with(level, config, &mut rng, &mut NoopObserver, None)
}

/// Run a full generation against an injected PRNG, observer, and
/// optional cancellation token. Two calls with identical inputs and PRNG
/// state produce identical layouts.
pub fn generate_with(
    level: &LevelDescription,
    config: &GeneratorConfig,
    rng: &mut Pcg32,
    observer: &mut dyn GenerationObserver,
    cancel: Option<&CancellationToken>,
) -> Result<GenerationReport, GenerationError> {
    let started = Instant::now();
    if cancel.is_some()
        && (config.early_stop_iterations.is_some() || config.early_stop_ms.is_some())
    {
        return Err(ConfigError::CancellationWithEarlyStop.into());
    }

    let mapping = LevelMapping::build(level, config)?;
    let spaces = ConfigSpaces::build(&mapping.shapes, &mapping.corridor_shape_ids());
    let constraints = ConstraintSet::new(
        &mapping,
        &spaces,
        level.min_room_distance,
        config.optimize_corridor_constraints,
    );
    let ops = LayoutOps {
        mapping: &mapping,
        constraints,
        throw_on_repeat: config.throw_if_repeat_mode_not_satisfied,
    };

    let chain_list = chains::decompose(&mapping.graph, &config.chains);
    log::debug!(
        "planning {} nodes in {} chains ({} from faces)",
        mapping.graph.node_count(),
        chain_list.len(),
        chain_list.iter().filter(|c| c.from_face).count(),
    );

    let planner = Planner {
        ops: &ops,
        chains: &chain_list,
        config,
        initial_temperature: config
            .annealing
            .initial_temperature
            .unwrap_or_else(|| spaces.average_size())
            .max(1.0),
        node_count: mapping.graph.node_count(),
    };
    let mut budget =
        RunBudget::new(config.early_stop_iterations, config.early_stop_ms, cancel);
    let convert = |layout: &crate::layout::Layout| {
        to_map_layout(layout, &mapping, &constraints)
    };

    let layout = planner.run(rng, &mut budget, observer, &convert)?;
    let map = convert(&layout);
    observer.on_valid(&map);
    log::debug!(
        "generation finished after {} perturbations in {:?}",
        budget.iterations(),
        started.elapsed(),
    );
    Ok(GenerationReport {
        layout: map,
        iterations: budget.iterations(),
        elapsed: started.elapsed(),
    })
}

// -----------------------------------------------------------------
// Tests
// -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doors::DoorMode;
    use crate::geometry::{chebyshev_distance, overlap_area, GridPolygon, OrthoLine, Point};
    use crate::types::{Passage, PlacedRoom, RepeatMode, RoomDef, ShapeDef};

    fn square_with_centered_doors() -> ShapeDef {
        ShapeDef {
            doors: DoorMode::Explicit {
                lines: vec![
                    OrthoLine::new(Point::new(1, 0), Point::new(2, 0)),
                    OrthoLine::new(Point::new(4, 1), Point::new(4, 2)),
                    OrthoLine::new(Point::new(1, 4), Point::new(2, 4)),
                    OrthoLine::new(Point::new(0, 1), Point::new(0, 2)),
                ],
            },
            ..ShapeDef::rectangle("square_4", 4, 4)
        }
    }

    fn outline_polygon(room: &PlacedRoom) -> GridPolygon {
        GridPolygon::new(room.outline.clone()).expect("output outline is well-formed")
    }

    fn find_room<'a>(layout: &'a MapLayout, name: &str) -> &'a PlacedRoom {
        layout
            .rooms
            .iter()
            .find(|r| r.room == name)
            .unwrap_or_else(|| panic!("room {name} missing from layout"))
    }

    fn assert_rooms_disjoint(layout: &MapLayout) {
        for i in 0..layout.rooms.len() {
            for j in (i + 1)..layout.rooms.len() {
                let a = outline_polygon(&layout.rooms[i]);
                let b = outline_polygon(&layout.rooms[j]);
                assert_eq!(
                    overlap_area(&a, Point::new(0, 0), &b, Point::new(0, 0)),
                    0,
                    "rooms {} and {} overlap",
                    layout.rooms[i].room,
                    layout.rooms[j].room,
                );
            }
        }
    }

    fn assert_door_on_every_passage(layout: &MapLayout, passages: &[(&str, &str)]) {
        for &(from, to) in passages {
            assert!(
                layout.doors.iter().any(|d| {
                    (d.from == from && d.to == to) || (d.from == to && d.to == from)
                }),
                "no door between {from} and {to}",
            );
        }
    }

    #[test]
    fn two_room_line() {
        let level = LevelDescription {
            shapes: vec![square_with_centered_doors()],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::room("b", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "b")],
            min_room_distance: 0,
        };
        let report = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 2);
        let a = find_room(&report.layout, "a");
        let b = find_room(&report.layout, "b");
        let delta = b.position - a.position;
        let cardinal = [
            Point::new(4, 0),
            Point::new(-4, 0),
            Point::new(0, 4),
            Point::new(0, -4),
        ];
        assert!(cardinal.contains(&delta), "unexpected offset {delta:?}");
        assert_door_on_every_passage(&report.layout, &[("a", "b")]);

        // Deterministic by seed.
        let again = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout, again.layout);
    }

    #[test]
    fn triangle_of_rooms() {
        let level = LevelDescription {
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
                Passage::new("c", "a"),
            ],
            min_room_distance: 0,
        };
        let report = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 3);
        assert_rooms_disjoint(&report.layout);
        assert_door_on_every_passage(
            &report.layout,
            &[("a", "b"), ("b", "c"), ("c", "a")],
        );
    }

    #[test]
    fn corridor_insertion() {
        let level = LevelDescription {
            shapes: vec![
                ShapeDef::rectangle("square_4", 4, 4),
                ShapeDef::rectangle("hall_2x1", 2, 1),
            ],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::corridor("c", &["hall_2x1"]),
                RoomDef::room("b", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "c"), Passage::new("c", "b")],
            min_room_distance: 0,
        };
        let report = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 3);
        let hall = find_room(&report.layout, "c");
        assert_eq!(hall.shape, "hall_2x1");
        assert_rooms_disjoint(&report.layout);
        assert_door_on_every_passage(&report.layout, &[("a", "c"), ("c", "b")]);
    }

    #[test]
    fn minimum_distance_enforcement() {
        let rooms: Vec<RoomDef> = (0..5)
            .map(|i| RoomDef::room(&format!("r{i}"), &["square_4"]))
            .collect();
        let passages: Vec<Passage> = (1..5)
            .map(|i| Passage::new(&format!("r{}", i - 1), &format!("r{i}")))
            .collect();
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms,
            passages,
            min_room_distance: 2,
        };
        let report = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 5);
        assert_rooms_disjoint(&report.layout);
        for i in 0..5usize {
            for j in (i + 2)..5usize {
                let a = find_room(&report.layout, &format!("r{i}"));
                let b = find_room(&report.layout, &format!("r{j}"));
                let gap = chebyshev_distance(
                    &outline_polygon(a),
                    Point::new(0, 0),
                    &outline_polygon(b),
                    Point::new(0, 0),
                );
                assert!(
                    gap >= 2,
                    "rooms r{i} and r{j} are only {gap} apart",
                );
            }
        }
    }

    #[test]
    fn repeat_mode_no_neighbor_repeats() {
        let rooms: Vec<RoomDef> = (0..6)
            .map(|i| RoomDef {
                repeat_mode: RepeatMode::NoImmediate,
                ..RoomDef::room(&format!("r{i}"), &["square_4", "tall_4x6"])
            })
            .collect();
        let passages: Vec<Passage> = (0..6)
            .map(|i| Passage::new(&format!("r{i}"), &format!("r{}", (i + 1) % 6)))
            .collect();
        let level = LevelDescription {
            shapes: vec![
                ShapeDef::rectangle("square_4", 4, 4),
                ShapeDef::rectangle("tall_4x6", 4, 6),
            ],
            rooms,
            passages: passages.clone(),
            min_room_distance: 0,
        };
        let report = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 6);
        for passage in &passages {
            let a = find_room(&report.layout, &passage.from);
            let b = find_room(&report.layout, &passage.to);
            assert_ne!(
                a.shape, b.shape,
                "{} and {} repeat shape {}",
                passage.from, passage.to, a.shape,
            );
        }
    }

    #[test]
    fn early_stopping_cuts_generation_short() {
        let rooms: Vec<RoomDef> = (0..20)
            .map(|i| RoomDef::room(&format!("r{i}"), &["square_4"]))
            .collect();
        let passages: Vec<Passage> = (1..20)
            .map(|i| Passage::new(&format!("r{}", i - 1), &format!("r{i}")))
            .collect();
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms,
            passages,
            min_room_distance: 0,
        };
        let config = GeneratorConfig {
            early_stop_iterations: Some(10),
            ..GeneratorConfig::default()
        };
        match generate(&level, &config, 0) {
            Err(GenerationError::IterationBudgetExceeded(10)) => {}
            Ok(report) => {
                // Only reachable when every chain seeded validly within
                // the budget.
                assert!(report.iterations <= 10);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn identical_runs_are_byte_identical() {
        let level = LevelDescription {
            shapes: vec![
                ShapeDef::rectangle("square_4", 4, 4),
                ShapeDef::rectangle("tall_4x6", 4, 6),
            ],
            rooms: vec![
                RoomDef::room("a", &["square_4", "tall_4x6"]),
                RoomDef::room("b", &["square_4", "tall_4x6"]),
                RoomDef::room("c", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "b"), Passage::new("b", "c")],
            min_room_distance: 0,
        };
        let first = generate(&level, &GeneratorConfig::default(), 7).unwrap();
        let second = generate(&level, &GeneratorConfig::default(), 7).unwrap();
        assert_eq!(
            serde_json::to_string(&first.layout).unwrap(),
            serde_json::to_string(&second.layout).unwrap(),
        );
    }

    #[test]
    fn different_seeds_usually_differ() {
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::room("b", &["square_4"]),
                RoomDef::room("c", &["square_4"]),
                RoomDef::room("d", &["square_4"]),
            ],
            passages: vec![
                Passage::new("a", "b"),
                Passage::new("b", "c"),
                Passage::new("c", "d"),
            ],
            min_room_distance: 0,
        };
        let layouts: Vec<String> = (0..4u64)
            .map(|seed| {
                let report = generate(&level, &GeneratorConfig::default(), seed).unwrap();
                serde_json::to_string(&report.layout).unwrap()
            })
            .collect();
        assert!(
            layouts.iter().any(|l| l != &layouts[0]),
            "four seeds produced identical layouts",
        );
    }

    #[test]
    fn cancellation_conflicts_with_early_stop() {
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms: vec![RoomDef::room("a", &["square_4"])],
            passages: vec![],
            min_room_distance: 0,
        };
        let config = GeneratorConfig {
            early_stop_iterations: Some(100),
            ..GeneratorConfig::default()
        };
        let token = CancellationToken::new();
        let mut rng = Pcg32::new(0, 0);
        let err = generate_with(
            &level,
            &config,
            &mut rng,
            &mut NoopObserver,
            Some(&token),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Config(ConfigError::CancellationWithEarlyStop)
        ));
    }

    #[test]
    fn observer_sees_partial_and_final_layouts() {
        #[derive(Default)]
        struct Recorder {
            partials: usize,
            valids: usize,
        }
        impl GenerationObserver for Recorder {
            fn wants_perturbed(&self) -> bool {
                true
            }
            fn on_perturbed(&mut self, layout: &MapLayout) {
                // Perturbation snapshots are partial but well-formed.
                assert!(layout.rooms.len() <= 3);
            }
            fn on_partial_valid(&mut self, layout: &MapLayout) {
                assert!(!layout.rooms.is_empty());
                self.partials += 1;
            }
            fn on_valid(&mut self, _layout: &MapLayout) {
                self.valids += 1;
            }
        }

        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::room("b", &["square_4"]),
                RoomDef::room("c", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "b"), Passage::new("b", "c")],
            min_room_distance: 0,
        };
        let mut recorder = Recorder::default();
        let mut rng = Pcg32::new(0, 0);
        generate_with(
            &level,
            &GeneratorConfig::default(),
            &mut rng,
            &mut recorder,
            None,
        )
        .unwrap();
        assert_eq!(recorder.valids, 1);
        assert!(recorder.partials >= 1);
    }

    #[test]
    fn single_room_level() {
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms: vec![RoomDef::room("only", &["square_4"])],
            passages: vec![],
            min_room_distance: 0,
        };
        let report = generate(&level, &GeneratorConfig::default(), 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 1);
        assert!(report.layout.doors.is_empty());
    }

    #[test]
    fn corridors_planned_inline_when_optimization_off() {
        let level = LevelDescription {
            shapes: vec![
                ShapeDef::rectangle("square_4", 4, 4),
                ShapeDef::rectangle("hall_2x1", 2, 1),
            ],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::corridor("c", &["hall_2x1"]),
                RoomDef::room("b", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "c"), Passage::new("c", "b")],
            min_room_distance: 0,
        };
        let config = GeneratorConfig {
            optimize_corridor_constraints: false,
            ..GeneratorConfig::default()
        };
        let report = generate(&level, &config, 0).unwrap();
        assert_eq!(report.layout.rooms.len(), 3);
        assert_rooms_disjoint(&report.layout);
        assert_door_on_every_passage(&report.layout, &[("a", "c"), ("c", "b")]);
    }
}
