//! Constraint set and incremental energy model.
//!
//! Every placed node carries an `EnergyData` block with one slot per
//! constraint family. A layout is valid exactly when every slot of every
//! placed node is zero. Slots are additive over placed pairs, which is
//! what makes incremental updates possible: when one node moves, every
//! other node's block changes only by the difference of the two pairwise
//! contributions involving the moved node.

use crate::config_spaces::ConfigSpaces;
use crate::geometry::{chebyshev_distance, overlap_area, Point};
use crate::layout::{Configuration, Layout};
use crate::mapping::LevelMapping;

/// Per-node energy bookkeeping. All slots are non-negative; a negative
/// intermediate value means a stale incremental update, which is a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnergyData {
    /// Overlap area with other placed polygons.
    pub overlap: i64,
    /// L1 gap between each disconnected direct neighbor and the nearest
    /// connecting offset.
    pub move_distance: i64,
    /// L1 gap left by corridor edges whose corridor cannot currently fit.
    pub corridor_gap: i64,
    /// Minimum-distance shortfall against non-adjacent rooms.
    pub proximity: i64,
}

impl EnergyData {
    pub fn total(&self) -> i64 {
        self.overlap + self.move_distance + self.corridor_gap + self.proximity
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    fn checked_add(self, rhs: EnergyData, context: &str) -> EnergyData {
        let out = EnergyData {
            overlap: self.overlap + rhs.overlap,
            move_distance: self.move_distance + rhs.move_distance,
            corridor_gap: self.corridor_gap + rhs.corridor_gap,
            proximity: self.proximity + rhs.proximity,
        };
        assert!(
            out.overlap >= 0
                && out.move_distance >= 0
                && out.corridor_gap >= 0
                && out.proximity >= 0,
            "energy went negative ({context}): {out:?}"
        );
        out
    }

    fn negated(self) -> EnergyData {
        EnergyData {
            overlap: -self.overlap,
            move_distance: -self.move_distance,
            corridor_gap: -self.corridor_gap,
            proximity: -self.proximity,
        }
    }
}

/// The active constraints of one generation, borrowing the immutable
/// precomputed state.
#[derive(Clone, Copy)]
pub struct ConstraintSet<'a> {
    mapping: &'a LevelMapping,
    spaces: &'a ConfigSpaces,
    min_distance: i32,
    /// Skip the non-neighbor overlap penalty when one side is a corridor.
    corridor_overlap_exempt: bool,
}

impl<'a> ConstraintSet<'a> {
    pub fn new(
        mapping: &'a LevelMapping,
        spaces: &'a ConfigSpaces,
        min_distance: i32,
        corridor_overlap_exempt: bool,
    ) -> Self {
        ConstraintSet { mapping, spaces, min_distance, corridor_overlap_exempt }
    }

    pub fn spaces(&self) -> &'a ConfigSpaces {
        self.spaces
    }

    /// Full evaluation of `node` holding `config` against every other
    /// placed node. Pure: the layout is not modified.
    pub fn compute(&self, layout: &Layout, node: usize, config: &Configuration) -> EnergyData {
        let mut data = EnergyData::default();
        for other in layout.placed_nodes() {
            if other == node {
                continue;
            }
            let other_cfg = layout.get(other).expect("placed node has a configuration");
            data = data.checked_add(
                self.pair_terms(node, config, other, other_cfg),
                "compute",
            );
        }
        data
    }

    /// Incremental re-evaluation of `node` (whose own configuration is
    /// unchanged) after `perturbed` moved from `old` to `new`.
    pub fn update(
        &self,
        node: usize,
        node_cfg: &Configuration,
        perturbed: usize,
        old: Option<&Configuration>,
        new: &Configuration,
        data: EnergyData,
    ) -> EnergyData {
        let mut out = data;
        if let Some(old_cfg) = old {
            out = out.checked_add(
                self.pair_terms(node, node_cfg, perturbed, old_cfg).negated(),
                "update/remove-old",
            );
        }
        out.checked_add(self.pair_terms(node, node_cfg, perturbed, new), "update/add-new")
    }

    /// Contribution of placed node `other` to the energy of `node`.
    fn pair_terms(
        &self,
        node: usize,
        cfg: &Configuration,
        other: usize,
        other_cfg: &Configuration,
    ) -> EnergyData {
        let mut data = EnergyData::default();
        let shape = &self.mapping.shapes[cfg.shape];
        let other_shape = &self.mapping.shapes[other_cfg.shape];
        let area = overlap_area(
            &shape.polygon,
            cfg.position,
            &other_shape.polygon,
            other_cfg.position,
        );

        let graph = &self.mapping.graph;
        match graph.edge_between(node, other) {
            Some(edge) => {
                data.overlap = area;
                match edge.corridor {
                    None => {
                        // Direct passage: the pair must sit at a
                        // configuration-space offset of each other.
                        let space = self.spaces.get(other_cfg.shape, cfg.shape);
                        let delta = cfg.position - other_cfg.position;
                        if !space.contains(delta) {
                            data.move_distance = space
                                .nearest_l1(delta)
                                .unwrap_or_else(|| delta.l1_norm() + 1);
                        }
                    }
                    Some(corridor) => {
                        data.corridor_gap =
                            self.corridor_gap(corridor, other_cfg, cfg);
                    }
                }
            }
            None => {
                let either_corridor = self.node_is_corridor(node)
                    || self.node_is_corridor(other);
                if area > 0 {
                    if !(self.corridor_overlap_exempt && either_corridor) {
                        data.overlap = area;
                    }
                } else if self.min_distance > 0 && !either_corridor {
                    let gap = chebyshev_distance(
                        &shape.polygon,
                        cfg.position,
                        &other_shape.polygon,
                        other_cfg.position,
                    );
                    data.proximity = (self.min_distance - gap).max(0) as i64;
                }
            }
        }
        data
    }

    fn node_is_corridor(&self, plan_node: usize) -> bool {
        self.mapping.is_corridor[self.mapping.graph.nodes[plan_node]]
    }

    /// Smallest L1 gap between the required endpoint offset and any
    /// reachable two-hop offset through the corridor. Zero means some
    /// corridor placement connects both ends.
    fn corridor_gap(
        &self,
        corridor: usize,
        from_cfg: &Configuration,
        to_cfg: &Configuration,
    ) -> i64 {
        let required = to_cfg.position - from_cfg.position;
        let mut best: Option<i64> = None;
        for &via in &self.mapping.room_shapes[corridor] {
            let Some(space) = self.spaces.two_hop(from_cfg.shape, via, to_cfg.shape)
            else {
                continue;
            };
            if let Some(gap) = space.nearest_l1(required) {
                if gap == 0 {
                    return 0;
                }
                best = Some(best.map_or(gap, |b| b.min(gap)));
            }
        }
        best.unwrap_or_else(|| required.l1_norm() + 1)
    }

    /// Candidate corridor offsets (relative to `from_cfg`) that connect
    /// both ends, per corridor shape, in deterministic order. Used at
    /// conversion time to realize corridor rooms.
    pub fn corridor_placements(
        &self,
        corridor: usize,
        from_cfg: &Configuration,
        to_cfg: &Configuration,
    ) -> Vec<(usize, Point)> {
        let required = to_cfg.position - from_cfg.position;
        let mut out = Vec::new();
        for &corridor_shape in &self.mapping.room_shapes[corridor] {
            let first_leg = self.spaces.get(from_cfg.shape, corridor_shape);
            let second_leg = self.spaces.get(corridor_shape, to_cfg.shape);
            for &step in first_leg.offsets() {
                if second_leg.contains(required - step) {
                    out.push((corridor_shape, from_cfg.position + step));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_spaces::ConfigSpaces;
    use crate::layout::Layout;
    use crate::mapping::LevelMapping;
    use crate::types::{
        GeneratorConfig, LevelDescription, Passage, RoomDef, ShapeDef,
    };

    fn two_room_level() -> (LevelMapping, ConfigSpaces) {
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::room("b", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "b")],
            min_room_distance: 0,
        };
        let mapping = LevelMapping::build(&level, &GeneratorConfig::default()).unwrap();
        let spaces = ConfigSpaces::build(&mapping.shapes, &mapping.corridor_shape_ids());
        (mapping, spaces)
    }

    fn config_at(shape: usize, x: i32, y: i32) -> Configuration {
        Configuration::new(shape, Point::new(x, y))
    }

    #[test]
    fn connected_neighbors_have_zero_energy() {
        let (mapping, spaces) = two_room_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(2);
        layout.insert(0, config_at(0, 0, 0));
        let cfg_b = config_at(0, 4, 0);
        let data = constraints.compute(&layout, 1, &cfg_b);
        assert!(data.is_zero(), "{data:?}");
    }

    #[test]
    fn overlapping_neighbors_pay_area() {
        let (mapping, spaces) = two_room_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(2);
        layout.insert(0, config_at(0, 0, 0));
        let cfg_b = config_at(0, 2, 0);
        let data = constraints.compute(&layout, 1, &cfg_b);
        assert_eq!(data.overlap, 8);
        assert!(data.move_distance > 0);
    }

    #[test]
    fn disconnected_neighbors_pay_move_distance() {
        let (mapping, spaces) = two_room_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(2);
        layout.insert(0, config_at(0, 0, 0));
        let cfg_b = config_at(0, 7, 0);
        let data = constraints.compute(&layout, 1, &cfg_b);
        assert_eq!(data.overlap, 0);
        assert_eq!(data.move_distance, 3);
    }

    #[test]
    fn update_matches_recompute() {
        let (mapping, spaces) = two_room_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(2);
        let mut cfg_a = config_at(0, 0, 0);
        cfg_a.energy = constraints.compute(&layout, 0, &cfg_a);
        layout.insert(0, cfg_a.clone());

        let old_b = config_at(0, 7, 0);
        layout.insert(1, old_b.clone());
        let moved_b = config_at(0, 4, 0);

        let incremental =
            constraints.update(0, &cfg_a, 1, Some(&old_b), &moved_b, {
                constraints.compute(&layout, 0, &cfg_a)
            });

        let mut fresh_layout = Layout::new(2);
        fresh_layout.insert(1, moved_b);
        let fresh = constraints.compute(&fresh_layout, 0, &cfg_a);
        assert_eq!(incremental, fresh);
    }

    fn min_distance_level() -> (LevelMapping, ConfigSpaces) {
        let level = LevelDescription {
            shapes: vec![ShapeDef::rectangle("square_4", 4, 4)],
            rooms: vec![
                RoomDef::room("a", &["square_4"]),
                RoomDef::room("b", &["square_4"]),
                RoomDef::room("c", &["square_4"]),
            ],
            passages: vec![Passage::new("a", "b"), Passage::new("b", "c")],
            min_room_distance: 2,
        };
        let mapping = LevelMapping::build(&level, &GeneratorConfig::default()).unwrap();
        let spaces = ConfigSpaces::build(&mapping.shapes, &mapping.corridor_shape_ids());
        (mapping, spaces)
    }

    #[test]
    fn close_non_neighbors_pay_proximity() {
        let (mapping, spaces) = min_distance_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 2, true);
        let mut layout = Layout::new(3);
        layout.insert(0, config_at(0, 0, 0));
        layout.insert(1, config_at(0, 4, 0));
        // `c` one cell right of `b`'s far wall: Chebyshev gap to `a` is
        // only 1, shortfall 1 against the threshold of 2.
        let cfg_c = config_at(0, 5, 0);
        let data = constraints.compute(&layout, 2, &cfg_c);
        assert_eq!(data.proximity, 1);
    }

    #[test]
    fn far_non_neighbors_pay_nothing() {
        let (mapping, spaces) = min_distance_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 2, true);
        let mut layout = Layout::new(3);
        layout.insert(0, config_at(0, 0, 0));
        layout.insert(1, config_at(0, 4, 0));
        let cfg_c = config_at(0, 8, 0);
        let data = constraints.compute(&layout, 2, &cfg_c);
        assert_eq!(data.proximity, 0);
        assert!(data.is_zero());
    }

    #[test]
    fn overlapping_non_neighbors_pay_overlap() {
        let (mapping, spaces) = min_distance_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(3);
        layout.insert(0, config_at(0, 0, 0));
        layout.insert(1, config_at(0, 4, 0));
        let cfg_c = config_at(0, 1, 1);
        let data = constraints.compute(&layout, 2, &cfg_c);
        assert!(data.overlap > 0);
    }

    fn corridor_level() -> (LevelMapping, ConfigSpaces) {
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
        let mapping = LevelMapping::build(&level, &GeneratorConfig::default()).unwrap();
        let spaces = ConfigSpaces::build(&mapping.shapes, &mapping.corridor_shape_ids());
        (mapping, spaces)
    }

    #[test]
    fn corridor_gap_zero_when_corridor_fits() {
        let (mapping, spaces) = corridor_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(2);
        layout.insert(0, config_at(0, 0, 0));
        // Rooms 6 apart horizontally: the 2x1 hall bridges them.
        let cfg_b = config_at(0, 6, 0);
        let data = constraints.compute(&layout, 1, &cfg_b);
        assert_eq!(data.corridor_gap, 0, "{data:?}");
        assert!(data.is_zero());
    }

    #[test]
    fn corridor_gap_positive_when_out_of_reach() {
        let (mapping, spaces) = corridor_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let mut layout = Layout::new(2);
        layout.insert(0, config_at(0, 0, 0));
        let cfg_b = config_at(0, 20, 0);
        let data = constraints.compute(&layout, 1, &cfg_b);
        assert!(data.corridor_gap > 0);
    }

    #[test]
    fn corridor_placements_connect_both_ends() {
        let (mapping, spaces) = corridor_level();
        let constraints = ConstraintSet::new(&mapping, &spaces, 0, true);
        let from = config_at(0, 0, 0);
        let to = config_at(0, 6, 0);
        let placements = constraints.corridor_placements(1, &from, &to);
        assert!(!placements.is_empty());
        for &(shape, position) in &placements {
            let first = spaces.get(from.shape, shape);
            let second = spaces.get(shape, to.shape);
            assert!(first.contains(position - from.position));
            assert!(second.contains(to.position - position));
        }
    }
}
