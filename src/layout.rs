//! Layouts, configurations, and the perturbation controller.
//!
//! A layout is a partial assignment of configurations to plan-graph
//! nodes. The controller owns every local edit: seeding a chain,
//! perturbing one node, and the deterministic greedy placement used for
//! tree chains. Layouts are cloned before each perturbation; the
//! configurations are small, so a straight deep clone stands in for the
//! copy-on-write discipline.

use std::hash::{Hash, Hasher};

use crate::energy::{ConstraintSet, EnergyData};
use crate::errors::GenerationError;
use crate::geometry::Point;
use crate::mapping::LevelMapping;
use crate::prng::Pcg32;
use crate::types::RepeatMode;

/// Probability that a perturbation changes the shape rather than the
/// position of the picked node.
const SHAPE_PERTURBATION_PROBABILITY: f64 = 0.4;

/// One node's current placement. Equality and hashing cover the chosen
/// shape and the position — every identity field, and nothing derived:
/// the energy block is cached state, not identity.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub shape: usize,
    pub position: Point,
    pub energy: EnergyData,
}

impl Configuration {
    pub fn new(shape: usize, position: Point) -> Self {
        Configuration { shape, position, energy: EnergyData::default() }
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.position == other.position
    }
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shape.hash(state);
        self.position.hash(state);
    }
}

/// Partial assignment of configurations to plan-graph nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    configs: Vec<Option<Configuration>>,
}

impl Layout {
    pub fn new(node_count: usize) -> Self {
        Layout { configs: vec![None; node_count] }
    }

    pub fn get(&self, node: usize) -> Option<&Configuration> {
        self.configs[node].as_ref()
    }

    pub fn insert(&mut self, node: usize, config: Configuration) {
        self.configs[node] = Some(config);
    }

    pub fn take(&mut self, node: usize) -> Option<Configuration> {
        self.configs[node].take()
    }

    pub fn set_energy(&mut self, node: usize, energy: EnergyData) {
        self.configs[node]
            .as_mut()
            .expect("energy update for an unplaced node")
            .energy = energy;
    }

    pub fn node_count(&self) -> usize {
        self.configs.len()
    }

    pub fn placed_count(&self) -> usize {
        self.configs.iter().filter(|c| c.is_some()).count()
    }

    /// Placed node indices in ascending order.
    pub fn placed_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.configs
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| i))
    }

    pub fn total_energy(&self) -> i64 {
        self.configs
            .iter()
            .flatten()
            .map(|c| c.energy.total())
            .sum()
    }

    pub fn is_valid(&self) -> bool {
        self.total_energy() == 0
    }
}

/// The layout controller: all local edits of a layout during evolution.
#[derive(Clone, Copy)]
pub struct LayoutOps<'a> {
    pub mapping: &'a LevelMapping,
    pub constraints: ConstraintSet<'a>,
    pub throw_on_repeat: bool,
}

impl<'a> LayoutOps<'a> {
    /// Assign `(shape, position)` to `node`, recompute its energy from
    /// scratch, and incrementally update every other placed node.
    pub fn place(&self, layout: &mut Layout, node: usize, shape: usize, position: Point) {
        let old = layout.take(node);
        let mut config = Configuration::new(shape, position);
        config.energy = self.constraints.compute(layout, node, &config);

        let updates: Vec<(usize, EnergyData)> = layout
            .placed_nodes()
            .map(|other| {
                let other_cfg = layout.get(other).expect("placed");
                let data = self.constraints.update(
                    other,
                    other_cfg,
                    node,
                    old.as_ref(),
                    &config,
                    other_cfg.energy,
                );
                (other, data)
            })
            .collect();
        for (other, data) in updates {
            layout.set_energy(other, data);
        }
        layout.insert(node, config);
    }

    /// One random local edit of a placed chain node; returns the edited
    /// clone. The input layout is never touched.
    pub fn perturb(
        &self,
        layout: &Layout,
        chain_nodes: &[usize],
        rng: &mut Pcg32,
    ) -> Result<Layout, GenerationError> {
        let placed: Vec<usize> = chain_nodes
            .iter()
            .copied()
            .filter(|&v| layout.get(v).is_some())
            .collect();
        debug_assert!(!placed.is_empty(), "perturbation on an empty chain");
        let node = *rng.pick(&placed);

        let mut next = layout.clone();
        if rng.chance(SHAPE_PERTURBATION_PROBABILITY) {
            self.perturb_shape(&mut next, node, rng)?;
        } else {
            self.perturb_position(&mut next, node, rng);
        }
        Ok(next)
    }

    fn perturb_shape(
        &self,
        layout: &mut Layout,
        node: usize,
        rng: &mut Pcg32,
    ) -> Result<(), GenerationError> {
        let current = layout.get(node).expect("perturbed node is placed").clone();
        let allowed = self.candidate_shapes(layout, node)?;
        let candidates: Vec<usize> =
            allowed.into_iter().filter(|&s| s != current.shape).collect();
        if candidates.is_empty() {
            // Only one admissible shape; a position edit is the only
            // possible move.
            self.perturb_position(layout, node, rng);
            return Ok(());
        }
        let shape = *rng.pick(&candidates);

        let connecting = self.connecting_positions(layout, node, shape);
        let position = if connecting.contains(&current.position) {
            current.position
        } else if !connecting.is_empty() {
            *rng.pick(&connecting)
        } else {
            current.position
        };
        self.place(layout, node, shape, position);
        Ok(())
    }

    fn perturb_position(&self, layout: &mut Layout, node: usize, rng: &mut Pcg32) {
        let current = layout.get(node).expect("perturbed node is placed").clone();
        let connecting = self.connecting_positions(layout, node, current.shape);
        let position = if !connecting.is_empty() {
            *rng.pick(&connecting)
        } else {
            let union = self.reachable_positions(layout, node, current.shape);
            if union.is_empty() {
                current.position
            } else {
                *rng.pick(&union)
            }
        };
        self.place(layout, node, current.shape, position);
    }

    /// Allowed shapes of `node` after repeat-mode filtering against the
    /// placed part of the layout. Falls back to the unfiltered set when
    /// filtering empties it, unless the generation is configured to fail
    /// hard in that case.
    pub fn candidate_shapes(
        &self,
        layout: &Layout,
        node: usize,
    ) -> Result<Vec<usize>, GenerationError> {
        let allowed = self.mapping.plan_node_shapes(node);
        let mode = self.mapping.plan_node_repeat_mode(node);

        let taken: Vec<usize> = match mode {
            RepeatMode::Allow => Vec::new(),
            RepeatMode::NoImmediate => self.mapping.graph.adjacency[node]
                .iter()
                .filter_map(|&u| layout.get(u))
                .map(|cfg| self.mapping.shapes[cfg.shape].alias)
                .collect(),
            RepeatMode::NoRepeat => layout
                .placed_nodes()
                .filter(|&u| u != node)
                .map(|u| {
                    let cfg = layout.get(u).expect("placed");
                    self.mapping.shapes[cfg.shape].alias
                })
                .collect(),
        };

        let filtered: Vec<usize> = allowed
            .iter()
            .copied()
            .filter(|&s| !taken.contains(&self.mapping.shapes[s].alias))
            .collect();
        if filtered.is_empty() {
            if self.throw_on_repeat {
                return Err(GenerationError::RepeatModeUnsatisfied(
                    self.mapping.plan_node_name(node).to_owned(),
                ));
            }
            return Ok(allowed.to_vec());
        }
        Ok(filtered)
    }

    /// Intersection of the configuration spaces of `node` against every
    /// placed neighbor: absolute positions connecting to all of them.
    pub fn connecting_positions(
        &self,
        layout: &Layout,
        node: usize,
        shape: usize,
    ) -> Vec<Point> {
        let mut result: Option<Vec<Point>> = None;
        for &u in &self.mapping.graph.adjacency[node] {
            let Some(u_cfg) = layout.get(u) else { continue };
            let positions = self.edge_positions(node, shape, u, u_cfg);
            result = Some(match result {
                None => positions,
                Some(prev) => {
                    prev.into_iter().filter(|p| positions.contains(p)).collect()
                }
            });
        }
        result.unwrap_or_default()
    }

    /// Union of the configuration spaces of `node` against its placed
    /// neighbors, sorted and deduplicated.
    pub fn reachable_positions(
        &self,
        layout: &Layout,
        node: usize,
        shape: usize,
    ) -> Vec<Point> {
        let mut union = Vec::new();
        for &u in &self.mapping.graph.adjacency[node] {
            let Some(u_cfg) = layout.get(u) else { continue };
            union.extend(self.edge_positions(node, shape, u, u_cfg));
        }
        union.sort_unstable_by_key(|p| (p.y, p.x));
        union.dedup();
        union
    }

    /// Absolute positions of `node` (holding `shape`) that connect to the
    /// placed neighbor `u` across their shared edge — directly, or
    /// through any corridor shape for contracted corridor edges.
    fn edge_positions(
        &self,
        node: usize,
        shape: usize,
        u: usize,
        u_cfg: &Configuration,
    ) -> Vec<Point> {
        let spaces = self.constraints.spaces();
        let edge = self
            .mapping
            .graph
            .edge_between(node, u)
            .expect("adjacency and edge list agree");
        match edge.corridor {
            None => spaces
                .get(u_cfg.shape, shape)
                .offsets()
                .iter()
                .map(|&o| u_cfg.position + o)
                .collect(),
            Some(corridor) => {
                let mut out = Vec::new();
                for &via in &self.mapping.room_shapes[corridor] {
                    if let Some(space) = spaces.two_hop(u_cfg.shape, via, shape) {
                        out.extend(
                            space.offsets().iter().map(|&o| u_cfg.position + o),
                        );
                    }
                }
                out.sort_unstable_by_key(|p| (p.y, p.x));
                out.dedup();
                out
            }
        }
    }

    /// Initial placement of a chain on top of a prefix: every node gets a
    /// random admissible shape and a random connecting position.
    pub fn seed_chain(
        &self,
        prefix: &Layout,
        chain_nodes: &[usize],
        rng: &mut Pcg32,
    ) -> Result<Layout, GenerationError> {
        let mut layout = prefix.clone();
        for &node in chain_nodes {
            let shapes = self.candidate_shapes(&layout, node)?;
            let shape = *rng.pick(&shapes);
            let connecting = self.connecting_positions(&layout, node, shape);
            let position = if !connecting.is_empty() {
                *rng.pick(&connecting)
            } else {
                let union = self.reachable_positions(&layout, node, shape);
                if union.is_empty() {
                    Point::new(0, 0)
                } else {
                    *rng.pick(&union)
                }
            };
            self.place(&mut layout, node, shape, position);
        }
        Ok(layout)
    }

    /// Deterministic first-fit placement for tree chains: for each node,
    /// the first shape and connecting offset that keeps the whole layout
    /// at zero energy.
    pub fn greedy_place(
        &self,
        prefix: &Layout,
        chain_nodes: &[usize],
    ) -> Result<Option<Layout>, GenerationError> {
        let mut layout = prefix.clone();
        'nodes: for &node in chain_nodes {
            let shapes = self.candidate_shapes(&layout, node)?;
            for &shape in &shapes {
                let candidates = if layout.placed_count() == 0 {
                    vec![Point::new(0, 0)]
                } else {
                    self.connecting_positions(&layout, node, shape)
                };
                for position in candidates {
                    let mut trial = layout.clone();
                    self.place(&mut trial, node, shape, position);
                    if trial.total_energy() == 0 {
                        layout = trial;
                        continue 'nodes;
                    }
                }
            }
            return Ok(None);
        }
        Ok(Some(layout))
    }
}
