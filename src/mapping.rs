//! Canonical internal model of a level description.
//!
//! User-facing room names are mapped to dense integer indices, shape
//! definitions are interned into a global variant table, and the input
//! graph is validated. When corridor optimization is on, corridor rooms
//! are contracted out of the planned graph; each contracted edge
//! remembers the corridor it stands for so conversion can place it later.

use crate::doors::{door_segments, DoorSegment};
use crate::errors::ConfigError;
use crate::geometry::GridPolygon;
use crate::types::{GeneratorConfig, LevelDescription, RepeatMode};

/// Interned shape: outline, doors, and the equivalence alias used by
/// repeat-mode checks. Variants share an alias iff they came from the
/// same named `ShapeDef`.
#[derive(Debug, Clone)]
pub struct ShapeVariant {
    pub name: String,
    pub alias: usize,
    pub polygon: GridPolygon,
    pub doors: Vec<DoorSegment>,
}

/// One edge of the planned graph. `corridor` carries the full-graph
/// index of the corridor room this edge was contracted from, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEdge {
    pub u: usize,
    pub v: usize,
    pub corridor: Option<usize>,
}

/// The graph the planner actually works on: full graph when corridors
/// are planned like rooms, corridor-contracted graph otherwise.
#[derive(Debug, Clone)]
pub struct PlanGraph {
    /// Plan-node index -> full-graph node index.
    pub nodes: Vec<usize>,
    /// Deduplicated, `u < v`, sorted.
    pub edges: Vec<PlanEdge>,
    /// Plan-node index -> sorted neighbor plan-node indices.
    pub adjacency: Vec<Vec<usize>>,
}

impl PlanGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn are_neighbors(&self, u: usize, v: usize) -> bool {
        self.adjacency[u].binary_search(&v).is_ok()
    }

    pub fn edge_between(&self, u: usize, v: usize) -> Option<&PlanEdge> {
        let (a, b) = if u < v { (u, v) } else { (v, u) };
        self.edges
            .binary_search_by_key(&(a, b), |e| (e.u, e.v))
            .ok()
            .map(|i| &self.edges[i])
    }
}

#[derive(Debug, Clone)]
pub struct LevelMapping {
    /// Global shape table; configurations refer into it by index.
    pub shapes: Vec<ShapeVariant>,
    /// Full-graph node index -> user room name.
    pub room_names: Vec<String>,
    /// Full-graph node index -> allowed shape ids.
    pub room_shapes: Vec<Vec<usize>>,
    pub is_corridor: Vec<bool>,
    pub repeat_modes: Vec<RepeatMode>,
    /// Full input graph edges, deduplicated, `u < v`, sorted.
    pub full_edges: Vec<(usize, usize)>,
    pub graph: PlanGraph,
    /// Whether corridors were contracted out of `graph`.
    pub corridors_contracted: bool,
}

impl LevelMapping {
    pub fn build(
        level: &LevelDescription,
        config: &GeneratorConfig,
    ) -> Result<LevelMapping, ConfigError> {
        if level.rooms.is_empty() {
            return Err(ConfigError::EmptyLevel);
        }
        if level.min_room_distance < 0 {
            return Err(ConfigError::NegativeMinDistance(level.min_room_distance));
        }

        let shapes = intern_shapes(level)?;

        let mut room_names = Vec::with_capacity(level.rooms.len());
        let mut room_shapes = Vec::with_capacity(level.rooms.len());
        let mut is_corridor = Vec::with_capacity(level.rooms.len());
        let mut repeat_modes = Vec::with_capacity(level.rooms.len());
        for room in &level.rooms {
            if room_names.contains(&room.name) {
                return Err(ConfigError::DuplicateRoom(room.name.clone()));
            }
            if room.shapes.is_empty() {
                return Err(ConfigError::NoShapes(room.name.clone()));
            }
            let mut ids = Vec::with_capacity(room.shapes.len());
            for shape_name in &room.shapes {
                let id = shapes
                    .iter()
                    .position(|s| &s.name == shape_name)
                    .ok_or_else(|| ConfigError::UnknownShape {
                        room: room.name.clone(),
                        shape: shape_name.clone(),
                    })?;
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            room_names.push(room.name.clone());
            room_shapes.push(ids);
            is_corridor.push(room.is_corridor);
            repeat_modes.push(config.repeat_mode_override.unwrap_or(room.repeat_mode));
        }

        let full_edges = canonical_edges(level, &room_names)?;
        let adjacency = adjacency_of(room_names.len(), &full_edges);

        for (node, neighbors) in adjacency.iter().enumerate() {
            if is_corridor[node] && neighbors.len() != 2 {
                return Err(ConfigError::CorridorDegree {
                    room: room_names[node].clone(),
                    degree: neighbors.len(),
                });
            }
        }
        for &(u, v) in &full_edges {
            if is_corridor[u] && is_corridor[v] {
                return Err(ConfigError::AdjacentCorridors(
                    room_names[u].clone(),
                    room_names[v].clone(),
                ));
            }
        }
        check_connected(room_names.len(), &adjacency)?;

        let contract =
            config.optimize_corridor_constraints && is_corridor.iter().any(|&c| c);
        let graph = if contract {
            contract_corridors(&room_names, &is_corridor, &full_edges, &adjacency)
        } else {
            full_plan_graph(room_names.len(), &full_edges)
        };

        Ok(LevelMapping {
            shapes,
            room_names,
            room_shapes,
            is_corridor,
            repeat_modes,
            full_edges,
            graph,
            corridors_contracted: contract,
        })
    }

    /// Allowed shape ids of a plan-graph node.
    pub fn plan_node_shapes(&self, plan_node: usize) -> &[usize] {
        &self.room_shapes[self.graph.nodes[plan_node]]
    }

    pub fn plan_node_name(&self, plan_node: usize) -> &str {
        &self.room_names[self.graph.nodes[plan_node]]
    }

    pub fn plan_node_repeat_mode(&self, plan_node: usize) -> RepeatMode {
        self.repeat_modes[self.graph.nodes[plan_node]]
    }

    /// Sorted, deduplicated shape ids allowed on any corridor room; the
    /// two-hop configuration spaces are built for exactly these.
    pub fn corridor_shape_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .is_corridor
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .flat_map(|(node, _)| self.room_shapes[node].iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

fn intern_shapes(level: &LevelDescription) -> Result<Vec<ShapeVariant>, ConfigError> {
    let mut shapes: Vec<ShapeVariant> = Vec::with_capacity(level.shapes.len());
    for (alias, def) in level.shapes.iter().enumerate() {
        if shapes.iter().any(|s| s.name == def.name) {
            return Err(ConfigError::DuplicateShape(def.name.clone()));
        }
        let polygon = GridPolygon::new(def.outline.clone()).map_err(|source| {
            ConfigError::BadOutline { shape: def.name.clone(), source }
        })?;
        let doors = door_segments(&polygon, &def.doors).map_err(|source| {
            ConfigError::BadDoors { shape: def.name.clone(), source }
        })?;
        shapes.push(ShapeVariant { name: def.name.clone(), alias, polygon, doors });
    }
    Ok(shapes)
}

fn canonical_edges(
    level: &LevelDescription,
    room_names: &[String],
) -> Result<Vec<(usize, usize)>, ConfigError> {
    let index_of = |name: &str| {
        room_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ConfigError::UnknownRoom(name.to_owned()))
    };
    let mut edges = Vec::with_capacity(level.passages.len());
    for passage in &level.passages {
        let u = index_of(&passage.from)?;
        let v = index_of(&passage.to)?;
        if u == v {
            return Err(ConfigError::SelfLoop(passage.from.clone()));
        }
        let edge = (u.min(v), u.max(v));
        if edges.contains(&edge) {
            return Err(ConfigError::DuplicatePassage(
                room_names[edge.0].clone(),
                room_names[edge.1].clone(),
            ));
        }
        edges.push(edge);
    }
    edges.sort_unstable();
    Ok(edges)
}

fn adjacency_of(node_count: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); node_count];
    for &(u, v) in edges {
        adjacency[u].push(v);
        adjacency[v].push(u);
    }
    for neighbors in &mut adjacency {
        neighbors.sort_unstable();
    }
    adjacency
}

fn check_connected(
    node_count: usize,
    adjacency: &[Vec<usize>],
) -> Result<(), ConfigError> {
    let mut seen = vec![false; node_count];
    let mut stack = vec![0usize];
    seen[0] = true;
    let mut reached = 1usize;
    while let Some(node) = stack.pop() {
        for &next in &adjacency[node] {
            if !seen[next] {
                seen[next] = true;
                reached += 1;
                stack.push(next);
            }
        }
    }
    if reached == node_count {
        Ok(())
    } else {
        Err(ConfigError::Disconnected)
    }
}

fn full_plan_graph(node_count: usize, edges: &[(usize, usize)]) -> PlanGraph {
    let plan_edges: Vec<PlanEdge> = edges
        .iter()
        .map(|&(u, v)| PlanEdge { u, v, corridor: None })
        .collect();
    let adjacency = adjacency_of(node_count, edges);
    PlanGraph { nodes: (0..node_count).collect(), edges: plan_edges, adjacency }
}

/// Replace every `a — c — b` corridor wedge with a direct `a — b` edge
/// tagged with `c`. Corridor degree was validated to be exactly 2.
fn contract_corridors(
    room_names: &[String],
    is_corridor: &[bool],
    full_edges: &[(usize, usize)],
    full_adjacency: &[Vec<usize>],
) -> PlanGraph {
    let mut nodes = Vec::new();
    let mut plan_index = vec![usize::MAX; room_names.len()];
    for (node, &corridor) in is_corridor.iter().enumerate() {
        if !corridor {
            plan_index[node] = nodes.len();
            nodes.push(node);
        }
    }

    let mut edges: Vec<PlanEdge> = Vec::new();
    for &(u, v) in full_edges {
        if is_corridor[u] || is_corridor[v] {
            continue;
        }
        edges.push(PlanEdge { u: plan_index[u], v: plan_index[v], corridor: None });
    }
    for (node, &corridor) in is_corridor.iter().enumerate() {
        if !corridor {
            continue;
        }
        let a = plan_index[full_adjacency[node][0]];
        let b = plan_index[full_adjacency[node][1]];
        let (a, b) = (a.min(b), a.max(b));
        edges.push(PlanEdge { u: a, v: b, corridor: Some(node) });
    }
    edges.sort_unstable_by_key(|e| (e.u, e.v));

    let pairs: Vec<(usize, usize)> = edges.iter().map(|e| (e.u, e.v)).collect();
    let adjacency = adjacency_of(nodes.len(), &pairs);
    PlanGraph { nodes, edges, adjacency }
}
