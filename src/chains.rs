//! Chain decomposition of the planned graph.
//!
//! The planner places the graph incrementally, one small subgraph at a
//! time. Stage 1 extracts faces: edge-disjoint short cycles, found by
//! routing around each not-yet-used edge. Stage 2 covers the remaining
//! tree parts by walking outward from the already-covered closure.
//! Chains partition the node set; every chain after the first contains a
//! node adjacent to the union of the earlier chains, which is what
//! anchors its placement.

use std::collections::VecDeque;

use crate::config_spaces::FxHashSet;
use crate::mapping::PlanGraph;
use crate::types::ChainConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Sequence number in placement order.
    pub index: usize,
    /// Nodes introduced by this chain, in placement order.
    pub nodes: Vec<usize>,
    /// Face chains skip the stage-2 random-restart of the evolver.
    pub from_face: bool,
}

pub fn decompose(graph: &PlanGraph, config: &ChainConfig) -> Vec<Chain> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    let max_tree = config.max_tree_size.max(1);

    let mut faces = extract_faces(graph);
    faces.sort_by_key(|f| (f.len(), f.iter().copied().min().unwrap_or(0)));

    let mut in_face = vec![false; n];
    for face in &faces {
        for &node in face {
            in_face[node] = true;
        }
    }

    let mut covered = vec![false; n];
    let mut covered_count = 0usize;
    let mut face_done = vec![false; faces.len()];
    let mut chains: Vec<Chain> = Vec::new();

    while covered_count < n {
        if let Some(fi) = next_face(graph, &faces, &face_done, &covered, chains.is_empty())
        {
            face_done[fi] = true;
            let nodes: Vec<usize> =
                faces[fi].iter().copied().filter(|&v| !covered[v]).collect();
            if nodes.is_empty() {
                continue;
            }
            for &node in &nodes {
                covered[node] = true;
            }
            covered_count += nodes.len();
            chains.push(Chain { index: chains.len(), nodes, from_face: true });
            continue;
        }

        let nodes = next_tree_chain(graph, &in_face, &mut covered, max_tree);
        debug_assert!(!nodes.is_empty(), "no face and no tree chain but nodes remain");
        covered_count += nodes.len();
        chains.push(Chain { index: chains.len(), nodes, from_face: false });
    }

    chains
}

/// First unprocessed face that touches the closure (shares a node with
/// it or has a node adjacent to it). The initial chain may be any face;
/// faces are pre-sorted smallest first.
fn next_face(
    graph: &PlanGraph,
    faces: &[Vec<usize>],
    face_done: &[bool],
    covered: &[bool],
    initial: bool,
) -> Option<usize> {
    faces.iter().enumerate().position(|(fi, face)| {
        if face_done[fi] {
            return false;
        }
        initial
            || face.iter().any(|&v| {
                covered[v] || graph.adjacency[v].iter().any(|&u| covered[u])
            })
    })
}

/// Walk one path of uncovered tree nodes (nodes outside every face) from
/// the closure, cutting at a branch point or at the size limit. When
/// nothing is covered yet the graph has no faces at all and the walk
/// starts a fresh chain at node 0.
fn next_tree_chain(
    graph: &PlanGraph,
    in_face: &[bool],
    covered: &mut [bool],
    max_tree: usize,
) -> Vec<usize> {
    let next_child = |node: usize, covered: &[bool]| {
        graph.adjacency[node]
            .iter()
            .copied()
            .find(|&v| !covered[v] && !in_face[v])
    };

    let mut nodes = Vec::new();
    let mut cursor = if covered.iter().any(|&c| c) {
        // Root: smallest covered node with an uncovered tree neighbor.
        let root = (0..graph.node_count())
            .find(|&v| covered[v] && next_child(v, covered).is_some())
            .expect("closure must border an uncovered tree node");
        let first = next_child(root, covered).unwrap();
        first
    } else {
        0
    };

    loop {
        covered[cursor] = true;
        nodes.push(cursor);
        if nodes.len() >= max_tree {
            break;
        }
        let mut children = graph.adjacency[cursor]
            .iter()
            .copied()
            .filter(|&v| !covered[v] && !in_face[v]);
        let first = children.next();
        let branch = children.next().is_some();
        match first {
            Some(child) if !branch => cursor = child,
            // Branch point or dead end: stop here, later chains resume
            // from this (now covered) node.
            _ => break,
        }
    }
    nodes
}

/// Edge-disjoint short cycles: for every edge in order, route from one
/// endpoint to the other without using the edge itself or any edge
/// already consumed by an earlier cycle.
fn extract_faces(graph: &PlanGraph) -> Vec<Vec<usize>> {
    let mut used: FxHashSet<(usize, usize)> = FxHashSet::default();
    let mut faces = Vec::new();
    for edge in &graph.edges {
        let key = (edge.u, edge.v);
        if used.contains(&key) {
            continue;
        }
        if let Some(path) = shortest_detour(graph, edge.u, edge.v, &used) {
            for pair in path.windows(2) {
                used.insert(edge_key(pair[0], pair[1]));
            }
            used.insert(key);
            faces.push(path);
        }
    }
    faces
}

fn edge_key(u: usize, v: usize) -> (usize, usize) {
    (u.min(v), u.max(v))
}

/// BFS shortest path from `from` to `to` that avoids the direct edge and
/// every used edge. Neighbor order is the sorted adjacency list, so the
/// result is stable.
fn shortest_detour(
    graph: &PlanGraph,
    from: usize,
    to: usize,
    used: &FxHashSet<(usize, usize)>,
) -> Option<Vec<usize>> {
    let n = graph.node_count();
    let mut parent = vec![usize::MAX; n];
    let mut seen = vec![false; n];
    let mut queue = VecDeque::new();
    seen[from] = true;
    queue.push_back(from);
    while let Some(node) = queue.pop_front() {
        for &next in &graph.adjacency[node] {
            if seen[next] || used.contains(&edge_key(node, next)) {
                continue;
            }
            if node == from && next == to {
                continue;
            }
            seen[next] = true;
            parent[next] = node;
            if next == to {
                let mut path = vec![to];
                let mut cursor = to;
                while cursor != from {
                    cursor = parent[cursor];
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}
