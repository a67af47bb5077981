//! Conversion of internal layouts into the caller-facing `MapLayout`.
//!
//! Rooms come back under their original names with absolute outlines.
//! Contracted corridor rooms are realized here: for each corridor edge
//! the candidate placements connecting both ends are enumerated in
//! deterministic order and the first collision-free one is taken. Door
//! assignment then runs over the full input graph: for every passage
//! whose endpoints are placed, the first coincident opposite-facing door
//! pair becomes the passage's door.

use crate::energy::ConstraintSet;
use crate::geometry::{overlap_area, OrthoLine, Point};
use crate::layout::Layout;
use crate::mapping::LevelMapping;
use crate::types::{MapLayout, PlacedDoor, PlacedRoom};

/// Lift a (possibly partial) layout into user terms. Rooms that are not
/// placed, corridors that cannot be realized, and passages without a
/// coincident door are simply absent; on a valid full layout everything
/// is present.
pub fn to_map_layout(
    layout: &Layout,
    mapping: &LevelMapping,
    constraints: &ConstraintSet,
) -> MapLayout {
    let full_count = mapping.room_names.len();
    let mut placed: Vec<Option<(usize, Point)>> = vec![None; full_count];
    for plan_node in layout.placed_nodes() {
        let cfg = layout.get(plan_node).expect("placed node has a configuration");
        placed[mapping.graph.nodes[plan_node]] = Some((cfg.shape, cfg.position));
    }

    if mapping.corridors_contracted {
        resolve_corridors(layout, mapping, constraints, &mut placed);
    }

    let rooms: Vec<PlacedRoom> = placed
        .iter()
        .enumerate()
        .filter_map(|(node, slot)| {
            slot.map(|(shape, position)| PlacedRoom {
                room: mapping.room_names[node].clone(),
                shape: mapping.shapes[shape].name.clone(),
                position,
                outline: mapping.shapes[shape].polygon.translated_vertices(position),
            })
        })
        .collect();

    let mut doors = Vec::new();
    for &(u, v) in &mapping.full_edges {
        let (Some(cu), Some(cv)) = (placed[u], placed[v]) else { continue };
        if let Some(line) = door_between(mapping, cu, cv) {
            doors.push(PlacedDoor {
                from: mapping.room_names[u].clone(),
                to: mapping.room_names[v].clone(),
                line,
            });
        }
    }

    MapLayout { rooms, doors }
}

/// Place each contracted corridor: first candidate that connects both
/// endpoint rooms and overlaps nothing placed so far, falling back to
/// the first connecting candidate when every one collides.
fn resolve_corridors(
    layout: &Layout,
    mapping: &LevelMapping,
    constraints: &ConstraintSet,
    placed: &mut [Option<(usize, Point)>],
) {
    for edge in &mapping.graph.edges {
        let Some(corridor) = edge.corridor else { continue };
        let (Some(from_cfg), Some(to_cfg)) = (layout.get(edge.u), layout.get(edge.v))
        else {
            continue;
        };
        let candidates = constraints.corridor_placements(corridor, from_cfg, to_cfg);
        if candidates.is_empty() {
            continue;
        }
        let collision_free = candidates.iter().copied().find(|&(shape, position)| {
            placed.iter().enumerate().all(|(other, slot)| match *slot {
                Some((other_shape, other_position)) if other != corridor => {
                    overlap_area(
                        &mapping.shapes[shape].polygon,
                        position,
                        &mapping.shapes[other_shape].polygon,
                        other_position,
                    ) == 0
                }
                _ => true,
            })
        });
        placed[corridor] = Some(collision_free.unwrap_or(candidates[0]));
    }
}

/// First coincident opposite-facing door pair of two placed shapes.
fn door_between(
    mapping: &LevelMapping,
    (shape_u, pos_u): (usize, Point),
    (shape_v, pos_v): (usize, Point),
) -> Option<OrthoLine> {
    for du in &mapping.shapes[shape_u].doors {
        let placed_u = du.translated(pos_u);
        for dv in &mapping.shapes[shape_v].doors {
            let placed_v = dv.translated(pos_v);
            if placed_u.line == placed_v.line
                && placed_v.facing == placed_u.facing.opposite()
            {
                return Some(placed_u.line);
            }
        }
    }
    None
}
