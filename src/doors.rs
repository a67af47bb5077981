//! Door handler: enumerates the concrete door positions of a shape.
//!
//! A door is a segment of the polygon boundary through which two rooms
//! may connect. The configuration-space generator consumes the full list
//! of concrete segments per shape; two doors connect when they occupy the
//! same grid segment with opposite facing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Axis, GridPolygon, OrthoLine, Point};

/// Outward direction of the wall a door sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    Up,
    Down,
    Left,
    Right,
}

impl Facing {
    pub fn opposite(self) -> Facing {
        match self {
            Facing::Up => Facing::Down,
            Facing::Down => Facing::Up,
            Facing::Left => Facing::Right,
            Facing::Right => Facing::Left,
        }
    }
}

/// One concrete door placement: a normalized boundary segment plus the
/// outward facing of its wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoorSegment {
    pub line: OrthoLine,
    pub facing: Facing,
}

impl DoorSegment {
    pub fn length(&self) -> i32 {
        self.line.length()
    }

    pub fn translated(&self, offset: Point) -> DoorSegment {
        DoorSegment { line: self.line.translated(offset), facing: self.facing }
    }
}

/// How door positions are derived from a shape outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DoorMode {
    /// A door of `length` cells may sit anywhere along any wall, keeping
    /// at least `margin` cells clear of each corner.
    Walls { length: i32, margin: i32 },
    /// Exact door segments on the boundary; nothing else connects.
    Explicit { lines: Vec<OrthoLine> },
}

impl Default for DoorMode {
    fn default() -> Self {
        DoorMode::Walls { length: 1, margin: 0 }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DoorError {
    #[error("door length must be positive, got {0}")]
    NonPositiveLength(i32),
    #[error("corner margin must be non-negative, got {0}")]
    NegativeMargin(i32),
    #[error("no wall of the shape fits a door of length {length} with margin {margin}")]
    NoWallFits { length: i32, margin: i32 },
    #[error("explicit door {0:?} does not lie on the shape boundary")]
    NotOnBoundary(OrthoLine),
    #[error("shape has no doors")]
    NoDoors,
}

/// Outward facing of a counterclockwise boundary edge: the interior lies
/// to the left of the directed edge, so outside is to the right.
fn edge_facing(edge: &OrthoLine) -> Facing {
    if edge.from.y == edge.to.y {
        if edge.to.x > edge.from.x {
            Facing::Down
        } else {
            Facing::Up
        }
    } else if edge.to.y > edge.from.y {
        Facing::Right
    } else {
        Facing::Left
    }
}

fn step(edge: &OrthoLine) -> Point {
    match edge.axis() {
        Axis::Horizontal => Point::new(if edge.to.x > edge.from.x { 1 } else { -1 }, 0),
        Axis::Vertical => Point::new(0, if edge.to.y > edge.from.y { 1 } else { -1 }),
    }
}

/// Enumerate every concrete door segment of a shape, in boundary order.
pub fn door_segments(
    polygon: &GridPolygon,
    mode: &DoorMode,
) -> Result<Vec<DoorSegment>, DoorError> {
    let segments = match mode {
        DoorMode::Walls { length, margin } => {
            if *length <= 0 {
                return Err(DoorError::NonPositiveLength(*length));
            }
            if *margin < 0 {
                return Err(DoorError::NegativeMargin(*margin));
            }
            let mut out = Vec::new();
            for edge in polygon.edges() {
                let wall = edge.length();
                let facing = edge_facing(&edge);
                let dir = step(&edge);
                let mut start = *margin;
                while start + length + margin <= wall {
                    let from = Point::new(
                        edge.from.x + dir.x * start,
                        edge.from.y + dir.y * start,
                    );
                    let to = Point::new(from.x + dir.x * length, from.y + dir.y * length);
                    out.push(DoorSegment {
                        line: OrthoLine::new(from, to).normalized(),
                        facing,
                    });
                    start += 1;
                }
            }
            if out.is_empty() {
                return Err(DoorError::NoWallFits { length: *length, margin: *margin });
            }
            out
        }
        DoorMode::Explicit { lines } => {
            let mut out = Vec::new();
            for line in lines {
                let wanted = line.normalized();
                let edge = polygon
                    .edges()
                    .find(|e| {
                        e.intersection(&wanted)
                            .is_some_and(|i| i.normalized() == wanted)
                    })
                    .ok_or(DoorError::NotOnBoundary(*line))?;
                out.push(DoorSegment { line: wanted, facing: edge_facing(&edge) });
            }
            if out.is_empty() {
                return Err(DoorError::NoDoors);
            }
            out
        }
    };
    Ok(segments)
}
