//! Integer-grid geometry: points, axis-aligned lines, orthogonal polygons.
//!
//! Room outlines are closed orthogonal polygons with vertices on the
//! integer grid. Each polygon is partitioned into axis-aligned rectangles
//! at construction, so overlap area and distance queries reduce to
//! rectangle-pair arithmetic.

use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    pub fn l1_norm(self) -> i64 {
        self.x.unsigned_abs() as i64 + self.y.unsigned_abs() as i64
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// Axis along which an orthogonal line runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Axis-aligned line segment with integer endpoints.
///
/// `from` and `to` are stored as given; `normalized()` orders them so the
/// smaller coordinate comes first, which makes coincidence tests cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrthoLine {
    pub from: Point,
    pub to: Point,
}

impl OrthoLine {
    pub fn new(from: Point, to: Point) -> Self {
        debug_assert!(from.x == to.x || from.y == to.y);
        OrthoLine { from, to }
    }

    pub fn axis(&self) -> Axis {
        if self.from.y == self.to.y {
            Axis::Horizontal
        } else {
            Axis::Vertical
        }
    }

    pub fn length(&self) -> i32 {
        (self.to.x - self.from.x).abs() + (self.to.y - self.from.y).abs()
    }

    pub fn normalized(&self) -> OrthoLine {
        if (self.to.x, self.to.y) < (self.from.x, self.from.y) {
            OrthoLine { from: self.to, to: self.from }
        } else {
            *self
        }
    }

    pub fn translated(&self, offset: Point) -> OrthoLine {
        OrthoLine { from: self.from + offset, to: self.to + offset }
    }

    /// Overlap of two collinear segments, if nonempty.
    ///
    /// Segments on different axes or different carrier lines yield `None`;
    /// so does a shared endpoint only (zero-length overlap counts, since
    /// a door can sit at a single grid point when both walls meet there).
    pub fn intersection(&self, other: &OrthoLine) -> Option<OrthoLine> {
        let a = self.normalized();
        let b = other.normalized();
        if a.axis() != b.axis() {
            return None;
        }
        match a.axis() {
            Axis::Horizontal => {
                if a.from.y != b.from.y {
                    return None;
                }
                let lo = a.from.x.max(b.from.x);
                let hi = a.to.x.min(b.to.x);
                (lo <= hi).then(|| {
                    OrthoLine::new(Point::new(lo, a.from.y), Point::new(hi, a.from.y))
                })
            }
            Axis::Vertical => {
                if a.from.x != b.from.x {
                    return None;
                }
                let lo = a.from.y.max(b.from.y);
                let hi = a.to.y.min(b.to.y);
                (lo <= hi).then(|| {
                    OrthoLine::new(Point::new(a.from.x, lo), Point::new(a.from.x, hi))
                })
            }
        }
    }
}

/// Half-open axis-aligned rectangle: `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn new(min: Point, max: Point) -> Self {
        debug_assert!(min.x < max.x && min.y < max.y);
        Rect { min, max }
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn translated(&self, offset: Point) -> Rect {
        Rect { min: self.min + offset, max: self.max + offset }
    }

    /// Area of the intersection of two half-open rectangles.
    pub fn overlap_area(&self, other: &Rect) -> i64 {
        let w = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let h = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if w <= 0 || h <= 0 {
            0
        } else {
            w as i64 * h as i64
        }
    }

    /// Chebyshev (L-infinity) distance between two rectangles; 0 when they
    /// touch or overlap.
    pub fn chebyshev_distance(&self, other: &Rect) -> i32 {
        let gx = (self.min.x - other.max.x).max(other.min.x - self.max.x).max(0);
        let gy = (self.min.y - other.max.y).max(other.min.y - self.max.y).max(0);
        gx.max(gy)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolygonError {
    #[error("polygon needs at least 4 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("edge from {0:?} to {1:?} is not axis-aligned")]
    SkewEdge(Point, Point),
    #[error("zero-length edge at {0:?}")]
    ZeroLengthEdge(Point),
    #[error("consecutive edges at {0:?} are collinear; merge them")]
    CollinearEdges(Point),
    #[error("polygon has zero area")]
    ZeroArea,
}

/// Closed orthogonal polygon on the integer grid.
///
/// Vertices are normalized to counterclockwise order; the interior then
/// lies to the left of every directed edge, which is what the door
/// handler relies on to compute wall facing. The rectangle partition is
/// exact, so summed pairwise rectangle overlaps equal polygon overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPolygon {
    vertices: Vec<Point>,
    rects: Vec<Rect>,
    bbox: Rect,
}

impl GridPolygon {
    pub fn new(mut vertices: Vec<Point>) -> Result<Self, PolygonError> {
        if vertices.len() < 4 {
            return Err(PolygonError::TooFewVertices(vertices.len()));
        }
        let n = vertices.len();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            if a == b {
                return Err(PolygonError::ZeroLengthEdge(a));
            }
            if a.x != b.x && a.y != b.y {
                return Err(PolygonError::SkewEdge(a, b));
            }
            let c = vertices[(i + 2) % n];
            let horizontal_ab = a.y == b.y;
            let horizontal_bc = b.y == c.y;
            if horizontal_ab == horizontal_bc {
                return Err(PolygonError::CollinearEdges(b));
            }
        }

        if signed_area2(&vertices) == 0 {
            return Err(PolygonError::ZeroArea);
        }
        if signed_area2(&vertices) < 0 {
            vertices.reverse();
        }

        let rects = partition_into_rects(&vertices);
        debug_assert!(!rects.is_empty());
        let bbox = bounding_box(&rects);
        Ok(GridPolygon { vertices, rects, bbox })
    }

    /// Axis-aligned rectangle with its lower-left corner at the origin.
    pub fn rectangle(width: i32, height: i32) -> Self {
        GridPolygon::new(vec![
            Point::new(0, 0),
            Point::new(width, 0),
            Point::new(width, height),
            Point::new(0, height),
        ])
        .expect("rectangle vertices are always a valid polygon")
    }

    /// Counterclockwise vertices.
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Directed boundary edges in counterclockwise order.
    pub fn edges(&self) -> impl Iterator<Item = OrthoLine> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| OrthoLine::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn bounding_box(&self) -> Rect {
        self.bbox
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Length of the bounding-box diagonal, used to seed energy scales.
    pub fn bbox_diagonal(&self) -> f64 {
        let w = self.bbox.width() as f64;
        let h = self.bbox.height() as f64;
        (w * w + h * h).sqrt()
    }

    pub fn translated_vertices(&self, offset: Point) -> Vec<Point> {
        self.vertices.iter().map(|&v| v + offset).collect()
    }
}

fn signed_area2(vertices: &[Point]) -> i64 {
    let n = vertices.len();
    let mut acc: i64 = 0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        acc += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    acc
}

fn bounding_box(rects: &[Rect]) -> Rect {
    let mut min = rects[0].min;
    let mut max = rects[0].max;
    for r in &rects[1..] {
        min.x = min.x.min(r.min.x);
        min.y = min.y.min(r.min.y);
        max.x = max.x.max(r.max.x);
        max.y = max.y.max(r.max.y);
    }
    Rect { min, max }
}

/// Slice an orthogonal polygon into horizontal bands and pair up the
/// vertical edges crossing each band; parity pairing yields the interior
/// x-intervals, each of which becomes one rectangle.
fn partition_into_rects(vertices: &[Point]) -> Vec<Rect> {
    let n = vertices.len();
    let mut ys: Vec<i32> = vertices.iter().map(|v| v.y).collect();
    ys.sort_unstable();
    ys.dedup();

    let mut rects = Vec::new();
    for band in ys.windows(2) {
        let (y0, y1) = (band[0], band[1]);
        let mut xs: Vec<i32> = Vec::new();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            if a.x != b.x {
                continue;
            }
            let (lo, hi) = (a.y.min(b.y), a.y.max(b.y));
            if lo <= y0 && hi >= y1 {
                xs.push(a.x);
            }
        }
        xs.sort_unstable();
        debug_assert!(xs.len() % 2 == 0);
        for pair in xs.chunks_exact(2) {
            rects.push(Rect::new(Point::new(pair[0], y0), Point::new(pair[1], y1)));
        }
    }
    rects
}

/// Overlap area of two placed polygons. Touching boundaries contribute
/// zero; only shared interior counts.
pub fn overlap_area(a: &GridPolygon, a_off: Point, b: &GridPolygon, b_off: Point) -> i64 {
    if a.bbox.translated(a_off).overlap_area(&b.bbox.translated(b_off)) == 0 {
        return 0;
    }
    let mut total = 0i64;
    for ra in a.rects() {
        let ra = ra.translated(a_off);
        for rb in b.rects() {
            total += ra.overlap_area(&rb.translated(b_off));
        }
    }
    total
}

/// Minimum Chebyshev distance between two placed polygons; 0 when they
/// touch or overlap. The bounding-box distance is only a lower bound
/// for non-rectangular outlines, so every rectangle pair is consulted.
pub fn chebyshev_distance(a: &GridPolygon, a_off: Point, b: &GridPolygon, b_off: Point) -> i32 {
    let mut best = i32::MAX;
    for ra in a.rects() {
        let ra = ra.translated(a_off);
        for rb in b.rects() {
            best = best.min(ra.chebyshev_distance(&rb.translated(b_off)));
            if best == 0 {
                return 0;
            }
        }
    }
    best
}
