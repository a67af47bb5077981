//! Configuration-space precomputation.
//!
//! For every ordered pair of shape variants, the configuration space is
//! the set of relative offsets at which the second shape connects to the
//! first through at least one door pair without any interior overlap.
//! Spaces are computed once per generation and immutable afterwards; the
//! evolver only ever does membership tests, intersections, and
//! nearest-offset queries against them.

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasherDefault, Hasher};

use rayon::prelude::*;

use crate::geometry::{overlap_area, Point};
use crate::mapping::ShapeVariant;

/// Fast non-cryptographic hasher (FxHash) for small integer keys.
/// A single multiply-XOR per write; much faster than the default SipHash
/// for hash-set probes on known-safe keys like grid offsets.
pub(crate) struct FxHasher {
    hash: u64,
}

/// Constant from Firefox/rustc FxHash: a good odd multiplier for mixing.
const FX_SEED: u64 = 0x517c_c1b7_2722_0a95;

impl FxHasher {
    #[inline]
    fn mix(&mut self, i: u64) {
        self.hash = (self.hash.rotate_left(5) ^ i).wrapping_mul(FX_SEED);
    }
}

impl Hasher for FxHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.hash
    }

    #[inline]
    fn write(&mut self, _bytes: &[u8]) {
        // Only the integer writes below are used in this crate.
        unreachable!("FxHasher: unsupported write width");
    }

    #[inline]
    fn write_i32(&mut self, i: i32) {
        self.mix(i as u32 as u64);
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.mix(i);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.mix(i as u64);
    }
}

impl Default for FxHasher {
    #[inline]
    fn default() -> Self {
        FxHasher { hash: 0 }
    }
}

type FxBuildHasher = BuildHasherDefault<FxHasher>;
pub(crate) type FxHashSet<T> = HashSet<T, FxBuildHasher>;
pub(crate) type FxHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Offsets at which one shape connects to another. `offsets` is sorted
/// by `(y, x)` so iteration order never depends on hashing.
#[derive(Debug, Clone, Default)]
pub struct ConfigSpace {
    offsets: Vec<Point>,
    members: FxHashSet<Point>,
}

impl ConfigSpace {
    fn from_offsets(mut offsets: Vec<Point>) -> Self {
        offsets.sort_unstable_by_key(|p| (p.y, p.x));
        offsets.dedup();
        let members = offsets.iter().copied().collect();
        ConfigSpace { offsets, members }
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn offsets(&self) -> &[Point] {
        &self.offsets
    }

    pub fn contains(&self, offset: Point) -> bool {
        self.members.contains(&offset)
    }

    /// L1 distance from `offset` to the closest member, `None` when the
    /// space is empty.
    pub fn nearest_l1(&self, offset: Point) -> Option<i64> {
        self.offsets.iter().map(|&o| (o - offset).l1_norm()).min()
    }
}

/// All pairwise configuration spaces plus the derived scalar metadata.
#[derive(Debug, Clone)]
pub struct ConfigSpaces {
    shape_count: usize,
    /// Indexed `fixed * shape_count + moving`.
    spaces: Vec<ConfigSpace>,
    /// Two-hop spaces through a corridor shape, keyed
    /// `(fixed, via, moving)`. Only populated for corridor shapes.
    two_hop: FxHashMap<(usize, usize, usize), ConfigSpace>,
    average_size: f64,
    aliases: Vec<usize>,
}

impl ConfigSpaces {
    /// Precompute every ordered pair, plus the two-hop sums through each
    /// shape in `corridor_shapes`. Pair computations are independent, so
    /// they run on the rayon pool; everything after construction is
    /// read-only.
    pub fn build(shapes: &[ShapeVariant], corridor_shapes: &[usize]) -> ConfigSpaces {
        let n = shapes.len();
        let spaces: Vec<ConfigSpace> = (0..n * n)
            .into_par_iter()
            .map(|index| {
                let fixed = &shapes[index / n];
                let moving = &shapes[index % n];
                pair_space(fixed, moving)
            })
            .collect();

        let mut two_hop = FxHashMap::default();
        for &via in corridor_shapes {
            for fixed in 0..n {
                for moving in 0..n {
                    let first = &spaces[fixed * n + via];
                    let second = &spaces[via * n + moving];
                    let mut sums =
                        Vec::with_capacity(first.len() * second.len());
                    for &a in first.offsets() {
                        for &b in second.offsets() {
                            sums.push(a + b);
                        }
                    }
                    two_hop.insert(
                        (fixed, via, moving),
                        ConfigSpace::from_offsets(sums),
                    );
                }
            }
        }

        let average_size = if shapes.is_empty() {
            0.0
        } else {
            shapes.iter().map(|s| s.polygon.bbox_diagonal()).sum::<f64>()
                / shapes.len() as f64
        };
        let aliases = shapes.iter().map(|s| s.alias).collect();
        ConfigSpaces { shape_count: n, spaces, two_hop, average_size, aliases }
    }

    /// Offsets placing shape `moving` relative to a fixed shape `fixed`.
    pub fn get(&self, fixed: usize, moving: usize) -> &ConfigSpace {
        &self.spaces[fixed * self.shape_count + moving]
    }

    /// Offsets placing `moving` relative to `fixed` such that some
    /// placement of the corridor shape `via` connects to both.
    pub fn two_hop(&self, fixed: usize, via: usize, moving: usize) -> Option<&ConfigSpace> {
        self.two_hop.get(&(fixed, via, moving))
    }

    /// Mean bounding-box diagonal across all variants; seeds the
    /// annealing temperature scale.
    pub fn average_size(&self) -> f64 {
        self.average_size
    }

    /// Equivalence alias of each shape variant.
    pub fn alias_of(&self, shape: usize) -> usize {
        self.aliases[shape]
    }
}

/// Configuration space of one ordered pair: match every opposite-facing
/// equal-length door pair, then drop offsets with interior overlap.
fn pair_space(fixed: &ShapeVariant, moving: &ShapeVariant) -> ConfigSpace {
    let mut candidates = Vec::new();
    for door_f in &fixed.doors {
        for door_m in &moving.doors {
            if door_m.facing != door_f.facing.opposite() {
                continue;
            }
            if door_m.length() != door_f.length() {
                continue;
            }
            // Both lines are normalized, so the doors coincide exactly
            // when the moving shape is shifted by the difference of the
            // line origins.
            candidates.push(door_f.line.from - door_m.line.from);
        }
    }
    candidates.retain(|&delta| {
        overlap_area(&fixed.polygon, Point::new(0, 0), &moving.polygon, delta) == 0
    });
    ConfigSpace::from_offsets(candidates)
}
