//! Data types of the engine's external surface.
//!
//! Every struct here derives Serialize + Deserialize so a level
//! description, generator configuration, and resulting layout can
//! round-trip through the JSON interchange format.

use serde::{Deserialize, Serialize};

use crate::doors::DoorMode;
use crate::geometry::{OrthoLine, Point};

// -- Level description ---------------------------------------------

/// A named room outline with its door rule. Rooms that may use several
/// outlines list several shape names; all variants of one `ShapeDef`
/// count as "the same shape" for repeat-mode purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDef {
    pub name: String,
    /// Orthogonal outline, any rotation direction; vertices on the grid.
    pub outline: Vec<Point>,
    #[serde(default)]
    pub doors: DoorMode,
}

impl ShapeDef {
    pub fn rectangle(name: &str, width: i32, height: i32) -> Self {
        ShapeDef {
            name: name.to_owned(),
            outline: vec![
                Point::new(0, 0),
                Point::new(width, 0),
                Point::new(width, height),
                Point::new(0, height),
            ],
            doors: DoorMode::default(),
        }
    }
}

/// Policy for reusing the same shape on several rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Any room may repeat any shape.
    #[default]
    Allow,
    /// Rooms connected by a passage must not share a shape.
    NoImmediate,
    /// No two rooms anywhere share a shape.
    NoRepeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDef {
    pub name: String,
    /// Names of allowed `ShapeDef`s.
    pub shapes: Vec<String>,
    #[serde(default)]
    pub is_corridor: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
}

impl RoomDef {
    pub fn room(name: &str, shapes: &[&str]) -> Self {
        RoomDef {
            name: name.to_owned(),
            shapes: shapes.iter().map(|s| (*s).to_owned()).collect(),
            is_corridor: false,
            repeat_mode: RepeatMode::default(),
        }
    }

    pub fn corridor(name: &str, shapes: &[&str]) -> Self {
        RoomDef { is_corridor: true, ..RoomDef::room(name, shapes) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub from: String,
    pub to: String,
}

impl Passage {
    pub fn new(from: &str, to: &str) -> Self {
        Passage { from: from.to_owned(), to: to.to_owned() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDescription {
    pub shapes: Vec<ShapeDef>,
    pub rooms: Vec<RoomDef>,
    pub passages: Vec<Passage>,
    /// Minimum Chebyshev distance between non-adjacent rooms.
    #[serde(default)]
    pub min_room_distance: i32,
}

// -- Generator configuration ---------------------------------------

fn default_max_tree_size() -> usize {
    8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Largest number of nodes a tree chain may hold.
    #[serde(default = "default_max_tree_size")]
    pub max_tree_size: usize,
    /// Solve tree chains by deterministic first-fit placement instead of
    /// annealing.
    #[serde(default)]
    pub greedy_trees: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig { max_tree_size: default_max_tree_size(), greedy_trees: false }
    }
}

fn default_cycles() -> u32 {
    50
}

fn default_trials_per_cycle() -> u32 {
    100
}

fn default_cooling_ratio() -> f64 {
    0.9
}

fn default_max_iterations_without_success() -> u32 {
    10_000
}

fn default_max_stage_two_failures() -> u32 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealingConfig {
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    #[serde(default = "default_trials_per_cycle")]
    pub trials_per_cycle: u32,
    /// Starting temperature; derived from the average shape size when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_temperature: Option<f64>,
    #[serde(default = "default_cooling_ratio")]
    pub cooling_ratio: f64,
    #[serde(default = "default_max_iterations_without_success")]
    pub max_iterations_without_success: u32,
    #[serde(default = "default_max_stage_two_failures")]
    pub max_stage_two_failures: u32,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        AnnealingConfig {
            cycles: default_cycles(),
            trials_per_cycle: default_trials_per_cycle(),
            initial_temperature: None,
            cooling_ratio: default_cooling_ratio(),
            max_iterations_without_success: default_max_iterations_without_success(),
            max_stage_two_failures: default_max_stage_two_failures(),
        }
    }
}

/// Per-chain annealing override, keyed by chain sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOverride {
    pub chain: usize,
    pub annealing: AnnealingConfig,
}

fn default_max_branching() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub chains: ChainConfig,
    #[serde(default)]
    pub annealing: AnnealingConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain_overrides: Vec<ChainOverride>,
    /// How many times one layout prefix may be expanded before the
    /// planner abandons it.
    #[serde(default = "default_max_branching")]
    pub max_branching: u32,
    /// Contract corridor rooms out of the planned graph and resolve them
    /// at conversion time.
    #[serde(default = "default_true")]
    pub optimize_corridor_constraints: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_mode_override: Option<RepeatMode>,
    /// Fail the generation when repeat-mode filtering leaves a room with
    /// no candidate shape.
    #[serde(default)]
    pub throw_if_repeat_mode_not_satisfied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stop_iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stop_ms: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            chains: ChainConfig::default(),
            annealing: AnnealingConfig::default(),
            chain_overrides: Vec::new(),
            max_branching: default_max_branching(),
            optimize_corridor_constraints: true,
            repeat_mode_override: None,
            throw_if_repeat_mode_not_satisfied: false,
            early_stop_iterations: None,
            early_stop_ms: None,
        }
    }
}

impl GeneratorConfig {
    /// Annealing parameters for one chain, with overrides applied.
    pub fn annealing_for_chain(&self, chain: usize) -> &AnnealingConfig {
        self.chain_overrides
            .iter()
            .find(|o| o.chain == chain)
            .map(|o| &o.annealing)
            .unwrap_or(&self.annealing)
    }
}

// -- Layout output -------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedRoom {
    pub room: String,
    pub shape: String,
    pub position: Point,
    /// Absolute outline vertices (outline of the shape plus position).
    pub outline: Vec<Point>,
}

/// The door segment realizing one passage of the input graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedDoor {
    pub from: String,
    pub to: String,
    pub line: OrthoLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayout {
    pub rooms: Vec<PlacedRoom>,
    pub doors: Vec<PlacedDoor>,
}

// -- Engine I/O ----------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParams {
    pub seed: u64,
    pub level: LevelDescription,
    #[serde(default)]
    pub config: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<MapLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub iterations: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
}

// -- Tests ---------------------------------------------------------
