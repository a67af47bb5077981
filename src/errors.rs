//! Error surface of the engine.
//!
//! Configuration errors are detected before any generation state exists;
//! generation errors describe a run that started and could not finish.
//! Invariant violations (negative energy, asymmetric configuration
//! spaces) are bugs, not inputs, and panic with diagnostic context
//! instead of appearing here.

use thiserror::Error;

use crate::doors::DoorError;
use crate::geometry::PolygonError;
use crate::types::MapLayout;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("duplicate shape name `{0}`")]
    DuplicateShape(String),
    #[error("duplicate room name `{0}`")]
    DuplicateRoom(String),
    #[error("invalid outline for shape `{shape}`: {source}")]
    BadOutline {
        shape: String,
        #[source]
        source: PolygonError,
    },
    #[error("invalid doors for shape `{shape}`: {source}")]
    BadDoors {
        shape: String,
        #[source]
        source: DoorError,
    },
    #[error("room `{room}` references unknown shape `{shape}`")]
    UnknownShape { room: String, shape: String },
    #[error("room `{0}` allows no shapes")]
    NoShapes(String),
    #[error("passage references unknown room `{0}`")]
    UnknownRoom(String),
    #[error("passage from `{0}` to itself")]
    SelfLoop(String),
    #[error("duplicate passage between `{0}` and `{1}`")]
    DuplicatePassage(String, String),
    #[error("level graph is not connected")]
    Disconnected,
    #[error("level has no rooms")]
    EmptyLevel,
    #[error("corridor `{room}` has {degree} neighbors; corridors need exactly 2")]
    CorridorDegree { room: String, degree: usize },
    #[error("two corridors `{0}` and `{1}` are adjacent")]
    AdjacentCorridors(String, String),
    #[error("minimum room distance must be non-negative, got {0}")]
    NegativeMinDistance(i32),
    #[error("a cancellation token cannot be combined with early-stop bounds")]
    CancellationWithEarlyStop,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no candidate shape for room `{0}` satisfies the repeat mode")]
    RepeatModeUnsatisfied(String),
    #[error("planner exhausted every layout prefix without a valid layout")]
    PlannerExhausted,
    #[error("iteration budget of {0} exceeded")]
    IterationBudgetExceeded(u64),
    #[error("time budget of {0} ms exceeded")]
    TimeBudgetExceeded(u64),
    /// Cooperative cancellation; carries the best layout reached, which
    /// may be partial and invalid.
    #[error("generation cancelled")]
    Cancelled { partial: Option<Box<MapLayout>> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_name_the_offender() {
        let err = ConfigError::CorridorDegree { room: "hall".into(), degree: 3 };
        assert!(err.to_string().contains("hall"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn config_error_wraps_into_generation_error() {
        let err: GenerationError = ConfigError::Disconnected.into();
        assert!(matches!(err, GenerationError::Config(ConfigError::Disconnected)));
    }
}
