//! Error types for YatraNav

use thiserror::Error;

/// YatraNav error type
#[derive(Error, Debug)]
pub enum NavError {
    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    #[error("transform unavailable: {0}")]
    TransformUnavailable(String),

    #[error("world coordinates ({0:.3}, {1:.3}) are off the map")]
    OffMap(f64, f64),

    #[error("global planner produced no plan")]
    NoPlan,

    #[error("local controller could not compute a velocity")]
    NoVelocity,

    #[error("a navigation goal is active")]
    GoalActive,

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
