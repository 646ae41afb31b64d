//! Error type shared by the simulation core.

use thiserror::Error;

use crate::vehicle::VehicleId;

#[derive(Debug, Error)]
pub enum SimError {
    /// Physical parameters rejected at construction time.
    #[error("invalid vehicle configuration: {0}")]
    InvalidConfig(String),

    /// Vehicle lookup by position past the end of the vehicle list.
    #[error("no vehicle at index {index} (vehicle count = {count})")]
    VehicleIndex { index: usize, count: usize },

    #[error("unknown vehicle id {0}")]
    UnknownVehicle(VehicleId),

    #[error("unsupported key code {0}")]
    UnknownKey(u32),

    /// Engine-force command arriving after `set_motor_velocity` in the same tick.
    #[error("vehicle {0} had its velocity set this tick; engine-force command rejected")]
    VelocityOverride(VehicleId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
