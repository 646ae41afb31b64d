//! Zumo robot emulation on rapier3d: a raycast-suspension vehicle, its
//! virtual sensors and the motor/keyboard control mapping.

pub mod config;
pub mod control;
pub mod error;
pub mod net;
pub mod physics;
pub mod schedule;
pub mod sensors;
pub mod sim;
pub mod state;
pub mod suspension;
pub mod vehicle;

pub use config::{VehicleConfig, WorldConfig, ZUMO};
pub use control::{ControlCommand, DriveState, Key, KeyCommand};
pub use error::{Result, SimError};
pub use physics::PhysicsWorld;
pub use sim::Simulation;
pub use vehicle::{create_vehicle, PendingVehicle, Spawn, Vehicle, VehicleId, WheelIndex};
