//! Virtual sensors of the robot.
//!
//! Every reading is a plain value snapshot. A reading of 0 means "nothing
//! detected"; an object touching the sensor cannot be told apart from that.

pub mod inertial;
pub mod line;
pub mod proximity;

use rapier3d::prelude::{QueryFilter, RigidBodyHandle};
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsWorld;
use crate::vehicle::Vehicle;
use line::LineSensorArray;
use proximity::ProximitySweep;

/// Velocity difference between two consecutive samples (m/s per period).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Chassis angular velocity, world frame (rad/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AngularVelocitySample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Euler angles of the chassis in degrees (roll about X, pitch about Y, yaw about Z).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Distance to the detected object per direction, meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProximityReading {
    pub left: f32,
    pub right: f32,
    pub front: f32,
}

/// Brightness seen by each line sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LineReading {
    pub outer_left: f32,
    pub inner_left: f32,
    pub middle: f32,
    pub inner_right: f32,
    pub outer_right: f32,
}

impl LineReading {
    pub fn from_array(v: [f32; 5]) -> Self {
        Self {
            outer_left: v[0],
            inner_left: v[1],
            middle: v[2],
            inner_right: v[3],
            outer_right: v[4],
        }
    }
}

/// Published readings of one vehicle, refreshed by its samplers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorState {
    pub acceleration: AccelerationSample,
    pub orientation: OrientationSample,
    pub proximity: ProximityReading,
    pub line: LineReading,
    #[serde(skip)]
    pub previous_velocity: [f32; 3],
}

/// Sensor rays never see the robot's own chassis or any sensor collider
/// (wheel bodies included).
pub(crate) fn sensor_filter(chassis: RigidBodyHandle) -> QueryFilter<'static> {
    QueryFilter::default().exclude_rigid_body(chassis).exclude_sensors()
}

impl Vehicle {
    pub fn proximity_sweep(&self) -> ProximitySweep {
        let s = &self.config.sensors;
        ProximitySweep {
            range: s.proximity_range,
            half_angle_deg: s.proximity_half_angle_deg,
            policy: s.proximity_policy,
        }
    }

    pub fn line_sensors(&self) -> LineSensorArray {
        LineSensorArray {
            offsets: self.config.sensors.line_sensor_offsets,
            ray_length: self.config.sensors.line_ray_length,
        }
    }

    // ---- fresh reads ----

    pub fn read_proximity(&self, world: &PhysicsWorld) -> ProximityReading {
        self.proximity_sweep().read(world, self.chassis)
    }

    pub fn read_line(&self, world: &PhysicsWorld) -> LineReading {
        self.line_sensors().read(world, self.chassis)
    }

    pub fn gyroscope_reading(&self, world: &PhysicsWorld) -> AngularVelocitySample {
        world
            .body(self.chassis)
            .map(inertial::angular_velocity)
            .unwrap_or_default()
    }

    // ---- last published samples ----

    pub fn accelerometer_reading(&self) -> AccelerationSample {
        self.sensors.acceleration
    }

    pub fn magnetometer_reading(&self) -> OrientationSample {
        self.sensors.orientation
    }

    pub fn proximity_reading(&self) -> ProximityReading {
        self.sensors.proximity
    }

    pub fn line_reading(&self) -> LineReading {
        self.sensors.line
    }

    // ---- sampler bodies ----

    pub fn sample_acceleration(&mut self, world: &PhysicsWorld) {
        if let Some(body) = world.body(self.chassis) {
            inertial::sample_acceleration(&mut self.sensors, body.linvel());
        }
    }

    pub fn sample_orientation(&mut self, world: &PhysicsWorld) {
        if let Some(body) = world.body(self.chassis) {
            inertial::sample_orientation(&mut self.sensors, body.rotation());
        }
    }

    pub fn sample_proximity(&mut self, world: &PhysicsWorld) {
        self.sensors.proximity = self.read_proximity(world);
    }

    pub fn sample_line(&mut self, world: &PhysicsWorld) {
        self.sensors.line = self.read_line(world);
    }
}
