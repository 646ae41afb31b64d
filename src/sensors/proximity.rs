//! Proximity sensor: three arcs of rays around the chassis.

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsWorld;
use crate::sensors::{sensor_filter, ProximityReading};

pub const FRONT_DEG: i32 = 0;
pub const RIGHT_DEG: i32 = 90;
pub const LEFT_DEG: i32 = 270;

/// Which hit of a sweep becomes the reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityPolicy {
    /// Distance of the first angle (ascending) that hits anything.
    #[default]
    FirstHit,
    /// Smallest distance over the whole arc.
    Nearest,
}

#[derive(Debug, Clone, Copy)]
pub struct ProximitySweep {
    pub range: Real,
    pub half_angle_deg: i32,
    pub policy: ProximityPolicy,
}

/// Chassis-local target of a ray at `angle_deg`, clockwise from forward (+Z)
/// towards the right (-X).
pub fn local_target(angle_deg: i32, range: Real) -> Point<Real> {
    let a = (angle_deg as Real).to_radians();
    point![-range * a.sin(), 0.0, range * a.cos()]
}

impl ProximitySweep {
    /// Sweep one arc centred on `center_deg`; 0 when nothing is in range.
    pub fn sweep(&self, world: &PhysicsWorld, chassis: RigidBodyHandle, center_deg: i32) -> f32 {
        let Some(body) = world.body(chassis) else { return 0.0 };
        let pose = body.position();
        let source: Point<Real> = pose.translation.vector.into();
        let filter = sensor_filter(chassis);

        let mut nearest: Option<Real> = None;

        for angle in (center_deg - self.half_angle_deg)..=(center_deg + self.half_angle_deg) {
            let target = pose * local_target(angle, self.range);
            let Some(hit) = world.cast_ray(source, target, filter) else { continue };

            match self.policy {
                ProximityPolicy::FirstHit => return hit.distance,
                ProximityPolicy::Nearest => {
                    nearest = Some(nearest.map_or(hit.distance, |d| d.min(hit.distance)));
                }
            }
        }

        nearest.unwrap_or(0.0)
    }

    pub fn read(&self, world: &PhysicsWorld, chassis: RigidBodyHandle) -> ProximityReading {
        ProximityReading {
            front: self.sweep(world, chassis, FRONT_DEG),
            right: self.sweep(world, chassis, RIGHT_DEG),
            left: self.sweep(world, chassis, LEFT_DEG),
        }
    }
}
