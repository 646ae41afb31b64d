//! Downward-looking line sensors under the chassis.

use rapier3d::prelude::*;

use crate::physics::PhysicsWorld;
use crate::sensors::{sensor_filter, LineReading};

#[derive(Debug, Clone, Copy)]
pub struct LineSensorArray {
    /// Chassis-local sensor points: outer-left, inner-left, middle, inner-right, outer-right.
    pub offsets: [[Real; 3]; 5],
    pub ray_length: Real,
}

impl LineSensorArray {
    pub fn read(&self, world: &PhysicsWorld, chassis: RigidBodyHandle) -> LineReading {
        let Some(body) = world.body(chassis) else { return LineReading::default() };
        let pose = body.position();
        let down = pose.rotation * vector![0.0, -1.0, 0.0];
        let filter = sensor_filter(chassis);

        let values = self.offsets.map(|offset| {
            let origin = pose * Point::from(offset);
            let target = origin + down * self.ray_length;

            world
                .cast_ray(origin, target, filter)
                .and_then(|hit| world.brightness(hit.collider))
                .unwrap_or(0.0)
        });

        LineReading::from_array(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WorldConfig, ZUMO};

    fn setup(height: Real) -> (PhysicsWorld, RigidBodyHandle, LineSensorArray) {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        world.add_ground();
        let chassis = world.insert_body(
            RigidBodyBuilder::fixed().translation(vector![0.0, height, 0.0]).build(),
            vec![ColliderBuilder::cuboid(0.7, 0.2, 0.9).build()],
        );
        let sensors = LineSensorArray {
            offsets: ZUMO.sensors.line_sensor_offsets,
            ray_length: ZUMO.sensors.line_ray_length,
        };
        (world, chassis, sensors)
    }

    #[test]
    fn plain_floor_reads_zero() {
        let (world, chassis, sensors) = setup(0.6);
        assert_eq!(sensors.read(&world, chassis), LineReading::default());
    }

    #[test]
    fn centered_line_only_lights_middle() {
        let (mut world, chassis, sensors) = setup(0.6);
        world.add_line(0.0, -2.0, 4.0, 0.0, 0.8);

        let reading = sensors.read(&world, chassis);
        assert_eq!(reading.middle, 0.8);
        assert_eq!(reading.inner_left, 0.0);
        assert_eq!(reading.inner_right, 0.0);
        assert_eq!(reading.outer_left, 0.0);
        assert_eq!(reading.outer_right, 0.0);
    }

    #[test]
    fn line_on_left_lights_outer_left() {
        let (mut world, chassis, sensors) = setup(0.6);
        // +X is the robot's left
        world.add_line(0.45, -2.0, 4.0, 0.0, 0.3);

        let reading = sensors.read(&world, chassis);
        assert_eq!(reading.outer_left, 0.3);
        assert_eq!(reading.middle, 0.0);
        assert_eq!(reading.outer_right, 0.0);
    }

    #[test]
    fn line_out_of_ray_reach_is_not_seen() {
        let (mut world, chassis, sensors) = setup(3.0);
        world.add_line(0.0, -2.0, 4.0, 0.0, 0.8);

        assert_eq!(sensors.read(&world, chassis), LineReading::default());
    }
}
