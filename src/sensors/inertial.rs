//! Accelerometer, gyroscope and magnetometer emulation.
//!
//! The accelerometer is a backward difference of the chassis velocity between
//! two sampling ticks. Anything that happens inside one period and returns
//! the body to the same velocity is invisible to it.

use rapier3d::prelude::*;

use crate::sensors::{AccelerationSample, AngularVelocitySample, OrientationSample, SensorState};

/// `current - previous`, then remember `current`.
pub fn sample_acceleration(state: &mut SensorState, current: &Vector<Real>) -> AccelerationSample {
    let [px, py, pz] = state.previous_velocity;
    let sample = AccelerationSample {
        x: current.x - px,
        y: current.y - py,
        z: current.z - pz,
    };
    state.previous_velocity = [current.x, current.y, current.z];
    state.acceleration = sample;
    sample
}

/// Unfiltered angular velocity of the body at read time.
pub fn angular_velocity(body: &RigidBody) -> AngularVelocitySample {
    let w = body.angvel();
    AngularVelocitySample { x: w.x, y: w.y, z: w.z }
}

pub fn orientation_degrees(rotation: &Rotation<Real>) -> OrientationSample {
    let (roll, pitch, yaw) = rotation.euler_angles();
    OrientationSample {
        x: roll.to_degrees(),
        y: pitch.to_degrees(),
        z: yaw.to_degrees(),
    }
}

pub fn sample_orientation(state: &mut SensorState, rotation: &Rotation<Real>) -> OrientationSample {
    let sample = orientation_degrees(rotation);
    state.orientation = sample;
    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rapier3d::na::UnitQuaternion;

    #[test]
    fn first_sample_is_difference_from_rest() {
        let mut state = SensorState::default();
        let a = sample_acceleration(&mut state, &vector![1.0, 0.0, -2.0]);
        assert_eq!(a, AccelerationSample { x: 1.0, y: 0.0, z: -2.0 });
        assert_eq!(state.acceleration, a);
    }

    #[test]
    fn unchanged_velocity_reads_zero() {
        let mut state = SensorState::default();
        sample_acceleration(&mut state, &vector![3.0, 0.5, 1.0]);
        let a = sample_acceleration(&mut state, &vector![3.0, 0.5, 1.0]);
        assert_eq!(a, AccelerationSample::default());
    }

    #[test]
    fn each_sample_differences_against_the_last_one() {
        let mut state = SensorState::default();
        sample_acceleration(&mut state, &vector![2.0, 0.0, 0.0]);

        let a = sample_acceleration(&mut state, &vector![1.5, 0.0, 0.0]);
        assert_relative_eq!(a.x, -0.5);

        // reference is the previous sample, not the first one
        let a = sample_acceleration(&mut state, &vector![1.5, -1.0, 0.0]);
        assert_relative_eq!(a.x, 0.0);
        assert_relative_eq!(a.y, -1.0);
        assert_eq!(state.previous_velocity, [1.5, -1.0, 0.0]);
    }

    #[test]
    fn orientation_is_reported_in_degrees() {
        let yaw = UnitQuaternion::from_axis_angle(&Vector::z_axis(), 30.0_f32.to_radians());
        let o = orientation_degrees(&yaw);
        assert_relative_eq!(o.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(o.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(o.z, 30.0, epsilon = 1e-3);

        let roll = UnitQuaternion::from_axis_angle(&Vector::x_axis(), -45.0_f32.to_radians());
        let o = orientation_degrees(&roll);
        assert_relative_eq!(o.x, -45.0, epsilon = 1e-3);
    }

    #[test]
    fn gyroscope_reads_body_angvel() {
        let body = RigidBodyBuilder::dynamic().angvel(vector![0.0, 0.7, 0.1]).build();
        let w = angular_velocity(&body);
        assert_eq!(w, AngularVelocitySample { x: 0.0, y: 0.7, z: 0.1 });
    }
}
