// ==============================================================================
// suspension.rs: RAYCAST SUSPENSION + WHEEL CONTACT IMPULSES
// ------------------------------------------------------------------------------
// Each wheel casts a ray from its mount point along the chassis-down axis.
// A hit produces a WheelContact with:
// - geometry: hit point, suspension length
// - suspension state: compression, suspension velocity, normal force
// - wheel basis (forward/side) and slip components (v_long, v_lat)
//
// apply_wheel_forces() turns contacts into impulses at the contact point:
// normal (spring + damper), engine, brake and lateral grip. Engine, brake and
// grip are all capped by friction_slip * normal force.
// ==============================================================================

use rapier3d::prelude::*;
use tracing::trace;

use crate::physics::PhysicsWorld;
use crate::sensors::sensor_filter;
use crate::vehicle::Wheel;

#[derive(Clone, Debug)]
pub struct WheelContact {
    // geometry
    pub hit_point: Point<Real>,
    pub suspension_length: Real,

    // suspension state
    pub compression: Real,
    pub suspension_vel: Real,
    pub normal_force: Real,

    // wheel basis (world)
    pub up: Vector<Real>,
    pub forward: Vector<Real>,
    pub side: Vector<Real>,

    // slip
    pub v_long: Real,
    pub v_lat: Real,
}

const SOFT_ZONE_VEL: f32 = 0.05;
const SOFT_ZONE_DAMPING: f32 = 0.25;

pub(crate) fn compute_suspension_force(
    compression: f32,
    suspension_vel: f32,
    k: f32,
    c: f32,
) -> f32 {
    // Soft zone: light damping so small ripples still decay
    let v = if suspension_vel.abs() < SOFT_ZONE_VEL {
        suspension_vel * SOFT_ZONE_DAMPING
    } else {
        suspension_vel
    };

    // One-way damper (kills rebound)
    let v = if v > 0.0 { v * 0.4 } else { v };

    let spring = k * compression;
    let damper = (-c * v).clamp(-spring.abs() * 0.6, spring.abs() * 0.6);

    (spring + damper).max(0.0)
}

/// Ray reach of a wheel: fully extended suspension plus the tyre.
pub fn ray_length(wheel: &Wheel) -> Real {
    wheel.rest_length + wheel.max_travel + wheel.radius
}

pub fn build_wheel_contact(
    wheel: &Wheel,
    body: &RigidBody,
    world: &PhysicsWorld,
    chassis: RigidBodyHandle,
) -> Option<WheelContact> {
    let pose = body.position();
    let down = pose.rotation * wheel.direction;
    let up = -down;

    let origin = pose * wheel.connection;
    let target = origin + down * ray_length(wheel);
    let hit = world.cast_ray(origin, target, sensor_filter(chassis))?;

    let suspension_length = (hit.distance - wheel.radius).clamp(
        wheel.rest_length - wheel.max_travel,
        wheel.rest_length + wheel.max_travel,
    );
    let compression = wheel.rest_length - suspension_length;

    let point_vel = body.velocity_at_point(&hit.point);
    let suspension_vel = point_vel.dot(&up);

    let normal_force = compute_suspension_force(
        compression,
        suspension_vel,
        wheel.stiffness,
        wheel.damping,
    )
    .min(wheel.max_suspension_force);

    // chassis forward projected onto the contact plane
    let chassis_fwd = pose.rotation * vector![0.0, 0.0, 1.0];
    let forward = (chassis_fwd - up * chassis_fwd.dot(&up))
        .try_normalize(1e-6)
        .unwrap_or(chassis_fwd);
    let side = forward.cross(&up); // chassis right

    Some(WheelContact {
        hit_point: hit.point,
        suspension_length,
        compression,
        suspension_vel,
        normal_force,
        up,
        forward,
        side,
        v_long: point_vel.dot(&forward),
        v_lat: point_vel.dot(&side),
    })
}

/// Total impulse one grounded wheel delivers at its contact point.
pub fn contact_impulse(wheel: &Wheel, contact: &WheelContact, mass_share: Real, dt: Real) -> Vector<Real> {
    let grip = wheel.friction_slip * contact.normal_force; // N

    // normal
    let mut impulse = contact.up * contact.normal_force * dt;

    // engine
    let drive = wheel.engine_force.clamp(-grip, grip);
    impulse += contact.forward * drive * dt;

    // brake: never more than what stops this wheel's share of the mass
    if wheel.brake > 0.0 && contact.v_long.abs() > 1e-4 {
        let stop = contact.v_long.abs() * mass_share;
        let j = (wheel.brake * dt).min(stop).min(grip * dt);
        impulse -= contact.forward * contact.v_long.signum() * j;
    }

    // lateral grip
    let lateral = (-contact.v_lat * mass_share * wheel.side_grip).clamp(-grip * dt, grip * dt);
    impulse += contact.side * lateral;

    impulse
}

/// Measure every wheel, update its runtime state, then push the impulses into
/// the chassis.
pub fn apply_wheel_forces(
    wheels: &mut [Wheel; 4],
    chassis: RigidBodyHandle,
    mass: Real,
    world: &mut PhysicsWorld,
    dt: Real,
) {
    let mass_share = mass / wheels.len() as Real;
    let mut impulses: Vec<(Vector<Real>, Point<Real>)> = Vec::with_capacity(wheels.len());

    {
        let Some(body) = world.body(chassis) else { return };

        for wheel in wheels.iter_mut() {
            match build_wheel_contact(wheel, body, world, chassis) {
                Some(contact) => {
                    wheel.in_contact = true;
                    wheel.suspension_length = contact.suspension_length;
                    wheel.normal_force = contact.normal_force;
                    wheel.delta_rotation = contact.v_long * dt / wheel.radius;

                    impulses.push((contact_impulse(wheel, &contact, mass_share, dt), contact.hit_point));

                    trace!(
                        wheel = %wheel.index,
                        compression = contact.compression,
                        fz = contact.normal_force,
                        v_long = contact.v_long,
                        "wheel contact"
                    );
                }
                None => {
                    wheel.in_contact = false;
                    wheel.suspension_length = wheel.rest_length;
                    wheel.normal_force = 0.0;
                    wheel.delta_rotation *= 0.99;
                }
            }
            wheel.rotation = (wheel.rotation + wheel.delta_rotation) % std::f32::consts::TAU;
        }
    }

    if let Some(body) = world.body_mut(chassis) {
        for (impulse, point) in impulses {
            body.apply_impulse_at_point(impulse, point, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::config::{WorldConfig, ZUMO};
    use crate::vehicle::{create_vehicle, Spawn, Vehicle, WheelIndex};

    const DT: Real = 1.0 / 60.0;

    fn on_ground(spawn: Spawn) -> (PhysicsWorld, Vehicle) {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        world.add_ground();
        let vehicle = create_vehicle(&ZUMO, &spawn).unwrap().register_in_world(&mut world);
        (world, vehicle)
    }

    fn run(world: &mut PhysicsWorld, vehicle: &mut Vehicle, steps: usize) {
        for _ in 0..steps {
            vehicle.apply_wheel_forces(world, DT);
            world.step(DT);
        }
    }

    #[test]
    fn spring_pushes_only_when_compressed() {
        assert_relative_eq!(compute_suspension_force(0.1, 0.0, 200.0, 10.0), 20.0);
        assert_eq!(compute_suspension_force(-0.1, 0.0, 200.0, 10.0), 0.0);
    }

    #[test]
    fn damper_is_bounded_by_spring() {
        // fast compression: damper adds at most 60 % of the spring force
        let f = compute_suspension_force(0.1, -100.0, 200.0, 10.0);
        assert_relative_eq!(f, 32.0, epsilon = 1e-4);

        // fast rebound cannot pull the wheel into the ground
        let f = compute_suspension_force(0.1, 100.0, 200.0, 10.0);
        assert_relative_eq!(f, 8.0, epsilon = 1e-4);

        // tiny velocities are damped lightly, never ignored
        let f = compute_suspension_force(0.1, -0.04, 200.0, 10.0);
        assert_relative_eq!(f, 20.1, epsilon = 1e-4);
        let f = compute_suspension_force(0.1, 0.04, 200.0, 10.0);
        assert_relative_eq!(f, 19.96, epsilon = 1e-4);
    }

    #[test]
    fn airborne_wheels_report_rest_length() {
        let (mut world, mut vehicle) = on_ground(Spawn::at(0.0, 5.0, 0.0));
        vehicle.apply_wheel_forces(&mut world, DT);
        for wheel in &vehicle.wheels {
            assert!(!wheel.in_contact);
            assert_eq!(wheel.suspension_length, wheel.rest_length);
        }
    }

    #[test]
    fn vehicle_settles_on_its_suspension() {
        let (mut world, mut vehicle) = on_ground(Spawn::at(0.0, 0.8, 0.0));
        run(&mut world, &mut vehicle, 300);

        let body = vehicle.chassis_body(&world).unwrap();
        let y = body.translation().y;
        assert!(y > 0.1 && y < 1.5, "chassis height {y}");
        assert!(body.linvel().norm() < 0.1);
        assert!(vehicle.wheels.iter().all(|w| w.in_contact));
    }

    #[test]
    fn rear_engine_force_drives_forward() {
        let (mut world, mut vehicle) = on_ground(Spawn::at(0.0, 0.8, 0.0));
        run(&mut world, &mut vehicle, 60);

        vehicle.wheels[WheelIndex::RearRight.index()].engine_force = 20.0;
        vehicle.wheels[WheelIndex::RearLeft.index()].engine_force = 20.0;
        run(&mut world, &mut vehicle, 60);

        let body = vehicle.chassis_body(&world).unwrap();
        assert!(body.linvel().z > 0.5, "forward speed {}", body.linvel().z);
        assert!(body.linvel().x.abs() < 0.2);
    }

    #[test]
    fn brakes_bring_a_rolling_vehicle_to_rest() {
        let (mut world, mut vehicle) = on_ground(Spawn::at(0.0, 0.8, 0.0));
        run(&mut world, &mut vehicle, 60);

        world.body_mut(vehicle.chassis).unwrap().set_linvel(vector![0.0, 0.0, 2.0], true);
        for wheel in &mut vehicle.wheels {
            wheel.brake = 10.0;
        }
        run(&mut world, &mut vehicle, 120);

        let v = vehicle.chassis_body(&world).unwrap().linvel().z;
        assert!(v.abs() < 0.1, "residual speed {v}");
    }
}
