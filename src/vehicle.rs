// src/vehicle.rs

use std::fmt;

use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::config::{suspension_from_sag, VehicleConfig};
use crate::control::ControlState;
use crate::error::{Result, SimError};
use crate::physics::{PhysicsWorld, GROUP_CHASSIS, GROUP_GROUND, GROUP_PROP};
use crate::sensors::SensorState;

// ============================================
// Wheel identification
// ============================================

/// Physical corner of a wheel. The discriminant is the wheel index the
/// control layer addresses; it never changes for the life of a vehicle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelIndex {
    FrontRight = 0,
    FrontLeft = 1,
    RearRight = 2,
    RearLeft = 3,
}

impl WheelIndex {
    pub const ALL: [WheelIndex; 4] = [
        WheelIndex::FrontRight,
        WheelIndex::FrontLeft,
        WheelIndex::RearRight,
        WheelIndex::RearLeft,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelIndex::FrontRight => "FR",
            WheelIndex::FrontLeft => "FL",
            WheelIndex::RearRight => "RR",
            WheelIndex::RearLeft => "RL",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelIndex::FrontRight | WheelIndex::FrontLeft)
    }

    pub fn is_rear(&self) -> bool {
        !self.is_front()
    }

    pub fn is_left(&self) -> bool {
        matches!(self, WheelIndex::FrontLeft | WheelIndex::RearLeft)
    }

    pub fn is_right(&self) -> bool {
        !self.is_left()
    }
}

impl fmt::Display for WheelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct Wheel {
    pub index: WheelIndex,
    pub connection: Point<Real>, // chassis local
    pub direction: Vector<Real>, // suspension direction, chassis local
    pub radius: Real,
    pub rest_length: Real,
    pub max_travel: Real,
    pub stiffness: Real,         // spring constant
    pub damping: Real,           // damper constant
    pub friction_slip: Real,
    pub side_grip: Real,
    pub max_suspension_force: Real,

    pub engine_force: Real,      // N, written by the control layer
    pub brake: Real,             // N, written by the control layer

    pub in_contact: bool,
    pub suspension_length: Real,
    pub normal_force: Real,
    pub rotation: Real,          // spin about the axle (rad)
    pub delta_rotation: Real,
}

impl Wheel {
    fn new(index: WheelIndex, config: &VehicleConfig, stiffness: Real, damping: Real) -> Self {
        let w = &config.wheel;
        Self {
            index,
            connection: Point::from(config.wheel_connections[index.index()]),
            direction: vector![0.0, -1.0, 0.0],
            radius: w.radius,
            rest_length: w.rest_length,
            max_travel: w.max_travel,
            stiffness,
            damping,
            friction_slip: w.friction_slip,
            side_grip: w.side_grip,
            max_suspension_force: w.max_suspension_force,
            engine_force: 0.0,
            brake: 0.0,
            in_contact: false,
            suspension_length: w.rest_length,
            normal_force: 0.0,
            rotation: 0.0,
            delta_rotation: 0.0,
        }
    }

    /// World pose of the wheel for the given chassis pose.
    pub fn world_transform(&self, chassis: &Isometry<Real>) -> Isometry<Real> {
        let mount = chassis * self.connection;
        let down = chassis.rotation * self.direction;
        let center = mount + down * self.suspension_length;
        let spin = UnitQuaternion::from_axis_angle(&Vector::x_axis(), self.rotation);
        Isometry::from_parts(center.coords.into(), chassis.rotation * spin)
    }
}

// ============================================
// Vehicle identity + construction
// ============================================

/// Identity of a vehicle inside its world (wraps the chassis handle).
///
/// Shown as `index.generation`: a slot reused after a removal gets a new
/// generation, so ids never repeat within one world.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VehicleId(pub RigidBodyHandle);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, generation) = self.0.into_raw_parts();
        write!(f, "{index}.{generation}")
    }
}

impl Serialize for VehicleId {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Where and how a vehicle enters the world.
#[derive(Clone, Copy, Debug)]
pub struct Spawn {
    pub position: Vector<Real>,
    pub orientation: Rotation<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Vector<Real>,
}

impl Spawn {
    pub fn at(x: Real, y: Real, z: Real) -> Self {
        Self {
            position: vector![x, y, z],
            orientation: UnitQuaternion::identity(),
            linvel: Vector::zeros(),
            angvel: Vector::zeros(),
        }
    }

    /// Heading in degrees about world up; 0 faces +Z.
    pub fn heading(mut self, degrees: Real) -> Self {
        self.orientation = UnitQuaternion::from_axis_angle(&Vector::y_axis(), degrees.to_radians());
        self
    }
}

/// Chassis state captured at construction; only `reset_to_initial_state` reads it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InitialState {
    pub position: Vector<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Vector<Real>,
    pub orientation: Rotation<Real>,
}

/// A validated vehicle that has not been added to a world yet.
#[derive(Debug)]
pub struct PendingVehicle {
    config: VehicleConfig,
    initial: InitialState,
    wheels: [Wheel; 4],
}

/// Validate the description and lay out the four wheels in index order.
pub fn create_vehicle(config: &VehicleConfig, spawn: &Spawn) -> Result<PendingVehicle> {
    config.validate()?;

    let q = spawn.orientation.quaternion().coords;
    let finite = spawn.position.iter()
        .chain(spawn.linvel.iter())
        .chain(spawn.angvel.iter())
        .chain(q.iter())
        .all(|v| v.is_finite());
    if !finite {
        return Err(SimError::InvalidConfig("spawn state must be finite".to_string()));
    }

    let (k, c) = suspension_from_sag(config.mass, 4, config.suspension_sag, config.damping_ratio);

    Ok(PendingVehicle {
        config: *config,
        initial: InitialState {
            position: spawn.position,
            linvel: spawn.linvel,
            angvel: spawn.angvel,
            orientation: spawn.orientation,
        },
        wheels: WheelIndex::ALL.map(|i| Wheel::new(i, config, k, c)),
    })
}

impl PendingVehicle {
    pub fn initial_state(&self) -> &InitialState {
        &self.initial
    }

    /// Add the chassis and the four wheel bodies to `world`.
    pub fn register_in_world(self, world: &mut PhysicsWorld) -> Vehicle {
        let config = self.config;
        let init = self.initial;
        let [hx, hy, hz] = config.chassis_half_extents;
        let volume = 8.0 * hx * hy * hz;
        let density = config.mass / volume; // ρ = m / V

        let rb = RigidBodyBuilder::dynamic()
            .position(Isometry::from_parts(init.position.into(), init.orientation))
            .linvel(init.linvel)
            .angvel(init.angvel)
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .ccd_enabled(true)
            .build();

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(
                GROUP_CHASSIS,
                GROUP_GROUND | GROUP_CHASSIS | GROUP_PROP,
            ))
            .density(density)
            .friction(0.0) // wheels carry all traction
            .restitution(0.0)
            .build();

        let chassis = world.insert_body(rb, vec![collider]);

        // Wheel bodies only mirror the suspension pose: no mass, no contacts.
        let wheel_bodies = self.wheels.clone().map(|wheel| {
            let pose = wheel.world_transform(&Isometry::from_parts(init.position.into(), init.orientation));
            let body = RigidBodyBuilder::kinematic_position_based().position(pose).build();
            let shape = ColliderBuilder::cylinder(wheel.radius / 4.0, wheel.radius)
                .rotation(vector![0.0, 0.0, std::f32::consts::FRAC_PI_2])
                .collision_groups(InteractionGroups::none())
                .sensor(true)
                .density(0.0)
                .build();
            world.insert_body(body, vec![shape])
        });

        let id = VehicleId(chassis);
        info!(vehicle = %id, position = ?init.position, "vehicle registered");

        Vehicle {
            id,
            chassis,
            wheels: self.wheels,
            wheel_bodies,
            config,
            initial: init,
            sensors: SensorState::default(),
            control: ControlState::default(),
        }
    }
}

// ============================================
// Registered vehicle
// ============================================

pub struct Vehicle {
    id: VehicleId,
    pub chassis: RigidBodyHandle,       // the chassis body
    pub wheels: [Wheel; 4],             // indexed by WheelIndex
    pub wheel_bodies: [RigidBodyHandle; 4],
    pub config: VehicleConfig,          // vehicle parameters
    initial: InitialState,
    pub sensors: SensorState,           // published readings
    pub(crate) control: ControlState,
}

impl Vehicle {
    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn initial_state(&self) -> &InitialState {
        &self.initial
    }

    pub fn wheel(&self, index: WheelIndex) -> &Wheel {
        &self.wheels[index.index()]
    }

    pub fn chassis_body<'w>(&self, world: &'w PhysicsWorld) -> Option<&'w RigidBody> {
        world.body(self.chassis)
    }

    /// Suspension, drive and brake impulses for this step. Runs before integration.
    pub fn apply_wheel_forces(&mut self, world: &mut PhysicsWorld, dt: Real) {
        crate::suspension::apply_wheel_forces(&mut self.wheels, self.chassis, self.config.mass, world, dt);
    }

    /// Post-step: copy each wheel's suspension pose into its kinematic body.
    pub fn sync_wheel_transforms(&self, world: &mut PhysicsWorld) {
        let Some(pose) = world.body(self.chassis).map(|b| *b.position()) else { return };

        for (wheel, handle) in self.wheels.iter().zip(self.wheel_bodies) {
            let t = wheel.world_transform(&pose);
            if let Some(body) = world.body_mut(handle) {
                body.set_position(t, false);
            }
        }
    }

    /// Put the chassis back where it was created. Engine and brake state are
    /// left to the control layer.
    pub fn reset_to_initial_state(&mut self, world: &mut PhysicsWorld) {
        let init = self.initial;
        if let Some(body) = world.body_mut(self.chassis) {
            body.set_position(Isometry::from_parts(init.position.into(), init.orientation), true);
            body.set_linvel(init.linvel, true);
            body.set_angvel(init.angvel, true);
        }

        for wheel in &mut self.wheels {
            wheel.in_contact = false;
            wheel.suspension_length = wheel.rest_length;
            wheel.normal_force = 0.0;
            wheel.delta_rotation = 0.0;
        }
        self.sync_wheel_transforms(world);

        info!(vehicle = %self.id, "reset to initial state");
    }

    /// Remove the chassis and wheel bodies from `world`.
    pub fn remove_from_world(self, world: &mut PhysicsWorld) {
        for handle in self.wheel_bodies {
            world.remove_body(handle);
        }
        world.remove_body(self.chassis);
        info!(vehicle = %self.id, "vehicle removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::config::{WorldConfig, ZUMO};

    fn registered(spawn: Spawn) -> (PhysicsWorld, Vehicle) {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let vehicle = create_vehicle(&ZUMO, &spawn).unwrap().register_in_world(&mut world);
        (world, vehicle)
    }

    #[test]
    fn wheels_are_laid_out_in_index_order() {
        let (_world, vehicle) = registered(Spawn::at(0.0, 1.0, 0.0));
        for (i, wheel) in vehicle.wheels.iter().enumerate() {
            assert_eq!(wheel.index.index(), i);
        }

        let fr = vehicle.wheel(WheelIndex::FrontRight);
        let rl = vehicle.wheel(WheelIndex::RearLeft);
        // right is -X, forward is +Z
        assert!(fr.connection.x < 0.0 && fr.connection.z > 0.0);
        assert!(rl.connection.x > 0.0 && rl.connection.z < 0.0);
        assert!(WheelIndex::RearLeft.is_left() && WheelIndex::RearLeft.is_rear());
        assert!(WheelIndex::FrontRight.is_right() && WheelIndex::FrontRight.is_front());
    }

    #[test]
    fn rejects_malformed_configs() {
        let bad = VehicleConfig { mass: -1.0, ..ZUMO };
        assert!(matches!(
            create_vehicle(&bad, &Spawn::at(0.0, 1.0, 0.0)),
            Err(SimError::InvalidConfig(_))
        ));

        let nan_spawn = Spawn::at(f32::NAN, 1.0, 0.0);
        assert!(create_vehicle(&ZUMO, &nan_spawn).is_err());
    }

    #[test]
    fn registration_adds_chassis_and_kinematic_wheels() {
        let (world, vehicle) = registered(Spawn::at(0.0, 1.0, 0.0));
        // chassis + 4 wheels
        assert_eq!(world.bodies.len(), 5);

        let chassis = vehicle.chassis_body(&world).unwrap();
        assert!(chassis.is_dynamic());

        for handle in vehicle.wheel_bodies {
            let body = world.body(handle).unwrap();
            assert!(body.is_kinematic());
            let collider = &world.colliders[body.colliders()[0]];
            assert!(collider.is_sensor());
            assert!(collider.collision_groups().memberships.is_empty());
        }
    }

    #[test]
    fn wheel_transforms_follow_the_chassis() {
        let (mut world, vehicle) = registered(Spawn::at(2.0, 1.0, -3.0));
        vehicle.sync_wheel_transforms(&mut world);

        let fr = world.body(vehicle.wheel_bodies[WheelIndex::FrontRight.index()]).unwrap();
        let rest = ZUMO.wheel.rest_length;
        assert_relative_eq!(fr.translation().x, 2.0 - 0.9, epsilon = 1e-5);
        assert_relative_eq!(fr.translation().y, 1.0 - rest, epsilon = 1e-5);
        assert_relative_eq!(fr.translation().z, -3.0 + 0.6, epsilon = 1e-5);
    }

    #[test]
    fn reset_restores_the_construction_snapshot() {
        let spawn = Spawn {
            linvel: vector![0.0, 0.0, 0.5],
            angvel: vector![0.0, 0.7, 0.0],
            ..Spawn::at(1.0, 1.0, 2.0).heading(180.0)
        };
        let (mut world, mut vehicle) = registered(spawn);

        {
            let body = world.body_mut(vehicle.chassis).unwrap();
            body.set_position(Isometry::translation(9.0, 4.0, -7.0), true);
            body.set_linvel(vector![3.0, -1.0, 2.0], true);
            body.set_angvel(vector![1.0, 1.0, 1.0], true);
        }
        for _ in 0..30 {
            vehicle.apply_wheel_forces(&mut world, 1.0 / 60.0);
            world.step(1.0 / 60.0);
        }

        vehicle.reset_to_initial_state(&mut world);
        vehicle.reset_to_initial_state(&mut world);

        let init = *vehicle.initial_state();
        let body = vehicle.chassis_body(&world).unwrap();
        assert_relative_eq!(*body.translation(), init.position, epsilon = 1e-6);
        assert_relative_eq!(*body.linvel(), init.linvel, epsilon = 1e-6);
        assert_relative_eq!(*body.angvel(), init.angvel, epsilon = 1e-6);
        assert_relative_eq!(*body.rotation(), init.orientation, epsilon = 1e-6);
    }

    #[test]
    fn removal_takes_every_body_out() {
        let (mut world, vehicle) = registered(Spawn::at(0.0, 1.0, 0.0));
        vehicle.remove_from_world(&mut world);
        assert_eq!(world.bodies.len(), 0);
        assert_eq!(world.colliders.len(), 0);
    }
}
