//! The simulation context: one physics world, its vehicles and their sensor
//! samplers, advanced together by `step`.

use std::time::Duration;

use rapier3d::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{VehicleConfig, WorldConfig};
use crate::control::KeyCommand;
use crate::error::{Result, SimError};
use crate::physics::PhysicsWorld;
use crate::schedule::SamplingScheduler;
use crate::sensors::{
    AccelerationSample, AngularVelocitySample, LineReading, OrientationSample, ProximityReading,
};
use crate::vehicle::{create_vehicle, Spawn, Vehicle, VehicleId};

/// Longest step `step` will integrate; larger `dt` values are clamped.
pub const MAX_STEP: Real = 0.1;

/// Sampler callback; receives the vehicle it belongs to and the world.
pub type Sampler = Box<dyn FnMut(&mut Vehicle, &PhysicsWorld) + Send>;

fn samplers() -> [(&'static str, fn(&mut Vehicle, &PhysicsWorld)); 4] {
    [
        ("accelerometer", Vehicle::sample_acceleration),
        ("magnetometer", Vehicle::sample_orientation),
        ("proximity", Vehicle::sample_proximity),
        ("line", Vehicle::sample_line),
    ]
}

pub struct Simulation {
    pub physics: PhysicsWorld,
    vehicles: Vec<Vehicle>,
    scheduler: SamplingScheduler<VehicleId, Sampler>,
    tick: u64,
}

impl Simulation {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            physics: PhysicsWorld::new(config),
            vehicles: Vec::new(),
            scheduler: SamplingScheduler::new(),
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Virtual time simulated so far.
    pub fn elapsed(&self) -> Duration {
        self.scheduler.now()
    }

    // ------------------------------------------------------------------
    // Vehicles
    // ------------------------------------------------------------------

    /// Build, register and start sampling a vehicle.
    pub fn add_vehicle(&mut self, config: &VehicleConfig, spawn: &Spawn) -> Result<VehicleId> {
        let vehicle = create_vehicle(config, spawn)?.register_in_world(&mut self.physics);
        let id = vehicle.id();
        let period = Duration::from_millis(config.sensors.sample_period_ms);

        for (name, sample) in samplers() {
            self.scheduler.subscribe(id, name, period, Box::new(sample) as Sampler);
        }

        self.vehicles.push(vehicle);
        info!(vehicle = %id, count = self.vehicles.len(), ?period, "vehicle added");
        Ok(id)
    }

    /// Remove a vehicle, its bodies and its samplers.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Result<()> {
        let index = self.index_of(id).ok_or(SimError::UnknownVehicle(id))?;
        let vehicle = self.vehicles.remove(index);

        let cancelled = self.scheduler.cancel_owner(id);
        vehicle.remove_from_world(&mut self.physics);
        debug!(vehicle = %id, cancelled, "samplers cancelled");
        Ok(())
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn index_of(&self, id: VehicleId) -> Option<usize> {
        self.vehicles.iter().position(|v| v.id() == id)
    }

    /// Vehicle by position. Out of range is an error, never another vehicle.
    pub fn vehicle(&self, index: usize) -> Result<&Vehicle> {
        let count = self.vehicles.len();
        self.vehicles.get(index).ok_or(SimError::VehicleIndex { index, count })
    }

    pub fn vehicle_mut(&mut self, index: usize) -> Result<&mut Vehicle> {
        let count = self.vehicles.len();
        self.vehicles.get_mut(index).ok_or(SimError::VehicleIndex { index, count })
    }

    pub fn vehicle_by_id(&self, id: VehicleId) -> Result<&Vehicle> {
        self.vehicles.iter().find(|v| v.id() == id).ok_or(SimError::UnknownVehicle(id))
    }

    pub fn vehicle_by_id_mut(&mut self, id: VehicleId) -> Result<&mut Vehicle> {
        self.vehicles.iter_mut().find(|v| v.id() == id).ok_or(SimError::UnknownVehicle(id))
    }

    /// Names of the samplers currently running for `id`.
    pub fn samplers_of(&self, id: VehicleId) -> Vec<&'static str> {
        self.scheduler.names_of(id)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// One tick: wheel forces, integration, wheel sync, then due samplers.
    pub fn step(&mut self, dt: Real) {
        if !(dt.is_finite() && dt > 0.0) {
            warn!(dt, "ignoring step with non-positive dt");
            return;
        }
        let dt = if dt > MAX_STEP {
            warn!(dt, max = MAX_STEP, "clamping oversized step");
            MAX_STEP
        } else {
            dt
        };

        let Self { physics, vehicles, scheduler, tick } = self;

        for vehicle in vehicles.iter_mut() {
            vehicle.apply_wheel_forces(physics, dt);
        }

        physics.step(dt);

        for vehicle in vehicles.iter_mut() {
            vehicle.sync_wheel_transforms(physics);
            vehicle.control.end_tick();
        }

        scheduler.advance(Duration::from_secs_f32(dt), |owner, sampler| {
            if let Some(vehicle) = vehicles.iter_mut().find(|v| v.id() == owner) {
                sampler(vehicle, physics);
            }
        });

        *tick += 1;
    }

    // ------------------------------------------------------------------
    // Per-vehicle forwarding
    // ------------------------------------------------------------------

    pub fn set_motor_speeds(&mut self, id: VehicleId, right: Real, left: Real) -> Result<()> {
        self.vehicle_by_id_mut(id)?.set_motor_speeds(right, left)
    }

    pub fn set_motor_velocity(&mut self, id: VehicleId, pulse_width: Real) -> Result<()> {
        let index = self.index_of(id).ok_or(SimError::UnknownVehicle(id))?;
        self.vehicles[index].set_motor_velocity(&mut self.physics, pulse_width);
        Ok(())
    }

    pub fn stop(&mut self, id: VehicleId) -> Result<()> {
        self.vehicle_by_id_mut(id)?.stop();
        Ok(())
    }

    pub fn apply_key(&mut self, id: VehicleId, cmd: KeyCommand) -> Result<()> {
        self.vehicle_by_id_mut(id)?.apply_key(cmd)
    }

    pub fn reset_vehicle(&mut self, id: VehicleId) -> Result<()> {
        let index = self.index_of(id).ok_or(SimError::UnknownVehicle(id))?;
        self.vehicles[index].reset_to_initial_state(&mut self.physics);
        Ok(())
    }

    pub fn accelerometer_reading(&self, id: VehicleId) -> Result<AccelerationSample> {
        Ok(self.vehicle_by_id(id)?.accelerometer_reading())
    }

    pub fn gyroscope_reading(&self, id: VehicleId) -> Result<AngularVelocitySample> {
        Ok(self.vehicle_by_id(id)?.gyroscope_reading(&self.physics))
    }

    pub fn magnetometer_reading(&self, id: VehicleId) -> Result<OrientationSample> {
        Ok(self.vehicle_by_id(id)?.magnetometer_reading())
    }

    pub fn proximity_reading(&self, id: VehicleId) -> Result<ProximityReading> {
        Ok(self.vehicle_by_id(id)?.proximity_reading())
    }

    pub fn line_reading(&self, id: VehicleId) -> Result<LineReading> {
        Ok(self.vehicle_by_id(id)?.line_reading())
    }

    pub fn read_proximity(&self, id: VehicleId) -> Result<ProximityReading> {
        Ok(self.vehicle_by_id(id)?.read_proximity(&self.physics))
    }

    pub fn read_line(&self, id: VehicleId) -> Result<LineReading> {
        Ok(self.vehicle_by_id(id)?.read_line(&self.physics))
    }
}
