use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::control::DriveState;
use crate::sensors::{
    AccelerationSample, AngularVelocitySample, LineReading, OrientationSample, ProximityReading,
};
use crate::sim::Simulation;
use crate::vehicle::VehicleId;

#[derive(Debug, Clone, Serialize)]
pub struct WheelTelemetry {
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion i, j, k, w
    pub in_contact: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleTelemetry {
    pub id: VehicleId,
    pub index: usize,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub acceleration: AccelerationSample,
    pub gyroscope: AngularVelocitySample,
    pub orientation: OrientationSample,
    pub proximity: ProximityReading,
    pub line: LineReading,
    pub drive_state: DriveState,
    pub wheels: Vec<WheelTelemetry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tick: u64,
    pub vehicles: Vec<VehicleTelemetry>,
}

impl Telemetry {
    /// Snapshot of every vehicle in `sim`, in index order.
    pub fn capture(sim: &Simulation) -> Self {
        let world = &sim.physics;
        let mut vehicles = Vec::with_capacity(sim.vehicle_count());

        for (index, vehicle) in sim.vehicles().iter().enumerate() {
            let Some(body) = vehicle.chassis_body(world) else { continue };
            let pos = body.translation();
            let rot = body.rotation().coords;

            let wheels = vehicle
                .wheel_bodies
                .iter()
                .zip(&vehicle.wheels)
                .filter_map(|(handle, wheel)| {
                    let b = world.body(*handle)?;
                    let p = b.translation();
                    let q = b.rotation().coords;
                    Some(WheelTelemetry {
                        position: [p.x, p.y, p.z],
                        rotation: [q.x, q.y, q.z, q.w],
                        in_contact: wheel.in_contact,
                    })
                })
                .collect();

            vehicles.push(VehicleTelemetry {
                id: vehicle.id(),
                index,
                position: [pos.x, pos.y, pos.z],
                rotation: [rot.x, rot.y, rot.z, rot.w],
                acceleration: vehicle.accelerometer_reading(),
                gyroscope: vehicle.gyroscope_reading(world),
                orientation: vehicle.magnetometer_reading(),
                proximity: vehicle.proximity_reading(),
                line: vehicle.line_reading(),
                drive_state: vehicle.drive_state(),
                wheels,
            });
        }

        Self { kind: "telemetry", tick: sim.tick(), vehicles }
    }
}

/// Connected websocket clients, keyed by session id.
#[derive(Default)]
pub struct TelemetryHub {
    clients: Vec<(Uuid, UnboundedSender<String>)>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_client(&mut self, session: Uuid, tx: UnboundedSender<String>) {
        self.clients.push((session, tx));
        debug!(%session, clients = self.clients.len(), "client registered");
    }

    pub fn remove_client(&mut self, session: Uuid) {
        self.clients.retain(|(id, _)| *id != session);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Build and send a telemetry frame to all clients; drops clients whose
    /// channel is closed.
    pub fn broadcast(&mut self, sim: &Simulation) {
        if self.clients.is_empty() {
            return;
        }

        let json = match serde_json::to_string(&Telemetry::capture(sim)) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "telemetry serialization failed");
                return;
            }
        };

        self.clients.retain(|(_, tx)| tx.send(json.clone()).is_ok());
    }
}
