// src/config.rs

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::sensors::proximity::ProximityPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub radius: f32,               // m
    pub rest_length: f32,          // suspension neutral length (m)
    pub max_travel: f32,           // +/- around rest length (m)
    pub friction_slip: f32,        // traction cap = friction_slip * normal force
    pub side_grip: f32,            // 0..1 share of lateral slip cancelled per step
    pub max_suspension_force: f32, // N
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sample_period_ms: u64,

    // --- Proximity sweep ---
    pub proximity_range: f32,          // m
    pub proximity_half_angle_deg: i32, // sweep is center +/- half angle, 1 degree steps
    pub proximity_policy: ProximityPolicy,

    // --- Line sensors (chassis local), order: outer-left, inner-left, middle, inner-right, outer-right ---
    pub line_ray_length: f32,
    pub line_sensor_offsets: [[f32; 3]; 5],
}

/// Physical description of one robot. Local frame: +Y up, +Z forward, -X right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub mass: f32,                      // kg
    pub chassis_half_extents: [f32; 3], // [hx, hy, hz] meters
    pub linear_damping: f32,
    pub angular_damping: f32,

    // --- Suspension tuning (derived into k / c per wheel) ---
    pub suspension_sag: f32, // static compression under the vehicle's own weight (m)
    pub damping_ratio: f32,  // zeta, 0.7..1.0

    pub wheel: WheelConfig,
    /// Connection points indexed by wheel index: FR, FL, RR, RL.
    pub wheel_connections: [[f32; 3]; 4],

    pub sensors: SensorConfig,
}

pub const ZUMO: VehicleConfig = VehicleConfig {
    mass: 5.0,
    chassis_half_extents: [0.7, 0.2, 0.9],
    linear_damping: 0.05,
    angular_damping: 0.3,

    suspension_sag: 0.05,
    damping_ratio: 0.9,

    wheel: WheelConfig {
        radius: 0.5,
        rest_length: 0.3,
        max_travel: 0.3,
        friction_slip: 1.0,
        side_grip: 0.8,
        max_suspension_force: 100_000.0,
    },
    wheel_connections: [
        [-0.9, 0.0, 0.6],  // front-right
        [0.9, 0.0, 0.6],   // front-left
        [-0.9, 0.0, -0.6], // rear-right
        [0.9, 0.0, -0.6],  // rear-left
    ],

    sensors: SensorConfig {
        sample_period_ms: 500,
        proximity_range: 4.0,
        proximity_half_angle_deg: 10,
        proximity_policy: ProximityPolicy::FirstHit,
        line_ray_length: 1.0,
        line_sensor_offsets: [
            [0.45, -0.2, 0.0],
            [0.225, -0.2, 0.0],
            [0.0, -0.2, 0.0],
            [-0.225, -0.2, 0.0],
            [-0.45, -0.2, 0.0],
        ],
    },
};

impl Default for VehicleConfig {
    fn default() -> Self {
        ZUMO
    }
}

fn check(ok: bool, what: &str) -> Result<()> {
    if ok { Ok(()) } else { Err(SimError::InvalidConfig(what.to_string())) }
}

fn finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl VehicleConfig {
    /// Load a vehicle description from JSON and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: VehicleConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check(self.mass.is_finite() && self.mass > 0.0, "mass must be finite and > 0")?;
        check(
            finite(&self.chassis_half_extents) && self.chassis_half_extents.iter().all(|h| *h > 0.0),
            "chassis half extents must be finite and > 0",
        )?;
        check(
            finite(&[self.linear_damping, self.angular_damping])
                && self.linear_damping >= 0.0
                && self.angular_damping >= 0.0,
            "damping must be finite and >= 0",
        )?;
        check(
            self.suspension_sag.is_finite() && self.suspension_sag > 0.0,
            "suspension sag must be finite and > 0",
        )?;
        check(
            self.damping_ratio.is_finite() && self.damping_ratio >= 0.0,
            "damping ratio must be finite and >= 0",
        )?;

        let w = &self.wheel;
        check(w.radius.is_finite() && w.radius > 0.0, "wheel radius must be finite and > 0")?;
        check(
            w.rest_length.is_finite() && w.rest_length > 0.0,
            "suspension rest length must be finite and > 0",
        )?;
        check(
            w.max_travel.is_finite() && w.max_travel >= 0.0,
            "suspension travel must be finite and >= 0",
        )?;
        check(
            w.friction_slip.is_finite() && w.friction_slip >= 0.0,
            "friction slip must be finite and >= 0",
        )?;
        check((0.0..=1.0).contains(&w.side_grip), "side grip must be within 0..=1")?;
        check(
            w.max_suspension_force.is_finite() && w.max_suspension_force > 0.0,
            "max suspension force must be finite and > 0",
        )?;
        check(
            self.wheel_connections.iter().all(|p| finite(p)),
            "wheel connection points must be finite",
        )?;

        let s = &self.sensors;
        check(s.sample_period_ms > 0, "sample period must be > 0 ms")?;
        check(
            s.proximity_range.is_finite() && s.proximity_range > 0.0,
            "proximity range must be finite and > 0",
        )?;
        check(
            (0..180).contains(&s.proximity_half_angle_deg),
            "proximity half angle must be within 0..180 degrees",
        )?;
        check(
            s.line_ray_length.is_finite() && s.line_ray_length > 0.0,
            "line ray length must be finite and > 0",
        )?;
        check(
            s.line_sensor_offsets.iter().all(|p| finite(p)),
            "line sensor offsets must be finite",
        )?;

        Ok(())
    }
}

/// Spring / damper constants from the static sag the suspension should show
/// under the vehicle's own weight.
pub fn suspension_from_sag(vehicle_mass: f32, wheels: usize, sag_m: f32, zeta: f32) -> (f32, f32) {
    let m = vehicle_mass / wheels as f32;
    let g = 9.81_f32;
    let f_static = m * g;               // per wheel
    let k = f_static / sag_m.max(1e-3); // N/m

    // damping: c = 2*zeta*sqrt(k*m)
    let c = 2.0 * zeta * (k * m).sqrt();
    (k, c)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub gravity: f32,          // along world Y (m/s^2)
    pub default_friction: f32, // applied to scene colliders
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: -9.8,
            default_friction: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zumo_preset_is_valid() {
        assert!(ZUMO.validate().is_ok());
    }

    #[test]
    fn rejects_negative_mass() {
        let config = VehicleConfig { mass: -5.0, ..ZUMO };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_nan_geometry() {
        let mut config = ZUMO;
        config.wheel_connections[2][1] = f32::NAN;
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));

        let config = VehicleConfig { chassis_half_extents: [0.7, 0.0, 0.9], ..ZUMO };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_sample_period() {
        let mut config = ZUMO;
        config.sensors.sample_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sag_gives_static_equilibrium() {
        let (k, c) = suspension_from_sag(5.0, 4, 0.05, 0.9);
        // k * sag carries a quarter of the weight
        assert_relative_eq!(k * 0.05, 5.0 / 4.0 * 9.81, epsilon = 1e-3);
        assert!(c > 0.0);
    }

    #[test]
    fn json_round_trip_keeps_policy() {
        let mut config = ZUMO;
        config.sensors.proximity_policy = ProximityPolicy::Nearest;
        let text = serde_json::to_string(&config).unwrap();
        let back: VehicleConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
