//! Motor commands: per-side engine forces, a direct velocity mode and a
//! keyboard-style discrete mode.
//!
//! Wheel indices: 0 = front-right, 1 = front-left, 2 = rear-right,
//! 3 = rear-left.

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::physics::PhysicsWorld;
use crate::vehicle::{Vehicle, WheelIndex};

// ---- control constants ----
pub const IDLE_BRAKE_FORCE: Real = 5.0;
pub const STOP_BRAKE_FORCE: Real = 10.0;
pub const KEY_DRIVE_FORCE: Real = 20.0;
pub const KEY_ROTATION_FORCE: Real = 20.0;
pub const MAX_PHYSICAL_SPEED: Real = 0.65; // m/s of the real robot
pub const MAX_PULSE_WIDTH: Real = 400.0;
const SPEED_SCALE: Real = 10.0;            // sim units per physical m/s

/// Informal state of the drive, for telemetry and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveState {
    #[default]
    Idle,
    Forward,
    Backward,
    RotatingLeft,
    RotatingRight,
    Braking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Key {
    /// Browser key codes: arrows drive, `B` brakes.
    pub fn from_key_code(code: u32) -> Option<Key> {
        match code {
            38 => Some(Key::Forward),
            40 => Some(Key::Backward),
            37 => Some(Key::Left),
            39 => Some(Key::Right),
            66 => Some(Key::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCommand {
    pub key: Key,
    pub pressed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    MotorSpeeds { right: Real, left: Real },
    Key(KeyCommand),
}

#[derive(Debug, Default)]
pub(crate) struct ControlState {
    pub drive_state: DriveState,
    /// Set by `set_motor_velocity`; engine-force commands are rejected until
    /// the end of the tick.
    pub velocity_injected: bool,
}

impl ControlState {
    pub fn end_tick(&mut self) {
        self.velocity_injected = false;
    }
}

/// Forward speed for a servo pulse width, clamped to ±`MAX_PULSE_WIDTH`.
pub fn velocity_for_pulse(pulse_width: Real) -> Real {
    let pulse = pulse_width.clamp(-MAX_PULSE_WIDTH, MAX_PULSE_WIDTH);
    MAX_PHYSICAL_SPEED * SPEED_SCALE * pulse / MAX_PULSE_WIDTH
}

fn state_for_speeds(right: Real, left: Real) -> DriveState {
    if right == 0.0 && left == 0.0 {
        DriveState::Braking
    } else if right == left {
        if right > 0.0 { DriveState::Forward } else { DriveState::Backward }
    } else if left > right {
        DriveState::RotatingRight
    } else {
        DriveState::RotatingLeft
    }
}

impl Vehicle {
    pub fn drive_state(&self) -> DriveState {
        self.control.drive_state
    }

    pub fn apply_control(&mut self, command: ControlCommand) -> Result<()> {
        match command {
            ControlCommand::MotorSpeeds { right, left } => self.set_motor_speeds(right, left),
            ControlCommand::Key(cmd) => self.apply_key(cmd),
        }
    }

    fn set_engine_force(&mut self, wheel: WheelIndex, force: Real) {
        self.wheels[wheel.index()].engine_force = force;
    }

    fn set_brake(&mut self, wheel: WheelIndex, brake: Real) {
        self.wheels[wheel.index()].brake = brake;
    }

    fn set_all_brakes(&mut self, brake: Real) {
        for wheel in WheelIndex::ALL {
            self.set_brake(wheel, brake);
        }
    }

    fn clear_engine_forces(&mut self) {
        for wheel in WheelIndex::ALL {
            self.set_engine_force(wheel, 0.0);
        }
    }

    fn reject_after_velocity(&self) -> Result<()> {
        if self.control.velocity_injected {
            warn!(vehicle = %self.id(), "engine-force command rejected: velocity already set this tick");
            return Err(SimError::VelocityOverride(self.id()));
        }
        Ok(())
    }

    /// Right-side wheels get `right`, left-side wheels get `left`. Both zero
    /// applies the idle brake to every wheel; anything else releases the brakes.
    ///
    /// Nonzero speeds are rejected in a tick where `set_motor_velocity` already
    /// ran. `(0, 0)` is always accepted.
    pub fn set_motor_speeds(&mut self, right: Real, left: Real) -> Result<()> {
        if right != 0.0 || left != 0.0 {
            self.reject_after_velocity()?;
        }

        for wheel in WheelIndex::ALL {
            self.set_engine_force(wheel, if wheel.is_left() { left } else { right });
        }

        if right == 0.0 && left == 0.0 {
            self.set_all_brakes(IDLE_BRAKE_FORCE);
        } else {
            self.set_all_brakes(0.0);
        }

        self.control.drive_state = state_for_speeds(right, left);
        debug!(vehicle = %self.id(), right, left, state = ?self.control.drive_state, "motor speeds");
        Ok(())
    }

    /// Zero both motors and hold every wheel with the stop brake.
    pub fn stop(&mut self) {
        self.clear_engine_forces();
        self.set_all_brakes(STOP_BRAKE_FORCE);
        self.control.drive_state = DriveState::Braking;
        debug!(vehicle = %self.id(), "stop");
    }

    /// Overwrite the chassis velocity along its local forward axis, keeping
    /// the other local components.
    pub fn set_motor_velocity(&mut self, world: &mut PhysicsWorld, pulse_width: Real) {
        let velocity = velocity_for_pulse(pulse_width);

        self.clear_engine_forces();
        self.set_all_brakes(0.0);

        if let Some(body) = world.body_mut(self.chassis) {
            let rotation = *body.rotation();
            let mut local = rotation.inverse() * *body.linvel();
            local.z = velocity;
            body.set_linvel(rotation * local, true);
        }

        self.control.velocity_injected = true;
        self.control.drive_state = if velocity > 0.0 {
            DriveState::Forward
        } else if velocity < 0.0 {
            DriveState::Backward
        } else {
            DriveState::Idle
        };
        debug!(vehicle = %self.id(), pulse_width, velocity, "motor velocity");
    }

    /// Keyboard mode: each event replaces the whole drive command. Driving
    /// keys follow the same velocity-override rule as `set_motor_speeds`;
    /// releases and `Stop` are always accepted.
    pub fn apply_key(&mut self, cmd: KeyCommand) -> Result<()> {
        if cmd.pressed && cmd.key != Key::Stop {
            self.reject_after_velocity()?;
        }

        self.set_all_brakes(0.0);
        self.clear_engine_forces();

        if !cmd.pressed {
            self.control.drive_state = DriveState::Idle;
            return Ok(());
        }

        match cmd.key {
            Key::Forward => {
                self.set_engine_force(WheelIndex::RearRight, KEY_DRIVE_FORCE);
                self.set_engine_force(WheelIndex::RearLeft, KEY_DRIVE_FORCE);
                self.control.drive_state = DriveState::Forward;
            }
            Key::Backward => {
                self.set_engine_force(WheelIndex::RearRight, -KEY_DRIVE_FORCE);
                self.set_engine_force(WheelIndex::RearLeft, -KEY_DRIVE_FORCE);
                self.control.drive_state = DriveState::Backward;
            }
            Key::Right => {
                for wheel in WheelIndex::ALL {
                    let f = if wheel.is_left() { KEY_ROTATION_FORCE } else { -KEY_ROTATION_FORCE };
                    self.set_engine_force(wheel, f);
                }
                self.control.drive_state = DriveState::RotatingRight;
            }
            Key::Left => {
                for wheel in WheelIndex::ALL {
                    let f = if wheel.is_right() { KEY_ROTATION_FORCE } else { -KEY_ROTATION_FORCE };
                    self.set_engine_force(wheel, f);
                }
                self.control.drive_state = DriveState::RotatingLeft;
            }
            Key::Stop => self.stop(),
        }
        Ok(())
    }
}
