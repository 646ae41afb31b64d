// src/physics.rs

use std::collections::HashMap;

use rapier3d::prelude::*;
use tracing::{debug, info, warn};

use crate::config::WorldConfig;

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);
pub const GROUP_PROP: Group = Group::from_bits_truncate(0b0100);

const LINE_HALF_WIDTH: Real = 0.1;
const LINE_HALF_THICKNESS: Real = 0.005;
const RAMP_TILT_DEG: Real = 30.0;

/// Result of a single ray query.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub distance: Real,
    pub point: Point<Real>,
    pub collider: ColliderHandle,
    pub body: Option<RigidBodyHandle>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,              // gravity vector
    pub default_friction: Real,             // scene colliders
    pub pipeline: PhysicsPipeline,          // physics pipeline
    pub island_manager: IslandManager,      // manages islands of bodies
    pub broad_phase: DefaultBroadPhase,     // broad-phase collision detection
    pub narrow_phase: NarrowPhase,          // collision detection
    pub bodies: RigidBodySet,               // for rigid bodies
    pub colliders: ColliderSet,             // for collision shapes
    pub joints: ImpulseJointSet,            // for constraints
    pub multibody_joints: MultibodyJointSet,// for articulated bodies
    pub ccd: CCDSolver,                     // continuous collision detection
    pub query_pipeline: QueryPipeline,      // for raycasting
    brightness: HashMap<ColliderHandle, f32>, // track lines -> surface brightness
}

impl PhysicsWorld {
    pub fn new(config: &WorldConfig) -> Self {
        info!(
            gravity = config.gravity,
            friction = config.default_friction,
            "physics world created"
        );

        Self {
            gravity: vector![0.0, config.gravity, 0.0],
            default_friction: config.default_friction,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            brightness: HashMap::new(),
        }
    }

    pub fn set_gravity(&mut self, gravity: Real) {
        self.gravity = vector![0.0, gravity, 0.0];
    }

    /// Friction for colliders created by the scene helpers from now on.
    pub fn set_default_friction(&mut self, friction: Real) {
        self.default_friction = friction;
    }

    /// Rebuild the ray acceleration structure so queries see freshly inserted
    /// or removed colliders before the next step.
    pub fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    /// Insert a body together with its colliders.
    pub fn insert_body(&mut self, body: RigidBody, colliders: Vec<Collider>) -> RigidBodyHandle {
        let handle = self.bodies.insert(body);
        for collider in colliders {
            self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        }
        self.refresh_queries();
        handle
    }

    /// Remove a body and every collider attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        let attached: Vec<ColliderHandle> = self
            .bodies
            .get(handle)
            .map(|b| b.colliders().to_vec())
            .unwrap_or_default();
        for c in &attached {
            self.brightness.remove(c);
        }

        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        self.refresh_queries();
    }

    fn insert_static(&mut self, collider: Collider) -> ColliderHandle {
        let handle = self.colliders.insert(collider);
        self.refresh_queries();
        handle
    }

    // ------------------------------------------------------------------
    // Scene helpers
    // ------------------------------------------------------------------

    /// Large static slab whose top surface sits at y = 0.
    pub fn add_ground(&mut self) -> ColliderHandle {
        let ground = ColliderBuilder::cuboid(500.0, 0.1, 500.0)
            .translation(vector![0.0, -0.1, 0.0])
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS | GROUP_PROP))
            .friction(self.default_friction)
            .restitution(0.0)
            .build();
        let handle = self.insert_static(ground);
        debug!(?handle, "ground inserted");
        handle
    }

    /// Static box obstacle.
    pub fn add_obstacle(&mut self, half_extents: [Real; 3], position: [Real; 3]) -> ColliderHandle {
        let [hx, hy, hz] = half_extents;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(position.into())
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS | GROUP_PROP))
            .friction(self.default_friction)
            .build();
        self.insert_static(collider)
    }

    /// Loose 1 kg box the robot can push around.
    pub fn add_block(&mut self, half_extents: [Real; 3], position: [Real; 3]) -> RigidBodyHandle {
        let [hx, hy, hz] = half_extents;
        let volume = 8.0 * hx * hy * hz;
        let body = RigidBodyBuilder::dynamic().translation(position.into()).build();
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .density(1.0 / volume)
            .collision_groups(InteractionGroups::new(GROUP_PROP, Group::ALL))
            .friction(self.default_friction)
            .build();
        self.insert_body(body, vec![collider])
    }

    /// Static 20 x 5 x 0.5 (half extents) slab tilted about the X axis so the
    /// robot climbs it driving along +Z.
    pub fn add_ramp(&mut self, x: Real, z: Real) -> ColliderHandle {
        let tilt = -RAMP_TILT_DEG.to_radians();
        let collider = ColliderBuilder::cuboid(5.0, 0.5, 20.0)
            .translation(vector![x, 0.0, z])
            .rotation(vector![tilt, 0.0, 0.0])
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS | GROUP_PROP))
            .friction(self.default_friction)
            .build();
        self.insert_static(collider)
    }

    /// Thin track line on the floor starting at (x, z), running `length`
    /// meters along `heading_deg` (0 = +Z, positive turns towards +X).
    pub fn add_line(&mut self, x: Real, z: Real, length: Real, heading_deg: Real, brightness: f32) -> ColliderHandle {
        let heading = heading_deg.to_radians();
        let dir = vector![heading.sin(), 0.0, heading.cos()];
        let center = vector![x, LINE_HALF_THICKNESS, z] + dir * (length * 0.5);

        let collider = ColliderBuilder::cuboid(LINE_HALF_WIDTH, LINE_HALF_THICKNESS, length * 0.5)
            .translation(center)
            .rotation(vector![0.0, heading, 0.0])
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS | GROUP_PROP))
            .friction(self.default_friction)
            .build();
        let handle = self.insert_static(collider);
        self.brightness.insert(handle, brightness);
        handle
    }

    /// Brightness attribute of a collider, if it carries one.
    pub fn brightness(&self, collider: ColliderHandle) -> Option<f32> {
        self.brightness.get(&collider).copied()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Cast a ray from `origin` to `target`; distance is measured from origin.
    pub fn cast_ray(&self, origin: Point<Real>, target: Point<Real>, filter: QueryFilter) -> Option<RayHit> {
        let delta = target - origin;
        let length = delta.norm();
        if length <= 1e-6 {
            return None;
        }

        let ray = Ray::new(origin, delta / length);
        let (collider, toi) = self.query_pipeline.cast_ray(
            &self.bodies,
            &self.colliders,
            &ray,
            length,
            true,
            filter,
        )?;

        Some(RayHit {
            distance: toi,
            point: ray.point_at(toi),
            collider,
            body: self.colliders.get(collider).and_then(|c| c.parent()),
        })
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    pub fn step(&mut self, dt: Real) {
        let hooks = ();
        let mut events = ();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &mut events,
            &hooks,
        );

        // Safety: prevent bodies from exploding to insane coordinates
        for (handle, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let pos = *body.translation();

            let bad =
                !pos.x.is_finite() || !pos.y.is_finite() || !pos.z.is_finite() ||
                pos.x.abs() > 1_000.0 || pos.y.abs() > 1_000.0 || pos.z.abs() > 1_000.0;

            if bad {
                let safe = Isometry::translation(0.0, 1.0, 0.0);
                body.set_position(safe, true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);

                warn!(?handle, "reset exploding body back to {:?}", safe.translation.vector);
            }
        }
    }
}
