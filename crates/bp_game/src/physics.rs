//! Body/shape pairing around the rapier world.
//!
//! rapier does the integration. This module only converts spawn requests from
//! pixels to meters, keeps every rigid body paired with exactly one shape, and
//! feeds body poses back to the shapes each frame. Bodies are never removed
//! individually; the whole set goes away in `shutdown()`.

use std::fmt;
use std::num::NonZeroUsize;

use bp_core::config::SimConfig;
use bp_core::coords::{UnitScale, Viewport};
use bp_render::{RenderCtx, ShaderSource};
use glam::Vec2;
use rapier2d::prelude::*;

use crate::shape::{Pose, Shape, ShapeError, ShapeFactory};

/// Half thickness, in meters, of the floor and wall colliders.
const BOUNDARY_HALF_THICKNESS: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub screen_position: Vec2,
    pub shape_tag: String,
    /// Pixels; the radius for a circle.
    pub size_px: f32,
    pub is_dynamic: bool,
    pub density: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnError {
    Shape(ShapeError),
    Init(String),
    ShutDown,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(err) => write!(f, "{err}"),
            Self::Init(msg) => write!(f, "shape initialization failed: {msg}"),
            Self::ShutDown => f.write_str("world has been shut down"),
        }
    }
}

impl std::error::Error for SpawnError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSettings {
    pub viewport: Viewport,
    pub scale: UnitScale,
    /// Meters per second squared, y-down.
    pub gravity: Vec2,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub restitution: f32,
    pub friction: f32,
    pub boundary: bool,
}

impl WorldSettings {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            viewport: Viewport::new(config.window_width as f32, config.window_height as f32),
            scale: UnitScale::new(config.pixels_per_meter),
            gravity: Vec2::from(config.gravity),
            velocity_iterations: config.velocity_iterations,
            position_iterations: config.position_iterations,
            restitution: config.spawn.restitution,
            friction: config.spawn.friction,
            boundary: config.boundary,
        }
    }
}

struct BodyPair {
    handle: RigidBodyHandle,
    shape: Box<dyn Shape>,
}

pub struct PhysicsWorld {
    settings: WorldSettings,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    pairs: Vec<BodyPair>,
    step_count: u64,
    shut_down: bool,
}

impl PhysicsWorld {
    pub fn new(settings: WorldSettings) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.num_solver_iterations =
            NonZeroUsize::new(settings.velocity_iterations).unwrap_or(NonZeroUsize::MIN);
        integration_parameters.num_internal_pgs_iterations = settings.position_iterations.max(1);

        let mut world = Self {
            settings,
            gravity: vector![settings.gravity.x, settings.gravity.y],
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            pairs: Vec::new(),
            step_count: 0,
            shut_down: false,
        };
        if settings.boundary {
            world.add_boundary();
        }
        log::info!(
            "Physics world created: gravity ({}, {}) m/s^2, {} px/m",
            settings.gravity.x,
            settings.gravity.y,
            settings.scale.pixels_per_meter
        );
        world
    }

    /// Floor and side walls just outside the visible area. They are bare
    /// colliders, not bodies, so they carry no shape.
    fn add_boundary(&mut self) {
        let scale = self.settings.scale;
        let width = scale.pixels_to_meters(self.settings.viewport.width);
        let height = scale.pixels_to_meters(self.settings.viewport.height);
        let t = BOUNDARY_HALF_THICKNESS;

        let floor = ColliderBuilder::cuboid(width * 0.5 + t, t)
            .translation(vector![width * 0.5, height + t])
            .friction(self.settings.friction)
            .build();
        let left = ColliderBuilder::cuboid(t, height)
            .translation(vector![-t, height * 0.5])
            .build();
        let right = ColliderBuilder::cuboid(t, height)
            .translation(vector![width + t, height * 0.5])
            .build();
        for collider in [floor, left, right] {
            self.colliders.insert(collider);
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    /// Creates a body and its shape from a screen-space request. Nothing is
    /// added when the shape cannot be built, so the pairing stays 1:1.
    pub fn spawn_body(
        &mut self,
        request: &SpawnRequest,
        gfx: &mut RenderCtx<'_>,
        source: &ShaderSource,
    ) -> Result<RigidBodyHandle, SpawnError> {
        if self.shut_down {
            return Err(SpawnError::ShutDown);
        }

        let mut shape =
            ShapeFactory::create_shape(&request.shape_tag).map_err(SpawnError::Shape)?;
        shape.set_size(request.size_px);
        shape.initialize(gfx, source).map_err(SpawnError::Init)?;

        let scale = self.settings.scale;
        let position = scale.vec_to_meters(request.screen_position);
        let radius = scale.pixels_to_meters(request.size_px);

        let builder = if request.is_dynamic {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        let handle = self
            .bodies
            .insert(builder.translation(vector![position.x, position.y]).build());
        let collider = ColliderBuilder::ball(radius)
            .density(request.density)
            .restitution(self.settings.restitution)
            .friction(self.settings.friction)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        shape.update(
            Pose {
                position: request.screen_position,
                rotation: 0.0,
            },
            self.settings.viewport,
        );
        log::debug!(
            "Spawned {} at ({:.1}, {:.1}) px, r={} px, dynamic={}, density={} ({} bodies)",
            shape.type_tag(),
            request.screen_position.x,
            request.screen_position.y,
            request.size_px,
            request.is_dynamic,
            request.density,
            self.pairs.len() + 1
        );
        self.pairs.push(BodyPair { handle, shape });
        Ok(handle)
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if self.shut_down {
            return;
        }
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.step_count += 1;
    }

    /// Feeds each body's current pose to its shape.
    pub fn sync_shapes(&mut self, viewport: Viewport) {
        let scale = self.settings.scale;
        for pair in &mut self.pairs {
            if let Some(body) = self.bodies.get(pair.handle) {
                pair.shape.update(pose_of(body, scale), viewport);
            }
        }
    }

    pub fn render(&self, gfx: &mut RenderCtx<'_>) {
        for pair in &self.pairs {
            pair.shape.render(gfx);
            pair.shape.draw(gfx, pair.shape.vertex_range());
        }
    }

    pub fn body_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Screen-space pose of a body.
    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<Pose> {
        self.bodies
            .get(handle)
            .map(|body| pose_of(body, self.settings.scale))
    }

    /// Screen-space pose of the most recently spawned body.
    pub fn newest_body_pose(&self) -> Option<Pose> {
        self.pairs.last().and_then(|p| self.body_pose(p.handle))
    }

    /// Drops every body and shape. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        log::info!(
            "Tearing down physics world ({} bodies, {} steps)",
            self.pairs.len(),
            self.step_count
        );
        self.pairs.clear();
        self.bodies = RigidBodySet::new();
        self.colliders = ColliderSet::new();
        self.islands = IslandManager::new();
        self.shut_down = true;
    }
}

fn pose_of(body: &RigidBody, scale: UnitScale) -> Pose {
    let t = body.translation();
    Pose {
        position: scale.vec_to_pixels(Vec2::new(t.x, t.y)),
        rotation: body.rotation().angle(),
    }
}
