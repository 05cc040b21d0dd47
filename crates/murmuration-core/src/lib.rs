//! Flocking simulation core shared across the Murmuration workspace.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::f32::consts::TAU;
use std::fmt;
use thiserror::Error;

pub mod noise;

use noise::NoiseField;

new_key_type! {
    /// Stable handle for boids backed by a generational slot map.
    pub struct BoidId;
}

/// Convenience alias for associating host-side data with boids.
pub type BoidMap<T> = SecondaryMap<BoidId, T>;

/// Canonical forward axis that every orientation is applied to.
pub const FORWARD: Vec3 = Vec3::Z;

const ALIGNMENT_WEIGHT: f32 = 0.667;
const SPAWN_ORIENTATION_BLEND: f32 = 0.3;
const NOISE_PHASE_RANGE: f32 = 10.0;
const NOISE_TIME_SCALE: f32 = 0.5;

fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Uniform sample from the closed unit ball, by rejection from its bounding cube.
fn random_in_ball(rng: &mut SmallRng) -> Vec3 {
    loop {
        let candidate = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        if candidate.length_squared() <= 1.0 {
            return candidate;
        }
    }
}

/// Uniform random rotation (Shoemake's subgroup algorithm).
fn random_rotation(rng: &mut SmallRng) -> Quat {
    let u: f32 = rng.random_range(0.0..1.0);
    let theta_a: f32 = rng.random_range(0.0..TAU);
    let theta_b: f32 = rng.random_range(0.0..TAU);
    let radius_a = (1.0 - u).sqrt();
    let radius_b = u.sqrt();
    Quat::from_xyzw(
        radius_a * theta_a.sin(),
        radius_a * theta_a.cos(),
        radius_b * theta_b.sin(),
        radius_b * theta_b.cos(),
    )
}

/// Simulation clock (ticks processed since construction).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The tick counter at construction time.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Scalar fields for a single boid used when inserting or snapshotting from the SoA store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BoidData {
    pub position: Vec3,
    pub orientation: Quat,
    pub noise_phase: f32,
}

impl BoidData {
    /// Creates a new boid payload with the provided fields.
    #[must_use]
    pub const fn new(position: Vec3, orientation: Quat, noise_phase: f32) -> Self {
        Self {
            position,
            orientation,
            noise_phase,
        }
    }
}

/// Collection of per-boid columns for hot-path iteration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BoidColumns {
    positions: Vec<Vec3>,
    orientations: Vec<Quat>,
    noise_phases: Vec<f32>,
}

impl BoidColumns {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            orientations: Vec::with_capacity(capacity),
            noise_phases: Vec::with_capacity(capacity),
        }
    }

    /// Number of active rows in the columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if there are no active rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve additional capacity in each backing vector.
    pub fn reserve(&mut self, additional: usize) {
        self.positions.reserve(additional);
        self.orientations.reserve(additional);
        self.noise_phases.reserve(additional);
    }

    /// Push a new row onto each column.
    pub fn push(&mut self, boid: BoidData) {
        self.positions.push(boid.position);
        self.orientations.push(boid.orientation);
        self.noise_phases.push(boid.noise_phase);
        self.debug_assert_coherent();
    }

    /// Return a copy of the scalar fields at `index`.
    #[must_use]
    pub fn snapshot(&self, index: usize) -> BoidData {
        BoidData {
            position: self.positions[index],
            orientation: self.orientations[index],
            noise_phase: self.noise_phases[index],
        }
    }

    /// Immutable access to the positions slice.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Mutable access to the positions slice.
    #[must_use]
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Immutable access to the orientations slice.
    #[must_use]
    pub fn orientations(&self) -> &[Quat] {
        &self.orientations
    }

    /// Mutable access to the orientations slice.
    #[must_use]
    pub fn orientations_mut(&mut self) -> &mut [Quat] {
        &mut self.orientations
    }

    /// Immutable access to the noise phases.
    #[must_use]
    pub fn noise_phases(&self) -> &[f32] {
        &self.noise_phases
    }

    /// Mutable access to the noise phases.
    #[must_use]
    pub fn noise_phases_mut(&mut self) -> &mut [f32] {
        &mut self.noise_phases
    }

    #[inline]
    fn debug_assert_coherent(&self) {
        debug_assert_eq!(self.positions.len(), self.orientations.len());
        debug_assert_eq!(self.positions.len(), self.noise_phases.len());
    }
}

/// Dense SoA storage with generational handles for boid access.
///
/// Boids are only ever inserted; the collection grows until the host drops
/// the whole simulation, so handles stay valid for its entire lifetime.
#[derive(Debug)]
pub struct BoidArena {
    slots: SlotMap<BoidId, usize>,
    handles: Vec<BoidId>,
    columns: BoidColumns,
}

impl Default for BoidArena {
    fn default() -> Self {
        Self::new()
    }
}

impl BoidArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            handles: Vec::new(),
            columns: BoidColumns::new(),
        }
    }

    /// Create an arena with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            handles: Vec::with_capacity(capacity),
            columns: BoidColumns::with_capacity(capacity),
        }
    }

    /// Number of live boids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true when no boids are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Reserve space for additional boids.
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
        self.handles.reserve(additional);
        self.columns.reserve(additional);
    }

    /// Iterate over live boid handles in dense iteration order.
    pub fn iter_handles(&self) -> impl Iterator<Item = BoidId> + '_ {
        self.handles.iter().copied()
    }

    /// Borrow the underlying column storage.
    #[must_use]
    pub fn columns(&self) -> &BoidColumns {
        &self.columns
    }

    /// Mutably borrow the underlying column storage.
    #[must_use]
    pub fn columns_mut(&mut self) -> &mut BoidColumns {
        &mut self.columns
    }

    /// Returns the dense index for `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: BoidId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Returns true if `id` refers to a live boid.
    #[must_use]
    pub fn contains(&self, id: BoidId) -> bool {
        self.slots.contains_key(id)
    }

    /// Insert a new boid and return its handle.
    pub fn insert(&mut self, boid: BoidData) -> BoidId {
        let index = self.columns.len();
        self.columns.push(boid);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Produce a copy of the scalar data for `id`.
    #[must_use]
    pub fn snapshot(&self, id: BoidId) -> Option<BoidData> {
        let index = self.index_of(id)?;
        Some(self.columns.snapshot(index))
    }
}

/// Errors that can occur when constructing or reconfiguring a flock.
#[derive(Debug, Error)]
pub enum FlockError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a flock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlockConfig {
    /// Number of boids created by [`Flock::spawn_flock`].
    pub spawn_count: usize,
    /// Radius of the ball around `origin` that spawn positions are drawn from.
    pub spawn_radius: f32,
    /// Cruise speed in world units per second.
    pub base_velocity: f32,
    /// Fractional amplitude of noise-driven speed modulation, in [0, 1].
    pub velocity_variance: f32,
    /// Constant drift added to every boid's motion each tick.
    pub scroll: Vec3,
    /// Exponential turn-rate constant; higher values snap to the steered heading faster.
    pub rotation_speed: f32,
    /// Interaction radius for the separation, alignment, and cohesion rules.
    pub neighbor_distance: f32,
    /// Reference point: spawn center and the seed of every cohesion average.
    pub origin: Vec3,
    /// Reference pose: its forward axis seeds alignment and the spawn heading blend.
    pub orientation: Quat,
    /// Optional RNG seed for reproducible flocks.
    pub rng_seed: Option<u64>,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            spawn_count: 10,
            spawn_radius: 4.0,
            base_velocity: 6.0,
            velocity_variance: 0.5,
            scroll: Vec3::ZERO,
            rotation_speed: 4.0,
            neighbor_distance: 2.0,
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            rng_seed: None,
        }
    }
}

impl FlockConfig {
    /// Validates the configuration ahead of simulation use.
    fn validate(&self) -> Result<(), FlockError> {
        if !self.neighbor_distance.is_finite() || self.neighbor_distance <= 0.0 {
            return Err(FlockError::InvalidConfig(
                "neighbor_distance must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.velocity_variance) {
            return Err(FlockError::InvalidConfig(
                "velocity_variance must lie in [0, 1]",
            ));
        }
        if !self.spawn_radius.is_finite() || self.spawn_radius < 0.0 {
            return Err(FlockError::InvalidConfig(
                "spawn_radius must be non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured seed, drawing one from entropy if absent.
    fn resolved_seed(&self) -> u64 {
        match self.rng_seed {
            Some(seed) => seed,
            None => rand::random(),
        }
    }
}

/// A flock of boids advanced by Reynolds-style steering.
///
/// Each [`tick`](Flock::tick) runs two barriers over the whole collection: a
/// read-only steering pass that computes every boid's new orientation from
/// the previous frame, then an integration pass that moves each boid along
/// its freshly steered heading. Neighbor influence uses an all-pairs scan,
/// so a tick costs O(n²) in the boid count.
pub struct Flock {
    config: FlockConfig,
    tick: Tick,
    elapsed: f32,
    rng: SmallRng,
    noise: NoiseField,
    boids: BoidArena,
}

impl fmt::Debug for Flock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flock")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("elapsed", &self.elapsed)
            .field("boid_count", &self.boids.len())
            .finish()
    }
}

impl Flock {
    /// Instantiate an empty flock using the supplied configuration.
    ///
    /// The seed is resolved once here and drives both the spawn RNG and the
    /// speed-noise field for the lifetime of the flock.
    pub fn new(config: FlockConfig) -> Result<Self, FlockError> {
        config.validate()?;
        let seed = config.resolved_seed();
        Ok(Self {
            boids: BoidArena::with_capacity(config.spawn_count),
            config,
            tick: Tick::zero(),
            elapsed: 0.0,
            rng: SmallRng::seed_from_u64(seed),
            noise: NoiseField::seeded(seed),
        })
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    /// Replace the configuration between ticks.
    ///
    /// The new configuration is validated before it is applied; on error the
    /// previous configuration stays in force. A changed `rng_seed` does not
    /// reseed a live flock.
    pub fn set_config(&mut self, config: FlockConfig) -> Result<(), FlockError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Ticks processed so far.
    #[must_use]
    pub const fn tick_count(&self) -> Tick {
        self.tick
    }

    /// Simulation time accumulated from `dt` arguments, in seconds.
    #[must_use]
    pub const fn elapsed_seconds(&self) -> f32 {
        self.elapsed
    }

    /// Read-only access to the boid arena.
    #[must_use]
    pub fn boids(&self) -> &BoidArena {
        &self.boids
    }

    /// Mutable access to the boid arena.
    #[must_use]
    pub fn boids_mut(&mut self) -> &mut BoidArena {
        &mut self.boids
    }

    /// Number of live boids.
    #[must_use]
    pub fn boid_count(&self) -> usize {
        self.boids.len()
    }

    /// World position of `id`, if live.
    #[must_use]
    pub fn position(&self, id: BoidId) -> Option<Vec3> {
        let index = self.boids.index_of(id)?;
        Some(self.boids.columns().positions()[index])
    }

    /// Orientation of `id`, if live.
    #[must_use]
    pub fn orientation(&self, id: BoidId) -> Option<Quat> {
        let index = self.boids.index_of(id)?;
        Some(self.boids.columns().orientations()[index])
    }

    /// Produce a copy of the stored row for `id`.
    #[must_use]
    pub fn snapshot_boid(&self, id: BoidId) -> Option<BoidData> {
        self.boids.snapshot(id)
    }

    /// Spawn one boid at a position drawn uniformly from the spawn ball.
    pub fn spawn(&mut self) -> BoidId {
        let offset = random_in_ball(&mut self.rng) * self.config.spawn_radius;
        let position = self.config.origin + offset;
        self.spawn_at(position)
    }

    /// Spawn one boid at an explicit world position.
    ///
    /// The heading is mostly aligned with the reference pose but varied:
    /// a 30% slerp from the reference orientation toward a uniformly random
    /// rotation. Never fails; the returned handle stays valid for the
    /// lifetime of the flock.
    pub fn spawn_at(&mut self, position: Vec3) -> BoidId {
        let orientation = self
            .config
            .orientation
            .slerp(random_rotation(&mut self.rng), SPAWN_ORIENTATION_BLEND);
        let noise_phase = self.rng.random_range(0.0..NOISE_PHASE_RANGE);
        self.boids.insert(BoidData {
            position,
            orientation,
            noise_phase,
        })
    }

    /// Spawn `spawn_count` boids around the configured origin.
    pub fn spawn_flock(&mut self) -> Vec<BoidId> {
        let count = self.config.spawn_count;
        self.boids.reserve(count);
        (0..count).map(|_| self.spawn()).collect()
    }

    /// Advance every boid by one step of `dt` seconds.
    ///
    /// Non-positive or non-finite `dt` leaves the flock untouched. The call
    /// always runs to completion; there are no failure states.
    pub fn tick(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.stage_steering(dt);
        self.stage_integration(dt);
        self.elapsed += dt;
        self.tick = self.tick.next();
    }

    /// Steering pass: compute each boid's new orientation from the previous
    /// frame. Reads are taken entirely from the pre-tick columns, so results
    /// do not depend on iteration order.
    fn stage_steering(&mut self, dt: f32) {
        if self.boids.is_empty() {
            return;
        }
        let reference_forward = self.config.orientation * FORWARD;
        let origin = self.config.origin;
        let neighbor_distance = self.config.neighbor_distance;
        let keep = (-self.config.rotation_speed * dt).exp();

        let columns = self.boids.columns();
        let positions = columns.positions();
        let orientations = columns.orientations();

        let steered: Vec<Quat> = positions
            .par_iter()
            .enumerate()
            .map(|(index, &position)| {
                let current = orientations[index];
                let mut separation = Vec3::ZERO;
                let mut alignment = reference_forward;
                let mut cohesion = origin;
                let mut neighbor_count = 0usize;

                for (other_index, &other_position) in positions.iter().enumerate() {
                    if other_index == index {
                        continue;
                    }
                    let distance = position.distance(other_position);
                    // Coincident pairs have no usable direction; skip them.
                    if distance > neighbor_distance || distance <= 0.0 {
                        continue;
                    }
                    let falloff = clamp01(1.0 - distance / neighbor_distance);
                    separation += (position - other_position) / distance * falloff;
                    alignment += orientations[other_index] * FORWARD;
                    cohesion += other_position;
                    neighbor_count += 1;
                }

                let divisor = 1.0 / (neighbor_count as f32 + 1.0);
                alignment *= divisor;
                let cohesion = (cohesion * divisor - position).normalize_or_zero();
                let direction = separation + alignment * ALIGNMENT_WEIGHT + cohesion;

                match direction.try_normalize() {
                    Some(heading) => {
                        let desired = Quat::from_rotation_arc(FORWARD, heading);
                        desired.slerp(current, keep)
                    }
                    None => current,
                }
            })
            .collect();

        self.boids
            .columns_mut()
            .orientations_mut()
            .copy_from_slice(&steered);
    }

    /// Integration pass: move each boid along its pass-1 heading at a
    /// noise-modulated speed, plus the constant scroll drift.
    fn stage_integration(&mut self, dt: f32) {
        if self.boids.is_empty() {
            return;
        }
        let base_velocity = self.config.base_velocity;
        let velocity_variance = self.config.velocity_variance;
        let scroll = self.config.scroll;
        let noise_time = self.elapsed * NOISE_TIME_SCALE;
        let noise = &self.noise;

        let columns = self.boids.columns();
        let orientations = columns.orientations();
        let noise_phases = columns.noise_phases();

        let deltas: Vec<Vec3> = orientations
            .par_iter()
            .zip(noise_phases.par_iter())
            .map(|(&orientation, &noise_phase)| {
                let wobble = noise.sample01(noise_time, noise_phase) * 2.0 - 1.0;
                let speed = base_velocity * (1.0 + wobble * velocity_variance);
                (orientation * FORWARD * speed + scroll) * dt
            })
            .collect();

        let positions = self.boids.columns_mut().positions_mut();
        for (position, delta) in positions.iter_mut().zip(&deltas) {
            *position += *delta;
        }
    }
}
