use glam::{Quat, Vec3};
use murmuration_core::{BoidId, BoidMap, FORWARD, Flock, FlockConfig, Tick};

const DT: f32 = 1.0 / 60.0;

fn seeded_config(seed: u64) -> FlockConfig {
    FlockConfig {
        rng_seed: Some(seed),
        ..FlockConfig::default()
    }
}

/// Pin a boid's stored row to exact values, bypassing spawn randomness.
fn pin_boid(flock: &mut Flock, id: BoidId, orientation: Quat, noise_phase: f32) {
    let index = flock.boids().index_of(id).expect("live boid");
    let columns = flock.boids_mut().columns_mut();
    columns.orientations_mut()[index] = orientation;
    columns.noise_phases_mut()[index] = noise_phase;
}

#[test]
fn seeded_flocks_advance_in_lockstep() {
    let config = FlockConfig {
        spawn_count: 32,
        spawn_radius: 6.0,
        ..seeded_config(0xF10C4)
    };

    let mut flock_a = Flock::new(config.clone()).expect("flock_a");
    let mut flock_b = Flock::new(config).expect("flock_b");
    let ids_a = flock_a.spawn_flock();
    let ids_b = flock_b.spawn_flock();
    assert_eq!(ids_a.len(), 32);
    assert_eq!(ids_b.len(), 32);

    for _ in 0..60 {
        flock_a.tick(DT);
        flock_b.tick(DT);
    }

    assert_eq!(flock_a.tick_count(), Tick(60));
    assert_eq!(flock_b.tick_count(), Tick(60));
    assert_eq!(
        flock_a.boids().columns().positions(),
        flock_b.boids().columns().positions(),
        "seeded runs should reproduce positions bit for bit"
    );
    assert_eq!(
        flock_a.boids().columns().orientations(),
        flock_b.boids().columns().orientations(),
        "seeded runs should reproduce orientations bit for bit"
    );
    assert_eq!(
        flock_a.boids().columns().noise_phases(),
        flock_b.boids().columns().noise_phases()
    );
}

#[test]
fn distinct_seeds_produce_distinct_flocks() {
    let mut flock_a = Flock::new(seeded_config(1)).expect("flock_a");
    let mut flock_b = Flock::new(seeded_config(2)).expect("flock_b");
    flock_a.spawn_flock();
    flock_b.spawn_flock();
    assert_ne!(
        flock_a.boids().columns().positions(),
        flock_b.boids().columns().positions(),
        "different seeds should already diverge at spawn"
    );
}

#[test]
fn iteration_order_does_not_change_tick_results() {
    let row_a = (Vec3::new(-0.4, 0.2, 0.0), Quat::from_rotation_y(0.4), 2.5);
    let row_b = (Vec3::new(0.6, -0.1, 0.3), Quat::from_rotation_x(-0.7), 7.5);

    let run = |first: (Vec3, Quat, f32), second: (Vec3, Quat, f32)| {
        let mut flock = Flock::new(seeded_config(71)).expect("flock");
        let a = flock.spawn_at(first.0);
        let b = flock.spawn_at(second.0);
        pin_boid(&mut flock, a, first.1, first.2);
        pin_boid(&mut flock, b, second.1, second.2);
        flock.tick(0.02);
        [
            (
                flock.position(a).expect("live boid"),
                flock.orientation(a).expect("live boid"),
            ),
            (
                flock.position(b).expect("live boid"),
                flock.orientation(b).expect("live boid"),
            ),
        ]
    };

    let forward_order = run(row_a, row_b);
    let swapped_order = run(row_b, row_a);

    assert_eq!(
        forward_order[0], swapped_order[1],
        "a boid's tick result should not depend on its slot in the arena"
    );
    assert_eq!(forward_order[1], swapped_order[0]);
}

#[test]
fn isolated_boids_steer_from_the_seeded_terms_only() {
    // The pair sits far beyond neighbor range, so each steers exactly as if
    // it were alone: reference forward plus the origin cohesion seed.
    let config = FlockConfig {
        neighbor_distance: 0.5,
        velocity_variance: 0.0,
        ..seeded_config(83)
    };
    let mut flock = Flock::new(config).expect("flock");
    let position_a = Vec3::new(30.0, 0.0, 0.0);
    let position_b = Vec3::new(-30.0, 0.0, 0.0);
    let a = flock.spawn_at(position_a);
    let b = flock.spawn_at(position_b);
    let current_a = Quat::from_rotation_x(0.3);
    let current_b = Quat::IDENTITY;
    pin_boid(&mut flock, a, current_a, 1.0);
    pin_boid(&mut flock, b, current_b, 2.0);

    let dt = 0.05;
    flock.tick(dt);

    let keep = (-4.0_f32 * dt).exp();
    let expected_for = |position: Vec3, current: Quat| {
        let alignment = FORWARD * 1.0;
        let cohesion = (Vec3::ZERO * 1.0 - position).normalize_or_zero();
        let direction = alignment * 0.667 + cohesion;
        let heading = direction.try_normalize().expect("nonzero steering");
        let desired = Quat::from_rotation_arc(FORWARD, heading);
        desired.slerp(current, keep)
    };

    let expected_a = expected_for(position_a, current_a);
    let actual_a = flock.orientation(a).expect("live boid");
    assert!(
        expected_a.abs_diff_eq(actual_a, 1e-6),
        "boid a steered to {actual_a:?}, expected {expected_a:?}"
    );

    let expected_b = expected_for(position_b, current_b);
    let actual_b = flock.orientation(b).expect("live boid");
    assert!(
        expected_b.abs_diff_eq(actual_b, 1e-6),
        "boid b steered to {actual_b:?}, expected {expected_b:?}"
    );
}

#[test]
fn spawn_sampling_is_uniform_in_volume() {
    let config = FlockConfig {
        spawn_count: 4096,
        spawn_radius: 4.0,
        ..seeded_config(0x5EED)
    };
    let mut flock = Flock::new(config).expect("flock");
    flock.spawn_flock();

    let mut total = 0.0_f64;
    let mut max = 0.0_f32;
    for position in flock.boids().columns().positions() {
        let radius = position.length();
        total += f64::from(radius);
        max = max.max(radius);
    }
    let mean = total / 4096.0;

    assert!(max <= 4.0 + 1e-4, "sample escaped the ball: {max}");
    // Uniform-in-volume sampling has mean radius 3R/4; uniform-in-radius
    // sampling would land near R/2 instead.
    assert!(
        (mean - 3.0).abs() < 0.12,
        "mean spawn radius {mean} is not consistent with uniform volume"
    );
}

#[test]
fn orientations_and_positions_stay_finite_across_seeds() {
    for seed in [3_u64, 0xBEEF, 0x5EED_5EED] {
        let config = FlockConfig {
            spawn_count: 16,
            ..seeded_config(seed)
        };
        let mut flock = Flock::new(config).expect("flock");
        flock.spawn_flock();
        for _ in 0..300 {
            flock.tick(DT);
        }
        let columns = flock.boids().columns();
        for orientation in columns.orientations() {
            assert!(
                (orientation.length() - 1.0).abs() < 1e-5,
                "seed {seed}: orientation drifted to {orientation:?}"
            );
        }
        for position in columns.positions() {
            assert!(
                position.is_finite(),
                "seed {seed}: position became {position:?}"
            );
        }
    }
}

#[test]
fn flock_stays_near_the_configured_origin() {
    let origin = Vec3::new(50.0, 0.0, -20.0);
    let config = FlockConfig {
        spawn_count: 12,
        origin,
        ..seeded_config(101)
    };
    let mut flock = Flock::new(config).expect("flock");
    flock.spawn_flock();
    for _ in 0..600 {
        flock.tick(DT);
    }
    for position in flock.boids().columns().positions() {
        assert!(
            position.distance(origin) < 40.0,
            "origin cohesion should keep the flock close, boid at {position:?}"
        );
    }
}

#[test]
fn reconfiguring_between_ticks_changes_the_cruise_speed() {
    let config = FlockConfig {
        velocity_variance: 0.0,
        ..seeded_config(107)
    };
    let mut flock = Flock::new(config.clone()).expect("flock");
    let id = flock.spawn_at(Vec3::new(2.0, 0.0, 1.0));

    let start = flock.position(id).expect("live boid");
    flock.tick(0.1);
    let first_step = flock.position(id).expect("live boid").distance(start);

    let faster = FlockConfig {
        base_velocity: config.base_velocity * 2.0,
        ..config
    };
    flock.set_config(faster).expect("valid config");

    let middle = flock.position(id).expect("live boid");
    flock.tick(0.1);
    let second_step = flock.position(id).expect("live boid").distance(middle);

    assert!(
        (second_step / first_step - 2.0).abs() < 1e-3,
        "doubling base_velocity should double the step ({first_step} -> {second_step})"
    );
}

#[test]
fn handles_stay_valid_for_host_side_maps() {
    let config = FlockConfig {
        spawn_count: 8,
        ..seeded_config(113)
    };
    let mut flock = Flock::new(config).expect("flock");
    let ids = flock.spawn_flock();

    let mut labels: BoidMap<usize> = BoidMap::new();
    for (slot, id) in ids.iter().enumerate() {
        labels.insert(*id, slot);
    }

    for _ in 0..30 {
        flock.tick(DT);
    }

    for (slot, id) in ids.iter().enumerate() {
        assert_eq!(labels.get(*id).copied(), Some(slot));
        assert!(
            flock.position(*id).is_some(),
            "handle {slot} should stay live for the flock's lifetime"
        );
    }
}
