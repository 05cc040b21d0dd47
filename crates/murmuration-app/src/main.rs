use anyhow::{Result, ensure};
use clap::Parser;
use glam::Vec3;
use murmuration_core::{BoidMap, Flock, FlockConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "murmuration",
    version,
    about = "Run the Murmuration flocking simulation headless"
)]
struct Cli {
    /// RNG seed; omit to draw a fresh one from entropy.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of boids to spawn.
    #[arg(long, default_value_t = 64)]
    boids: usize,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Step size in seconds.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Ticks between progress reports; 0 disables them.
    #[arg(long, default_value_t = 120)]
    report_every: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    ensure!(
        cli.dt.is_finite() && cli.dt > 0.0,
        "dt must be positive and finite"
    );
    run(cli)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config = FlockConfig {
        spawn_count: cli.boids,
        rng_seed: cli.seed,
        ..FlockConfig::default()
    };
    let mut flock = Flock::new(config)?;
    let ids = flock.spawn_flock();
    info!(boids = ids.len(), seed = ?cli.seed, "Spawned flock");

    // Host-side bookkeeping keyed by handle, the way an engine would map
    // boids onto its own scene objects.
    let mut traveled: BoidMap<f32> = BoidMap::new();
    let mut last_positions: BoidMap<Vec3> = BoidMap::new();
    for id in &ids {
        traveled.insert(*id, 0.0);
        last_positions.insert(*id, flock.position(*id).expect("freshly spawned boid"));
    }

    for _ in 0..cli.ticks {
        flock.tick(cli.dt);
        for id in &ids {
            let position = flock.position(*id).expect("live boid");
            traveled[*id] += position.distance(last_positions[*id]);
            last_positions.insert(*id, position);
        }
        if cli.report_every > 0 && flock.tick_count().0 % cli.report_every == 0 {
            report(&flock);
        }
    }

    let mut total_traveled = 0.0_f32;
    let mut max_traveled = 0.0_f32;
    for id in &ids {
        total_traveled += traveled[*id];
        max_traveled = max_traveled.max(traveled[*id]);
    }
    let mean_traveled = if ids.is_empty() {
        0.0
    } else {
        total_traveled / ids.len() as f32
    };

    info!(
        ticks = flock.tick_count().0,
        elapsed_s = flock.elapsed_seconds(),
        mean_traveled,
        max_traveled,
        "Run complete"
    );
    Ok(())
}

fn report(flock: &Flock) {
    let positions = flock.boids().columns().positions();
    if positions.is_empty() {
        return;
    }
    let centroid = positions.iter().copied().sum::<Vec3>() / positions.len() as f32;
    let spread = positions
        .iter()
        .map(|position| position.distance(centroid))
        .fold(0.0_f32, f32::max);
    info!(
        tick = flock.tick_count().0,
        centroid = ?centroid,
        spread,
        "Flock status"
    );
}
