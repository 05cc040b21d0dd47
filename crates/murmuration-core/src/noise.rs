//! Seeded 2D gradient noise for per-boid speed modulation.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::f32::consts::{FRAC_1_SQRT_2, SQRT_2};
use std::fmt;

const TABLE_SIZE: usize = 256;

/// Gradient directions for the 2D lattice, all unit length.
const GRADIENTS: [(f32, f32); 8] = [
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
    (-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
];

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn grad_dot(gradient: (f32, f32), x: f32, y: f32) -> f32 {
    gradient.0 * x + gradient.1 * y
}

/// Deterministic 2D Perlin-style noise field.
///
/// The permutation table is shuffled once from the seed; sampling never
/// mutates, so a field can be shared freely across threads.
pub struct NoiseField {
    seed: u64,
    perm: [u8; TABLE_SIZE * 2],
}

impl fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseField")
            .field("seed", &self.seed)
            .finish()
    }
}

impl NoiseField {
    /// Build a field whose permutation table is shuffled from `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        let mut table: [u8; TABLE_SIZE] = std::array::from_fn(|i| i as u8);
        let mut rng = SmallRng::seed_from_u64(seed);
        table.shuffle(&mut rng);
        let mut perm = [0u8; TABLE_SIZE * 2];
        perm[..TABLE_SIZE].copy_from_slice(&table);
        perm[TABLE_SIZE..].copy_from_slice(&table);
        Self { seed, perm }
    }

    /// Seed the field was built from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Sample the field at `(x, y)`, returning a value in `[0, 1]`.
    ///
    /// Integer lattice points evaluate to exactly 0.5; the field varies
    /// smoothly in between and tiles with period 256 on both axes.
    #[must_use]
    pub fn sample01(&self, x: f32, y: f32) -> f32 {
        let x_floor = x.floor();
        let y_floor = y.floor();
        let xf = x - x_floor;
        let yf = y - y_floor;
        let xi = (x_floor as i32).rem_euclid(TABLE_SIZE as i32) as usize;
        let yi = (y_floor as i32).rem_euclid(TABLE_SIZE as i32) as usize;

        let u = fade(xf);
        let v = fade(yf);

        let n00 = grad_dot(self.gradient(xi, yi), xf, yf);
        let n10 = grad_dot(self.gradient(xi + 1, yi), xf - 1.0, yf);
        let n01 = grad_dot(self.gradient(xi, yi + 1), xf, yf - 1.0);
        let n11 = grad_dot(self.gradient(xi + 1, yi + 1), xf - 1.0, yf - 1.0);

        let value = lerp(lerp(n00, n10, u), lerp(n01, n11, u), v);
        // Unit gradients bound the raw value by ±√2/2.
        (value * SQRT_2 * 0.5 + 0.5).clamp(0.0, 1.0)
    }

    fn gradient(&self, xi: usize, yi: usize) -> (f32, f32) {
        let hash = self.perm[usize::from(self.perm[xi]) + yi];
        GRADIENTS[usize::from(hash) & 7]
    }
}
