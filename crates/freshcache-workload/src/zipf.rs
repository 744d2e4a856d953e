use rand::Rng;

/// Skewed key-popularity generator over the range `1..=n`, matching the
/// normalization and sampling scheme of the reference workload
/// generator's `FastZipf`. The cumulative-probability table is
/// precomputed once, same as the original's `zeta_n`, but sampling walks
/// it with a binary search rather than a linear scan.
pub struct FastZipf {
    n: usize,
    cumulative: Vec<f64>,
}

impl FastZipf {
    pub fn new(alpha: f64, n: usize) -> Self {
        let mut cumulative = Vec::with_capacity(n);
        let mut zeta_n = 0.0;
        for i in 1..=n {
            zeta_n += 1.0 / (i as f64).powf(alpha);
            cumulative.push(zeta_n);
        }
        for value in &mut cumulative {
            *value /= zeta_n;
        }
        Self { n, cumulative }
    }

    /// Sample a rank in `1..=n`, the same range the original generator
    /// returns from `zipf()`.
    pub fn sample(&self, rng: &mut impl Rng) -> usize {
        if self.n == 0 {
            return 0;
        }
        let draw: f64 = rng.gen();
        let index = self.cumulative.partition_point(|&cum| cum < draw);
        (index + 1).min(self.n)
    }

    pub fn generate(&self, num_operations: usize, rng: &mut impl Rng) -> Vec<usize> {
        (0..num_operations).map(|_| self.sample(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn low_ranks_are_sampled_more_often_than_high_ranks() {
        let zipf = FastZipf::new(1.2, 100);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);
        let samples = zipf.generate(20_000, &mut rng);
        let low = samples.iter().filter(|&&r| r <= 10).count();
        let high = samples.iter().filter(|&&r| r > 90).count();
        assert!(low > high * 5);
    }

    #[test]
    fn samples_stay_within_range() {
        let zipf = FastZipf::new(0.9, 50);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        for rank in zipf.generate(5_000, &mut rng) {
            assert!((1..=50).contains(&rank));
        }
    }
}
