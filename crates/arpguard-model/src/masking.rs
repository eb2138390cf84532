//! Masked-feature sampling for the pretext task.
//!
//! Each draw hides a random subset of positions behind a sentinel value and
//! returns the indicator used to restrict the reconstruction loss to those
//! positions. Masks are sampled fresh on every draw, never cached.

use arpguard_core::{ArpGuardError, MaskingConfig, Result};
use rand::Rng;

/// A masked view of one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedExample {
    /// Input with masked positions replaced by the sentinel.
    pub masked: Vec<f32>,
    /// Untouched input, the reconstruction target.
    pub original: Vec<f32>,
    /// `1.0` at masked positions, `0.0` elsewhere.
    pub mask: Vec<f32>,
}

impl MaskedExample {
    /// Number of masked positions.
    pub fn masked_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m > 0.0).count()
    }
}

/// Samples masked examples with a fixed mask fraction.
#[derive(Debug, Clone)]
pub struct MaskingSampler {
    fraction: f64,
    sentinel: f32,
}

impl MaskingSampler {
    /// # Errors
    ///
    /// Returns [`ArpGuardError::Config`] if the fraction is outside `[0, 1]`.
    pub fn new(config: &MaskingConfig) -> Result<Self> {
        if !config.fraction.is_finite() || !(0.0..=1.0).contains(&config.fraction) {
            return Err(ArpGuardError::Config(format!(
                "mask fraction must be in [0, 1], got {}",
                config.fraction
            )));
        }
        Ok(Self {
            fraction: config.fraction,
            sentinel: config.sentinel,
        })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn sentinel(&self) -> f32 {
        self.sentinel
    }

    /// Positions to mask in a vector of length `dim`: `floor(dim * p)`, raised
    /// to 1 whenever `p > 0`.
    pub fn num_masked(&self, dim: usize) -> usize {
        if self.fraction == 0.0 || dim == 0 {
            return 0;
        }
        let n = (dim as f64 * self.fraction).floor() as usize;
        n.clamp(1, dim)
    }

    /// Draw a masked view of `features`, choosing positions uniformly without
    /// replacement.
    pub fn sample<R: Rng + ?Sized>(&self, features: &[f32], rng: &mut R) -> MaskedExample {
        let dim = features.len();
        let mut masked = features.to_vec();
        let mut mask = vec![0.0_f32; dim];

        let count = self.num_masked(dim);
        if count > 0 {
            for idx in rand::seq::index::sample(rng, dim, count).iter() {
                masked[idx] = self.sentinel;
                mask[idx] = 1.0;
            }
        }

        MaskedExample {
            masked,
            original: features.to_vec(),
            mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sampler(fraction: f64) -> MaskingSampler {
        MaskingSampler::new(&MaskingConfig {
            fraction,
            sentinel: 0.0,
        })
        .unwrap()
    }

    fn features(dim: usize) -> Vec<f32> {
        (0..dim).map(|i| i as f32 + 0.5).collect()
    }

    #[test]
    fn test_mask_count_matches_fraction() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for dim in 1..20 {
            for &p in &[0.01, 0.15, 0.3, 0.5, 0.99] {
                let s = sampler(p);
                let ex = s.sample(&features(dim), &mut rng);
                let expected = ((dim as f64 * p).floor() as usize).max(1);
                assert_eq!(ex.masked_count(), expected, "dim={dim} p={p}");
            }
        }
    }

    #[test]
    fn test_masked_positions_hold_sentinel() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let s = sampler(0.4);
        let original = features(10);
        for _ in 0..50 {
            let ex = s.sample(&original, &mut rng);
            assert_eq!(ex.original, original);
            for i in 0..original.len() {
                if ex.mask[i] == 1.0 {
                    assert_eq!(ex.masked[i], 0.0);
                } else {
                    assert_eq!(ex.mask[i], 0.0);
                    assert_eq!(ex.masked[i], original[i]);
                }
            }
        }
    }

    #[test]
    fn test_zero_fraction_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let s = sampler(0.0);
        let original = features(7);
        let ex = s.sample(&original, &mut rng);
        assert_eq!(ex.masked, original);
        assert!(ex.mask.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_small_fraction_forces_one() {
        let s = sampler(0.05);
        assert_eq!(s.num_masked(7), 1);
        assert_eq!(s.num_masked(40), 2);
    }

    #[test]
    fn test_full_fraction_masks_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let s = sampler(1.0);
        let ex = s.sample(&features(6), &mut rng);
        assert_eq!(ex.masked_count(), 6);
        assert!(ex.masked.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_masks_resampled_per_draw() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let s = sampler(0.3);
        let original = features(20);
        let first = s.sample(&original, &mut rng).mask;
        let differs = (0..20).any(|_| s.sample(&original, &mut rng).mask != first);
        assert!(differs);
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let bad = MaskingConfig {
            fraction: 1.2,
            sentinel: 0.0,
        };
        assert!(MaskingSampler::new(&bad).is_err());
    }
}
