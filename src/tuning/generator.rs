//! Candidate generation: blind draws from a broad prior while the pool is
//! filling, multiplicative jitter around a randomly chosen elite once it is
//! full.

use crate::gains::GainSet;
use crate::tuning::population::{Particle, PopulationPool};
use log::debug;
use rand::distr::uniform::Error as UniformError;
use rand::distr::{Distribution, Uniform};
use rand::Rng;
use rand_distr::{Beta, BetaError, Normal, NormalError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor for blind proportional-gain draws.
const MIN_P: f64 = 0.01;
/// Floor for blind velocity-cap draws.
const MIN_MAX_VEL: f64 = 0.5;

#[derive(Error, Debug)]
pub enum PriorError {
    #[error("invalid gain prior: {0}")]
    Gain(#[from] NormalError),
    #[error("invalid damping interval: {0}")]
    Damping(#[from] UniformError),
    #[error("invalid jitter shape: {0}")]
    Jitter(#[from] BetaError),
}

/// Prior parameters for blind candidate generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GainPriors {
    /// Mean of the normal prior shared by `p` and `max_vel`.
    pub gain_mean: f64,
    /// Spread of that prior.
    pub gain_spread: f64,
    /// Lower bound of the uniform damping interval.
    pub damping_min: f64,
    /// Upper bound of the uniform damping interval.
    pub damping_max: f64,
}

impl Default for GainPriors {
    fn default() -> Self {
        Self {
            gain_mean: 5.0,
            gain_spread: 2.0,
            damping_min: 1e-4,
            damping_max: 0.1,
        }
    }
}

/// Draws new candidate particles for one tuning group. The policy is picked
/// by pool fullness: every draw is blind until the pool reaches capacity,
/// after that a uniformly chosen pool member is perturbed. In tuple mode
/// each member gets its own independent draws.
pub struct CandidateGenerator {
    members: usize,
    gain_prior: Normal<f64>,
    damping_prior: Uniform<f64>,
    jitter: Beta<f64>,
}

impl CandidateGenerator {
    pub fn new(members: usize, priors: &GainPriors) -> Result<Self, PriorError> {
        Ok(Self {
            members,
            gain_prior: Normal::new(priors.gain_mean, priors.gain_spread)?,
            damping_prior: Uniform::new(priors.damping_min, priors.damping_max)?,
            jitter: Beta::new(2.0, 2.0)?,
        })
    }

    /// Produces the next candidate, consulting the pool for the policy. An
    /// empty or partially filled pool always yields blind draws, so the
    /// empty-pool case needs no special handling.
    pub fn generate<R: Rng>(&self, pool: &PopulationPool, rng: &mut R) -> Particle {
        if !pool.is_full() {
            debug!(
                "pool not full yet (size={}), creating blind parameters",
                pool.len()
            );
            return self.blind(rng);
        }
        match pool.sample(rng) {
            Some(parent) => self.perturb(parent, rng),
            None => self.blind(rng),
        }
    }

    /// Blind policy: independent draws from the priors for every member.
    pub fn blind<R: Rng>(&self, rng: &mut R) -> Particle {
        Particle::new((0..self.members).map(|_| self.blind_member(rng)).collect())
    }

    fn blind_member<R: Rng>(&self, rng: &mut R) -> GainSet {
        let mut set = GainSet::default();
        set.p = self.gain_prior.sample(rng).max(MIN_P);
        set.i = (0.001 * self.gain_prior.sample(rng)).max(0.0);
        set.d = (0.001 * self.gain_prior.sample(rng)).max(0.0);
        set.i_clamp = (0.01 * self.gain_prior.sample(rng)).max(0.0);
        set.max_vel = self.gain_prior.sample(rng).max(MIN_MAX_VEL);
        set.damping = self.damping_prior.sample(rng);
        set
    }

    /// Perturbation policy: every gain field of every member is multiplied
    /// by an independent `0.5 + Beta(2, 2)` factor, so children stay within
    /// `[0.5, 1.5]` of the parent and concentrate near it.
    pub fn perturb<R: Rng>(&self, parent: &Particle, rng: &mut R) -> Particle {
        Particle::new(
            parent
                .members
                .iter()
                .map(|member| self.perturb_member(member, rng))
                .collect(),
        )
    }

    fn perturb_member<R: Rng>(&self, parent: &GainSet, rng: &mut R) -> GainSet {
        let mut child = *parent;
        child.p = parent.p * self.factor(rng);
        child.i = parent.i * self.factor(rng);
        child.d = parent.d * self.factor(rng);
        child.i_clamp = parent.i_clamp * self.factor(rng);
        child.max_vel = parent.max_vel * self.factor(rng);
        child.damping = parent.damping * self.factor(rng);
        child.vel_sq_mean_error = f64::NAN;
        child.pos_sq_mean_error = f64::NAN;
        child
    }

    fn factor<R: Rng>(&self, rng: &mut R) -> f64 {
        0.5 + self.jitter.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generator(members: usize) -> CandidateGenerator {
        CandidateGenerator::new(members, &GainPriors::default()).unwrap()
    }

    fn measured(mut particle: Particle, vel: f64, pos: f64) -> Particle {
        for member in &mut particle.members {
            member.vel_sq_mean_error = vel;
            member.pos_sq_mean_error = pos;
        }
        particle
    }

    #[test]
    fn test_blind_draws_respect_floors() {
        let generator = generator(1);
        let mut rng = StdRng::seed_from_u64(42);
        let priors = GainPriors::default();
        for _ in 0..500 {
            let set = generator.blind(&mut rng).members[0];
            assert!(set.p >= MIN_P);
            assert!(set.i >= 0.0);
            assert!(set.d >= 0.0);
            assert!(set.i_clamp >= 0.0);
            assert!(set.max_vel >= MIN_MAX_VEL);
            assert!(set.damping >= priors.damping_min && set.damping < priors.damping_max);
            assert!(!set.is_measured());
        }
    }

    #[test]
    fn test_perturbation_stays_within_half_to_three_halves() {
        let generator = generator(1);
        let mut rng = StdRng::seed_from_u64(7);
        let parent = measured(generator.blind(&mut rng), 1.0, 0.01);
        let g = parent.members[0];

        let mut p_sum = 0.0;
        let draws = 4000;
        for _ in 0..draws {
            let child = generator.perturb(&parent, &mut rng).members[0];
            assert!(child.p >= 0.5 * g.p && child.p <= 1.5 * g.p);
            assert!(child.i >= 0.5 * g.i && child.i <= 1.5 * g.i);
            assert!(child.d >= 0.5 * g.d && child.d <= 1.5 * g.d);
            assert!(child.i_clamp >= 0.5 * g.i_clamp && child.i_clamp <= 1.5 * g.i_clamp);
            assert!(child.max_vel >= 0.5 * g.max_vel && child.max_vel <= 1.5 * g.max_vel);
            assert!(child.damping >= 0.5 * g.damping && child.damping <= 1.5 * g.damping);
            // Measurements never survive into a fresh candidate.
            assert!(child.vel_sq_mean_error.is_nan());
            assert!(child.pos_sq_mean_error.is_nan());
            p_sum += child.p;
        }

        // E[0.5 + Beta(2,2)] = 1.0, so the child mean approaches the parent.
        let p_mean = p_sum / draws as f64;
        assert!((p_mean - g.p).abs() < 0.05 * g.p);
    }

    #[test]
    fn test_policy_switches_on_pool_fullness() {
        let generator = generator(1);
        let mut rng = StdRng::seed_from_u64(3);
        let mut pool = PopulationPool::new(2);

        // Empty and partially filled pools yield blind draws: unmeasured,
        // above the floors.
        let candidate = generator.generate(&pool, &mut rng);
        assert!(candidate.members[0].p >= MIN_P);
        pool.offer(measured(candidate, 1.0, 0.01));

        let candidate = generator.generate(&pool, &mut rng);
        pool.offer(measured(candidate, 2.0, 0.02));
        assert!(pool.is_full());

        // A full pool yields perturbations: the child must lie within the
        // jitter envelope of one of the two members.
        for _ in 0..50 {
            let child = generator.generate(&pool, &mut rng).members[0];
            let within_any = pool.particles().iter().any(|parent| {
                let g = parent.members[0];
                child.p >= 0.5 * g.p && child.p <= 1.5 * g.p
            });
            assert!(within_any);
        }
    }

    #[test]
    fn test_tuple_members_are_drawn_independently() {
        let generator = generator(2);
        let mut rng = StdRng::seed_from_u64(9);
        let particle = generator.blind(&mut rng);
        assert_eq!(particle.members.len(), 2);
        assert_ne!(particle.members[0].p, particle.members[1].p);

        let parent = measured(particle, 1.0, 0.01);
        let child = generator.perturb(&parent, &mut rng);
        let ratio_a = child.members[0].p / parent.members[0].p;
        let ratio_b = child.members[1].p / parent.members[1].p;
        assert_ne!(ratio_a, ratio_b);
    }

    #[test]
    fn test_rejects_degenerate_priors() {
        let bad_spread = GainPriors {
            gain_spread: -1.0,
            ..GainPriors::default()
        };
        assert!(CandidateGenerator::new(1, &bad_spread).is_err());

        let bad_interval = GainPriors {
            damping_min: 0.5,
            damping_max: 0.1,
            ..GainPriors::default()
        };
        assert!(CandidateGenerator::new(1, &bad_interval).is_err());
    }
}
