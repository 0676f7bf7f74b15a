//! Bounded elitist archive of the best-seen gain sets for one tuning group.

use crate::gains::GainSet;
use log::warn;
use rand::Rng;
use std::cmp::Ordering;

/// One pool entry: the gain sets of all jointly evaluated members of a
/// group, in role order. Single-joint groups are simply the length-1 case.
#[derive(Debug, Clone)]
pub struct Particle {
    pub members: Vec<GainSet>,
}

impl Particle {
    pub fn new(members: Vec<GainSet>) -> Self {
        Self { members }
    }

    /// Combined fitness over all members; lower is better.
    pub fn fitness(&self) -> f64 {
        self.members.iter().map(|m| m.fitness()).sum()
    }

    /// True only if every member carries valid measured errors.
    pub fn is_measured(&self) -> bool {
        self.members.iter().all(|m| m.is_measured())
    }
}

/// Insertion-bounded collection of the best particles seen so far. Once at
/// capacity, membership only changes by strictly-better replacement of the
/// current worst member; the best members are never evicted. After every
/// change the pool is sorted ascending by fitness (index 0 = best).
#[derive(Debug, Clone)]
pub struct PopulationPool {
    particles: Vec<Particle>,
    capacity: usize,
}

impl PopulationPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.particles.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The particles, sorted ascending by fitness.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn best(&self) -> Option<&Particle> {
        self.particles.first()
    }

    pub fn worst(&self) -> Option<&Particle> {
        self.particles.last()
    }

    /// Offers an evaluated particle to the pool. Returns true if the pool
    /// changed. Particles with an invalid measurement on any member are
    /// rejected; at capacity a candidate must be strictly better than the
    /// current worst member, ties keep the incumbent.
    pub fn offer(&mut self, candidate: Particle) -> bool {
        if !candidate.is_measured() {
            warn!("invalid error value - skipping particle");
            return false;
        }

        if self.particles.len() < self.capacity {
            self.particles.push(candidate);
            self.sort();
            return true;
        }

        let Some(worst) = self.particles.last() else {
            return false;
        };
        if candidate.fitness() < worst.fitness() {
            let last = self.particles.len() - 1;
            self.particles[last] = candidate;
            self.sort();
            return true;
        }
        false
    }

    /// Uniformly random member; None on an empty pool.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&Particle> {
        if self.particles.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.particles.len());
        self.particles.get(index)
    }

    /// Seeds the pool with imported particles, then enforces the capacity
    /// bound by keeping the best.
    pub fn seed(&mut self, particles: Vec<Particle>) {
        self.particles.extend(particles);
        self.sort();
        self.particles.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    fn sort(&mut self) {
        self.particles.sort_by(|a, b| {
            a.fitness()
                .partial_cmp(&b.fitness())
                .unwrap_or(Ordering::Equal)
        });
    }
}
