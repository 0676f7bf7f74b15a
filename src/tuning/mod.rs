//! The live tuning loop.
//!
//! One [`TuningGroup`] drives the joints of a single kinematic chain
//! through init → settle → evaluate → generate cycles, with a periodic
//! full reset. Each group owns its accumulators, pool, random source and
//! log writers outright; groups never share state, so distinct groups may
//! be driven from parallel workers as long as every sample of a group is
//! handled on that group's own serialized path.

pub mod accumulator;
pub mod generator;
pub mod population;

use crate::channel::{CommandSink, FeedbackSample, GroupId, JointId};
use crate::config::{Config, SearchConfig};
use crate::gains::GainSet;
use crate::persist::GroupLogs;
use std::path::Path;
use accumulator::{ErrorAccumulator, ErrorKind};
use generator::{CandidateGenerator, PriorError};
use log::{debug, info, warn};
use population::{Particle, PopulationPool};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("a tuning group needs at least one joint role")]
    NoRoles,
    #[error(transparent)]
    Prior(#[from] PriorError),
}

/// State machine for one logical tuning group. The last role in the chain
/// is the trigger: only its samples advance the machine, everything else
/// just accumulates.
pub struct TuningGroup {
    id: GroupId,
    roles: Vec<JointId>,
    settings: SearchConfig,
    generator: CandidateGenerator,
    pool: PopulationPool,
    accumulators: Vec<ErrorAccumulator>,
    active: Vec<GainSet>,
    assigned_at: Option<f64>,
    generation: u32,
    reset_count: u32,
    rng: StdRng,
    logs: Option<GroupLogs>,
}

impl TuningGroup {
    /// Builds a group over `roles` (trigger last). `logs` is None when
    /// persisted output is disabled.
    pub fn new(
        id: GroupId,
        roles: Vec<JointId>,
        settings: SearchConfig,
        seed: u64,
        logs: Option<GroupLogs>,
    ) -> Result<Self, GroupError> {
        if roles.is_empty() {
            return Err(GroupError::NoRoles);
        }
        let generator = CandidateGenerator::new(roles.len(), &settings.priors)?;
        let accumulators = roles.iter().map(|_| ErrorAccumulator::new()).collect();
        let active = roles.iter().map(|_| GainSet::default()).collect();
        Ok(Self {
            id,
            roles,
            pool: PopulationPool::new(settings.max_population),
            settings,
            generator,
            accumulators,
            active,
            assigned_at: None,
            generation: 0,
            reset_count: 0,
            rng: StdRng::seed_from_u64(seed),
            logs,
        })
    }

    /// Builds a group wired per `config`: search settings plus the
    /// persisted output streams when logging is enabled.
    pub fn from_config(
        id: GroupId,
        roles: Vec<JointId>,
        config: &Config,
        seed: u64,
    ) -> Result<Self, GroupError> {
        let logs = if config.output.enable {
            Some(GroupLogs::create(Path::new(&config.output.log_dir)))
        } else {
            None
        };
        Self::new(id, roles, config.search.clone(), seed, logs)
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn roles(&self) -> &[JointId] {
        &self.roles
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    pub fn assigned_at(&self) -> Option<f64> {
        self.assigned_at
    }

    pub fn pool(&self) -> &PopulationPool {
        &self.pool
    }

    /// Flushes the persisted output streams, typically at shutdown.
    pub fn flush_logs(&mut self) {
        if let Some(logs) = &mut self.logs {
            logs.flush();
        }
    }

    /// Seeds the pool from an imported starting population. Particles whose
    /// member count does not match the group's roles are discarded.
    pub fn seed_pool(&mut self, particles: Vec<Particle>) {
        let expected = self.roles.len();
        let before = particles.len();
        let matching: Vec<Particle> = particles
            .into_iter()
            .filter(|particle| particle.members.len() == expected)
            .collect();
        if matching.len() < before {
            warn!(
                "discarding {} imported particles with wrong member count",
                before - matching.len()
            );
        }
        self.pool.seed(matching);
    }

    /// Handles one feedback sample. Every sample is accumulated for its
    /// member; a trigger sample additionally drives the state machine:
    /// first-time initialization, then one evaluation per elapsed settling
    /// window, with a full reset once the generation budget is spent.
    pub fn handle_sample(
        &mut self,
        joint: JointId,
        sample: FeedbackSample,
        sink: &mut dyn CommandSink,
    ) {
        let Some(member) = self.roles.iter().position(|role| *role == joint) else {
            warn!("sample for joint {} outside group {}", joint, self.id);
            return;
        };
        self.accumulators[member].record(ErrorKind::Velocity, sample.velocity_error);
        self.accumulators[member].record(ErrorKind::Position, sample.angle_error);

        if member + 1 != self.roles.len() {
            return;
        }

        let Some(assigned_at) = self.assigned_at else {
            let first = self.generator.generate(&self.pool, &mut self.rng);
            for (role, set) in self.roles.iter().zip(&first.members) {
                info!(
                    "first time initialization for joint {} [{}]",
                    role,
                    set.command_line()
                );
            }
            self.assign(first, sample.timestamp, sink);
            return;
        };
        if sample.timestamp - assigned_at < self.settings.settle_secs {
            return;
        }

        self.generation += 1;
        if self.generation / self.settings.max_population as u32 > self.settings.max_generation {
            self.reset();
            return;
        }

        let evaluated = self.evaluate_window();
        self.log_evaluation(&evaluated);
        if self.pool.offer(evaluated) {
            self.log_population();
        }

        let next = self.generator.generate(&self.pool, &mut self.rng);
        self.assign(next, sample.timestamp, sink);
    }

    /// Reduces every member's accumulated window into the set that was
    /// active while it was collected, then clears the accumulators.
    fn evaluate_window(&mut self) -> Particle {
        let mut members = self.active.clone();
        for (index, set) in members.iter_mut().enumerate() {
            if self.accumulators[index].len(ErrorKind::Velocity) == 0 {
                warn!("empty velocity error window for joint {}", self.roles[index]);
            }
            if self.accumulators[index].len(ErrorKind::Position) == 0 {
                warn!("empty position error window for joint {}", self.roles[index]);
            }
            set.vel_sq_mean_error = self.accumulators[index].reduce(ErrorKind::Velocity);
            set.pos_sq_mean_error = self.accumulators[index].reduce(ErrorKind::Position);
            self.accumulators[index].reset();
        }
        Particle::new(members)
    }

    /// Publishes a candidate on the command channel, makes it the active
    /// set and restamps the assignment time. Publish failures are warned
    /// about and the loop carries on.
    fn assign(&mut self, candidate: Particle, timestamp: f64, sink: &mut dyn CommandSink) {
        for (role, set) in self.roles.iter().zip(&candidate.members) {
            let line = set.command_line();
            if let Err(e) = sink.send(*role, &line) {
                warn!("failed to publish gains for joint {}: {}", role, e);
            }
        }
        self.active = candidate.members;
        self.assigned_at = Some(timestamp);
    }

    /// Full cold restart of the search: generation counter to zero, pool
    /// emptied, stamps and windows cleared, output streams rotated.
    fn reset(&mut self) {
        self.reset_count += 1;
        info!(
            "==================  R E S E T  (group {}, reset #{})  ==================",
            self.id, self.reset_count
        );
        self.generation = 0;
        self.pool.clear();
        self.assigned_at = None;
        for accumulator in &mut self.accumulators {
            accumulator.reset();
        }
        if let Some(logs) = &mut self.logs {
            logs.rotate();
        }
    }

    fn log_evaluation(&mut self, particle: &Particle) {
        if self.logs.is_none() {
            return;
        }
        let mut line = String::new();
        for (index, (role, set)) in self.roles.iter().zip(&particle.members).enumerate() {
            if index > 0 {
                line.push(' ');
            }
            line.push_str(&format!("joint={} {}", role, set));
        }
        if let Some(logs) = &mut self.logs {
            logs.joints().write_line(&line);
        }
    }

    /// Appends the whole sorted pool to the population log and reports the
    /// best members.
    fn log_population(&mut self) {
        info!(
            "gen {} ({}), population (size={}) top 10:",
            self.generation,
            self.generation / crate::analysis::GENERATION_STRIDE as u32 + 1,
            self.pool.len()
        );
        for particle in self.pool.particles().iter().take(10) {
            debug!("  error={}", particle.fitness());
        }

        if self.logs.is_none() {
            return;
        }
        let generation = self.generation;
        let mut lines = Vec::with_capacity(self.pool.len());
        for particle in self.pool.particles() {
            let mut line = String::new();
            for (index, (role, set)) in self.roles.iter().zip(&particle.members).enumerate() {
                if index > 0 {
                    line.push(' ');
                }
                line.push_str(&format!(
                    "generation={} joint={} {}",
                    generation, role.joint, set
                ));
            }
            lines.push(line);
        }
        if let Some(logs) = &mut self.logs {
            for line in &lines {
                logs.population().write_line(line);
            }
        }
    }
}

/// Routes feedback samples to their owning groups. Groups are independent;
/// the registry adds no shared state beyond the map itself.
#[derive(Default)]
pub struct Tuner {
    groups: HashMap<GroupId, TuningGroup>,
}

impl Tuner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, group: TuningGroup) {
        self.groups.insert(group.id(), group);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, id: &GroupId) -> Option<&TuningGroup> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: &GroupId) -> Option<&mut TuningGroup> {
        self.groups.get_mut(id)
    }

    pub fn handle_sample(
        &mut self,
        joint: JointId,
        sample: FeedbackSample,
        sink: &mut dyn CommandSink,
    ) {
        match self.groups.get_mut(&joint.group()) {
            Some(group) => group.handle_sample(joint, sample, sink),
            None => warn!("sample for unregistered tuning group {}", joint.group()),
        }
    }
}
