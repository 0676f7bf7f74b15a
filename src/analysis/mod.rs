//! Offline aggregation of persisted population logs.
//!
//! Replays a `tuner.gen_pop.*` stream, buckets the records by generation
//! and reduces each bucket to summary statistics. Entirely decoupled from
//! the live loop: it owns its own table, built fresh per run.

use crate::gains::GainSet;
use crate::tuning::population::Particle;
use log::{debug, warn};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Raw record indices are a sub-step counter; every 30 sub-steps form one
/// 1-indexed generation. Fixed for output compatibility with existing logs.
pub const GENERATION_STRIDE: i32 = 30;

const RECORD_DELIMITER: &str = "generation=";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to read or write analysis data: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a raw sub-step index to its generation bucket. Sub-step 0 lands in
/// generation 1 alongside sub-steps 1..=30.
pub fn remap_generation(sub_step: i32) -> i32 {
    (sub_step - 1) / GENERATION_STRIDE + 1
}

/// All parameter sets seen for one generation bucket.
#[derive(Debug, Clone, Default)]
pub struct GenerationRecord {
    pub params: Vec<GainSet>,
}

impl GenerationRecord {
    pub fn push(&mut self, set: GainSet) {
        self.params.push(set);
    }

    /// Mean/min/max fitness over the bucket; None when it holds nothing.
    pub fn reduce(&self) -> Option<GenerationStats> {
        let first = self.params.first()?.fitness();
        let mut sum = first;
        let mut min = first;
        let mut max = first;
        for set in &self.params[1..] {
            let error = set.fitness();
            if error < min {
                min = error;
            }
            if max < error {
                max = error;
            }
            sum += error;
        }
        Some(GenerationStats {
            mean_error: sum / self.params.len() as f64,
            min_error: min,
            max_error: max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationStats {
    pub mean_error: f64,
    pub min_error: f64,
    pub max_error: f64,
}

/// The in-memory generation table built from one persisted log. Index 0 of
/// the table is reserved and stays empty.
#[derive(Debug)]
pub struct GenerationTable {
    generations: Vec<GenerationRecord>,
    max_generation: i32,
}

impl GenerationTable {
    pub fn new(max_generation: i32) -> Self {
        Self {
            generations: vec![GenerationRecord::default()],
            max_generation,
        }
    }

    pub fn generations(&self) -> &[GenerationRecord] {
        &self.generations
    }

    /// Feeds every line of `reader` through the parser. Returns the number
    /// of lines read.
    pub fn parse_reader<R: BufRead>(&mut self, reader: R) -> Result<usize, AnalysisError> {
        let mut line_count = 0;
        for line in reader.lines() {
            let line = line?;
            self.parse_line(&line);
            line_count += 1;
        }
        debug!("finished after reading {} lines", line_count);
        Ok(line_count)
    }

    /// Parses one log line. A line may carry several concatenated records,
    /// each introduced by a `generation=` token; `#` lines are comments.
    pub fn parse_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        let starts: Vec<usize> = line.match_indices(RECORD_DELIMITER).map(|(i, _)| i).collect();
        for (n, &start) in starts.iter().enumerate() {
            let end = starts.get(n + 1).copied().unwrap_or(line.len());
            self.parse_record(&line[start..end]);
        }
    }

    fn parse_record(&mut self, record: &str) {
        let Some(sub_step) = record
            .split_whitespace()
            .find_map(|token| token.strip_prefix(RECORD_DELIMITER))
            .and_then(|value| value.parse::<i32>().ok())
        else {
            warn!("record without a readable generation index ('{}')", record);
            return;
        };

        let generation = remap_generation(sub_step);
        if generation > self.max_generation {
            debug!("dropping record past generation {}", self.max_generation);
            return;
        }

        if self.generations.len() <= generation as usize {
            self.generations
                .resize_with(generation as usize + 1, GenerationRecord::default);
        }
        self.generations[generation as usize].push(GainSet::from_tokens(record));
    }

    /// View (a): one `generation mean min max` row per non-empty bucket.
    pub fn summary_rows(&self) -> Vec<String> {
        let stats: Vec<Option<GenerationStats>> = self
            .generations
            .par_iter()
            .map(|record| record.reduce())
            .collect();

        let mut rows = Vec::new();
        for (generation, stats) in stats.iter().enumerate() {
            let Some(stats) = stats else {
                debug!("empty set, cannot compute errors (generation {})", generation);
                continue;
            };
            rows.push(format!(
                "{} {} {} {}",
                generation, stats.mean_error, stats.min_error, stats.max_error
            ));
        }
        rows
    }

    /// View (b): per-particle fitness, one row per particle with each
    /// member's fitness followed by the running combined total.
    pub fn particle_rows(&self, members: usize) -> Vec<String> {
        if members == 0 {
            warn!("members per particle must be at least 1");
            return Vec::new();
        }
        let mut rows = Vec::new();
        for (generation, record) in self.generations.iter().enumerate() {
            let mut chunks = record.params.chunks_exact(members);
            for chunk in &mut chunks {
                let mut row = format!("{}", generation);
                let mut total = 0.0;
                for set in chunk {
                    let error = set.fitness();
                    total += error;
                    row.push_str(&format!(" {}", error));
                }
                row.push_str(&format!(" {}", total));
                rows.push(row);
            }
            if !chunks.remainder().is_empty() {
                warn!(
                    "generation {} holds an incomplete particle ({} of {} members), skipping it",
                    generation,
                    chunks.remainder().len(),
                    members
                );
            }
        }
        rows
    }

    /// View (c): raw gain values, one row per particle, a blank row after
    /// every generation bucket for dataset-separated plotting.
    pub fn param_rows(&self, members: usize) -> Vec<String> {
        if members == 0 {
            warn!("members per particle must be at least 1");
            return Vec::new();
        }
        let mut rows = Vec::new();
        for (generation, record) in self.generations.iter().enumerate() {
            for chunk in record.params.chunks_exact(members) {
                let mut row = format!("{}", generation);
                for set in chunk {
                    row.push_str(&format!(
                        " {} {} {} {} {} {} {}",
                        set.p, set.i, set.d, set.i_clamp, set.multiplier, set.max_vel, set.damping
                    ));
                }
                rows.push(row);
            }
            rows.push(String::new());
        }
        rows
    }

    /// The best measured particles across the whole table, ascending by
    /// combined fitness.
    pub fn best_particles(&self, members: usize, count: usize) -> Vec<Particle> {
        if members == 0 {
            warn!("members per particle must be at least 1");
            return Vec::new();
        }
        let mut particles: Vec<Particle> = self
            .generations
            .iter()
            .flat_map(|record| record.params.chunks_exact(members))
            .map(|chunk| Particle::new(chunk.to_vec()))
            .filter(|particle| particle.is_measured())
            .collect();
        particles.sort_by(|a, b| {
            a.fitness()
                .partial_cmp(&b.fitness())
                .unwrap_or(Ordering::Equal)
        });
        particles.truncate(count);
        particles
    }
}

/// Writes one report, one row per line.
pub fn write_report(path: &Path, rows: &[String]) -> Result<(), AnalysisError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        writeln!(writer, "{}", row)?;
    }
    writer.flush()?;
    Ok(())
}
