//! Champion export: persists the best particles of an analysis run as JSON
//! with enough metadata to reproduce them.

use crate::config::SearchConfig;
use crate::gains::GainSet;
use crate::tuning::population::Particle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to read or write export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode or decode export: {0}")]
    Json(#[from] serde_json::Error),
}

/// The export artifact.
#[derive(Serialize, Deserialize)]
pub struct ChampionExport {
    /// Schema version for forward/backward compatibility.
    pub schema_version: String,
    /// Unix timestamp when the export was generated.
    pub generated_at: i64,
    /// Snapshot of the search configuration the champions were found with.
    pub search: SearchConfig,
    /// Best particles, rank 1 first.
    pub champions: Vec<ChampionData>,
}

#[derive(Serialize, Deserialize)]
pub struct ChampionData {
    /// Rank by combined fitness (1 = best).
    pub rank: usize,
    /// Combined fitness over all members.
    pub fitness: f64,
    /// The member gain sets, in role order.
    pub members: Vec<GainSet>,
}

impl ChampionExport {
    /// Builds an export from particles already sorted ascending by fitness.
    pub fn new(search: &SearchConfig, champions: Vec<Particle>) -> Self {
        let champions = champions
            .into_iter()
            .enumerate()
            .map(|(index, particle)| ChampionData {
                rank: index + 1,
                fitness: particle.fitness(),
                members: particle.members,
            })
            .collect();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: chrono::Utc::now().timestamp(),
            search: search.clone(),
            champions,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, ExportError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
