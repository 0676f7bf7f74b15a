//! Best-effort persistence: the per-epoch log writers owned by a tuning
//! group and the optional starting-population import.
//!
//! Nothing in here may stall or stop the live loop. A writer that fails to
//! open or write disables itself with a warning and the search continues
//! without that stream.

use crate::gains::GainSet;
use chrono::Local;
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const JOINT_LOG_PREFIX: &str = "tuner.joints.";
const POPULATION_LOG_PREFIX: &str = "tuner.gen_pop.";

/// One line-oriented output stream bound to a single epoch. Opened eagerly;
/// a failed open or write disables the stream for the rest of its life.
pub struct LogFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl LogFile {
    pub fn create(path: PathBuf) -> Self {
        let writer = match File::create(&path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                warn!("failed to open log file '{}': {}", path.display(), e);
                None
            }
        };
        Self { path, writer }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    pub fn write_line(&mut self, line: &str) {
        if let Some(writer) = &mut self.writer {
            if let Err(e) = writeln!(writer, "{}", line) {
                warn!("failed to write log file '{}': {}", self.path.display(), e);
                self.writer = None;
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = &mut self.writer {
            if let Err(e) = writer.flush() {
                warn!("failed to flush log file '{}': {}", self.path.display(), e);
                self.writer = None;
            }
        }
    }
}

/// The pair of output streams of one tuning group: the per-evaluation joint
/// log and the population log consumed by the offline aggregator. Files are
/// stamped with the epoch's start time; a reset rotates to a fresh pair.
pub struct GroupLogs {
    dir: PathBuf,
    joints: LogFile,
    population: LogFile,
}

impl GroupLogs {
    pub fn create(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("failed to create log directory '{}': {}", dir.display(), e);
        }
        let (joints, population) = Self::open_pair(dir);
        Self {
            dir: dir.to_path_buf(),
            joints,
            population,
        }
    }

    fn open_pair(dir: &Path) -> (LogFile, LogFile) {
        let stamp = Local::now().format("%Y-%m-%d_%H:%M:%S");
        let joints = LogFile::create(dir.join(format!("{}{}.log", JOINT_LOG_PREFIX, stamp)));
        let population =
            LogFile::create(dir.join(format!("{}{}.log", POPULATION_LOG_PREFIX, stamp)));
        (joints, population)
    }

    pub fn joints(&mut self) -> &mut LogFile {
        &mut self.joints
    }

    pub fn population(&mut self) -> &mut LogFile {
        &mut self.population
    }

    /// Flushes and closes the current pair and opens a fresh, restamped one.
    pub fn rotate(&mut self) {
        self.joints.flush();
        self.population.flush();
        let (joints, population) = Self::open_pair(&self.dir);
        self.joints = joints;
        self.population = population;
    }

    pub fn flush(&mut self) {
        self.joints.flush();
        self.population.flush();
    }
}

/// Reads a starting population, one gain set per line in the usual token
/// grammar. Blank lines and `#` comments are skipped. Sets without a
/// strictly positive velocity error are rejected with a warning. A missing
/// position error defaults to zero so legacy `error=` files stay usable.
pub fn read_population(path: &Path) -> std::io::Result<Vec<GainSet>> {
    let file = File::open(path)?;
    let mut sets = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut set = GainSet::from_tokens(line);
        if set.pos_sq_mean_error.is_nan() {
            set.pos_sq_mean_error = 0.0;
        }
        if !(set.vel_sq_mean_error > 0.0) {
            warn!(
                "invalid velocity error in imported set ({})",
                set.vel_sq_mean_error
            );
            continue;
        }
        sets.push(set);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_log_file_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut log = LogFile::create(path.clone());
        assert!(log.is_active());

        log.write_line("first");
        log.write_line("second");
        log.flush();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_log_file_failure_is_not_fatal() {
        let mut log = LogFile::create(PathBuf::from("/nonexistent-dir/out.log"));
        assert!(!log.is_active());
        // Writing to a dead stream is a quiet no-op.
        log.write_line("dropped");
        log.flush();
    }

    #[test]
    fn test_group_logs_rotate_to_new_files() {
        let dir = tempdir().unwrap();
        let mut logs = GroupLogs::create(dir.path());
        logs.population().write_line("generation=1 joint=2 p=1.0");
        let first_path = logs.population().path().to_path_buf();

        logs.rotate();
        let second_path = logs.population().path().to_path_buf();
        logs.population().write_line("generation=1 joint=2 p=2.0");
        logs.flush();

        let second = fs::read_to_string(&second_path).unwrap();
        assert!(second.contains("p=2.0"));
        // The stamp only changes across a second boundary; when it does,
        // the old epoch's records stay behind in the old file.
        if second_path != first_path {
            let first = fs::read_to_string(&first_path).unwrap();
            assert!(first.contains("p=1.0"));
            assert!(!second.contains("p=1.0"));
        }
    }

    #[test]
    fn test_read_population_filters_invalid_sets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("starting_population.txt");
        fs::write(
            &path,
            "# comment line\n\
             p=1.0 i=0.001 d=0.002 i_clamp=0.01 v_max=5.0 damp=0.05 vel_error=0.5 pos_error=0.001\n\
             \n\
             p=2.0 vel_error=0.0\n\
             p=3.0 vel_error=-1.0\n\
             p=4.0\n\
             p=5.0 error=0.25\n",
        )
        .unwrap();

        let sets = read_population(&path).unwrap();
        assert_eq!(sets.len(), 2);

        assert_eq!(sets[0].p, 1.0);
        assert_eq!(sets[0].vel_sq_mean_error, 0.5);
        assert_eq!(sets[0].pos_sq_mean_error, 0.001);

        // The legacy alias parses, and a missing pos_error becomes zero.
        assert_eq!(sets[1].p, 5.0);
        assert_eq!(sets[1].vel_sq_mean_error, 0.25);
        assert_eq!(sets[1].pos_sq_mean_error, 0.0);
    }
}
