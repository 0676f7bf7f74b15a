use servo_tuner::analysis::{write_report, AnalysisError, GenerationTable};
use servo_tuner::config::Config;
use servo_tuner::export::ChampionExport;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

/// Replays one persisted population log and writes the derived reports:
/// per-generation summary, per-particle fitness, raw parameter values, and
/// the JSON champion export.
fn run_analysis(config: &Config, input: &Path) -> Result<(), AnalysisError> {
    log::info!("Reading population log '{}'...", input.display());
    let file = File::open(input)?;
    let mut table = GenerationTable::new(config.analysis.max_generation);
    let lines = table.parse_reader(BufReader::new(file))?;
    log::info!(
        "Parsed {} lines into {} generation buckets.",
        lines,
        table.generations().len()
    );

    let members = config.analysis.members_per_particle;
    let out_dir = PathBuf::from(&config.analysis.output_dir);
    std::fs::create_dir_all(&out_dir)?;

    write_report(&out_dir.join("analysis.summary.log"), &table.summary_rows())?;
    write_report(
        &out_dir.join("analysis.particles.log"),
        &table.particle_rows(members),
    )?;
    write_report(
        &out_dir.join("analysis.params.log"),
        &table.param_rows(members),
    )?;
    log::info!("Reports written to '{}'.", out_dir.display());

    let champions = table.best_particles(members, config.analysis.champion_count);
    if champions.is_empty() {
        log::warn!("no measured particles found, skipping champion export");
        return Ok(());
    }
    let export = ChampionExport::new(&config.search, champions);
    let export_path = out_dir.join("analysis.champions.json");
    match export.write_json(&export_path) {
        Ok(()) => log::info!("Champion export written to '{}'.", export_path.display()),
        Err(e) => log::warn!("failed to write champion export: {}", e),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Booting gain-set analysis...");

    let config = match Config::load(Path::new("config.toml")) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    let input = std::env::args()
        .nth(1)
        .or_else(|| config.analysis.input_file.clone());
    let Some(input) = input else {
        log::error!("No input given: pass a population log path or set [analysis].input_file.");
        process::exit(1);
    };

    if let Err(e) = run_analysis(&config, Path::new(&input)) {
        log::error!("Analysis failed: {}", e);
        process::exit(1);
    }
    log::info!("Analysis complete.");
}
