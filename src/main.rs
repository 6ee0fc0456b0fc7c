use audiosim::{
    config::{Config, ConfigStore, FileConfigStore},
    finalize,
    history::HistoryDb,
    patient::{PatientProfile, ThresholdOracle},
    report::{format_duration, render_table, write_csv},
    simulation::simulate,
    StaircaseController, TestResult, TestSession,
};
use chrono::Local;
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{error::Error, fs::File, io::BufWriter, path::PathBuf};
use tracing_subscriber::filter::LevelFilter;

/// pure-tone audiometry practice against a virtual patient
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs the Hughson-Westlake threshold search against a randomly generated virtual patient and prints the resulting audiogram, technical errors included."
)]
pub struct Cli {
    /// config file to read instead of the default location ($AUDIOSIM_HOME or the platform config dir)
    #[clap(long)]
    config: Option<PathBuf>,

    /// history database to use instead of the default location
    #[clap(long)]
    db: Option<PathBuf>,

    /// leave air conduction out of the sequence
    #[clap(long)]
    no_air: bool,

    /// leave bone conduction out of the sequence
    #[clap(long)]
    no_bone: bool,

    /// level in dB HL each step starts at
    #[clap(short = 'l', long, allow_hyphen_values = true)]
    starting_level: Option<i32>,

    /// presentations spent on one step before it is abandoned
    #[clap(long)]
    max_presentations: Option<usize>,

    /// id recorded for the virtual patient
    #[clap(long)]
    patient_id: Option<String>,

    /// seed for the virtual patient, for reproducible runs
    #[clap(long)]
    seed: Option<u64>,

    /// print the result as JSON instead of a table
    #[clap(long)]
    json: bool,

    /// also write the thresholds to a CSV file
    #[clap(long)]
    csv: Option<PathBuf>,

    /// show the virtual patient's true thresholds after the table
    #[clap(long)]
    reveal: bool,

    /// do not store the result in the history database
    #[clap(long)]
    no_history: bool,

    /// list the most recent stored sessions and exit
    #[clap(long, value_name = "N")]
    history: Option<usize>,

    /// write the effective settings back to the config file
    #[clap(long)]
    save_config: bool,

    /// debug logging on stderr
    #[clap(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    /// Flags override whatever the config file says
    fn apply_to(&self, config: &mut Config) {
        if self.no_air {
            config.include_air_conduction = false;
        }
        if self.no_bone {
            config.include_bone_conduction = false;
        }
        if let Some(level) = self.starting_level {
            config.starting_level = level;
        }
        if let Some(max) = self.max_presentations {
            config.max_presentations_per_step = max;
        }
    }

    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }

    fn open_history(&self) -> audiosim::Result<HistoryDb> {
        match &self.db {
            Some(path) => HistoryDb::open(path),
            None => HistoryDb::new(),
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = cli.config_store();
    let mut config = store.load();
    cli.apply_to(&mut config);
    if cli.save_config {
        store.save(&config)?;
        log::info!("saved config to {}", store.path().display());
    }

    if let Some(limit) = cli.history {
        return print_history(&cli, limit);
    }

    let seed = cli.seed.unwrap_or_else(rand::random);
    log::debug!("virtual patient seed {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let patient_id = cli
        .patient_id
        .clone()
        .unwrap_or_else(|| format!("virtual-{:04}", rng.gen_range(0..10_000)));
    let profile = PatientProfile::random(patient_id.clone(), &mut rng);

    let mut session = TestSession::new(patient_id, &config.sequence_config());
    let mut controller = StaircaseController::new();
    let mut oracle = ThresholdOracle::new(profile);
    let stats = simulate(
        &mut session,
        &mut controller,
        &mut oracle,
        config.max_presentations_per_step,
    );
    let result = finalize(&mut session, Local::now());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_table(&result));
        println!(
            "\n{} presentations, {} of {} thresholds confirmed, {} no response, {} abandoned",
            stats.presentations,
            result.confirmed_count(),
            result.thresholds.len(),
            stats.no_response,
            stats.abandoned
        );
        if cli.reveal {
            print_truth(&result, oracle.profile());
        }
    }

    if let Some(path) = &cli.csv {
        write_csv(&result, BufWriter::new(File::create(path)?))?;
    }

    if !cli.no_history {
        match cli.open_history() {
            Ok(mut db) => {
                if let Err(e) = db.record_result(&result) {
                    log::warn!("could not store session {}: {}", result.session_id, e);
                }
            }
            Err(e) => log::warn!("history database unavailable: {}", e),
        }
    }

    Ok(())
}

fn print_truth(result: &TestResult, profile: &PatientProfile) {
    println!("\nTrue thresholds of {}:", profile.id);
    for point in &result.thresholds {
        let truth = profile
            .threshold(point.ear, point.test_type, point.frequency)
            .map(|level| level.to_string())
            .unwrap_or_else(|| "?".to_string());
        let measured = point
            .level
            .map(|level| level.to_string())
            .unwrap_or_else(|| "--".to_string());
        println!(
            "  {:>5} Hz {:<5} {:<4}  measured {:>4}  true {:>4}",
            point.frequency, point.ear, point.test_type, measured, truth
        );
    }
}

fn print_history(cli: &Cli, limit: usize) -> Result<(), Box<dyn Error>> {
    let db = cli.open_history()?;
    let sessions = db.recent_sessions(limit)?;
    if sessions.is_empty() {
        println!("No stored sessions");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {:<14} {}  {} thresholds  {}  {} technical errors",
            s.timestamp.format("%Y-%m-%d %H:%M"),
            s.patient_id,
            s.session_id,
            s.threshold_count,
            format_duration(s.test_duration_ms),
            s.technical_errors.len()
        );
    }
    Ok(())
}
