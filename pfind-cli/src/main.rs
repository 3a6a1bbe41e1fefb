use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use pfind::{
    config::parse_timestamp,
    errors::{FAILURE_EXIT_CODE, INTERRUPT_EXIT_CODE},
    pool::COORDINATOR_RANK,
    ConsoleReporter, FindConfig, FindError, MatchCriteria, ProcessPool,
};
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Parallel find: crawls every subdirectory of DIR with a pool of cooperating members and
/// prints matches/entries.
#[derive(Parser)]
#[command(name = "pfind", author, version, about, long_about = None, disable_help_flag = true)]
struct Cli {
    /// Directory whose subdirectories are searched
    #[arg(value_name = "DIR")]
    root: PathBuf,

    /// Match files whose name contains SUBSTRING
    #[arg(short = 'n', long, value_name = "SUBSTRING")]
    name: Option<String>,

    /// Match files of exactly BYTES bytes
    #[arg(short = 's', long, value_name = "BYTES")]
    size: Option<u64>,

    /// Match files modified after TIME (seconds since the epoch or RFC 3339)
    #[arg(long, value_name = "TIME", value_parser = parse_newer)]
    newer: Option<i64>,

    /// Do not print matches
    #[arg(long)]
    silent: bool,

    /// Log per-member progress to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print sizes as 1.5K, 20M, ...
    #[arg(short = 'h', long)]
    human_readable: bool,

    /// Number of pool members (default: number of CPUs)
    #[arg(short = 'j', long, value_name = "N")]
    processes: Option<NonZeroUsize>,

    /// Additional configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn to_config(&self) -> FindConfig {
        FindConfig {
            root_path: self.root.clone(),
            criteria: MatchCriteria {
                name: self.name.clone(),
                size: self.size,
                newer_than: self.newer,
                silent: self.silent,
            },
            pool_size: self.processes,
            human_readable: self.human_readable,
            verbose: self.verbose,
            ..Default::default()
        }
    }
}

fn parse_newer(text: &str) -> std::result::Result<i64, String> {
    parse_timestamp(text).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    if std::env::args_os().len() <= 1 {
        // Nothing to search: show usage and succeed
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<FindError>()
                .map(FindError::exit_code)
                .unwrap_or(FAILURE_EXIT_CODE);
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = FindConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?
        .merge_with_cli(cli.to_config());
    config.validate()?;

    setup_logging(&config);
    debug!(?config, "Configuration loaded");

    let pool = ProcessPool::new(config.pool_size())?;
    let abort = pool.abort_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        abort.abort(COORDINATOR_RANK, INTERRUPT_EXIT_CODE, "interrupted by user");
    })
    .context("Failed to set signal handler")?;

    let reporter = ConsoleReporter::new(config.human_readable);
    let totals = pfind::find_in(&pool, &config, &reporter)?;
    match reporter.finish(&totals) {
        // Reader closed stdout early, e.g. `pfind ... | head`
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Output closed before the summary was written");
            Ok(())
        }
        other => other.context("Failed to write results"),
    }
}

fn setup_logging(config: &FindConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.verbose {
            EnvFilter::new("pfind=debug,warn")
        } else {
            EnvFilter::new(format!("pfind={},warn", config.log_level))
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
