use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand};
use commands::{
    check::{self, CheckArgs},
    order::{self, OrderArgs},
    run::{self, RunArgs},
    seed::{self, SeedArgs},
    status::{self, StatusArgs},
};
use segeval_core::{EvalError, Seed};
use segeval_exp::{to_canonical_json_bytes, ExperimentConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "segeval", version, about = "Blinded liver segmentation evaluation")]
struct Cli {
    /// Log lifecycle events at info level.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the presentation order for a seed.
    Order(OrderArgs),
    /// Index the configured directories and report consistency.
    Check(CheckArgs),
    /// Print a fresh random seed, or validate one.
    Seed(SeedArgs),
    /// Summarise progress recorded in a score table.
    Status(StatusArgs),
    /// Run an interactive evaluation session on stdin.
    Run(RunArgs),
}

/// Experiment configuration file plus command-line overrides.
#[derive(ClapArgs, Debug, Clone)]
pub struct ConfigArgs {
    /// YAML experiment configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory of volumes, overriding the configuration.
    #[arg(long)]
    pub volumes: Option<PathBuf>,
    /// The four method directories, in order.
    #[arg(long = "methods", value_name = "DIR", num_args = 4)]
    pub methods: Option<Vec<PathBuf>>,
    /// Score table path, overriding the configuration.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Presentation order seed (digits only).
    #[arg(long)]
    pub seed: Option<String>,
}

impl ConfigArgs {
    /// Loads the configuration file, if any, and applies the overrides.
    pub fn resolve(&self) -> Result<ExperimentConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path).map_err(boxed)?,
            None => ExperimentConfig::default(),
        };
        if let Some(volumes) = &self.volumes {
            config.volumes_dir = volumes.clone();
        }
        if let Some(methods) = &self.methods {
            for (slot, dir) in config.method_dirs.iter_mut().zip(methods) {
                *slot = dir.clone();
            }
        }
        if let Some(output) = &self.output {
            config.output_file = output.clone();
        }
        if let Some(seed) = &self.seed {
            config.seed = Some(Seed::parse(seed).map_err(boxed)?);
        }
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Order(args) => order::run(&args),
        Command::Check(args) => check::run(&args),
        Command::Seed(args) => seed::run(&args),
        Command::Status(args) => status::run(&args),
        Command::Run(args) => run::run(&args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn boxed(err: EvalError) -> Box<dyn Error> {
    Box::new(err)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let bytes = to_canonical_json_bytes(value).map_err(boxed)?;
    println!("{}", String::from_utf8(bytes)?);
    Ok(())
}

pub(crate) fn display_path(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        "<unset>".to_string()
    } else {
        path.display().to_string()
    }
}
