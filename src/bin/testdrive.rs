//! # Testdrive
//!
//! Runs the services and tasks declared in a testdrive document against the
//! local Docker daemon.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use testdrive::config::{loader, SessionSettings};
use testdrive::constants::{self, exit_codes};
use testdrive::logging;
use testdrive::output::ConsoleOutput;
use testdrive::runtime::docker::DockerRuntime;
use testdrive::{RunOutcome, Session};
use tracing::error;

#[derive(Parser)]
#[command(name = "testdrive")]
#[command(about = "Run containerized services and tasks in dependency order")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Document declaring services and tasks
    #[arg(short, long, default_value = constants::DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// Write a JSON report of the finished session to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

async fn run(cli: &Cli) -> anyhow::Result<RunOutcome> {
    let document = loader::load_config_file(&cli.file)
        .with_context(|| format!("loading {}", cli.file.display()))?;

    let directory = cli
        .file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let settings = SessionSettings::load(Some(directory)).context("loading session settings")?;

    let runtime = DockerRuntime::connect().context("connecting to Docker")?;
    let mut session = Session::new(
        &document,
        settings,
        Arc::new(runtime),
        Arc::new(ConsoleOutput::new()),
    )?;

    let outcome = session.run().await?;

    if let Some(path) = &cli.report {
        let json = session.report(&outcome).to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    Ok(outcome)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let code = match run(&cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("{e:#}");
            exit_codes::ERROR
        }
    };

    process::exit(code);
}
