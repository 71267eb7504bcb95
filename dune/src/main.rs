//! `dune`: turn a natural-language task into a validated configuration and
//! hand it to the executor.
//!
//! Works in the current directory: settings from `dune.toml`, variables from
//! `.env`, documents under `configs/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use dune::core::types::RunEnvironment;
use dune::error::DuneError;
use dune::exit_codes;
use dune::io::prompt::Console;
use dune::logging;
use dune::pipeline::{Mode, PipelineOptions, RunOutcome, Session};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "dune",
    version,
    about = "Map a task to capability providers, configure and validate its environment, run it"
)]
#[command(group(ArgGroup::new("mode").args(["interactive", "config", "quick"])))]
struct Cli {
    /// Interactive mode: describe the task, pick providers, fill parameters.
    #[arg(short, long)]
    interactive: bool,

    /// Run a saved YAML configuration.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a task text directly.
    #[arg(short, long, value_name = "TEXT")]
    quick: Option<String>,

    /// Validate only; never start the executor.
    #[arg(short = 'v', long)]
    validate_only: bool,

    /// Detect and repair environment values without asking.
    #[arg(short, long)]
    auto_configure: bool,

    /// Save the generated configuration to this path.
    #[arg(short, long, value_name = "PATH")]
    save_config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = RunEnvironment::Development)]
    environment: RunEnvironment,

    #[arg(short, long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.interactive {
            Mode::Interactive
        } else if let Some(path) = &self.config {
            Mode::Config(path.clone())
        } else if let Some(text) = &self.quick {
            Mode::Quick(text.clone())
        } else {
            Mode::Menu
        }
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            validate_only: self.validate_only,
            auto_configure: self.auto_configure,
            save_config: self.save_config.clone(),
            environment: self.environment,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::FAILURE
            } else {
                exit_codes::OK
            };
            // Help and version go to stdout.
            let _ = err.print();
            std::process::exit(code);
        }
    };
    logging::init(cli.log_level.as_str());

    let result = run(&cli);
    let code = exit_codes::for_result(&result);
    match result {
        Ok(outcome) => debug!(?outcome, "run finished"),
        Err(err) if DuneError::is_interrupted(&err) => {
            eprintln!("\nInterrupted.");
        }
        Err(err) => eprintln!("{err:#}"),
    }
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<RunOutcome> {
    let root = std::env::current_dir().context("resolve working directory")?;
    let mut console = Console::stdio();
    let mut session = Session::open(&root, cli.options(), &mut console)?;
    session.run(cli.mode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_means_menu() {
        let cli = Cli::try_parse_from(["dune"]).expect("parse");
        assert_eq!(cli.mode(), Mode::Menu);
        assert_eq!(cli.environment, RunEnvironment::Development);
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn short_flags_parse() {
        let cli = Cli::try_parse_from([
            "dune", "-c", "configs/weekly.yaml", "-v", "-a", "-s", "out.yaml", "-e", "testing",
            "-l", "warning",
        ])
        .expect("parse");
        assert_eq!(cli.mode(), Mode::Config(PathBuf::from("configs/weekly.yaml")));
        let options = cli.options();
        assert!(options.validate_only && options.auto_configure);
        assert_eq!(options.save_config, Some(PathBuf::from("out.yaml")));
        assert_eq!(options.environment, RunEnvironment::Testing);
        assert_eq!(cli.log_level, LogLevel::Warning);
    }

    #[test]
    fn quick_takes_task_text() {
        let cli = Cli::try_parse_from(["dune", "--quick", "pobierz pocztę"]).expect("parse");
        assert_eq!(cli.mode(), Mode::Quick("pobierz pocztę".to_string()));
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["dune", "-i", "-q", "task"]).is_err());
        assert!(Cli::try_parse_from(["dune", "-e", "staging"]).is_err());
    }
}
