// reclink CLI - probabilistic record linkage between two CSV tables

mod exit_codes;
mod link;

use std::process::ExitCode;

use clap::{ArgAction, Parser};
use env_logger::Env;

use exit_codes::EXIT_SUCCESS;
use link::LinkCommands;

#[derive(Parser)]
#[command(name = "reclink")]
#[command(
    about = "Link records across two tables with blocking, fuzzy comparison and EM-trained scoring"
)]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log progress to stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: LinkCommands,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("RECLINK_GIT_HASH"), ")",
        "\nengine:  reclink-linkage ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("RECLINK_TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match link::cmd_link(cli.command) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
