use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request to the backup daemon and print the reply.
    Send(SendArgs),
    /// Run a development daemon that answers ping requests.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Daemon socket path to connect to.
    pub path: PathBuf,
    /// Function to invoke (e.g. ping, run_backup).
    #[arg(long, short = 'f')]
    pub function: String,
    /// JSON arguments for the function.
    #[arg(long)]
    pub data: Option<String>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Directory holding the credential file. Default: the caller's home.
    #[arg(long, value_name = "DIR", env = "BACKHAUL_CREDENTIAL_DIR")]
    pub credential_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after serving N connections.
    #[arg(long)]
    pub count: Option<usize>,
    /// Directory holding callers' credential files. Default: each caller's
    /// home directory from the passwd database.
    #[arg(long, value_name = "DIR", env = "BACKHAUL_CREDENTIAL_DIR")]
    pub credential_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
