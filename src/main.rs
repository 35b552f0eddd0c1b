//! autoportal - logs in to captive-portal networks unattended
//!
//! Watches which network the machine is connected to, decides whether
//! that network needs an interactive portal login, and drives a scripted
//! browser session through it, with shell hooks around every phase.

mod actions;
mod config;
mod connectivity;
mod daemon;
mod data;
mod discovery;
mod engine;
mod error;
mod hooks;
mod interactive;
mod session;
mod webdriver;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autoportal")]
#[command(about = "Captive Portal Auto Login", long_about = None)]
pub struct Args {
    /// Run as a long-lived service, acting on network changes
    #[arg(short, long)]
    daemon: bool,

    /// The name of the network to log in to (interactive only)
    #[arg(short, long)]
    pub network: Option<String>,

    /// Automatically discover the connected network (interactive only)
    #[arg(short, long)]
    pub auto: bool,

    /// Skip the connectivity check and always attempt the login
    #[arg(short = 'S', long)]
    pub skip_check: bool,

    /// Do not log in, only run the other requested phases
    #[arg(long)]
    pub no_login: bool,

    /// Read data limits from the network (interactive only)
    #[arg(short = 'D', long)]
    pub data: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More detailed logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = config::ConfigHandle::load(args.config.clone())?;

    let level = if args.quiet {
        "error".to_string()
    } else if args.verbose {
        "debug".to_string()
    } else {
        config.current().logging.level.clone()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("autoportal v{}", env!("CARGO_PKG_VERSION"));

    if args.daemon {
        daemon::run(config, &args).await
    } else {
        interactive::run(config.current(), &args).await
    }
}
