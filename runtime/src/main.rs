// Copyright 2026 Streamprobe Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::net::SocketAddr;
use streamprobe::cli;
use streamprobe::config::ProbeConfig;

#[derive(Parser)]
#[command(
    name = "streamprobe",
    about = "streamprobe: find HLS manifests behind dynamic video pages",
    version,
    after_help = "Run 'streamprobe <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Navigation + network-idle timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Quiet period that counts as network idle, in milliseconds
    #[arg(long, global = true)]
    idle_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Listen address (host:port)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Maximum concurrent browser sessions
        #[arg(long)]
        max_sessions: Option<usize>,
    },
    /// Run one browser session against a page and print manifest links
    Probe {
        /// Page URL to open
        url: String,
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "streamprobe", &mut std::io::stdout());
        return Ok(());
    }

    cli::init_tracing(cli.verbose, cli.log_json);

    let base = ProbeConfig::from_env()?;
    match cli.command {
        Commands::Serve { bind, max_sessions } => {
            let config = base.with_overrides(bind, cli.timeout_ms, cli.idle_ms, max_sessions)?;
            cli::serve::run(config).await
        }
        Commands::Probe { url, json } => {
            let config = base.with_overrides(None, cli.timeout_ms, cli.idle_ms, None)?;
            cli::probe::run(&url, config, json).await
        }
        Commands::Doctor => {
            let config = base.with_overrides(None, cli.timeout_ms, cli.idle_ms, None)?;
            cli::doctor::run(&config).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}
