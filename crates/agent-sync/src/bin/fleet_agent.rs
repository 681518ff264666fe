//! fleet-agent: synchronize this computer with its fleet server.
//!
//! # Usage
//!
//! ```bash
//! fleet-agent register --user admin
//! fleet-agent sync
//! fleet-agent search bluefish
//! fleet-agent install bluefish
//! fleet-agent purge bluefish
//! ```

use agent_runtime::{CancelToken, CommandRunner};
use agent_sync::devices::Cups;
use agent_sync::hardware::CommandProbe;
use agent_sync::{
    pms, Collaborators, Config, HostIdentity, HttpTransport, SyncError, SyncOrchestrator,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use secrecy::SecretString;
use std::io::{self, BufRead, Write};
use std::process;
use std::time::Duration;

const PASSWORD_ENV: &str = "FLEET_AGENT_PASSWORD";

/// Synchronize this computer with its fleet server.
#[derive(Parser, Debug)]
#[command(name = "fleet-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging and keep the error ledger after upload
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synchronize computer with server
    Sync {
        /// Upgrade all packages even if automatic upgrades are disabled
        #[arg(long)]
        force_upgrade: bool,
    },
    /// Register computer at server
    Register {
        /// User allowed to register computers
        #[arg(short, long)]
        user: String,

        /// Password of the user (FLEET_AGENT_PASSWORD, or prompted if omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Search package
    Search {
        pattern: String,
    },
    /// Install package
    Install {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Purge package
    Purge {
        #[arg(required = true)]
        packages: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(e.exit_code());
        }
    };
    config.client.debug |= cli.debug;

    let log_level = if config.client.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("{} in execution", agent_sync::COMMAND);
    match &config.source {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: none, using defaults"),
    }

    let code = match run(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            e.downcast_ref::<SyncError>()
                .map(SyncError::exit_code)
                .unwrap_or(1)
        }
    };
    process::exit(code);
}

fn run(command: Commands, config: &Config) -> anyhow::Result<i32> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        error!("Signal received, stopping {}", agent_sync::COMMAND);
        handler_token.cancel();
    })
    .context("failed to install signal handler")?;

    let runner = CommandRunner::new(Duration::from_secs(config.client.command_timeout_secs))
        .with_cancel(cancel.clone());
    let pms = pms::detect(runner.clone()).ok_or(SyncError::PmsNotFound)?;
    let transport = HttpTransport::new(config)?;
    let printers = Cups::new(runner.clone());
    let hardware = CommandProbe::new(runner, config.client.hardware_command.clone());

    let collaborators = Collaborators {
        transport: &transport,
        pms: pms.as_ref(),
        printers: &printers,
        hardware: &hardware,
    };
    let mut agent = SyncOrchestrator::new(config, collaborators, HostIdentity::detect(config))
        .with_cancel(cancel);

    match command {
        Commands::Sync { force_upgrade } => {
            let report = agent.force_upgrade(force_upgrade).sync()?;
            Ok(report.exit_code())
        }
        Commands::Register { user, password } => {
            let password = match password.or_else(|| std::env::var(PASSWORD_ENV).ok()) {
                Some(password) => password,
                None => prompt("Password")?,
            };
            agent.register(&user, &SecretString::new(password))?;
            Ok(0)
        }
        Commands::Search { pattern } => {
            let listing = agent.search(&pattern)?;
            print!("{listing}");
            Ok(0)
        }
        Commands::Install { packages } => {
            let report = agent.install_package(&packages.join(" "))?;
            Ok(report.exit_code())
        }
        Commands::Purge { packages } => {
            let report = agent.purge_package(&packages.join(" "))?;
            Ok(report.exit_code())
        }
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
