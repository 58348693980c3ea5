//! alohartc CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use alohartc_client::cli::{Cli, Command, ConfigAction};
use alohartc_client::commands::call::{CallArgs, Overrides};
use alohartc_client::commands::monitor::MonitorArgs;
use alohartc_client::config::ClientConfig;
use alohartc_client::error::{ClientError, ClientResult};
use alohartc_core::{init_tracing, TracingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path).map_err(ClientError::Config)?
    } else {
        ClientConfig::load().map_err(ClientError::Config)?
    };

    let tracing = if cli.trace_signaling {
        TracingConfig::signaling_trace()
    } else if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    let overrides = Overrides {
        server: cli.server,
        token: cli.token,
        timeout: cli.timeout,
    };

    match cli.command {
        Command::Call {
            device_id,
            ice_servers,
            relay_only,
        } => {
            let args = CallArgs {
                device_id,
                ice_servers,
                relay_only,
            };
            alohartc_client::commands::call::run(&config, &overrides, args).await
        }
        Command::Monitor {
            device,
            group,
            json,
        } => {
            let args = MonitorArgs {
                device,
                group,
                json,
            };
            alohartc_client::commands::monitor::run(&config, &overrides, args).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => alohartc_client::commands::config::dump(&config, &config_path),
            ConfigAction::Validate => alohartc_client::commands::config::validate(&config),
            ConfigAction::Path => alohartc_client::commands::config::path(&config_path),
        },
    }
}
