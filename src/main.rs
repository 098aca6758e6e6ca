//! MLC-CORE command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `mlc-core-cli load [--reload] [--path P]` - Sync artifacts to the cache
//! - `mlc-core-cli classify PATH...` - Show how files would be handled
//! - `mlc-core-cli status [--json]` - Dump the serving registry
//! - `mlc-core-cli health` - Probe every replica (exit 0/1)
//! - `mlc-core-cli config show|defaults|validate`

use std::path::Path;
use std::process::ExitCode;

use mlc_core::cli::{self, config_cmd, LoadArgs};
use mlc_core::config as mlc_config;
use mlc_core::telemetry::{init_logging, LogConfig};
use mlc_core::SyncRuntime;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "load" => {
            let load_args = match LoadArgs::parse(&args[2..]) {
                Ok(parsed) => parsed,
                Err(e) => {
                    eprintln!("{}", e);
                    print_command_help("load");
                    return ExitCode::from(2u8);
                }
            };
            let Some(runtime) = runtime() else {
                return ExitCode::from(2u8);
            };
            let code = cli::run_load(
                &runtime,
                load_args.reload,
                load_args.path.as_deref().map(Path::new),
            )
            .await;
            ExitCode::from(code as u8)
        }
        "classify" => ExitCode::from(cli::run_classify(&args[2..]) as u8),
        "status" => {
            let Some(runtime) = runtime() else {
                return ExitCode::from(2u8);
            };
            let json_output = args.get(2).map(|s| s.as_str()) == Some("--json");
            let code = cli::run_status(&runtime.registry, json_output).await;
            ExitCode::from(code as u8)
        }
        "health" => {
            let Some(runtime) = runtime() else {
                return ExitCode::from(2u8);
            };
            let code = cli::run_health(&runtime.health, runtime.replicas()).await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show() as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("mlc-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Load configuration, start logging and wire the runtime.
fn runtime() -> Option<SyncRuntime> {
    let config = match mlc_config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return None;
        }
    };
    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging setup failed: {}", e);
        return None;
    }
    Some(SyncRuntime::new(config))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "MLC-CORE - model artifact synchronization and serving registry v{}

USAGE:
    mlc-core-cli [COMMAND] [OPTIONS]

COMMANDS:
    load         Sync the model root (or one sub-tree) to the cache servers
    classify     Show the artifact kind and rule for each PATH
    status       Dump the serving registry
    health       Probe every configured cache server
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    MLC_MODEL_ROOT     Artifact root (default: $AIMODULE_HOME/model)
    MLC_SERVER_ROLE    master or slave (default: master)
    MLC_CONFIG_FILE    TOML file overriding the environment
    MLC_LOG_LEVEL      Log filter (default: info)
    MLC_LOG_FORMAT     json or pretty

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Configuration error
    3  Connection error",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "load" => {
            eprintln!(
                "mlc-core-cli load - Sync artifacts to the cache

USAGE:
    mlc-core-cli load [--reload] [--path PATH]

OPTIONS:
    --reload     Republish tensor models even when the stored tag matches
    --path PATH  Load this sub-tree instead of the whole model root

DESCRIPTION:
    Waits for the primary cache server, classifies every file under the
    root and publishes it to each replica. A slave-role process skips the
    load entirely."
            );
        }
        "classify" => {
            eprintln!(
                "mlc-core-cli classify - Show how files are handled

USAGE:
    mlc-core-cli classify PATH...

DESCRIPTION:
    Prints kind, rule and path per line. Nothing is read from disk."
            );
        }
        "status" => {
            eprintln!(
                "mlc-core-cli status - Dump the serving registry

USAGE:
    mlc-core-cli status [--json]"
            );
        }
        "health" => {
            eprintln!(
                "mlc-core-cli health - Probe cache servers

EXIT CODES:
    0  Every replica answered
    1  At least one replica is unreachable"
            );
        }
        "config" => {
            eprintln!(
                "mlc-core-cli config - Manage configuration

USAGE:
    mlc-core-cli config show      Print effective values
    mlc-core-cli config defaults  Print documented defaults
    mlc-core-cli config validate  Check for misconfiguration"
            );
        }
        _ => {
            eprintln!("No help for unknown command: {}", command);
            print_usage();
        }
    }
}
