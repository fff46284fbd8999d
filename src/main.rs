mod cli;
mod ui;
mod watch;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use relaypulse::network::Network;
use relaypulse::registry::RegistryError;
use tracing_subscriber::EnvFilter;

use crate::cli::{ChainsFormat, Cli, Commands};
use crate::watch::{load_registry, run_mock, run_watch};

fn print_chains(network: Option<Network>, registry: Option<std::path::PathBuf>, format: ChainsFormat) -> Result<()> {
    let registry = load_registry(registry.as_deref())?;
    let networks = match network {
        Some(n) => vec![n],
        None => Network::ALL.to_vec(),
    };
    match format {
        ChainsFormat::Text => {
            for n in networks {
                let relay_id = registry.relay_id(n);
                for chain in registry.chains(n) {
                    let marker = if chain.para_id == relay_id { "\trelay" } else { "" };
                    println!("{}\t{}\t{}{}", n, chain.para_id, chain.name, marker);
                }
            }
        }
        ChainsFormat::Json => {
            #[derive(serde::Serialize)]
            struct ChainOut {
                network: Network,
                para_id: u32,
                name: String,
                relay: bool,
            }

            let out: Vec<ChainOut> = networks
                .into_iter()
                .flat_map(|n| {
                    let relay_id = registry.relay_id(n);
                    registry.chains(n).iter().map(move |c| ChainOut {
                        network: n,
                        para_id: c.para_id,
                        name: c.name.clone(),
                        relay: c.para_id == relay_id,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Chains { network, registry, format }) => print_chains(network, registry, format),
        Some(Commands::Watch(watch)) => run_watch(watch),
        Some(Commands::Mock(mock)) => run_mock(mock),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: registry, 4: bind failure, 1: other
    for cause in err.chain() {
        if cause.is::<RegistryError>() {
            return 2;
        }
        if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind::*;
            return match ioe.kind() {
                AddrInUse | AddrNotAvailable | PermissionDenied => 4,
                _ => 1,
            };
        }
    }
    1
}
