//! Decode and encode Elster values, and run an engine over socketcan
use std::{process::ExitCode, time::Duration};

use clap::Parser;
use elster_cli::command::{describe_decode, describe_encode, Cli, Commands, RunArgs};
use elster_common::bus_config::BusConfig;
use elster_node::{Engine, Reading};
use log::info;

#[cfg(feature = "socketcan")]
use elster_util::{open_socketcan, SocketCanFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode(args) => match describe_decode(args.elster_type, &args.bytes) {
            Ok(value) => println!("{value}"),
            Err(e) => {
                println!("Cannot decode: {e}");
                return ExitCode::FAILURE;
            }
        },
        Commands::Encode(args) => match describe_encode(args.elster_type, args.value) {
            Ok(bytes) => println!("{bytes}"),
            Err(e) => {
                println!("Cannot encode: {e}");
                return ExitCode::FAILURE;
            }
        },
        Commands::Run(args) => return run(args).await,
    }
    ExitCode::SUCCESS
}

async fn run(args: RunArgs) -> ExitCode {
    let config = match BusConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            println!("Error reading config file: ");
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let (mut engine, handles) = match Engine::from_config(&config) {
        Ok(result) => result,
        Err(e) => {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };

    for (name, handle) in &handles {
        let name = name.clone();
        let result = engine.on_value_decoded(*handle, move |reading| match reading {
            Reading::Value(value) => info!("{name}: {value}"),
            Reading::Unavailable => info!("{name}: unavailable"),
        });
        if let Err(e) = result {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    }

    for assignment in &args.set {
        let Some(handle) = handles.get(&assignment.name) else {
            println!("No endpoint named '{}' in config", assignment.name);
            return ExitCode::FAILURE;
        };
        if let Err(e) = engine.push_write_value(*handle, assignment.value) {
            println!("Cannot write '{}': {e}", assignment.name);
            return ExitCode::FAILURE;
        }
    }

    run_socketcan(engine, &args.socket, Duration::from_millis(args.tick_ms)).await
}

#[cfg(feature = "socketcan")]
async fn run_socketcan(mut engine: Engine, socket: &str, tick: Duration) -> ExitCode {
    let filters = SocketCanFilter::for_ids(&engine.filter_hint());
    let (mut tx, mut rx) = match open_socketcan(socket, Some(filters.as_slice())) {
        Ok(pair) => pair,
        Err(e) => {
            println!("Failed to open {socket}: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Polling {} endpoints on {socket} as {}",
        engine.endpoints().count(),
        engine.sender()
    );
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };
    let result = elster_cli::runner::run(&mut engine, &mut tx, &mut rx, tick, shutdown).await;
    println!("{:#?}", engine.stats());
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Giving up after repeated receive errors: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "socketcan"))]
async fn run_socketcan(_engine: Engine, _socket: &str, _tick: Duration) -> ExitCode {
    println!("Running requires the socketcan feature");
    ExitCode::FAILURE
}
