use clap::Parser;
use elster_common::{address::resolve, frame::Dump};

#[cfg(feature = "socketcan")]
use elster_common::traits::AsyncCanReceiver;
#[cfg(feature = "socketcan")]
use elster_util::open_socketcan;

#[derive(Parser)]
struct Args {
    /// The CAN socket to monitor (e.g. 'can0' or 'vcan0')
    socket: String,
    /// Print why frames could not be interpreted, and error frames seen on the bus
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    #[cfg(not(feature = "socketcan"))]
    {
        panic!("This program is only supported with socketcan")
    }

    #[cfg(feature = "socketcan")]
    {
        let args = Args::parse();
        let (_tx, mut rx) = match open_socketcan(&args.socket, None) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Failed to open {}: {e}", args.socket);
                std::process::exit(1);
            }
        };

        let time = || chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false);
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    println!("{}: {}", time(), Dump(&msg));
                    if args.verbose {
                        if let Err(reason) = resolve(&msg) {
                            println!("Unrecognized reason: {reason}");
                        }
                    }
                }
                Err(e) if rx.is_bus_event(&e) => {
                    if args.verbose {
                        println!("{}: {e}", time());
                    }
                }
                Err(e) => {
                    eprintln!("Receive from {} failed: {e}", args.socket);
                    std::process::exit(1);
                }
            }
        }
    }
}
