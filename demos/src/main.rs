//! Manual exercising harness for the scheduler, net transport, and chunk
//! engine. Not part of the core's public surface — a development aid only.

use clap::{Parser, Subcommand};
use tracing::info;

mod chunk_demo;
mod net_demo;
mod scheduler_demo;

#[derive(Parser)]
#[command(name = "demos", about = "Exercises the scheduler/net/chunk APIs by hand")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attaches a handful of QAO objects and steps the scheduler a few times.
    Scheduler {
        #[arg(long, default_value_t = 5)]
        steps: u32,
    },
    /// Spins up a local client/server pair over rigelnet and exchanges packets.
    Net {
        #[arg(long, default_value = "hunter2")]
        passphrase: String,
    },
    /// Creates a world, loads a handful of chunks through an active area, and prunes.
    Chunk {
        #[arg(long, default_value_t = 2)]
        max_nonessential: usize,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scheduler { steps } => scheduler_demo::run(steps),
        Command::Net { passphrase } => net_demo::run(&passphrase),
        Command::Chunk { max_nonessential } => chunk_demo::run(max_nonessential),
    }
    info!("done");
}
