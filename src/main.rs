// src/main.rs - CLI entry point for the copy-verification matrix

//! Copymatrix entry point.
//!
//! Parses problem size and launch geometry, runs the smoke test, then the
//! full scenario matrix. Exit code 0 means every scenario passed; any
//! failure prints a diagnostic naming the failing operation and scenario
//! parameters and exits nonzero.

use clap::Parser;
use copymatrix::{init, run_matrix, run_smoke, Result, Settings};

#[derive(Parser)]
#[command(name = "copymatrix")]
#[command(about = "Verifies memory copies across host, pinned, and device memory")]
#[command(version)]
struct Cli {
    /// Element count per buffer
    #[arg(short = 'N', long, default_value_t = Settings::default().count)]
    count: usize,

    /// Threads per block for the oracle kernel
    #[arg(long, default_value_t = Settings::default().threads_per_block)]
    threads_per_block: u32,

    /// Block budget per compute unit
    #[arg(long, default_value_t = Settings::default().blocks_per_cu)]
    blocks_per_cu: u32,

    /// Device ordinal to run against
    #[arg(long, default_value = "0")]
    device: usize,

    /// Run only the smoke test, skipping the matrix
    #[arg(long)]
    smoke_only: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            count: self.count,
            threads_per_block: self.threads_per_block,
            blocks_per_cu: self.blocks_per_cu,
            ..Settings::default()
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings();
    tracing::info!(
        "device {} | N={} threadsPerBlock={} blocksPerCU={}",
        cli.device,
        settings.count,
        settings.threads_per_block,
        settings.blocks_per_cu
    );

    run_smoke(&settings)?;
    if !cli.smoke_only {
        run_matrix(&settings)?;
    }
    Ok(())
}

fn main() {
    init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => {
            tracing::info!("PASSED");
        }
        Err(err) => {
            tracing::error!("FAILED: {err}");
            eprintln!("copymatrix: {err}");
            std::process::exit(1);
        }
    }
}
