use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod app;
mod host;

pub use app::App;

/// N-back task engine on a host terminal. Commands go in on stdin, protocol
/// lines come out on stdout, logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "nback-device", version, about)]
pub struct Args {
    /// JSON file overriding device settings
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Seed for reproducible sequences
    #[arg(long)]
    seed: Option<u64>,

    /// Pause between loop iterations, in microseconds
    #[arg(long, default_value_t = 1000)]
    tick_us: u32,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let app = App::new(&args)?;
    app.run()?;

    Ok(())
}
