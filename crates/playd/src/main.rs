//! playd: a remote-controlled audio playback daemon.
//!
//! `playd serve` listens for one control client at a time, decodes the requested file with
//! Symphonia, and plays it through CPAL. Commands (play, pause, stop, fast-forward, rewind,
//! quit) arrive as small length-prefixed packets; status changes are pushed back on the same
//! connection. `playd send` is a minimal client for scripting and testing.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use playd::cli::{self, Command};
use playd::config::DaemonConfig;
use playd::{client, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,playd=info,playd_engine=info")),
        )
        .init();

    match &args.cmd {
        Command::Serve(serve) => {
            let config = DaemonConfig::from_args(serve)?;
            runtime::run_serve(&config)
        }
        Command::Send(send) => client::run_send(send),
        Command::Devices => runtime::list_devices(),
    }
}
