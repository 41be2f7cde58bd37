use std::path::PathBuf;

use clap::{Parser, Subcommand};
use playd_engine::command::Command as EngineCommand;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "playd", version = VERSION, about = "Remote-controlled audio playback daemon")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the daemon
    Serve(ServeArgs),

    /// Send one command to a running daemon and print the status replies
    Send(SendArgs),

    /// List output devices and exit
    Devices,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Listen address (default 127.0.0.1:10000)
    #[arg(long)]
    pub bind: Option<String>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// TOML config file; command-line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Decoded chunk length in milliseconds
    #[arg(long)]
    pub chunk_millis: Option<u32>,

    /// Pieces each chunk is written in (command latency is one piece)
    #[arg(long)]
    pub sub_chunks: Option<u32>,

    /// Fast-forward/rewind distance in chunks
    #[arg(long)]
    pub seek_chunks: Option<u32>,

    /// Output queue length in milliseconds
    #[arg(long)]
    pub sink_buffer_millis: Option<u32>,

    /// Largest accepted packet payload in bytes
    #[arg(long)]
    pub max_payload: Option<u32>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SendArgs {
    /// Daemon address
    #[arg(long, default_value = playd_proto::DEFAULT_BIND)]
    pub addr: String,

    /// How long to stay connected printing status replies, in milliseconds. The daemon stops
    /// playback once its client disconnects.
    #[arg(long, default_value_t = 1500)]
    pub wait_ms: u64,

    /// Stay connected until playback ends (stopped, error, or daemon quit) instead of `--wait-ms`
    #[arg(long)]
    pub follow: bool,

    #[command(subcommand)]
    pub action: SendAction,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SendAction {
    /// Play a file (relative paths are resolved against the current directory)
    Play { path: PathBuf },
    /// Toggle pause
    Pause,
    Stop,
    /// Shut the daemon down
    Quit,
    /// Fast-forward
    #[command(alias = "ff")]
    FastForward,
    /// Rewind
    #[command(alias = "rew")]
    Rewind,
}

impl SendAction {
    /// The wire command, with `play` paths made absolute for the daemon's benefit.
    pub fn to_command(&self) -> EngineCommand {
        match self {
            SendAction::Play { path } => {
                let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
                EngineCommand::Play(path)
            }
            SendAction::Pause => EngineCommand::Pause,
            SendAction::Stop => EngineCommand::Stop,
            SendAction::Quit => EngineCommand::Quit,
            SendAction::FastForward => EngineCommand::FastForward,
            SendAction::Rewind => EngineCommand::Rewind,
        }
    }
}
