//! `playd`: a playback daemon controlled over a local TCP socket, plus a small client.

pub mod cli;
pub mod client;
pub mod config;
pub mod runtime;
pub mod server;
