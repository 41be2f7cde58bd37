//! Playback control engine for `playd`.
//!
//! - [`controller`]: command mailbox + transport state machine
//! - [`worker`]: the playback loop thread that owns the live [`session`]
//! - [`decode`]: codec registry and the decoder backends
//! - [`device`]: output sink interface and the CPAL implementation
//! - [`notifier`]: status delivery decoupled from the playback loop

pub mod command;
pub mod config;
pub mod controller;
pub mod decode;
pub mod device;
pub mod mailbox;
pub mod notifier;
pub mod queue;
pub mod session;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
