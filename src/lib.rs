//! tidewatch - game log event watcher
//!
//! This library exposes the marker parser, entry resolution, the
//! scheduling engine and the daemon plumbing used by the `tidewatch`
//! binary.

pub mod action;
pub mod cli;
pub mod constants;
pub mod daemon;
pub mod marker;
pub mod models;
pub mod monitor;
pub mod output;
pub mod scan;
pub mod state;
