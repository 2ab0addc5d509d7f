//! Everoute CLI library.
//!
//! Subcommand handlers, logging setup, terminal styling and output
//! formatting for the `everoute` binary.

pub mod commands;
pub mod logging;
pub mod output;
pub mod terminal;
