//! `tabflow` command-line front end and control daemon.

pub mod cli;
pub mod commands;
pub mod daemon;
pub mod logging;
pub mod output;
