//! Command-line client for the CernVM WebAPI daemon.
//!
//! Every command prints one JSON result envelope (see [`output`]); logs and
//! prompts go to stderr.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod interaction;
pub mod logging;
pub mod output;
pub mod styles;
