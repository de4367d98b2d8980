//! Command implementations for the hearsay CLI.
//!
//! Each subcommand module follows the same shape: a clap `Args` struct,
//! a resolved `Config` built via `TryFrom<Args>`, and an
//! `execute(Config)` entry point.

pub mod bench;
pub mod cli;
pub mod manifest;
pub mod normalize;
pub mod score;
