//! CLI subcommands.

pub mod access;
pub mod org;
