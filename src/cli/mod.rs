//! CLI definitions for pkgindex.

pub mod import;
pub mod verify;

use clap::{Parser, Subcommand};

/// Private package index
#[derive(Parser, Debug)]
#[command(name = "pkgindex")]
#[command(about = "Private package index with a distutils-compatible upload protocol")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Import local distribution archives into the index
    Import(import::ImportArgs),

    /// Verify that every recorded distribution exists and matches its digest
    Verify,
}
