#![feature(let_chains)]

pub(crate) mod args;
mod processes;
pub(crate) mod rescore;

pub use crate::processes::*;

use clap::{Parser, Subcommand};

/// diagrescore: rescores k-mer prefilter hits along a diagonal and emits
/// E-value/identity filtered alignment records.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Rescore(RescoreArgs),
}
