//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// embedstore - text embedding store with similarity search
#[derive(Parser, Debug)]
#[command(name = "embedstore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Snapshot file (overrides EMBEDSTORE_SNAPSHOT)
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides EMBEDSTORE_BIND)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Embed every line of a text file into the store
    Load {
        /// Newline-separated sentences
        file: PathBuf,

        /// Delete the existing snapshot before loading
        #[arg(long)]
        fresh: bool,
    },

    /// Print the stored texts most similar to TEXT
    Search {
        text: String,

        /// Number of results (overrides EMBEDSTORE_TOP_K)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}
