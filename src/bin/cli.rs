//! StrataDB CLI
//!
//! Command-line interface for inspecting and editing a StrataDB map file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stratadb::{MapConfig, Result, StrataError, StrataMap};

/// StrataDB CLI
#[derive(Parser, Debug)]
#[command(name = "strata-cli")]
#[command(version)]
#[command(about = "CLI for StrataDB single-file storage")]
struct Args {
    /// Path to the database file
    #[arg(short, long, default_value = "data.strata")]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a fresh database file (truncates an existing one)
    Init {
        /// Store literal string keys instead of key hashes
        #[arg(long)]
        literal_keys: bool,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print the number of live entries
    Len,
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Init { literal_keys } => {
            let config = MapConfig {
                hashed_keys: !literal_keys,
                ..Default::default()
            };
            let map: StrataMap<String> = StrataMap::create(&args.file, config)?;
            println!("created {}", map.path().display());
        }
        Commands::Get { key } => {
            let mut map: StrataMap<String> = StrataMap::open(&args.file)?;
            println!("{}", map.get(&key)?);
        }
        Commands::Set { key, value } => {
            let mut map: StrataMap<String> = StrataMap::open(&args.file)?;
            map.set(&key, &value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            let mut map: StrataMap<String> = StrataMap::open(&args.file)?;
            map.remove(&key)?;
            println!("OK");
        }
        Commands::Len => {
            let mut map: StrataMap<String> = StrataMap::open(&args.file)?;
            println!("{}", map.len()?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(StrataError::KeyNotFound) => {
            eprintln!("key not found");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
