//! Decrypt OpenPGP password files with a smart card from the terminal

use std::path::PathBuf;

use cardpass::Settings;
use clap::{Parser, Subcommand};
use tracing::debug;

mod commands;
mod display;
mod prompt;

use commands::{decrypt_command, readers_command, status_command};

#[derive(Parser)]
#[command(version, about = "Decrypt password files with the OpenPGP card holding their key")]
struct Cli {
    /// Only use this reader
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Debug level output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to ~/.cardpass/cardpass.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt files and write the plaintext to stdout
    Decrypt {
        /// Encrypted files, binary or armored
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only accept these recipient key ids or fingerprints
        #[arg(long = "key-id")]
        key_ids: Vec<String>,

        /// Never cache the PIN
        #[arg(long)]
        no_cache: bool,
    },

    /// List available readers
    Readers,

    /// Show the OpenPGP card in each reader
    Status,
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    debug!(?settings, "Loaded settings");

    match cli.command {
        Commands::Decrypt {
            files,
            key_ids,
            no_cache,
        } => decrypt_command(&settings, cli.reader, &files, &key_ids, no_cache),
        Commands::Readers => readers_command(&settings),
        Commands::Status => status_command(&settings, cli.reader.as_deref()),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .init();
}
