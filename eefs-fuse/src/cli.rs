use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    /// EEPROM image file
    #[arg(long, short)]
    pub image: PathBuf,

    /// Block size in bytes, link byte included
    #[arg(long, short, default_value_t = 128)]
    pub block_size: usize,

    /// Medium size in KiB
    #[arg(long, short, default_value_t = 32)]
    pub medium: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a blank filesystem, erasing the image
    Format,
    /// Check and repair the filesystem
    Check,
    /// List existing files
    Ls,
    /// Store a host file
    Put {
        id: usize,
        file: PathBuf,
        /// Store bytes as-is instead of run-length encoded
        #[arg(long)]
        raw: bool,
    },
    /// Extract a file to the host
    Get {
        id: usize,
        file: PathBuf,
        /// Extract stored bytes without decoding
        #[arg(long)]
        raw: bool,
    },
    /// Remove a file
    Rm { id: usize },
    /// Exchange two files
    Swap { a: usize, b: usize },
    /// Copy a file over another through the scratch file
    Copy { dst: usize, src: usize },
}
