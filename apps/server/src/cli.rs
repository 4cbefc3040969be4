use std::path::PathBuf;

use clap::Parser;

/// Command-line overrides. Anything unset falls back to the config file.
#[derive(Parser, Debug, Default)]
#[command(version, about = "Resumable chunked upload server", long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.config/chunkload/server.toml)
    #[arg(short, long, env = "CHUNKLOAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listening host
    #[arg(long, env = "CHUNKLOAD_HOST")]
    pub host: Option<String>,

    /// Listening port
    #[arg(short, long, env = "CHUNKLOAD_PORT")]
    pub port: Option<u16>,

    /// Directory holding staged chunks and merged files
    #[arg(long, env = "CHUNKLOAD_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,
}
