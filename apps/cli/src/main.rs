//! chunkload command-line client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chunkload_client::{
    DeleteOutcome, HttpChunkServer, RetryPolicy, UploadConfig, UploadCoordinator, UploadEvent,
    UploadOutcome,
};
use chunkload_hasher::HashWorker;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Resumable chunked uploads.
#[derive(Parser, Debug)]
#[command(name = "chunkload")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "CHUNKLOAD_SERVER", default_value = "http://127.0.0.1:3000", global = true)]
    server: String,

    /// Chunk size in bytes
    #[arg(long, default_value_t = chunkload_client::DEFAULT_CHUNK_SIZE, global = true)]
    chunk_size: u64,

    /// Concurrent chunk uploads
    #[arg(long, default_value_t = chunkload_client::DEFAULT_CONCURRENCY, global = true)]
    concurrency: usize,

    /// Attempts per request, including the first
    #[arg(long, default_value_t = 3, global = true)]
    retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the content hash of a file
    Hash {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Upload a file, resuming if the server holds some chunks
    Upload {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete a previously uploaded file from the server
    Delete {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

impl Cli {
    fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
            retry: RetryPolicy {
                max_attempts: self.retries,
                ..RetryPolicy::default()
            },
        }
    }

    fn coordinator(&self) -> Result<UploadCoordinator> {
        let server = HttpChunkServer::new(&self.server, Duration::from_secs(self.timeout_secs))?;
        Ok(UploadCoordinator::new(Arc::new(server), self.upload_config()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Hash { file } => hash(file, cli.chunk_size).await,
        Commands::Upload { file } => upload(&cli, file).await,
        Commands::Delete { file } => delete(&cli, file).await,
    }
}

async fn hash(file: &Path, chunk_size: u64) -> Result<()> {
    let digest = HashWorker::spawn(file, chunk_size)?
        .finish(|percentage| tracing::debug!(percentage, "hashing"))
        .await?;
    println!(
        "{}  {} ({} bytes, {} chunks)",
        digest.file_hash,
        file.display(),
        digest.file_size,
        digest.chunks.len()
    );
    Ok(())
}

async fn upload(cli: &Cli, file: &Path) -> Result<()> {
    let mut coordinator = cli.coordinator()?;
    let mut events = coordinator
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = describe(&event) {
                eprintln!("{line}");
            }
        }
    });

    let cancel = coordinator.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = coordinator.upload(file).await;
    ctrl_c.abort();
    drop(coordinator);
    let _ = printer.await;

    match result? {
        UploadOutcome::Uploaded {
            file_hash,
            chunks_sent,
        } => println!("uploaded {} as {file_hash} ({chunks_sent} chunks sent)", file.display()),
        UploadOutcome::AlreadyUploaded { file_hash } => {
            println!("{} already on server as {file_hash}", file.display())
        }
    }
    Ok(())
}

async fn delete(cli: &Cli, file: &Path) -> Result<()> {
    let coordinator = cli.coordinator()?;
    match coordinator.delete(file).await? {
        DeleteOutcome::Deleted => println!("deleted {}", file.display()),
        DeleteOutcome::NotFound => println!("{} is not on the server", file.display()),
    }
    Ok(())
}

/// Human-readable progress line, or `None` for events not worth printing.
fn describe(event: &UploadEvent) -> Option<String> {
    let line = match event {
        UploadEvent::Hashed { file_hash, chunks } => format!("hashed: {file_hash} ({chunks} chunks)"),
        UploadEvent::Resuming { staged, remaining } => {
            format!("resuming: {staged} chunks on server, {remaining} to send")
        }
        UploadEvent::ChunkUploaded {
            uploaded,
            total,
            bytes_per_second,
            ..
        } => format!(
            "chunk {uploaded}/{total} ({:.1} KiB/s)",
            bytes_per_second / 1024.0
        ),
        UploadEvent::Retrying {
            index,
            attempt,
            error,
        } => match index {
            Some(index) => format!("retrying chunk {index} (attempt {attempt}): {error}"),
            None => format!("retrying request (attempt {attempt}): {error}"),
        },
        UploadEvent::Merging { .. } => "merging".to_string(),
        UploadEvent::Hashing { .. }
        | UploadEvent::AlreadyUploaded { .. }
        | UploadEvent::Completed { .. }
        | UploadEvent::Failed { .. } => return None,
    };
    Some(line)
}
