//! Client side of the chunked upload protocol.
//!
//! [`UploadCoordinator`] hashes a file, asks the server which chunks it
//! already holds, uploads the rest concurrently with retries, then requests
//! the merge. The server is reached through the [`ChunkServer`] trait;
//! [`HttpChunkServer`] is the HTTP implementation.

mod coordinator;
mod error;
mod http;
mod progress;
mod retry;
mod server;
mod types;

pub use coordinator::UploadCoordinator;
pub use error::UploadError;
pub use http::HttpChunkServer;
pub use progress::SpeedCalculator;
pub use retry::RetryPolicy;
pub use server::{ChunkServer, ServerFuture};
pub use types::{DeleteOutcome, UploadConfig, UploadEvent, UploadOutcome};

pub use chunkload_hasher::DEFAULT_CHUNK_SIZE;

/// Default number of chunk uploads in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;
