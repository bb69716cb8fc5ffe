//! # Transport & gunzip collaborators
//!
//! Fetching shard bytes and decompressing them are collaborator interfaces the core consumes
//! but doesn't implement itself, so callers can plug in HTTP, a local directory, or anything
//! else. Each is an async trait with its own error enum.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("shard not found at {url}")]
    NotFound { url: String },
    #[error("transport failure fetching {url}: {message}")]
    Other { url: String, message: String },
}

#[derive(Debug, Error, Clone)]
pub enum GunzipError {
    #[error("gunzip unavailable")]
    Unavailable,
    #[error("failed to decompress gzip stream: {0}")]
    Failed(String),
}

/// Fetches the raw bytes of a shard file over whatever medium the caller provides (HTTP,
/// filesystem, etc). The core never constructs a transport itself.
#[async_trait]
pub trait ShardTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] if no shard exists at `url`, or
    /// [`TransportError::Other`] for any other transport-level failure.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Decompresses a gzip byte stream. The core detects the `0x1F 0x8B` prefix itself and only
/// calls this collaborator when it's present.
pub trait Gunzip: Send + Sync {
    /// # Errors
    ///
    /// Returns [`GunzipError`] if `bytes` isn't a valid gzip stream.
    fn gunzip(&self, bytes: &[u8]) -> Result<Vec<u8>, GunzipError>;
}

/// The default [`Gunzip`] implementation, backed by `flate2`, so the crate is usable
/// end-to-end without the caller having to wire up their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Flate2Gunzip;

impl Gunzip for Flate2Gunzip {
    fn gunzip(&self, bytes: &[u8]) -> Result<Vec<u8>, GunzipError> {
        use std::io::Read;

        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| GunzipError::Failed(e.to_string()))?;
        Ok(out)
    }
}
