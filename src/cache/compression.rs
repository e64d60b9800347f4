//! Payload Compression
//!
//! Pluggable codec invoked for payloads above the policy's compression
//! threshold. LZ4 is the default; any [`Compressor`] can be injected.
//!
//! # Example
//!
//! ```
//! use mediacache::cache::compression::CompressionManager;
//!
//! let manager = CompressionManager::new();
//!
//! let data = b"Hello, this is test data that should compress well! \
//!     Hello, this is test data that should compress well!";
//! let compressed = manager.compress(data).unwrap().expect("repetitive data shrinks");
//!
//! let decompressed = manager.decompress(&compressed.data, &compressed.codec).unwrap();
//! assert_eq!(decompressed.as_ref(), data);
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for the default codec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compression level (algorithm-specific)
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { level: 4 }
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Codec name recorded on compressed entries
    fn name(&self) -> &'static str;

    /// Level recorded on compressed entries
    fn level(&self) -> i32;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// =============================================================================
// No-Op Compressor
// =============================================================================

/// Pass-through compressor (never shrinks, so entries stay uncompressed)
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn level(&self) -> i32 {
        0
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

/// LZ4 compressor (fast compression)
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create new LZ4 compressor with default settings
    pub fn new() -> Self {
        Self { level: 4 }
    }

    /// Create with custom compression level
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn level(&self) -> i32 {
        self.level
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// A payload the codec managed to shrink
#[derive(Debug, Clone)]
pub struct Compressed {
    pub data: Bytes,
    pub codec: String,
    pub level: i32,
    pub original_size: u64,
}

impl Compressed {
    /// `original_size / compressed_size`
    pub fn ratio(&self) -> f64 {
        self.original_size as f64 / self.data.len().max(1) as f64
    }
}

/// Wraps the active codec
pub struct CompressionManager {
    compressor: Arc<dyn Compressor>,
}

impl CompressionManager {
    /// Create a manager using LZ4 with default settings
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create a manager using LZ4 at the configured level
    pub fn with_config(config: CompressionConfig) -> Self {
        Self::with_compressor(Arc::new(Lz4Compressor::with_level(config.level)))
    }

    /// Create a manager around any codec
    pub fn with_compressor(compressor: Arc<dyn Compressor>) -> Self {
        Self { compressor }
    }

    /// Name of the active codec
    pub fn codec(&self) -> &'static str {
        self.compressor.name()
    }

    /// Compress a payload
    ///
    /// Returns `Ok(None)` when the codec did not make the payload smaller;
    /// codec failures are returned so the caller can log and store raw.
    pub fn compress(&self, data: &[u8]) -> Result<Option<Compressed>> {
        let compressed = self.compressor.compress(data)?;

        // Only use compressed if it's actually smaller
        if compressed.len() >= data.len() {
            return Ok(None);
        }

        Ok(Some(Compressed {
            data: Bytes::from(compressed),
            codec: self.compressor.name().to_string(),
            level: self.compressor.level(),
            original_size: data.len() as u64,
        }))
    }

    /// Decompress a payload produced by `codec`
    ///
    /// Payloads written by a built-in codec stay readable after the active
    /// codec has been replaced.
    pub fn decompress(&self, data: &[u8], codec: &str) -> Result<Bytes> {
        let decompressed = if codec == self.compressor.name() {
            self.compressor.decompress(data)?
        } else {
            match builtin(codec) {
                Some(compressor) => compressor.decompress(data)?,
                None => {
                    return Err(Error::DecompressionFailed {
                        algorithm: codec.to_string(),
                        reason: format!("unknown codec, active codec is {}", self.compressor.name()),
                    })
                }
            }
        };
        Ok(Bytes::from(decompressed))
    }
}

/// Built-in codec recorded under `name`
fn builtin(name: &str) -> Option<Box<dyn Compressor>> {
    match name {
        "lz4" => Some(Box::new(Lz4Compressor::new())),
        "none" => Some(Box::new(NoopCompressor)),
        _ => None,
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Codec whose every call fails
#[cfg(test)]
pub(crate) struct FailingCompressor;

#[cfg(test)]
impl Compressor for FailingCompressor {
    fn name(&self) -> &'static str {
        "failing"
    }
    fn level(&self) -> i32 {
        1
    }
    fn compress(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Error::CompressionFailed {
            algorithm: "failing".into(),
            reason: "always fails".into(),
        })
    }
    fn decompress(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Error::DecompressionFailed {
            algorithm: "failing".into(),
            reason: "always fails".into(),
        })
    }
}
