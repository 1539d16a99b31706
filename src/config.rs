//! Configuration for seglog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a seglog instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK
    ///     ├── {base_offset}.store
    ///     └── {base_offset}.index
    pub data_dir: PathBuf,

    /// Segment sizing and the offset of the very first record
    pub segment: SegmentConfig,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Tuning for live-tailing consume streams
    pub stream: StreamConfig,
}

/// Segment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Store size (bytes) at which the active segment is rotated
    pub max_store_bytes: u64,

    /// Index size (bytes) at which the active segment is rotated.
    /// Also the preallocated size of each index file.
    pub max_index_bytes: u64,

    /// Base offset of the first segment of a fresh log
    pub initial_offset: u64,
}

/// Consume-stream polling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// First wait after an offset turned out to be unavailable (milliseconds)
    pub poll_interval_ms: u64,

    /// Upper bound for the doubling backoff (milliseconds)
    pub max_backoff_ms: u64,
}

/// Fallback used when a segment limit is left at zero
pub const DEFAULT_SEGMENT_BYTES: u64 = 1024;

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_SEGMENT_BYTES,
            max_index_bytes: DEFAULT_SEGMENT_BYTES,
            initial_offset: 0,
        }
    }
}

impl SegmentConfig {
    /// Replace zero limits with the defaults
    pub fn normalized(mut self) -> Self {
        if self.max_store_bytes == 0 {
            self.max_store_bytes = DEFAULT_SEGMENT_BYTES;
        }
        if self.max_index_bytes == 0 {
            self.max_index_bytes = DEFAULT_SEGMENT_BYTES;
        }
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./seglog_data"),
            segment: SegmentConfig::default(),
            listen_addr: "127.0.0.1:8400".to_string(),
            max_connections: 1024,
            stream: StreamConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all segment files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the store size that triggers rotation (in bytes)
    pub fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.config.segment.max_store_bytes = bytes;
        self
    }

    /// Set the index size that triggers rotation (in bytes)
    pub fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.config.segment.max_index_bytes = bytes;
        self
    }

    /// Set the offset assigned to the first record of a fresh log
    pub fn initial_offset(mut self, offset: u64) -> Self {
        self.config.segment.initial_offset = offset;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the first consume-stream retry delay (in milliseconds)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.stream.poll_interval_ms = ms;
        self
    }

    /// Set the maximum consume-stream retry delay (in milliseconds)
    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.stream.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
