//! Configuration for braid
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a braid instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Location of the braid file used by `Braid::open`.
    /// Ignored when a medium is handed in directly.
    pub path: PathBuf,

    /// Create the file when it does not exist yet
    pub create_if_missing: bool,

    /// fsync the medium after the final flush on close
    pub sync_on_close: bool,

    // -------------------------------------------------------------------------
    // I/O Pipeline Configuration
    // -------------------------------------------------------------------------
    /// Name given to the dedicated I/O worker thread
    pub worker_thread_name: String,

    // -------------------------------------------------------------------------
    // Allocation Configuration
    // -------------------------------------------------------------------------
    /// Policy used to pick a disused knot for reuse
    pub allocation_policy: AllocationPolicy,
}

/// Free-knot selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// First disused knot within the 5:3 size window (format-compatible default)
    #[default]
    RatioFit,

    /// Smallest disused knot that holds the request, without over-allocating
    BestFit,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data.braid"),
            create_if_missing: true,
            sync_on_close: true,
            worker_thread_name: "braid-io".to_string(),
            allocation_policy: AllocationPolicy::RatioFit,
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
    /// Set the braid file location
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Create the braid file if it is missing
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// fsync the medium when the braid closes
    pub fn sync_on_close(mut self, sync: bool) -> Self {
        self.config.sync_on_close = sync;
        self
    }

    /// Set the I/O worker thread name
    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_thread_name = name.into();
        self
    }

    /// Set the free-knot selection policy
    pub fn allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.config.allocation_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
