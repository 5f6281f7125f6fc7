//! Recovery configuration.

/// Configuration for log writing and recovery.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync log writes as they happen (safer but slower).
    pub sync_on_write: bool,

    /// Maximum accepted size of a single event payload.
    ///
    /// A record claiming a larger payload stops the scan with a fatal
    /// size-exceeded status instead of attempting the allocation.
    pub max_event_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            max_event_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the log directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync log writes as they happen.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the maximum accepted event payload size.
    #[must_use]
    pub const fn max_event_size(mut self, size: u64) -> Self {
        self.max_event_size = size;
        self
    }
}
