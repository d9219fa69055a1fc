/// Persister behaviour switches
///
/// Defaults reproduce the conservative behaviour: the version column is always
/// re-read from storage after a versioned write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersisterConfig {
    /// Use the version reported by the write itself and skip the re-read
    pub reuse_returned_version: bool,

    /// Fail when the version re-read finds no row
    pub require_version_row: bool,

    /// Include the resolved payload in the dispatch debug event
    pub log_payloads: bool,
}

impl PersisterConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            reuse_returned_version: false,
            require_version_row: true,
            log_payloads: false,
        }
    }

    /// Trust a version column carried by the write result
    pub fn reuse_returned_version(mut self, enabled: bool) -> Self {
        self.reuse_returned_version = enabled;
        self
    }

    /// Set whether a missing row on version re-read is an error
    pub fn require_version_row(mut self, required: bool) -> Self {
        self.require_version_row = required;
        self
    }

    /// Set payload logging
    pub fn log_payloads(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self::new()
    }
}
