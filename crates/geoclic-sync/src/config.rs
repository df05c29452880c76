//! Engine tunables.

use geoclic_core::RingClosure;

/// Maximum records returned by one delta download.
pub const DEFAULT_DOWNLOAD_LIMIT: usize = 1000;
/// Maximum items accepted per category in one sync request.
pub const DEFAULT_MAX_BATCH: usize = 5000;
/// Maximum observations embedded in one offline package.
pub const DEFAULT_PACKAGE_POINT_LIMIT: usize = 5000;

/// Sync engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub download_limit: usize,
    pub max_batch: usize,
    pub package_point_limit: usize,
    /// Whether unclosed polygon rings are closed or rejected.
    pub ring_closure: RingClosure,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_limit: DEFAULT_DOWNLOAD_LIMIT,
            max_batch: DEFAULT_MAX_BATCH,
            package_point_limit: DEFAULT_PACKAGE_POINT_LIMIT,
            ring_closure: RingClosure::Auto,
        }
    }
}
