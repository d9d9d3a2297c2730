//! Configuration constants and runtime configuration for the storage core.

/// Size of a page in bytes (16 KiB), fixed for the entire core.
///
/// Matches InnoDB's default `innodb_page_size`. No other page size is
/// supported; `Config::validate` rejects any other value rather than
/// silently assuming it.
pub const PAGE_SIZE: usize = 16384;

/// Number of pages in one extent (1 MiB at 16 KiB pages).
pub const PAGES_PER_EXTENT: u32 = 64;

/// Maximum number of pages with a 32-bit `PageId`.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical tablespace size in bytes.
pub const MAX_SPACE_SIZE_BYTES: u64 = MAX_PAGES * PAGE_SIZE as u64;

/// Default interval between background buffer-pool flush sweeps.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// Default lock-wait timeout before a waiter is aborted (spec §5).
pub const DEFAULT_LOCK_WAIT_TIMEOUT_MS: u64 = 50_000;

/// Default bound on how many dirty frames one flush sweep writes back.
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 32;

/// Runtime configuration for a storage core instance.
///
/// Constructed with explicit field values by the caller (no builder macro,
/// no config-file parsing) — the core receives a data directory, a
/// buffer-pool byte budget, a page size, and a flush interval per spec §6's
/// "Environment" contract, and nothing else.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory under which `<name>.ibd` tablespace files live.
    pub data_dir: std::path::PathBuf,
    /// Total bytes the buffer pool may hold (frame count = this / `PAGE_SIZE`).
    pub buffer_pool_bytes: usize,
    /// Page size in bytes. Must equal `PAGE_SIZE`; validated in `Config::validate`.
    pub page_size: usize,
    /// Interval between background flush sweeps, in milliseconds.
    pub flush_interval_ms: u64,
    /// How long a lock waiter blocks before being aborted, in milliseconds.
    pub lock_wait_timeout_ms: u64,
}

impl Config {
    /// Build a config with the documented defaults, rooted at `data_dir`.
    pub fn new<P: Into<std::path::PathBuf>>(data_dir: P, buffer_pool_bytes: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            buffer_pool_bytes,
            page_size: PAGE_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            lock_wait_timeout_ms: DEFAULT_LOCK_WAIT_TIMEOUT_MS,
        }
    }

    /// Number of buffer-pool frames implied by `buffer_pool_bytes`.
    pub fn pool_size(&self) -> usize {
        (self.buffer_pool_bytes / PAGE_SIZE).max(1)
    }

    /// Validate the config, rejecting any page size other than 16 KiB.
    pub fn validate(&self) -> crate::common::Result<()> {
        if self.page_size != PAGE_SIZE {
            return Err(crate::common::Error::InvalidConfig(format!(
                "page_size must be {PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.buffer_pool_bytes < PAGE_SIZE {
            return Err(crate::common::Error::InvalidConfig(
                "buffer_pool_bytes must hold at least one page".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 16384);
    }

    #[test]
    fn test_pool_size_rounds_down() {
        let cfg = Config::new("/tmp/db", PAGE_SIZE * 10 + 100);
        assert_eq!(cfg.pool_size(), 10);
    }

    #[test]
    fn test_validate_rejects_wrong_page_size() {
        let mut cfg = Config::new("/tmp/db", PAGE_SIZE * 4);
        cfg.page_size = 4096;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let cfg = Config::new("/tmp/db", PAGE_SIZE * 4);
        assert!(cfg.validate().is_ok());
    }
}
