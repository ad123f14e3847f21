use super::error::{DbError, Result};

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool capacity (number of cached pages)
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Deployment-wide engine settings.
///
/// The page size is fixed for the lifetime of every heap file opened with it;
/// reopening a file with a different page size yields `CorruptPage` errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size of one page in bytes
    pub page_size: usize,
    /// Maximum number of pages the buffer pool caches at once
    pub buffer_pool_pages: usize,
    /// K value used by the buffer pool's LRU-K replacer
    pub lru_k: usize,
}

impl Config {
    /// Creates a config with the default settings.
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
            lru_k: DEFAULT_LRUK_K,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_lru_k(mut self, k: usize) -> Self {
        self.lru_k = k;
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(DbError::InvalidConfig("page_size must be non-zero".into()));
        }
        if self.buffer_pool_pages == 0 {
            return Err(DbError::InvalidConfig(
                "buffer_pool_pages must be non-zero".into(),
            ));
        }
        if self.lru_k == 0 {
            return Err(DbError::InvalidConfig("lru_k must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.buffer_pool_pages, DEFAULT_BUFFER_POOL_PAGES);
        assert_eq!(config.lru_k, DEFAULT_LRUK_K);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate_rejects_zero() {
        let config = Config::new().with_page_size(0);
        assert!(matches!(config.validate(), Err(DbError::InvalidConfig(_))));

        let config = Config::new().with_buffer_pool_pages(0);
        assert!(matches!(config.validate(), Err(DbError::InvalidConfig(_))));
    }
}
