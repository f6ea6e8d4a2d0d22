/**
 * Configuration constants for the fetch layer and the browse owners
 */
use std::time::Duration;

/// Seconds a single catalog request may take before it fails as a transport error
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Hard cap on pages a single list accumulates before it stops paging
pub const DEFAULT_MAX_PAGES: u32 = 500;

/// Sections shown on the discover screen
pub const DISCOVER_SECTION_COUNT: usize = 6;

/// TMDB genre ids used by the discover screen
pub const HORROR_GENRE_ID: u32 = 27;
pub const ANIMATION_GENRE_ID: u32 = 16;

/// Default log filter for the demo binary
pub const DEFAULT_LOG_FILTER: &str = "catalog_fetch=info";

/// Tunables shared by the browse owners
#[derive(Debug, Clone)]
pub struct BrowseConfig {
    /// Lists never page past this, even when the server reports more pages
    pub max_pages: u32,
    /// Upper bound on one catalog request
    pub request_timeout: Duration,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl BrowseConfig {
    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: u32) -> Self {
        // zero would make every list permanently exhausted
        self.max_pages = if max_pages == 0 { 1 } else { max_pages };
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_REQUEST_TIMEOUT_SECS > 0, "DEFAULT_REQUEST_TIMEOUT_SECS must be greater than 0");
    assert!(DEFAULT_MAX_PAGES > 0, "DEFAULT_MAX_PAGES must be greater than 0");
    assert!(DISCOVER_SECTION_COUNT > 0, "DISCOVER_SECTION_COUNT must be greater than 0");
};
