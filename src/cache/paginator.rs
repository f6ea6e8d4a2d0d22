/// Cursor state for one paginated list.
///
/// `has_more_pages` is derived, never stored, so it always equals
/// `current_page < total_pages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub current_page: u32,
    pub total_pages: u32,
    pub is_fetching_next_page: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
            is_fetching_next_page: false,
        }
    }
}

impl PaginationState {
    #[must_use]
    pub const fn has_more_pages(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// Idle/Fetching state machine guarding next-page fetches.
#[derive(Debug, Clone, Default)]
pub struct Paginator {
    state: PaginationState,
}

impl Paginator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a paginator at an arbitrary position, clamped to the valid range
    #[must_use]
    pub fn at(current_page: u32, total_pages: u32) -> Self {
        Self {
            state: PaginationState {
                current_page: current_page.max(1),
                total_pages: total_pages.max(1),
                is_fetching_next_page: false,
            },
        }
    }

    #[must_use]
    pub const fn state(&self) -> PaginationState {
        self.state
    }

    #[must_use]
    pub const fn has_more_pages(&self) -> bool {
        self.state.has_more_pages()
    }

    #[must_use]
    pub const fn is_fetching(&self) -> bool {
        self.state.is_fetching_next_page
    }

    /// The page a successful `start_fetching_next_page` is about to load
    #[must_use]
    pub const fn next_page(&self) -> u32 {
        self.state.current_page.saturating_add(1)
    }

    /// Check-and-set in one step: Idle -> Fetching if there is a next page.
    /// Returns `false` and leaves every field untouched otherwise.
    pub const fn start_fetching_next_page(&mut self) -> bool {
        if self.state.has_more_pages() && !self.state.is_fetching_next_page {
            self.state.is_fetching_next_page = true;
            true
        } else {
            false
        }
    }

    /// Fetching -> Idle, recording where the server says we are
    pub fn finish_fetching(&mut self, page: u32, total_pages: u32) {
        self.state = PaginationState {
            current_page: page.max(1),
            total_pages: total_pages.max(1),
            is_fetching_next_page: false,
        };
    }

    /// Fetching -> Idle without advancing, so the same page can be retried
    pub const fn abort_fetching(&mut self) {
        self.state.is_fetching_next_page = false;
    }

    pub fn reset(&mut self) {
        self.state = PaginationState::default();
    }
}
