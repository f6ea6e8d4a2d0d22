/**
Paginated movie list

Accumulates pages of one [`MovieQuery`] into a single de-duplicated list. Page fetches go
through the owner's [`FetchCoordinator`], so revisiting a query or page within the session
is served from cache, and the [`Paginator`] guarantees at most one next-page fetch at a
time.
*/
use crate::cache::errors::lock_poisoned_error;
use crate::cache::{
    append, BrowseConfig, CacheStats, FetchCoordinator, FetchError, PaginationState, Paginator,
    SeenIdSet,
};
use crate::catalog::{CatalogFetcher, CatalogRequest, Movie, MovieQuery, Page};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What an observer of the list sees
#[derive(Debug, Clone)]
pub struct ListState {
    pub query: MovieQuery,
    pub movies: Vec<Movie>,
    pub pagination: PaginationState,
    /// False once the last page or the page cap is reached
    pub has_more: bool,
    pub is_loading_first_page: bool,
    pub last_error: Option<FetchError>,
}

/// `epoch` changes whenever the accumulated list is replaced; a fetch that started under
/// an older epoch lands in the cache only.
struct Accumulator {
    query: MovieQuery,
    paginator: Paginator,
    seen: SeenIdSet,
    movies: Vec<Movie>,
    epoch: u64,
    loading_first_page: bool,
    last_error: Option<FetchError>,
}

pub struct MovieListModel {
    fetcher: Arc<dyn CatalogFetcher>,
    pages: FetchCoordinator<CatalogRequest, Page<Movie>>,
    inner: Mutex<Accumulator>,
    state: watch::Sender<ListState>,
    config: BrowseConfig,
    cancel: CancellationToken,
}

impl MovieListModel {
    #[must_use]
    pub fn new(fetcher: Arc<dyn CatalogFetcher>, query: MovieQuery, config: BrowseConfig) -> Self {
        Self::with_scope(fetcher, query, config, &CancellationToken::new())
    }

    #[must_use]
    pub fn with_scope(
        fetcher: Arc<dyn CatalogFetcher>,
        query: MovieQuery,
        config: BrowseConfig,
        scope: &CancellationToken,
    ) -> Self {
        let cancel = scope.child_token();
        let inner = Accumulator {
            query,
            paginator: Paginator::new(),
            seen: SeenIdSet::new(),
            movies: Vec::new(),
            epoch: 0,
            loading_first_page: false,
            last_error: None,
        };
        let (state, _) = watch::channel(Self::view(&inner, config.max_pages));
        Self {
            fetcher,
            pages: FetchCoordinator::with_cancellation(cancel.clone()),
            inner: Mutex::new(inner),
            state,
            config,
            cancel,
        }
    }

    /// Switch to another query. The accumulated list and the seen set start over; cached
    /// pages are kept for the rest of the session. Returns `false` if nothing changed.
    ///
    /// # Errors
    ///
    /// `Internal` if the list lock was poisoned.
    pub fn set_query(&self, query: MovieQuery) -> Result<bool, FetchError> {
        let mut inner = self.lock()?;
        if inner.query == query {
            return Ok(false);
        }
        info!("🔀 List query {} -> {}", inner.query, query);
        inner.query = query;
        inner.paginator.reset();
        inner.seen.clear();
        inner.movies.clear();
        inner.epoch += 1;
        inner.loading_first_page = false;
        inner.last_error = None;
        self.publish(&inner);
        Ok(true)
    }

    /// Load page one of the current query and make it the whole list.
    ///
    /// Next-page loads are refused until page one has landed or failed.
    ///
    /// # Errors
    ///
    /// The page fetch error; the list keeps what it showed before.
    pub async fn load_first_page(&self) -> Result<(), FetchError> {
        let (query, epoch, previous) = {
            let mut inner = self.lock()?;
            inner.epoch += 1;
            // the old cursor belongs to the list being replaced
            let previous = inner.paginator.state();
            inner.paginator.reset();
            inner.loading_first_page = true;
            self.publish(&inner);
            (inner.query.clone(), inner.epoch, previous)
        };

        let outcome = self.fetch_page(&query, 1).await;

        let mut inner = self.lock()?;
        if inner.epoch != epoch {
            debug!("🗑️ Dropping stale first page of {}", query);
            return Ok(());
        }
        inner.loading_first_page = false;
        let result = match outcome {
            Ok(page) => {
                let Accumulator {
                    paginator,
                    seen,
                    movies,
                    ..
                } = &mut *inner;
                movies.clear();
                seen.clear();
                append(movies, page.results, seen);
                paginator.finish_fetching(1, page.total_pages);
                inner.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("❌ First page of {} failed: {}", query, e);
                inner.paginator = Paginator::at(previous.current_page, previous.total_pages);
                inner.last_error = Some(e.clone());
                Err(e)
            }
        };
        self.publish(&inner);
        result
    }

    /// Load the page after the current one and append its new movies.
    ///
    /// Returns `Ok(false)` without fetching while page one or another next page is
    /// loading, once the last page was reached, or at the page cap. Also `Ok(false)` when
    /// the list was replaced while the page was in flight.
    ///
    /// # Errors
    ///
    /// The page fetch error; the same page can be retried afterwards.
    pub async fn load_next_page(&self) -> Result<bool, FetchError> {
        let (query, page, epoch) = {
            let mut inner = self.lock()?;
            if inner.loading_first_page {
                debug!("📄 First page of {} still loading, next page refused", inner.query);
                return Ok(false);
            }
            let current = inner.paginator.state().current_page;
            if current >= self.config.max_pages {
                debug!("📄 Page cap {} reached for {}", self.config.max_pages, inner.query);
                return Ok(false);
            }
            if !inner.paginator.start_fetching_next_page() {
                return Ok(false);
            }
            self.publish(&inner);
            (inner.query.clone(), inner.paginator.next_page(), inner.epoch)
        };

        let outcome = self.fetch_page(&query, page).await;

        let mut inner = self.lock()?;
        if inner.epoch != epoch {
            debug!("🗑️ Dropping stale page {} of {}", page, query);
            return Ok(false);
        }
        let result = match outcome {
            Ok(fetched) => {
                let Accumulator {
                    paginator,
                    seen,
                    movies,
                    ..
                } = &mut *inner;
                let accepted = append(movies, fetched.results, seen);
                paginator.finish_fetching(page, fetched.total_pages);
                debug!("📄 Page {} of {}: {} new movies", page, query, accepted);
                inner.last_error = None;
                Ok(true)
            }
            Err(e) => {
                warn!("❌ Page {} of {} failed: {}", page, query, e);
                inner.paginator.abort_fetching();
                inner.last_error = Some(e.clone());
                Err(e)
            }
        };
        self.publish(&inner);
        result
    }

    /// Drop the cached pages of the current query and load page one again
    ///
    /// # Errors
    ///
    /// As [`Self::load_first_page`].
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let query = self.lock()?.query.clone();
        let dropped = self.pages.invalidate_where(
            |key| matches!(key, CatalogRequest::Movies { query: cached, .. } if *cached == query),
        );
        debug!("♻️ Refresh {}: {} cached pages dropped", query, dropped);
        self.load_first_page().await
    }

    async fn fetch_page(&self, query: &MovieQuery, page: u32) -> Result<Page<Movie>, FetchError> {
        let key = CatalogRequest::Movies {
            query: query.clone(),
            page,
        };
        let fetcher = self.fetcher.clone();
        let query = query.clone();
        self.pages
            .resolve(key, move || async move { fetcher.movies(&query, page).await })
            .await
    }

    #[must_use]
    pub fn state(&self) -> ListState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn movies(&self) -> Vec<Movie> {
        self.state.borrow().movies.clone()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.pages.stats()
    }

    /// Cancel in-flight page fetches. Further loads fail with `Cancelled`.
    pub fn close(&self) {
        self.cancel.cancel();
        self.pages.cancel_all();
    }

    fn publish(&self, inner: &Accumulator) {
        self.state.send_replace(Self::view(inner, self.config.max_pages));
    }

    fn view(inner: &Accumulator, max_pages: u32) -> ListState {
        let pagination = inner.paginator.state();
        ListState {
            query: inner.query.clone(),
            movies: inner.movies.clone(),
            pagination,
            has_more: pagination.has_more_pages() && pagination.current_page < max_pages,
            is_loading_first_page: inner.loading_first_page,
            last_error: inner.last_error.clone(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Accumulator>, FetchError> {
        self.inner.lock().map_err(|_| lock_poisoned_error("movie list"))
    }
}

impl Drop for MovieListModel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
