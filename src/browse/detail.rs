use crate::cache::{CacheStats, FetchCoordinator, FetchError};
use crate::catalog::{CatalogFetcher, MovieDetailBundle, MovieId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DetailState {
    pub selected: Option<MovieId>,
    pub bundle: Option<MovieDetailBundle>,
    pub is_loading: bool,
    pub last_error: Option<FetchError>,
}

/// Movie detail screen. The five facets of a movie are fetched concurrently and cached
/// as one bundle keyed by movie id; a failing facet fails the whole bundle.
pub struct MovieDetailModel {
    fetcher: Arc<dyn CatalogFetcher>,
    bundles: FetchCoordinator<MovieId, MovieDetailBundle>,
    state: watch::Sender<DetailState>,
    cancel: CancellationToken,
}

impl MovieDetailModel {
    #[must_use]
    pub fn new(fetcher: Arc<dyn CatalogFetcher>) -> Self {
        Self::with_scope(fetcher, &CancellationToken::new())
    }

    #[must_use]
    pub fn with_scope(fetcher: Arc<dyn CatalogFetcher>, scope: &CancellationToken) -> Self {
        let cancel = scope.child_token();
        let (state, _) = watch::channel(DetailState::default());
        Self {
            fetcher,
            bundles: FetchCoordinator::with_cancellation(cancel.clone()),
            state,
            cancel,
        }
    }

    /// Select `movie_id` and load its bundle. A result for a movie that is no longer
    /// selected is cached but not shown.
    ///
    /// # Errors
    ///
    /// The first facet failure.
    pub async fn load(&self, movie_id: MovieId) -> Result<MovieDetailBundle, FetchError> {
        self.select(movie_id);
        let fetcher = self.fetcher.clone();
        let outcome = self
            .bundles
            .resolve(movie_id, move || fetch_bundle(fetcher, movie_id))
            .await;
        self.finish(movie_id, outcome)
    }

    /// # Errors
    ///
    /// As [`Self::load`]; the cached bundle survives a failed refresh.
    pub async fn refresh(&self, movie_id: MovieId) -> Result<MovieDetailBundle, FetchError> {
        self.select(movie_id);
        let fetcher = self.fetcher.clone();
        let outcome = self
            .bundles
            .refresh(movie_id, move || fetch_bundle(fetcher, movie_id))
            .await;
        self.finish(movie_id, outcome)
    }

    #[must_use]
    pub fn cached(&self, movie_id: MovieId) -> Option<MovieDetailBundle> {
        self.bundles.cached(&movie_id)
    }

    fn select(&self, movie_id: MovieId) {
        self.state.send_modify(|state| {
            if state.selected != Some(movie_id) {
                state.selected = Some(movie_id);
                state.bundle = self.bundles.cached(&movie_id);
                state.last_error = None;
            }
            state.is_loading = true;
        });
    }

    fn finish(
        &self,
        movie_id: MovieId,
        outcome: Result<MovieDetailBundle, FetchError>,
    ) -> Result<MovieDetailBundle, FetchError> {
        self.state.send_if_modified(|state| {
            if state.selected != Some(movie_id) {
                debug!("🗑️ Detail {} no longer selected", movie_id);
                return false;
            }
            state.is_loading = false;
            match &outcome {
                Ok(bundle) => {
                    state.bundle = Some(bundle.clone());
                    state.last_error = None;
                }
                Err(e) => state.last_error = Some(e.clone()),
            }
            true
        });
        outcome
    }

    #[must_use]
    pub fn state(&self) -> DetailState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DetailState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.bundles.stats()
    }

    pub fn close(&self) {
        self.cancel.cancel();
        self.bundles.cancel_all();
    }
}

impl Drop for MovieDetailModel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn fetch_bundle(
    fetcher: Arc<dyn CatalogFetcher>,
    movie_id: MovieId,
) -> Result<MovieDetailBundle, FetchError> {
    let (detail, cast, videos, recommendations, providers) = futures::try_join!(
        fetcher.detail(movie_id),
        fetcher.credits(movie_id),
        fetcher.videos(movie_id),
        fetcher.recommendations(movie_id),
        fetcher.watch_providers(movie_id),
    )
    .inspect_err(|e| warn!("❌ Detail bundle {} failed: {}", movie_id, e))?;

    info!("🎞️ Detail bundle {} loaded", movie_id);
    Ok(MovieDetailBundle {
        detail,
        cast,
        videos,
        recommendations: recommendations.results,
        providers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        CastMember, CatalogRequest, FetchResult, Movie, MovieDetail, Page, Video, WatchProvider,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct FacetFetcher {
        calls: AtomicUsize,
        videos_down: AtomicBool,
    }

    #[async_trait]
    impl CatalogFetcher for FacetFetcher {
        async fn fetch(&self, request: &CatalogRequest) -> Result<FetchResult, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = request.movie_id().unwrap_or_default();
            // detail is the slowest facet, so a failing sibling aborts it
            let delay = if matches!(request, CatalogRequest::Detail(_)) { 30 } else { 5 };
            sleep(Duration::from_millis(delay)).await;
            let result = match request {
                CatalogRequest::Detail(_) => FetchResult::Detail(MovieDetail {
                    id,
                    title: format!("Movie {id}"),
                    overview: String::new(),
                    tagline: None,
                    runtime: Some(100),
                    release_date: None,
                    genres: vec![],
                }),
                CatalogRequest::Credits(_) => FetchResult::Credits(vec![CastMember {
                    id: 7,
                    name: "Sigourney Weaver".into(),
                    character: "Ripley".into(),
                    order: 0,
                }]),
                CatalogRequest::Videos(_) if self.videos_down.load(Ordering::SeqCst) => {
                    return Err(FetchError::Transport("videos unavailable".into()));
                }
                CatalogRequest::Videos(_) => FetchResult::Videos(vec![Video {
                    key: "abc".into(),
                    name: "Trailer".into(),
                    site: "YouTube".into(),
                    kind: "Trailer".into(),
                }]),
                CatalogRequest::Recommendations(_) => FetchResult::Movies(Page {
                    page: 1,
                    total_pages: 1,
                    results: vec![Movie {
                        id: id + 1,
                        title: "Sequel".into(),
                        overview: String::new(),
                        release_date: None,
                        vote_average: 0.0,
                        genre_ids: vec![],
                        poster_path: None,
                    }],
                }),
                CatalogRequest::WatchProviders(_) => FetchResult::WatchProviders(vec![WatchProvider {
                    provider_id: 8,
                    provider_name: "Stream".into(),
                    display_priority: 0,
                }]),
                CatalogRequest::Movies { .. } => FetchResult::Movies(Page::empty()),
            };
            Ok(result)
        }
    }

    #[tokio::test]
    async fn test_bundle_joins_all_facets() {
        let fetcher = Arc::new(FacetFetcher::default());
        let model = MovieDetailModel::new(fetcher.clone());

        let bundle = model.load(348).await.unwrap();
        assert_eq!(bundle.detail.id, 348);
        assert_eq!(bundle.cast[0].character, "Ripley");
        assert_eq!(bundle.recommendations[0].id, 349);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);

        model.load(348).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
        assert_eq!(model.state().bundle, Some(bundle));
    }

    #[tokio::test]
    async fn test_failing_facet_fails_bundle() {
        let fetcher = Arc::new(FacetFetcher::default());
        fetcher.videos_down.store(true, Ordering::SeqCst);
        let model = MovieDetailModel::new(fetcher.clone());

        let err = model.load(1).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
        assert!(model.cached(1).is_none());
        assert!(model.state().bundle.is_none());

        fetcher.videos_down.store(false, Ordering::SeqCst);
        assert!(model.load(1).await.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_stale_selection_not_shown() {
        let fetcher = Arc::new(FacetFetcher::default());
        let model = MovieDetailModel::new(fetcher.clone());

        let (first, second) = tokio::join!(model.load(1), async {
            sleep(Duration::from_millis(2)).await;
            model.load(2).await
        });
        assert!(first.is_ok());
        assert!(second.is_ok());

        let state = model.state();
        assert_eq!(state.selected, Some(2));
        assert_eq!(state.bundle.map(|b| b.detail.id), Some(2));
        assert!(model.cached(1).is_some());
    }
}
