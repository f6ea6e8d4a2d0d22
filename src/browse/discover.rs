use crate::cache::config::{ANIMATION_GENRE_ID, DISCOVER_SECTION_COUNT, HORROR_GENRE_ID};
use crate::cache::{CacheStats, FanOut, FetchCoordinator, FetchError};
use crate::catalog::{CatalogFetcher, Category, Movie, MovieQuery};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DISCOVER_KEY: &str = "discover";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverSection {
    Popular,
    NowPlaying,
    TopRated,
    Upcoming,
    Horror,
    Animation,
}

impl DiscoverSection {
    pub const ALL: [Self; DISCOVER_SECTION_COUNT] = [
        Self::Popular,
        Self::NowPlaying,
        Self::TopRated,
        Self::Upcoming,
        Self::Horror,
        Self::Animation,
    ];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Popular => "Popular",
            Self::NowPlaying => "Now Playing",
            Self::TopRated => "Top Rated",
            Self::Upcoming => "Upcoming",
            Self::Horror => "Horror",
            Self::Animation => "Animation",
        }
    }

    #[must_use]
    pub const fn query(self) -> MovieQuery {
        match self {
            Self::Popular => MovieQuery::Category(Category::Popular),
            Self::NowPlaying => MovieQuery::Category(Category::NowPlaying),
            Self::TopRated => MovieQuery::Category(Category::TopRated),
            Self::Upcoming => MovieQuery::Category(Category::Upcoming),
            Self::Horror => MovieQuery::Genre(Some(HORROR_GENRE_ID)),
            Self::Animation => MovieQuery::Genre(Some(ANIMATION_GENRE_ID)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRow {
    pub section: DiscoverSection,
    pub movies: Vec<Movie>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverState {
    /// Either empty or all six sections, never a partial set
    pub sections: Vec<SectionRow>,
    pub is_loading: bool,
    pub last_error: Option<FetchError>,
}

/// Discover screen: the first page of six listings, fetched together as one bundle.
pub struct DiscoverModel {
    fetcher: Arc<dyn CatalogFetcher>,
    bundles: FetchCoordinator<&'static str, Vec<SectionRow>>,
    state: watch::Sender<DiscoverState>,
    cancel: CancellationToken,
}

impl DiscoverModel {
    #[must_use]
    pub fn new(fetcher: Arc<dyn CatalogFetcher>) -> Self {
        Self::with_scope(fetcher, &CancellationToken::new())
    }

    #[must_use]
    pub fn with_scope(fetcher: Arc<dyn CatalogFetcher>, scope: &CancellationToken) -> Self {
        let cancel = scope.child_token();
        let (state, _) = watch::channel(DiscoverState::default());
        Self {
            fetcher,
            bundles: FetchCoordinator::with_cancellation(cancel.clone()),
            state,
            cancel,
        }
    }

    /// Show the sections, from cache when this session already loaded them.
    ///
    /// # Errors
    ///
    /// The first section failure. Sections shown before stay visible.
    pub async fn load(&self) -> Result<Vec<SectionRow>, FetchError> {
        self.begin();
        let fetcher = self.fetcher.clone();
        let outcome = self
            .bundles
            .resolve(DISCOVER_KEY, move || fetch_sections(fetcher))
            .await;
        self.finish(outcome)
    }

    /// Fetch every section again. The old bundle is replaced only if all six succeed.
    ///
    /// # Errors
    ///
    /// As [`Self::load`].
    pub async fn refresh(&self) -> Result<Vec<SectionRow>, FetchError> {
        self.begin();
        let fetcher = self.fetcher.clone();
        let outcome = self
            .bundles
            .refresh(DISCOVER_KEY, move || fetch_sections(fetcher))
            .await;
        self.finish(outcome)
    }

    fn begin(&self) {
        self.state.send_modify(|state| state.is_loading = true);
    }

    fn finish(&self, outcome: Result<Vec<SectionRow>, FetchError>) -> Result<Vec<SectionRow>, FetchError> {
        self.state.send_modify(|state| {
            state.is_loading = false;
            match &outcome {
                Ok(sections) => {
                    state.sections.clone_from(sections);
                    state.last_error = None;
                }
                Err(e) => {
                    warn!("❌ Discover load failed, keeping {} sections: {}", state.sections.len(), e);
                    state.last_error = Some(e.clone());
                }
            }
        });
        outcome
    }

    #[must_use]
    pub fn state(&self) -> DiscoverState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DiscoverState> {
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

impl Drop for DiscoverModel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn fetch_sections(fetcher: Arc<dyn CatalogFetcher>) -> Result<Vec<SectionRow>, FetchError> {
    let fan_out = DiscoverSection::ALL
        .into_iter()
        .fold(FanOut::new(), |fan_out, section| {
            let fetcher = fetcher.clone();
            fan_out.with(section.title(), async move {
                let page = fetcher.movies(&section.query(), 1).await?;
                Ok(SectionRow {
                    section,
                    movies: page.results,
                })
            })
        });
    let sections = fan_out.join().await?;
    info!("🧭 Discover loaded {} sections", sections.len());
    Ok(sections)
}
