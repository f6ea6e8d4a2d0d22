use super::fetcher::{CatalogFetcher, CatalogRequest, FetchResult};
use super::model::{CastMember, Category, Movie, MovieDetail, MovieId, MovieQuery, Page, Video, WatchProvider};
use crate::cache::FetchError;
use crate::error::Result as CrateResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const fn default_page_size() -> usize {
    20
}

/// A canned catalog loaded from JSON
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFixture {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub details: HashMap<MovieId, MovieDetail>,
    #[serde(default)]
    pub credits: HashMap<MovieId, Vec<CastMember>>,
    #[serde(default)]
    pub videos: HashMap<MovieId, Vec<Video>>,
    #[serde(default)]
    pub providers: HashMap<MovieId, Vec<WatchProvider>>,
}

/// Serves a [`CatalogFixture`] through the [`CatalogFetcher`] capability
#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    fixture: CatalogFixture,
}

impl FixtureFetcher {
    #[must_use]
    pub fn new(mut fixture: CatalogFixture) -> Self {
        fixture.page_size = fixture.page_size.max(1);
        Self { fixture }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid fixture.
    pub fn load(path: impl AsRef<Path>) -> CrateResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let fetcher = Self::from_json(&text)?;
        info!(
            "📂 Loaded fixture {} ({} movies)",
            path.display(),
            fetcher.fixture.movies.len()
        );
        Ok(fetcher)
    }

    /// # Errors
    ///
    /// Returns an error if `text` is not a valid fixture.
    pub fn from_json(text: &str) -> CrateResult<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    fn matching(&self, query: &MovieQuery) -> Vec<Movie> {
        let mut movies: Vec<Movie> = match query {
            MovieQuery::Category(_) | MovieQuery::Genre(None) => self.fixture.movies.clone(),
            MovieQuery::Genre(Some(genre)) => self
                .fixture
                .movies
                .iter()
                .filter(|movie| movie.genre_ids.contains(genre))
                .cloned()
                .collect(),
            MovieQuery::Search(text) => {
                let needle = text.to_lowercase();
                self.fixture
                    .movies
                    .iter()
                    .filter(|movie| movie.title.to_lowercase().contains(&needle))
                    .cloned()
                    .collect()
            }
        };

        match query {
            MovieQuery::Category(Category::TopRated) => movies.sort_by(|a, b| {
                b.vote_average
                    .partial_cmp(&a.vote_average)
                    .unwrap_or(Ordering::Equal)
            }),
            MovieQuery::Category(Category::Upcoming | Category::NowPlaying) => {
                movies.sort_by(|a, b| b.release_date.cmp(&a.release_date));
            }
            _ => {}
        }
        movies
    }

    fn page_of(&self, movies: &[Movie], page: u32) -> Result<Page<Movie>, FetchError> {
        let size = self.fixture.page_size;
        let total_pages = u32::try_from(movies.len().div_ceil(size).max(1))
            .map_err(|_| FetchError::Internal("fixture too large".to_string()))?;
        if page == 0 || page > total_pages {
            return Err(FetchError::Status {
                code: 422,
                message: format!("page {page} outside 1..={total_pages}"),
            });
        }
        let start = (page as usize - 1) * size;
        let results = movies.iter().skip(start).take(size).cloned().collect();
        Ok(Page {
            page,
            total_pages,
            results,
        })
    }

    fn lookup<T: Clone>(map: &HashMap<MovieId, T>, id: MovieId, what: &str) -> Result<T, FetchError> {
        map.get(&id).cloned().ok_or_else(|| FetchError::Status {
            code: 404,
            message: format!("no {what} for movie {id}"),
        })
    }
}

#[async_trait]
impl CatalogFetcher for FixtureFetcher {
    async fn fetch(&self, request: &CatalogRequest) -> Result<FetchResult, FetchError> {
        debug!("📂 FIXTURE fetch {}", request.cache_key());
        match request {
            CatalogRequest::Movies { query, page } => {
                let movies = self.matching(query);
                self.page_of(&movies, *page).map(FetchResult::Movies)
            }
            CatalogRequest::Detail(id) => {
                Self::lookup(&self.fixture.details, *id, "detail").map(FetchResult::Detail)
            }
            CatalogRequest::Credits(id) => Ok(FetchResult::Credits(
                self.fixture.credits.get(id).cloned().unwrap_or_default(),
            )),
            CatalogRequest::Videos(id) => Ok(FetchResult::Videos(
                self.fixture.videos.get(id).cloned().unwrap_or_default(),
            )),
            CatalogRequest::Recommendations(id) => {
                let genres = self
                    .fixture
                    .movies
                    .iter()
                    .find(|movie| movie.id == *id)
                    .map(|movie| movie.genre_ids.clone())
                    .unwrap_or_default();
                let similar: Vec<Movie> = self
                    .fixture
                    .movies
                    .iter()
                    .filter(|movie| movie.id != *id)
                    .filter(|movie| movie.genre_ids.iter().any(|g| genres.contains(g)))
                    .cloned()
                    .collect();
                self.page_of(&similar, 1).map(FetchResult::Movies)
            }
            CatalogRequest::WatchProviders(id) => Ok(FetchResult::WatchProviders(
                self.fixture.providers.get(id).cloned().unwrap_or_default(),
            )),
        }
    }
}
