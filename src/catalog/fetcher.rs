use super::model::{CastMember, Movie, MovieDetail, MovieId, MovieQuery, Page, Video, WatchProvider};
use crate::cache::errors::{unexpected_payload_error, FetchError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Key of one logical catalog query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogRequest {
    Movies { query: MovieQuery, page: u32 },
    Detail(MovieId),
    Credits(MovieId),
    Videos(MovieId),
    Recommendations(MovieId),
    WatchProviders(MovieId),
}

impl CatalogRequest {
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Movies { query, page } => format!("movies:{query}:{page}"),
            Self::Detail(id) => format!("detail:{id}"),
            Self::Credits(id) => format!("credits:{id}"),
            Self::Videos(id) => format!("videos:{id}"),
            Self::Recommendations(id) => format!("recommendations:{id}"),
            Self::WatchProviders(id) => format!("providers:{id}"),
        }
    }

    #[must_use]
    pub const fn movie_id(&self) -> Option<MovieId> {
        match self {
            Self::Movies { .. } => None,
            Self::Detail(id)
            | Self::Credits(id)
            | Self::Videos(id)
            | Self::Recommendations(id)
            | Self::WatchProviders(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Movies(Page<Movie>),
    Detail(MovieDetail),
    Credits(Vec<CastMember>),
    Videos(Vec<Video>),
    WatchProviders(Vec<WatchProvider>),
}

impl FetchResult {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Movies(_) => "movies",
            Self::Detail(_) => "detail",
            Self::Credits(_) => "credits",
            Self::Videos(_) => "videos",
            Self::WatchProviders(_) => "watch providers",
        }
    }

    /// # Errors
    ///
    /// `Decode` if the payload is not a movie page.
    pub fn into_movies(self) -> Result<Page<Movie>, FetchError> {
        match self {
            Self::Movies(page) => Ok(page),
            other => Err(unexpected_payload_error("movies", other.kind())),
        }
    }

    /// # Errors
    ///
    /// `Decode` if the payload is not a movie detail.
    pub fn into_detail(self) -> Result<MovieDetail, FetchError> {
        match self {
            Self::Detail(detail) => Ok(detail),
            other => Err(unexpected_payload_error("detail", other.kind())),
        }
    }

    /// # Errors
    ///
    /// `Decode` if the payload is not a cast list.
    pub fn into_credits(self) -> Result<Vec<CastMember>, FetchError> {
        match self {
            Self::Credits(cast) => Ok(cast),
            other => Err(unexpected_payload_error("credits", other.kind())),
        }
    }

    /// # Errors
    ///
    /// `Decode` if the payload is not a video list.
    pub fn into_videos(self) -> Result<Vec<Video>, FetchError> {
        match self {
            Self::Videos(videos) => Ok(videos),
            other => Err(unexpected_payload_error("videos", other.kind())),
        }
    }

    /// # Errors
    ///
    /// `Decode` if the payload is not a provider list.
    pub fn into_watch_providers(self) -> Result<Vec<WatchProvider>, FetchError> {
        match self {
            Self::WatchProviders(providers) => Ok(providers),
            other => Err(unexpected_payload_error("watch providers", other.kind())),
        }
    }
}

/// The remote catalog service. Transport details live behind this trait.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, request: &CatalogRequest) -> Result<FetchResult, FetchError>;

    async fn movies(&self, query: &MovieQuery, page: u32) -> Result<Page<Movie>, FetchError> {
        self.fetch(&CatalogRequest::Movies {
            query: query.clone(),
            page,
        })
        .await?
        .into_movies()
    }

    async fn detail(&self, id: MovieId) -> Result<MovieDetail, FetchError> {
        self.fetch(&CatalogRequest::Detail(id)).await?.into_detail()
    }

    async fn credits(&self, id: MovieId) -> Result<Vec<CastMember>, FetchError> {
        self.fetch(&CatalogRequest::Credits(id)).await?.into_credits()
    }

    async fn videos(&self, id: MovieId) -> Result<Vec<Video>, FetchError> {
        self.fetch(&CatalogRequest::Videos(id)).await?.into_videos()
    }

    async fn recommendations(&self, id: MovieId) -> Result<Page<Movie>, FetchError> {
        self.fetch(&CatalogRequest::Recommendations(id))
            .await?
            .into_movies()
    }

    async fn watch_providers(&self, id: MovieId) -> Result<Vec<WatchProvider>, FetchError> {
        self.fetch(&CatalogRequest::WatchProviders(id))
            .await?
            .into_watch_providers()
    }
}

/// Bounds every request of an inner fetcher; expiry is a transient transport error
pub struct TimeoutFetcher {
    inner: Arc<dyn CatalogFetcher>,
    limit: Duration,
}

impl TimeoutFetcher {
    #[must_use]
    pub fn new(inner: Arc<dyn CatalogFetcher>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl CatalogFetcher for TimeoutFetcher {
    async fn fetch(&self, request: &CatalogRequest) -> Result<FetchResult, FetchError> {
        match tokio::time::timeout(self.limit, self.inner.fetch(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("⏱️ {} timed out after {:?}", request.cache_key(), self.limit);
                Err(FetchError::Transport(format!(
                    "{} timed out after {:?}",
                    request.cache_key(),
                    self.limit
                )))
            }
        }
    }
}
