/**
Browse session

Picks the collaborators once, at construction time, and hands out owners (list, discover,
detail, favorites) that share them. Every owner is scoped to the session: shutting the
session down cancels their in-flight fetches and subscriptions.
*/
use crate::browse::{DiscoverModel, FavoritesModel, MovieDetailModel, MovieListModel};
use crate::cache::{BrowseConfig, IdentityProvider};
use crate::catalog::{
    CatalogFetcher, FavoritesBackend, FixtureFetcher, MemoryFavoritesStore, MovieQuery,
    PreviewFetcher, StaticIdentity, TimeoutFetcher,
};
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The external services a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn CatalogFetcher>,
    pub identity: Arc<dyn IdentityProvider>,
    pub favorites: Arc<dyn FavoritesBackend>,
}

impl Collaborators {
    /// Generated catalog, in-memory favorites, and `user` as the signed-in identity
    #[must_use]
    pub fn preview(user: Option<&str>) -> Self {
        Self {
            fetcher: Arc::new(PreviewFetcher::new()),
            identity: Arc::new(identity_for(user)),
            favorites: Arc::new(MemoryFavoritesStore::new()),
        }
    }

    /// Catalog served from a JSON fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture cannot be read or parsed.
    pub fn fixture(path: impl AsRef<Path>, user: Option<&str>) -> Result<Self> {
        Ok(Self {
            fetcher: Arc::new(FixtureFetcher::load(path)?),
            ..Self::preview(user)
        })
    }
}

fn identity_for(user: Option<&str>) -> StaticIdentity {
    user.map_or_else(StaticIdentity::signed_out, StaticIdentity::signed_in)
}

pub struct BrowseSession {
    collaborators: Collaborators,
    config: BrowseConfig,
    scope: CancellationToken,
}

impl BrowseSession {
    #[must_use]
    pub fn new(collaborators: Collaborators, config: BrowseConfig) -> Self {
        info!(
            "🚀 Browse session started (max {} pages, {:?} request timeout)",
            config.max_pages, config.request_timeout
        );
        let fetcher: Arc<dyn CatalogFetcher> =
            Arc::new(TimeoutFetcher::new(collaborators.fetcher, config.request_timeout));
        Self {
            collaborators: Collaborators {
                fetcher,
                ..collaborators
            },
            config,
            scope: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn preview(config: BrowseConfig, user: Option<&str>) -> Self {
        Self::new(Collaborators::preview(user), config)
    }

    /// # Errors
    ///
    /// Returns an error if the fixture cannot be read or parsed.
    pub fn from_fixture(path: impl AsRef<Path>, config: BrowseConfig, user: Option<&str>) -> Result<Self> {
        Ok(Self::new(Collaborators::fixture(path, user)?, config))
    }

    #[must_use]
    pub fn movie_list(&self, query: MovieQuery) -> MovieListModel {
        MovieListModel::with_scope(
            self.collaborators.fetcher.clone(),
            query,
            self.config.clone(),
            &self.scope,
        )
    }

    #[must_use]
    pub fn discover(&self) -> DiscoverModel {
        DiscoverModel::with_scope(self.collaborators.fetcher.clone(), &self.scope)
    }

    #[must_use]
    pub fn movie_detail(&self) -> MovieDetailModel {
        MovieDetailModel::with_scope(self.collaborators.fetcher.clone(), &self.scope)
    }

    #[must_use]
    pub fn favorites(&self) -> FavoritesModel {
        FavoritesModel::with_scope(
            self.collaborators.identity.clone(),
            self.collaborators.favorites.clone(),
            &self.scope,
        )
    }

    #[must_use]
    pub const fn config(&self) -> &BrowseConfig {
        &self.config
    }

    /// Cancel every owner created by this session
    pub fn shutdown(&self) {
        if !self.scope.is_cancelled() {
            info!("🛑 Browse session shutting down");
            self.scope.cancel();
        }
    }
}

impl Drop for BrowseSession {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchError;
    use crate::catalog::Category;
    use std::time::Duration;

    fn quick_session() -> BrowseSession {
        let collaborators = Collaborators {
            fetcher: Arc::new(PreviewFetcher::new().with_latency(Duration::from_millis(5))),
            ..Collaborators::preview(Some("ana"))
        };
        BrowseSession::new(collaborators, BrowseConfig::default())
    }

    #[tokio::test]
    async fn test_owners_share_the_session_collaborators() {
        let session = quick_session();
        let list = session.movie_list(MovieQuery::Category(Category::Popular));
        list.load_first_page().await.unwrap();
        assert_eq!(list.movies().len(), 20);

        let favorites = session.favorites();
        assert!(favorites.start().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_owners() {
        let session = quick_session();
        let detail = session.movie_detail();
        session.shutdown();
        assert_eq!(detail.load(1).await.unwrap_err(), FetchError::Cancelled);
    }

    #[tokio::test]
    async fn test_request_timeout_applies_to_owners() {
        let collaborators = Collaborators {
            fetcher: Arc::new(PreviewFetcher::new().with_latency(Duration::from_millis(200))),
            ..Collaborators::preview(None)
        };
        let config = BrowseConfig::default().with_request_timeout(Duration::from_millis(10));
        let session = BrowseSession::new(collaborators, config);

        let err = session.discover().load().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[test]
    fn test_missing_fixture() {
        assert!(BrowseSession::from_fixture("/nonexistent/catalog.json", BrowseConfig::default(), None).is_err());
    }
}
