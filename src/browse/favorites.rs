use crate::cache::{
    FetchError, IdentityProvider, SubscriptionManager, SubscriptionPhase, SubscriptionState,
};
use crate::catalog::{FavoriteMovie, FavoritesBackend, FavoritesFeed, Movie, MovieId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

pub type FavoritesState = SubscriptionState<Vec<FavoriteMovie>>;

/// The signed-in user's favorites, kept live by one subscription to the document store.
///
/// Toggles show up immediately and are corrected by whatever the store pushes next.
pub struct FavoritesModel {
    identity: Arc<dyn IdentityProvider>,
    backend: Arc<dyn FavoritesBackend>,
    subscription: SubscriptionManager<Vec<FavoriteMovie>>,
    cancel: CancellationToken,
}

impl FavoritesModel {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, backend: Arc<dyn FavoritesBackend>) -> Self {
        Self::with_scope(identity, backend, &CancellationToken::new())
    }

    #[must_use]
    pub fn with_scope(
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn FavoritesBackend>,
        scope: &CancellationToken,
    ) -> Self {
        let cancel = scope.child_token();
        let subscription = SubscriptionManager::with_scope(
            identity.clone(),
            Arc::new(FavoritesFeed(backend.clone())),
            &cancel,
        );
        Self {
            identity,
            backend,
            subscription,
            cancel,
        }
    }

    /// # Errors
    ///
    /// The identity error when no session can be resolved.
    pub async fn start(&self) -> Result<Option<Uuid>, FetchError> {
        self.subscription.start().await
    }

    pub fn stop(&self) {
        self.subscription.stop();
    }

    /// Flip `movie` in or out of the favorites. Returns whether it is now a favorite.
    ///
    /// # Errors
    ///
    /// The session or write error. The optimistic edit stays until the next snapshot.
    pub async fn toggle(&self, movie: &Movie) -> Result<bool, FetchError> {
        let favorite = FavoriteMovie::from_movie(movie);
        let now_favorite = !self.is_favorite(movie.id);

        let applied = self.subscription.apply_local(|list| {
            list.retain(|existing| existing.movie_id != movie.id);
            if now_favorite {
                list.push(favorite.clone());
            }
        });
        debug!(
            "⭐ Toggle {} -> {} (optimistic: {})",
            movie.id, now_favorite, applied
        );

        let written = match self.identity.ensure_session().await {
            Ok(session) => self.backend.set_favorite(&session, favorite, now_favorite).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("❌ Favorite write for {} failed: {}", movie.id, e);
            self.subscription.record_error(e.clone());
            return Err(e);
        }
        Ok(now_favorite)
    }

    #[must_use]
    pub fn favorites(&self) -> Vec<FavoriteMovie> {
        self.subscription.snapshot().unwrap_or_default()
    }

    #[must_use]
    pub fn is_favorite(&self, movie_id: MovieId) -> bool {
        self.subscription
            .snapshot()
            .is_some_and(|list| list.iter().any(|favorite| favorite.movie_id == movie_id))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    #[must_use]
    pub fn phase(&self) -> SubscriptionPhase {
        self.subscription.phase()
    }

    #[must_use]
    pub fn state(&self) -> FavoritesState {
        self.subscription.current()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FavoritesState> {
        self.subscription.subscribe()
    }

    pub fn close(&self) {
        self.subscription.stop();
        self.cancel.cancel();
    }
}

impl Drop for FavoritesModel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
