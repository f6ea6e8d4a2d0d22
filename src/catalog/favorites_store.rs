/**
Favorites document store

The real-time store is reached through [`FavoritesBackend`]; [`MemoryFavoritesStore`] is
the in-process implementation used for previews and tests. Every write is pushed to all
open streams for that user, the way a document listener would see it.
*/
use super::model::{FavoriteMovie, MovieId};
use crate::cache::{FetchError, IdentityProvider, SessionToken, StreamSource};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

/// Favorites document store: a push stream per user plus writes
#[async_trait]
pub trait FavoritesBackend: Send + Sync {
    fn watch(&self, session: &SessionToken) -> BoxStream<'static, Result<Vec<FavoriteMovie>, FetchError>>;

    async fn set_favorite(
        &self,
        session: &SessionToken,
        movie: FavoriteMovie,
        favorite: bool,
    ) -> Result<(), FetchError>;
}

/// Adapts a [`FavoritesBackend`] to the subscription's [`StreamSource`]
pub struct FavoritesFeed(pub Arc<dyn FavoritesBackend>);

impl StreamSource<Vec<FavoriteMovie>> for FavoritesFeed {
    fn open(&self, session: &SessionToken) -> BoxStream<'static, Result<Vec<FavoriteMovie>, FetchError>> {
        self.0.watch(session)
    }
}

#[derive(Debug, Clone, Default)]
struct Documents {
    favorites: HashMap<String, Vec<FavoriteMovie>>,
    revoked: HashSet<String>,
}

#[derive(Debug)]
pub struct MemoryFavoritesStore {
    documents: watch::Sender<Documents>,
}

impl Default for MemoryFavoritesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFavoritesStore {
    #[must_use]
    pub fn new() -> Self {
        let (documents, _) = watch::channel(Documents::default());
        Self { documents }
    }

    #[must_use]
    pub fn favorites_of(&self, user_id: &str) -> Vec<FavoriteMovie> {
        self.documents
            .borrow()
            .favorites
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Revoke read access: open streams for `user_id` fail and writes are refused
    pub fn revoke(&self, user_id: &str) {
        info!("🔒 Favorites access revoked for {}", user_id);
        self.documents.send_modify(|docs| {
            docs.revoked.insert(user_id.to_string());
        });
    }
}

#[async_trait]
impl FavoritesBackend for MemoryFavoritesStore {
    fn watch(&self, session: &SessionToken) -> BoxStream<'static, Result<Vec<FavoriteMovie>, FetchError>> {
        let user = session.user_id.clone();
        debug!("👀 Favorites listener opened for {}", user);
        WatchStream::new(self.documents.subscribe())
            .map(move |docs| {
                if docs.revoked.contains(&user) {
                    Err(FetchError::Stream(format!("permission denied for {user}")))
                } else {
                    Ok(docs.favorites.get(&user).cloned().unwrap_or_default())
                }
            })
            .boxed()
    }

    async fn set_favorite(
        &self,
        session: &SessionToken,
        movie: FavoriteMovie,
        favorite: bool,
    ) -> Result<(), FetchError> {
        let user = &session.user_id;
        if self.documents.borrow().revoked.contains(user) {
            return Err(FetchError::Status {
                code: 403,
                message: format!("permission denied for {user}"),
            });
        }

        let movie_id: MovieId = movie.movie_id;
        self.documents.send_modify(|docs| {
            let list = docs.favorites.entry(user.clone()).or_default();
            list.retain(|existing| existing.movie_id != movie_id);
            if favorite {
                list.push(movie);
            }
        });
        debug!("⭐ {} favorite {} for {}", if favorite { "set" } else { "cleared" }, movie_id, user);
        Ok(())
    }
}

/// Identity provider with a fixed answer, selected at construction time
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    #[must_use]
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    #[must_use]
    pub const fn signed_out() -> Self {
        Self { user_id: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn ensure_session(&self) -> Result<SessionToken, FetchError> {
        self.user_id
            .as_ref()
            .map(SessionToken::new)
            .ok_or_else(|| FetchError::Session("no signed-in user".to_string()))
    }
}
