pub mod favorites_store;
pub mod fetcher;
pub mod fixture;
pub mod model;
pub mod preview;

pub use favorites_store::{FavoritesBackend, FavoritesFeed, MemoryFavoritesStore, StaticIdentity};
pub use fetcher::{CatalogFetcher, CatalogRequest, FetchResult, TimeoutFetcher};
pub use fixture::{CatalogFixture, FixtureFetcher};
pub use model::{
    CastMember, Category, FavoriteMovie, Genre, GenreId, Movie, MovieDetail, MovieDetailBundle,
    MovieId, MovieQuery, Page, Video, WatchProvider,
};
pub use preview::PreviewFetcher;
