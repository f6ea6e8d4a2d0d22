pub mod detail;
pub mod discover;
pub mod favorites;
pub mod list;

pub use detail::{DetailState, MovieDetailModel};
pub use discover::{DiscoverModel, DiscoverSection, DiscoverState, SectionRow};
pub use favorites::{FavoritesModel, FavoritesState};
pub use list::{ListState, MovieListModel};
