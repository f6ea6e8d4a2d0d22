use crate::cache::Identified;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type MovieId = i64;
pub type GenreId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub vote_average: f32,
    #[serde(default)]
    pub genre_ids: Vec<GenreId>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

impl Identified for Movie {
    fn id(&self) -> i64 {
        self.id
    }
}

/// One page of a paginated listing, as the catalog service reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: u32,
    pub total_pages: u32,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            page: 1,
            total_pages: 1,
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Popular,
    NowPlaying,
    TopRated,
    Upcoming,
}

impl Category {
    pub const ALL: [Self; 4] = [Self::Popular, Self::NowPlaying, Self::TopRated, Self::Upcoming];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::NowPlaying => "now_playing",
            Self::TopRated => "top_rated",
            Self::Upcoming => "upcoming",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| format!("unknown category '{s}' (expected popular, now_playing, top_rated or upcoming)"))
    }
}

/// What a movie list is listing. Two equal queries share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MovieQuery {
    Category(Category),
    /// `None` lists every genre
    Genre(Option<GenreId>),
    Search(String),
}

impl fmt::Display for MovieQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(category) => write!(f, "category:{category}"),
            Self::Genre(Some(genre)) => write!(f, "genre:{genre}"),
            Self::Genre(None) => f.write_str("genre:all"),
            Self::Search(text) => write!(f, "search:{text}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub order: u32,
}

impl Identified for CastMember {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub key: String,
    pub name: String,
    pub site: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchProvider {
    pub provider_id: i64,
    pub provider_name: String,
    #[serde(default)]
    pub display_priority: u32,
}

/// Everything the detail screen shows for one movie, fetched as one bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieDetailBundle {
    pub detail: MovieDetail,
    pub cast: Vec<CastMember>,
    pub videos: Vec<Video>,
    pub recommendations: Vec<Movie>,
    pub providers: Vec<WatchProvider>,
}

/// A favorites document in the real-time store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteMovie {
    pub movie_id: MovieId,
    pub title: String,
    pub added_at: DateTime<Utc>,
}

impl FavoriteMovie {
    #[must_use]
    pub fn from_movie(movie: &Movie) -> Self {
        Self {
            movie_id: movie.id,
            title: movie.title.clone(),
            added_at: Utc::now(),
        }
    }
}

impl Identified for FavoriteMovie {
    fn id(&self) -> i64 {
        self.movie_id
    }
}
