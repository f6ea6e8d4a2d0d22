/**
Preview catalog

Generated data for demos and previews, injected in place of the remote service. Ids are
stable for a given query and page so pagination and de-duplication behave like the real
thing; titles and names come from `fakeit` and change from run to run.
*/
use super::fetcher::{CatalogFetcher, CatalogRequest, FetchResult};
use super::model::{
    CastMember, Genre, Movie, MovieDetail, MovieId, MovieQuery, Page, Video, WatchProvider,
};
use crate::cache::FetchError;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const PAGE_SIZE: usize = 20;
const DEFAULT_TOTAL_PAGES: u32 = 5;

#[derive(Debug, Clone)]
pub struct PreviewFetcher {
    total_pages: u32,
    /// Items each page repeats from the end of the previous one, like a live listing
    /// shifting between requests
    overlap: usize,
    latency: Duration,
}

impl Default for PreviewFetcher {
    fn default() -> Self {
        Self {
            total_pages: DEFAULT_TOTAL_PAGES,
            overlap: 2,
            latency: Duration::from_millis(40),
        }
    }
}

impl PreviewFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_total_pages(mut self, total_pages: u32) -> Self {
        self.total_pages = total_pages.max(1);
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn query_seed(query: &MovieQuery) -> i64 {
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        // keep ids positive and well apart between queries
        i64::try_from(hasher.finish() % 10_000).unwrap_or_default() * 100_000
    }

    fn movie(id: MovieId) -> Movie {
        Movie {
            id,
            title: title_case(&format!("{} {}", fakeit::words::word(), fakeit::words::word())),
            overview: fakeit::words::sentence(12),
            release_date: None,
            vote_average: f32::from(u8::try_from(id.rem_euclid(90)).unwrap_or_default()) / 10.0,
            genre_ids: vec![],
            poster_path: None,
        }
    }

    fn movie_page(&self, query: &MovieQuery, page: u32) -> Page<Movie> {
        let seed = Self::query_seed(query);
        let page = page.clamp(1, self.total_pages);
        let step = PAGE_SIZE - self.overlap;
        let first = (page as usize - 1) * step;

        let results = (first..first + PAGE_SIZE)
            .map(|offset| Self::movie(seed + i64::try_from(offset).unwrap_or_default()))
            .collect();

        Page {
            page,
            total_pages: self.total_pages,
            results,
        }
    }
}

#[async_trait]
impl CatalogFetcher for PreviewFetcher {
    async fn fetch(&self, request: &CatalogRequest) -> Result<FetchResult, FetchError> {
        debug!("🎬 PREVIEW fetch {}", request.cache_key());
        sleep(self.latency).await;

        let result = match request {
            CatalogRequest::Movies { query, page } => FetchResult::Movies(self.movie_page(query, *page)),
            CatalogRequest::Detail(id) => FetchResult::Detail(MovieDetail {
                id: *id,
                title: Self::movie(*id).title,
                overview: fakeit::words::sentence(24),
                tagline: Some(fakeit::words::sentence(5)),
                runtime: Some(90 + u32::try_from(id.rem_euclid(60)).unwrap_or_default()),
                release_date: None,
                genres: vec![Genre {
                    id: 18,
                    name: "Drama".to_string(),
                }],
            }),
            CatalogRequest::Credits(_) => FetchResult::Credits(
                (0..8)
                    .map(|order| CastMember {
                        id: i64::from(order) + 1,
                        name: fakeit::name::full(),
                        character: fakeit::name::first(),
                        order,
                    })
                    .collect(),
            ),
            CatalogRequest::Videos(id) => FetchResult::Videos(vec![Video {
                key: format!("preview-{id}"),
                name: "Official Trailer".to_string(),
                site: "YouTube".to_string(),
                kind: "Trailer".to_string(),
            }]),
            CatalogRequest::Recommendations(id) => {
                FetchResult::Movies(self.movie_page(&MovieQuery::Search(format!("like:{id}")), 1))
            }
            CatalogRequest::WatchProviders(_) => FetchResult::WatchProviders(vec![WatchProvider {
                provider_id: 8,
                provider_name: "Preview Streaming".to_string(),
                display_priority: 0,
            }]),
        };
        Ok(result)
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
