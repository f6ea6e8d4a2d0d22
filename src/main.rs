use anyhow::{Context, bail};
use catalog_fetch::browse::MovieListModel;
use catalog_fetch::cache::config::{DEFAULT_LOG_FILTER, DEFAULT_MAX_PAGES, DEFAULT_REQUEST_TIMEOUT_SECS};
use catalog_fetch::cache::{BrowseConfig, SubscriptionPhase};
use catalog_fetch::catalog::{Category, GenreId, MovieId, MovieQuery};
use catalog_fetch::session::BrowseSession;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Category to list: popular, now_playing, top_rated or upcoming
    #[arg(short, long, default_value = "popular")]
    category: Category,

    /// List a genre instead of a category
    #[arg(short, long, conflicts_with = "search")]
    genre: Option<GenreId>,

    /// List search results instead of a category
    #[arg(short, long)]
    search: Option<String>,

    /// How many pages of the list to load
    #[arg(short, long, default_value_t = 2)]
    pages: u32,

    /// Serve the catalog from a JSON fixture instead of generated preview data
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Show the detail bundle of one movie
    #[arg(short, long)]
    movie: Option<MovieId>,

    /// Show the discover sections
    #[arg(long)]
    discover: bool,

    /// Favorite the first listed movie and show the live favorites
    #[arg(long)]
    favorites: bool,

    /// Signed-in user for favorites
    #[arg(short, long)]
    user: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: u32,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl Args {
    fn query(&self) -> MovieQuery {
        match (&self.search, self.genre) {
            (Some(text), _) => MovieQuery::Search(text.clone()),
            (None, Some(genre)) => MovieQuery::Genre(Some(genre)),
            (None, None) => MovieQuery::Category(self.category),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = BrowseConfig::default()
        .with_max_pages(args.max_pages)
        .with_request_timeout(Duration::from_secs(args.timeout_secs));
    let session = match &args.fixture {
        Some(path) => BrowseSession::from_fixture(path, config, args.user.as_deref())
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => BrowseSession::preview(config, args.user.as_deref()),
    };

    let output = if args.discover {
        let discover = session.discover();
        let sections = discover.load().await?;
        json!({ "discover": sections })
    } else if let Some(movie_id) = args.movie {
        let detail = session.movie_detail();
        json!({ "detail": detail.load(movie_id).await? })
    } else if args.favorites {
        show_favorites(&session, &args).await?
    } else {
        let list = session.movie_list(args.query());
        load_pages(&list, args.pages).await?;
        let state = list.state();
        info!("📊 {:?}", list.stats());
        json!({
            "query": state.query.to_string(),
            "current_page": state.pagination.current_page,
            "total_pages": state.pagination.total_pages,
            "has_more": state.has_more,
            "movies": state.movies,
        })
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    session.shutdown();
    Ok(())
}

async fn load_pages(list: &MovieListModel, pages: u32) -> anyhow::Result<()> {
    list.load_first_page().await?;
    for _ in 1..pages {
        if !list.load_next_page().await? {
            break;
        }
    }
    Ok(())
}

async fn show_favorites(session: &BrowseSession, args: &Args) -> anyhow::Result<serde_json::Value> {
    if args.user.is_none() {
        bail!("--favorites needs a signed-in --user");
    }
    let favorites = session.favorites();
    favorites.start().await?;

    let mut state = favorites.subscribe();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|state| state.phase == SubscriptionPhase::Active),
    )
    .await
    .context("favorites never became active")??;

    let list = session.movie_list(args.query());
    list.load_first_page().await?;
    if let Some(movie) = list.movies().first() {
        favorites.toggle(movie).await?;
    }

    let expected = favorites.favorites().len();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|state| state.snapshot.as_ref().is_some_and(|movies| movies.len() == expected)),
    )
    .await
    .context("favorites snapshot never arrived")??;

    let favorites_list = favorites.favorites();
    favorites.close();
    Ok(json!({ "favorites": favorites_list }))
}
