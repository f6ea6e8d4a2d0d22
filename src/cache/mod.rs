pub mod cached_data;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod errors;
pub mod fan_out;
pub mod paginator;
pub mod query_cache;
pub mod subscription;

pub use cached_data::CachedData;
pub use config::BrowseConfig;
pub use coordinator::{CacheStats, FetchCoordinator};
pub use dedup::{append, Identified, SeenIdSet};
pub use errors::{ErrorKind, FetchError};
pub use fan_out::{join_all, join_all_until, FanOut, LabelledFetch};
pub use paginator::{PaginationState, Paginator};
pub use query_cache::QueryCache;
pub use subscription::{
    IdentityProvider, SessionToken, StreamSource, SubscriptionManager, SubscriptionPhase,
    SubscriptionState,
};
