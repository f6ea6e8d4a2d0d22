use super::errors::{lock_poisoned_error, FetchError};
use super::query_cache::QueryCache;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

/// The awaitable handle for one running fetch. `generation` tells two handles for the
/// same key apart, so only the caller that settles this one removes it.
struct InFlight<V> {
    generation: u64,
    handle: SharedFetch<V>,
}

struct CoordinatorState<K, V> {
    cache: QueryCache<K, V>,
    in_flight: HashMap<K, InFlight<V>>,
    next_generation: u64,
    stats: CacheStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    CacheFirst,
    Bypass,
}

/// Single-flight, cache-first resolution of keyed fetches for one owner.
///
/// 1. A cached key returns immediately and the operation is never invoked.
/// 2. A key that is already being fetched joins that fetch.
/// 3. Otherwise the operation runs once; success is cached, failure is not.
///
/// Joined callers observe the identical value or error. Each fetch is driven by its own
/// task, so it settles (and leaves the registry) even when every caller has gone away.
/// The operation closure is called while the registry lock is held, so it must only build
/// its future, never await or call back into this coordinator.
pub struct FetchCoordinator<K, V> {
    state: Arc<Mutex<CoordinatorState<K, V>>>,
    cancel: CancellationToken,
}

impl<K, V> Default for FetchCoordinator<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FetchCoordinator<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Tie every fetch started here to the owner's scope. Cancelling `cancel` settles all
    /// in-flight handles with [`FetchError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState {
                cache: QueryCache::new(),
                in_flight: HashMap::new(),
                next_generation: 0,
                stats: CacheStats::default(),
            })),
            cancel,
        }
    }

    /// Resolve `key`, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the (possibly shared) operation, `Cancelled` if the
    /// owner scope was cancelled, or `Internal` if the registry lock was poisoned.
    pub async fn resolve<F, Fut>(&self, key: K, operation: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        self.run(key, operation, Lookup::CacheFirst).await
    }

    /// Fetch `key` again even if cached. The old entry stays readable until the new
    /// value lands, and survives if the refresh fails.
    ///
    /// # Errors
    ///
    /// Same as [`Self::resolve`].
    pub async fn refresh<F, Fut>(&self, key: K, operation: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        self.run(key, operation, Lookup::Bypass).await
    }

    async fn run<F, Fut>(&self, key: K, operation: F, lookup: Lookup) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let (generation, handle) = {
            let mut guard = self.lock()?;
            let state = &mut *guard;

            if lookup == Lookup::CacheFirst {
                if let Some(value) = state.cache.get(&key) {
                    state.stats.hits += 1;
                    debug!("🎯 Cache HIT: {:?}", key);
                    return Ok(value);
                }
                state.stats.misses += 1;
            }

            if let Some(existing) = state.in_flight.get(&key) {
                state.stats.joins += 1;
                debug!("🔗 JOIN in-flight fetch: {:?}", key);
                (existing.generation, existing.handle.clone())
            } else {
                let generation = state.next_generation;
                state.next_generation += 1;
                state.stats.fetches += 1;
                debug!("🔄 FETCH START: {:?} (generation {})", key, generation);

                let handle = self.make_handle(operation());
                state.in_flight.insert(
                    key.clone(),
                    InFlight {
                        generation,
                        handle: handle.clone(),
                    },
                );
                self.drive(key.clone(), generation, handle.clone());
                (generation, handle)
            }
        };

        let outcome = handle.await;
        settle(&self.state, &key, generation, &outcome)?;
        outcome
    }

    /// Poll the shared handle to completion on its own task, independent of callers
    fn drive(&self, key: K, generation: u64, handle: SharedFetch<V>) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let outcome = handle.await;
            if let Err(e) = settle(&state, &key, generation, &outcome) {
                warn!("❌ Could not settle {:?}: {}", key, e);
            }
        });
    }

    fn make_handle<Fut>(&self, fut: Fut) -> SharedFetch<V>
    where
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(FetchError::Cancelled),
                outcome = fut => outcome,
            }
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CoordinatorState<K, V>>, FetchError> {
        self.state
            .lock()
            .map_err(|_| lock_poisoned_error("fetch coordinator"))
    }

    /// Peek at the cache without fetching or touching the hit counters
    pub fn cached(&self, key: &K) -> Option<V> {
        self.state.lock().ok().and_then(|state| state.cache.get(key))
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.state
            .lock()
            .is_ok_and(|mut state| state.cache.invalidate(key))
    }

    pub fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        self.state
            .lock()
            .map_or(0, |mut state| state.cache.invalidate_where(predicate))
    }

    /// Drop all cached values. In-flight fetches keep running.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.cache.clear();
        }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.state
            .lock()
            .is_ok_and(|state| state.in_flight.contains_key(key))
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().map_or(0, |state| state.in_flight.len())
    }

    /// Cancel the owner scope: every in-flight handle settles with `Cancelled` and the
    /// registry is emptied. Fetches started afterwards are cancelled immediately.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
        if let Ok(mut state) = self.state.lock() {
            let dropped = state.in_flight.len();
            state.in_flight.clear();
            if dropped > 0 {
                info!("🛑 Cancelled {} in-flight fetches", dropped);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().map_or_else(
            |_| CacheStats::default(),
            |state| CacheStats {
                entries: state.cache.len(),
                in_flight: state.in_flight.len(),
                ..state.stats
            },
        )
    }
}

/// Remove the handle and record the outcome. Whichever of the driver task and the callers
/// gets here first does the work; the rest find the generation gone and return.
fn settle<K, V>(
    state: &Mutex<CoordinatorState<K, V>>,
    key: &K,
    generation: u64,
    outcome: &Result<V, FetchError>,
) -> Result<(), FetchError>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    let mut guard = state
        .lock()
        .map_err(|_| lock_poisoned_error("fetch coordinator"))?;
    let state = &mut *guard;

    let owns = state
        .in_flight
        .get(key)
        .is_some_and(|in_flight| in_flight.generation == generation);
    if !owns {
        return Ok(());
    }
    state.in_flight.remove(key);

    match outcome {
        Ok(value) => {
            info!("✅ FETCH SUCCESS: {:?}", key);
            state.cache.put(key.clone(), value.clone());
        }
        Err(FetchError::Cancelled) => {
            debug!("🛑 FETCH CANCELLED: {:?}", key);
        }
        Err(e) => {
            state.stats.failures += 1;
            warn!("❌ FETCH FAILED: {:?} - {}", key, e);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub fetches: u64,
    pub failures: u64,
}

impl CacheStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
