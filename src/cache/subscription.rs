use super::errors::{lock_poisoned_error, FetchError};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Externally resolved identity the stream is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken {
    pub user_id: String,
}

impl SessionToken {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Resolves the identity/session prerequisite before a subscription can start
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn ensure_session(&self) -> Result<SessionToken, FetchError>;
}

/// Opens a push stream of successive snapshots for one session
pub trait StreamSource<S>: Send + Sync {
    fn open(&self, session: &SessionToken) -> BoxStream<'static, Result<S, FetchError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    Stopped,
    Starting,
    Active,
}

/// What an observer of the subscription sees
#[derive(Debug, Clone)]
pub struct SubscriptionState<S> {
    pub phase: SubscriptionPhase,
    pub snapshot: Option<S>,
    pub last_error: Option<FetchError>,
    pub task_id: Option<Uuid>,
}

impl<S> Default for SubscriptionState<S> {
    fn default() -> Self {
        Self {
            phase: SubscriptionPhase::Stopped,
            snapshot: None,
            last_error: None,
            task_id: None,
        }
    }
}

struct ActiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// `attempt` identifies the current start; a task or a pending start whose id no longer
/// matches has been superseded by `stop()` and must not touch the slot.
///
/// Every phase change is published to the watch channel before the slot lock is released,
/// so observers never see a phase the slot has already left. Lock order: slot, then watch.
struct Slot {
    phase: SubscriptionPhase,
    attempt: Option<Uuid>,
    task: Option<ActiveTask>,
}

impl Slot {
    fn release(&mut self) -> Option<ActiveTask> {
        self.phase = SubscriptionPhase::Stopped;
        self.attempt = None;
        self.task.take()
    }
}

/// One long-lived streaming subscription per owner.
///
/// `start` is idempotent while starting or active, `stop` always cancels, and a start
/// after a stop always creates a fresh task with a new id.
pub struct SubscriptionManager<S> {
    identity: Arc<dyn IdentityProvider>,
    source: Arc<dyn StreamSource<S>>,
    slot: Arc<Mutex<Slot>>,
    state: Arc<watch::Sender<SubscriptionState<S>>>,
    scope: CancellationToken,
}

impl<S> SubscriptionManager<S>
where
    S: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, source: Arc<dyn StreamSource<S>>) -> Self {
        Self::with_scope(identity, source, &CancellationToken::new())
    }

    /// Cancelling `scope` stops the subscription task along with the rest of the owner
    #[must_use]
    pub fn with_scope(
        identity: Arc<dyn IdentityProvider>,
        source: Arc<dyn StreamSource<S>>,
        scope: &CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::default());
        Self {
            identity,
            source,
            slot: Arc::new(Mutex::new(Slot {
                phase: SubscriptionPhase::Stopped,
                attempt: None,
                task: None,
            })),
            state: Arc::new(state),
            scope: scope.clone(),
        }
    }

    /// Start the subscription. Returns the id of the new task, or `None` when the call
    /// was a no-op (already starting/active, or stopped while resolving the session).
    ///
    /// # Errors
    ///
    /// Returns the identity provider's error; no task is created in that case.
    pub async fn start(&self) -> Result<Option<Uuid>, FetchError> {
        let attempt = {
            let mut slot = self.lock()?;
            if slot.phase != SubscriptionPhase::Stopped {
                debug!("📡 Subscription already {:?}, start ignored", slot.phase);
                return Ok(None);
            }
            let attempt = Uuid::new_v4();
            slot.phase = SubscriptionPhase::Starting;
            slot.attempt = Some(attempt);
            self.state.send_modify(|state| {
                state.phase = SubscriptionPhase::Starting;
                state.last_error = None;
                state.task_id = Some(attempt);
            });
            attempt
        };

        let session = match self.identity.ensure_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("❌ Subscription {} could not resolve a session: {}", attempt, e);
                let mut slot = self.lock()?;
                if slot.attempt == Some(attempt) {
                    slot.release();
                    self.state.send_modify(|state| {
                        state.phase = SubscriptionPhase::Stopped;
                        state.task_id = None;
                        state.last_error = Some(e.clone());
                    });
                }
                return Err(e);
            }
        };

        let mut slot = self.lock()?;
        if slot.attempt != Some(attempt) {
            debug!("📡 Subscription {} stopped before its session resolved", attempt);
            return Ok(None);
        }

        let stream = self.source.open(&session);
        let cancel = self.scope.child_token();
        let handle = tokio::spawn(pump(
            stream,
            cancel.clone(),
            attempt,
            self.slot.clone(),
            self.state.clone(),
        ));
        slot.task = Some(ActiveTask { cancel, handle });
        info!("📡 Subscription {} started for {}", attempt, session.user_id);

        Ok(Some(attempt))
    }

    /// Cancel the task (if any) and return to `Stopped`. The last snapshot stays visible.
    pub fn stop(&self) {
        let task = match self.slot.lock() {
            Ok(mut slot) => {
                let task = slot.release();
                self.state.send_modify(|state| {
                    state.phase = SubscriptionPhase::Stopped;
                    state.task_id = None;
                });
                task
            }
            Err(_) => {
                error!("{}", lock_poisoned_error("subscription"));
                return;
            }
        };
        if let Some(task) = task {
            task.cancel.cancel();
            task.handle.abort();
            info!("🛑 Subscription stopped");
        }
    }

    /// Optimistically edit the visible snapshot; the next pushed snapshot replaces it.
    /// Returns `false` when there is no snapshot yet.
    pub fn apply_local<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&mut S),
    {
        self.state.send_if_modified(|state| match state.snapshot.as_mut() {
            Some(snapshot) => {
                mutate(snapshot);
                true
            }
            None => false,
        })
    }

    /// Surface an error raised next to the stream (e.g. a failed write)
    pub fn record_error(&self, error: FetchError) {
        self.state.send_modify(|state| state.last_error = Some(error));
    }

    /// Observers must not hold a `borrow()` of the receiver across calls back into the
    /// manager.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SubscriptionState<S>> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> SubscriptionState<S> {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<S> {
        self.state.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn phase(&self) -> SubscriptionPhase {
        self.slot
            .lock()
            .map_or(SubscriptionPhase::Stopped, |slot| slot.phase)
    }

    /// True once the first snapshot has arrived and until the task ends
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase() == SubscriptionPhase::Active
    }

    /// Id of the live task, if one exists
    #[must_use]
    pub fn task_id(&self) -> Option<Uuid> {
        self.slot
            .lock()
            .ok()
            .and_then(|slot| slot.task.as_ref().and(slot.attempt))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>, FetchError> {
        self.slot.lock().map_err(|_| lock_poisoned_error("subscription"))
    }
}

impl<S> Drop for SubscriptionManager<S> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(task) = slot.release() {
                task.cancel.cancel();
                task.handle.abort();
            }
        }
    }
}

/// Forward snapshots into the observer until cancelled, failed or exhausted
async fn pump<S>(
    mut stream: BoxStream<'static, Result<S, FetchError>>,
    cancel: CancellationToken,
    id: Uuid,
    slot: Arc<Mutex<Slot>>,
    state: Arc<watch::Sender<SubscriptionState<S>>>,
) where
    S: Send + Sync + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("🛑 Subscription {} task cancelled", id);
                // no-op after stop(); an owner scope cancel still has to publish Stopped
                finish(&slot, &state, id, None);
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(snapshot)) => {
                let became_active = {
                    let Ok(mut slot) = slot.lock() else {
                        error!("{}", lock_poisoned_error("subscription"));
                        return;
                    };
                    if slot.attempt != Some(id) {
                        return;
                    }
                    let first = slot.phase == SubscriptionPhase::Starting;
                    slot.phase = SubscriptionPhase::Active;
                    state.send_modify(|state| {
                        state.phase = SubscriptionPhase::Active;
                        state.snapshot = Some(snapshot);
                    });
                    first
                };
                if became_active {
                    info!("📡 Subscription {} active", id);
                }
            }
            Some(Err(e)) => {
                error!("❌ Subscription {} stream failed: {}", id, e);
                finish(&slot, &state, id, Some(e));
                return;
            }
            None => {
                info!("📡 Subscription {} stream ended", id);
                finish(&slot, &state, id, None);
                return;
            }
        }
    }
}

fn finish<S>(
    slot: &Mutex<Slot>,
    state: &watch::Sender<SubscriptionState<S>>,
    id: Uuid,
    error: Option<FetchError>,
) {
    let Ok(mut slot) = slot.lock() else {
        error!("{}", lock_poisoned_error("subscription"));
        return;
    };
    if slot.attempt != Some(id) {
        return;
    }
    // the handle being dropped is our own; dropping a JoinHandle detaches
    slot.release();
    state.send_modify(|state| {
        state.phase = SubscriptionPhase::Stopped;
        state.task_id = None;
        if error.is_some() {
            state.last_error = error;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};
    use tokio_stream::wrappers::ReceiverStream;

    struct CountingIdentity {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IdentityProvider for CountingIdentity {
        async fn ensure_session(&self) -> Result<SessionToken, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(10)).await;
            if self.fail {
                Err(FetchError::Session("anonymous sign-in disabled".to_string()))
            } else {
                Ok(SessionToken::new("user-1"))
            }
        }
    }

    /// Each open hands the test a sender for that stream
    struct ChannelSource {
        opened: AtomicUsize,
        senders: Mutex<Vec<mpsc::Sender<Result<Vec<i64>, FetchError>>>>,
    }

    impl StreamSource<Vec<i64>> for ChannelSource {
        fn open(&self, _session: &SessionToken) -> BoxStream<'static, Result<Vec<i64>, FetchError>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(8);
            self.senders.lock().unwrap().push(tx);
            ReceiverStream::new(rx).boxed()
        }
    }

    fn manager(fail: bool) -> (SubscriptionManager<Vec<i64>>, Arc<CountingIdentity>, Arc<ChannelSource>) {
        let identity = Arc::new(CountingIdentity {
            calls: AtomicUsize::new(0),
            fail,
        });
        let source = Arc::new(ChannelSource {
            opened: AtomicUsize::new(0),
            senders: Mutex::new(Vec::new()),
        });
        (
            SubscriptionManager::new(identity.clone(), source.clone()),
            identity,
            source,
        )
    }

    fn last_sender(source: &ChannelSource) -> mpsc::Sender<Result<Vec<i64>, FetchError>> {
        source.senders.lock().unwrap().last().cloned().unwrap()
    }

    async fn wait_for<S: Clone>(
        rx: &mut watch::Receiver<SubscriptionState<S>>,
        predicate: impl FnMut(&SubscriptionState<S>) -> bool,
    ) {
        timeout(Duration::from_secs(1), rx.wait_for(predicate))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_double_start_creates_one_task() {
        let (manager, identity, source) = manager(false);

        let (a, b) = tokio::join!(manager.start(), manager.start());
        let started: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

        assert_eq!(started.len(), 1);
        assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(manager.task_id(), Some(started[0]));
        assert_eq!(manager.phase(), SubscriptionPhase::Starting);
    }

    #[tokio::test]
    async fn test_snapshots_replace_and_activate() {
        let (manager, _, source) = manager(false);
        let mut rx = manager.subscribe();
        manager.start().await.unwrap();

        let tx = last_sender(&source);
        tx.send(Ok(vec![1, 2])).await.unwrap();
        wait_for(&mut rx, |s| s.phase == SubscriptionPhase::Active).await;
        assert!(manager.is_active());

        tx.send(Ok(vec![3])).await.unwrap();
        wait_for(&mut rx, |s| s.snapshot.as_deref() == Some(&[3][..])).await;
        assert_eq!(manager.snapshot(), Some(vec![3]));
    }

    #[tokio::test]
    async fn test_stop_then_start_yields_new_task() {
        let (manager, _, source) = manager(false);
        let first = manager.start().await.unwrap().unwrap();

        manager.stop();
        assert_eq!(manager.phase(), SubscriptionPhase::Stopped);
        assert!(manager.task_id().is_none());
        // the aborted task drops its end of the stream
        sleep(Duration::from_millis(20)).await;
        assert!(last_sender(&source).is_closed());

        let second = manager.start().await.unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(source.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_identity_failure_creates_no_task() {
        let (manager, _, source) = manager(true);

        let outcome = manager.start().await;

        assert!(matches!(outcome, Err(FetchError::Session(_))));
        assert_eq!(source.opened.load(Ordering::SeqCst), 0);
        assert_eq!(manager.phase(), SubscriptionPhase::Stopped);
        assert!(matches!(manager.current().last_error, Some(FetchError::Session(_))));
    }

    #[tokio::test]
    async fn test_stream_error_stops_subscription() {
        let (manager, _, source) = manager(false);
        let mut rx = manager.subscribe();
        manager.start().await.unwrap();

        let tx = last_sender(&source);
        tx.send(Ok(vec![1])).await.unwrap();
        tx.send(Err(FetchError::Stream("listener revoked".into())))
            .await
            .unwrap();

        wait_for(&mut rx, |s| s.phase == SubscriptionPhase::Stopped).await;
        let state = manager.current();
        assert_eq!(state.snapshot, Some(vec![1]));
        assert_eq!(state.last_error, Some(FetchError::Stream("listener revoked".into())));
        assert!(manager.task_id().is_none());
    }

    #[tokio::test]
    async fn test_stop_during_identity_step_wins() {
        let (manager, _, source) = manager(false);

        let (started, ()) = tokio::join!(manager.start(), async {
            sleep(Duration::from_millis(2)).await;
            manager.stop();
        });

        assert_eq!(started, Ok(None));
        assert_eq!(source.opened.load(Ordering::SeqCst), 0);
        assert_eq!(manager.phase(), SubscriptionPhase::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_published_phase_matches_slot_after_stop() {
        let (manager, _, source) = manager(false);
        let mut rx = manager.subscribe();

        for round in 0..20_i64 {
            manager.start().await.unwrap().unwrap();
            let tx = last_sender(&source);
            tx.send(Ok(vec![round])).await.unwrap();
            wait_for(&mut rx, |s| s.phase == SubscriptionPhase::Active).await;

            // the pump is busy with the next snapshot while stop lands
            let pushing = tokio::spawn(async move {
                for n in 0..8 {
                    if tx.send(Ok(vec![round, n])).await.is_err() {
                        break;
                    }
                }
            });
            tokio::task::yield_now().await;
            manager.stop();
            pushing.await.unwrap();
            sleep(Duration::from_millis(2)).await;

            assert_eq!(manager.phase(), SubscriptionPhase::Stopped);
            assert_eq!(manager.current().phase, manager.phase());
            assert!(manager.current().task_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_apply_local_until_next_snapshot() {
        let (manager, _, source) = manager(false);
        let mut rx = manager.subscribe();
        assert!(!manager.apply_local(|ids| ids.push(9)));

        manager.start().await.unwrap();
        let tx = last_sender(&source);
        tx.send(Ok(vec![1])).await.unwrap();
        wait_for(&mut rx, |s| s.snapshot.is_some()).await;

        assert!(manager.apply_local(|ids| ids.push(2)));
        assert_eq!(manager.snapshot(), Some(vec![1, 2]));

        // last snapshot wins
        tx.send(Ok(vec![1])).await.unwrap();
        wait_for(&mut rx, |s| s.snapshot.as_deref() == Some(&[1][..])).await;
    }

    #[tokio::test]
    async fn test_scope_cancel_stops_task() {
        let identity = Arc::new(CountingIdentity {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let source = Arc::new(ChannelSource {
            opened: AtomicUsize::new(0),
            senders: Mutex::new(Vec::new()),
        });
        let scope = CancellationToken::new();
        let manager: SubscriptionManager<Vec<i64>> =
            SubscriptionManager::with_scope(identity, source.clone(), &scope);
        let mut rx = manager.subscribe();
        manager.start().await.unwrap();
        last_sender(&source).send(Ok(vec![4])).await.unwrap();
        wait_for(&mut rx, |s| s.phase == SubscriptionPhase::Active).await;

        scope.cancel();
        wait_for(&mut rx, |s| s.phase == SubscriptionPhase::Stopped).await;
        assert!(manager.task_id().is_none());
        assert_eq!(manager.snapshot(), Some(vec![4]));
    }
}
