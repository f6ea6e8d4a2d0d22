use catalog_fetch::cache::{
    append, FanOut, FetchCoordinator, FetchError, Identified, Paginator, SeenIdSet,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq)]
struct Item(i64);

impl Identified for Item {
    fn id(&self) -> i64 {
        self.0
    }
}

fn counted(
    calls: Arc<AtomicUsize>,
    delay_ms: u64,
    outcome: Result<u32, FetchError>,
) -> impl FnOnce() -> BoxFuture<'static, Result<u32, FetchError>> {
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(delay_ms)).await;
            outcome
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_single_flight_across_tasks() {
    let coordinator = Arc::new(FetchCoordinator::<String, u32>::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            let op = counted(calls.clone(), 30, Ok(42));
            tokio::spawn(async move { coordinator.resolve("popular:1".to_string(), op).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(42));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.in_flight_count(), 0);
    assert_eq!(coordinator.cached(&"popular:1".to_string()), Some(42));
}

#[tokio::test]
async fn test_cache_hit_never_invokes_operation() {
    let coordinator = FetchCoordinator::<&'static str, u32>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    coordinator.resolve("k", counted(calls.clone(), 0, Ok(1))).await.unwrap();
    let second = coordinator
        .resolve("k", counted(calls.clone(), 0, Ok(2)))
        .await
        .unwrap();

    assert_eq!(second, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.stats().hits, 1);
}

#[tokio::test]
async fn test_joined_callers_share_the_failure() {
    let coordinator = FetchCoordinator::<&'static str, u32>::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let failure = FetchError::Status {
        code: 500,
        message: "boom".into(),
    };

    let (a, b) = tokio::join!(
        coordinator.resolve("k", counted(calls.clone(), 20, Err(failure.clone()))),
        coordinator.resolve("k", counted(calls.clone(), 0, Ok(7))),
    );
    assert_eq!(a, Err(failure.clone()));
    assert_eq!(b, Err(failure));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // not cached: the next caller fetches afresh
    assert_eq!(coordinator.resolve("k", counted(calls.clone(), 0, Ok(7))).await, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fan_out_is_all_or_nothing() {
    let coordinator = FetchCoordinator::<&'static str, Vec<u32>>::new();
    let fetches = Arc::new(AtomicUsize::new(0));

    let bundle = |fail: bool| {
        let fetches = fetches.clone();
        move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            FanOut::<u32>::new()
                .with("first", async { Ok(1) })
                .with("second", async move {
                    sleep(Duration::from_millis(5)).await;
                    if fail {
                        Err(FetchError::Transport("reset".into()))
                    } else {
                        Ok(2)
                    }
                })
                .with("third", async { Ok(3) })
                .join()
                .await
        }
    };

    assert!(coordinator.resolve("bundle", bundle(true)).await.is_err());
    assert_eq!(coordinator.cached(&"bundle"), None);

    assert_eq!(coordinator.resolve("bundle", bundle(false)).await, Ok(vec![1, 2, 3]));
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_paging_with_dedup() {
    let mut paginator = Paginator::new();
    let mut seen = SeenIdSet::new();
    let mut list = Vec::new();

    append(&mut list, (0..5).map(Item), &mut seen);
    paginator.finish_fetching(1, 3);

    for page in 2..=3 {
        assert!(paginator.start_fetching_next_page());
        assert!(!paginator.start_fetching_next_page());
        let first = (page - 1) * 4;
        append(&mut list, (first..first + 5).map(Item), &mut seen);
        paginator.finish_fetching(u32::try_from(page).unwrap(), 3);
    }

    assert!(!paginator.has_more_pages());
    assert!(!paginator.start_fetching_next_page());
    assert_eq!(list, (0..13).map(Item).collect::<Vec<_>>());
    assert_eq!(seen.len(), 13);
}
