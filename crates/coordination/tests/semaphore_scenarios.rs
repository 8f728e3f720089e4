//! Multi-client semaphore scenarios against the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use turnstile_core::{Clock, ManualClock, Token};
use turnstile_coordination::{RetryBudget, Semaphore};
use turnstile_state_memory::MemoryStateStore;

const T0: i64 = 1_700_000_000_000;
const TIMEOUT: Duration = Duration::from_secs(10);

fn semaphore(store: &Arc<MemoryStateStore>, clock: Arc<dyn Clock>) -> Semaphore {
    Semaphore::builder()
        .state(store.clone())
        .clock(clock)
        .build()
        .expect("state store is set")
}

fn single_host() -> (Semaphore, ManualClock) {
    let clock = ManualClock::new(T0);
    let store = Arc::new(MemoryStateStore::with_clock(Arc::new(clock.clone())));
    (semaphore(&store, Arc::new(clock.clone())), clock)
}

#[tokio::test]
async fn simple_admits_exactly_limit_callers() {
    let (semaphore, _clock) = single_host();

    let mut results = Vec::new();
    for _ in 0..4 {
        results.push(
            semaphore
                .acquire_simple("r", 3, Duration::from_millis(1_000))
                .await
                .unwrap(),
        );
    }

    assert!(results[..3].iter().all(Option::is_some));
    assert!(results[3].is_none());
}

#[tokio::test]
async fn released_token_cannot_be_released_again() {
    let (semaphore, _clock) = single_host();

    let simple = semaphore
        .acquire_simple("twice", 2, TIMEOUT)
        .await
        .unwrap()
        .expect("should acquire");
    assert!(semaphore.release_simple("twice", &simple).await.unwrap());
    assert!(!semaphore.release_simple("twice", &simple).await.unwrap());

    let fair = semaphore
        .acquire_fair("twice-fair", 2, TIMEOUT)
        .await
        .unwrap()
        .expect("should acquire");
    assert!(semaphore.release_fair("twice-fair", &fair).await.unwrap());
    assert!(!semaphore.release_fair("twice-fair", &fair).await.unwrap());
}

#[tokio::test]
async fn unrefreshed_holder_is_evicted_by_next_acquire() {
    let (semaphore, clock) = single_host();

    let idle = semaphore
        .acquire_fair("evict", 1, TIMEOUT)
        .await
        .unwrap()
        .expect("should acquire");

    clock.advance(TIMEOUT + Duration::from_millis(1));
    let newcomer = semaphore
        .acquire_fair("evict", 1, TIMEOUT)
        .await
        .unwrap();
    assert!(newcomer.is_some(), "expired holder should not count");

    assert!(!semaphore.refresh_fair("evict", &idle).await.unwrap());
    assert_eq!(semaphore.holders("evict").await.unwrap(), 1);
}

#[tokio::test]
async fn fair_admission_follows_issuance_order() {
    let (semaphore, clock) = single_host();

    let first = semaphore
        .acquire_fair("fifo", 2, TIMEOUT)
        .await
        .unwrap()
        .expect("first caller admitted");
    clock.advance(Duration::from_millis(1));
    let second = semaphore
        .acquire_fair("fifo", 2, TIMEOUT)
        .await
        .unwrap()
        .expect("second caller admitted");
    clock.advance(Duration::from_millis(1));
    assert!(
        semaphore
            .acquire_fair("fifo", 2, TIMEOUT)
            .await
            .unwrap()
            .is_none(),
        "third caller must wait for a release"
    );

    assert!(semaphore.release_fair("fifo", &first).await.unwrap());
    let third = semaphore
        .acquire_fair("fifo", 2, TIMEOUT)
        .await
        .unwrap();
    assert!(third.is_some());
    assert!(semaphore.refresh_fair("fifo", &second).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn serialized_race_for_single_slot() {
    let (semaphore, _clock) = single_host();
    let semaphore = Arc::new(semaphore);

    let racers: Vec<_> = (0..2)
        .map(|_| {
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                semaphore
                    .acquire_fair_with_lock("res", 1, Duration::from_millis(5_000))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners: Vec<Token> = Vec::new();
    for racer in racers {
        if let Some(token) = racer.await.expect("task should not panic") {
            winners.push(token);
        }
    }
    assert_eq!(winners.len(), 1, "exactly one racer wins");

    assert!(semaphore.release_fair("res", &winners[0]).await.unwrap());
    let third = semaphore
        .acquire_fair_with_lock("res", 1, Duration::from_millis(5_000))
        .await
        .unwrap();
    assert!(third.is_some(), "slot is free after release");
}

/// Twenty tasks each take a slot once, polling until admitted, and record
/// the highest number of simultaneous holders they observed.
async fn storm(semaphore: Arc<Semaphore>, name: &'static str, limit: u32, fair: bool) -> u32 {
    let inside = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let semaphore = Arc::clone(&semaphore);
        let inside = Arc::clone(&inside);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let budget = RetryBudget::timeout(Duration::from_secs(600))
                .with_poll_interval(Duration::from_millis(10));
            let token = budget
                .run(|| {
                    let semaphore = Arc::clone(&semaphore);
                    async move {
                        if fair {
                            semaphore.acquire_fair_with_lock(name, limit, TIMEOUT).await
                        } else {
                            semaphore.acquire_simple(name, limit, TIMEOUT).await
                        }
                    }
                })
                .await
                .unwrap()
                .expect("every worker is eventually admitted");

            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            inside.fetch_sub(1, Ordering::SeqCst);

            let released = if fair {
                semaphore.release_fair(name, &token).await
            } else {
                semaphore.release_simple(name, &token).await
            };
            assert!(released.unwrap(), "holder should still own its slot");
        }));
    }

    for h in handles {
        h.await.expect("task should not panic");
    }
    peak.load(Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn fair_storm_never_exceeds_limit() {
    let (semaphore, _clock) = single_host();
    let semaphore = Arc::new(semaphore);

    let peak = storm(Arc::clone(&semaphore), "storm-fair", 3, true).await;
    assert!(peak <= 3, "observed {peak} simultaneous holders");
    assert_eq!(semaphore.holders("storm-fair").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn simple_storm_never_exceeds_limit() {
    let (semaphore, _clock) = single_host();
    let semaphore = Arc::new(semaphore);

    let peak = storm(Arc::clone(&semaphore), "storm-simple", 3, false).await;
    assert!(peak <= 3, "observed {peak} simultaneous holders");
    assert_eq!(semaphore.holders("storm-simple").await.unwrap(), 0);
}

#[tokio::test]
async fn outage_surfaces_as_error() {
    let clock = ManualClock::new(T0);
    let store = Arc::new(MemoryStateStore::with_clock(Arc::new(clock.clone())));
    let semaphore = semaphore(&store, Arc::new(clock));

    let token = semaphore
        .acquire_fair("down", 1, TIMEOUT)
        .await
        .unwrap()
        .expect("should acquire");
    store.set_unavailable(true);

    assert!(semaphore.acquire_simple("down", 1, TIMEOUT).await.is_err());
    assert!(semaphore.acquire_fair("down", 1, TIMEOUT).await.is_err());
    assert!(semaphore.acquire_fair_with_lock("down", 1, TIMEOUT).await.is_err());
    assert!(semaphore.refresh_fair("down", &token).await.is_err());
    assert!(semaphore.release_fair("down", &token).await.is_err());

    store.set_unavailable(false);
    assert!(semaphore.release_fair("down", &token).await.unwrap());
}

#[tokio::test]
async fn lagging_clock_loses_simple_slot_early() {
    let clock = ManualClock::new(T0);
    let store = Arc::new(MemoryStateStore::with_clock(Arc::new(clock.clone())));
    let punctual = semaphore(&store, Arc::new(clock.clone()));
    let lagging = semaphore(&store, Arc::new(clock.skewed(-5_000)));

    let early = lagging
        .acquire_simple("simple", 1, TIMEOUT)
        .await
        .unwrap()
        .expect("lagging host admitted to an empty semaphore");
    assert!(
        punctual.acquire_simple("simple", 1, TIMEOUT).await.unwrap().is_none(),
        "live holder blocks the punctual host"
    );

    // Six seconds in, the lagging entry already looks eleven seconds old.
    clock.advance(Duration::from_secs(6));
    let late = punctual.acquire_simple("simple", 1, TIMEOUT).await.unwrap();
    assert!(late.is_some(), "skew evicts the lagging holder early");
    assert!(!lagging.release_simple("simple", &early).await.unwrap());
}

#[tokio::test]
async fn fair_order_ignores_lagging_clock() {
    let clock = ManualClock::new(T0);
    let store = Arc::new(MemoryStateStore::with_clock(Arc::new(clock.clone())));
    let punctual = semaphore(&store, Arc::new(clock.clone()));
    let lagging = semaphore(&store, Arc::new(clock.skewed(-5_000)));

    punctual
        .acquire_fair("fair", 1, TIMEOUT)
        .await
        .unwrap()
        .expect("punctual host admitted");
    let rejected = lagging.acquire_fair("fair", 1, TIMEOUT).await.unwrap();
    assert!(rejected.is_none(), "issuance order wins over timestamps");
    assert_eq!(punctual.holders("fair").await.unwrap(), 1);
}
