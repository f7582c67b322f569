#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt as _;
use mache::cache::single_flight::{Interrupted, SingleFlight};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use common::wait_until;

#[tokio::test]
async fn run_returns_work_output() {
    let flights = SingleFlight::<u64, String>::default();
    let out = flights.run(1, || async { "hello".to_owned() }).await;
    assert_eq!(out.unwrap(), "hello");
    assert!(flights.is_empty(), "settled flight should be removed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_calls_share_one_execution() {
    let flights = Arc::new(SingleFlight::<u64, usize>::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let flights = Arc::clone(&flights);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            flights
                .run(7, move || async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    calls.fetch_add(1, Ordering::SeqCst)
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 0, "all callers see the first run");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "work should run exactly once");
}

#[tokio::test]
async fn sequential_calls_run_again() {
    let flights = SingleFlight::<u64, usize>::default();
    let calls = Arc::new(AtomicUsize::new(0));

    for expected in 0..3 {
        let calls = Arc::clone(&calls);
        let out = flights
            .run(1, move || async move { calls.fetch_add(1, Ordering::SeqCst) })
            .await;
        assert_eq!(out.unwrap(), expected, "outcomes must not be memoized");
    }
}

#[tokio::test]
async fn work_closure_not_invoked_when_joining() {
    let flights = SingleFlight::<u64, u32>::default();
    let invoked = AtomicUsize::new(0);

    let (a, b) = tokio::join!(
        flights.run(1, || {
            invoked.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                1
            }
        }),
        flights.run(1, || {
            invoked.fetch_add(1, Ordering::SeqCst);
            async { 2 }
        }),
    );

    assert_eq!(a.unwrap(), 1);
    assert_eq!(b.unwrap(), 1, "the joiner should get the leader's outcome");
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
}

fn explode() -> u32 {
    panic!("work exploded")
}

#[tokio::test]
async fn panic_is_reported_and_entry_removed() {
    let flights = SingleFlight::<u64, u32>::default();
    let out = flights.run(1, || async { explode() }).await;
    assert_eq!(out.unwrap_err(), Interrupted::Panicked);
    assert!(!flights.is_in_flight(&1), "panicked flight should be removed");

    let retry = flights.run(1, || async { 5 }).await;
    assert_eq!(retry.unwrap(), 5, "key should be usable after a panic");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_interrupts_waiters() {
    let flights = Arc::new(SingleFlight::<u64, u32>::default());

    let waiter = {
        let flights = Arc::clone(&flights);
        tokio::spawn(async move {
            flights
                .run(1, || async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    1
                })
                .await
        })
    };
    wait_until(|| flights.is_in_flight(&1)).await;

    assert!(flights.cancel(&1));
    assert!(!flights.cancel(&1), "second cancel finds nothing");
    assert_eq!(waiter.await.unwrap().unwrap_err(), Interrupted::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_flight_does_not_remove_its_successor() {
    let flights = Arc::new(SingleFlight::<u64, u32>::default());

    let first = {
        let flights = Arc::clone(&flights);
        tokio::spawn(async move {
            flights
                .run(1, || async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    1
                })
                .await
        })
    };
    wait_until(|| flights.is_in_flight(&1)).await;
    assert!(flights.cancel(&1));

    let second = {
        let flights = Arc::clone(&flights);
        tokio::spawn(async move {
            flights
                .run(1, || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    2
                })
                .await
        })
    };
    wait_until(|| flights.is_in_flight(&1)).await;

    assert_eq!(first.await.unwrap().unwrap_err(), Interrupted::Cancelled);
    assert!(
        flights.is_in_flight(&1),
        "the aborted flight must not evict the newer one"
    );
    assert_eq!(second.await.unwrap().unwrap(), 2);
    assert!(flights.is_empty());
}

#[tokio::test]
async fn cancel_unknown_key_returns_false() {
    let flights = SingleFlight::<u64, u32>::default();
    assert!(!flights.cancel(&42));
    assert_eq!(flights.len(), 0);
}

#[test]
fn flight_dropped_before_it_ran_is_replaced() {
    let flights = SingleFlight::<u64, u32>::default();

    let first = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    first.block_on(async {
        // One poll registers the flight; the spawned task cannot run while this thread is busy.
        let abandoned = flights.run(1, || async { 1 }).now_or_never();
        assert!(abandoned.is_none());
    });
    drop(first);
    assert!(
        flights.is_in_flight(&1),
        "the unpolled flight is still registered"
    );

    let second = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    for expected in [2, 3] {
        let out = second.block_on(flights.run(1, move || async move { expected }));
        assert_eq!(out.unwrap(), expected, "a dead flight must not be joined");
    }
    assert!(flights.is_empty());
}

struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn panic_is_logged_once_for_all_joined_callers() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let _subscriber = tracing_subscriber::registry()
        .with(WarnCounter(Arc::clone(&warnings)))
        .set_default();

    let flights = SingleFlight::<u64, u32>::default();
    let slow_panic = || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        explode()
    };
    let (a, b, c) = tokio::join!(
        flights.run(1, slow_panic),
        flights.run(1, slow_panic),
        flights.run(1, slow_panic),
    );

    for out in [a, b, c] {
        assert_eq!(out.unwrap_err(), Interrupted::Panicked);
    }
    assert_eq!(warnings.load(Ordering::SeqCst), 1, "one panic, one warning");
}
