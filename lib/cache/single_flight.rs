//! Per-key deduplication of in-flight async work.
//!
//! Given a key and a future, [`SingleFlight`] ensures at most one such future runs per key at any
//! instant. Callers arriving while a flight is running await the same [`Shared`] outcome instead
//! of starting their own. Once the work settles, its entry is removed before the outcome becomes
//! observable, so the next caller always starts a fresh flight.
//!
//! Outcomes are not memoized here. Long-lived values belong in a separate store.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt as _;
use futures::future::Shared;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

/// Why a flight finished without producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The work panicked. The panic is contained in the task running the flight.
    Panicked,
    /// The flight was aborted through [`SingleFlight::cancel`].
    Cancelled,
}

type SharedFut<V> = Shared<Pin<Box<dyn Future<Output = Result<V, Interrupted>> + Send>>>;

/// A registered in-flight operation.
///
/// `id` distinguishes successive flights for the same key, so a settling flight never removes a
/// newer one registered after a cancellation.
struct Flight<V> {
    id: u64,
    outcome: SharedFut<V>,
    abort: AbortHandle,
}

type FlightMap<K, V> = scc::HashMap<K, Flight<V>>;

/// Single-flight table keyed by `K`, yielding clones of `V` to every joined caller.
///
/// Work runs on a spawned tokio task. Dropping the future returned by [`run`](Self::run) detaches
/// that caller only; the work keeps running for any other caller and settles on its own.
pub struct SingleFlight<K, V> {
    flights: Arc<FlightMap<K, V>>,
    next_id: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(scc::HashMap::default()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Run `work` for `key`, or join the flight already running for it.
    ///
    /// `work` is only invoked when no live flight exists for `key`. Checking for an existing flight
    /// and registering a new one happen under the same map entry lock, so two callers can never
    /// both start work for one key.
    ///
    /// A registered flight whose task is already finished was dropped by its runtime before it
    /// ever ran (runtime shutdown, or an abandoned caller on a current-thread runtime). Such a
    /// flight never removes itself, so it is replaced here instead of joined.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<V, Interrupted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let outcome = match self.flights.entry_async(key.clone()).await {
            scc::hash_map::Entry::Occupied(mut occ) => {
                if occ.get().abort.is_finished() {
                    debug!(?key, "replacing flight whose task never ran");
                    let flight = self.launch(key, work());
                    let outcome = flight.outcome.clone();
                    *occ.get_mut() = flight;
                    outcome
                } else {
                    trace!(?key, "joining in-flight operation");
                    occ.get().outcome.clone()
                }
            }
            scc::hash_map::Entry::Vacant(vac) => {
                let flight = self.launch(key, work());
                let outcome = flight.outcome.clone();
                vac.insert_entry(flight);
                outcome
            }
        };

        outcome.await
    }

    /// Spawn `fut` as a new flight for `key`. The caller registers the returned flight.
    fn launch<Fut>(&self, key: K, fut: Fut) -> Flight<V>
    where
        Fut: Future<Output = V> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let flights = Arc::clone(&self.flights);
        let panicked_key = key.clone();
        let handle = tokio::spawn(async move {
            // Constructed on first poll: the guard must never drop on the thread that still
            // holds the map entry the flight is being registered under.
            let _guard = FlightGuard { flights, key, id };
            fut.await
        });
        let abort = handle.abort_handle();
        // `Shared` polls this mapping once, so each panic is logged once however many callers
        // joined.
        let outcome = handle
            .map(move |joined| {
                joined.map_err(|e| {
                    if e.is_panic() {
                        warn!(key = ?panicked_key, "in-flight operation panicked");
                        Interrupted::Panicked
                    } else {
                        Interrupted::Cancelled
                    }
                })
            })
            .boxed()
            .shared();
        Flight { id, outcome, abort }
    }

    /// Abort the flight running for `key`, if any.
    ///
    /// The entry is removed first, so a subsequent [`run`](Self::run) starts fresh while every
    /// caller joined to the aborted flight receives [`Interrupted::Cancelled`].
    ///
    /// Aborting only takes effect at the task's next yield point. A task that is in its final
    /// poll on another worker when `cancel` is called still completes, and its joined callers
    /// receive its value even though `cancel` returned `true`. A `run` issued after `cancel`
    /// never joins the aborted flight, so for a short while the old task and a fresh one may
    /// both be running for the same key.
    pub fn cancel(&self, key: &K) -> bool {
        match self.flights.remove_sync(key) {
            Some((_, flight)) => {
                flight.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a flight is currently registered for `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.flights.read_sync(key, |_, _| ()).is_some()
    }

    /// Returns the number of flights currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Returns `true` if no flight is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Removes a flight's entry when its task finishes, panics or is aborted.
///
/// Runs inside the task, so removal always precedes the task's output becoming visible through
/// the [`Shared`] outcome.
struct FlightGuard<K, V>
where
    K: Eq + Hash,
{
    flights: Arc<FlightMap<K, V>>,
    key: K,
    id: u64,
}

impl<K, V> Drop for FlightGuard<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let id = self.id;
        drop(self.flights.remove_if_sync(&self.key, |flight| flight.id == id));
    }
}
