//! Single-flight request coalescing
//!
//! Concurrent callers asking for the same key share one in-flight future
//! and all receive a clone of its output. Once it resolves the key is
//! forgotten, so the next call starts fresh. When every waiter gives up
//! before it resolves, the flight is dropped along with whatever it holds.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

struct Flight<V> {
    generation: u64,
    waiters: usize,
    future: Shared<BoxFuture<'static, V>>,
}

/// Register of in-flight computations keyed by `K`
pub struct SingleFlight<K, V>
where
    V: Clone,
{
    inflight: Mutex<HashMap<K, Flight<V>>>,
    generation: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V>
where
    V: Clone,
{
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, starting it with `make` if there is none.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (generation, future) = {
            let mut inflight = self.inflight.lock();
            match inflight.get_mut(&key) {
                Some(flight) => {
                    flight.waiters += 1;
                    (flight.generation, flight.future.clone())
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let future = make().boxed().shared();
                    inflight.insert(
                        key.clone(),
                        Flight {
                            generation,
                            waiters: 1,
                            future: future.clone(),
                        },
                    );
                    (generation, future)
                }
            }
        };
        let waiter = Waiter {
            flights: self,
            key,
            generation,
            resolved: false,
        };

        let output = future.await;
        waiter.finish();
        output
    }

    /// Number of keys with a flight in progress
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Membership of one caller in a flight. Dropping it unresolved gives up
/// the caller's interest; the last one out removes the flight.
struct Waiter<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    flights: &'a SingleFlight<K, V>,
    key: K,
    generation: u64,
    resolved: bool,
}

impl<K, V> Waiter<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    /// The shared output is ready, so later callers must start over
    fn finish(mut self) {
        self.resolved = true;
    }
}

impl<K, V> Drop for Waiter<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let removed = {
            let mut inflight = self.flights.inflight.lock();
            // A newer flight for the same key may already be registered
            let Some(flight) = inflight.get_mut(&self.key) else {
                return;
            };
            if flight.generation != self.generation {
                return;
            }
            flight.waiters = flight.waiters.saturating_sub(1);
            if self.resolved || flight.waiters == 0 {
                inflight.remove(&self.key)
            } else {
                None
            }
        };
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_flight() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run("artist - track".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn sequential_calls_run_again() {
        let flights: SingleFlight<&'static str, usize> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for expected in 1..=3 {
            let calls = calls.clone();
            let got = flights
                .run("k", move || async move { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(got, expected);
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn abandoned_flight_is_dropped() {
        let flights: SingleFlight<&'static str, u32> = SingleFlight::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));

        let flag = DropFlag(dropped.clone());
        let counter = calls.clone();
        let stalled = flights.run("k", move || async move {
            let _flag = flag;
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<u32>().await
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), stalled)
            .await
            .is_err());

        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(flights.in_flight(), 0);

        let counter = calls.clone();
        let got = flights
            .run("k", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                7
            })
            .await;
        assert_eq!(got, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn flight_survives_while_someone_still_waits() {
        let flights: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(60)).await;
                5
            }
        };

        let keeper = {
            let flights = flights.clone();
            let make = make(calls.clone());
            tokio::spawn(async move { flights.run("k", make).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let quitter = flights.run("k", make(calls.clone()));
        assert!(tokio::time::timeout(Duration::from_millis(10), quitter)
            .await
            .is_err());
        assert_eq!(flights.in_flight(), 1);

        assert_eq!(keeper.await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flights.run(1, || async { 10 }),
            flights.run(2, || async { 20 })
        );
        assert_eq!((a, b), (10, 20));
    }
}
