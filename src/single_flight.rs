//! Per-key coalescing of in-flight async computations
//!
//! The first caller to miss both tiers for a key becomes the leader and runs
//! the factory; callers arriving while it runs wait on a watch channel and
//! receive the leader's result instead of computing their own.

use parking_lot::Mutex;
use std::{any::Any, collections::HashMap, sync::Arc};
use tokio::sync::watch;

use crate::CacheError;

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

type Outcome = Option<Result<ErasedValue, String>>;
type InFlightMap = Arc<Mutex<HashMap<String, watch::Receiver<Outcome>>>>;

#[derive(Clone, Default)]
pub(crate) struct SingleFlight {
    in_flight: InFlightMap,
}

pub(crate) enum Flight {
    /// This caller computes and must complete the guard.
    Leader(InFlightGuard),
    /// Another caller is computing; wait for its outcome.
    Follower(InFlightWaiter),
}

impl SingleFlight {
    pub(crate) fn join(&self, key: &str) -> Flight {
        let mut in_flight = self.in_flight.lock();
        if let Some(rx) = in_flight.get(key) {
            return Flight::Follower(InFlightWaiter { rx: rx.clone() });
        }
        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.to_owned(), rx);
        Flight::Leader(InFlightGuard {
            key: key.to_owned(),
            in_flight: Arc::clone(&self.in_flight),
            tx: Some(tx),
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Removes the in-flight entry when dropped and, if the leader never
/// completed (panic or cancellation), fails the waiters.
pub(crate) struct InFlightGuard {
    key: String,
    in_flight: InFlightMap,
    tx: Option<watch::Sender<Outcome>>,
}

impl InFlightGuard {
    pub(crate) fn complete(mut self, result: Result<ErasedValue, String>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(result));
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(Err("computation was cancelled or panicked".to_owned())));
        }
        self.in_flight.lock().remove(&self.key);
    }
}

pub(crate) struct InFlightWaiter {
    rx: watch::Receiver<Outcome>,
}

impl InFlightWaiter {
    /// Wait for the leader's outcome and take a typed copy of its value.
    pub(crate) async fn wait<T>(mut self) -> Result<T, CacheError>
    where
        T: Clone + Send + Sync + 'static,
    {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().as_ref() {
                return match outcome {
                    Ok(value) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                        CacheError::backend("in-flight value has a different type")
                    }),
                    Err(e) => Err(CacheError::backend(e.clone())),
                };
            }
            if self.rx.changed().await.is_err() {
                return Err(CacheError::backend("in-flight computation was dropped"));
            }
        }
    }
}
