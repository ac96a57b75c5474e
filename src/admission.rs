//! Bounded-concurrency gate in front of the classifier.
//!
//! Every classifier call is admitted through a fair (FIFO) semaphore of `N`
//! permits and then executed on tokio's blocking pool. The permit travels
//! into the blocking job, so it is released when the work really ends: on
//! success, on error, on panic, and even after the waiting request has given
//! up on a timeout. Callers above the bound wait; nobody is rejected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::error::ClassifierError;
use crate::metrics::{CLASSIFIER_ERRORS, CLASSIFIER_IN_FLIGHT};

pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    timeout: Option<Duration>,
}

impl AdmissionController {
    pub fn new(capacity: usize, timeout: Option<Duration>) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a permit. Dropping the permit releases it.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ClassifierError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ClassifierError::Closed)
    }

    /// Runs `job` on the blocking pool once a permit is available.
    pub async fn run<F, T>(&self, job: F) -> Result<T, ClassifierError>
    where
        F: FnOnce() -> Result<T, ClassifierError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _in_flight = InFlight::enter();
            job()
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        ?limit,
                        "classifier call timed out, leaving it to finish in the background"
                    );
                    CLASSIFIER_ERRORS.inc();
                    return Err(ClassifierError::Timeout(limit));
                }
            },
            None => handle.await,
        };

        let result = joined.map_err(|e| ClassifierError::Worker(e.to_string())).and_then(|r| r);
        if result.is_err() {
            CLASSIFIER_ERRORS.inc();
        }
        result
    }
}

// Keeps the in-flight gauge honest when a job panics
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        CLASSIFIER_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        CLASSIFIER_IN_FLIGHT.dec();
    }
}
