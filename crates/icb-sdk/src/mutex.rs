//! Scoped acquisition over a counting permit pool.
//!
//! [`ScopedMutex::acquire`] waits without spinning until a permit is free and
//! hands back a [`ScopedGuard`]. The permit goes back to the pool when the
//! guard is dropped, whichever way the scope is left: normal return, `?`,
//! panic unwinding or the owning task being cancelled. Dropping the `acquire`
//! future before it resolves takes nothing from the pool.
//!
//! There is no timeout here; wrap `acquire` in `tokio::time::timeout` when a
//! bound is needed.

use crate::error::{Result, SdkError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

/// A counting mutex. With a capacity of one it serializes its critical
/// sections.
#[derive(Clone, Debug)]
pub struct ScopedMutex {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of a held permit. Dropping it releases the permit.
#[derive(Debug)]
#[must_use = "the permit is released as soon as the guard is dropped"]
pub struct ScopedGuard {
    _permit: OwnedSemaphorePermit,
}

impl ScopedMutex {
    /// Create a pool of `capacity` permits. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// A single-permit mutex.
    pub fn exclusive() -> Self {
        Self::new(1)
    }

    /// Wait for a permit.
    pub async fn acquire(&self) -> Result<ScopedGuard> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SdkError::Closed)?;

        trace!(available = self.semaphore.available_permits(), "permit acquired");
        Ok(ScopedGuard { _permit: permit })
    }

    /// Take a permit if one is free right now.
    ///
    /// Returns `Ok(None)` when every permit is out.
    pub fn try_acquire(&self) -> Result<Option<ScopedGuard>> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(Some(ScopedGuard { _permit: permit })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(SdkError::Closed),
        }
    }

    /// Run `fut` while holding a permit.
    pub async fn with_permit<F, R>(&self, fut: F) -> Result<R>
    where
        F: Future<Output = R>,
    {
        let _guard = self.acquire().await?;
        Ok(fut.await)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fail every pending and future `acquire` with [`SdkError::Closed`].
    /// Guards already handed out stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for ScopedMutex {
    fn default() -> Self {
        Self::exclusive()
    }
}
