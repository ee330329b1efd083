//! Recycling object pool for frame buffers.
//!
//! An acquisition session allocates a fixed number of frame-sized buffers once,
//! at `start()`, and then cycles them between the acquisition task and the
//! consumer. Nothing is allocated per frame.
//!
//! # Ownership Model
//!
//! The pool owns idle items in a lock-free queue. Acquiring an item moves it
//! out of the queue into a [`Loaned<T>`] guard, which owns it exclusively until
//! it is dropped. Dropping the guard runs the optional reset function and
//! pushes the item back.
//!
//! 1. `Semaphore` counts idle items (permits = items in the queue)
//! 2. `SegQueue` holds the idle items themselves
//! 3. `Loaned` owns its item, so access never takes a lock
//!
//! Because items are moved rather than shared, a buffer can only ever be
//! reachable from one place at a time.
//!
//! # Example
//!
//! ```
//! use unicam_pool::Pool;
//!
//! # tokio_test::block_on(async {
//! // Four 1 MiB frame buffers
//! let pool = Pool::new_with_reset(4, || vec![0u8; 1 << 20], |buf| buf.fill(0));
//!
//! let mut frame = pool.acquire().await.unwrap();
//! frame[0] = 42;
//! assert_eq!(pool.available(), 3);
//!
//! // Returned to the pool when dropped
//! drop(frame);
//! assert_eq!(pool.available(), 4);
//! # });
//! ```

use crossbeam_queue::SegQueue;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// Reset function applied to an item when it returns to the pool.
type ResetFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Fixed-size pool of pre-allocated items.
///
/// The pool never grows. When it is exhausted, [`Pool::try_acquire`] returns
/// `None` and the caller decides what to do (the acquisition engine counts a
/// dropped frame).
pub struct Pool<T> {
    /// Idle items
    free: SegQueue<T>,
    /// One permit per idle item
    semaphore: Semaphore,
    /// Optional reset applied on return
    reset_fn: Option<ResetFn<T>>,
    /// Number of items owned by this pool
    size: usize,
    /// Number of non-blocking acquires that found the pool empty
    misses: AtomicU64,
}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool of `size` items built by `factory`.
    ///
    /// A `size` of 0 is raised to 1 so the pool is always usable.
    pub fn new<F, R>(size: usize, factory: F, reset: Option<R>) -> Arc<Self>
    where
        F: Fn() -> T,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        let size = if size == 0 {
            warn!("pool size 0 requested, using 1");
            1
        } else {
            size
        };

        let free = SegQueue::new();
        for _ in 0..size {
            free.push(factory());
        }

        Arc::new(Self {
            free,
            semaphore: Semaphore::new(size),
            reset_fn: reset.map(|f| Box::new(f) as ResetFn<T>),
            size,
            misses: AtomicU64::new(0),
        })
    }

    /// Create a pool without a reset function.
    pub fn new_simple<F>(size: usize, factory: F) -> Arc<Self>
    where
        F: Fn() -> T,
    {
        Self::new(size, factory, None::<fn(&mut T)>)
    }

    /// Create a pool with a reset function.
    pub fn new_with_reset<F, R>(size: usize, factory: F, reset: R) -> Arc<Self>
    where
        F: Fn() -> T,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::new(size, factory, Some(reset))
    }

    /// Acquire an item, waiting until one is returned.
    ///
    /// Returns `None` only after [`Pool::close`].
    pub async fn acquire(self: &Arc<Self>) -> Option<Loaned<T>> {
        let permit = self.semaphore.acquire().await.ok()?;
        permit.forget();
        self.take_item()
    }

    /// Acquire an item without waiting.
    ///
    /// Returns `None` if every item is currently on loan.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<Loaned<T>> {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.take_item()
            }
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Acquire an item, waiting at most `timeout`.
    pub async fn try_acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<Loaned<T>> {
        let permit = match tokio::time::timeout(timeout, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return None,
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    size = self.size,
                    "pool acquire timed out, all buffers on loan"
                );
                return None;
            }
        };
        permit.forget();
        self.take_item()
    }

    /// Close the pool: pending and future `acquire` calls return `None`.
    ///
    /// Items already on loan are still returned normally.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn take_item(self: &Arc<Self>) -> Option<Loaned<T>> {
        match self.free.pop() {
            Some(item) => Some(Loaned {
                pool: Arc::clone(self),
                item: ManuallyDrop::new(item),
            }),
            None => {
                // permit without an item: give the permit back
                self.semaphore.add_permits(1);
                error!(size = self.size, "pool permit granted with no idle item");
                None
            }
        }
    }

    fn release(&self, mut item: T) {
        if let Some(reset) = &self.reset_fn {
            reset(&mut item);
        }
        self.free.push(item);
        self.semaphore.add_permits(1);
    }

    /// Number of items owned by the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of idle items.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of items currently on loan.
    #[must_use]
    pub fn on_loan(&self) -> usize {
        self.size.saturating_sub(self.available())
    }

    /// Number of non-blocking acquires that found the pool exhausted.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size)
            .field("available", &self.semaphore.available_permits())
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// RAII guard owning one pooled item.
///
/// Dereferences to the item. The item goes back to its pool on drop.
pub struct Loaned<T: Send + 'static> {
    pool: Arc<Pool<T>>,
    item: ManuallyDrop<T>,
}

impl<T: Send + 'static> Loaned<T> {
    /// The pool this item belongs to.
    #[must_use]
    pub fn pool(&self) -> &Arc<Pool<T>> {
        &self.pool
    }
}

impl<T: Clone + Send + 'static> Loaned<T> {
    /// Copy the item out and return the slot to the pool immediately.
    #[must_use]
    pub fn clone_item(self) -> T {
        (*self.item).clone()
    }
}

impl<T: Send + 'static> Deref for Loaned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

impl<T: Send + 'static> DerefMut for Loaned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.item
    }
}

impl<T: Send + std::fmt::Debug + 'static> std::fmt::Debug for Loaned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Loaned").field(&*self.item).finish()
    }
}

impl<T: Send + 'static> Drop for Loaned<T> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // SAFETY: `item` is taken exactly once, here, and never touched again.
        let item = unsafe { ManuallyDrop::take(&mut self.item) };
        self.pool.release(item);
    }
}
