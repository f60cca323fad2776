use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tracing::trace;

/// Priority-biased mutual exclusion.
///
/// Two entry points share one critical section:
/// - [`lock_priority`](Self::lock_priority) for short, latency sensitive holders
///   (the enqueue path),
/// - [`lock`](Self::lock) for everyone else (the drain path).
///
/// While priority acquirers are outstanding, a normal acquirer yields its
/// scheduling turn once before queueing on the mutex. This is a bias, not an
/// ordering guarantee: starvation of priority holders is reduced, not ruled out.
#[derive(Debug, Default)]
pub struct PriorityMutex<T> {
    inner: Mutex<T>,
    priority_holders: AtomicUsize,
}

/// Guard returned by [`PriorityMutex::lock_priority`].
///
/// Field order matters: the mutex guard is dropped first, then the holder
/// count is decremented.
pub struct PriorityGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _holder: HolderToken<'a>,
}

struct HolderToken<'a>(&'a AtomicUsize);

impl<'a> HolderToken<'a> {
    fn register(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for HolderToken<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T> PriorityMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            priority_holders: AtomicUsize::new(0),
        }
    }

    /// Acquires the lock through the priority entry.
    ///
    /// The caller counts as a priority holder from the moment this is called
    /// until the returned guard is dropped, including while it waits.
    /// Cancelling the returned future releases the registration.
    pub async fn lock_priority(&self) -> PriorityGuard<'_, T> {
        let holder = HolderToken::register(&self.priority_holders);
        let guard = self.inner.lock().await;
        PriorityGuard {
            guard,
            _holder: holder,
        }
    }

    /// Acquires the lock through the normal entry, yielding once first if any
    /// priority holder is outstanding.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        if self.priority_holders.load(Ordering::Acquire) > 0 {
            trace!("priority holders outstanding, yielding before lock");
            tokio::task::yield_now().await;
        }
        self.inner.lock().await
    }

    /// Number of priority acquirers currently waiting for or holding the lock.
    pub fn priority_holders(&self) -> usize {
        self.priority_holders.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> Deref for PriorityGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for PriorityGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
