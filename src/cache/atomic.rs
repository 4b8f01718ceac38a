//! An atomically swappable, epoch-protected `Arc<T>` slot.
//!
//! This is the publication primitive behind every lock-free read the cache
//! performs: table pointers, bucket heads and entry value slots are all
//! [`AtomicArc`]s. Readers load the slot without taking any lock; writers
//! (serialized by the segment lock) swap it and hand the displaced reference
//! count to the epoch collector, which releases it only after every reader
//! that could still observe the old pointer has unpinned.
//!
//! The role this plays is exactly the one a tracing garbage collector plays
//! in designs that mutate shared pointers under readers: a reader that loses
//! the race against a writer still holds a pointer to memory that is
//! guaranteed to outlive its critical section.
//!
//! # Protocol
//!
//! - The slot stores a raw pointer obtained from `Arc::into_raw`, holding
//!   one strong count on behalf of the slot itself.
//! - `load` pins the current epoch, reads the pointer with `Acquire`, and
//!   acquires an additional strong count before unpinning. The count cannot
//!   hit zero in between: any release of the slot's count is deferred past
//!   the pin.
//! - `store`/`swap` publish the new pointer with `Release` and defer the
//!   release of the displaced count.

use core::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crossbeam::epoch::Guard;

/// An `Arc<T>` slot that can be read lock-free and swapped under a lock.
pub(crate) struct AtomicArc<T> {
    ptr: AtomicPtr<T>,
}

impl<T: Send + Sync> AtomicArc<T> {
    /// Creates an empty slot.
    pub(crate) fn empty() -> Self {
        AtomicArc {
            ptr: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Creates a slot holding `value`.
    pub(crate) fn new(value: Arc<T>) -> Self {
        AtomicArc {
            ptr: AtomicPtr::new(Arc::into_raw(value).cast_mut()),
        }
    }

    /// Returns `true` if the slot currently holds no value.
    pub(crate) fn is_empty(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }

    /// Loads the current value without locking.
    ///
    /// The returned `Arc` owns its own strong count and stays valid after
    /// `guard` is dropped.
    pub(crate) fn load(&self, guard: &Guard) -> Option<Arc<T>> {
        let raw = self.ptr.load(Ordering::Acquire);
        if raw.is_null() {
            return None;
        }
        // Tie the read to the pin; the pointer may not outlive the guard
        // without the count acquired below.
        let _ = guard;
        // SAFETY: `raw` came from `Arc::into_raw`. The slot's strong count is
        // only released through `defer_release`, which runs after every
        // currently pinned guard (including ours) has been dropped, so the
        // allocation is live and the increment is sound.
        unsafe {
            Arc::increment_strong_count(raw);
            Some(Arc::from_raw(raw))
        }
    }

    /// Replaces the slot's value, deferring the release of the displaced
    /// reference count past all active pins.
    ///
    /// Callers must serialize stores to the same slot (the cache does so via
    /// the segment lock); concurrent `load`s remain safe.
    pub(crate) fn store(&self, value: Option<Arc<T>>, guard: &Guard) {
        let new = match value {
            Some(arc) => Arc::into_raw(arc).cast_mut(),
            None => core::ptr::null_mut(),
        };
        let old = self.ptr.swap(new, Ordering::AcqRel);
        defer_release(old, guard);
    }

    /// Replaces the slot's value and returns the previous one.
    ///
    /// The returned `Arc` carries its own strong count; the count the slot
    /// held is still released through the epoch collector because a
    /// concurrent reader may be about to acquire from the old pointer.
    pub(crate) fn swap(&self, value: Option<Arc<T>>, guard: &Guard) -> Option<Arc<T>> {
        let new = match value {
            Some(arc) => Arc::into_raw(arc).cast_mut(),
            None => core::ptr::null_mut(),
        };
        let old = self.ptr.swap(new, Ordering::AcqRel);
        if old.is_null() {
            return None;
        }
        // SAFETY: as in `load`, the slot's count on `old` is released only
        // after all active pins, so the allocation is live.
        let previous = unsafe {
            Arc::increment_strong_count(old);
            Arc::from_raw(old)
        };
        defer_release(old, guard);
        Some(previous)
    }
}

/// Schedules the release of a slot-owned strong count.
fn defer_release<T: Send + Sync>(raw: *mut T, guard: &Guard) {
    if raw.is_null() {
        return;
    }
    let raw = raw.cast_const();
    // SAFETY: `raw` came from `Arc::into_raw` and the closure releases the
    // one strong count the slot held. The epoch collector runs it after all
    // guards pinned at the time of the swap have been dropped, so no reader
    // can acquire from `raw` afterwards. `T: Send + Sync` makes the deferred
    // drop safe on whichever thread flushes the collector.
    unsafe {
        guard.defer_unchecked(move || drop(Arc::from_raw(raw)));
    }
}

impl<T> Drop for AtomicArc<T> {
    fn drop(&mut self) {
        let raw = *self.ptr.get_mut();
        if !raw.is_null() {
            // SAFETY: exclusive access at drop; the slot's own containers are
            // themselves reclaimed through the epoch collector, so no reader
            // can reach this slot anymore. Releasing the count directly is
            // sound.
            unsafe { drop(Arc::from_raw(raw)) }
        }
    }
}

impl<T: Send + Sync> Default for AtomicArc<T> {
    fn default() -> Self {
        AtomicArc::empty()
    }
}

impl<T: Send + Sync> core::fmt::Debug for AtomicArc<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AtomicArc")
            .field("empty", &self.is_empty())
            .finish()
    }
}

// SAFETY: the slot behaves like an `Arc<T>` with atomic replacement; it
// hands out owned clones and never exposes `&mut T`.
unsafe impl<T: Send + Sync> Send for AtomicArc<T> {}
// SAFETY: see above; all shared-access mutation goes through atomics.
unsafe impl<T: Send + Sync> Sync for AtomicArc<T> {}
