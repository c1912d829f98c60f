use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::foundation::error::{EaselError, EaselResult};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

struct Slot<T> {
    value: Option<T>,
    waiters: VecDeque<oneshot::Sender<T>>,
}

struct Shared<T> {
    id: u64,
    slot: Mutex<Slot<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // The slot holds no invariants a panicking holder could break mid-update.
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Give `value` to the oldest live waiter, or park it in the slot.
    fn hand_off(&self, mut value: T) {
        let mut slot = self.lock();
        while let Some(tx) = slot.waiters.pop_front() {
            match tx.send(value) {
                Ok(()) => return,
                // Waiter gave up; try the next one.
                Err(v) => value = v,
            }
        }
        slot.value = Some(value);
    }
}

/// Single-slot async mutex with FIFO hand-off and explicit release.
///
/// Cloning yields another handle to the same resource.
pub struct AtomicResource<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AtomicResource<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for AtomicResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.shared.lock();
        f.debug_struct("AtomicResource")
            .field("id", &self.shared.id)
            .field("held", &slot.value.is_none())
            .field("waiters", &slot.waiters.len())
            .finish()
    }
}

impl<T> AtomicResource<T> {
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
                slot: Mutex::new(Slot {
                    value: Some(value),
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// `true` while some lease is outstanding.
    pub fn is_held(&self) -> bool {
        self.shared.lock().value.is_none()
    }

    pub fn waiters(&self) -> usize {
        self.shared.lock().waiters.len()
    }

    /// Wait for exclusive access. Waiters are served in call order.
    pub async fn acquire(&self) -> EaselResult<AtomicLease<T>> {
        let rx = {
            let mut slot = self.shared.lock();
            if let Some(value) = slot.value.take() {
                return Ok(self.lease(value));
            }
            let (tx, rx) = oneshot::channel();
            slot.waiters.push_back(tx);
            rx
        };
        let mut pending = PendingAcquire {
            shared: &self.shared,
            rx: Some(rx),
        };
        let rx = pending
            .rx
            .as_mut()
            .ok_or_else(|| EaselError::invariant("acquire polled after completion"))?;
        let value = rx.await.map_err(|_| {
            EaselError::invariant("atomic resource dropped its value while a waiter was queued")
        })?;
        pending.rx = None;
        Ok(self.lease(value))
    }

    /// Non-blocking acquire; `None` if the resource is held.
    pub fn try_acquire(&self) -> Option<AtomicLease<T>> {
        let value = self.shared.lock().value.take()?;
        Some(self.lease(value))
    }

    /// Hand the value back and wake the next waiter.
    ///
    /// Releasing a lease granted by a different resource is an error; the lease is returned to
    /// its own resource in that case.
    pub fn release(&self, mut lease: AtomicLease<T>) -> EaselResult<()> {
        if !Arc::ptr_eq(&lease.shared, &self.shared) {
            return Err(EaselError::invariant(format!(
                "release of a lease from atomic resource #{} into #{}",
                lease.shared.id, self.shared.id
            )));
        }
        let value = lease
            .value
            .take()
            .ok_or_else(|| EaselError::invariant("atomic lease already released"))?;
        self.shared.hand_off(value);
        Ok(())
    }

    fn lease(&self, value: T) -> AtomicLease<T> {
        AtomicLease {
            shared: Arc::clone(&self.shared),
            value: Some(value),
        }
    }
}

/// Dropped before completion: close the channel, and pass on a value that raced in.
struct PendingAcquire<'a, T> {
    shared: &'a Arc<Shared<T>>,
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> Drop for PendingAcquire<'_, T> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(value) = rx.try_recv() {
                self.shared.hand_off(value);
            }
        }
    }
}

/// Exclusive access to an [`AtomicResource`]'s value.
///
/// Prefer [`AtomicResource::release`]; dropping the lease also hands the value on.
pub struct AtomicLease<T> {
    shared: Arc<Shared<T>>,
    value: Option<T>,
}

impl<T> AtomicLease<T> {
    /// Id of the resource that granted this lease.
    pub fn resource_id(&self) -> u64 {
        self.shared.id
    }
}

impl<T> Deref for AtomicLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(v) => v,
            None => unreachable!("lease value is only taken when the lease is consumed"),
        }
    }
}

impl<T> DerefMut for AtomicLease<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(v) => v,
            None => unreachable!("lease value is only taken when the lease is consumed"),
        }
    }
}

impl<T> Drop for AtomicLease<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            tracing::debug!(resource = self.shared.id, "atomic lease dropped without release");
            self.shared.hand_off(value);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/atomic_resource.rs"]
mod tests;
