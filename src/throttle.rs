//! Byte budget for outstanding append data.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, Semaphore};

/// A counting permit pool bounding the number of appended bytes that have been handed to the transport but not yet
/// written.
///
/// Permits are acquired by the producer after its write was scheduled and released by the write's completion
/// listener, so the two sides never share a guard object. Acquired permits are forgotten, and [`release`] adds the
/// same count back.
///
/// A producer may stop waiting before it obtained its permits, for example when its future is dropped by a timeout,
/// while the write it scheduled still completes and releases. Bytes of such abandoned waits are recorded as owed,
/// and [`release`] settles that debt before handing permits back, so the budget never grows past its capacity.
///
/// [`release`]: BackpressureGate::release
#[derive(Debug)]
pub struct BackpressureGate {
    permits: Semaphore,
    owed: AtomicUsize,
    capacity: usize,
}

impl BackpressureGate {
    /// Creates a gate allowing `capacity` outstanding bytes.
    pub fn new(capacity: usize) -> Self {
        BackpressureGate {
            permits: Semaphore::new(capacity.min(Semaphore::MAX_PERMITS)),
            owed: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Waits until `bytes` permits are available and takes them.
    ///
    /// Requests larger than the capacity are satisfied once enough permits have been released by completed writes.
    /// Fails only if the gate was [closed](BackpressureGate::close).
    ///
    /// Cancel safe: if the returned future is dropped before the permits were taken, the bytes are owed and deducted
    /// from the next releases.
    pub async fn acquire(&self, bytes: usize) -> Result<(), AcquireError> {
        let mut pending = PendingAcquire {
            gate: self,
            permits: permits_for(bytes),
        };
        let permit = self.permits.acquire_many(pending.permits).await?;
        permit.forget();
        pending.permits = 0;
        Ok(())
    }

    /// Returns `bytes` permits to the gate, waking producers waiting for them.
    ///
    /// Bytes owed by abandoned waits are settled first.
    pub fn release(&self, bytes: usize) {
        let mut permits = permits_for(bytes) as usize;
        if permits == 0 {
            return;
        }

        let mut owed = self.owed.load(Ordering::Acquire);
        while owed > 0 {
            let settled = owed.min(permits);
            match self.owed.compare_exchange_weak(
                owed,
                owed - settled,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    permits -= settled;
                    break;
                }
                Err(current) => owed = current,
            }
        }

        if permits > 0 {
            self.permits.add_permits(permits);
        }
    }

    /// Number of permits currently available.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Bytes still owed by producers that stopped waiting before they obtained their permits.
    pub fn owed(&self) -> usize {
        self.owed.load(Ordering::Acquire)
    }

    /// The configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Closes the gate, failing every pending and future [`acquire`](BackpressureGate::acquire).
    pub fn close(&self) {
        self.permits.close();
    }

    /// Returns `true` once the gate was closed.
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

struct PendingAcquire<'a> {
    gate: &'a BackpressureGate,
    permits: u32,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.permits > 0 {
            self.gate
                .owed
                .fetch_add(self.permits as usize, Ordering::AcqRel);
        }
    }
}

#[inline]
fn permits_for(bytes: usize) -> u32 {
    u32::try_from(bytes).unwrap_or(u32::MAX)
}
