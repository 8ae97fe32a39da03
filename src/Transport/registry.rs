use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Lifecycle of one registry slot.
enum Slot {
    Vacant,
    /// Admitted; the worker thread is being spawned.
    Reserved,
    Running(JoinHandle<()>),
    /// The worker has finished. The handle can be missing if the worker
    /// finished before the acceptor attached it.
    Finished(Option<JoinHandle<()>>),
}

struct Inner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    occupied: usize,
    peak: usize,
    admitted: u64,
    rejected: u64,
}

/// Fixed-capacity slab of worker threads with index reuse.
///
/// A slot is taken when a connection is admitted and only returns to the free
/// list once its thread has been joined, so the number of live workers can
/// never exceed the capacity.
pub struct WorkerRegistry {
    capacity: usize,
    inner: Mutex<Inner>,
}

/// Counters describing how the registry was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub admitted: u64,
    pub rejected: u64,
    pub peak_active: usize,
}

impl WorkerRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| Slot::Vacant).collect();
        Self {
            capacity,
            inner: Mutex::new(Inner {
                slots,
                // pop() hands out the lowest index first
                free: (0..capacity).rev().collect(),
                occupied: 0,
                peak: 0,
                admitted: 0,
                rejected: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held by a reserved, running or not-yet-joined worker.
    pub fn active(&self) -> usize {
        self.inner.lock().occupied
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            admitted: inner.admitted,
            rejected: inner.rejected,
            peak_active: inner.peak,
        }
    }

    /// Reserve a slot for a new worker, reaping finished workers first.
    /// Returns `None` when every slot is taken.
    pub fn try_admit(&self) -> Option<usize> {
        let reaped = self.take_finished();
        join_all(reaped);

        let mut inner = self.inner.lock();
        match inner.free.pop() {
            Some(index) => {
                inner.slots[index] = Slot::Reserved;
                inner.occupied += 1;
                inner.admitted += 1;
                inner.peak = inner.peak.max(inner.occupied);
                Some(index)
            }
            None => {
                inner.rejected += 1;
                None
            }
        }
    }

    /// Hand the spawned thread's handle to the slot reserved for it.
    pub fn attach(&self, index: usize, handle: JoinHandle<()>) {
        let mut inner = self.inner.lock();
        let slot = &mut inner.slots[index];
        *slot = match std::mem::replace(slot, Slot::Vacant) {
            Slot::Finished(None) => Slot::Finished(Some(handle)),
            _ => Slot::Running(handle),
        };
    }

    /// Give back a slot whose thread could not be spawned. The failed spawn
    /// may already have dropped the worker's guard, leaving the slot
    /// finished without a handle.
    pub fn abandon(&self, index: usize) {
        let mut inner = self.inner.lock();
        if matches!(inner.slots[index], Slot::Reserved | Slot::Finished(None)) {
            inner.slots[index] = Slot::Vacant;
            inner.free.push(index);
            inner.occupied -= 1;
        }
    }

    /// Called by a worker as its last action. A slot already collected by
    /// [`join_all`](Self::join_all) is left alone.
    pub fn release(&self, index: usize) {
        let mut inner = self.inner.lock();
        let slot = &mut inner.slots[index];
        *slot = match std::mem::replace(slot, Slot::Vacant) {
            Slot::Running(handle) => Slot::Finished(Some(handle)),
            Slot::Reserved => Slot::Finished(None),
            other => other,
        };
    }

    /// Join every worker, running or finished. Threads are joined outside
    /// the lock. Returns how many threads were joined.
    pub fn join_all(&self) -> usize {
        let handles = {
            let mut inner = self.inner.lock();
            let mut handles = Vec::new();
            for index in 0..inner.slots.len() {
                let taken = match std::mem::replace(&mut inner.slots[index], Slot::Vacant) {
                    Slot::Running(handle) | Slot::Finished(Some(handle)) => Some(handle),
                    // still being spawned, or finished before its handle was attached
                    other @ (Slot::Reserved | Slot::Finished(None)) => {
                        inner.slots[index] = other;
                        continue;
                    }
                    Slot::Vacant => None,
                };
                if let Some(handle) = taken {
                    handles.push(handle);
                    inner.free.push(index);
                    inner.occupied -= 1;
                }
            }
            handles
        };
        join_all(handles)
    }

    fn take_finished(&self) -> Vec<JoinHandle<()>> {
        let mut inner = self.inner.lock();
        let mut handles = Vec::new();
        for index in 0..inner.slots.len() {
            if let Slot::Finished(Some(_)) = inner.slots[index] {
                if let Slot::Finished(Some(handle)) = std::mem::replace(&mut inner.slots[index], Slot::Vacant) {
                    handles.push(handle);
                }
                inner.free.push(index);
                inner.occupied -= 1;
            }
        }
        handles
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_worker_registry(self, f)
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) -> usize {
    let count = handles.len();
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
    count
}

/// Releases its registry slot when dropped, on every exit path of a worker.
pub struct SlotGuard {
    registry: Arc<WorkerRegistry>,
    index: usize,
}

impl SlotGuard {
    pub fn new(registry: Arc<WorkerRegistry>, index: usize) -> Self {
        Self { registry, index }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ceiling_is_enforced() {
        let reg = WorkerRegistry::with_capacity(2);
        assert_eq!(reg.try_admit(), Some(0));
        assert_eq!(reg.try_admit(), Some(1));
        assert_eq!(reg.try_admit(), None);
        assert_eq!(reg.active(), 2);
        let stats = reg.stats();
        assert_eq!(stats.admitted, 2);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn finished_slots_are_reused() {
        let reg = Arc::new(WorkerRegistry::with_capacity(1));
        let index = reg.try_admit().unwrap();
        let guard = SlotGuard::new(reg.clone(), index);
        let handle = thread::spawn(move || drop(guard));
        reg.attach(index, handle);

        // the worker eventually releases; admission reaps and reuses the slot
        let mut again = None;
        for _ in 0..1000 {
            again = reg.try_admit();
            if again.is_some() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(again, Some(0));
        assert_eq!(reg.active(), 1);
    }

    #[test]
    fn release_before_attach_keeps_handle() {
        let reg = WorkerRegistry::with_capacity(1);
        let index = reg.try_admit().unwrap();
        reg.release(index);
        reg.attach(index, thread::spawn(|| {}));
        assert_eq!(reg.join_all(), 1);
        assert_eq!(reg.active(), 0);
    }

    #[test]
    fn failed_spawn_returns_its_slot() {
        let reg = Arc::new(WorkerRegistry::with_capacity(1));
        let index = reg.try_admit().unwrap();
        // a failed spawn drops the closure, and the guard inside it, first
        drop(SlotGuard::new(reg.clone(), index));
        reg.abandon(index);

        assert_eq!(reg.active(), 0);
        assert_eq!(reg.try_admit(), Some(0));
        reg.abandon(0);
        assert_eq!(reg.join_all(), 0);
        assert_eq!(reg.active(), 0);
    }

    #[test]
    fn abandon_frees_reserved_slot() {
        let reg = WorkerRegistry::with_capacity(1);
        let index = reg.try_admit().unwrap();
        reg.abandon(index);
        assert_eq!(reg.active(), 0);
        assert_eq!(reg.try_admit(), Some(0));
    }
}
