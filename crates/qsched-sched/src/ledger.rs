//! Shared per-machine free-capacity table.
//!
//! Reads are lock-free atomic loads. Every mutation goes through one mutex so
//! that "check capacity, then decrement" is a single atomic step and two
//! workers can never claim the same last unit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use qsched_core::{Machine, MachineId};
use rustc_hash::FxHashMap;

/// Free capacity per machine, safe to share across worker threads.
#[derive(Debug)]
pub struct CapacityLedger {
    ids: Vec<MachineId>,
    index: FxHashMap<MachineId, usize>,
    capacity: Vec<u32>,
    free: Vec<AtomicU32>,
    guard: Mutex<()>,
}

impl CapacityLedger {
    /// Create a ledger with every machine fully free.
    pub fn new(machines: &[Machine]) -> Self {
        Self {
            ids: machines.iter().map(|m| m.id.clone()).collect(),
            index: machines
                .iter()
                .enumerate()
                .map(|(i, m)| (m.id.clone(), i))
                .collect(),
            capacity: machines.iter().map(|m| m.capacity).collect(),
            free: machines.iter().map(|m| AtomicU32::new(m.capacity)).collect(),
            guard: Mutex::new(()),
        }
    }

    /// Current free capacity of a machine, `None` if unknown.
    pub fn free(&self, machine: &MachineId) -> Option<u32> {
        self.index
            .get(machine)
            .map(|&i| self.free[i].load(Ordering::Acquire))
    }

    /// Point-in-time view of free capacity, in machine order.
    pub fn snapshot(&self) -> Vec<(MachineId, u32)> {
        self.ids
            .iter()
            .zip(&self.free)
            .map(|(id, free)| (id.clone(), free.load(Ordering::Acquire)))
            .collect()
    }

    /// Atomically claim `amount` units on `machine`.
    ///
    /// Returns `false` and leaves the ledger untouched when the machine is
    /// unknown or has less than `amount` free.
    pub fn try_claim(&self, machine: &MachineId, amount: u32) -> bool {
        let Some(&i) = self.index.get(machine) else {
            return false;
        };
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let free = self.free[i].load(Ordering::Acquire);
        if free < amount {
            return false;
        }
        self.free[i].store(free - amount, Ordering::Release);
        true
    }

    /// Return `amount` units to `machine`, never exceeding its capacity.
    pub fn release(&self, machine: &MachineId, amount: u32) {
        let Some(&i) = self.index.get(machine) else {
            return;
        };
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let free = self.free[i].load(Ordering::Acquire);
        let restored = free.saturating_add(amount).min(self.capacity[i]);
        self.free[i].store(restored, Ordering::Release);
    }

    /// Whether every machine is back at full capacity.
    pub fn is_idle(&self) -> bool {
        self.free
            .iter()
            .zip(&self.capacity)
            .all(|(free, cap)| free.load(Ordering::Acquire) == *cap)
    }
}
