//! Fixed-capacity pool of process control records
//!
//! The table owns every record; a pid is simply a record's index. Free
//! slots sit on a stack of indices, seeded in reverse so that allocation
//! starts at pid 0 and proceeds in index order, and freed slots are reused
//! last-freed-first. Only called with the kernel lock held.

use alloc::vec::Vec;

use super::process::{Process, ProcessId, ProcessState};

pub struct ProcessTable {
    slots: Vec<Process>,
    /// Free slot indices; the top of the stack is allocated next
    free: Vec<usize>,
    /// Slots not on the free list
    live: usize,
    max_fileid: usize,
}

impl ProcessTable {
    pub fn new(capacity: usize, max_fileid: usize) -> Self {
        let slots = (0..capacity)
            .map(|index| Process::new(ProcessId::new(index as u32), max_fileid))
            .collect();
        let free = (0..capacity).rev().collect();

        ProcessTable {
            slots,
            free,
            live: 0,
            max_fileid,
        }
    }

    /// Pop a free slot and mark it Alive
    pub fn acquire(&mut self) -> Option<ProcessId> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index];
        slot.state = ProcessState::Alive;
        self.live += 1;
        Some(slot.id)
    }

    /// Reset a slot and push it back on the free list
    pub fn release(&mut self, pid: ProcessId) {
        let index = pid.index();
        match self.slots.get(index) {
            Some(slot) if slot.state != ProcessState::Free => {}
            _ => {
                log::error!("release of pid {} which is not allocated", pid);
                return;
            }
        }

        self.slots[index] = Process::new(pid, self.max_fileid);
        self.free.push(index);
        self.live -= 1;
    }

    /// The record for `pid`, if it is Alive or Zombie
    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.slots
            .get(pid.index())
            .filter(|slot| slot.state != ProcessState::Free)
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.slots
            .get_mut(pid.index())
            .filter(|slot| slot.state != ProcessState::Free)
    }

    /// Whether `pid` indexes a slot of this table
    pub fn in_range(&self, pid: ProcessId) -> bool {
        pid.index() < self.slots.len()
    }

    /// Number of Alive or Zombie records
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Allocated records in pid order
    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots
            .iter()
            .filter(|slot| slot.state != ProcessState::Free)
    }
}
