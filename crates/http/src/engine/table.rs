//! Descriptor-indexed session table
//!
//! One slot per possible descriptor, holding at most one live session.
//! Slots are independent; a worker takes the session out, owns it while
//! handling the readiness notification, and puts it back before re-arming.
//! The per-slot lock only makes the empty/present handoff visible across
//! threads — one-shot re-arm is what guarantees no two workers ever reach
//! the same slot concurrently.

use std::fmt;
use std::os::fd::RawFd;

use parking_lot::Mutex;

use crate::engine::session::Session;

pub(crate) struct SessionTable {
    slots: Vec<Mutex<Option<Box<Session>>>>,
}

impl SessionTable {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Mutex::new(None));
        Self { slots }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn take(&self, fd: RawFd) -> Option<Box<Session>> {
        self.slots.get(fd as usize)?.lock().take()
    }

    pub(crate) fn put(&self, fd: RawFd, session: Box<Session>) {
        debug_assert_eq!(session.fd(), fd);
        if let Some(slot) = self.slots.get(fd as usize) {
            let previous = slot.lock().replace(session);
            debug_assert!(previous.is_none(), "descriptor {fd} already had a session");
        }
    }
}

impl fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTable").field("capacity", &self.slots.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_empties_the_slot() {
        let table = SessionTable::new(8);
        assert!(table.take(3).is_none());

        let mut session = Box::new(Session::new());
        session.bind(3);
        table.put(3, session);

        let taken = table.take(3).unwrap();
        assert_eq!(taken.fd(), 3);
        assert!(table.take(3).is_none());
    }

    #[test]
    fn out_of_range_descriptor_is_ignored() {
        let table = SessionTable::new(4);
        assert!(table.take(100).is_none());

        let mut session = Box::new(Session::new());
        session.bind(100);
        table.put(100, session);
        assert!(table.take(100).is_none());
    }
}
