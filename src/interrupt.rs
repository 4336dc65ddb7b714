// Per-connection interrupt support
//
// An interrupt bumps a counter and asks SQLite to abort whatever statement is
// running. Operations take an `SqlInterruptScope` when they start; the scope
// reports an interrupt only if the counter moved after it was taken, so an
// interrupt never leaks into calls that start later.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rusqlite::{Connection, InterruptHandle};

use crate::error::Interrupted;

/// Cross-thread cancellation handle bound to one connection.
pub struct SqlInterruptHandle {
    db_handle: InterruptHandle,
    interrupt_counter: Arc<AtomicUsize>,
}

impl SqlInterruptHandle {
    pub fn new(conn: &Connection) -> Self {
        Self {
            db_handle: conn.get_interrupt_handle(),
            interrupt_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Abort the in-flight operation on this connection, if any.
    /// Never blocks and never fails; safe after the connection is closed.
    pub fn interrupt(&self) {
        self.interrupt_counter.fetch_add(1, Ordering::SeqCst);
        self.db_handle.interrupt();
    }

    pub fn begin_interrupt_scope(&self) -> SqlInterruptScope {
        SqlInterruptScope::new(Arc::clone(&self.interrupt_counter))
    }
}

/// Snapshot of the interrupt counter taken when an operation starts.
#[derive(Debug)]
pub struct SqlInterruptScope {
    start_value: usize,
    interrupt_counter: Arc<AtomicUsize>,
}

impl SqlInterruptScope {
    fn new(interrupt_counter: Arc<AtomicUsize>) -> Self {
        let start_value = interrupt_counter.load(Ordering::SeqCst);
        Self {
            start_value,
            interrupt_counter,
        }
    }

    /// A scope that can never be interrupted, for callers without a handle.
    pub fn dummy() -> Self {
        Self::new(Arc::new(AtomicUsize::new(0)))
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupt_counter.load(Ordering::SeqCst) != self.start_value
    }

    pub fn err_if_interrupted(&self) -> std::result::Result<(), Interrupted> {
        if self.was_interrupted() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_only_affects_existing_scopes() {
        let conn = Connection::open_in_memory().unwrap();
        let handle = SqlInterruptHandle::new(&conn);

        let before = handle.begin_interrupt_scope();
        assert!(before.err_if_interrupted().is_ok());

        handle.interrupt();
        assert_eq!(before.err_if_interrupted(), Err(Interrupted));

        let after = handle.begin_interrupt_scope();
        assert!(after.err_if_interrupted().is_ok(), "later scopes must not see old interrupts");
    }

    #[test]
    fn interrupt_with_nothing_running_is_harmless() {
        let conn = Connection::open_in_memory().unwrap();
        let handle = SqlInterruptHandle::new(&conn);
        handle.interrupt();
        handle.interrupt();

        let n: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn interrupt_after_connection_dropped_is_harmless() {
        let conn = Connection::open_in_memory().unwrap();
        let handle = SqlInterruptHandle::new(&conn);
        drop(conn);
        handle.interrupt();
    }

    #[test]
    fn dummy_scope_is_never_interrupted() {
        assert!(!SqlInterruptScope::dummy().was_interrupted());
    }
}
