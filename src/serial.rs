// FIFO serial execution for a single owned value (a connection).
//
// Callers take a ticket on arrival and run strictly in ticket order, so two
// calls on the same queue never interleave and are served in arrival order.
// The queue is not reentrant: running a closure that calls back into the same
// queue waits on its own ticket forever.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct Tickets {
    next: u64,
    serving: u64,
}

pub struct SerialQueue<T> {
    tickets: Mutex<Tickets>,
    turn: Condvar,
    value: Mutex<T>,
}

/// Hands the turn to the next ticket, including when the closure panics.
struct TurnGuard<'a, T> {
    queue: &'a SerialQueue<T>,
}

impl<T> Drop for TurnGuard<'_, T> {
    fn drop(&mut self) {
        let mut tickets = lock_recovering(&self.queue.tickets);
        tickets.serving += 1;
        drop(tickets);
        self.queue.turn.notify_all();
    }
}

fn lock_recovering<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    m.lock().unwrap_or_else(|poisoned: PoisonError<MutexGuard<'_, U>>| {
        log::warn!("serial queue: recovering lock poisoned by an earlier panic");
        poisoned.into_inner()
    })
}

impl<T> SerialQueue<T> {
    pub fn new(value: T) -> Self {
        Self {
            tickets: Mutex::new(Tickets { next: 0, serving: 0 }),
            turn: Condvar::new(),
            value: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access, after every earlier caller has finished.
    /// Blocks the calling thread until then.
    pub fn run<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        {
            let mut tickets = lock_recovering(&self.tickets);
            let ticket = tickets.next;
            tickets.next += 1;
            while tickets.serving != ticket {
                tickets = self
                    .turn
                    .wait(tickets)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        let _turn = TurnGuard { queue: self };
        let mut value = lock_recovering(&self.value);
        f(&mut value)
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn calls_never_interleave() {
        let queue = Arc::new(SerialQueue::new(Vec::<usize>::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue = Arc::clone(&queue);
                let in_flight = Arc::clone(&in_flight);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    queue.run(|v| {
                        assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(Duration::from_millis(5));
                        v.push(i);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let queue = Arc::try_unwrap(queue).ok().unwrap();
        let mut seen = queue.into_inner();
        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn callers_are_served_in_arrival_order() {
        let queue = Arc::new(SerialQueue::new(Vec::<usize>::new()));

        // Hold the queue so later callers line up behind us in a known order.
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let holder = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.run(|v| {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(100));
                    v.push(0);
                });
            })
        };
        started_rx.recv().unwrap();

        let mut waiters = Vec::new();
        for i in 1..=4 {
            let queue = Arc::clone(&queue);
            waiters.push(thread::spawn(move || queue.run(|v| v.push(i))));
            // Give each waiter time to take its ticket before the next arrives.
            thread::sleep(Duration::from_millis(15));
        }

        holder.join().unwrap();
        for w in waiters {
            w.join().unwrap();
        }
        let order = queue.run(|v| v.clone());
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panic_in_one_call_releases_the_turn() {
        let queue = Arc::new(SerialQueue::new(0u32));
        let q = Arc::clone(&queue);
        let result = thread::spawn(move || {
            q.run(|_| panic!("boom"));
        })
        .join();
        assert!(result.is_err(), "panic must propagate to the caller");

        assert_eq!(queue.run(|v| { *v += 1; *v }), 1);
    }
}
