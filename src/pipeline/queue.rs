//! Bounded FIFO with acknowledgement, used between pipeline stations.
//!
//! Built on a bounded crossbeam channel. On top of plain send/recv it tracks
//! unfinished items (`put` increments, `task_done` decrements) so the
//! controller can wait until every submitted sentence has been handled, and a
//! closed flag that tells the consumer no more items will come.

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Result of a blocking [`WorkQueue::get`].
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    /// Timed out; the caller should re-check run control and retry.
    Empty,
    /// Closed and fully drained.
    Closed,
}

/// Why a [`WorkQueue::put`] gave up. The item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PutError<T> {
    Aborted(T),
    Closed(T),
}

pub struct WorkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    unfinished: Mutex<usize>,
    all_done: Condvar,
    closed: AtomicBool,
}

impl<T> WorkQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            unfinished: Mutex::new(0),
            all_done: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Items put but not yet acknowledged with [`task_done`](Self::task_done).
    pub fn unfinished(&self) -> usize {
        self.unfinished.lock().map(|n| *n).unwrap_or(0)
    }

    /// Block until there is room, waking every `poll` to ask `abort`.
    pub fn put(&self, item: T, poll: Duration, abort: impl Fn() -> bool) -> Result<(), PutError<T>> {
        self.add_unfinished();
        let mut item = item;
        loop {
            if self.is_closed() {
                self.task_done();
                return Err(PutError::Closed(item));
            }
            if abort() {
                self.task_done();
                return Err(PutError::Aborted(item));
            }
            match self.tx.send_timeout(item, poll) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) | Err(SendTimeoutError::Disconnected(back)) => {
                    item = back;
                }
            }
        }
    }

    /// Wait up to `timeout` for the next item.
    pub fn get(&self, timeout: Duration) -> Received<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Received::Item(item),
            Err(RecvTimeoutError::Timeout) => {
                if self.is_closed() && self.rx.is_empty() {
                    Received::Closed
                } else {
                    Received::Empty
                }
            }
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    /// Acknowledge one item taken with [`get`](Self::get) (or abandoned by `put`).
    pub fn task_done(&self) {
        if let Ok(mut n) = self.unfinished.lock() {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.all_done.notify_all();
            }
        }
    }

    /// Wait until every item has been acknowledged.
    ///
    /// Returns false if `abort` became true first.
    pub fn join(&self, poll: Duration, abort: impl Fn() -> bool) -> bool {
        let Ok(mut n) = self.unfinished.lock() else {
            return false;
        };
        while *n > 0 {
            if abort() {
                return false;
            }
            n = match self.all_done.wait_timeout(n, poll) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        true
    }

    /// No further items will be put. Consumers see [`Received::Closed`] once drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Discard everything queued, acknowledging each item. Returns how many.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while let Ok(item) = self.rx.try_recv() {
            drop(item);
            self.task_done();
            dropped += 1;
        }
        dropped
    }

    fn add_unfinished(&self) {
        if let Ok(mut n) = self.unfinished.lock() {
            *n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_fifo_order_and_ack() {
        let queue = WorkQueue::bounded(3);
        for i in 0..3 {
            queue.put(i, POLL, || false).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.unfinished(), 3);

        for expected in 0..3 {
            assert_eq!(queue.get(POLL), Received::Item(expected));
            queue.task_done();
        }
        assert_eq!(queue.unfinished(), 0);
        assert!(queue.join(POLL, || false));
    }

    #[test]
    fn test_get_times_out_when_empty() {
        let queue: WorkQueue<u32> = WorkQueue::bounded(1);
        assert_eq!(queue.get(POLL), Received::Empty);
    }

    #[test]
    fn test_closed_after_drain() {
        let queue = WorkQueue::bounded(2);
        queue.put("a", POLL, || false).unwrap();
        queue.close();
        assert_eq!(queue.get(POLL), Received::Item("a"));
        assert_eq!(queue.get(POLL), Received::Closed);
        assert!(matches!(
            queue.put("b", POLL, || false),
            Err(PutError::Closed("b"))
        ));
    }

    #[test]
    fn test_put_blocks_when_full_until_consumed() {
        let queue = Arc::new(WorkQueue::bounded(1));
        queue.put(1, POLL, || false).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.put(2, POLL, || false))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished(), "put must block on a full queue");

        assert_eq!(queue.get(POLL), Received::Item(1));
        queue.task_done();
        assert!(producer.join().unwrap().is_ok());
        assert_eq!(queue.get(POLL), Received::Item(2));
    }

    #[test]
    fn test_put_abort_returns_item_and_releases_count() {
        let queue = WorkQueue::bounded(1);
        queue.put(1, POLL, || false).unwrap();

        let polls = AtomicUsize::new(0);
        let result = queue.put(2, POLL, || polls.fetch_add(1, Ordering::SeqCst) >= 2);
        assert_eq!(result, Err(PutError::Aborted(2)));
        assert_eq!(queue.unfinished(), 1, "aborted put must not stay counted");
    }

    #[test]
    fn test_join_waits_for_acknowledgement() {
        let queue = Arc::new(WorkQueue::bounded(2));
        queue.put(7, POLL, || false).unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                let got = queue.get(POLL);
                queue.task_done();
                got
            })
        };
        assert!(queue.join(POLL, || false));
        assert_eq!(consumer.join().unwrap(), Received::Item(7));
    }

    #[test]
    fn test_join_aborts() {
        let queue = WorkQueue::bounded(1);
        queue.put(1, POLL, || false).unwrap();
        assert!(!queue.join(POLL, || true));
    }

    #[test]
    fn test_drain_discards_and_acks() {
        let queue = WorkQueue::bounded(3);
        for i in 0..3 {
            queue.put(i, POLL, || false).unwrap();
        }
        assert_eq!(queue.drain(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.unfinished(), 0);
        assert_eq!(queue.capacity(), 3);
    }
}
