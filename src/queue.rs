use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Bounded FIFO shared between callers and the bus workers.
///
/// Producers may block (`put`) or fail fast (`try_put`); any side may purge.
/// Closing wakes every waiter so workers can observe shutdown.
pub(crate) struct MsgQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> MsgQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue, waiting for as long as the queue stays full.
    pub(crate) fn put(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(Error::QueueClosed);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue without waiting. The item is handed back when the queue is
    /// full or closed.
    pub(crate) fn try_put(&self, item: T) -> std::result::Result<(), T> {
        let mut state = self.state.lock();
        if state.closed || state.items.len() >= self.capacity {
            return Err(item);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue, waiting up to `timeout` for an item.
    pub(crate) fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let item = state.items.pop_front();
                if item.is_some() {
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    /// Drop every queued item, returning how many were discarded.
    pub(crate) fn purge(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.items.len();
        state.items.clear();
        self.not_full.notify_all();
        dropped
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn try_put_hands_back_item_when_full() {
        let q = MsgQueue::new(2);
        q.try_put(1).expect("room");
        q.try_put(2).expect("room");
        assert_eq!(q.try_put(3), Err(3));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn get_times_out_on_empty_queue() {
        let q: MsgQueue<u8> = MsgQueue::new(1);
        let start = Instant::now();
        assert_eq!(q.get_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn blocked_put_resumes_after_get() {
        let q = Arc::new(MsgQueue::new(1));
        q.put(1u8).expect("put");

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.put(2))
        };

        assert_eq!(q.get_timeout(Duration::from_secs(1)), Some(1));
        producer.join().expect("join").expect("put");
        assert_eq!(q.get_timeout(Duration::from_secs(1)), Some(2));
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let q = Arc::new(MsgQueue::new(1));
        q.put(1u8).expect("put");

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.put(2))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();

        assert!(matches!(
            producer.join().expect("join"),
            Err(Error::QueueClosed)
        ));
        assert!(q.is_closed());
    }

    #[test]
    fn purge_empties_queue() {
        let q = MsgQueue::new(4);
        for i in 0..3u8 {
            q.put(i).expect("put");
        }
        assert_eq!(q.purge(), 3);
        assert_eq!(q.len(), 0);
    }
}
