//! Pending-request ledger.
//!
//! Each bus keeps the requests it has put on the wire until the matching
//! response arrives, capacity forces the oldest out, or the sweeper expires
//! them. The ring and the sequence table share one lock so that a sequence
//! number is registered exactly while its entry is present.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::observe;
use crate::seq::SeqTable;
use crate::types::Message;

/// Default number of outstanding requests per bus.
pub const MAX_SEQ_QUEUE: usize = 15;

/// How a query message is correlated with a stored request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// An inbound response: stored `(netfn, cmd, seq_target)` equals
    /// `(query.netfn - 1, query.cmd, query.seq_target)`.
    Response,
    /// A bridge lookup by the original requester's sequence: stored
    /// `(netfn, cmd, seq_source)` equals the query's.
    BridgeSource,
}

struct Inner {
    entries: VecDeque<Message>,
    seq: SeqTable,
}

/// Fixed-capacity ring of outstanding requests for one bus.
pub struct Ledger {
    bus: usize,
    capacity: usize,
    lock_timeout: Duration,
    inner: Mutex<Inner>,
}

impl Ledger {
    /// Create an empty ledger for `bus`.
    pub fn new(bus: usize, capacity: usize, lock_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            bus,
            capacity,
            lock_timeout,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                seq: SeqTable::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.try_lock_for(self.lock_timeout).ok_or_else(|| {
            observe::lock_timeout(self.bus, "ledger");
            Error::MutexLock
        })
    }

    /// Allocate the next free sequence number for an outbound request.
    pub fn next_seq(&self) -> Result<u8> {
        Ok(self.lock()?.seq.next_free())
    }

    /// Record `msg` as outstanding at tick `now`.
    ///
    /// When the ring is full the oldest entry is evicted and returned.
    pub fn insert(&self, msg: &Message, now: u32) -> Result<Option<Message>> {
        let mut inner = self.lock()?;
        push(&mut inner, msg, now);
        Ok(self.evict_overflow(&mut inner))
    }

    /// Record `msg` ahead of its write without evicting anything.
    ///
    /// The ring may hold one entry over capacity until [`Ledger::commit`]
    /// confirms the write or [`Ledger::remove_request`] withdraws it.
    pub fn stage(&self, msg: &Message, now: u32) -> Result<()> {
        let mut inner = self.lock()?;
        push(&mut inner, msg, now);
        Ok(())
    }

    /// Confirm a staged request reached the wire. Any entry over capacity
    /// is evicted oldest first; the first one evicted is returned.
    pub fn commit(&self) -> Result<Option<Message>> {
        let mut inner = self.lock()?;
        Ok(self.evict_overflow(&mut inner))
    }

    fn evict_overflow(&self, inner: &mut Inner) -> Option<Message> {
        let mut first = None;
        while inner.entries.len() > self.capacity {
            let Some(old) = inner.entries.pop_front() else {
                break;
            };
            inner.seq.unregister(old.seq_target);
            observe::ledger_evicted(self.bus, "capacity", &old);
            first.get_or_insert(old);
        }
        first
    }

    /// Find the request `query` answers, copy its routing metadata into the
    /// query and remove it.
    ///
    /// Returns `Ok(false)` when nothing matches.
    pub fn find_and_remove(&self, query: &mut Message, by: Match) -> Result<bool> {
        let mut inner = self.lock()?;

        let pos = inner.entries.iter().position(|entry| match by {
            Match::Response => {
                entry.netfn == query.netfn.wrapping_sub(1)
                    && entry.cmd == query.cmd
                    && entry.seq_target == query.seq_target
            }
            Match::BridgeSource => {
                entry.netfn == query.netfn
                    && entry.cmd == query.cmd
                    && entry.seq_source == query.seq_source
            }
        });

        let Some(pos) = pos else {
            return Ok(false);
        };
        let Some(entry) = inner.entries.remove(pos) else {
            return Ok(false);
        };

        match by {
            Match::Response => query.seq_source = entry.seq_source,
            Match::BridgeSource => query.seq_target = entry.seq_target,
        }
        query.inf_source = entry.inf_source;
        query.inf_target = entry.inf_target;
        inner.seq.unregister(entry.seq_target);

        Ok(true)
    }

    /// Remove the request registered for exactly `(netfn, cmd, seq_target)`.
    pub fn remove_request(&self, msg: &Message) -> Result<bool> {
        let mut inner = self.lock()?;

        let pos = inner.entries.iter().position(|entry| {
            entry.netfn == msg.netfn && entry.cmd == msg.cmd && entry.seq_target == msg.seq_target
        });
        let Some(entry) = pos.and_then(|pos| inner.entries.remove(pos)) else {
            return Ok(false);
        };
        inner.seq.unregister(entry.seq_target);

        Ok(true)
    }

    /// Evict every entry older than `timeout_ms` at tick `now`.
    ///
    /// Ages are computed with wrapping arithmetic; an age with the sign bit
    /// set means the timestamp is in the future and is treated as stale too.
    pub fn expire(&self, now: u32, timeout_ms: u32) -> Result<usize> {
        let mut inner = self.lock()?;
        let Inner { entries, seq } = &mut *inner;

        let before = entries.len();
        entries.retain(|entry| {
            let age = now.wrapping_sub(entry.timestamp);
            let stale = age > timeout_ms || (age as i32) < 0;
            if stale {
                seq.unregister(entry.seq_target);
                observe::ledger_evicted(self.bus, "timeout", entry);
            }
            !stale
        });

        Ok(before - entries.len())
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Whether no request is outstanding.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    /// Whether `seq` is currently registered.
    pub fn is_registered(&self, seq: u8) -> Result<bool> {
        Ok(self.lock()?.seq.is_registered(seq))
    }

    /// Maximum number of outstanding requests.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn push(inner: &mut Inner, msg: &Message, now: u32) {
    let mut entry = msg.clone();
    entry.timestamp = now;
    inner.seq.register(entry.seq_target);
    inner.entries.push_back(entry);
}
