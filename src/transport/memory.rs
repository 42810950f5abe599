//! In-memory links for tests and demos.
//!
//! [`MemoryLink::pair`] wires two endpoints back to back. A write succeeds
//! only when it targets the peer's address, mirroring an I2C NAK otherwise.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::transport::{KcsWriter, Link};

const FAIL_ALWAYS: usize = usize::MAX;

struct Endpoint {
    addr: u8,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicUsize,
}

impl Endpoint {
    fn new(addr: u8) -> Arc<Self> {
        Arc::new(Self {
            addr,
            inbox: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicUsize::new(0),
        })
    }

    fn take_failure(&self) -> bool {
        self.fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                FAIL_ALWAYS => Some(FAIL_ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// One end of an in-memory IPMB bus.
#[derive(Clone)]
pub struct MemoryLink {
    local: Arc<Endpoint>,
    peer: Arc<Endpoint>,
}

impl MemoryLink {
    /// Create two connected endpoints at 7-bit addresses `addr_a` and `addr_b`.
    pub fn pair(addr_a: u8, addr_b: u8) -> (MemoryLink, MemoryLink) {
        let a = Endpoint::new(addr_a);
        let b = Endpoint::new(addr_b);
        (
            MemoryLink {
                local: Arc::clone(&a),
                peer: Arc::clone(&b),
            },
            MemoryLink { local: b, peer: a },
        )
    }

    /// 7-bit address of this endpoint.
    pub fn addr(&self) -> u8 {
        self.local.addr
    }

    /// Make the next `count` writes from this endpoint fail.
    pub fn fail_writes(&self, count: usize) {
        self.local.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Make every write from this endpoint fail until [`Self::heal`].
    pub fn fail_all_writes(&self) {
        self.local.fail_writes.store(FAIL_ALWAYS, Ordering::SeqCst);
    }

    /// Stop injecting write failures.
    pub fn heal(&self) {
        self.local.fail_writes.store(0, Ordering::SeqCst);
    }

    /// Write attempts made from this endpoint, failed ones included.
    pub fn writes(&self) -> usize {
        self.local.writes.load(Ordering::SeqCst)
    }

    /// Frames successfully delivered from this endpoint, address byte included.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.local.sent.lock().clone()
    }

    /// Queue a raw frame as if it had arrived on this endpoint.
    pub fn inject(&self, raw: &[u8]) {
        self.local.inbox.lock().push_back(raw.to_vec());
    }

    /// Frames received but not yet read.
    pub fn pending(&self) -> usize {
        self.local.inbox.lock().len()
    }
}

impl Link for MemoryLink {
    fn write(&self, target_addr: u8, payload: &[u8]) -> Result<()> {
        self.local.writes.fetch_add(1, Ordering::SeqCst);

        if self.local.take_failure() {
            return Err(Error::Io(io::Error::other("injected write failure")));
        }
        if target_addr != self.peer.addr {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no device acknowledged the address",
            )));
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(target_addr << 1);
        frame.extend_from_slice(payload);

        self.local.sent.lock().push(frame.clone());
        self.peer.inbox.lock().push_back(frame);
        Ok(())
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.local.inbox.lock().pop_front())
    }
}

/// A KCS sink that records every buffer written to it.
#[derive(Clone, Default)]
pub struct MemoryKcs {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryKcs {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }
}

impl KcsWriter for MemoryKcs {
    fn write(&self, buf: &[u8]) -> Result<()> {
        self.written.lock().push(buf.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_reaches_peer_with_address_byte() {
        let (a, b) = MemoryLink::pair(0x08, 0x20);
        a.write(0x20, &[0x18, 0xA8]).expect("write");

        assert_eq!(b.read().expect("read"), Some(vec![0x40, 0x18, 0xA8]));
        assert_eq!(b.read().expect("read"), None);
        assert_eq!(a.sent(), vec![vec![0x40, 0x18, 0xA8]]);
    }

    #[test]
    fn wrong_address_is_nacked() {
        let (a, b) = MemoryLink::pair(0x08, 0x20);
        assert!(matches!(a.write(0x30, &[0x00]), Err(Error::Io(_))));
        assert_eq!(b.pending(), 0);
        assert_eq!(a.writes(), 1);
    }

    #[test]
    fn injected_failures_are_counted() {
        let (a, b) = MemoryLink::pair(0x08, 0x20);
        a.fail_writes(2);
        assert!(a.write(0x20, &[1]).is_err());
        assert!(a.write(0x20, &[2]).is_err());
        a.write(0x20, &[3]).expect("third write succeeds");
        assert_eq!(a.writes(), 3);
        assert_eq!(b.pending(), 1);

        a.fail_all_writes();
        for _ in 0..10 {
            assert!(a.write(0x20, &[4]).is_err());
        }
        a.heal();
        a.write(0x20, &[5]).expect("healed");
    }

    #[test]
    fn kcs_recorder_keeps_buffers() {
        let kcs = MemoryKcs::new();
        kcs.write(&[0x1C, 0x01, 0x00]).expect("write");
        assert_eq!(kcs.written(), vec![vec![0x1C, 0x01, 0x00]]);
    }
}
