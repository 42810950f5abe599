//! Per-bus sequence number allocation.

/// Number of distinct IPMB sequence numbers (6 bits on the wire).
pub const SEQ_NUM: u8 = 64;

const SEQ_MASK: u8 = SEQ_NUM - 1;

/// Busy set of sequence numbers plus the allocation cursor.
///
/// A sequence number is registered while a ledger entry carries it as its
/// `seq_target`. The table is always accessed under the ledger lock.
#[derive(Debug, Default, Clone)]
pub struct SeqTable {
    busy: u64,
    cursor: u8,
}

impl SeqTable {
    /// Create an empty table with the cursor at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cursor to the next free sequence number.
    ///
    /// When all 64 numbers are in flight the cursor value is returned anyway
    /// and the collision is left to the ledger (oldest-entry semantics).
    pub fn next_free(&mut self) -> u8 {
        for _ in 0..SEQ_NUM {
            self.cursor = (self.cursor + 1) & SEQ_MASK;
            if !self.is_registered(self.cursor) {
                return self.cursor;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            seq = self.cursor,
            "all IPMB sequence numbers in flight; reusing cursor"
        );

        self.cursor
    }

    /// Mark `seq` as in flight.
    pub fn register(&mut self, seq: u8) {
        self.busy |= 1u64 << (seq & SEQ_MASK);
    }

    /// Release `seq`.
    pub fn unregister(&mut self, seq: u8) {
        self.busy &= !(1u64 << (seq & SEQ_MASK));
    }

    /// Whether `seq` is currently in flight.
    pub fn is_registered(&self, seq: u8) -> bool {
        self.busy & (1u64 << (seq & SEQ_MASK)) != 0
    }

    /// Number of sequence numbers in flight.
    pub fn in_flight(&self) -> u32 {
        self.busy.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_starts_after_zero_and_wraps() {
        let mut table = SeqTable::new();
        assert_eq!(table.next_free(), 1);
        for expected in 2..SEQ_NUM {
            assert_eq!(table.next_free(), expected);
        }
        assert_eq!(table.next_free(), 0);
        assert_eq!(table.next_free(), 1);
    }

    #[test]
    fn busy_numbers_are_skipped() {
        let mut table = SeqTable::new();
        table.register(1);
        table.register(2);
        assert_eq!(table.next_free(), 3);

        table.unregister(1);
        assert!(!table.is_registered(1));
        assert!(table.is_registered(2));
        assert_eq!(table.in_flight(), 1);
    }

    #[test]
    fn registered_numbers_are_unique_until_released() {
        let mut table = SeqTable::new();
        let mut seen = Vec::new();
        for _ in 0..SEQ_NUM {
            let seq = table.next_free();
            assert!(!seen.contains(&seq));
            table.register(seq);
            seen.push(seq);
        }
        assert_eq!(table.in_flight(), u32::from(SEQ_NUM));
    }

    #[test]
    fn exhaustion_returns_cursor() {
        let mut table = SeqTable::new();
        for seq in 0..SEQ_NUM {
            table.register(seq);
        }
        let before = table.cursor;
        assert_eq!(table.next_free(), before);
    }
}
