//! The ARM9's sixteen-entry write buffer (spec §3 "Write buffer", §4.6).
//!
//! Decouples bufferable stores from bus-write timing: a store that hits a
//! bufferable cache-miss region, or a cache hit that marks a dirty half-line,
//! enqueues here instead of stalling the core for the full bus latency. The
//! buffer is drained strictly FIFO (spec §9 open-question resolution:
//! "preserved as strict FIFO, intentionally") one bus transaction per call,
//! and only when the bus arbiter grants this core the bus.

use crate::common::constants::WRITE_BUFFER_DEPTH;
use crate::common::AccessWidth;

/// One write-buffer entry: either an address marker preceding a burst, or a
/// data word tagged with the transfer width it must drain as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    /// Target address for the data entries that follow, carried separately
    /// from the data so a run of `word_seq` entries can imply `+4` addressing
    /// without re-specifying the address each time (spec §3).
    Address(u32),
    /// A queued data word/halfword/byte, tagged non-sequential or sequential
    /// (burst continuation).
    Data {
        /// Transfer width.
        width: AccessWidth,
        /// Value to write.
        value: u32,
        /// Whether this is a burst-sequential continuation of the entry
        /// before it (implies `+width` addressing from the last drained
        /// address, per spec §3 "subsequent word-seq entries imply +4
        /// addressing for burst writes").
        sequential: bool,
    },
}

/// The write buffer's FIFO ring (spec §3 "Sixteen entries in a ring").
pub struct WriteBuffer {
    entries: std::collections::VecDeque<Entry>,
    /// Address of the run currently being queued, used to detect whether an
    /// incoming write continues the same burst (no new address entry needed).
    last_queued_addr: Option<u32>,
    /// Address last drained onto the bus, base for `sequential` continuations.
    drain_addr: Option<u32>,
    /// High-water mark of entries ever held at once, for stats.
    pub high_water_mark: usize,
}

impl WriteBuffer {
    /// Creates an empty write buffer.
    pub fn new() -> Self {
        Self {
            entries: std::collections::VecDeque::with_capacity(WRITE_BUFFER_DEPTH),
            last_queued_addr: None,
            drain_addr: None,
            high_water_mark: 0,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the buffer cannot accept another address+data pair (spec
    /// §4.6 "A drain call with a full buffer stalls the issuing core until
    /// one slot opens"). Each push needs at most 2 slots (address + data);
    /// callers check this before pushing a *new* burst's first write. A
    /// burst continuation (same address) only ever needs 1 more slot.
    pub fn is_full(&self) -> bool {
        self.entries.len() + 1 >= WRITE_BUFFER_DEPTH
    }

    /// Pushes a bufferable write. If `addr` continues the run started by the
    /// last queued write (`last_queued_addr + width` for the previous entry),
    /// only a `Data { sequential: true, .. }` entry is pushed; otherwise an
    /// `Address` marker precedes the data entry (spec §3: "An address entry
    /// precedes one or more data entries ... a burst ... is never
    /// interrupted by another address entry").
    pub fn push(&mut self, addr: u32, width: AccessWidth, value: u32) {
        let sequential = self.last_queued_addr == Some(addr);
        if !sequential {
            self.entries.push_back(Entry::Address(addr));
        }
        self.entries.push_back(Entry::Data { width, value, sequential });
        self.last_queued_addr = Some(addr.wrapping_add(width.bytes()));
        self.high_water_mark = self.high_water_mark.max(self.entries.len());
    }

    /// Drains at most one bus transaction, invoking `write_bus(addr, width,
    /// value, sequential)` to perform the actual write. Returns `true` if a
    /// transaction was drained. The caller is responsible for only invoking
    /// this when the bus arbiter has granted this core the bus (spec §4.6
    /// "Drain is admissible only when the arbiter grants the bus to this
    /// core").
    pub fn drain_one<F: FnOnce(u32, AccessWidth, u32, bool)>(&mut self, write_bus: F) -> bool {
        loop {
            match self.entries.front().copied() {
                Some(Entry::Address(addr)) => {
                    self.drain_addr = Some(addr);
                    self.entries.pop_front();
                    continue;
                }
                Some(Entry::Data { width, value, sequential }) => {
                    let addr = self.drain_addr.expect(
                        "write-buffer invariant: a data entry always follows a committed address",
                    );
                    self.entries.pop_front();
                    self.drain_addr = Some(addr.wrapping_add(width.bytes()));
                    write_bus(addr, width, value, sequential);
                    return true;
                }
                None => return false,
            }
        }
    }

    /// Drains every queued entry immediately, for CP15's "drain write
    /// buffer" operation (spec §4.5 "Block until C6 reports empty").
    pub fn drain_all<F: FnMut(u32, AccessWidth, u32, bool)>(&mut self, mut write_bus: F) {
        while self.drain_one(&mut write_bus) {}
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_precedes_first_data_of_a_run() {
        let mut wb = WriteBuffer::new();
        wb.push(0x0200_0000, AccessWidth::Word, 1);
        assert_eq!(wb.len(), 2);
    }

    #[test]
    fn sequential_continuation_skips_address_entry() {
        let mut wb = WriteBuffer::new();
        wb.push(0x0200_0000, AccessWidth::Word, 1);
        wb.push(0x0200_0004, AccessWidth::Word, 2);
        assert_eq!(wb.len(), 3);
    }

    #[test]
    fn drain_is_strict_fifo_and_reports_addresses() {
        let mut wb = WriteBuffer::new();
        wb.push(0x0200_0000, AccessWidth::Word, 0xAAAA_AAAA);
        wb.push(0x0200_0004, AccessWidth::Word, 0xBBBB_BBBB);
        let mut seen = Vec::new();
        wb.drain_all(|addr, _w, val, seq| seen.push((addr, val, seq)));
        assert_eq!(
            seen,
            vec![
                (0x0200_0000, 0xAAAA_AAAA, false),
                (0x0200_0004, 0xBBBB_BBBB, true),
            ]
        );
        assert!(wb.is_empty());
    }

    #[test]
    fn burst_is_never_interrupted_by_unrelated_address() {
        let mut wb = WriteBuffer::new();
        wb.push(0x0200_0000, AccessWidth::Word, 1);
        wb.push(0x0200_0004, AccessWidth::Word, 2);
        wb.push(0x0300_0000, AccessWidth::Word, 3); // unrelated address, new burst
        assert_eq!(wb.len(), 5); // addr,data,data (first burst) + addr,data (second burst)
        let mut addrs = Vec::new();
        wb.drain_all(|addr, _, _, _| addrs.push(addr));
        assert_eq!(addrs, vec![0x0200_0000, 0x0200_0004, 0x0300_0000]);
    }
}
