//! The ARM946E-S instruction and data caches (spec §3 "Caches", §4.5 "CP15
//! protection/cache engine").
//!
//! Both caches are 4-way set-associative, 4 sets, 32-byte lines (8 KiB
//! instruction / 4 KiB data). Each line's tag records the upper address bits
//! that, combined with its set and line index, give the line's physical
//! address; the data cache additionally tracks two dirty half-line bits
//! (spec §3 invariant: "a valid line's tag high bits, combined with its set
//! and line indices, give the exact physical line address covered").
//!
//! This model tracks tags/validity/dirtiness for hit/miss and coherence
//! timing only — the backing bytes live in the owning core's view of main
//! RAM (via the memory pipeline, §4.4), so a cache "hit" never needs to
//! return data itself; it only tells the caller whether a line-fill is
//! needed and which dirty halves must drain before eviction.

/// Cache victim-selection policies (round-robin, pseudo-random).
pub mod policies;

use crate::common::constants::CACHE_LINE_BYTES;
use policies::{RandomPolicy, ReplacementPolicy, RoundRobinPolicy};

/// One cache line's tag state.
#[derive(Clone, Copy, Debug, Default)]
struct Line {
    /// Upper address bits covered by this line, valid only when `valid`.
    tag: u32,
    /// Whether this line holds a live copy of its tagged address.
    valid: bool,
    /// Per-half dirty bits (data cache only; always `[false, false]` for the
    /// instruction cache, which is never written by the CPU).
    dirty: [bool; 2],
}

/// Selectable victim-replacement algorithm (spec §4.5 "replacement policy").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// Global per-cache round-robin counter (hardware reset default).
    RoundRobin,
    /// CP15's sixteen-bit xor-shift pseudo-random sequence.
    Random,
}

/// Lockdown state: a prefix of `locked_ways` ways (0..=3) is pinned and
/// excluded from ordinary fills when `active` is set (spec §3 "Lockdown
/// register pins a prefix of sets").
#[derive(Clone, Copy, Debug, Default)]
pub struct Lockdown {
    /// Number of ways (from way 0) that are pinned.
    pub locked_ways: usize,
    /// Whether lockdown is in effect.
    pub active: bool,
}

/// A line evicted by a fill, with the dirty-half state it carried so the
/// caller can drain it through the write buffer before reuse.
#[derive(Clone, Copy, Debug)]
pub struct Eviction {
    /// Physical address of the evicted line (first byte).
    pub line_addr: u32,
    /// Which halves were dirty at eviction time.
    pub dirty: [bool; 2],
}

/// A 4-way set-associative cache (spec §3 "Caches").
pub struct CacheSim {
    lines: Vec<Line>,
    sets: usize,
    ways: usize,
    line_bytes: u32,
    policy: Box<dyn ReplacementPolicy + Send + Sync>,
    /// Whether the cache is currently enabled (CP15 control bit).
    pub enabled: bool,
    /// Lockdown configuration.
    pub lockdown: Lockdown,
    /// True for the data cache (tracks dirty halves); false for the
    /// instruction cache (read-only, no dirty tracking).
    is_data_cache: bool,
    /// Lookups that found a valid matching line, for stats reporting.
    hits: u64,
    /// Lookups that found no matching line, for stats reporting.
    misses: u64,
}

impl CacheSim {
    /// Creates a cache with `sets` sets, `ways` ways, and 32-byte lines.
    pub fn new(sets: usize, ways: usize, policy: Policy, is_data_cache: bool) -> Self {
        let policy: Box<dyn ReplacementPolicy + Send + Sync> = match policy {
            Policy::RoundRobin => Box::new(RoundRobinPolicy::new(sets)),
            Policy::Random => Box::new(RandomPolicy::new()),
        };
        Self {
            lines: vec![Line::default(); sets * ways],
            sets,
            ways,
            line_bytes: CACHE_LINE_BYTES as u32,
            policy,
            enabled: false,
            lockdown: Lockdown::default(),
            is_data_cache,
            hits: 0,
            misses: 0,
        }
    }

    fn set_tag(&self, addr: u32) -> (usize, u32) {
        let line_index = addr / self.line_bytes;
        let set = (line_index as usize) % self.sets;
        let tag = addr / (self.line_bytes * self.sets as u32);
        (set, tag)
    }

    /// Returns the physical address of a line given its set and tag.
    fn line_addr(&self, set: usize, tag: u32) -> u32 {
        tag * (self.line_bytes * self.sets as u32) + (set as u32) * self.line_bytes
    }

    /// Looks up `addr`; returns the way index on hit. Counts the lookup
    /// toward the running hit/miss totals exposed by [`Self::hits`] and
    /// [`Self::misses`] (a disabled cache's lookups are not counted — it
    /// never actually arbitrates a hit or miss).
    pub fn lookup(&mut self, addr: u32) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        let (set, tag) = self.set_tag(addr);
        let base = set * self.ways;
        let hit = (0..self.ways).find(|&way| {
            let l = &self.lines[base + way];
            l.valid && l.tag == tag
        });
        if hit.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        hit
    }

    /// Total lookups that hit a valid line since construction.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Total lookups that missed since construction.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Half-line index (0 or 1) that `addr` falls within.
    fn half_of(&self, addr: u32) -> usize {
        ((addr % self.line_bytes) >= self.line_bytes / 2) as usize
    }

    /// Marks the half-line containing `addr` dirty. No-op on the instruction
    /// cache (it is never a write target).
    pub fn mark_dirty(&mut self, addr: u32) {
        if !self.is_data_cache {
            return;
        }
        if let Some(way) = self.lookup(addr) {
            let (set, _) = self.set_tag(addr);
            let half = self.half_of(addr);
            self.lines[set * self.ways + way].dirty[half] = true;
        }
    }

    /// Returns the selectable way excluded by lockdown, if lockdown is active.
    fn victim_way(&mut self, set: usize) -> usize {
        let excluded_below = if self.lockdown.active {
            self.lockdown.locked_ways.min(self.ways.saturating_sub(1))
        } else {
            0
        };
        let way = self.policy.select_victim(set, self.ways, excluded_below);
        self.policy.notify_fill(set, way);
        way
    }

    /// Installs a line for `addr`, evicting a victim per the active
    /// replacement policy (respecting lockdown). Returns the evicted line's
    /// address and dirty state so the caller can drain it first (spec §4.4
    /// step 4: "check whether the line being evicted is dirty").
    pub fn install(&mut self, addr: u32) -> Option<Eviction> {
        let (set, tag) = self.set_tag(addr);
        let way = self.victim_way(set);
        let idx = set * self.ways + way;
        let old = self.lines[idx];
        let eviction = (old.valid && old.dirty.iter().any(|&d| d)).then(|| Eviction {
            line_addr: self.line_addr(set, old.tag),
            dirty: old.dirty,
        });
        self.lines[idx] = Line {
            tag,
            valid: true,
            dirty: [false, false],
        };
        eviction
    }

    /// Invalidates every line (`I-cache invalidate all` / `D-cache
    /// invalidate all`).
    pub fn invalidate_all(&mut self) {
        for l in &mut self.lines {
            *l = Line::default();
        }
    }

    /// Invalidates the line containing `addr`, if present.
    pub fn invalidate_addr(&mut self, addr: u32) {
        if let Some(way) = self.lookup(addr) {
            let (set, _) = self.set_tag(addr);
            self.lines[set * self.ways + way] = Line::default();
        }
    }

    /// Invalidates by explicit set/way (the "by set-way" CP15 variant).
    pub fn invalidate_set_way(&mut self, set: usize, way: usize) {
        if set < self.sets && way < self.ways {
            self.lines[set * self.ways + way] = Line::default();
        }
    }

    /// Cleans (drains dirty halves of) the line containing `addr`, returning
    /// which halves were dirty before clearing them. Returns `None` if the
    /// line is not present or has no dirty halves.
    pub fn clean_addr(&mut self, addr: u32) -> Option<Eviction> {
        let way = self.lookup(addr)?;
        let (set, tag) = self.set_tag(addr);
        let idx = set * self.ways + way;
        let dirty = self.lines[idx].dirty;
        if !dirty.iter().any(|&d| d) {
            return None;
        }
        self.lines[idx].dirty = [false, false];
        Some(Eviction {
            line_addr: self.line_addr(set, tag),
            dirty,
        })
    }

    /// Cleans the line at explicit `(set, way)`, the "by set-way" CP15
    /// variant of [`Self::clean_addr`]. Returns `None` if that slot holds no
    /// dirty data.
    pub fn clean_set_way(&mut self, set: usize, way: usize) -> Option<Eviction> {
        if set >= self.sets || way >= self.ways {
            return None;
        }
        let idx = set * self.ways + way;
        let line = self.lines[idx];
        if !line.valid || !line.dirty.iter().any(|&d| d) {
            return None;
        }
        self.lines[idx].dirty = [false, false];
        Some(Eviction {
            line_addr: self.line_addr(set, line.tag),
            dirty: line.dirty,
        })
    }

    /// Cleans every dirty line in the cache, in ascending set/way order
    /// (spec §4.5 "For each dirty half-line matched, emit its eight words
    /// ... in address order").
    pub fn clean_all(&mut self) -> Vec<Eviction> {
        let mut out = Vec::new();
        for set in 0..self.sets {
            for way in 0..self.ways {
                let idx = set * self.ways + way;
                let line = self.lines[idx];
                if line.valid && line.dirty.iter().any(|&d| d) {
                    out.push(Eviction {
                        line_addr: self.line_addr(set, line.tag),
                        dirty: line.dirty,
                    });
                    self.lines[idx].dirty = [false, false];
                }
            }
        }
        out
    }

    /// Cleans then invalidates every dirty line.
    pub fn clean_and_invalidate_all(&mut self) -> Vec<Eviction> {
        let out = self.clean_all();
        self.invalidate_all();
        out
    }

    /// Debug-path raw tag-array read: packs `{tag, valid, dirty0, dirty1,
    /// set}` the way CP15's cache-debug operations expose it (spec §4.5
    /// "Cache-tag-array read/write (debug path) is included verbatim").
    pub fn read_tag_raw(&self, set: usize, way: usize) -> u32 {
        let l = self.lines[set * self.ways + way];
        let mut bits = (l.tag << 10) | ((set as u32 & 0x3) << 0);
        if l.valid {
            bits |= 1 << 2;
        }
        if l.dirty[0] {
            bits |= 1 << 3;
        }
        if l.dirty[1] {
            bits |= 1 << 4;
        }
        bits
    }

    /// Debug-path raw tag-array write: lets software construct arbitrary
    /// cache states for testing (spec §4.5).
    pub fn write_tag_raw(&mut self, set: usize, way: usize, bits: u32) {
        if set >= self.sets || way >= self.ways {
            return;
        }
        self.lines[set * self.ways + way] = Line {
            tag: bits >> 10,
            valid: bits & (1 << 2) != 0,
            dirty: [bits & (1 << 3) != 0, bits & (1 << 4) != 0],
        };
    }

    /// Number of sets.
    pub fn num_sets(&self) -> usize {
        self.sets
    }

    /// Number of ways.
    pub fn num_ways(&self) -> usize {
        self.ways
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> CacheSim {
        let mut c = CacheSim::new(4, 4, Policy::RoundRobin, true);
        c.enabled = true;
        c
    }

    #[test]
    fn install_then_lookup_hits() {
        let mut c = cache();
        c.install(0x0200_0040);
        assert!(c.lookup(0x0200_0040).is_some());
        assert!(c.lookup(0x0200_1040).is_none());
    }

    #[test]
    fn dirty_tracking_survives_until_clean() {
        let mut c = cache();
        c.install(0x0200_0000);
        c.mark_dirty(0x0200_0000);
        let evs = c.clean_all();
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].dirty, [true, false]);
        assert!(c.clean_all().is_empty());
    }

    #[test]
    fn eviction_reports_prior_dirty_line() {
        let mut c = cache();
        c.install(0x0200_0000);
        c.mark_dirty(0x0200_0000);
        for i in 1..4 {
            c.install(0x0200_0000 + i * 4 * c.sets as u32 * c.line_bytes);
        }
        let eviction = c.install(0x0200_0000 + 4 * c.sets as u32 * c.line_bytes);
        assert!(eviction.is_some());
    }

    #[test]
    fn invalidate_addr_clears_just_that_line() {
        let mut c = cache();
        c.install(0x0200_0000);
        c.install(0x0200_0020);
        c.invalidate_addr(0x0200_0000);
        assert!(c.lookup(0x0200_0000).is_none());
    }

    #[test]
    fn tag_debug_roundtrip_preserves_set_index() {
        let mut c = cache();
        c.install(0x0200_0000);
        let raw = c.read_tag_raw(0, 0);
        c.write_tag_raw(0, 1, raw);
        assert_eq!(c.read_tag_raw(0, 1) & 0x3, raw & 0x3);
    }
}
