//! Dense physical-register bitmaps.
//!
//! A `RegMask` keeps one bit per scalar register slot for each of the four
//! files. All addressing goes through [`file_offset`](super::reg::file_offset),
//! so merged-register mode (where half and full GPRs alias) is handled in
//! exactly one place.

use crate::ir::reg::{file_offset, slot_width, RegFile, RegFlags};

const FULL_WORDS: usize = 8; // 512 16-bit slots in merged mode
const HALF_WORDS: usize = 4;
const SHARED_WORDS: usize = 1;
const NONGPR_WORDS: usize = 1;

/// One bit per scalar register slot, per file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegMask {
    full: [u64; FULL_WORDS],
    half: [u64; HALF_WORDS],
    shared: [u64; SHARED_WORDS],
    nongpr: [u64; NONGPR_WORDS],
    merged: bool,
}

impl RegMask {
    /// New empty mask. `merged` selects merged-register addressing and must
    /// agree between masks that are compared or intersected.
    pub fn new(merged: bool) -> Self {
        Self {
            merged,
            ..Default::default()
        }
    }

    fn words(&self, file: RegFile) -> &[u64] {
        match file {
            RegFile::Full => &self.full,
            RegFile::Half => &self.half,
            RegFile::Shared => &self.shared,
            RegFile::NonGpr => &self.nongpr,
        }
    }

    fn words_mut(&mut self, file: RegFile) -> &mut [u64] {
        match file {
            RegFile::Full => &mut self.full,
            RegFile::Half => &mut self.half,
            RegFile::Shared => &mut self.shared,
            RegFile::NonGpr => &mut self.nongpr,
        }
    }

    fn bit(words: &[u64], off: u32) -> bool {
        let (w, b) = (off as usize / 64, off % 64);
        w < words.len() && words[w] & (1u64 << b) != 0
    }

    fn set_bit(words: &mut [u64], off: u32) {
        let (w, b) = (off as usize / 64, off % 64);
        debug_assert!(w < words.len(), "register slot {off} out of range");
        words[w] |= 1u64 << b;
    }

    fn clear_bit(words: &mut [u64], off: u32) {
        let (w, b) = (off as usize / 64, off % 64);
        if w < words.len() {
            words[w] &= !(1u64 << b);
        }
    }

    /// Mark every slot covered by an operand with flags `flags`, physical
    /// number `num`, and write mask `wrmask`.
    pub fn set(&mut self, flags: RegFlags, num: u16, wrmask: u16) {
        self.for_each_slot(flags, num, wrmask, |words, off| Self::set_bit(words, off));
    }

    /// Clear every slot covered by the operand.
    pub fn clear(&mut self, flags: RegFlags, num: u16, wrmask: u16) {
        self.for_each_slot(flags, num, wrmask, |words, off| Self::clear_bit(words, off));
    }

    /// Does any slot covered by the operand have its bit set?
    pub fn intersects(&self, flags: RegFlags, num: u16, wrmask: u16) -> bool {
        let (file, base) = file_offset(flags, num, self.merged);
        let width = slot_width(flags, self.merged);
        let words = self.words(file);
        let mut mask = wrmask.max(1);
        let mut comp = 0u32;
        while mask != 0 {
            if mask & 1 != 0 {
                for s in 0..width {
                    if Self::bit(words, base + comp * width + s) {
                        return true;
                    }
                }
            }
            mask >>= 1;
            comp += 1;
        }
        false
    }

    fn for_each_slot(
        &mut self,
        flags: RegFlags,
        num: u16,
        wrmask: u16,
        f: impl Fn(&mut [u64], u32),
    ) {
        let (file, base) = file_offset(flags, num, self.merged);
        let width = slot_width(flags, self.merged);
        let words = self.words_mut(file);
        let mut mask = wrmask.max(1);
        let mut comp = 0u32;
        while mask != 0 {
            if mask & 1 != 0 {
                for s in 0..width {
                    f(words, base + comp * width + s);
                }
            }
            mask >>= 1;
            comp += 1;
        }
    }

    /// Clear all bits.
    pub fn reset(&mut self) {
        let merged = self.merged;
        *self = Self::new(merged);
    }

    /// Union another mask into this one.
    pub fn union(&mut self, other: &RegMask) {
        debug_assert_eq!(self.merged, other.merged);
        for file in [RegFile::Full, RegFile::Half, RegFile::Shared, RegFile::NonGpr] {
            for (d, &s) in self.words_mut(file).iter_mut().zip(other.words(file)) {
                *d |= s;
            }
        }
    }

    /// Is the whole mask empty?
    pub fn is_empty(&self) -> bool {
        self.full.iter().all(|&w| w == 0)
            && self.half.iter().all(|&w| w == 0)
            && self.shared.iter().all(|&w| w == 0)
            && self.nongpr.iter().all(|&w| w == 0)
    }
}
