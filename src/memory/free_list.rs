//! Lock-free free list for block indices.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

const WORD_BITS: usize = 64;

/// A lock-free bitmap tracking which block indices of a pool are free.
///
/// Each bit represents one block: 0 = free, 1 = allocated. Bits past
/// `num_slots` in the last word are permanently set, so a scan never has to
/// bounds-check a candidate index.
///
/// # Performance
///
/// - `acquire_slot`: O(n/64) worst case, where n is number of slots
/// - `acquire_many`: O(n/64 + k), claiming up to 64 bits per CAS
/// - `release_slot`: O(1)
/// - `release_many`: one `fetch_and` per run of indices sharing a word
pub struct FreeList {
    /// Array of atomic 64-bit words.
    words: Box<[AtomicU64]>,
    /// Total number of slots (may be less than words.len() * 64).
    num_slots: usize,
}

impl FreeList {
    /// Create a new free list with all `num_slots` indices free.
    pub fn new(num_slots: usize) -> Self {
        let num_words = num_slots.div_ceil(WORD_BITS);
        let words: Vec<AtomicU64> = (0..num_words)
            .map(|word_idx| AtomicU64::new(padding_bits(word_idx, num_slots)))
            .collect();

        Self {
            words: words.into_boxed_slice(),
            num_slots,
        }
    }

    /// Like [`FreeList::new`], but reports allocation failure instead of
    /// aborting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the bitmap cannot be allocated.
    pub fn try_new(num_slots: usize) -> Result<Self> {
        let num_words = num_slots.div_ceil(WORD_BITS);
        let mut words = Vec::new();
        words.try_reserve_exact(num_words).map_err(|err| {
            Error::AllocationFailed(format!("free list for {num_slots} slots: {err}"))
        })?;
        words.extend(
            (0..num_words).map(|word_idx| AtomicU64::new(padding_bits(word_idx, num_slots))),
        );

        Ok(Self {
            words: words.into_boxed_slice(),
            num_slots,
        })
    }

    /// Try to claim one free index.
    ///
    /// Returns `None` if every index is allocated. Lock-free and thread-safe:
    /// a given index is handed to exactly one caller until it is released.
    pub fn acquire_slot(&self) -> Option<usize> {
        for (word_idx, word) in self.words.iter().enumerate() {
            let mut current = word.load(Ordering::Relaxed);
            while current != u64::MAX {
                let bit_idx = (!current).trailing_zeros() as usize;
                let new_value = current | (1u64 << bit_idx);
                match word.compare_exchange_weak(
                    current,
                    new_value,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some(word_idx * WORD_BITS + bit_idx),
                    Err(actual) => current = actual,
                }
            }
        }

        None
    }

    /// Claim up to `out.len()` free indices, writing them to the front of `out`.
    ///
    /// Returns the number of indices claimed. A short count means the list ran
    /// out of free indices during the scan, never that a claim was dropped.
    pub fn acquire_many(&self, out: &mut [usize]) -> usize {
        let mut claimed = 0;

        for (word_idx, word) in self.words.iter().enumerate() {
            if claimed == out.len() {
                break;
            }

            let mut current = word.load(Ordering::Relaxed);
            while current != u64::MAX {
                let mask = lowest_free_bits(current, out.len() - claimed);
                match word.compare_exchange_weak(
                    current,
                    current | mask,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let mut bits = mask;
                        while bits != 0 {
                            out[claimed] = word_idx * WORD_BITS + bits.trailing_zeros() as usize;
                            claimed += 1;
                            bits &= bits - 1;
                        }
                        break;
                    }
                    Err(actual) => current = actual,
                }
            }
        }

        claimed
    }

    /// Release a previously claimed index.
    ///
    /// # Panics
    ///
    /// Panics if `slot_idx` is out of bounds.
    pub fn release_slot(&self, slot_idx: usize) {
        assert!(slot_idx < self.num_slots, "slot index out of bounds");

        let bit = 1u64 << (slot_idx % WORD_BITS);
        let previous = self.words[slot_idx / WORD_BITS].fetch_and(!bit, Ordering::Release);
        debug_assert!(previous & bit != 0, "slot {slot_idx} released while free");
    }

    /// Release many previously claimed indices.
    ///
    /// Consecutive indices that share a word are cleared with one atomic
    /// operation; the final state is the same as releasing each individually.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    pub fn release_many(&self, indices: impl IntoIterator<Item = usize>) {
        let mut pending: Option<(usize, u64)> = None;

        for slot_idx in indices {
            assert!(slot_idx < self.num_slots, "slot index out of bounds");
            let word_idx = slot_idx / WORD_BITS;
            let bit = 1u64 << (slot_idx % WORD_BITS);

            pending = match pending {
                Some((idx, mask)) if idx == word_idx => Some((idx, mask | bit)),
                Some((idx, mask)) => {
                    self.clear_bits(idx, mask);
                    Some((word_idx, bit))
                }
                None => Some((word_idx, bit)),
            };
        }

        if let Some((idx, mask)) = pending {
            self.clear_bits(idx, mask);
        }
    }

    fn clear_bits(&self, word_idx: usize, mask: u64) {
        let previous = self.words[word_idx].fetch_and(!mask, Ordering::Release);
        debug_assert_eq!(previous & mask, mask, "released a free slot");
    }

    /// Check if an index is currently claimed.
    ///
    /// Note: This is a snapshot and may change immediately after returning.
    pub fn is_allocated(&self, slot_idx: usize) -> bool {
        if slot_idx >= self.num_slots {
            return false;
        }

        let bit = 1u64 << (slot_idx % WORD_BITS);
        self.words[slot_idx / WORD_BITS].load(Ordering::Relaxed) & bit != 0
    }

    /// Count the number of free indices.
    ///
    /// Note: This is a snapshot and may change immediately after returning.
    pub fn count_free(&self) -> usize {
        self.words
            .iter()
            .map(|word| (!word.load(Ordering::Relaxed)).count_ones() as usize)
            .sum()
    }

    /// Get the total number of indices.
    pub fn capacity(&self) -> usize {
        self.num_slots
    }
}

/// Bits of word `word_idx` that lie past `num_slots` and must never be handed out.
fn padding_bits(word_idx: usize, num_slots: usize) -> u64 {
    let valid = num_slots.saturating_sub(word_idx * WORD_BITS);
    if valid >= WORD_BITS {
        0
    } else {
        u64::MAX << valid
    }
}

/// Mask of the lowest `want` zero bits of `word`.
fn lowest_free_bits(word: u64, want: usize) -> u64 {
    let mut free = !word;
    let mut mask = 0;
    for _ in 0..want {
        if free == 0 {
            break;
        }
        let lowest = free & free.wrapping_neg();
        mask |= lowest;
        free &= free - 1;
    }
    mask
}
