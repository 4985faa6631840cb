//! Branch outcome history registers.
//!
//! Everything here records outcomes with the most recent one at age 0.

use crate::error::{allocate, ConfigError};
use bitvec::prelude::*;

/// Shift register of the last `width` (at most 64) outcomes.
#[derive(Clone, Debug)]
pub struct GlobalHistory {
    bits: u64,
    mask: u64,
}

impl GlobalHistory {
    pub fn new(width: u32) -> GlobalHistory {
        let mask = if width >= 64 {
            u64::MAX
        } else {
            (1 << width) - 1
        };
        GlobalHistory { bits: 0, mask }
    }

    pub fn get(&self) -> u64 {
        self.bits
    }

    pub fn push(&mut self, taken: bool) {
        self.bits = (self.bits << 1 | taken as u64) & self.mask;
    }
}

/// First level of a local two-level predictor: one history register per
/// PC-indexed slot.
#[derive(Clone, Debug)]
pub struct LocalHistoryTable {
    histories: Vec<u32>,
    index_mask: u32,
    history_mask: u32,
}

impl LocalHistoryTable {
    pub fn new(index_bits: u32, history_bits: u32) -> Result<LocalHistoryTable, ConfigError> {
        Ok(LocalHistoryTable {
            histories: allocate("local history table", 1 << index_bits, 0)?,
            index_mask: (1 << index_bits) - 1,
            history_mask: ((1u64 << history_bits) - 1) as u32,
        })
    }

    pub fn get(&self, pc: u32) -> u32 {
        self.histories[(pc & self.index_mask) as usize] & self.history_mask
    }

    pub fn push(&mut self, pc: u32, taken: bool) {
        let slot = &mut self.histories[(pc & self.index_mask) as usize];
        *slot = (*slot << 1 | taken as u32) & self.history_mask;
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn release(&mut self) {
        self.histories = Vec::new();
    }
}

/// Long global history kept as a circular bit buffer, so pushing an outcome
/// costs O(1) regardless of how many bits the longest TAGE bank looks at.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    bits: BitVec<usize, Lsb0>,
    head: usize,
    mask: usize,
    /// The 64 most recent outcomes, newest in bit 0.
    recent: u64,
}

impl HistoryBuffer {
    /// A buffer able to answer `bit(age)` for every `age <= max_age`.
    pub fn new(max_age: usize) -> HistoryBuffer {
        let capacity = (max_age + 1).next_power_of_two();
        HistoryBuffer {
            bits: bitvec![usize, Lsb0; 0; capacity],
            head: 0,
            mask: capacity - 1,
            recent: 0,
        }
    }

    pub fn bit(&self, age: usize) -> bool {
        debug_assert!(age <= self.mask);
        self.bits[self.head.wrapping_sub(age) & self.mask]
    }

    /// The `n` (at most 64) most recent outcomes packed with the newest in bit 0.
    pub fn low_bits(&self, n: usize) -> u64 {
        if n >= 64 {
            self.recent
        } else {
            self.recent & ((1 << n) - 1)
        }
    }

    pub fn push(&mut self, taken: bool) {
        self.head = (self.head + 1) & self.mask;
        self.bits.set(self.head, taken);
        self.recent = self.recent << 1 | taken as u64;
    }
}

/// The last `original_length` outcomes XOR-folded into `compressed_length`
/// bits, kept up to date with a constant amount of work per outcome.
#[derive(Clone, Debug)]
pub struct FoldedHistory {
    comp: u32,
    original_length: usize,
    compressed_length: u32,
    outpoint: u32,
}

impl FoldedHistory {
    pub fn new(original_length: usize, compressed_length: u32) -> FoldedHistory {
        debug_assert!(original_length > 0 && (1..32).contains(&compressed_length));
        FoldedHistory {
            comp: 0,
            original_length,
            compressed_length,
            outpoint: (original_length % compressed_length as usize) as u32,
        }
    }

    pub fn get(&self) -> u32 {
        self.comp
    }

    pub fn original_length(&self) -> usize {
        self.original_length
    }

    /// Must run before `history` itself records `taken`: the bit leaving the
    /// window is read at age `original_length - 1`.
    pub fn update(&mut self, history: &HistoryBuffer, taken: bool) {
        let outgoing = history.bit(self.original_length - 1) as u32;
        self.comp = self.comp << 1 | taken as u32;
        self.comp ^= outgoing << self.outpoint;
        self.comp ^= self.comp >> self.compressed_length;
        self.comp &= (1 << self.compressed_length) - 1;
    }
}

/// Circular buffer of bipolar (-1/+1) outcomes used as perceptron inputs.
#[derive(Clone, Debug)]
pub struct BipolarHistory {
    inputs: Vec<i8>,
    next: usize,
}

impl BipolarHistory {
    pub fn new(length: usize) -> Result<BipolarHistory, ConfigError> {
        Ok(BipolarHistory {
            inputs: allocate("perceptron history", length, -1)?,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Inputs ordered from the most recent outcome to the oldest.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let (latest, earliest) = self.inputs.split_at(self.next);
        earliest
            .iter()
            .chain(latest.iter())
            .rev()
            .map(|&x| x as i32)
    }

    pub fn push(&mut self, taken: bool) {
        if self.inputs.is_empty() {
            return;
        }
        self.inputs[self.next] = if taken { 1 } else { -1 };
        self.next = (self.next + 1) % self.inputs.len();
    }

    pub fn release(&mut self) {
        self.inputs = Vec::new();
        self.next = 0;
    }
}
