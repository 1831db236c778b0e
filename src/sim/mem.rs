//! Memory handling for the Mima interpreter.
//!
//! This module consists of [`MemoryMap`], a sparse mapping of addresses to [`MachineWord`]s.
//!
//! Memory is created with an initial capacity, and every address below it is filled with zero.
//! Any other address is created (as zero) when it is first accessed.
//! Addresses may be negative, as automatically reserved variables live at negative addresses.
//!
//! ```
//! use mima::sim::mem::MemoryMap;
//! use mima::sim::word::MachineWord;
//!
//! let mut mem = MemoryMap::new(24, 100);
//! assert_eq!(mem.len(), 100);
//! assert_eq!(mem.load(500).int_value(), 0);
//!
//! mem.store(-1, MachineWord::from_value(7, 20)).unwrap();
//! let word = mem.load(-1);
//! assert_eq!(word.int_value(), 7);
//! assert_eq!(word.word_length(), 24);
//! ```

use std::collections::BTreeMap;

use super::word::MachineWord;
use super::SimErr;

/// A sparse mapping of addresses to words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    word_length: usize,
    initial_capacity: usize,
    values: BTreeMap<i64, MachineWord>
}
impl MemoryMap {
    /// Creates a new memory map, where every word has the given length
    /// and the first `initial_capacity` addresses are filled with zero.
    pub fn new(word_length: usize, initial_capacity: usize) -> Self {
        let mut mem = Self { word_length, initial_capacity, values: BTreeMap::new() };
        mem.empty();
        mem
    }

    /// The length of the words held in this memory.
    pub fn word_length(&self) -> usize {
        self.word_length
    }

    /// The number of addresses currently held in memory.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no addresses are held in memory.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads the word at the given address.
    ///
    /// If the address has not been accessed before, it is created with value zero.
    pub fn load(&mut self, address: i64) -> MachineWord {
        let zero = MachineWord::zero(self.word_length);
        *self.values.entry(address).or_insert(zero)
    }

    /// Reads the word at the given address without creating it.
    pub fn get(&self, address: i64) -> Option<MachineWord> {
        self.values.get(&address).copied()
    }

    /// Writes a word to the given address.
    ///
    /// The word is converted to this memory's word length.
    ///
    /// This errors if memory already holds every address a word of this length can express.
    pub fn store(&mut self, address: i64, value: MachineWord) -> Result<(), SimErr> {
        let limit = 1u64 << self.word_length;
        if self.values.len() as u64 >= limit && !self.values.contains_key(&address) {
            return Err(SimErr::MemoryExhausted);
        }

        self.values.insert(address, MachineWord::cast(value, self.word_length));
        Ok(())
    }

    /// Sets every held address to zero, keeping the addresses.
    pub fn reset(&mut self) {
        let zero = MachineWord::zero(self.word_length);
        self.values.values_mut().for_each(|w| *w = zero);
    }

    /// Removes every address, then refills the initial capacity with zeros.
    pub fn empty(&mut self) {
        let zero = MachineWord::zero(self.word_length);
        let capacity = i64::try_from(self.initial_capacity).unwrap_or(i64::MAX);

        self.values.clear();
        self.values.extend((0..capacity).map(|addr| (addr, zero)));
    }

    /// Iterates over every held address and its word, in address order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, MachineWord)> + '_ {
        self.values.iter().map(|(&addr, &word)| (addr, word))
    }
}
