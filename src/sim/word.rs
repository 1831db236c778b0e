//! The fixed-width machine word.
//!
//! A [`MachineWord`] is a bit vector of a fixed length between 1 and [`MAX_WORD_LENGTH`] bits,
//! where bit 0 is the least significant bit.
//!
//! Words are signed. A non-negative value `v` is stored as the bits of `v`.
//! A negative value `v` is stored by taking the bits of `|v| - 1` and inverting all of them.
//! This agrees with two's complement.
//!
//! ```
//! use mima::sim::word::MachineWord;
//!
//! let word = MachineWord::from_value(-3, 4);
//! assert_eq!(word.binary_representation(), "1101");
//! assert_eq!(word.int_value(), -3);
//! assert!(word.msb());
//! ```

/// The largest supported word length.
pub const MAX_WORD_LENGTH: usize = 32;

/// A fixed-width bit vector with a signed interpretation.
///
/// Words are `Copy`, so reading a word out of memory or a register
/// always produces an independent copy.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct MachineWord {
    bits: u64,
    len: u8
}
impl MachineWord {
    fn mask(len: usize) -> u64 {
        (1 << len) - 1
    }
    fn checked_len(len: usize) -> u8 {
        assert!((1..=MAX_WORD_LENGTH).contains(&len), "word length must be between 1 and {MAX_WORD_LENGTH}, was {len}");
        len as u8
    }

    /// Creates the zero word of the given length.
    ///
    /// # Panics
    ///
    /// This panics if the length is 0 or greater than [`MAX_WORD_LENGTH`].
    pub fn zero(len: usize) -> Self {
        Self { bits: 0, len: Self::checked_len(len) }
    }

    /// Creates a word holding the given value.
    ///
    /// Values which do not fit in the word are truncated to its lowest bits.
    ///
    /// # Panics
    ///
    /// This panics if the length is 0 or greater than [`MAX_WORD_LENGTH`].
    pub fn from_value(value: i64, len: usize) -> Self {
        let len8 = Self::checked_len(len);
        let negative = value < 0;

        let mut magnitude = value.unsigned_abs();
        if negative {
            magnitude -= 1;
        }

        let mut bits = 0;
        for i in 0..len {
            if (magnitude >> i) & 1 == 1 {
                bits |= 1 << i;
            }
        }
        if negative {
            bits = !bits & Self::mask(len);
        }

        Self { bits, len: len8 }
    }

    /// Creates a word from its bits, least significant bit first.
    ///
    /// The length of the word is the number of bits provided.
    ///
    /// # Panics
    ///
    /// This panics if the number of bits is 0 or greater than [`MAX_WORD_LENGTH`].
    pub fn from_bits(bits: &[bool]) -> Self {
        let len = Self::checked_len(bits.len());
        let bits = bits.iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .fold(0u64, |acc, (i, _)| acc | (1 << i));

        Self { bits, len }
    }

    /// Creates a word of the given length from a string of binary digits,
    /// most significant digit first (as in a `~1010` literal).
    ///
    /// This returns `None` if the string has characters other than `0` and `1`,
    /// or more digits than the word has bits.
    pub fn from_binary_str(digits: &str, len: usize) -> Option<Self> {
        let word = Self::zero(len);
        if digits.len() > len {
            return None;
        }

        digits.chars()
            .rev()
            .enumerate()
            .try_fold(word, |word, (i, c)| match c {
                '0' => Some(word),
                '1' => Some(word.with_bit(i, true)),
                _ => None
            })
    }

    /// Converts a word to a different length, keeping its value.
    ///
    /// If the value does not fit, it is truncated.
    pub fn cast(word: MachineWord, len: usize) -> Self {
        Self::from_value(word.int_value(), len)
    }

    /// The signed value of this word.
    pub fn int_value(&self) -> i64 {
        let negative = self.msb();

        let mut value = i64::from(negative);
        for i in 0..(self.word_length() - 1) {
            if self.bit(i) ^ negative {
                value += 1 << i;
            }
        }

        match negative {
            true  => -value,
            false => value,
        }
    }

    /// The number of bits in this word.
    pub fn word_length(&self) -> usize {
        usize::from(self.len)
    }

    /// Gets the bit at the given index (where 0 is the least significant bit).
    ///
    /// Bits outside of the word are 0.
    pub fn bit(&self, index: usize) -> bool {
        index < self.word_length() && (self.bits >> index) & 1 == 1
    }

    /// Creates a copy of this word with the bit at the given index set to `value`.
    ///
    /// Indices outside of the word are ignored.
    pub fn with_bit(self, index: usize, value: bool) -> Self {
        if index >= self.word_length() {
            return self;
        }
        let bits = match value {
            true  => self.bits | (1 << index),
            false => self.bits & !(1 << index),
        };
        Self { bits, ..self }
    }

    /// The bits of this word, least significant bit first.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.word_length()).map(|i| self.bit(i))
    }

    /// The most significant (sign) bit.
    pub fn msb(&self) -> bool {
        self.bit(self.word_length() - 1)
    }

    /// The least significant bit.
    pub fn lsb(&self) -> bool {
        self.bit(0)
    }

    /// Creates a copy of this word with every bit flipped.
    pub fn invert(&self) -> Self {
        Self { bits: !self.bits & Self::mask(self.word_length()), len: self.len }
    }

    /// The bits of this word as a string of `0`s and `1`s, most significant bit first.
    pub fn binary_representation(&self) -> String {
        (0..self.word_length()).rev()
            .map(|i| if self.bit(i) { '1' } else { '0' })
            .collect()
    }
}
impl std::fmt::Display for MachineWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.int_value(), f)
    }
}
impl std::fmt::Binary for MachineWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.binary_representation())
    }
}
impl std::fmt::Debug for MachineWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MachineWord({} = {:b})", self.int_value(), self)
    }
}
