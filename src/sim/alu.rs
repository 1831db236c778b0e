//! The arithmetic logic unit.
//!
//! [`ArithmeticLogicUnit`] operates on words bit by bit, the way the hardware would.
//! Every operand must have the unit's word length.

use super::word::MachineWord;
use super::SimErr;

/// Bitwise and arithmetic operations on words of one fixed length.
///
/// ```
/// use mima::sim::alu::ArithmeticLogicUnit;
/// use mima::sim::word::MachineWord;
///
/// let alu = ArithmeticLogicUnit::new(4);
/// let sum = alu.add(MachineWord::from_value(7, 4), MachineWord::from_value(1, 4)).unwrap();
/// assert_eq!(sum.int_value(), -8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticLogicUnit {
    word_length: usize
}
impl ArithmeticLogicUnit {
    /// Creates a unit operating on words of the given length.
    pub fn new(word_length: usize) -> Self {
        Self { word_length }
    }

    /// The length of words this unit operates on.
    pub fn word_length(&self) -> usize {
        self.word_length
    }

    fn check_word(&self, word: &MachineWord) -> Result<(), SimErr> {
        match word.word_length() == self.word_length {
            true  => Ok(()),
            false => Err(SimErr::WordLengthMismatch { expected: self.word_length, found: word.word_length() }),
        }
    }

    fn bitwise(&self, a: MachineWord, b: MachineWord, op: impl Fn(bool, bool) -> bool) -> Result<MachineWord, SimErr> {
        self.check_word(&a)?;
        self.check_word(&b)?;

        let word = (0..self.word_length)
            .fold(MachineWord::zero(self.word_length), |w, i| w.with_bit(i, op(a.bit(i), b.bit(i))));
        Ok(word)
    }

    /// Adds two words with a ripple-carry adder.
    ///
    /// Overflow wraps around.
    pub fn add(&self, a: MachineWord, b: MachineWord) -> Result<MachineWord, SimErr> {
        self.check_word(&a)?;
        self.check_word(&b)?;

        let mut carry = false;
        let mut sum = MachineWord::zero(self.word_length);
        for i in 0..self.word_length {
            let (x, y) = (a.bit(i), b.bit(i));

            let bit = if x && y {
                std::mem::replace(&mut carry, true)
            } else if x || y {
                !carry
            } else {
                std::mem::replace(&mut carry, false)
            };
            sum = sum.with_bit(i, bit);
        }

        Ok(sum)
    }

    /// Bitwise AND.
    pub fn and(&self, a: MachineWord, b: MachineWord) -> Result<MachineWord, SimErr> {
        self.bitwise(a, b, |x, y| x && y)
    }

    /// Bitwise OR.
    pub fn or(&self, a: MachineWord, b: MachineWord) -> Result<MachineWord, SimErr> {
        self.bitwise(a, b, |x, y| x || y)
    }

    /// Bitwise XOR.
    pub fn xor(&self, a: MachineWord, b: MachineWord) -> Result<MachineWord, SimErr> {
        self.bitwise(a, b, |x, y| x ^ y)
    }

    /// Compares two words, returning -1 (all ones) if they are equal and 0 otherwise.
    pub fn negative_if_equals(&self, a: MachineWord, b: MachineWord) -> Result<MachineWord, SimErr> {
        let xnor = self.bitwise(a, b, |x, y| if x { y } else { !y })?;
        match xnor.int_value() {
            -1 => Ok(xnor),
            _  => Ok(MachineWord::zero(self.word_length)),
        }
    }

    /// Rotates a word right by one bit. The least significant bit becomes the most significant bit.
    pub fn rar(&self, a: MachineWord) -> Result<MachineWord, SimErr> {
        self.check_word(&a)?;

        let n = self.word_length;
        let word = (0..n)
            .fold(MachineWord::zero(n), |w, i| w.with_bit(i, a.bit((i + 1) % n)));
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::word::MachineWord;
    use crate::sim::SimErr;

    use super::ArithmeticLogicUnit;

    fn w(v: i64) -> MachineWord {
        MachineWord::from_value(v, 4)
    }

    #[test]
    fn test_add() {
        let alu = ArithmeticLogicUnit::new(4);
        for x in -8..8 {
            for y in -8..8 {
                let xy = alu.add(w(x), w(y)).unwrap();
                assert_eq!(xy, alu.add(w(y), w(x)).unwrap(), "{x} + {y} is not commutative");

                let expected = (x + y + 8).rem_euclid(16) - 8;
                assert_eq!(xy.int_value(), expected, "{x} + {y}");
            }
        }
        assert_eq!(alu.add(w(7), w(1)).unwrap().int_value(), -8);
    }

    #[test]
    fn test_bitwise() {
        let alu = ArithmeticLogicUnit::new(4);
        for x in -8..8 {
            assert_eq!(alu.xor(w(x), w(x)).unwrap(), MachineWord::zero(4));
            assert_eq!(alu.and(w(x), w(-1)).unwrap(), w(x));
            assert_eq!(alu.or(w(x), w(0)).unwrap(), w(x));
        }
        assert_eq!(alu.and(w(0b0110), w(0b0011)).unwrap(), w(0b0010));
        assert_eq!(alu.or(w(0b0110), w(0b0011)).unwrap(), w(0b0111));
        assert_eq!(alu.xor(w(0b0110), w(0b0011)).unwrap(), w(0b0101));
    }

    #[test]
    fn test_negative_if_equals() {
        let alu = ArithmeticLogicUnit::new(4);
        for x in -8..8 {
            for y in -8..8 {
                let eq = alu.negative_if_equals(w(x), w(y)).unwrap();
                match x == y {
                    true  => assert_eq!(eq.int_value(), -1),
                    false => assert_eq!(eq.int_value(), 0),
                }
            }
        }
    }

    #[test]
    fn test_rar() {
        let alu = ArithmeticLogicUnit::new(4);
        assert_eq!(alu.rar(w(0b0001)).unwrap().binary_representation(), "1000");
        assert_eq!(alu.rar(w(0b0110)).unwrap().binary_representation(), "0011");

        for x in -8..8 {
            let rotated = (0..4).try_fold(w(x), |acc, _| alu.rar(acc)).unwrap();
            assert_eq!(rotated, w(x));
        }

        let alu = ArithmeticLogicUnit::new(24);
        let word = MachineWord::from_value(-123_456, 24);
        let rotated = (0..24).try_fold(word, |acc, _| alu.rar(acc)).unwrap();
        assert_eq!(rotated, word);
    }

    #[test]
    fn test_width_mismatch() {
        let alu = ArithmeticLogicUnit::new(4);
        let err = alu.add(w(1), MachineWord::from_value(1, 8)).unwrap_err();
        assert_eq!(err, SimErr::WordLengthMismatch { expected: 4, found: 8 });
        assert!(alu.rar(MachineWord::zero(3)).is_err());
    }
}
