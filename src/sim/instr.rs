//! Instructions and instruction sets.
//!
//! The Mima has a small set of built-in instructions, which are called like functions
//! in source code (e.g., `LDC(5)`). [`InstructionSet`] selects which of these are available.

use std::path::Path;

macro_rules! instr_enum {
    ($(#[$m:meta])* pub enum $E:ident {
        $($(#[$vm:meta])* $V:ident: $argc:literal),* $(,)?
    }) => {
        $(#[$m])*
        pub enum $E {
            $($(#[$vm])* $V),*
        }
        impl $E {
            /// All instructions, in declaration order.
            pub const ALL: &'static [$E] = &[$($E::$V),*];

            /// The name of the instruction as it appears in source code.
            pub fn name(&self) -> &'static str {
                match self {
                    $($E::$V => stringify!($V)),*
                }
            }

            /// The number of arguments this instruction accepts.
            pub fn arg_count(&self) -> usize {
                match self {
                    $($E::$V => $argc),*
                }
            }

            /// Looks up an instruction by its (case-sensitive) name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($V) => Some($E::$V),)*
                    _ => None
                }
            }
        }
    }
}

instr_enum! {
    /// A built-in instruction.
    #[allow(clippy::upper_case_acronyms)]
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub enum Instruction {
        /// Loads a constant into the accumulator.
        LDC: 1,
        /// Loads the word at an address into the accumulator.
        LDV: 1,
        /// Stores the accumulator at an address.
        STV: 1,
        /// Loads the word at the address held at an address.
        LDIV: 1,
        /// Stores the accumulator at the address held at an address.
        STIV: 1,
        /// Adds the word at an address to the accumulator.
        ADD: 1,
        /// Bitwise AND of the accumulator and the word at an address.
        AND: 1,
        /// Bitwise OR of the accumulator and the word at an address.
        OR: 1,
        /// Bitwise XOR of the accumulator and the word at an address.
        XOR: 1,
        /// Sets the accumulator to -1 if it equals the word at an address, 0 otherwise.
        EQL: 1,
        /// Inverts every bit of the accumulator.
        NOT: 0,
        /// Rotates the accumulator right by one bit.
        RAR: 0,
        /// Jumps to a label.
        JMP: 1,
        /// Jumps to a label if the accumulator is negative.
        JMN: 1,
        /// Stops the machine.
        HALT: 0,
        /// Adds a constant to the accumulator.
        ADC: 1,
        /// Loads the stack pointer into the accumulator.
        LDSP: 0,
        /// Stores the accumulator into the stack pointer.
        STSP: 0,
        /// Evaluates to the value of the stack pointer.
        SP: 0,
        /// Stores the accumulator at the stack pointer plus an offset.
        STVR: 2,
        /// Loads the word at the stack pointer plus an offset.
        LDVR: 2,
        /// Calls a label, remembering where to return to.
        CALL: 1,
        /// Returns to the most recent call.
        RET: 0,
    }
}
impl Instruction {
    /// Whether this instruction evaluates to a value, and can therefore be used as an argument.
    pub fn returns_value(&self) -> bool {
        matches!(self, Instruction::SP)
    }
}
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The instruction sets the Mima can run.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum InstructionSet {
    /// The basic Mima.
    #[default]
    Mima,
    /// The Mima with stack and subroutine instructions.
    MimaX
}
impl InstructionSet {
    const MIMA: &'static [Instruction] = {
        use Instruction::*;
        &[LDC, LDV, STV, LDIV, STIV, ADD, AND, OR, XOR, EQL, NOT, RAR, JMP, JMN, HALT]
    };

    /// The length of a machine word.
    pub fn word_length(&self) -> usize {
        24
    }

    /// The length of a constant (as loaded by `LDC`).
    pub fn const_word_length(&self) -> usize {
        match self {
            InstructionSet::Mima  => 20,
            InstructionSet::MimaX => 24,
        }
    }

    /// The file extension of source files written for this instruction set.
    pub fn extension(&self) -> &'static str {
        match self {
            InstructionSet::Mima  => "mima",
            InstructionSet::MimaX => "mimax",
        }
    }

    /// Every known source file extension.
    pub fn extensions() -> [&'static str; 2] {
        [InstructionSet::Mima.extension(), InstructionSet::MimaX.extension()]
    }

    /// Picks the instruction set a file was written for, based on its extension.
    ///
    /// ```
    /// use mima::sim::instr::InstructionSet;
    ///
    /// assert_eq!(InstructionSet::for_file("a/b.mimax".as_ref()), Some(InstructionSet::MimaX));
    /// assert_eq!(InstructionSet::for_file("b.txt".as_ref()), None);
    /// ```
    pub fn for_file(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mima"  => Some(InstructionSet::Mima),
            "mimax" => Some(InstructionSet::MimaX),
            _ => None
        }
    }

    /// The instructions available in this set.
    pub fn instructions(&self) -> &'static [Instruction] {
        match self {
            InstructionSet::Mima  => Self::MIMA,
            InstructionSet::MimaX => Instruction::ALL,
        }
    }

    /// Whether this set has the given instruction.
    pub fn contains(&self, instr: Instruction) -> bool {
        self.instructions().contains(&instr)
    }
}

#[cfg(test)]
mod tests {
    use super::{Instruction, InstructionSet};

    #[test]
    fn test_names() {
        for &instr in Instruction::ALL {
            assert_eq!(Instruction::from_name(instr.name()), Some(instr));
        }
        assert_eq!(Instruction::from_name("ldc"), None);
        assert_eq!(Instruction::STVR.arg_count(), 2);
        assert!(Instruction::SP.returns_value());
        assert!(!Instruction::LDSP.returns_value());
    }

    #[test]
    fn test_sets() {
        let mima = InstructionSet::Mima;
        let mimax = InstructionSet::MimaX;

        assert!(mima.contains(Instruction::HALT));
        assert!(!mima.contains(Instruction::CALL));
        assert!(mimax.contains(Instruction::CALL));
        assert!(mima.instructions().iter().all(|&i| mimax.contains(i)));

        assert_eq!(mima.const_word_length(), 20);
        assert_eq!(mimax.const_word_length(), 24);
        assert_eq!(InstructionSet::extensions(), ["mima", "mimax"]);
    }
}
