//! Resolved instructions, as executed by the simulator.
//!
//! This module holds [`SimInstr`], the form an instruction takes after
//! the assembler has resolved every label operand into an address
//! (or a built-in I/O function, for `bl`).

use crate::ast::{AddrOperand, Cond, MovSrc, Operand2, RegRef, ShiftAmt};

/// A standalone shift operation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShiftOp {
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Arithmetic shift right.
    Asr,
    /// Rotate right.
    Ror,
}

/// A built-in C-style I/O function the simulator emulates.
///
/// These are not assembled code; a `bl` naming one of them is
/// intercepted and performed by the simulator directly,
/// following the C calling convention (arguments in `x0`-`x7`,
/// result in `x0`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin {
    /// `printf(fmt, ...)`: formatted output. Returns characters printed.
    Printf,
    /// `puts(s)`: prints a string followed by a newline.
    Puts,
    /// `putchar(c)`: prints a single character.
    Putchar,
    /// `scanf(fmt, ...)`: formatted input. Returns conversions performed.
    Scanf,
    /// `gets(buf)`: reads a line (without its newline) into a buffer.
    Gets,
    /// `fgets(buf, n, stream)`: reads at most `n - 1` bytes of a line.
    Fgets,
    /// `getchar()`: reads one character, or -1 at end of input.
    Getchar,
    /// `malloc(size)`: allocates from the simulated heap.
    Malloc,
}
impl Builtin {
    /// Looks up a built-in by the name a `bl` would call it with.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "printf" => Some(Builtin::Printf),
            "puts" => Some(Builtin::Puts),
            "putchar" => Some(Builtin::Putchar),
            "scanf" => Some(Builtin::Scanf),
            "gets" => Some(Builtin::Gets),
            "fgets" => Some(Builtin::Fgets),
            "getchar" => Some(Builtin::Getchar),
            "malloc" => Some(Builtin::Malloc),
            _ => None,
        }
    }

    /// The name a `bl` calls this built-in with.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Printf => "printf",
            Builtin::Puts => "puts",
            Builtin::Putchar => "putchar",
            Builtin::Scanf => "scanf",
            Builtin::Gets => "gets",
            Builtin::Fgets => "fgets",
            Builtin::Getchar => "getchar",
            Builtin::Malloc => "malloc",
        }
    }
}

/// The target of a `bl` instruction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CallTarget {
    /// A text address.
    Addr(u64),
    /// A built-in I/O function, emulated by the simulator.
    Builtin(Builtin),
}

/// An enum representing all of the possible instructions
/// after label resolution.
///
/// Compared to [`crate::ast::asm::AsmInstr`], branch targets are text
/// addresses, `adr`/`adrp`/`:lo12:` operands are concrete values, the
/// twelve condition-suffixed branches have collapsed into [`SimInstr::Bc`],
/// and the flag-setting ALU forms carry a `set_flags` bool.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimInstr {
    /// `mov DST, SRC`.
    Mov(RegRef, MovSrc),
    /// `mvn DST, SRC`.
    Mvn(RegRef, RegRef),
    /// `add`/`adds` (the bool is the flag-setting form).
    Add(RegRef, RegRef, Operand2, bool),
    /// `sub`/`subs` (the bool is the flag-setting form).
    Sub(RegRef, RegRef, Operand2, bool),
    /// `cmp SRC1, SRC2`.
    Cmp(RegRef, Operand2),
    /// `cmn SRC1, SRC2`.
    Cmn(RegRef, Operand2),
    /// `and`/`ands` (the bool is the flag-setting form).
    And(RegRef, RegRef, Operand2, bool),
    /// `orr DST, SRC1, SRC2`.
    Orr(RegRef, RegRef, Operand2),
    /// `eor DST, SRC1, SRC2`.
    Eor(RegRef, RegRef, Operand2),
    /// `bic DST, SRC1, SRC2`.
    Bic(RegRef, RegRef, Operand2),
    /// A standalone shift (`lsl`, `lsr`, `asr`, `ror`).
    Shift(ShiftOp, RegRef, RegRef, ShiftAmt),
    /// `ldr DST, [..]`.
    Ldr(RegRef, AddrOperand),
    /// `str SRC, [..]`.
    Str(RegRef, AddrOperand),
    /// `adr DST, #ADDR`.
    Adr(RegRef, u64),
    /// `adrp DST, #ADDR` (low 12 bits already cleared).
    Adrp(RegRef, u64),
    /// `b #ADDR`.
    B(u64),
    /// A conditional branch (`beq`, `bne`, ...) to a text address.
    Bc(Cond, u64),
    /// `bl TARGET`.
    Bl(CallTarget),
    /// `cbz REG, #ADDR`.
    Cbz(RegRef, u64),
    /// `cbnz REG, #ADDR`.
    Cbnz(RegRef, u64),
    /// `ret` or `ret REG`.
    Ret(Option<RegRef>),
}

#[cfg(test)]
mod tests {
    use super::Builtin;

    #[test]
    fn test_builtin_names_round_trip() {
        let all = [
            Builtin::Printf, Builtin::Puts, Builtin::Putchar,
            Builtin::Scanf, Builtin::Gets, Builtin::Fgets,
            Builtin::Getchar, Builtin::Malloc,
        ];
        for b in all {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("exit"), None);
        // Built-in lookup is case sensitive, like label matching.
        assert_eq!(Builtin::from_name("Printf"), None);
    }
}
