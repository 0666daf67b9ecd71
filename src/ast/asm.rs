//! Instructions and directives as they appear in assembly source code.
//!
//! This module holds:
//! - [`AsmInstr`]: an instruction whose label operands are still unresolved names
//! - [`Directive`]: an assembler directive (e.g., `.data`, `.quad`, `.asciz`)
//! - [`Stmt`]: one source line's worth of labels plus an instruction or directive
//!
//! The parser produces these, and the assembler's two passes
//! ([`crate::asm::SymbolTable`] and [`crate::asm::assemble`]) consume them.

use crate::ast::{AddrOperand, Label, MovSrc, Operand2, RegRef, Section, ShiftAmt};

/// One statement of assembly source code.
///
/// A statement consists of any labels preceding it
/// and at most one instruction or directive.
#[derive(Debug, PartialEq, Clone)]
pub struct Stmt {
    /// The labels attached to this statement.
    pub labels: Vec<Label>,
    /// The instruction or directive (if the line was not labels-only or blank).
    pub nucleus: Option<StmtKind>,
    /// The 0-indexed source line of the statement.
    pub line: usize,
}

/// The instruction or directive of a [`Stmt`].
#[derive(Debug, PartialEq, Clone)]
pub enum StmtKind {
    /// An instruction.
    Instr(AsmInstr),
    /// A directive.
    Directive(Directive),
    /// An unrecognized mnemonic, kept so the assembler can warn about it.
    Unknown(String),
}

/// A value appearing in a data directive (`.quad 1, label, 0x10`).
#[derive(Debug, PartialEq, Clone)]
pub enum DataValue {
    /// A numeric constant.
    Num(i64),
    /// A label whose address becomes the value.
    Label(String),
}

/// An assembler directive.
#[derive(Debug, PartialEq, Clone)]
pub enum Directive {
    /// Switches the current section (`.text`, `.rodata`, `.data`, `.bss`).
    Section(Section),
    /// Marks symbols as global (`.global main`).
    Global(Vec<String>),
    /// Emits 8-byte values.
    Quad(Vec<DataValue>),
    /// Emits 4-byte values.
    Word(Vec<DataValue>),
    /// Emits 2-byte values.
    Hword(Vec<DataValue>),
    /// Emits 1-byte values.
    Byte(Vec<DataValue>),
    /// Reserves `n` zeroed bytes.
    Skip(u64),
    /// Advances the location counter to a multiple of `2^p`.
    Align(u32),
    /// Emits a NUL-terminated string.
    Asciz(String),
}

/// The second source operand of `add`/`sub`/`cmp` in source form,
/// where a `:lo12:` relocation may still be an unresolved label.
#[derive(Debug, PartialEq, Clone)]
pub enum AluRhs {
    /// An immediate value.
    Imm(i64),
    /// A register.
    Reg(RegRef),
    /// The low 12 bits of a label's address (`:lo12:label`).
    Lo12(Label),
}

/// An enum representing all of the possible instructions in the
/// accepted ARM64 subset, in source form.
///
/// The variants here are raw structs of the mnemonic's operands.
/// Label operands remain names; the assembler resolves them into
/// a [`crate::ast::sim::SimInstr`].
///
/// Every condition suffix of the conditional branch is its own
/// opcode (`beq`, `bne`, ...), matching what assemblers accept;
/// they collapse into one conditional-branch form on resolution.
#[derive(Debug, PartialEq, Clone)]
pub enum AsmInstr {
    /// A move: `mov DST, SRC` where `SRC` is a register or an
    /// immediate satisfying the MOVZ/MOVN encodability rule.
    Mov(RegRef, MovSrc),
    /// A bitwise NOT move: `mvn DST, SRC`.
    Mvn(RegRef, RegRef),

    /// An addition: `add DST, SRC1, SRC2`.
    Add(RegRef, RegRef, AluRhs),
    /// A flag-setting addition: `adds DST, SRC1, SRC2`.
    Adds(RegRef, RegRef, AluRhs),
    /// A subtraction: `sub DST, SRC1, SRC2`.
    Sub(RegRef, RegRef, AluRhs),
    /// A flag-setting subtraction: `subs DST, SRC1, SRC2`.
    Subs(RegRef, RegRef, AluRhs),
    /// A comparison: `cmp SRC1, SRC2` (a `subs` discarding its result).
    Cmp(RegRef, AluRhs),
    /// A negated comparison: `cmn SRC1, SRC2` (an `adds` discarding its result).
    Cmn(RegRef, AluRhs),

    /// A bitwise AND: `and DST, SRC1, SRC2`.
    And(RegRef, RegRef, Operand2),
    /// A flag-setting bitwise AND: `ands DST, SRC1, SRC2`.
    Ands(RegRef, RegRef, Operand2),
    /// A bitwise OR: `orr DST, SRC1, SRC2`.
    Orr(RegRef, RegRef, Operand2),
    /// A bitwise XOR: `eor DST, SRC1, SRC2`.
    Eor(RegRef, RegRef, Operand2),
    /// A bit clear: `bic DST, SRC1, SRC2` (AND with complement).
    Bic(RegRef, RegRef, Operand2),

    /// A logical shift left: `lsl DST, SRC, AMT`.
    Lsl(RegRef, RegRef, ShiftAmt),
    /// A logical shift right: `lsr DST, SRC, AMT`.
    Lsr(RegRef, RegRef, ShiftAmt),
    /// An arithmetic shift right: `asr DST, SRC, AMT`.
    Asr(RegRef, RegRef, ShiftAmt),
    /// A rotate right: `ror DST, SRC, AMT`.
    Ror(RegRef, RegRef, ShiftAmt),

    /// A load: `ldr DST, [..]`.
    Ldr(RegRef, AddrOperand),
    /// A store: `str SRC, [..]`.
    Str(RegRef, AddrOperand),
    /// An address load: `adr DST, LABEL`.
    Adr(RegRef, Label),
    /// A page-address load: `adrp DST, LABEL` (address with low 12 bits cleared).
    Adrp(RegRef, Label),

    /// An unconditional branch: `b LABEL`.
    B(Label),
    /// A branch with link: `bl LABEL`. The target may be a built-in I/O function.
    Bl(Label),
    /// A compare-and-branch-if-zero: `cbz REG, LABEL`.
    Cbz(RegRef, Label),
    /// A compare-and-branch-if-nonzero: `cbnz REG, LABEL`.
    Cbnz(RegRef, Label),

    /// A conditional branch on equality: `beq LABEL`.
    Beq(Label),
    /// A conditional branch on inequality: `bne LABEL`.
    Bne(Label),
    /// A conditional branch on signed less-than: `blt LABEL`.
    Blt(Label),
    /// A conditional branch on signed less-or-equal: `ble LABEL`.
    Ble(Label),
    /// A conditional branch on signed greater-than: `bgt LABEL`.
    Bgt(Label),
    /// A conditional branch on signed greater-or-equal: `bge LABEL`.
    Bge(Label),
    /// A conditional branch on unsigned less-than: `blo LABEL`.
    Blo(Label),
    /// A conditional branch on unsigned less-or-equal: `bls LABEL`.
    Bls(Label),
    /// A conditional branch on unsigned greater-than: `bhi LABEL`.
    Bhi(Label),
    /// A conditional branch on unsigned greater-or-equal: `bhs LABEL`.
    Bhs(Label),
    /// A conditional branch on the negative flag: `bmi LABEL`.
    Bmi(Label),
    /// A conditional branch on a clear negative flag: `bpl LABEL`.
    Bpl(Label),

    /// A return: `ret` or `ret REG` (defaults to `lr`).
    Ret(Option<RegRef>),
}
