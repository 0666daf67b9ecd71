//! Components relating to the abstract syntax trees (ASTs)
//! used in representing assembly instructions.
//!
//! These components together are used to construct...
//! - [`asm::AsmInstr`] (a data structure holding an assembly source code instruction),
//! - [`asm::Directive`] (a data structure holding an assembly source code directive),
//! - and [`sim::SimInstr`] (a data structure holding a resolved, executable instruction).

pub mod asm;
pub mod sim;

/// The access width of a register operand.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Width {
    /// 32-bit view (`w0`-`w30`).
    W,
    /// 64-bit view (`x0`-`x30`).
    X,
}
impl Width {
    /// Number of bits in this width.
    pub fn bits(self) -> u32 {
        match self {
            Width::W => 32,
            Width::X => 64,
        }
    }
    /// Number of bytes in this width.
    pub fn bytes(self) -> u64 {
        match self {
            Width::W => 4,
            Width::X => 8,
        }
    }
    /// A mask covering every bit of this width.
    pub fn mask(self) -> u64 {
        match self {
            Width::W => u64::from(u32::MAX),
            Width::X => u64::MAX,
        }
    }
}

/// A register reference.
///
/// General registers can be accessed through a 32-bit view (`w0`)
/// or a 64-bit view (`x0`). The special registers `sp`, `lr`, and `pc`
/// are their own variants; `lr` is an alias for `x30` and reads and
/// writes general register 30.
///
/// ## Examples
///
/// ```text
/// add x0, x1, x2
///     ~~  ~~  ~~
/// mov w3, #10
///     ~~
/// ldr x4, [sp, 8]
///     ~~   ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum RegRef {
    /// A general register (`x0`-`x30` or `w0`-`w30`).
    Gp {
        /// The register number. Always between 0 and 30.
        idx: u8,
        /// The access width.
        width: Width,
    },
    /// The stack pointer.
    Sp,
    /// The link register (an alias for `x30`).
    Lr,
    /// The program counter.
    Pc,
}
impl RegRef {
    /// Creates a general register reference, verifying the register number is in range.
    pub fn gp(idx: u8, width: Width) -> Option<Self> {
        (idx <= 30).then_some(RegRef::Gp { idx, width })
    }

    /// The general register file slot this reference accesses
    /// (`None` for `sp` and `pc`).
    pub fn gp_slot(self) -> Option<usize> {
        match self {
            RegRef::Gp { idx, .. } => Some(usize::from(idx)),
            RegRef::Lr => Some(30),
            RegRef::Sp | RegRef::Pc => None,
        }
    }

    /// The access width of this reference. `sp`, `lr`, and `pc` are 64-bit.
    pub fn width(self) -> Width {
        match self {
            RegRef::Gp { width, .. } => width,
            RegRef::Sp | RegRef::Lr | RegRef::Pc => Width::X,
        }
    }
}
impl std::fmt::Display for RegRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegRef::Gp { idx, width: Width::W } => write!(f, "w{idx}"),
            RegRef::Gp { idx, width: Width::X } => write!(f, "x{idx}"),
            RegRef::Sp => f.write_str("sp"),
            RegRef::Lr => f.write_str("lr"),
            RegRef::Pc => f.write_str("pc"),
        }
    }
}

/// The inline shift operations usable in a shifted register operand.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShiftKind {
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Arithmetic shift right.
    Asr,
}
impl std::fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftKind::Lsl => f.write_str("lsl"),
            ShiftKind::Lsr => f.write_str("lsr"),
            ShiftKind::Asr => f.write_str("asr"),
        }
    }
}

/// The second source operand of an ALU instruction.
///
/// ## Examples
///
/// ```text
/// add x0, x1, #8           // Imm
/// add x0, x1, x2           // Reg
/// add x0, x1, x2, lsl 3    // Shifted
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operand2 {
    /// An immediate value.
    Imm(i64),
    /// A register.
    Reg(RegRef),
    /// A register with an inline shift applied before use.
    Shifted(RegRef, ShiftKind, u8),
}
impl Operand2 {
    /// The register this operand reads (if any).
    pub fn reg(self) -> Option<RegRef> {
        match self {
            Operand2::Imm(_) => None,
            Operand2::Reg(r) | Operand2::Shifted(r, _, _) => Some(r),
        }
    }
}
impl std::fmt::Display for Operand2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand2::Imm(imm) => write!(f, "#{imm}"),
            Operand2::Reg(r) => write!(f, "{r}"),
            Operand2::Shifted(r, kind, amt) => write!(f, "{r}, {kind} {amt}"),
        }
    }
}

/// The shift amount of a standalone shift instruction (`lsl`, `lsr`, `asr`, `ror`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShiftAmt {
    /// An immediate shift amount.
    Imm(u8),
    /// A register holding the shift amount.
    Reg(RegRef),
}
impl std::fmt::Display for ShiftAmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftAmt::Imm(amt) => write!(f, "#{amt}"),
            ShiftAmt::Reg(r) => write!(f, "{r}"),
        }
    }
}

/// The addressing operand of `ldr`/`str`.
///
/// ## Examples
///
/// ```text
/// ldr x0, [x1]             // Base
/// ldr x0, [x1, 16]         // BaseImm
/// ldr x0, [x1, x2]         // BaseReg
/// ldr x0, [x1, x2, lsl 3]  // BaseScaled
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AddrOperand {
    /// A plain base register.
    Base(RegRef),
    /// A base register plus an immediate byte offset.
    BaseImm(RegRef, i64),
    /// A base register plus an index register.
    BaseReg(RegRef, RegRef),
    /// A base register plus an index register shifted left by a constant.
    BaseScaled(RegRef, RegRef, u8),
}
impl std::fmt::Display for AddrOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddrOperand::Base(b) => write!(f, "[{b}]"),
            AddrOperand::BaseImm(b, off) => write!(f, "[{b}, #{off}]"),
            AddrOperand::BaseReg(b, idx) => write!(f, "[{b}, {idx}]"),
            AddrOperand::BaseScaled(b, idx, amt) => write!(f, "[{b}, {idx}, lsl {amt}]"),
        }
    }
}

/// The source operand of `mov`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MovSrc {
    /// An immediate value, subject to the MOVZ/MOVN encodability rule.
    Imm(i64),
    /// A register.
    Reg(RegRef),
}
impl std::fmt::Display for MovSrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovSrc::Imm(imm) => write!(f, "#{imm}"),
            MovSrc::Reg(r) => write!(f, "{r}"),
        }
    }
}

/// A branch condition.
///
/// Each condition is a predicate over the NZCV flags:
///
/// | condition | meaning (after `cmp a, b`)  | predicate        |
/// |-----------|-----------------------------|------------------|
/// | `eq`      | a == b                      | `Z`              |
/// | `ne`      | a != b                      | `!Z`             |
/// | `lt`      | a < b (signed)              | `N != V`         |
/// | `le`      | a <= b (signed)             | `Z or N != V`    |
/// | `gt`      | a > b (signed)              | `!Z and N == V`  |
/// | `ge`      | a >= b (signed)             | `N == V`         |
/// | `lo`      | a < b (unsigned)            | `!C`             |
/// | `ls`      | a <= b (unsigned)           | `!C or Z`        |
/// | `hi`      | a > b (unsigned)            | `C and !Z`       |
/// | `hs`      | a >= b (unsigned)           | `C`              |
/// | `mi`      | result negative             | `N`              |
/// | `pl`      | result non-negative         | `!N`             |
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(missing_docs)]
pub enum Cond {
    Eq, Ne, Lt, Le, Gt, Ge, Lo, Ls, Hi, Hs, Mi, Pl,
}
impl std::fmt::Display for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Cond::Eq => "eq", Cond::Ne => "ne",
            Cond::Lt => "lt", Cond::Le => "le",
            Cond::Gt => "gt", Cond::Ge => "ge",
            Cond::Lo => "lo", Cond::Ls => "ls",
            Cond::Hi => "hi", Cond::Hs => "hs",
            Cond::Mi => "mi", Cond::Pl => "pl",
        };
        f.write_str(s)
    }
}

/// A section of the assembled program.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Section {
    /// Executable instructions.
    Text,
    /// Read-only data.
    Rodata,
    /// Initialized read-write data.
    Data,
    /// Zero-initialized data.
    Bss,
}
impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Text => f.write_str(".text"),
            Section::Rodata => f.write_str(".rodata"),
            Section::Data => f.write_str(".data"),
            Section::Bss => f.write_str(".bss"),
        }
    }
}

/// A label, as it appears in source code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Label {
    /// The label's name.
    pub name: String,
    /// The 0-indexed source line the label appeared on.
    pub line: usize,
}
impl Label {
    /// Creates a new label.
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Label { name: name.into(), line }
    }
}
impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
