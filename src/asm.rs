//! Assembling statements into an executable program.
//!
//! Assembly is two passes over the parsed statements:
//! 1. [`SymbolTable::build`] walks every statement once, maintaining one
//!    location counter per section, and records each label's address.
//! 2. [`assemble`] re-walks the statements with fresh counters, resolving
//!    every label operand through the symbol table and emitting the
//!    instruction list and the data-initialization list of a [`Program`].
//!
//! ```
//! use a64sim::parse::parse_stmts;
//! use a64sim::asm::assemble;
//!
//! let stmts = parse_stmts("
//!     main:
//!         mov x0, #0
//!         ret
//! ").unwrap();
//! let program = assemble(&stmts).unwrap();
//! assert_eq!(program.instrs.len(), 2);
//! assert_eq!(program.entry.label.as_deref(), Some("main"));
//! ```

use std::collections::HashMap;

use crate::ast::asm::{AluRhs, AsmInstr, DataValue, Directive, Stmt, StmtKind};
use crate::ast::sim::{Builtin, CallTarget, ShiftOp, SimInstr};
use crate::ast::{Cond, Label, Operand2, Section};
use crate::sim::mem::ZERO_PAGE_END;

/// Any error that occurs during assembly.
#[derive(Debug, PartialEq)]
pub struct AsmErr {
    /// The kind of error.
    pub kind: AsmErrKind,
    /// The 0-indexed source line the error occurred on.
    pub line: usize,
}
impl AsmErr {
    fn new(kind: AsmErrKind, line: usize) -> Self {
        AsmErr { kind, line }
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line + 1, self.kind)
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        self.kind.help()
    }
}

/// The kinds of errors that can occur during assembly.
#[derive(Debug, PartialEq)]
pub enum AsmErrKind {
    /// A label was defined twice.
    DuplicateLabel(String),
    /// A label operand does not name any defined label.
    UndefinedLabel(String),
    /// An instruction appeared outside the text section.
    InstrOutsideText,
    /// A data directive appeared in the text section.
    DataInText,
    /// A branch targets a label outside the text section.
    LabelNotText(String),
    /// An `adr`/`adrp` target resolves into the zero page.
    LabelInZeroPage(String),
    /// A section's data outgrew its region.
    SectionFull(Section),
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmErrKind::DuplicateLabel(name) => write!(f, "label {name:?} is already defined"),
            AsmErrKind::UndefinedLabel(name) => write!(f, "label {name:?} is not defined"),
            AsmErrKind::InstrOutsideText => f.write_str("instruction outside the .text section"),
            AsmErrKind::DataInText => f.write_str("data directive inside the .text section"),
            AsmErrKind::LabelNotText(name) => write!(f, "branch target {name:?} is not in the .text section"),
            AsmErrKind::LabelInZeroPage(name) => write!(f, "label {name:?} resolves into the zero page"),
            AsmErrKind::SectionFull(section) => write!(f, "section {section} is out of space"),
        }
    }
}
impl AsmErrKind {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            AsmErrKind::UndefinedLabel(name) if Builtin::from_name(name).is_some() => {
                Some(format!("{name} is a built-in function; it can only be the target of bl").into())
            }
            AsmErrKind::InstrOutsideText => Some("switch to the text section with .text first".into()),
            AsmErrKind::LabelInZeroPage(_) => {
                Some("adr and adrp take labels in the data sections, not code labels".into())
            }
            _ => None,
        }
    }
}

/// A warning produced during assembly. Warnings do not abort the load.
#[derive(Debug, PartialEq, Clone)]
pub struct AsmWarning {
    /// The unrecognized mnemonic or directive the line was skipped over.
    pub name: String,
    /// The 0-indexed source line.
    pub line: usize,
}
impl std::fmt::Display for AsmWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: unknown instruction {:?}, line skipped", self.line + 1, self.name)
    }
}

/// A defined label's resolved location.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Symbol {
    /// The label's absolute address.
    pub addr: u64,
    /// The section the label was defined in.
    pub section: Section,
    /// Whether the label was named by a `.global`.
    pub global: bool,
}

/// Per-section location counters (pass 1 and pass 2 share this bookkeeping).
#[derive(Debug, Clone, Copy)]
struct Cursor {
    text: u64,
    rodata: u64,
    data: u64,
    bss: u64,
    current: Section,
}
impl Cursor {
    fn new() -> Self {
        Cursor {
            // text addresses double as instruction indices (4 bytes each)
            text: 0,
            rodata: 0x0010_0000,
            data: 0x0020_0000,
            bss: 0x0030_0000,
            current: Section::Text,
        }
    }

    fn section_end(section: Section) -> u64 {
        match section {
            Section::Text => u64::MAX,
            Section::Rodata => 0x0020_0000,
            Section::Data => 0x0030_0000,
            Section::Bss => 0x0040_0000,
        }
    }

    fn get(&self, section: Section) -> u64 {
        match section {
            Section::Text => self.text,
            Section::Rodata => self.rodata,
            Section::Data => self.data,
            Section::Bss => self.bss,
        }
    }

    fn slot(&mut self, section: Section) -> &mut u64 {
        match section {
            Section::Text => &mut self.text,
            Section::Rodata => &mut self.rodata,
            Section::Data => &mut self.data,
            Section::Bss => &mut self.bss,
        }
    }

    /// Advances the current section's counter, failing if it overruns the section.
    fn advance(&mut self, size: u64, line: usize) -> Result<(), AsmErr> {
        let current = self.current;
        let end = Self::section_end(current);
        let slot = self.slot(current);
        *slot = slot.checked_add(size)
            .filter(|&c| c <= end)
            .ok_or_else(|| AsmErr::new(AsmErrKind::SectionFull(current), line))?;
        Ok(())
    }

    /// Rounds the current section's counter up to a multiple of `2^p`.
    fn align(&mut self, p: u32, line: usize) -> Result<(), AsmErr> {
        let mult = 1u64.checked_shl(p)
            .ok_or_else(|| AsmErr::new(AsmErrKind::SectionFull(self.current), line))?;
        let counter = self.get(self.current);
        let aligned = counter.checked_add(mult - 1)
            .map(|c| c & !(mult - 1))
            .ok_or_else(|| AsmErr::new(AsmErrKind::SectionFull(self.current), line))?;
        self.advance(aligned - counter, line)
    }
}

/// Byte size of one element of a data directive, and its element values.
fn directive_elements(dir: &Directive) -> Option<(u64, &[DataValue])> {
    match dir {
        Directive::Quad(vs) => Some((8, vs)),
        Directive::Word(vs) => Some((4, vs)),
        Directive::Hword(vs) => Some((2, vs)),
        Directive::Byte(vs) => Some((1, vs)),
        _ => None,
    }
}

/// The symbol table of a program (the output of pass 1).
#[derive(Debug, PartialEq, Default, Clone)]
pub struct SymbolTable {
    labels: HashMap<String, Symbol>,
}
impl SymbolTable {
    /// Walks the statements, recording every label at its section's
    /// location counter.
    ///
    /// A label's address is the address of the next emitted item,
    /// not of the label token itself.
    pub fn build(stmts: &[Stmt]) -> Result<Self, AsmErr> {
        let mut labels: HashMap<String, Symbol> = HashMap::new();
        let mut globals: Vec<String> = vec![];
        let mut cursor = Cursor::new();

        for stmt in stmts {
            for label in &stmt.labels {
                let symbol = Symbol {
                    addr: cursor.get(cursor.current),
                    section: cursor.current,
                    global: false,
                };
                if labels.insert(label.name.clone(), symbol).is_some() {
                    return Err(AsmErr::new(AsmErrKind::DuplicateLabel(label.name.clone()), label.line));
                }
            }

            match &stmt.nucleus {
                None | Some(StmtKind::Unknown(_)) => {}
                Some(StmtKind::Instr(_)) => {
                    if cursor.current != Section::Text {
                        return Err(AsmErr::new(AsmErrKind::InstrOutsideText, stmt.line));
                    }
                    cursor.advance(4, stmt.line)?;
                }
                Some(StmtKind::Directive(dir)) => {
                    Self::walk_directive(dir, &mut cursor, &mut globals, stmt.line)?;
                }
            }
        }

        // .global may name a label defined anywhere in the file
        for name in globals {
            match labels.get_mut(&name) {
                Some(symbol) => symbol.global = true,
                // tolerated: .global of an undefined name affects nothing
                None => {}
            }
        }
        Ok(SymbolTable { labels })
    }

    fn walk_directive(
        dir: &Directive,
        cursor: &mut Cursor,
        globals: &mut Vec<String>,
        line: usize,
    ) -> Result<(), AsmErr> {
        if let Some((size, values)) = directive_elements(dir) {
            if cursor.current == Section::Text {
                return Err(AsmErr::new(AsmErrKind::DataInText, line));
            }
            return cursor.advance(size * values.len() as u64, line);
        }
        match dir {
            Directive::Section(section) => {
                cursor.current = *section;
                Ok(())
            }
            Directive::Global(names) => {
                globals.extend(names.iter().cloned());
                Ok(())
            }
            Directive::Skip(n) => {
                if cursor.current == Section::Text {
                    return Err(AsmErr::new(AsmErrKind::DataInText, line));
                }
                cursor.advance(*n, line)
            }
            Directive::Align(p) => cursor.align(*p, line),
            Directive::Asciz(s) => {
                if cursor.current == Section::Text {
                    return Err(AsmErr::new(AsmErrKind::DataInText, line));
                }
                cursor.advance(s.len() as u64 + 1, line)
            }
            _ => unreachable!("element directives handled above"),
        }
    }

    /// Gets the symbol a label name resolves to (if the label is defined).
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.labels.get(name)
    }

    /// Iterates over every defined label and its symbol.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.labels.iter().map(|(name, symbol)| (&**name, symbol))
    }

    fn resolve(&self, label: &Label) -> Result<&Symbol, AsmErr> {
        self.lookup(&label.name)
            .ok_or_else(|| AsmErr::new(AsmErrKind::UndefinedLabel(label.name.clone()), label.line))
    }

    fn resolve_text(&self, label: &Label) -> Result<u64, AsmErr> {
        let symbol = self.resolve(label)?;
        match symbol.section {
            Section::Text => Ok(symbol.addr),
            _ => Err(AsmErr::new(AsmErrKind::LabelNotText(label.name.clone()), label.line)),
        }
    }
}

/// A resolved instruction and its absolute text address.
#[derive(Debug, PartialEq, Clone)]
pub struct Instr {
    /// The instruction's address (`4 *` its index).
    pub addr: u64,
    /// The operation itself.
    pub op: SimInstr,
}

/// One element of the data-initialization list: a value the simulator
/// writes into memory before the first instruction runs.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DataWrite {
    /// The element's absolute address.
    pub addr: u64,
    /// The value, truncated to `size` bytes on write.
    pub value: u64,
    /// The element's byte width (1, 2, 4, or 8).
    pub size: u64,
    /// The section the element belongs to.
    pub section: Section,
}

/// Where execution starts, and which instructions count as the
/// entry function.
///
/// A `ret` executed inside the entry range terminates the program
/// rather than returning to a caller.
#[derive(Debug, PartialEq, Clone)]
pub struct EntryPoint {
    /// The entry instruction's address.
    pub addr: u64,
    /// The instruction-index range of the entry function
    /// (from the entry label to the next text label, or program end).
    pub range: std::ops::Range<usize>,
    /// The label the entry was chosen by (`None` if it defaulted to
    /// the first instruction).
    pub label: Option<String>,
}

/// A fully assembled program (the output of pass 2).
#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    /// The instruction list, in address order.
    pub instrs: Vec<Instr>,
    /// The data-initialization list.
    pub data: Vec<DataWrite>,
    /// The symbol table.
    pub symbols: SymbolTable,
    /// The program's entry point.
    pub entry: EntryPoint,
    /// Warnings for lines that were skipped.
    pub warnings: Vec<AsmWarning>,
}
impl Program {
    /// The instruction index of the given text address
    /// (`None` if misaligned or past the end).
    pub fn index_of(&self, addr: u64) -> Option<usize> {
        if addr % 4 != 0 {
            return None;
        }
        usize::try_from(addr / 4).ok()
            .filter(|&idx| idx < self.instrs.len())
    }
}

/// Assembles parsed statements into a [`Program`].
pub fn assemble(stmts: &[Stmt]) -> Result<Program, AsmErr> {
    let symbols = SymbolTable::build(stmts)?;

    let mut instrs = vec![];
    let mut data = vec![];
    let mut warnings = vec![];
    let mut cursor = Cursor::new();

    for stmt in stmts {
        match &stmt.nucleus {
            None => {}
            Some(StmtKind::Unknown(name)) => {
                warnings.push(AsmWarning { name: name.clone(), line: stmt.line });
            }
            Some(StmtKind::Instr(instr)) => {
                let addr = cursor.text;
                let op = resolve_instr(instr, &symbols)?;
                instrs.push(Instr { addr, op });
                cursor.advance(4, stmt.line)?;
            }
            Some(StmtKind::Directive(dir)) => {
                emit_directive(dir, &symbols, &mut cursor, &mut data, stmt.line)?;
            }
        }
    }

    let entry = entry_point(&instrs, &symbols);
    Ok(Program { instrs, data, symbols, entry, warnings })
}

fn emit_directive(
    dir: &Directive,
    symbols: &SymbolTable,
    cursor: &mut Cursor,
    data: &mut Vec<DataWrite>,
    line: usize,
) -> Result<(), AsmErr> {
    if let Some((size, values)) = directive_elements(dir) {
        for value in values {
            let value = match value {
                DataValue::Num(n) => *n as u64,
                DataValue::Label(name) => {
                    symbols.resolve(&Label::new(name.clone(), line))?.addr
                }
            };
            data.push(DataWrite {
                addr: cursor.get(cursor.current),
                value,
                size,
                section: cursor.current,
            });
            cursor.advance(size, line)?;
        }
        return Ok(());
    }
    match dir {
        Directive::Section(section) => {
            cursor.current = *section;
            Ok(())
        }
        // consumed by pass 1
        Directive::Global(_) => Ok(()),
        Directive::Skip(n) => cursor.advance(*n, line),
        Directive::Align(p) => cursor.align(*p, line),
        Directive::Asciz(s) => {
            for byte in s.bytes().chain([0]) {
                data.push(DataWrite {
                    addr: cursor.get(cursor.current),
                    value: u64::from(byte),
                    size: 1,
                    section: cursor.current,
                });
                cursor.advance(1, line)?;
            }
            Ok(())
        }
        _ => unreachable!("element directives handled above"),
    }
}

fn resolve_alu_rhs(rhs: &AluRhs, symbols: &SymbolTable) -> Result<Operand2, AsmErr> {
    match rhs {
        AluRhs::Imm(imm) => Ok(Operand2::Imm(*imm)),
        AluRhs::Reg(reg) => Ok(Operand2::Reg(*reg)),
        // the low 12 bits of the address, for an adrp pair
        AluRhs::Lo12(label) => {
            let symbol = symbols.resolve(label)?;
            Ok(Operand2::Imm((symbol.addr & 0xFFF) as i64))
        }
    }
}

fn resolve_instr(instr: &AsmInstr, symbols: &SymbolTable) -> Result<SimInstr, AsmErr> {
    use AsmInstr as A;

    let cond_branch = |cond: Cond, label: &Label| -> Result<SimInstr, AsmErr> {
        Ok(SimInstr::Bc(cond, symbols.resolve_text(label)?))
    };
    // adr/adrp may not materialize a zero-page address
    let data_addr = |label: &Label| -> Result<u64, AsmErr> {
        let addr = symbols.resolve(label)?.addr;
        if addr < ZERO_PAGE_END {
            return Err(AsmErr::new(AsmErrKind::LabelInZeroPage(label.name.clone()), label.line));
        }
        Ok(addr)
    };

    let resolved = match instr {
        A::Mov(dst, src) => SimInstr::Mov(*dst, *src),
        A::Mvn(dst, src) => SimInstr::Mvn(*dst, *src),

        A::Add(dst, src1, rhs) => SimInstr::Add(*dst, *src1, resolve_alu_rhs(rhs, symbols)?, false),
        A::Adds(dst, src1, rhs) => SimInstr::Add(*dst, *src1, resolve_alu_rhs(rhs, symbols)?, true),
        A::Sub(dst, src1, rhs) => SimInstr::Sub(*dst, *src1, resolve_alu_rhs(rhs, symbols)?, false),
        A::Subs(dst, src1, rhs) => SimInstr::Sub(*dst, *src1, resolve_alu_rhs(rhs, symbols)?, true),
        A::Cmp(src1, rhs) => SimInstr::Cmp(*src1, resolve_alu_rhs(rhs, symbols)?),
        A::Cmn(src1, rhs) => SimInstr::Cmn(*src1, resolve_alu_rhs(rhs, symbols)?),

        A::And(dst, src1, op2) => SimInstr::And(*dst, *src1, *op2, false),
        A::Ands(dst, src1, op2) => SimInstr::And(*dst, *src1, *op2, true),
        A::Orr(dst, src1, op2) => SimInstr::Orr(*dst, *src1, *op2),
        A::Eor(dst, src1, op2) => SimInstr::Eor(*dst, *src1, *op2),
        A::Bic(dst, src1, op2) => SimInstr::Bic(*dst, *src1, *op2),

        A::Lsl(dst, src, amt) => SimInstr::Shift(ShiftOp::Lsl, *dst, *src, *amt),
        A::Lsr(dst, src, amt) => SimInstr::Shift(ShiftOp::Lsr, *dst, *src, *amt),
        A::Asr(dst, src, amt) => SimInstr::Shift(ShiftOp::Asr, *dst, *src, *amt),
        A::Ror(dst, src, amt) => SimInstr::Shift(ShiftOp::Ror, *dst, *src, *amt),

        A::Ldr(dst, addr) => SimInstr::Ldr(*dst, *addr),
        A::Str(src, addr) => SimInstr::Str(*src, *addr),
        A::Adr(dst, label) => SimInstr::Adr(*dst, data_addr(label)?),
        A::Adrp(dst, label) => SimInstr::Adrp(*dst, data_addr(label)? & !0xFFF),

        A::B(label) => SimInstr::B(symbols.resolve_text(label)?),
        A::Bl(label) => {
            // built-in I/O functions shadow any same-named label
            let target = match Builtin::from_name(&label.name) {
                Some(builtin) => CallTarget::Builtin(builtin),
                None => CallTarget::Addr(symbols.resolve_text(label)?),
            };
            SimInstr::Bl(target)
        }
        A::Cbz(reg, label) => SimInstr::Cbz(*reg, symbols.resolve_text(label)?),
        A::Cbnz(reg, label) => SimInstr::Cbnz(*reg, symbols.resolve_text(label)?),

        A::Beq(l) => cond_branch(Cond::Eq, l)?,
        A::Bne(l) => cond_branch(Cond::Ne, l)?,
        A::Blt(l) => cond_branch(Cond::Lt, l)?,
        A::Ble(l) => cond_branch(Cond::Le, l)?,
        A::Bgt(l) => cond_branch(Cond::Gt, l)?,
        A::Bge(l) => cond_branch(Cond::Ge, l)?,
        A::Blo(l) => cond_branch(Cond::Lo, l)?,
        A::Bls(l) => cond_branch(Cond::Ls, l)?,
        A::Bhi(l) => cond_branch(Cond::Hi, l)?,
        A::Bhs(l) => cond_branch(Cond::Hs, l)?,
        A::Bmi(l) => cond_branch(Cond::Mi, l)?,
        A::Bpl(l) => cond_branch(Cond::Pl, l)?,

        A::Ret(reg) => SimInstr::Ret(*reg),
    };
    Ok(resolved)
}

/// Picks the entry point: a global `_start`, else a global `main`,
/// else `_start`, else `main`, else the first instruction.
fn entry_point(instrs: &[Instr], symbols: &SymbolTable) -> EntryPoint {
    let candidate = |name: &str, want_global: bool| {
        symbols.lookup(name)
            .filter(|s| s.section == Section::Text && (s.global || !want_global))
            .map(|s| (s.addr, name.to_string()))
    };
    let chosen = candidate("_start", true)
        .or_else(|| candidate("main", true))
        .or_else(|| candidate("_start", false))
        .or_else(|| candidate("main", false));

    let (addr, label) = match chosen {
        Some((addr, name)) => (addr, Some(name)),
        None => (0, None),
    };

    let start = (addr / 4) as usize;
    // the entry function spans to the next text label after it
    let end = symbols.iter()
        .filter(|(_, s)| s.section == Section::Text && s.addr > addr)
        .map(|(_, s)| (s.addr / 4) as usize)
        .min()
        .unwrap_or(instrs.len())
        .min(instrs.len());

    EntryPoint { addr, range: start..end.max(start), label }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::sim::Builtin;
    use crate::ast::{MovSrc, RegRef, Width};
    use crate::parse::parse_stmts;

    fn assemble_src(src: &str) -> Program {
        assemble(&parse_stmts(src).unwrap()).unwrap()
    }
    fn assemble_err(src: &str) -> AsmErrKind {
        assemble(&parse_stmts(src).unwrap()).unwrap_err().kind
    }
    fn x(idx: u8) -> RegRef {
        RegRef::gp(idx, Width::X).unwrap()
    }

    #[test]
    fn test_text_addresses() {
        let program = assemble_src("
            main:
                mov x0, #1
                mov x1, #2
            loop:
                b loop
        ");
        let addrs: Vec<_> = program.instrs.iter().map(|i| i.addr).collect();
        assert_eq!(addrs, vec![0, 4, 8]);
        assert_eq!(program.symbols.lookup("main").unwrap().addr, 0);
        assert_eq!(program.symbols.lookup("loop").unwrap().addr, 8);
        assert_eq!(program.instrs[2].op, SimInstr::B(8));
    }

    #[test]
    fn test_label_is_address_of_next_item() {
        let program = assemble_src("
                mov x0, #0
            after:
            aliased:
                ret
        ");
        assert_eq!(program.symbols.lookup("after").unwrap().addr, 4);
        assert_eq!(program.symbols.lookup("aliased").unwrap().addr, 4);
    }

    #[test]
    fn test_section_bases() {
        let program = assemble_src("
            .rodata
            ro: .byte 1
            .data
            d: .word 2
            .bss
            b: .skip 8
            .text
            main: ret
        ");
        let sym = |name: &str| program.symbols.lookup(name).unwrap().clone();
        assert_eq!(sym("ro"), Symbol { addr: 0x0010_0000, section: Section::Rodata, global: false });
        assert_eq!(sym("d"), Symbol { addr: 0x0020_0000, section: Section::Data, global: false });
        assert_eq!(sym("b"), Symbol { addr: 0x0030_0000, section: Section::Bss, global: false });
    }

    #[test]
    fn test_directive_sizing() {
        let program = assemble_src("
            .data
            a: .quad 1, 2
            b: .word 3
            c: .hword 4
            d: .byte 5
            e: .asciz \"hi\\n\"
            f: .skip 10
            g: .align 3
            h: .byte 6
            .text
            ret
        ");
        let addr = |name: &str| program.symbols.lookup(name).unwrap().addr;
        assert_eq!(addr("b"), addr("a") + 16);
        assert_eq!(addr("c"), addr("b") + 4);
        assert_eq!(addr("d"), addr("c") + 2);
        assert_eq!(addr("e"), addr("d") + 1);
        // "hi\n" plus the terminator
        assert_eq!(addr("f"), addr("e") + 4);
        assert_eq!(addr("g"), addr("f") + 10);
        // .align 3 rounds 0x200025 up to 0x200028
        assert_eq!(addr("h"), 0x0020_0028);
    }

    #[test]
    fn test_data_image() {
        let program = assemble_src("
            .data
            vals: .word 0x11223344, -1
            msg: .asciz \"A\"
            .text
            ret
        ");
        assert_eq!(program.data, vec![
            DataWrite { addr: 0x0020_0000, value: 0x1122_3344, size: 4, section: Section::Data },
            DataWrite { addr: 0x0020_0004, value: (-1i64) as u64, size: 4, section: Section::Data },
            DataWrite { addr: 0x0020_0008, value: u64::from(b'A'), size: 1, section: Section::Data },
            DataWrite { addr: 0x0020_0009, value: 0, size: 1, section: Section::Data },
        ]);
    }

    #[test]
    fn test_data_label_values() {
        let program = assemble_src("
            .data
            here: .quad there
            there: .quad here
            .text
            ret
        ");
        assert_eq!(program.data[0].value, 0x0020_0008);
        assert_eq!(program.data[1].value, 0x0020_0000);
    }

    #[test]
    fn test_duplicate_label() {
        assert_eq!(
            assemble_err("dup: ret\ndup: ret"),
            AsmErrKind::DuplicateLabel("dup".to_string())
        );
    }

    #[test]
    fn test_undefined_label() {
        assert_eq!(
            assemble_err("b nowhere"),
            AsmErrKind::UndefinedLabel("nowhere".to_string())
        );
        assert_eq!(
            assemble_err("adr x0, nowhere"),
            AsmErrKind::UndefinedLabel("nowhere".to_string())
        );
    }

    #[test]
    fn test_misplaced_stmts() {
        assert_eq!(assemble_err(".data\nret"), AsmErrKind::InstrOutsideText);
        assert_eq!(assemble_err(".quad 0"), AsmErrKind::DataInText);
        assert_eq!(
            assemble_err(".data\nv: .word 0\n.text\nb v"),
            AsmErrKind::LabelNotText("v".to_string())
        );
    }

    #[test]
    fn test_adr_and_lo12() {
        let program = assemble_src("
            .data
            .skip 0x123
            msg: .byte 7
            .text
            main:
                adrp x0, msg
                add x0, x0, :lo12:msg
                adr x1, msg
                ret
        ");
        assert_eq!(program.instrs[0].op, SimInstr::Adrp(x(0), 0x0020_0000));
        assert_eq!(
            program.instrs[1].op,
            SimInstr::Add(x(0), x(0), Operand2::Imm(0x123), false)
        );
        assert_eq!(program.instrs[2].op, SimInstr::Adr(x(1), 0x0020_0123));
    }

    #[test]
    fn test_adr_rejects_code_labels() {
        // text addresses live in the zero page, so neither form may take them
        assert_eq!(
            assemble_err("main:\n  adr x0, main\n  ret"),
            AsmErrKind::LabelInZeroPage("main".to_string())
        );
        assert_eq!(
            assemble_err("main:\n  adrp x1, main\n  ret"),
            AsmErrKind::LabelInZeroPage("main".to_string())
        );
    }

    #[test]
    fn test_cond_branches_collapse() {
        let program = assemble_src("
            top:
                beq top
                bhs top
                bpl top
        ");
        assert_eq!(program.instrs[0].op, SimInstr::Bc(Cond::Eq, 0));
        assert_eq!(program.instrs[1].op, SimInstr::Bc(Cond::Hs, 0));
        assert_eq!(program.instrs[2].op, SimInstr::Bc(Cond::Pl, 0));
    }

    #[test]
    fn test_bl_builtin() {
        let program = assemble_src("main:\n  bl puts\n  ret");
        assert_eq!(program.instrs[0].op, SimInstr::Bl(CallTarget::Builtin(Builtin::Puts)));

        // only bl reaches built-ins
        assert_eq!(
            assemble_err("b puts"),
            AsmErrKind::UndefinedLabel("puts".to_string())
        );
    }

    #[test]
    fn test_entry_priority() {
        // explicit _start beats main
        let program = assemble_src("main: ret\n_start: ret");
        assert_eq!(program.entry.label.as_deref(), Some("_start"));
        assert_eq!(program.entry.addr, 4);

        // a global main beats a local _start
        let program = assemble_src(".global main\n_start: ret\nmain: ret");
        assert_eq!(program.entry.label.as_deref(), Some("main"));

        // no known label: first instruction
        let program = assemble_src("go: ret");
        assert_eq!(program.entry.label, None);
        assert_eq!(program.entry.addr, 0);
    }

    #[test]
    fn test_entry_range() {
        let program = assemble_src("
            helper:
                ret
            main:
                mov x0, #0
                bl helper
                ret
            after:
                ret
        ");
        // main is instructions 1..4; after starts at 4
        assert_eq!(program.entry.addr, 4);
        assert_eq!(program.entry.range, 1..4);
    }

    #[test]
    fn test_entry_range_to_end() {
        let program = assemble_src("main:\n  mov x0, #0\n  ret");
        assert_eq!(program.entry.range, 0..2);
    }

    #[test]
    fn test_warnings() {
        let program = assemble_src("
            main:
                stp x29, x30, [sp, -16]
                ret
        ");
        assert_eq!(program.warnings.len(), 1);
        assert_eq!(program.warnings[0].name, "stp");
        // the skipped line takes no address
        assert_eq!(program.instrs.len(), 1);
        assert_eq!(program.instrs[0].addr, 0);
    }

    #[test]
    fn test_index_of() {
        let program = assemble_src("main:\n  mov x0, #0\n  ret");
        assert_eq!(program.index_of(0), Some(0));
        assert_eq!(program.index_of(4), Some(1));
        assert_eq!(program.index_of(8), None);
        assert_eq!(program.index_of(2), None);
    }

    #[test]
    fn test_mov_resolves_unchanged() {
        let program = assemble_src("main: mov x0, #5");
        assert_eq!(program.instrs[0].op, SimInstr::Mov(x(0), MovSrc::Imm(5)));
    }
}
