//! Parsing assembly source code into an AST.
//!
//! This module is used to convert ARM64 assembly source code into
//! a sequence of statements ([`Stmt`]), one per source line,
//! which the assembler ([`crate::asm`]) then resolves into a program.
//!
//! The main function to use from this module is [`parse_stmts`],
//! which parses a full source file:
//! ```
//! use a64sim::parse::parse_stmts;
//!
//! let stmts = parse_stmts("
//!     main:
//!         mov x0, #0
//!         ret
//! ").unwrap();
//! // the label line, mov, and ret
//! assert_eq!(stmts.len(), 3);
//! ```

pub mod lex;

use logos::Logos;

use crate::ast::asm::{AluRhs, AsmInstr, DataValue, Directive, Stmt, StmtKind};
use crate::ast::{AddrOperand, Label, MovSrc, Operand2, RegRef, Section, ShiftAmt, ShiftKind};
use lex::{LexErr, Token};

/// Parses assembly source code into a sequence of statements.
///
/// Blank and comment-only lines produce no statement.
/// Unrecognized mnemonics and directives produce a
/// [`StmtKind::Unknown`] statement rather than an error,
/// so the assembler can warn about them.
pub fn parse_stmts(src: &str) -> Result<Vec<Stmt>, ParseErr> {
    let mut stmts = vec![];
    for (line, text) in src.lines().enumerate() {
        let mut tokens = vec![];
        let mut lex_err = None;
        for m_token in Token::lexer(text) {
            match m_token {
                Ok(Token::Comment) => break,
                Ok(t) => tokens.push(t),
                Err(e) => {
                    lex_err = Some(e);
                    break;
                }
            }
        }

        let mut parser = LineParser::new(tokens, line);
        let labels = parser.parse_labels();
        // lines led by an unrecognized mnemonic are skipped wholesale,
        // even if their operands do not tokenize (e.g., `.type main, @function`)
        let nucleus = match (parser.peek_unknown(), lex_err) {
            (Some(name), _) => Some(StmtKind::Unknown(name)),
            (None, Some(e)) => return Err(ParseErr::new(ParseErrKind::Lex(e), line)),
            (None, None) => parser.parse_nucleus()
                .map_err(|kind| ParseErr::new(kind, line))?,
        };

        if !labels.is_empty() || nucleus.is_some() {
            stmts.push(Stmt { labels, nucleus, line });
        }
    }
    Ok(stmts)
}

/// Any error that occurs during parsing.
#[derive(Debug, PartialEq)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The 0-indexed source line the error occurred on.
    pub line: usize,
}
impl ParseErr {
    fn new(kind: ParseErrKind, line: usize) -> Self {
        ParseErr { kind, line }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line + 1, self.kind)
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        self.kind.help()
    }
}

/// The kinds of errors that can occur during parsing.
#[derive(Debug, PartialEq)]
pub enum ParseErrKind {
    /// Error in tokenizing the line.
    Lex(LexErr),
    /// Expected a register operand here.
    ExpectedReg,
    /// Expected a comma between operands.
    ExpectedComma,
    /// Expected an immediate or register operand here.
    ExpectedOperand,
    /// Expected a numeric value here.
    ExpectedNumeric,
    /// Expected a label here.
    ExpectedLabel,
    /// Expected a string literal here.
    ExpectedString,
    /// Expected a `]` closing the addressing operand.
    ExpectedRBracket,
    /// An inline shift was not one of `lsl`, `lsr`, `asr`.
    BadShift,
    /// A shift amount was out of range or not an immediate/register.
    BadShiftAmount,
    /// The destination register cannot be written by this instruction.
    BadDest(RegRef),
    /// Operands remained after the instruction was fully parsed.
    ExcessOperands,
    /// The line did not start with a label, instruction, or directive.
    ExpectedStmt,
    /// A directive argument was out of range (e.g., a negative `.skip`).
    DirectiveOutOfRange(&'static str),
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrKind::Lex(e) => e.fmt(f),
            ParseErrKind::ExpectedReg => f.write_str("expected register"),
            ParseErrKind::ExpectedComma => f.write_str("expected comma"),
            ParseErrKind::ExpectedOperand => f.write_str("expected immediate or register"),
            ParseErrKind::ExpectedNumeric => f.write_str("expected numeric value"),
            ParseErrKind::ExpectedLabel => f.write_str("expected label"),
            ParseErrKind::ExpectedString => f.write_str("expected string literal"),
            ParseErrKind::ExpectedRBracket => f.write_str("expected ']'"),
            ParseErrKind::BadShift => f.write_str("invalid shift operation"),
            ParseErrKind::BadShiftAmount => f.write_str("invalid shift amount"),
            ParseErrKind::BadDest(r) => write!(f, "{r} cannot be the destination of this instruction"),
            ParseErrKind::ExcessOperands => f.write_str("unexpected operands after instruction"),
            ParseErrKind::ExpectedStmt => f.write_str("expected instruction, directive, or label"),
            ParseErrKind::DirectiveOutOfRange(d) => write!(f, "value out of range for .{d}"),
        }
    }
}
impl ParseErrKind {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            ParseErrKind::Lex(e) => crate::err::Error::help(e),
            ParseErrKind::BadShift => Some("inline shifts are lsl, lsr, and asr".into()),
            ParseErrKind::BadShiftAmount => Some("shift amounts are immediates in [0, 63] or a register".into()),
            ParseErrKind::BadDest(_) => Some("pc is never writable, and sp only by mov, add, and sub".into()),
            _ => None,
        }
    }
}

fn is_known_mnemonic(m: &str) -> bool {
    matches!(&*m.to_lowercase(),
        "mov" | "mvn"
        | "add" | "adds" | "sub" | "subs" | "cmp" | "cmn"
        | "and" | "ands" | "orr" | "eor" | "bic"
        | "lsl" | "lsr" | "asr" | "ror"
        | "ldr" | "str" | "adr" | "adrp"
        | "b" | "bl" | "cbz" | "cbnz"
        | "beq" | "bne" | "blt" | "ble" | "bgt" | "bge"
        | "blo" | "bls" | "bhi" | "bhs" | "bmi" | "bpl"
        | "ret"
    )
}

fn is_known_directive(d: &str) -> bool {
    matches!(d,
        "text" | "rodata" | "data" | "bss"
        | "global" | "globl"
        | "quad" | "word" | "hword" | "byte"
        | "skip" | "align" | "asciz" | "string"
    )
}

/// Parser for the tokens of one source line.
struct LineParser {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token>>,
    line: usize,
}
impl LineParser {
    fn new(tokens: Vec<Token>, line: usize) -> Self {
        LineParser { tokens: tokens.into_iter().peekable(), line }
    }

    /// Consumes every leading `name:` pair.
    fn parse_labels(&mut self) -> Vec<Label> {
        let mut labels = vec![];
        loop {
            let name = match self.tokens.peek() {
                Some(Token::Ident(id)) => id.clone(),
                // local labels (.L0:) lex as directives
                Some(Token::Directive(d)) => format!(".{d}"),
                _ => break,
            };
            // only a label if a colon follows
            let mut ahead = self.tokens.clone();
            ahead.next();
            if ahead.peek() != Some(&Token::Colon) {
                break;
            }
            self.tokens.next();
            self.tokens.next();
            labels.push(Label::new(name, self.line));
        }
        labels
    }

    /// If the line continues with a mnemonic or directive this parser
    /// does not recognize, returns its name (for a skip-with-warning).
    fn peek_unknown(&mut self) -> Option<String> {
        let name = match self.tokens.peek() {
            Some(Token::Ident(id)) if !is_known_mnemonic(id) => id.clone(),
            Some(Token::Directive(d)) if !is_known_directive(d) => format!(".{d}"),
            _ => return None,
        };
        Some(name)
    }

    /// Parses the rest of the line into an instruction or directive.
    fn parse_nucleus(&mut self) -> Result<Option<StmtKind>, ParseErrKind> {
        let kind = match self.tokens.next() {
            None => return Ok(None),
            Some(Token::Ident(id)) => self.parse_instr(&id)?,
            Some(Token::Directive(d)) => self.parse_directive(&d)?,
            Some(_) => return Err(ParseErrKind::ExpectedStmt),
        };
        // unknown mnemonics swallow the rest of their line
        if !matches!(kind, StmtKind::Unknown(_)) && self.tokens.next().is_some() {
            return Err(ParseErrKind::ExcessOperands);
        }
        Ok(Some(kind))
    }

    fn parse_instr(&mut self, mnemonic: &str) -> Result<StmtKind, ParseErrKind> {
        use AsmInstr::*;

        let instr = match &*mnemonic.to_lowercase() {
            "mov" => {
                let dst = self.expect_dst(true)?;
                self.expect_comma()?;
                let src = match self.next_reg() {
                    Some(r) => MovSrc::Reg(r),
                    None => MovSrc::Imm(self.expect_int()?),
                };
                Mov(dst, src)
            }
            "mvn" => {
                let dst = self.expect_dst(false)?;
                self.expect_comma()?;
                Mvn(dst, self.expect_reg()?)
            }
            m @ ("add" | "adds" | "sub" | "subs") => {
                let sp_ok = !m.ends_with('s');
                let dst = self.expect_dst(sp_ok)?;
                self.expect_comma()?;
                let src1 = self.expect_reg()?;
                self.expect_comma()?;
                let rhs = self.parse_alu_rhs()?;
                match m {
                    "add" => Add(dst, src1, rhs),
                    "adds" => Adds(dst, src1, rhs),
                    "sub" => Sub(dst, src1, rhs),
                    _ => Subs(dst, src1, rhs),
                }
            }
            m @ ("cmp" | "cmn") => {
                let src1 = self.expect_reg()?;
                self.expect_comma()?;
                let rhs = self.parse_alu_rhs()?;
                match m {
                    "cmp" => Cmp(src1, rhs),
                    _ => Cmn(src1, rhs),
                }
            }
            m @ ("and" | "ands" | "orr" | "eor" | "bic") => {
                let dst = self.expect_dst(false)?;
                self.expect_comma()?;
                let src1 = self.expect_reg()?;
                self.expect_comma()?;
                let op2 = self.parse_operand2()?;
                match m {
                    "and" => And(dst, src1, op2),
                    "ands" => Ands(dst, src1, op2),
                    "orr" => Orr(dst, src1, op2),
                    "eor" => Eor(dst, src1, op2),
                    _ => Bic(dst, src1, op2),
                }
            }
            m @ ("lsl" | "lsr" | "asr" | "ror") => {
                let dst = self.expect_dst(false)?;
                self.expect_comma()?;
                let src = self.expect_reg()?;
                self.expect_comma()?;
                let amt = self.parse_shift_amt()?;
                match m {
                    "lsl" => Lsl(dst, src, amt),
                    "lsr" => Lsr(dst, src, amt),
                    "asr" => Asr(dst, src, amt),
                    _ => Ror(dst, src, amt),
                }
            }
            "ldr" => {
                let dst = self.expect_dst(false)?;
                self.expect_comma()?;
                Ldr(dst, self.parse_addr()?)
            }
            "str" => {
                let src = self.expect_reg()?;
                self.expect_comma()?;
                Str(src, self.parse_addr()?)
            }
            m @ ("adr" | "adrp") => {
                let dst = self.expect_dst(false)?;
                self.expect_comma()?;
                let label = self.expect_label()?;
                match m {
                    "adr" => Adr(dst, label),
                    _ => Adrp(dst, label),
                }
            }
            "b" => B(self.expect_label()?),
            "bl" => Bl(self.expect_label()?),
            m @ ("cbz" | "cbnz") => {
                let reg = self.expect_reg()?;
                self.expect_comma()?;
                let label = self.expect_label()?;
                match m {
                    "cbz" => Cbz(reg, label),
                    _ => Cbnz(reg, label),
                }
            }
            "beq" => Beq(self.expect_label()?),
            "bne" => Bne(self.expect_label()?),
            "blt" => Blt(self.expect_label()?),
            "ble" => Ble(self.expect_label()?),
            "bgt" => Bgt(self.expect_label()?),
            "bge" => Bge(self.expect_label()?),
            "blo" => Blo(self.expect_label()?),
            "bls" => Bls(self.expect_label()?),
            "bhi" => Bhi(self.expect_label()?),
            "bhs" => Bhs(self.expect_label()?),
            "bmi" => Bmi(self.expect_label()?),
            "bpl" => Bpl(self.expect_label()?),
            "ret" => Ret(self.next_reg()),
            _ => return Ok(StmtKind::Unknown(mnemonic.to_string())),
        };
        Ok(StmtKind::Instr(instr))
    }

    fn parse_directive(&mut self, directive: &str) -> Result<StmtKind, ParseErrKind> {
        let dir = match directive {
            "text" => Directive::Section(Section::Text),
            "rodata" => Directive::Section(Section::Rodata),
            "data" => Directive::Section(Section::Data),
            "bss" => Directive::Section(Section::Bss),
            "global" | "globl" => {
                let mut names = vec![self.expect_label()?.name];
                while self.skip_comma() {
                    names.push(self.expect_label()?.name);
                }
                Directive::Global(names)
            }
            d @ ("quad" | "word" | "hword" | "byte") => {
                let mut values = vec![self.parse_data_value()?];
                while self.skip_comma() {
                    values.push(self.parse_data_value()?);
                }
                match d {
                    "quad" => Directive::Quad(values),
                    "word" => Directive::Word(values),
                    "hword" => Directive::Hword(values),
                    _ => Directive::Byte(values),
                }
            }
            "skip" => {
                let n = self.expect_int()?;
                let n = u64::try_from(n)
                    .map_err(|_| ParseErrKind::DirectiveOutOfRange("skip"))?;
                Directive::Skip(n)
            }
            "align" => {
                let p = self.expect_int()?;
                // 2^p must fit an address
                let p = u32::try_from(p).ok()
                    .filter(|&p| p < 64)
                    .ok_or(ParseErrKind::DirectiveOutOfRange("align"))?;
                Directive::Align(p)
            }
            "asciz" | "string" => match self.tokens.next() {
                Some(Token::String(s)) => Directive::Asciz(s),
                _ => return Err(ParseErrKind::ExpectedString),
            },
            _ => return Ok(StmtKind::Unknown(format!(".{directive}"))),
        };
        Ok(StmtKind::Directive(dir))
    }

    /// Consumes a register token (including `sp`/`lr`/`pc`), if one is next.
    fn next_reg(&mut self) -> Option<RegRef> {
        let reg = match self.tokens.peek() {
            Some(Token::Reg(r)) => *r,
            Some(Token::Ident(id)) => match &*id.to_lowercase() {
                "sp" => RegRef::Sp,
                "lr" => RegRef::Lr,
                "pc" => RegRef::Pc,
                _ => return None,
            },
            _ => return None,
        };
        self.tokens.next();
        Some(reg)
    }

    fn expect_reg(&mut self) -> Result<RegRef, ParseErrKind> {
        self.next_reg().ok_or(ParseErrKind::ExpectedReg)
    }

    /// Like [`LineParser::expect_reg`], but validates the register is writable here.
    fn expect_dst(&mut self, sp_ok: bool) -> Result<RegRef, ParseErrKind> {
        let reg = self.expect_reg()?;
        match reg {
            RegRef::Pc => Err(ParseErrKind::BadDest(reg)),
            RegRef::Sp if !sp_ok => Err(ParseErrKind::BadDest(reg)),
            _ => Ok(reg),
        }
    }

    fn expect_comma(&mut self) -> Result<(), ParseErrKind> {
        match self.tokens.next() {
            Some(Token::Comma) => Ok(()),
            _ => Err(ParseErrKind::ExpectedComma),
        }
    }

    fn skip_comma(&mut self) -> bool {
        if self.tokens.peek() == Some(&Token::Comma) {
            self.tokens.next();
            true
        } else {
            false
        }
    }

    fn expect_int(&mut self) -> Result<i64, ParseErrKind> {
        match self.tokens.next() {
            Some(Token::Int(n)) => Ok(n),
            Some(Token::Char(c)) => Ok(i64::from(c)),
            _ => Err(ParseErrKind::ExpectedNumeric),
        }
    }

    fn expect_label(&mut self) -> Result<Label, ParseErrKind> {
        match self.tokens.next() {
            Some(Token::Ident(id)) => Ok(Label::new(id, self.line)),
            Some(Token::Directive(d)) => Ok(Label::new(format!(".{d}"), self.line)),
            _ => Err(ParseErrKind::ExpectedLabel),
        }
    }

    /// Parses the second source of `add`/`sub`/`cmp`/`cmn`
    /// (immediate, register, or `:lo12:label`).
    fn parse_alu_rhs(&mut self) -> Result<AluRhs, ParseErrKind> {
        if let Some(r) = self.next_reg() {
            return Ok(AluRhs::Reg(r));
        }
        match self.tokens.next() {
            Some(Token::Int(n)) => Ok(AluRhs::Imm(n)),
            Some(Token::Char(c)) => Ok(AluRhs::Imm(i64::from(c))),
            Some(Token::Lo12(name)) => Ok(AluRhs::Lo12(Label::new(name, self.line))),
            _ => Err(ParseErrKind::ExpectedOperand),
        }
    }

    /// Parses an ALU source operand, with an optional inline shift
    /// (`x1` / `#3` / `x1, lsl 2`).
    fn parse_operand2(&mut self) -> Result<Operand2, ParseErrKind> {
        let Some(reg) = self.next_reg() else {
            return Ok(Operand2::Imm(self.expect_int()?));
        };
        if self.tokens.peek() != Some(&Token::Comma) {
            return Ok(Operand2::Reg(reg));
        }
        self.tokens.next();

        let kind = match self.tokens.next() {
            Some(Token::Ident(id)) => match &*id.to_lowercase() {
                "lsl" => ShiftKind::Lsl,
                "lsr" => ShiftKind::Lsr,
                "asr" => ShiftKind::Asr,
                _ => return Err(ParseErrKind::BadShift),
            },
            _ => return Err(ParseErrKind::BadShift),
        };
        let amt = self.expect_shift_imm()?;
        Ok(Operand2::Shifted(reg, kind, amt))
    }

    /// Parses the last operand of `lsl`/`lsr`/`asr`/`ror`.
    fn parse_shift_amt(&mut self) -> Result<ShiftAmt, ParseErrKind> {
        match self.next_reg() {
            Some(r) => Ok(ShiftAmt::Reg(r)),
            None => Ok(ShiftAmt::Imm(self.expect_shift_imm()?)),
        }
    }

    fn expect_shift_imm(&mut self) -> Result<u8, ParseErrKind> {
        let n = self.expect_int().map_err(|_| ParseErrKind::BadShiftAmount)?;
        u8::try_from(n).ok()
            .filter(|&n| n < 64)
            .ok_or(ParseErrKind::BadShiftAmount)
    }

    /// Parses a bracketed memory operand.
    fn parse_addr(&mut self) -> Result<AddrOperand, ParseErrKind> {
        match self.tokens.next() {
            Some(Token::LBracket) => {}
            _ => return Err(ParseErrKind::ExpectedOperand),
        }
        let base = self.expect_reg()?;
        let addr = if self.skip_comma() {
            match self.next_reg() {
                Some(idx) => {
                    if self.skip_comma() {
                        // only lsl scales an index register
                        match self.tokens.next() {
                            Some(Token::Ident(id)) if id.eq_ignore_ascii_case("lsl") => {}
                            _ => return Err(ParseErrKind::BadShift),
                        }
                        AddrOperand::BaseScaled(base, idx, self.expect_shift_imm()?)
                    } else {
                        AddrOperand::BaseReg(base, idx)
                    }
                }
                None => AddrOperand::BaseImm(base, self.expect_int()?),
            }
        } else {
            AddrOperand::Base(base)
        };
        match self.tokens.next() {
            Some(Token::RBracket) => Ok(addr),
            _ => Err(ParseErrKind::ExpectedRBracket),
        }
    }

    fn parse_data_value(&mut self) -> Result<DataValue, ParseErrKind> {
        match self.tokens.next() {
            Some(Token::Int(n)) => Ok(DataValue::Num(n)),
            Some(Token::Char(c)) => Ok(DataValue::Num(i64::from(c))),
            Some(Token::Ident(id)) => Ok(DataValue::Label(id)),
            Some(Token::Directive(d)) => Ok(DataValue::Label(format!(".{d}"))),
            _ => Err(ParseErrKind::ExpectedOperand),
        }
    }
}
