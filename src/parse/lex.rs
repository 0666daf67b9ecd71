//! Tokenizing ARM64 assembly.
//!
//! This module holds the tokens that characterize the accepted
//! ARM64 assembly dialect ([`Token`]). This module is used by the
//! parser to facilitate the conversion of assembly source code
//! into an AST.
//!
//! Tokenizing is done per line; the parser iterates over the lines
//! of the source, so there is no newline token.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::ast::{RegRef, Width};

/// A unit of information in ARM64 source code.
#[derive(Debug, Logos, PartialEq, Clone)]
#[logos(skip r"[ \t\r]+", error = LexErr)]
pub enum Token {
    // Note, these regexes span over tokens that are technically invalid
    // (e.g., 23trst matches for a numeric even though it shouldn't).
    // This is intended.
    // These regexes collect what would be considered one discernable unit
    // and validate it using the validator function.

    /// A numeric value (e.g., `9`, `-14`, `#7`, `0x1F`, `#-0x2`).
    #[regex(r"\d\w*", lex_int)]
    #[regex(r"-\d\w*", lex_int)]
    #[regex(r"#-?\d?\w*", lex_int)]
    Int(i64),

    /// A character literal (e.g., `'A'`, `#'\n'`), which stands for its byte value.
    #[regex(r"#?'(\\.|[^'\\])'", lex_char_literal)]
    Char(u8),

    /// A general register (e.g., `x0`, `w19`).
    ///
    /// `sp`, `lr`, and `pc` lex as identifiers; the parser maps them.
    #[regex(r"[XxWw]\d+", lex_reg, priority = 3)]
    Reg(RegRef),

    /// An identifier.
    ///
    /// This can refer to either:
    /// - a label (e.g., `main`, `loop`, `buf`)
    /// - an instruction (e.g., `add`, `ldr`, `beq`)
    /// - a special register name (`sp`, `lr`, `pc`)
    #[regex(r"[A-Za-z_][\w.$]*", |lx| lx.slice().to_string())]
    Ident(String),

    /// A directive, without its leading dot (e.g., `.data`, `.quad`).
    ///
    /// Local labels (`.L0:`) also lex as this token;
    /// the parser tells them apart by the trailing colon.
    #[regex(r"\.[A-Za-z_][\w.]*", |lx| lx.slice()[1..].to_string())]
    Directive(String),

    /// A `:lo12:label` relocation operand, holding the label's name.
    #[regex(r":lo12:\.?[A-Za-z_][\w.$]*", |lx| lx.slice()[6..].to_string())]
    Lo12(String),

    /// A string literal (e.g., `"Hello!"`).
    #[token(r#"""#, lex_str_literal)]
    String(String),

    /// A colon, which ends a label definition.
    #[token(":")]
    Colon,

    /// A comma, which delineates operands of an instruction.
    #[token(",")]
    Comma,

    /// A left bracket, which opens a memory addressing operand.
    #[token("[")]
    LBracket,

    /// A right bracket, which closes a memory addressing operand.
    #[token("]")]
    RBracket,

    /// A comment, which spans the remaining part of the line.
    #[regex(r"//[^\n]*")]
    #[regex(r";[^\n]*")]
    Comment,
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal could not be parsed (invalid digits for its radix, or empty).
    InvalidNumeric,
    /// Numeric literal cannot fit within the range of a 64-bit value.
    DoesNotFit,
    /// Token had the format x\d or w\d, but \d isn't 0-30.
    InvalidReg,
    /// Character literal is malformed or uses an unknown escape.
    InvalidCharLit,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// A symbol was used which is not allowed in assembly files.
    #[default]
    InvalidSymbol,
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::InvalidNumeric => f.write_str("invalid numeric literal"),
            LexErr::DoesNotFit     => f.write_str("numeric token does not fit a 64-bit value"),
            LexErr::InvalidReg     => f.write_str("invalid register"),
            LexErr::InvalidCharLit => f.write_str("invalid character literal"),
            LexErr::UnclosedStrLit => f.write_str("unclosed string literal"),
            LexErr::InvalidSymbol  => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::InvalidNumeric => Some("a numeric literal is decimal digits or 0x followed by hex digits, optionally preceded by # and -".into()),
            LexErr::DoesNotFit     => Some(format!("the range for a 64-bit value is [{}, {}]", i64::MIN, u64::MAX).into()),
            LexErr::InvalidReg     => Some("general registers are x0-x30 and w0-w30".into()),
            LexErr::InvalidCharLit => Some("a character literal is one character (or a \\n, \\t, \\r, \\\\, \\', \\\", \\0 escape) in single quotes".into()),
            LexErr::UnclosedStrLit => Some("add a quote to the end of the string literal".into()),
            LexErr::InvalidSymbol  => Some("this char does not occur in any token of this assembly dialect".into()),
        }
    }
}

fn convert_int_error(e: &IntErrorKind) -> LexErr {
    match e {
        IntErrorKind::Empty        => LexErr::InvalidNumeric,
        IntErrorKind::InvalidDigit => LexErr::InvalidNumeric,
        IntErrorKind::PosOverflow  => LexErr::DoesNotFit,
        IntErrorKind::NegOverflow  => LexErr::DoesNotFit,
        _ => LexErr::InvalidNumeric,
    }
}

fn lex_int(lx: &Lexer<'_, Token>) -> Result<i64, LexErr> {
    let mut string = lx.slice();
    if string.starts_with('#') {
        string = &string[1..];
    }
    let (neg, mag) = match string.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, string),
    };

    let value = match mag.strip_prefix("0x").or_else(|| mag.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => mag.parse::<u64>(),
    }.map_err(|e| convert_int_error(e.kind()))?;

    if neg {
        // -2^63 is the one magnitude equal to 1 << 63 that still fits
        match value <= 1 << 63 {
            true  => Ok((value as i64).wrapping_neg()),
            false => Err(LexErr::DoesNotFit),
        }
    } else {
        // values above i64::MAX keep their 64-bit pattern
        Ok(value as i64)
    }
}

fn lex_reg(lx: &Lexer<'_, Token>) -> Result<RegRef, LexErr> {
    let slice = lx.slice();
    let width = match &slice[..1] {
        "X" | "x" => Width::X,
        _ => Width::W,
    };
    slice[1..].parse::<u8>().ok()
        .and_then(|idx| RegRef::gp(idx, width))
        .ok_or(LexErr::InvalidReg)
}

fn lex_char_literal(lx: &Lexer<'_, Token>) -> Result<u8, LexErr> {
    let inner = lx.slice()
        .trim_start_matches('#')
        .trim_matches('\'');

    let mut bytes = inner.bytes();
    let ch = match (bytes.next(), bytes.next()) {
        (Some(b'\\'), Some(esc)) => match esc {
            b'n'  => b'\n',
            b't'  => b'\t',
            b'r'  => b'\r',
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"'  => b'"',
            b'0'  => b'\0',
            _ => return Err(LexErr::InvalidCharLit),
        },
        (Some(c), None) if c.is_ascii() => c,
        _ => return Err(LexErr::InvalidCharLit),
    };
    Ok(ch)
}

fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    // calculate the length of the string literal ignoring the quotes
    // consume tokens up to the end of the literal and including the unescaped quote
    let mlen = rem.match_indices('"')
        .map(|(n, _)| n)
        .find(|&n| !matches!(rem.get((n.wrapping_sub(1))..(n + 1)), Some("\\\"")));

    match mlen {
        Some(len) => lx.bump(len + 1),
        None => {
            lx.bump(rem.len());
            return Err(LexErr::UnclosedStrLit);
        }
    }

    // get the string inside quotes:
    let mut remaining = &lx.slice()[1..(lx.slice().len() - 1)];
    let mut buf = String::with_capacity(remaining.len());

    // Look for escapes. Only a simple group of escapes are implemented.
    while let Some((left, right)) = remaining.split_once('\\') {
        buf.push_str(left);

        // this character is part of the escape:
        let esc = right.as_bytes()
            .first()
            .unwrap_or_else(|| unreachable!("expected character after escape")); // last character cannot be \
        match esc {
            b'n'  => buf.push('\n'),
            b'r'  => buf.push('\r'),
            b't'  => buf.push('\t'),
            b'\\' => buf.push('\\'),
            b'0'  => buf.push('\0'),
            b'"'  => buf.push('\"'),
            &c => {
                buf.push('\\');
                buf.push(char::from(c));
            }
        }

        remaining = &right[1..];
    }
    buf.push_str(remaining);

    Ok(buf)
}
