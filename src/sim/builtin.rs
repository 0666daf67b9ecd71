//! The built-in C-style I/O functions.
//!
//! A `bl` to one of these names never executes assembled code;
//! the simulator performs the call itself, reading arguments from
//! `x0`-`x7` and leaving the result in `x0`, then falls through to the
//! instruction after the `bl`. The link register is left untouched.
//!
//! Input is line-oriented at the console but byte-oriented here:
//! each line obtained from the console is buffered with a trailing
//! `'\n'`, and `scanf`, `getchar`, and friends consume bytes from that
//! buffer, so leftover input carries from one call to the next the way
//! C's stdin does.

use crate::ast::sim::Builtin;

use super::io::Console;
use super::{SimErr, Simulator};

/// Arguments after the format string live in `x1`-`x7`.
const MAX_FORMAT_ARGS: usize = 7;

/// A parsed `%` conversion of a format string.
struct Spec {
    /// Field width (`%8d`), if given.
    width: Option<usize>,
    /// Whether the `l` length modifier was given.
    long: bool,
    /// The conversion character.
    conv: u8,
}

/// Scans one `%...` conversion starting just after the `%`.
/// Returns the spec and how many bytes it spanned.
fn take_spec(fmt: &[u8]) -> Option<(Spec, usize)> {
    let mut at = 0;
    let mut width = None;
    while fmt.get(at).is_some_and(u8::is_ascii_digit) {
        width = Some(width.unwrap_or(0) * 10 + usize::from(fmt[at] - b'0'));
        at += 1;
    }
    let long = fmt.get(at) == Some(&b'l');
    if long {
        at += 1;
    }
    let conv = *fmt.get(at)?;
    Some((Spec { width, long, conv }, at + 1))
}

impl Simulator {
    /// Emulates a call to a built-in function.
    pub(super) fn run_builtin(&mut self, builtin: Builtin) -> Result<(), SimErr> {
        match builtin {
            Builtin::Printf => self.bi_printf(),
            Builtin::Puts => self.bi_puts(),
            Builtin::Putchar => self.bi_putchar(),
            Builtin::Scanf => self.bi_scanf(),
            Builtin::Gets => self.bi_gets(),
            Builtin::Fgets => self.bi_fgets(),
            Builtin::Getchar => self.bi_getchar(),
            Builtin::Malloc => self.bi_malloc(),
        }
    }

    /// Reads the NUL-terminated string at `addr` (NUL excluded).
    fn read_cstr(&mut self, addr: u64) -> Result<Vec<u8>, SimErr> {
        let ctx = self.mem_ctx();
        let mut bytes = vec![];
        for at in addr.. {
            match self.mem.read(at, 1, ctx)? as u8 {
                0 => break,
                byte => bytes.push(byte),
            }
        }
        Ok(bytes)
    }

    /// Writes `bytes` followed by a NUL at `addr`.
    fn write_cstr(&mut self, addr: u64, bytes: &[u8]) -> Result<(), SimErr> {
        let ctx = self.mem_ctx();
        for (i, &byte) in bytes.iter().enumerate() {
            self.mem.write(addr + i as u64, u64::from(byte), 1, ctx)?;
        }
        self.mem.write(addr + bytes.len() as u64, 0, 1, ctx)
    }

    fn print(&mut self, text: &str) {
        self.io.output(text);
    }

    /// The next buffered input byte, pulling a fresh console line
    /// (with its newline restored) when the buffer runs dry.
    /// `None` means end of input.
    fn input_byte(&mut self) -> Option<u8> {
        if self.pending_input.is_empty() {
            let line = self.io.input()?;
            self.pending_input.extend(line.bytes());
            self.pending_input.push_back(b'\n');
        }
        self.pending_input.pop_front()
    }

    fn unread_byte(&mut self, byte: u8) {
        self.pending_input.push_front(byte);
    }

    /// Consumes buffered whitespace. Returns false if input ended first.
    fn skip_input_ws(&mut self) -> bool {
        loop {
            match self.input_byte() {
                Some(b) if b.is_ascii_whitespace() => {}
                Some(b) => {
                    self.unread_byte(b);
                    return true;
                }
                None => return false,
            }
        }
    }

    fn bi_printf(&mut self) -> Result<(), SimErr> {
        let fmt = self.read_cstr(self.reg_file.get(0))?;
        let args: Vec<u64> = (1..=MAX_FORMAT_ARGS).map(|i| self.reg_file.get(i)).collect();
        let mut out = String::new();
        let mut next_arg = 0usize;
        let mut arg = || -> Result<u64, SimErr> {
            let value = args.get(next_arg).copied()
                .ok_or(SimErr::FormatArgsExhausted(Builtin::Printf))?;
            next_arg += 1;
            Ok(value)
        };

        let mut at = 0;
        while at < fmt.len() {
            if fmt[at] != b'%' {
                out.push(char::from(fmt[at]));
                at += 1;
                continue;
            }
            let Some((spec, len)) = take_spec(&fmt[at + 1..]) else {
                // trailing lone '%'
                out.push('%');
                at += 1;
                continue;
            };

            let pad = |s: String| match spec.width {
                Some(w) if s.len() < w => format!("{}{s}", " ".repeat(w - s.len())),
                _ => s,
            };
            match spec.conv {
                b'd' | b'i' => {
                    let v = arg()?;
                    let v = match spec.long {
                        true => v as i64,
                        false => i64::from(v as u32 as i32),
                    };
                    out.push_str(&pad(v.to_string()));
                }
                b'u' => {
                    let v = arg()?;
                    let v = match spec.long {
                        true => v,
                        false => u64::from(v as u32),
                    };
                    out.push_str(&pad(v.to_string()));
                }
                b'x' | b'X' => {
                    let v = arg()?;
                    let v = match spec.long {
                        true => v,
                        false => u64::from(v as u32),
                    };
                    let s = match spec.conv {
                        b'x' => format!("{v:x}"),
                        _ => format!("{v:X}"),
                    };
                    out.push_str(&pad(s));
                }
                b'c' => {
                    let v = arg()?;
                    out.push(char::from(v as u8));
                }
                b's' => {
                    let addr = arg()?;
                    let s = self.read_cstr(addr)?;
                    out.push_str(&pad(String::from_utf8_lossy(&s).into_owned()));
                }
                b'%' => out.push('%'),
                // unsupported conversions pass through literally
                other => {
                    out.push('%');
                    out.push(char::from(other));
                }
            }
            at += 1 + len;
        }

        let printed = out.len() as u64;
        self.print(&out);
        self.reg_file.set(0, printed);
        Ok(())
    }

    fn bi_puts(&mut self) -> Result<(), SimErr> {
        let bytes = self.read_cstr(self.reg_file.get(0))?;
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        text.push('\n');
        self.print(&text);
        self.reg_file.set(0, 0);
        Ok(())
    }

    fn bi_putchar(&mut self) -> Result<(), SimErr> {
        let ch = self.reg_file.get(0) as u8;
        self.print(&char::from(ch).to_string());
        self.reg_file.set(0, u64::from(ch));
        Ok(())
    }

    fn bi_scanf(&mut self) -> Result<(), SimErr> {
        let fmt = self.read_cstr(self.reg_file.get(0))?;
        let mut next_arg = 0usize;
        let mut converted: i64 = 0;

        let mut at = 0;
        'fmt: while at < fmt.len() {
            let byte = fmt[at];

            // whitespace in the format skips any run of input whitespace
            if byte.is_ascii_whitespace() {
                self.skip_input_ws();
                at += 1;
                continue;
            }
            if byte != b'%' {
                // a literal must match the next input byte exactly
                match self.input_byte() {
                    Some(b) if b == byte => at += 1,
                    Some(b) => {
                        self.unread_byte(b);
                        break;
                    }
                    None => break,
                }
                continue;
            }

            let Some((spec, len)) = take_spec(&fmt[at + 1..]) else { break };
            at += 1 + len;
            if spec.conv == b'%' {
                match self.input_byte() {
                    Some(b'%') => continue,
                    Some(b) => {
                        self.unread_byte(b);
                        break;
                    }
                    None => break,
                }
            }
            if next_arg >= MAX_FORMAT_ARGS {
                return Err(SimErr::FormatArgsExhausted(Builtin::Scanf));
            }
            next_arg += 1;
            let dst = self.reg_file.get(next_arg);

            match spec.conv {
                b'd' | b'u' | b'x' => {
                    if !self.skip_input_ws() {
                        break;
                    }
                    let Some(value) = self.scan_int(spec.conv == b'x', spec.width) else { break };
                    let size = if spec.long { 8 } else { 4 };
                    self.mem.write(dst, value as u64, size, self.mem_ctx())?;
                }
                b's' => {
                    if !self.skip_input_ws() {
                        break;
                    }
                    let mut bytes = vec![];
                    while spec.width.map_or(true, |w| bytes.len() < w) {
                        match self.input_byte() {
                            Some(b) if b.is_ascii_whitespace() => {
                                self.unread_byte(b);
                                break;
                            }
                            Some(b) => bytes.push(b),
                            None => break,
                        }
                    }
                    if bytes.is_empty() {
                        break 'fmt;
                    }
                    self.write_cstr(dst, &bytes)?;
                }
                b'c' => {
                    let count = spec.width.unwrap_or(1);
                    let ctx = self.mem_ctx();
                    for i in 0..count {
                        let Some(b) = self.input_byte() else {
                            if i == 0 {
                                break 'fmt;
                            }
                            break;
                        };
                        self.mem.write(dst + i as u64, u64::from(b), 1, ctx)?;
                    }
                }
                // an unsupported conversion ends the scan
                _ => break,
            }
            converted += 1;
        }

        // EOF before the first conversion reports EOF, not 0
        if converted == 0 && !fmt.is_empty() {
            match self.input_byte() {
                Some(b) => self.unread_byte(b),
                None => converted = -1,
            }
        }
        self.reg_file.set(0, converted as u64);
        Ok(())
    }

    /// Scans an optionally signed integer (hex when `hex`) from input,
    /// consuming at most `width` bytes. `None` if no digits were found.
    fn scan_int(&mut self, hex: bool, width: Option<usize>) -> Option<i64> {
        let mut taken = 0usize;
        let mut room = |taken: &mut usize| match width {
            Some(w) => {
                let ok = *taken < w;
                *taken += 1;
                ok
            }
            None => true,
        };

        let mut neg = false;
        let mut first = self.input_byte()?;
        if (first == b'-' || first == b'+') && room(&mut taken) {
            neg = first == b'-';
            first = self.input_byte()?;
        }
        self.unread_byte(first);

        let radix = if hex { 16 } else { 10 };
        let mut digits = 0u32;
        let mut value = 0i64;
        loop {
            if !room(&mut taken) {
                break;
            }
            let Some(b) = self.input_byte() else { break };
            let Some(d) = char::from(b).to_digit(radix) else {
                self.unread_byte(b);
                break;
            };
            value = value.wrapping_mul(i64::from(radix)).wrapping_add(i64::from(d));
            digits += 1;
        }
        (digits > 0).then_some(if neg { -value } else { value })
    }

    fn bi_gets(&mut self) -> Result<(), SimErr> {
        let buf = self.reg_file.get(0);
        let mut bytes = vec![];
        loop {
            match self.input_byte() {
                Some(b'\n') => break,
                Some(b) => bytes.push(b),
                None if bytes.is_empty() => {
                    // NULL for EOF with nothing read
                    self.reg_file.set(0, 0);
                    return Ok(());
                }
                None => break,
            }
        }
        self.write_cstr(buf, &bytes)?;
        self.reg_file.set(0, buf);
        Ok(())
    }

    fn bi_fgets(&mut self) -> Result<(), SimErr> {
        let buf = self.reg_file.get(0);
        let n = self.reg_file.get(1) as i64;
        // x2 (the stream) is accepted and ignored; input is the console
        if n <= 0 {
            self.reg_file.set(0, 0);
            return Ok(());
        }

        let mut bytes = vec![];
        while (bytes.len() as i64) < n - 1 {
            match self.input_byte() {
                Some(b'\n') => {
                    // unlike gets, the newline is kept
                    bytes.push(b'\n');
                    break;
                }
                Some(b) => bytes.push(b),
                None if bytes.is_empty() => {
                    self.reg_file.set(0, 0);
                    return Ok(());
                }
                None => break,
            }
        }
        self.write_cstr(buf, &bytes)?;
        self.reg_file.set(0, buf);
        Ok(())
    }

    fn bi_getchar(&mut self) -> Result<(), SimErr> {
        let result = match self.input_byte() {
            Some(b) => u64::from(b),
            None => (-1i64) as u64,
        };
        self.reg_file.set(0, result);
        Ok(())
    }

    fn bi_malloc(&mut self) -> Result<(), SimErr> {
        let size = self.reg_file.get(0);
        // like C malloc, exhaustion reports NULL rather than failing the step
        let addr = self.mem.alloc_heap(size, self.sp).unwrap_or(0);
        self.reg_file.set(0, addr);
        Ok(())
    }
}
