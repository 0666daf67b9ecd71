//! Executing assembled programs.
//!
//! This module manages the execution of assembled ARM64-subset programs.
//!
//! The main struct of this module is [`Simulator`], which loads source,
//! executes instructions one at a time, and exposes its machine state
//! (register file, NZCV flags, memory, stack frames) for display:
//!
//! ```
//! use a64sim::sim::Simulator;
//!
//! let mut sim = Simulator::new();
//! sim.load("
//!     main:
//!         mov x0, #3
//!         add x0, x0, #4
//!         ret
//! ").unwrap();
//!
//! sim.run(1000).unwrap();
//! assert!(sim.is_halted());
//! assert_eq!(sim.reg_file.get(0), 7);
//! ```

pub mod alu;
mod builtin;
pub mod frame;
pub mod io;
pub mod mem;

use std::collections::VecDeque;

use crate::asm::{assemble, AsmErr, Program};
use crate::ast::sim::{Builtin, CallTarget, ShiftOp, SimInstr};
use crate::ast::{AddrOperand, MovSrc, Operand2, RegRef, ShiftAmt, Width};
use crate::parse::{parse_stmts, ParseErr};
use alu::Flags;
use frame::FrameStack;
use io::SimConsole;
use mem::{Mem, MemAccessCtx, STACK_TOP};

/// Any error that occurs during a load ([`Simulator::load`]).
#[derive(Debug, PartialEq)]
pub enum LoadErr {
    /// The source did not parse.
    Parse(ParseErr),
    /// The parsed source did not assemble.
    Asm(AsmErr),
}
impl std::fmt::Display for LoadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadErr::Parse(e) => e.fmt(f),
            LoadErr::Asm(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for LoadErr {}
impl crate::err::Error for LoadErr {
    fn line(&self) -> Option<usize> {
        match self {
            LoadErr::Parse(e) => crate::err::Error::line(e),
            LoadErr::Asm(e) => crate::err::Error::line(e),
        }
    }
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LoadErr::Parse(e) => crate::err::Error::help(e),
            LoadErr::Asm(e) => crate::err::Error::help(e),
        }
    }
}
impl From<ParseErr> for LoadErr {
    fn from(value: ParseErr) -> Self {
        LoadErr::Parse(value)
    }
}
impl From<AsmErr> for LoadErr {
    fn from(value: AsmErr) -> Self {
        LoadErr::Asm(value)
    }
}

/// Any error that occurs during a step ([`Simulator::step`]).
///
/// Step errors are fatal: the instruction that raised one performed
/// no partial memory write, and the simulator will not advance past it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimErr {
    /// No program is loaded.
    NotLoaded,
    /// A `mov` immediate is not producible by a single MOVZ or MOVN.
    UnencodableMov {
        /// The offending immediate.
        imm: i64,
        /// The destination's access width.
        width: Width,
    },
    /// A memory access touched the zero page.
    ZeroPage {
        /// The accessed address.
        addr: u64,
    },
    /// A memory access fell outside addressable memory.
    OutOfBounds {
        /// The accessed address.
        addr: u64,
    },
    /// A memory access crossed a region boundary.
    RegionCross {
        /// The accessed address.
        addr: u64,
        /// The access width in bytes.
        size: u64,
    },
    /// A write targeted read-only memory.
    ReadOnlyWrite {
        /// The written address.
        addr: u64,
    },
    /// A write would collide the stack and the heap.
    StackHeapCollision {
        /// The written address.
        addr: u64,
    },
    /// A heap allocation would overrun the heap.
    HeapExhausted {
        /// The requested size.
        size: u64,
    },
    /// An `add`/`sub` targeting `sp` had a register second operand.
    StackOpNotImm,
    /// An `add`/`sub` targeting `sp` had an immediate that is not a
    /// non-negative multiple of 16.
    UnalignedStackImm {
        /// The offending immediate.
        imm: i64,
    },
    /// An `add`/`sub` targeting `sp` would leave it misaligned.
    MisalignedSp {
        /// The stack pointer value that was rejected.
        sp: u64,
    },
    /// A format string used more arguments than the calling convention
    /// passes in registers.
    FormatArgsExhausted(Builtin),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::NotLoaded => f.write_str("no program loaded"),
            SimErr::UnencodableMov { imm, width } => {
                let w = match width {
                    Width::W => "a 32-bit",
                    Width::X => "a 64-bit",
                };
                write!(f, "immediate {imm} cannot be encoded by a mov to {w} register")
            }
            SimErr::ZeroPage { addr } => write!(f, "access to the zero page (address {addr:#010X})"),
            SimErr::OutOfBounds { addr } => write!(f, "access outside addressable memory (address {addr:#010X})"),
            SimErr::RegionCross { addr, size } => {
                write!(f, "{size}-byte access at {addr:#010X} crosses a region boundary")
            }
            SimErr::ReadOnlyWrite { addr } => write!(f, "write to read-only memory (address {addr:#010X})"),
            SimErr::StackHeapCollision { addr } => {
                write!(f, "write at {addr:#010X} would collide the stack and the heap")
            }
            SimErr::HeapExhausted { size } => write!(f, "cannot allocate {size} bytes of heap"),
            SimErr::StackOpNotImm => f.write_str("stack pointer adjustments require an immediate"),
            SimErr::UnalignedStackImm { imm } => {
                write!(f, "stack pointer adjustment {imm} is not a non-negative multiple of 16")
            }
            SimErr::MisalignedSp { sp } => write!(f, "stack pointer {sp:#010X} is not 16-byte aligned"),
            SimErr::FormatArgsExhausted(b) => {
                write!(f, "{} format string uses more arguments than fit in registers", b.name())
            }
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            SimErr::UnencodableMov { .. } => {
                Some("a mov immediate must fit one 16-bit chunk of the value or of its complement".into())
            }
            SimErr::ZeroPage { .. } => Some("addresses below 0x00100000 are never mapped".into()),
            SimErr::StackOpNotImm | SimErr::UnalignedStackImm { .. } | SimErr::MisalignedSp { .. } => {
                Some("adjust sp by immediate multiples of 16, e.g. sub sp, sp, #16".into())
            }
            SimErr::FormatArgsExhausted(_) => {
                Some("arguments after the format string are passed in x1-x7".into())
            }
            _ => None,
        }
    }
}

/// The result of a successful step.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepResult {
    /// The program can continue.
    Continue,
    /// The program has halted; further steps do nothing.
    Halted,
}

/// Where execution goes after an instruction.
enum Flow {
    /// Fall through to the next instruction.
    Continue,
    /// Transfer to the given text address.
    Jump(u64),
    /// Terminate the program cleanly.
    Halt,
}

/// The general register file (`x0`-`x30`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RegFile([u64; 31]);
impl RegFile {
    /// Creates a zeroed register file.
    pub fn new() -> Self {
        RegFile([0; 31])
    }

    /// Gets the full 64-bit value of register `idx`.
    pub fn get(&self, idx: usize) -> u64 {
        self.0[idx]
    }

    /// Sets the full 64-bit value of register `idx`.
    pub fn set(&mut self, idx: usize, value: u64) {
        self.0[idx] = value;
    }

    /// All 31 registers, in order.
    pub fn as_slice(&self) -> &[u64; 31] {
        &self.0
    }
}
impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes an assembled program.
#[derive(Debug)]
pub struct Simulator {
    /// The general register file.
    pub reg_file: RegFile,

    /// The memory of the simulated machine.
    pub mem: Mem,

    /// The live stack frames (observability only).
    pub frame_stack: FrameStack,

    flags: Flags,
    sp: u64,
    pc: u64,
    /// Index of the next instruction to execute.
    cursor: usize,
    halted: bool,
    program: Option<Program>,
    entry_range: std::ops::Range<usize>,
    io: SimConsole,
    /// Bytes read from the console but not yet consumed by input functions.
    pub(crate) pending_input: VecDeque<u8>,
    instructions_run: u64,
}

impl Simulator {
    /// Creates a simulator with no program loaded,
    /// attached to the process's stdin/stdout.
    pub fn new() -> Self {
        Simulator {
            reg_file: RegFile::new(),
            mem: Mem::new(),
            frame_stack: FrameStack::new(),
            flags: Flags::default(),
            sp: STACK_TOP,
            pc: 0,
            cursor: 0,
            halted: true,
            program: None,
            entry_range: 0..0,
            io: SimConsole::default(),
            pending_input: VecDeque::new(),
            instructions_run: 0,
        }
    }

    /// Parses, assembles, and loads a program, resetting all machine state.
    ///
    /// On failure no program is loaded, but the simulator remains in a
    /// sane, inspectable state (zeroed registers, empty memory, halted).
    pub fn load(&mut self, src: &str) -> Result<(), LoadErr> {
        self.program = None;
        let result = parse_stmts(src)
            .map_err(LoadErr::from)
            .and_then(|stmts| assemble(&stmts).map_err(LoadErr::from));
        match result {
            Ok(program) => {
                self.program = Some(program);
                self.reset();
                Ok(())
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Returns the simulator to the initial state of the loaded program:
    /// zeroed registers, cleared flags, a fresh stack pointer, and memory
    /// holding exactly the program's data image.
    ///
    /// The attached console survives a reset.
    pub fn reset(&mut self) {
        self.reg_file = RegFile::new();
        self.flags = Flags::default();
        self.sp = STACK_TOP;
        self.frame_stack = FrameStack::new();
        self.mem = Mem::new();
        self.pending_input.clear();
        self.instructions_run = 0;

        match &self.program {
            Some(program) => {
                let init = MemAccessCtx { sp: self.sp, init: true };
                for write in &program.data {
                    self.mem.write(write.addr, write.value, write.size, init)
                        .unwrap_or_else(|e| unreachable!("data image write failed: {e}"));
                }
                self.pc = program.entry.addr;
                self.cursor = program.entry.range.start;
                self.entry_range = program.entry.range.clone();
                self.halted = program.instrs.is_empty();
            }
            None => {
                self.pc = 0;
                self.cursor = 0;
                self.entry_range = 0..0;
                self.halted = true;
            }
        }
    }

    /// Attaches a console for the built-in I/O functions.
    pub fn set_io(&mut self, io: impl Into<SimConsole>) {
        self.io = io.into();
    }

    /// The NZCV flags.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// The stack pointer.
    pub fn sp(&self) -> u64 {
        self.sp
    }

    /// The program counter. During a step this is the address of the
    /// executing instruction; after a halt it is 0.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Whether the program has halted (or none is loaded).
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The index of the next instruction to execute (`None` once halted).
    pub fn current_index(&self) -> Option<usize> {
        let program = self.program.as_ref()?;
        (!self.halted && self.cursor < program.instrs.len()).then_some(self.cursor)
    }

    /// The loaded program.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// How many instructions have executed since the last reset.
    pub fn instructions_run(&self) -> u64 {
        self.instructions_run
    }

    /// Executes one instruction.
    pub fn step(&mut self) -> Result<StepResult, SimErr> {
        let program = self.program.as_ref().ok_or(SimErr::NotLoaded)?;
        if self.halted {
            return Ok(StepResult::Halted);
        }
        let Some(instr) = program.instrs.get(self.cursor).cloned() else {
            self.halt();
            return Ok(StepResult::Halted);
        };

        // during execution, pc reads as the executing instruction's address
        self.pc = instr.addr;
        let flow = self.exec(&instr.op)?;
        self.instructions_run += 1;

        match flow {
            // falling past the last instruction is discovered by the
            // next fetch, not charged to this step
            Flow::Continue => {
                self.cursor += 1;
                self.pc = instr.addr + 4;
            }
            Flow::Jump(addr) => self.jump_to(addr),
            Flow::Halt => self.halt(),
        }
        Ok(match self.halted {
            true => StepResult::Halted,
            false => StepResult::Continue,
        })
    }

    /// Steps until the program halts or `limit` instructions have run.
    ///
    /// Returns [`StepResult::Continue`] if the limit cut the run short.
    pub fn run(&mut self, limit: u64) -> Result<StepResult, SimErr> {
        for _ in 0..limit {
            if let StepResult::Halted = self.step()? {
                return Ok(StepResult::Halted);
            }
        }
        Ok(match self.halted {
            true => StepResult::Halted,
            false => StepResult::Continue,
        })
    }

    /// Transfers control to `addr`. A target outside the program
    /// (including a return address of 0) is a clean halt.
    fn jump_to(&mut self, addr: u64) {
        let program = self.program.as_ref()
            .unwrap_or_else(|| unreachable!("jump without a program"));
        match program.index_of(addr) {
            Some(idx) => {
                self.cursor = idx;
                self.pc = addr;
            }
            None => self.halt(),
        }
    }

    fn halt(&mut self) {
        self.halted = true;
        self.pc = 0;
        self.cursor = self.program.as_ref().map_or(0, |p| p.instrs.len());
    }

    /// Reads a register operand.
    ///
    /// A `w` view sign-extends bit 31 of the register's low half.
    pub(crate) fn read_reg(&self, reg: RegRef) -> u64 {
        match reg {
            RegRef::Gp { idx, width: Width::X } => self.reg_file.get(usize::from(idx)),
            RegRef::Gp { idx, width: Width::W } => {
                self.reg_file.get(usize::from(idx)) as u32 as i32 as i64 as u64
            }
            RegRef::Sp => self.sp,
            RegRef::Lr => self.reg_file.get(30),
            RegRef::Pc => self.pc,
        }
    }

    /// Writes a register operand. A `w` view zero-extends into the full register.
    pub(crate) fn write_reg(&mut self, reg: RegRef, value: u64) {
        match reg {
            RegRef::Gp { idx, width: Width::X } => self.reg_file.set(usize::from(idx), value),
            RegRef::Gp { idx, width: Width::W } => {
                self.reg_file.set(usize::from(idx), value & Width::W.mask())
            }
            RegRef::Sp => self.sp = value,
            RegRef::Lr => self.reg_file.set(30, value),
            RegRef::Pc => unreachable!("pc is rejected as a destination at parse time"),
        }
    }

    pub(crate) fn mem_ctx(&self) -> MemAccessCtx {
        MemAccessCtx { sp: self.sp, init: false }
    }

    /// The value of an ALU second operand at the given width.
    fn op2_value(&self, op2: Operand2, width: Width) -> u64 {
        match op2 {
            Operand2::Imm(imm) => imm as u64,
            Operand2::Reg(reg) => self.read_reg(reg),
            Operand2::Shifted(reg, kind, amt) => {
                let val = self.read_reg(reg);
                match kind {
                    crate::ast::ShiftKind::Lsl => alu::lsl(val, amt.into(), width),
                    crate::ast::ShiftKind::Lsr => alu::lsr(val, amt.into(), width),
                    crate::ast::ShiftKind::Asr => alu::asr(val, amt.into(), width),
                }
            }
        }
    }

    /// The effective address of a memory operand.
    fn addr_value(&self, addr: AddrOperand) -> u64 {
        match addr {
            AddrOperand::Base(base) => self.read_reg(base),
            AddrOperand::BaseImm(base, off) => self.read_reg(base).wrapping_add(off as u64),
            AddrOperand::BaseReg(base, idx) => self.read_reg(base).wrapping_add(self.read_reg(idx)),
            AddrOperand::BaseScaled(base, idx, amt) => {
                self.read_reg(base).wrapping_add(self.read_reg(idx) << amt)
            }
        }
    }

    /// An `add`/`sub` targeting `sp` is a stack operation: it must adjust
    /// by an immediate, non-negative multiple of 16, land 16-byte aligned,
    /// and it creates (`sub`) or destroys (`add`) a stack frame.
    fn exec_stack_op(&mut self, sub: bool, src1: RegRef, op2: Operand2) -> Result<Flow, SimErr> {
        let Operand2::Imm(imm) = op2 else {
            return Err(SimErr::StackOpNotImm);
        };
        if imm < 0 || imm % 16 != 0 {
            return Err(SimErr::UnalignedStackImm { imm });
        }
        let base = self.read_reg(src1);
        let new_sp = match sub {
            true => base.wrapping_sub(imm as u64),
            false => base.wrapping_add(imm as u64),
        };
        if new_sp % 16 != 0 {
            return Err(SimErr::MisalignedSp { sp: new_sp });
        }

        self.sp = new_sp;
        if imm > 0 {
            match sub {
                true => self.frame_stack.push(new_sp, imm as u64),
                false => {
                    self.frame_stack.pop(imm as u64);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn exec(&mut self, op: &SimInstr) -> Result<Flow, SimErr> {
        match *op {
            SimInstr::Mov(dst, src) => {
                let value = match src {
                    MovSrc::Imm(imm) => {
                        if !alu::mov_encodable(imm, dst.width()) {
                            return Err(SimErr::UnencodableMov { imm, width: dst.width() });
                        }
                        imm as u64
                    }
                    MovSrc::Reg(reg) => self.read_reg(reg),
                };
                self.write_reg(dst, value);
            }
            SimInstr::Mvn(dst, src) => {
                let width = alu_width(&[dst, src], None);
                let value = !self.read_reg(src) & width.mask();
                self.write_reg(dst, value);
            }

            SimInstr::Add(dst, src1, op2, set_flags) => {
                if dst == RegRef::Sp {
                    return self.exec_stack_op(false, src1, op2);
                }
                let width = alu_width(&[dst, src1], Some(op2));
                let (result, flags) = alu::add_flags(self.read_reg(src1), self.op2_value(op2, width), width);
                if set_flags {
                    self.flags = flags;
                }
                self.write_reg(dst, result);
            }
            SimInstr::Sub(dst, src1, op2, set_flags) => {
                if dst == RegRef::Sp {
                    return self.exec_stack_op(true, src1, op2);
                }
                let width = alu_width(&[dst, src1], Some(op2));
                let (result, flags) = alu::sub_flags(self.read_reg(src1), self.op2_value(op2, width), width);
                if set_flags {
                    self.flags = flags;
                }
                self.write_reg(dst, result);
            }
            SimInstr::Cmp(src1, op2) => {
                let width = alu_width(&[src1], Some(op2));
                let (_, flags) = alu::sub_flags(self.read_reg(src1), self.op2_value(op2, width), width);
                self.flags = flags;
            }
            SimInstr::Cmn(src1, op2) => {
                let width = alu_width(&[src1], Some(op2));
                let (_, flags) = alu::add_flags(self.read_reg(src1), self.op2_value(op2, width), width);
                self.flags = flags;
            }

            SimInstr::And(dst, src1, op2, set_flags) => {
                let width = alu_width(&[dst, src1], Some(op2));
                let result = self.read_reg(src1) & self.op2_value(op2, width) & width.mask();
                if set_flags {
                    // ands sets N and Z and clears C and V
                    self.flags = Flags {
                        n: result >> (width.bits() - 1) & 1 != 0,
                        z: result == 0,
                        c: false,
                        v: false,
                    };
                }
                self.write_reg(dst, result);
            }
            SimInstr::Orr(dst, src1, op2) => {
                let width = alu_width(&[dst, src1], Some(op2));
                let result = self.read_reg(src1) | self.op2_value(op2, width);
                self.write_reg(dst, result & width.mask());
            }
            SimInstr::Eor(dst, src1, op2) => {
                let width = alu_width(&[dst, src1], Some(op2));
                let result = self.read_reg(src1) ^ self.op2_value(op2, width);
                self.write_reg(dst, result & width.mask());
            }
            SimInstr::Bic(dst, src1, op2) => {
                let width = alu_width(&[dst, src1], Some(op2));
                let result = self.read_reg(src1) & !self.op2_value(op2, width);
                self.write_reg(dst, result & width.mask());
            }

            SimInstr::Shift(shift, dst, src, amt) => {
                let width = alu_width(&[dst, src], None);
                let amt = match amt {
                    ShiftAmt::Imm(n) => u32::from(n),
                    ShiftAmt::Reg(reg) => alu::mask_shift_amount(self.read_reg(reg), width),
                };
                let val = self.read_reg(src);
                let result = match shift {
                    ShiftOp::Lsl => alu::lsl(val, amt, width),
                    ShiftOp::Lsr => alu::lsr(val, amt, width),
                    ShiftOp::Asr => alu::asr(val, amt, width),
                    ShiftOp::Ror => alu::ror(val, amt, width),
                };
                self.write_reg(dst, result);
            }

            SimInstr::Ldr(dst, addr) => {
                let ea = self.addr_value(addr);
                let size = dst.width().bytes();
                let value = self.mem.read(ea, size, self.mem_ctx())?;
                match dst {
                    // a w load sign-extends the 4 read bytes through the full register
                    RegRef::Gp { idx, width: Width::W } => {
                        self.reg_file.set(usize::from(idx), value as u32 as i32 as i64 as u64);
                    }
                    _ => self.write_reg(dst, value),
                }
            }
            SimInstr::Str(src, addr) => {
                let ea = self.addr_value(addr);
                let size = src.width().bytes();
                self.mem.write(ea, self.read_reg(src), size, self.mem_ctx())?;
            }

            SimInstr::Adr(dst, target) | SimInstr::Adrp(dst, target) => {
                self.write_reg(dst, target);
            }

            SimInstr::B(target) => return Ok(Flow::Jump(target)),
            SimInstr::Bc(cond, target) => {
                if alu::cond_holds(cond, self.flags) {
                    return Ok(Flow::Jump(target));
                }
            }
            SimInstr::Bl(call) => match call {
                CallTarget::Builtin(builtin) => self.run_builtin(builtin)?,
                CallTarget::Addr(target) => {
                    self.write_reg(RegRef::Lr, self.pc + 4);
                    return Ok(Flow::Jump(target));
                }
            },
            SimInstr::Cbz(reg, target) => {
                if self.read_reg(reg) == 0 {
                    return Ok(Flow::Jump(target));
                }
            }
            SimInstr::Cbnz(reg, target) => {
                if self.read_reg(reg) != 0 {
                    return Ok(Flow::Jump(target));
                }
            }
            SimInstr::Ret(reg) => {
                // a ret inside the entry function ends the whole program,
                // no matter what the return register holds
                if self.entry_range.contains(&self.cursor) {
                    return Ok(Flow::Halt);
                }
                let target = self.read_reg(reg.unwrap_or(RegRef::Lr));
                // returning through a never-written lr is a clean exit
                if target == 0 {
                    return Ok(Flow::Halt);
                }
                return Ok(Flow::Jump(target));
            }
        }
        Ok(Flow::Continue)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// The width an ALU operation runs at: 32 bits if any register
/// operand uses a `w` view.
fn alu_width(regs: &[RegRef], op2: Option<Operand2>) -> Width {
    let narrow_op2 = matches!(
        op2,
        Some(Operand2::Reg(r) | Operand2::Shifted(r, ..)) if r.width() == Width::W
    );
    if narrow_op2 || regs.iter().any(|r| r.width() == Width::W) {
        Width::W
    } else {
        Width::X
    }
}

#[cfg(test)]
mod tests {
    use super::io::BufferedIO;
    use super::mem::Region;
    use super::*;

    fn loaded(src: &str) -> Simulator {
        let mut sim = Simulator::new();
        sim.set_io(io::EmptyIO);
        sim.load(src).unwrap();
        sim
    }
    fn run_to_halt(src: &str) -> Simulator {
        let mut sim = loaded(src);
        assert_eq!(sim.run(100_000).unwrap(), StepResult::Halted);
        sim
    }

    #[test]
    fn test_three_step_add() {
        let mut sim = loaded("
            main:
                mov x0, #3
                add x1, x0, #4
                ret
        ");
        assert_eq!(sim.step().unwrap(), StepResult::Continue);
        assert_eq!(sim.reg_file.get(0), 3);
        assert_eq!(sim.pc(), 4);

        assert_eq!(sim.step().unwrap(), StepResult::Continue);
        assert_eq!(sim.reg_file.get(1), 7);

        assert_eq!(sim.step().unwrap(), StepResult::Halted);
        assert!(sim.is_halted());
        // a halted program parks pc at 0
        assert_eq!(sim.pc(), 0);
        assert_eq!(sim.current_index(), None);
        assert_eq!(sim.instructions_run(), 3);
    }

    #[test]
    fn test_runs_off_the_end() {
        let mut sim = loaded("
            main:
                mov x0, #5
                mov x1, #3
                add x0, x0, x1
        ");
        assert_eq!(sim.step().unwrap(), StepResult::Continue);
        assert_eq!(sim.step().unwrap(), StepResult::Continue);
        // the last instruction still reports Continue
        assert_eq!(sim.step().unwrap(), StepResult::Continue);
        assert!(!sim.is_halted());
        assert_eq!(sim.reg_file.get(0), 8);
        assert_eq!(sim.reg_file.get(1), 3);
        assert_eq!(sim.current_index(), None);
        // the fetch after it finds nothing left to run
        assert_eq!(sim.step().unwrap(), StepResult::Halted);
        assert!(sim.is_halted());
        assert_eq!(sim.instructions_run(), 3);
    }

    #[test]
    fn test_cmp_branch() {
        let sim = run_to_halt("
            main:
                mov x0, #5
                cmp x0, #7
                blt less
                mov x1, #111
                ret
            less:
                mov x1, #222
                ret
        ");
        assert_eq!(sim.reg_file.get(1), 222);
        let flags = sim.flags();
        assert!(flags.n);
        assert!(!flags.z);
        assert!(!flags.c);
        assert!(!flags.v);
    }

    #[test]
    fn test_entry_ret_halts_with_stale_lr() {
        // lr still holds the helper's return address when main returns
        let sim = run_to_halt("
            helper:
                ret
            main:
                bl helper
                ret
        ");
        assert!(sim.is_halted());
        assert_eq!(sim.reg_file.get(30), 8);
    }

    #[test]
    fn test_call_and_return() {
        let sim = run_to_halt("
            double:
                add x0, x0, x0
                ret
            main:
                mov x0, #21
                bl double
                ret
        ");
        assert_eq!(sim.reg_file.get(0), 42);
    }

    #[test]
    fn test_stack_push_pop_restores() {
        let mut sim = loaded("
            main:
                sub sp, sp, #16
                mov x0, #7
                str x0, [sp, 8]
                ldr x1, [sp, 8]
                add sp, sp, #16
                ret
        ");
        let initial_sp = sim.sp();
        sim.step().unwrap();
        assert_eq!(sim.sp(), initial_sp - 16);
        assert_eq!(sim.frame_stack.len(), 1);
        assert_eq!(sim.frame_stack.frames()[0].size, 16);

        for _ in 0..4 {
            sim.step().unwrap();
        }
        assert_eq!(sim.sp(), initial_sp);
        assert!(sim.frame_stack.is_empty());
        assert_eq!(sim.reg_file.get(1), 7);
    }

    #[test]
    fn test_stack_op_validation() {
        let mut sim = loaded("main: sub sp, sp, #8");
        assert_eq!(sim.step(), Err(SimErr::UnalignedStackImm { imm: 8 }));

        let mut sim = loaded("main:\n  mov x0, #16\n  sub sp, sp, x0");
        sim.step().unwrap();
        assert_eq!(sim.step(), Err(SimErr::StackOpNotImm));
    }

    #[test]
    fn test_w_views() {
        let sim = run_to_halt("
            main:
                mov x0, #-1
                mov w1, w0
                ret
        ");
        // a w write zero-extends
        assert_eq!(sim.reg_file.get(1), u64::from(u32::MAX));

        // the zero-extended value is what an x read then sees
        let sim = run_to_halt("
            main:
                mov w0, #-1
                add x1, x0, #0
                ret
        ");
        assert_eq!(sim.reg_file.get(1), u64::from(u32::MAX));

        // a w read sign-extends bit 31

        let sim = run_to_halt("
            main:
                mov w0, #-5
                add w1, w0, #1
                ret
        ");
        assert_eq!(sim.reg_file.get(1), 0xFFFF_FFFC);
    }

    #[test]
    fn test_mixed_width_operands() {
        // one w operand narrows the whole comparison to 32 bits
        let sim = run_to_halt("
            main:
                mov x0, #1
                lsl x0, x0, #32
                add x0, x0, #5
                mov w1, #5
                cmp x0, w1
                ret
        ");
        assert!(sim.flags().z);

        // and the result of mixed arithmetic is the 32-bit result
        let sim = run_to_halt("
            main:
                mov x0, #1
                lsl x0, x0, #32
                add x0, x0, #6
                mov w1, #2
                add x2, x0, w1
                ret
        ");
        assert_eq!(sim.reg_file.get(2), 8);
    }

    #[test]
    fn test_ldr_w_sign_extends() {
        let sim = run_to_halt("
            .data
            val: .word -3
            .text
            main:
                adrp x9, val
                add x9, x9, :lo12:val
                ldr w0, [x9]
                ret
        ");
        assert_eq!(sim.reg_file.get(0), (-3i64) as u64);
    }

    #[test]
    fn test_unencodable_mov() {
        let mut sim = loaded("main: mov x0, #0x12345678");
        assert_eq!(
            sim.step(),
            Err(SimErr::UnencodableMov { imm: 0x1234_5678, width: Width::X })
        );
        // the error is fatal but inspectable
        assert_eq!(sim.pc(), 0);
    }

    #[test]
    fn test_data_image_and_reset() {
        let mut sim = loaded("
            .data
            counter: .quad 5
            .text
            main:
                adrp x9, counter
                add x9, x9, :lo12:counter
                ldr x0, [x9]
                add x0, x0, #1
                str x0, [x9]
                ret
        ");
        sim.run(100).unwrap();
        assert_eq!(sim.reg_file.get(0), 6);

        // reset restores the data image
        sim.reset();
        assert_eq!(sim.reg_file.get(0), 0);
        assert!(!sim.is_halted());
        sim.run(100).unwrap();
        assert_eq!(sim.reg_file.get(0), 6);
    }

    #[test]
    fn test_rodata_is_read_only() {
        let mut sim = loaded("
            .rodata
            k: .quad 9
            .text
            main:
                adrp x9, k
                mov x0, #1
                str x0, [x9]
                ret
        ");
        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.step(), Err(SimErr::ReadOnlyWrite { addr: 0x0010_0000 }));
    }

    #[test]
    fn test_load_failure_leaves_sane_state() {
        let mut sim = Simulator::new();
        assert!(sim.load("b nowhere").is_err());
        assert!(sim.is_halted());
        assert!(sim.program().is_none());
        assert_eq!(sim.step(), Err(SimErr::NotLoaded));
        assert_eq!(sim.reg_file.get(0), 0);

        // and a good load afterwards works
        sim.load("main: ret").unwrap();
        assert_eq!(sim.step().unwrap(), StepResult::Halted);
    }

    #[test]
    fn test_execution_starts_at_entry() {
        let sim = run_to_halt("
            helper:
                mov x0, #999
                ret
            main:
                mov x1, #1
                ret
        ");
        // helper never ran
        assert_eq!(sim.reg_file.get(0), 0);
        assert_eq!(sim.reg_file.get(1), 1);
    }

    #[test]
    fn test_cbz_cbnz() {
        let sim = run_to_halt("
            main:
                mov x0, #0
                cbz x0, took
                mov x1, #1
                ret
            took:
                mov x1, #2
                cbnz x1, out
                ret
            out:
                mov x2, #3
                ret
        ");
        assert_eq!(sim.reg_file.get(1), 2);
        assert_eq!(sim.reg_file.get(2), 3);
    }

    #[test]
    fn test_bitwise_and_shifts() {
        let sim = run_to_halt("
            main:
                mov x0, #0xF0
                mov x1, #0x1F
                and x2, x0, x1
                orr x3, x0, x1
                eor x4, x0, x1
                bic x5, x0, x1
                lsl x6, x1, #4
                asr x7, x0, #4
                ret
        ");
        assert_eq!(sim.reg_file.get(2), 0x10);
        assert_eq!(sim.reg_file.get(3), 0xFF);
        assert_eq!(sim.reg_file.get(4), 0xEF);
        assert_eq!(sim.reg_file.get(5), 0xE0);
        assert_eq!(sim.reg_file.get(6), 0x1F0);
        assert_eq!(sim.reg_file.get(7), 0xF);
    }

    #[test]
    fn test_ands_sets_flags() {
        let sim = run_to_halt("
            main:
                mov x0, #0xF0
                ands x1, x0, #0x0F
                ret
        ");
        assert!(sim.flags().z);
        assert!(!sim.flags().n);
    }

    #[test]
    fn test_inline_shift_operand() {
        let sim = run_to_halt("
            main:
                mov x0, #1
                mov x1, #0xFF
                orr x2, x0, x1, lsl #8
                ret
        ");
        assert_eq!(sim.reg_file.get(2), 0xFF01);
    }

    #[test]
    fn test_heap_collision_from_deep_stack() {
        // sp lowered into the heap region makes heap writes collide
        let mut sim = loaded("
            main:
                adrp x9, guard
                str x9, [x9]
                ret
            .bss
            guard: .skip 8
        ");
        // simulate a deep stack by hand
        sim.reg_file.set(9, 0x0050_0000);
        sim.sp = 0x0050_0000;
        sim.cursor = 1;
        assert_eq!(
            sim.step(),
            Err(SimErr::StackHeapCollision { addr: 0x0050_0000 })
        );
    }

    #[test]
    fn test_puts_scenario() {
        let io = BufferedIO::new();
        let mut sim = Simulator::new();
        sim.set_io(io.clone());
        sim.load("
            .rodata
            msg: .asciz \"Hi\"
            .text
            main:
                adrp x0, msg
                add x0, x0, :lo12:msg
                bl puts
                ret
        ").unwrap();
        sim.run(100).unwrap();
        assert!(sim.is_halted());
        assert_eq!(io.output_string(), "Hi\n");
        assert_eq!(sim.reg_file.get(0), 0);
    }

    #[test]
    fn test_region_contents_accessor() {
        let sim = loaded("
            .data
            v: .byte 0xAB
            .text
            main: ret
        ");
        assert_eq!(sim.mem.region_contents(Region::Data), vec![(0x0020_0000, 0xAB)]);
    }
}
