//! An ARM64-subset parser, assembler, and simulator.
//!
//! This is meant as a teaching backend: it runs the small slice of
//! AArch64 assembly an introductory systems course writes by hand,
//! with strict memory checking and emulated C-style I/O.
//!
//! # Usage
//!
//! Source code can be parsed and assembled separately:
//! ```
//! use a64sim::parse::parse_stmts;
//! use a64sim::asm::{assemble, Program};
//!
//! let code = "
//!     main:
//!         mov x0, #5
//!         add x0, x0, #2
//!         ret
//! ";
//! let stmts = parse_stmts(code).unwrap();
//! let program: Program = assemble(&stmts).unwrap();
//! assert_eq!(program.instrs.len(), 3);
//! ```
//!
//! More commonly, a [`sim::Simulator`] does both as one load and then
//! executes the result:
//! ```
//! use a64sim::sim::Simulator;
//!
//! let mut simulator = Simulator::new();
//! simulator.load("
//!     main:
//!         mov x0, #5
//!         add x0, x0, #2
//!         ret
//! ").unwrap();
//! simulator.run(10_000).unwrap(); // <-- Result can be handled accordingly
//!
//! assert!(simulator.is_halted());
//! assert_eq!(simulator.reg_file.get(0), 7);
//! ```
//!
//! Execution can also be stepped one instruction at a time, inspecting
//! registers, flags, memory, and stack frames between steps.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod sim;
pub mod err;
