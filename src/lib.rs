//! A Gumnut parser, assembler, and simulator.
//!
//! Gumnut is a small 8-bit soft-core CPU used for teaching digital design.
//! It has 8 registers, 20-bit instruction words in a 4096-word instruction memory,
//! a separate 256-byte data memory, 256 I/O controller registers
//! and an 8-entry return-address stack.
//!
//! # Usage
//!
//! To convert Gumnut source code to an image, it must be assembled:
//! ```
//! use gumnut_sim::asm::assemble;
//!
//! let code = "
//!     ; count down from 3
//!           ldm  r1, start
//!     loop: sub  r1, r1, 1
//!           bnz  loop
//!           stby
//!     start: byte 3
//! ";
//! let image = assemble(code).unwrap();
//! assert_eq!(image.instr_count(), 4);
//! ```
//!
//! Lines can also be parsed on their own (see the [`parse`] module),
//! and images can be written out with an [`asm::encoding::ImageFormat`].
//!
//! Once source is ready, it can be executed with the simulator:
//! ```
//! # let code = "ldm r1, start\nloop: sub r1, r1, 1\nbnz loop\nstby\nstart: byte 3";
//! use gumnut_sim::sim::{Simulator, RunState};
//! use gumnut_sim::ast::reg_consts::R1;
//!
//! let mut simulator = Simulator::new(Default::default());
//! assert_eq!(simulator.setup(code), RunState::Idle);
//! simulator.run();
//!
//! assert_eq!(simulator.core.reg_file[R1], 0);
//! assert!(simulator.flags().stby);
//! ```
//!
//! If more granularity is needed for simulation, there are step, breakpoint and snapshot functions.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod sim;
pub mod err;
