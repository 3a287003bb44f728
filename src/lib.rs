//! # cssputer
//!
//! **A circuit compiler whose target is a page of checkboxes and selector rules.**
//!
//! Every cell of state is a toggle. Every piece of logic is a rule of the form
//! "while this condition holds, this cell must be in that state". Build a
//! circuit with the combinators below, run its finishers, then splice the
//! declarations and rules into a page template.
//!
//! ## Quick Start
//!
//! ```rust
//! use cssputer::{Hardware, Memory, Simulator};
//!
//! let mut hw = Hardware::new();
//! let a = Memory::with_value(&mut hw, 4, 6);
//! let b = hw.alloc(4);
//! b.assign(&mut hw, &a.to_bools().not(), true).unwrap();
//! hw.finish().unwrap();
//!
//! let rules = cssputer::emit::render_rules(&hw);
//! assert_eq!(rules.lines().count(), 8);
//!
//! let mut sim = Simulator::new(&hw);
//! sim.settle(100).unwrap();
//! assert_eq!(sim.read(&b), 9);
//! ```
//!
//! ## Key Concepts
//!
//! - **Hardware**: the cell registry and rule accumulator
//! - **Bool**: constant-folding boolean expressions over cells
//! - **Number**: unsigned vectors with add, multiply and compare networks
//! - **Sequential**: counters, decoders, addressable arrays and phase rings
//! - **CPU**: a 13-instruction accumulator machine built from all of the above

pub mod asm;
pub mod bits;
pub mod config;
pub mod cpu;
pub mod emit;
pub mod hardware;
pub mod logic;
pub mod memo;
pub mod number;
pub mod sequential;
pub mod sim;

pub use asm::{assemble, AsmError, Program};
pub use bits::{Bools, Memory};
pub use config::CpuConfig;
pub use hardware::{Bit, CarryPool, CircuitError, Hardware, Label, Rule};
pub use logic::{Bool, CellId, Expr};
pub use number::Number;
pub use sequential::{Array, Counter, Edged, OneHot, PhaseRing};
pub use sim::{SimError, Simulator};
