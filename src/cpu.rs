//! # CPU — Stored-Program Computer
//!
//! A single-accumulator machine compiled entirely into drive rules. Each
//! instruction takes one lap of the phase ring:
//!
//! | Phase | Work |
//! |---|---|
//! | 0 | advance the instruction pointer |
//! | 1 | fetch the opcode from `IP << 1` |
//! | 2 | fetch the operand from `(IP << 1) \| 1` |
//! | 3–5 | execute |
//!
//! Memory row 0 doubles as the accumulator. Operands address memory through
//! `op_address | index`, so aligned tables can be walked with `INDX`.
//!
//! ```rust
//! use cssputer::{asm, cpu, CpuConfig, Simulator};
//!
//! let program = asm::assemble("LOAD x\nADD y\nSTOR x\nEXIT\n\nDATA:\nx = 3\ny = 5\n", 8).unwrap();
//! let config = CpuConfig { memory_size: 16, ..CpuConfig::default() };
//! let (hw, machine) = cpu::compile(&config, &program.image).unwrap();
//!
//! let mut sim = Simulator::new(&hw);
//! let halt = machine.run(&mut sim, 1_000_000).unwrap();
//! assert!(matches!(halt, cpu::Halt::Exited { .. }));
//! assert_eq!(sim.read(machine.memory().row(program.symbols["x"]).unwrap()), 8);
//! ```

use crate::asm::Opcode;
use crate::bits::Memory;
use crate::config::CpuConfig;
use crate::hardware::{Bit, CircuitError, Hardware};
use crate::logic::Bool;
use crate::number::Number;
use crate::sequential::{Array, Counter, OneHot, PhaseRing};
use crate::sim::{SimError, Simulator};
use tracing::info;

/// Opcodes that read the operand's memory row during phase 3.
const LOADING: [Opcode; 8] = [
    Opcode::Load,
    Opcode::Add,
    Opcode::Swap,
    Opcode::Mult,
    Opcode::Skip,
    Opcode::Leap,
    Opcode::Eq,
    Opcode::Gteq,
];

/// Handles on the registers of a compiled machine.
#[derive(Debug, Clone)]
pub struct Cpu {
    phase: PhaseRing,
    op_code: OneHot,
    op_address: Memory,
    index: Memory,
    intermediate: Memory,
    memory: Array,
    instruction_pointer: Counter,
    freezer: Bit,
}

/// Why a simulated run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// An `EXIT` raised the freezer after `steps` flips
    Exited { steps: usize },
    /// Nothing left to flip without an `EXIT`
    Stalled,
    StepLimit,
}

/// Wire the machine for `image` into `hw`. The registry is left unfinished.
pub fn build(hw: &mut Hardware, config: &CpuConfig, image: &[u64]) -> Result<Cpu, CircuitError> {
    config.validate()?;
    if image.len() >= config.memory_size {
        return Err(CircuitError::CapacityExceeded {
            image: image.len(),
            capacity: config.memory_size,
        });
    }
    let width = config.bit_width;

    let phase = PhaseRing::new(hw, config.phase_len)?;
    let op_code = OneHot::new(hw, Opcode::COUNT);
    let op_address = hw.alloc(width);
    let index = hw.alloc(width);
    let intermediate = hw.alloc(width);
    let carries = hw.carry_pool(config.carry_pool_size());
    let memory = Array::new(hw, config.memory_size, width, width, image)?;
    let instruction_pointer = Counter::new(hw, width, 0)?;
    let freezer = hw.bit(false);

    freezer.set(hw, false);
    let accumulator = memory.rows()[0].clone();
    let acc = accumulator.number();
    let op = |code: Opcode| op_code[code.code()];

    let phase_0 = phase.exactly(0)?;
    instruction_pointer.count(&phase_0);

    let phase_1 = phase.exactly(1)?;
    let op_code_idx = instruction_pointer.number().rotate_left(1);
    let fetched = memory.get(hw, &op_code_idx, &phase_1)?;
    op_code.set_source(hw, &fetched, &phase_1);

    let phase_2 = phase.exactly(2)?;
    let operand_idx = op_code_idx.or_const(1);
    let fetched = memory.get(hw, &operand_idx, &phase_2)?;
    op_address.assign(hw, fetched.bools(), &phase_2)?;

    let phase_3 = phase.exactly(3)?;
    let phase_4 = phase.exactly(4)?;
    let phase_5 = phase.exactly(5)?;
    let executing = |p: &Bool, code: Opcode| p & op(code);

    let ref_address = op_address.number().or(&index.number())?;
    let loading = &phase_3 & Bool::or_(LOADING.iter().map(|code| Bool::from(op(*code))));
    let loaded = memory.get(hw, &ref_address, loading)?;

    freezer.if_(hw, executing(&phase_3, Opcode::Exit));

    accumulator.assign(hw, loaded.bools(), executing(&phase_4, Opcode::Load))?;

    memory.set(hw, &ref_address, &acc, executing(&phase_3, Opcode::Stor))?;

    let adding = executing(&phase_3, Opcode::Add);
    let sum = acc.add(hw, &loaded, &adding, Some(&carries))?;
    intermediate.assign(hw, sum.bools(), &adding)?;
    accumulator.assign(hw, &intermediate.to_bools(), executing(&phase_4, Opcode::Add))?;

    let swapping = executing(&phase_3, Opcode::Swap);
    intermediate.assign(hw, loaded.bools(), &swapping)?;
    memory.set(hw, &ref_address, &acc, executing(&phase_4, Opcode::Swap))?;
    accumulator.assign(hw, &intermediate.to_bools(), executing(&phase_5, Opcode::Swap))?;

    let multiplying = executing(&phase_3, Opcode::Mult);
    let product = acc.multiply(hw, &loaded, &multiplying, Some(&carries))?;
    intermediate.assign(hw, product.bools(), &multiplying)?;
    accumulator.assign(hw, &intermediate.to_bools(), executing(&phase_4, Opcode::Mult))?;

    intermediate.assign(hw, acc.bools(), executing(&phase_3, Opcode::Inv))?;
    accumulator.assign(hw, &intermediate.to_bools().not(), executing(&phase_4, Opcode::Inv))?;

    let ip = instruction_pointer.value();
    ip.assign(hw, &op_address.to_bools(), executing(&phase_3, Opcode::Goto))?;

    instruction_pointer.count(loaded.ne_const(0) & executing(&phase_4, Opcode::Skip));

    ip.assign(hw, loaded.bools(), executing(&phase_4, Opcode::Leap))?;

    let indexing = executing(&phase_3, Opcode::Indx);
    let offset = memory.get(hw, &op_address.number(), &indexing)?;
    index.assign(hw, offset.bools(), &indexing)?;

    let comparing = executing(&phase_3, Opcode::Eq);
    intermediate[0].iff_when(hw, acc.equals(&loaded)?, &comparing);
    accumulator[0].iff_when(hw, intermediate[0], executing(&phase_4, Opcode::Eq));

    let ordering = executing(&phase_3, Opcode::Gteq);
    let at_least = acc.greater_or_equal(hw, &loaded, &ordering, Some(&carries))?;
    intermediate[0].iff_when(hw, at_least, &ordering);
    accumulator[0].iff_when(hw, intermediate[0], executing(&phase_4, Opcode::Gteq));

    // comparisons leave a single-bit answer
    let answering = &phase_4 & (op(Opcode::Eq) | op(Opcode::Gteq));
    for bit in &accumulator.bits()[1..] {
        bit.not_if(hw, &answering);
    }

    phase.label(hw, "phase");
    instruction_pointer.label(hw, "instruction pointer");
    op_code.label(hw, "op code");
    op_address.label(hw, "op address");
    accumulator.label(hw, "accumulator");
    memory.index().label(hw, "mem index");
    memory.input().label(hw, "mem in");
    memory.output().label(hw, "mem out");
    intermediate.label(hw, "intermediate");
    freezer.label(hw, "freezer");
    index.label(hw, "index");
    // row 0 is the accumulator and row 1 is reserved
    for (i, row) in memory.rows().iter().enumerate().skip(2) {
        row.label(hw, &format!("mem section {}", i));
    }

    info!(
        cells = hw.cell_count(),
        rules = hw.rules().len(),
        image = image.len(),
        "built cpu"
    );
    Ok(Cpu {
        phase,
        op_code,
        op_address,
        index,
        intermediate,
        memory,
        instruction_pointer,
        freezer,
    })
}

/// Build the machine into a fresh registry and run its finishers.
pub fn compile(config: &CpuConfig, image: &[u64]) -> Result<(Hardware, Cpu), CircuitError> {
    let mut hw = Hardware::new();
    let cpu = build(&mut hw, config, image)?;
    hw.finish()?;
    Ok((hw, cpu))
}

impl Cpu {
    pub fn accumulator(&self) -> &Memory {
        &self.memory.rows()[0]
    }

    pub fn memory(&self) -> &Array {
        &self.memory
    }

    pub fn instruction_pointer(&self) -> &Counter {
        &self.instruction_pointer
    }

    pub fn phase(&self) -> &PhaseRing {
        &self.phase
    }

    pub fn op_code(&self) -> &OneHot {
        &self.op_code
    }

    pub fn op_address(&self) -> Number {
        self.op_address.number()
    }

    pub fn index(&self) -> &Memory {
        &self.index
    }

    pub fn intermediate(&self) -> &Memory {
        &self.intermediate
    }

    pub fn freezer(&self) -> Bit {
        self.freezer
    }

    /// Step `sim` until an `EXIT` raises the freezer or `limit` flips pass.
    pub fn run(&self, sim: &mut Simulator<'_>, limit: usize) -> Result<Halt, SimError> {
        let freezer = self.freezer;
        match sim.run_until(limit, |s| s.get(freezer)) {
            Ok(steps) if sim.get(freezer) => Ok(Halt::Exited { steps }),
            Ok(_) => Ok(Halt::Stalled),
            Err(SimError::DidNotSettle { .. }) => Ok(Halt::StepLimit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    const LIMIT: usize = 2_000_000;

    fn small() -> CpuConfig {
        CpuConfig {
            memory_size: 32,
            ..CpuConfig::default()
        }
    }

    fn run_program(source: &str) -> (Hardware, Cpu, crate::asm::Program) {
        let program = assemble(source, 8).unwrap();
        let (hw, cpu) = compile(&small(), &program.image).unwrap();
        (hw, cpu, program)
    }

    fn row(sim: &Simulator<'_>, cpu: &Cpu, at: usize) -> u64 {
        sim.read(cpu.memory().row(at).unwrap())
    }

    #[test]
    fn load_add_store_exit() {
        let (hw, cpu, program) = run_program("LOAD x\nADD y\nSTOR z\nEXIT\n\nDATA:\nx = 3\ny = 5\nz = 0\n");
        let mut sim = Simulator::new(&hw);
        let halt = cpu.run(&mut sim, LIMIT).unwrap();
        assert!(matches!(halt, Halt::Exited { .. }), "{:?}", halt);
        assert_eq!(row(&sim, &cpu, program.symbols["z"]), 8);
        assert_eq!(sim.read(cpu.accumulator()), 8);
        assert_eq!(sim.read(cpu.instruction_pointer().value()), 4);
    }

    #[test]
    fn multiply_and_swap() {
        let source = "LOAD x\nMULT y\nSWAP y\nSTOR z\nEXIT\n\nDATA:\nx = 6\ny = 7\nz = 0\n";
        let (hw, cpu, program) = run_program(source);
        let mut sim = Simulator::new(&hw);
        assert!(matches!(cpu.run(&mut sim, LIMIT).unwrap(), Halt::Exited { .. }));
        assert_eq!(row(&sim, &cpu, program.symbols["y"]), 42);
        assert_eq!(row(&sim, &cpu, program.symbols["z"]), 7);
    }

    #[test]
    fn comparisons_and_skip() {
        // GTEQ yields 1, so SKIP jumps over the store of the marker
        let source = "LOAD x\nGTEQ y\nSTOR r\nSKIP r\nSTOR m\nLOAD x\nEQ x\nSTOR e\nEXIT\n\n\
                      DATA:\nx = 9\ny = 4\nr = 0\nm = 0\ne = 0\n";
        let (hw, cpu, program) = run_program(source);
        let mut sim = Simulator::new(&hw);
        assert!(matches!(cpu.run(&mut sim, LIMIT).unwrap(), Halt::Exited { .. }));
        assert_eq!(row(&sim, &cpu, program.symbols["r"]), 1);
        assert_eq!(row(&sim, &cpu, program.symbols["m"]), 0);
        assert_eq!(row(&sim, &cpu, program.symbols["e"]), 1);
    }

    #[test]
    fn goto_loops_until_counter_wraps() {
        // count x down by adding 0xFF until it reaches zero
        let source = "LOAD x\nADD m\nSTOR x\nSKIP x\nEXIT\nGOTO 1\n\nDATA:\nx = 3\nm = FF\n";
        let (hw, cpu, program) = run_program(source);
        let mut sim = Simulator::new(&hw);
        assert!(matches!(cpu.run(&mut sim, LIMIT).unwrap(), Halt::Exited { .. }));
        assert_eq!(row(&sim, &cpu, program.symbols["x"]), 0);
    }

    #[test]
    fn inv_complements_accumulator() {
        let (hw, cpu, program) = run_program("LOAD x\nINV\nSTOR x\nEXIT\n\nDATA:\nx = F0\n");
        let mut sim = Simulator::new(&hw);
        assert!(matches!(cpu.run(&mut sim, LIMIT).unwrap(), Halt::Exited { .. }));
        assert_eq!(row(&sim, &cpu, program.symbols["x"]), 0x0F);
    }

    #[test]
    fn oversized_image_is_rejected_before_wiring() {
        let mut hw = Hardware::new();
        let err = build(&mut hw, &small(), &[0; 32]).unwrap_err();
        assert_eq!(err, CircuitError::CapacityExceeded { image: 32, capacity: 32 });
        assert_eq!(hw.cell_count(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CpuConfig {
            phase_len: 4,
            ..CpuConfig::default()
        };
        assert!(matches!(compile(&config, &[]), Err(CircuitError::InvalidConfig(_))));
    }

    #[test]
    fn registers_are_labelled() {
        let (hw, _, _) = run_program("EXIT\n");
        let names: Vec<&str> = hw.labels().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(&names[..3], &["phase", "instruction pointer", "op code"]);
        assert!(names.contains(&"mem section 2"));
        assert!(!names.contains(&"mem section 1"));
        assert_eq!(names.len(), 11 + 30);
    }

    #[test]
    fn step_limit_is_reported() {
        let (hw, cpu, _) = run_program("GOTO 1\n");
        let mut sim = Simulator::new(&hw);
        assert_eq!(cpu.run(&mut sim, 5_000).unwrap(), Halt::StepLimit);
    }
}
