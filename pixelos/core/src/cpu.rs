use std::fmt;

use tracing::{debug, warn};

use crate::memory::{AddressSpace, Color};
use crate::{CoreError, Result};

pub const NUM_REGISTERS: usize = 8;

/// Accumulator slot used by the baseline opcode set.
const R0: usize = 0;

/// Instruction tags, dispatched by exact match on the stored color. There
/// is no prefix or partial matching: a cell either is one of these colors
/// or it is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Halt,
    IncR0,
    PrintR0,
    DecR0,
    /// Loads the byte stored in the next cell into the accumulator. The
    /// operand cell is skipped, not executed.
    LoadR0,
}

impl Opcode {
    pub fn from_color(color: Color) -> Option<Self> {
        match color {
            Color(255, 0, 0) => Some(Opcode::Halt),
            Color(0, 255, 0) => Some(Opcode::IncR0),
            Color(0, 0, 255) => Some(Opcode::PrintR0),
            Color(255, 255, 0) => Some(Opcode::DecR0),
            Color(0, 255, 255) => Some(Opcode::LoadR0),
            _ => None,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Opcode::Halt => Color(255, 0, 0),
            Opcode::IncR0 => Color(0, 255, 0),
            Opcode::PrintR0 => Color(0, 0, 255),
            Opcode::DecR0 => Color(255, 255, 0),
            Opcode::LoadR0 => Color(0, 255, 255),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "HALT",
            Opcode::IncR0 => "INC_R0",
            Opcode::PrintR0 => "PRINT_R0",
            Opcode::DecR0 => "DEC_R0",
            Opcode::LoadR0 => "LOAD_R0",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Eight fixed general-purpose slots. Indexing past slot 7 is a caller
/// error surfaced at the interface, never a wraparound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    slots: [u64; NUM_REGISTERS],
}

impl RegisterFile {
    pub fn get(&self, index: usize) -> Result<u64> {
        self.slots
            .get(index)
            .copied()
            .ok_or(CoreError::RegisterOutOfRange(index))
    }

    pub fn set(&mut self, index: usize, value: u64) -> Result<()> {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CoreError::RegisterOutOfRange(index)),
        }
    }

    pub fn clear(&mut self) {
        self.slots = [0; NUM_REGISTERS];
    }
}

/// Observable side effects of execution, drained by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// PRINT_R0 output: the accumulator value at execution time.
    Print(u64),
    /// A fetched color matched no table entry. Non-fatal; execution
    /// continues at the next cell.
    UnknownOpcode { pc: u32, color: Color },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// HALT executed. The unit stays halted until [`InstructionUnit::reset`].
    Halted,
    /// The cycle budget ran out with the unit still running.
    CycleLimit,
}

/// Bounded fetch-decode-execute engine over an [`AddressSpace`].
///
/// Program and data share the one address space and the one color
/// encoding; there is no code/data distinction. The unit is reusable
/// across `run` calls: registers and the program counter persist until an
/// explicit `reset`.
pub struct InstructionUnit {
    pub memory: AddressSpace,
    pc: u32,
    registers: RegisterFile,
    running: bool,
    events: Vec<Event>,
}

impl InstructionUnit {
    pub fn new(memory: AddressSpace) -> Self {
        Self {
            memory,
            pc: 0,
            registers: RegisterFile::default(),
            running: true,
            events: Vec::new(),
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Write a sequence of instruction colors at consecutive addresses.
    pub fn load_program(&mut self, start: u32, program: &[Color]) {
        for (offset, color) in program.iter().enumerate() {
            self.memory.write_color(start + offset as u32, *color);
        }
    }

    /// The stored color under the program counter. Unwritten cells fetch
    /// as blank, which no table entry matches.
    pub fn fetch(&self) -> Color {
        self.memory.read_color(self.pc)
    }

    pub fn decode_execute(&mut self, color: Color) {
        let Some(opcode) = Opcode::from_color(color) else {
            warn!(pc = self.pc, color = %color, "unknown opcode");
            self.events.push(Event::UnknownOpcode { pc: self.pc, color });
            return;
        };
        debug!(pc = self.pc, opcode = %opcode, "execute");
        match opcode {
            Opcode::Halt => self.running = false,
            Opcode::IncR0 => {
                let slot = &mut self.registers.slots[R0];
                *slot = slot.wrapping_add(1);
            }
            Opcode::PrintR0 => self.events.push(Event::Print(self.registers.slots[R0])),
            Opcode::DecR0 => {
                let slot = &mut self.registers.slots[R0];
                *slot = slot.saturating_sub(1);
            }
            Opcode::LoadR0 => {
                // Operand lives in the next cell; bump the counter here so
                // the loop's unconditional increment lands past it.
                let value = self.memory.read(self.pc.wrapping_add(1));
                self.registers.slots[R0] = value as u64;
                self.pc = self.pc.wrapping_add(1);
            }
        }
    }

    /// One fetch-decode-execute cycle. The program counter advances by
    /// exactly one afterwards — after HALT and after unknown opcodes too.
    /// Stopping is the run loop's job, not `step`'s.
    pub fn step(&mut self) {
        let color = self.fetch();
        self.decode_execute(color);
        self.pc = self.pc.wrapping_add(1);
    }

    /// Execute until HALT or until `max_cycles` steps have run, whichever
    /// comes first. Resumable: a second call continues from the current
    /// counter and register state. There is deliberately no unbounded
    /// variant.
    pub fn run(&mut self, max_cycles: u64) -> StopReason {
        let mut cycles = 0u64;
        while self.running && cycles < max_cycles {
            self.step();
            cycles += 1;
        }
        if self.running {
            debug!(cycles, pc = self.pc, "cycle budget exhausted");
            StopReason::CycleLimit
        } else {
            debug!(cycles, pc = self.pc, "halted");
            StopReason::Halted
        }
    }

    /// Back to the initial state: counter zero, registers cleared, running.
    /// This is the only transition out of the halted state.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.registers.clear();
        self.running = true;
        self.events.clear();
    }

    /// Take all pending events, leaving the buffer empty.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_is_exact_match() {
        assert_eq!(Opcode::from_color(Color(255, 0, 0)), Some(Opcode::Halt));
        assert_eq!(Opcode::from_color(Color(0, 255, 0)), Some(Opcode::IncR0));
        assert_eq!(Opcode::from_color(Color(0, 0, 255)), Some(Opcode::PrintR0));
        // Near misses on any channel stay unknown.
        assert_eq!(Opcode::from_color(Color(255, 0, 1)), None);
        assert_eq!(Opcode::from_color(Color(254, 0, 0)), None);
        assert_eq!(Opcode::from_color(Color(0, 0, 0)), None);
    }

    #[test]
    fn opcode_colors_round_trip() {
        for opcode in [
            Opcode::Halt,
            Opcode::IncR0,
            Opcode::PrintR0,
            Opcode::DecR0,
            Opcode::LoadR0,
        ] {
            assert_eq!(Opcode::from_color(opcode.color()), Some(opcode));
        }
    }

    #[test]
    fn register_file_is_bounds_checked() {
        let mut regs = RegisterFile::default();
        regs.set(7, 11).unwrap();
        assert_eq!(regs.get(7).unwrap(), 11);
        assert!(matches!(
            regs.get(NUM_REGISTERS),
            Err(CoreError::RegisterOutOfRange(8))
        ));
        assert!(matches!(
            regs.set(100, 1),
            Err(CoreError::RegisterOutOfRange(100))
        ));
    }

    #[test]
    fn halt_transitions_after_exactly_one_step() {
        let mut space = AddressSpace::new();
        space.write_color(0, Opcode::Halt.color());
        let mut unit = InstructionUnit::new(space);

        assert!(unit.is_running());
        unit.step();
        assert!(!unit.is_running());
        // The counter still advanced past the HALT cell.
        assert_eq!(unit.pc(), 1);
    }

    #[test]
    fn run_on_halt_program_performs_one_step() {
        let mut space = AddressSpace::new();
        space.write_color(0, Opcode::Halt.color());
        let mut unit = InstructionUnit::new(space);

        assert_eq!(unit.run(100), StopReason::Halted);
        assert_eq!(unit.pc(), 1);
        assert!(!unit.is_running());

        // A halted unit does not run again without a reset.
        assert_eq!(unit.run(100), StopReason::Halted);
        assert_eq!(unit.pc(), 1);
    }

    #[test]
    fn unknown_opcode_is_diagnostic_not_fatal() {
        let mut space = AddressSpace::new();
        space.write_color(0, Color(10, 20, 30));
        let mut unit = InstructionUnit::new(space);

        unit.step();
        assert!(unit.is_running());
        assert_eq!(unit.pc(), 1);
        assert_eq!(
            unit.drain_events(),
            vec![Event::UnknownOpcode {
                pc: 0,
                color: Color(10, 20, 30)
            }]
        );
    }

    #[test]
    fn dec_r0_saturates_at_zero() {
        let mut unit = InstructionUnit::new(AddressSpace::new());
        unit.load_program(0, &[Opcode::DecR0.color(), Opcode::Halt.color()]);
        unit.run(10);
        assert_eq!(unit.registers().get(0).unwrap(), 0);
    }

    #[test]
    fn load_r0_reads_immediate_and_skips_operand() {
        let mut unit = InstructionUnit::new(AddressSpace::new());
        unit.load_program(0, &[Opcode::LoadR0.color()]);
        // Operand cell: byte 77 with junk in the reserved channels; only
        // channel 0 is read, and the cell is never dispatched.
        unit.memory.write_color(1, Color(77, 255, 255));
        unit.load_program(2, &[Opcode::Halt.color()]);

        assert_eq!(unit.run(10), StopReason::Halted);
        assert_eq!(unit.registers().get(0).unwrap(), 77);
        assert_eq!(unit.pc(), 3);
        assert!(unit.drain_events().is_empty());
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut unit = InstructionUnit::new(AddressSpace::new());
        unit.load_program(
            0,
            &[Opcode::IncR0.color(), Opcode::PrintR0.color(), Opcode::Halt.color()],
        );
        unit.run(10);
        assert!(!unit.is_running());

        unit.reset();
        assert!(unit.is_running());
        assert_eq!(unit.pc(), 0);
        assert_eq!(unit.registers().get(0).unwrap(), 0);
        assert!(unit.drain_events().is_empty());

        // Memory is untouched by reset; the program runs again.
        assert_eq!(unit.run(10), StopReason::Halted);
        assert_eq!(unit.registers().get(0).unwrap(), 1);
    }
}
