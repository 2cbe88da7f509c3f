//! LS-8 CPU core: the fetch-decode-execute cycle engine.
//!
//! One `step()` is one cycle: sample the event sources, service a pending
//! interrupt, fetch three bytes, decode, dispatch, and advance PC unless
//! the instruction owns it (the sets-PC bit). The engine exclusively owns
//! memory, registers, and flags; hosts integrate through the `Clock`,
//! `InputSource`, and `OutputSink` traits.

use std::fmt;
use std::fmt::Write as _;
use std::io;

use emu_core::{Clock, InputSource, Observable, OutputSink, Value};

use crate::alu;
use crate::flags::Flags;
use crate::memory::Memory;
use crate::opcode::Opcode;
use crate::registers::RegisterFile;

/// Why the machine stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The program executed HLT.
    Halted,
    /// The machine hit a fatal condition.
    Fault(Fault),
}

/// A fatal condition, carrying the PC of the offending instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub pc: u8,
}

/// The kinds of fatal condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The fetched byte does not decode to an instruction.
    UnknownOpcode(u8),
    /// MOD with a zero divisor.
    DivideByZero,
    /// The input source or output sink reported a transport error.
    Io(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::UnknownOpcode(byte) => {
                write!(f, "unknown opcode {byte:#04X} at PC {:#04X}", self.pc)
            }
            FaultKind::DivideByZero => write!(f, "division by zero at PC {:#04X}", self.pc),
            FaultKind::Io(message) => write!(f, "I/O fault at PC {:#04X}: {message}", self.pc),
        }
    }
}

fn io_fault(e: io::Error) -> FaultKind {
    FaultKind::Io(e.to_string())
}

/// The LS-8 machine.
///
/// Registers, PC, and FL are public so that hosts and tests can stage or
/// inspect machine state between cycles; during `run` the engine is the
/// only writer.
pub struct Ls8 {
    pub(crate) mem: Memory,
    /// The eight general registers (R5=IM, R6=IS, R7=SP).
    pub reg: RegisterFile,
    /// Address of the next instruction to fetch.
    pub pc: u8,
    /// Last fetched opcode byte.
    pub ir: u8,
    /// The flags register.
    pub fl: Flags,
    pub(crate) running: bool,
    /// Set while servicing an interrupt; cleared by IRET.
    pub(crate) in_isr: bool,
    /// Time of the last timer raise, or of the first sample.
    pub(crate) timer_anchor: Option<f64>,
    /// Completed cycles since construction.
    pub(crate) cycle: u64,
}

impl Ls8 {
    /// A fresh machine: zeroed memory and registers, SP at the stack top,
    /// PC at 0, running.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mem: Memory::new(),
            reg: RegisterFile::new(),
            pc: 0,
            ir: 0,
            fl: Flags::new(),
            running: true,
            in_isr: false,
            timer_anchor: None,
            cycle: 0,
        }
    }

    /// Write one byte of the program image (the loader's entry point).
    pub fn load_byte(&mut self, address: u8, value: u8) {
        self.mem.poke(address, value);
    }

    /// Bulk-load an image starting at `origin`.
    pub fn load(&mut self, origin: u8, bytes: &[u8]) {
        self.mem.load(origin, bytes);
    }

    /// Read a memory cell without disturbing MAR/MDR.
    #[must_use]
    pub const fn peek(&self, address: u8) -> u8 {
        self.mem.peek(address)
    }

    /// Whether HLT has been executed or a fault has stopped the machine.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Completed cycles since construction.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Execute one cycle.
    ///
    /// Returns `None` while the machine keeps running, `Some(Exit::Halted)`
    /// once HLT executes, and `Some(Exit::Fault(..))` on a fatal condition.
    /// Stepping a stopped machine reports `Halted` again without side
    /// effects.
    pub fn step<C, I, O>(&mut self, clock: &mut C, input: &mut I, output: &mut O) -> Option<Exit>
    where
        C: Clock,
        I: InputSource,
        O: OutputSink,
    {
        if !self.running {
            return Some(Exit::Halted);
        }

        if let Err(kind) = self.poll_interrupt_sources(clock, input) {
            return Some(self.fault(kind, self.pc));
        }
        if !self.in_isr {
            self.service_pending_interrupt();
        }

        let pc = self.pc;
        self.ir = self.mem.read(pc);
        // Speculative reads; harmless for zero- and one-operand instructions.
        let operand_a = self.mem.read(pc.wrapping_add(1));
        let operand_b = self.mem.read(pc.wrapping_add(2));

        let Some(op) = Opcode::decode(self.ir) else {
            return Some(self.fault(FaultKind::UnknownOpcode(self.ir), pc));
        };

        if let Err(kind) = self.execute(op, operand_a, operand_b, output) {
            return Some(self.fault(kind, pc));
        }

        if !op.sets_pc() {
            self.pc = self.pc.wrapping_add(op.operand_count() + 1);
        }
        self.cycle += 1;

        if self.running { None } else { Some(Exit::Halted) }
    }

    /// Run until HLT or a fault.
    pub fn run<C, I, O>(&mut self, clock: &mut C, input: &mut I, output: &mut O) -> Exit
    where
        C: Clock,
        I: InputSource,
        O: OutputSink,
    {
        loop {
            if let Some(exit) = self.step(clock, input, output) {
                return exit;
            }
        }
    }

    fn fault(&mut self, kind: FaultKind, pc: u8) -> Exit {
        self.running = false;
        Exit::Fault(Fault { kind, pc })
    }

    /// Push one byte: decrement SP, then write.
    pub(crate) fn push(&mut self, value: u8) {
        let sp = self.reg.sp().wrapping_sub(1);
        self.reg.set_sp(sp);
        self.mem.write(sp, value);
    }

    /// Pop one byte: read, then increment SP.
    pub(crate) fn pop(&mut self) -> u8 {
        let sp = self.reg.sp();
        let value = self.mem.read(sp);
        self.reg.set_sp(sp.wrapping_add(1));
        value
    }

    fn execute<O: OutputSink>(
        &mut self,
        op: Opcode,
        a: u8,
        b: u8,
        output: &mut O,
    ) -> Result<(), FaultKind> {
        match op {
            Opcode::Hlt => self.running = false,
            Opcode::Ret => self.pc = self.pop(),
            Opcode::Iret => self.return_from_interrupt(),
            Opcode::Push => {
                let value = self.reg.get(a);
                self.push(value);
            }
            Opcode::Pop => {
                let value = self.pop();
                self.reg.set(a, value);
            }
            Opcode::Prn => output.print_value(self.reg.get(a)).map_err(io_fault)?,
            Opcode::Pra => output.print_char(self.reg.get(a)).map_err(io_fault)?,
            Opcode::Call => {
                let return_address = self.pc.wrapping_add(2);
                self.push(return_address);
                self.pc = self.reg.get(a);
            }
            Opcode::Jmp => self.pc = self.reg.get(a),
            Opcode::Jeq => self.jump_if(self.fl.equal(), a),
            Opcode::Jne => self.jump_if(!self.fl.equal(), a),
            Opcode::Jgt => self.jump_if(self.fl.greater(), a),
            Opcode::Jlt => self.jump_if(self.fl.less(), a),
            Opcode::Jle => self.jump_if(self.fl.less() || self.fl.equal(), a),
            Opcode::Jge => self.jump_if(self.fl.greater() || self.fl.equal(), a),
            Opcode::Not => {
                let value = alu::not(self.reg.get(a));
                self.reg.set(a, value);
            }
            Opcode::Ldi => self.reg.set(a, b),
            Opcode::Ld => {
                let address = self.reg.get(b);
                let value = self.mem.read(address);
                self.reg.set(a, value);
            }
            Opcode::St => {
                let address = self.reg.get(a);
                let value = self.reg.get(b);
                self.mem.write(address, value);
            }
            Opcode::Add => self.binary_op(a, b, alu::add),
            Opcode::Mul => self.binary_op(a, b, alu::mul),
            Opcode::Mod => {
                let Some(value) = alu::modulo(self.reg.get(a), self.reg.get(b)) else {
                    return Err(FaultKind::DivideByZero);
                };
                self.reg.set(a, value);
            }
            Opcode::Cmp => self.fl = alu::compare(self.reg.get(a), self.reg.get(b)),
            Opcode::And => self.binary_op(a, b, alu::and),
            Opcode::Or => self.binary_op(a, b, alu::or),
            Opcode::Xor => self.binary_op(a, b, alu::xor),
            Opcode::Shl => self.binary_op(a, b, alu::shl),
            Opcode::Shr => self.binary_op(a, b, alu::shr),
        }
        Ok(())
    }

    /// Taken or not, a conditional jump owns the next PC.
    fn jump_if(&mut self, condition: bool, reg: u8) {
        self.pc = if condition {
            self.reg.get(reg)
        } else {
            self.pc.wrapping_add(2)
        };
    }

    /// Apply a two-register ALU operator, writing back to the first.
    fn binary_op(&mut self, a: u8, b: u8, op: fn(u8, u8) -> u8) {
        let result = op(self.reg.get(a), self.reg.get(b));
        self.reg.set(a, result);
    }

    /// One line of machine state: PC, the three bytes at PC, FL, and the
    /// register file.
    #[must_use]
    pub fn trace(&self) -> String {
        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} | FL={:02X} |",
            self.pc,
            self.mem.peek(self.pc),
            self.mem.peek(self.pc.wrapping_add(1)),
            self.mem.peek(self.pc.wrapping_add(2)),
            self.fl.to_byte(),
        );
        for index in 0..8 {
            let _ = write!(line, " {:02X}", self.reg.get(index));
        }
        line
    }
}

impl Default for Ls8 {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Ls8 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(self.pc.into()),
            "ir" => Some(self.ir.into()),
            "fl" => Some(self.fl.to_byte().into()),
            "flags.e" | "e" => Some(self.fl.equal().into()),
            "flags.g" | "g" => Some(self.fl.greater().into()),
            "flags.l" | "l" => Some(self.fl.less().into()),
            "sp" => Some(self.reg.sp().into()),
            "im" => Some(self.reg.interrupt_mask().into()),
            "is" => Some(self.reg.interrupt_status().into()),
            "mar" => Some(self.mem.mar().into()),
            "mdr" => Some(self.mem.mdr().into()),
            "r0" => Some(self.reg.get(0).into()),
            "r1" => Some(self.reg.get(1).into()),
            "r2" => Some(self.reg.get(2).into()),
            "r3" => Some(self.reg.get(3).into()),
            "r4" => Some(self.reg.get(4).into()),
            "r5" => Some(self.reg.get(5).into()),
            "r6" => Some(self.reg.get(6).into()),
            "r7" => Some(self.reg.get(7).into()),
            "cycle" => Some(Value::U64(self.cycle)),
            "running" => Some(self.running.into()),
            "in_isr" => Some(self.in_isr.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc", "ir", "fl", "flags.e", "flags.g", "flags.l", "sp", "im", "is", "mar", "mdr",
            "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "cycle", "running", "in_isr",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::INITIAL_SP;
    use emu_core::{BufferedOutput, ManualClock, NullInput};

    fn step_once(cpu: &mut Ls8) -> Option<Exit> {
        let mut clock = ManualClock::new();
        let mut input = NullInput;
        let mut output = BufferedOutput::new();
        cpu.step(&mut clock, &mut input, &mut output)
    }

    #[test]
    fn plain_instructions_advance_pc_by_their_length() {
        let mut cpu = Ls8::new();
        // LDI R0,8
        cpu.load(0x00, &[0x82, 0x00, 0x08]);

        assert_eq!(step_once(&mut cpu), None);
        assert_eq!(cpu.pc, 0x03);
        assert_eq!(cpu.reg.get(0), 8);
    }

    #[test]
    fn pc_setters_suppress_the_auto_advance() {
        let mut cpu = Ls8::new();
        // LDI R0,0x20; JMP R0
        cpu.load(0x00, &[0x82, 0x00, 0x20, 0x54, 0x00]);

        assert_eq!(step_once(&mut cpu), None);
        assert_eq!(step_once(&mut cpu), None);
        assert_eq!(cpu.pc, 0x20);
    }

    #[test]
    fn jump_not_taken_still_sets_pc() {
        let mut cpu = Ls8::new();
        // LDI R0,0x40; JEQ R0 with E clear: falls through to PC+2
        cpu.load(0x00, &[0x82, 0x00, 0x40, 0x55, 0x00]);

        assert_eq!(step_once(&mut cpu), None);
        assert_eq!(step_once(&mut cpu), None);
        assert_eq!(cpu.pc, 0x05);
    }

    #[test]
    fn push_then_pop_restores_value_and_sp() {
        let mut cpu = Ls8::new();
        cpu.push(0x2A);
        assert_eq!(cpu.reg.sp(), INITIAL_SP - 1);
        assert_eq!(cpu.pop(), 0x2A);
        assert_eq!(cpu.reg.sp(), INITIAL_SP);
    }

    #[test]
    fn hlt_stops_the_machine() {
        let mut cpu = Ls8::new();
        cpu.load(0x00, &[0x01]);

        assert_eq!(step_once(&mut cpu), Some(Exit::Halted));
        assert!(!cpu.is_running());
        // A stopped machine stays stopped.
        assert_eq!(step_once(&mut cpu), Some(Exit::Halted));
    }

    #[test]
    fn unknown_opcode_faults_with_the_offending_pc() {
        let mut cpu = Ls8::new();
        cpu.load(0x00, &[0x82, 0x00, 0x08, 0xEE]);

        assert_eq!(step_once(&mut cpu), None);
        let exit = step_once(&mut cpu);
        assert_eq!(
            exit,
            Some(Exit::Fault(Fault {
                kind: FaultKind::UnknownOpcode(0xEE),
                pc: 0x03,
            }))
        );
        assert!(!cpu.is_running());
    }

    #[test]
    fn mod_by_zero_faults() {
        let mut cpu = Ls8::new();
        // LDI R0,10; MOD R0,R1 (R1 is zero)
        cpu.load(0x00, &[0x82, 0x00, 0x0A, 0xA4, 0x00, 0x01]);

        assert_eq!(step_once(&mut cpu), None);
        let exit = step_once(&mut cpu);
        assert_eq!(
            exit,
            Some(Exit::Fault(Fault {
                kind: FaultKind::DivideByZero,
                pc: 0x03,
            }))
        );
    }

    #[test]
    fn fault_display_names_the_opcode_and_pc() {
        let fault = Fault {
            kind: FaultKind::UnknownOpcode(0xEE),
            pc: 0x03,
        };
        assert_eq!(fault.to_string(), "unknown opcode 0xEE at PC 0x03");
    }

    #[test]
    fn trace_shows_pc_fetch_window_and_registers() {
        let mut cpu = Ls8::new();
        cpu.load(0x00, &[0x82, 0x00, 0x08]);

        assert_eq!(
            cpu.trace(),
            "TRACE: 00 | 82 00 08 | FL=00 | 00 00 00 00 00 00 00 F4"
        );
    }

    #[test]
    fn tracked_reads_expose_mar_and_mdr() {
        let mut cpu = Ls8::new();
        cpu.load(0x00, &[0x82, 0x00, 0x08]);
        step_once(&mut cpu);

        // The last tracked access of an LDI cycle is the speculative
        // operand_b read at PC+2.
        assert_eq!(cpu.query("mar"), Some(Value::U8(0x02)));
        assert_eq!(cpu.query("mdr"), Some(Value::U8(0x08)));
    }
}
