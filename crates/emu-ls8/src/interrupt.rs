//! Interrupt controller: event sources, masking, and service sequences.
//!
//! Two sources feed the Interrupt Status register: a timer that raises
//! bit 0 once per elapsed wall-clock second, and a keyboard that raises
//! bit 1 whenever the input source has a byte. Pending interrupts are
//! `IM & IS`; the lowest-numbered set bit wins. Servicing is
//! non-reentrant: the in-ISR latch defers everything else until IRET, so
//! the stack frame layout is deterministic.

use emu_core::{Clock, InputSource};

use crate::cpu::{FaultKind, Ls8};
use crate::flags::Flags;
use crate::memory::{KEYBOARD_BUFFER, VECTOR_BASE};

/// IS bit raised by the timer source (interrupt 0).
pub const TIMER: u8 = 0x01;

/// IS bit raised by the keyboard source (interrupt 1).
pub const KEYBOARD: u8 = 0x02;

impl Ls8 {
    /// Sample the event sources and raise IS bits.
    ///
    /// Runs at the top of every cycle, before fetch. The keyboard byte
    /// lands in the buffer cell whether or not the interrupt is masked.
    pub(crate) fn poll_interrupt_sources<C: Clock, I: InputSource>(
        &mut self,
        clock: &mut C,
        input: &mut I,
    ) -> Result<(), FaultKind> {
        match input.poll_byte() {
            Ok(Some(byte)) => {
                self.mem.write(KEYBOARD_BUFFER, byte);
                self.raise_interrupt(KEYBOARD);
            }
            Ok(None) => {}
            Err(e) => return Err(FaultKind::Io(e.to_string())),
        }

        let now = clock.monotonic_seconds();
        match self.timer_anchor {
            // First sample: the first raise comes one second from here.
            None => self.timer_anchor = Some(now),
            Some(anchor) if now - anchor >= 1.0 => {
                self.raise_interrupt(TIMER);
                self.timer_anchor = Some(now);
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Set a bit in the Interrupt Status register (R6).
    pub(crate) fn raise_interrupt(&mut self, bit: u8) {
        let status = self.reg.interrupt_status();
        self.reg.set_interrupt_status(status | bit);
    }

    /// Service the lowest-numbered pending interrupt, if any.
    ///
    /// Pending means masked-in: `IM & IS`. The sequence clears the IS bit,
    /// latches the in-ISR state, pushes PC, FL, and R0..R6, then vectors
    /// through the table at `$F8 + i`.
    pub(crate) fn service_pending_interrupt(&mut self) {
        let pending = self.reg.interrupt_mask() & self.reg.interrupt_status();
        if pending == 0 {
            return;
        }

        let number = pending.trailing_zeros() as u8;
        let status = self.reg.interrupt_status();
        self.reg.set_interrupt_status(status & !(1 << number));
        self.in_isr = true;

        let pc = self.pc;
        self.push(pc);
        let fl = self.fl.to_byte();
        self.push(fl);
        for index in 0..=6 {
            let value = self.reg.get(index);
            self.push(value);
        }

        self.pc = self.mem.read(VECTOR_BASE.wrapping_add(number));
    }

    /// IRET: unwind the service frame and re-enable servicing.
    ///
    /// Pops R6..R0, then FL, then PC, the exact reverse of interrupt
    /// entry.
    pub(crate) fn return_from_interrupt(&mut self) {
        for index in (0..=6).rev() {
            let value = self.pop();
            self.reg.set(index, value);
        }
        self.fl = Flags::from_byte(self.pop());
        self.pc = self.pop();
        self.in_isr = false;
    }
}
