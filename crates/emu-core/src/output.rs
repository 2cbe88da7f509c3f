//! Output sink for the print instructions.

use std::fmt::Write as _;
use std::io;

/// Destination for machine output.
///
/// The machine emits two kinds of output: register values as decimal
/// integers and register values as single characters. Rendering (newlines,
/// buffering) is the sink's concern, not the machine's.
pub trait OutputSink {
    /// Emit a register value as a decimal integer.
    fn print_value(&mut self, value: u8) -> io::Result<()>;

    /// Emit a register value as a single character.
    fn print_char(&mut self, byte: u8) -> io::Result<()>;
}

/// A single recorded emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Decimal integer output.
    Value(u8),
    /// Character output.
    Char(u8),
}

/// A sink that records every emission in order.
///
/// Used by tests and batch capture to assert on exactly what a program
/// printed, independent of how a console would render it.
#[derive(Debug, Default)]
pub struct BufferedOutput {
    emissions: Vec<Emission>,
}

impl BufferedOutput {
    #[must_use]
    pub fn new() -> Self {
        Self {
            emissions: Vec::new(),
        }
    }

    /// Everything emitted so far, in order.
    #[must_use]
    pub fn emissions(&self) -> &[Emission] {
        &self.emissions
    }

    /// Rendered form: values as decimal text, characters verbatim.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for emission in &self.emissions {
            match *emission {
                Emission::Value(v) => {
                    let _ = write!(out, "{v}");
                }
                Emission::Char(b) => out.push(char::from(b)),
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.emissions.clear();
    }
}

impl OutputSink for BufferedOutput {
    fn print_value(&mut self, value: u8) -> io::Result<()> {
        self.emissions.push(Emission::Value(value));
        Ok(())
    }

    fn print_char(&mut self, byte: u8) -> io::Result<()> {
        self.emissions.push(Emission::Char(byte));
        Ok(())
    }
}
