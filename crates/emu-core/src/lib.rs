//! Host integration traits and types for machine cores.
//!
//! A machine core owns all of its state and talks to the outside world
//! through these traits: a monotonic clock for timer interrupts, a
//! non-blocking byte source for keyboard interrupts, and an output sink
//! for the print instructions. Everything is polled; nothing blocks.

mod clock;
mod input;
mod observable;
mod output;

pub use clock::{Clock, ManualClock, WallClock};
pub use input::{InputSource, NullInput, QueuedInput};
pub use observable::{Observable, Value};
pub use output::{BufferedOutput, Emission, OutputSink};
