//! LS-8 emulator binary.
//!
//! Loads a program image and runs it on the console. PRN prints decimal
//! lines and PRA prints raw characters on stdout; keyboard interrupt
//! bytes arrive from stdin via a reader thread; the timer interrupt
//! follows the wall clock.

use std::io::{self, Read as _, Write as _};
use std::process;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use emu_core::{InputSource, OutputSink, WallClock};
use emu_ls8::{Exit, Ls8, loader};

struct CliArgs {
    image_path: String,
    trace: bool,
}

fn usage() {
    eprintln!("Usage: emu-ls8 [--trace] <image.ls8>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --trace    Print a machine state line per cycle to stderr");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut image_path = None;
    let mut trace = false;

    for arg in &args[1..] {
        match arg.as_str() {
            "--trace" => trace = true,
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
            other => {
                if image_path.is_some() {
                    eprintln!("Expected exactly one image file");
                    process::exit(1);
                }
                image_path = Some(other.to_string());
            }
        }
    }

    let Some(image_path) = image_path else {
        usage();
        process::exit(1);
    };

    CliArgs { image_path, trace }
}

/// Stdin drained on a reader thread so that polls never block the cycle
/// loop.
struct StdinInput {
    rx: Receiver<u8>,
}

impl StdinInput {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = io::stdin();
            for byte in stdin.lock().bytes() {
                let Ok(byte) = byte else { break };
                // One keypress, one interrupt: line endings are not input.
                if byte == b'\n' || byte == b'\r' {
                    continue;
                }
                if tx.send(byte).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }
}

impl InputSource for StdinInput {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        match self.rx.try_recv() {
            Ok(byte) => Ok(Some(byte)),
            // A closed stdin just means no more keyboard interrupts.
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }
}

/// Console sink: PRN as a decimal line, PRA as a raw character.
struct StdoutOutput;

impl OutputSink for StdoutOutput {
    fn print_value(&mut self, value: u8) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{value}")?;
        stdout.flush()
    }

    fn print_char(&mut self, byte: u8) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}", char::from(byte))?;
        stdout.flush()
    }
}

fn main() {
    let cli = parse_args();

    let text = match std::fs::read_to_string(&cli.image_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{}: {e}", cli.image_path);
            process::exit(2);
        }
    };

    let mut cpu = Ls8::new();
    if let Err(e) = loader::load_image(&mut cpu, &text) {
        eprintln!("{}: {e}", cli.image_path);
        process::exit(1);
    }

    let mut clock = WallClock::new();
    let mut input = StdinInput::spawn();
    let mut output = StdoutOutput;

    let exit = if cli.trace {
        loop {
            eprintln!("{}", cpu.trace());
            if let Some(exit) = cpu.step(&mut clock, &mut input, &mut output) {
                break exit;
            }
        }
    } else {
        cpu.run(&mut clock, &mut input, &mut output)
    };

    if let Exit::Fault(fault) = exit {
        eprintln!("{fault}");
        process::exit(1);
    }
}
