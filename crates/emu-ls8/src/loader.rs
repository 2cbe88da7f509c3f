//! Program image loader.
//!
//! Images are text: one base-2 byte per line, `#` starts a comment,
//! blank and comment-only lines are ignored. Bytes load into successive
//! addresses starting at 0.
//!
//! ```text
//! # print the number 8
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 01000111 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```

use crate::cpu::Ls8;
use crate::memory::MEMORY_SIZE;

/// Parse an image file into its program bytes.
pub fn parse_image(text: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let code = line.split('#').next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }

        let value = u8::from_str_radix(code, 2)
            .map_err(|_| format!("line {}: {code:?} is not a base-2 byte", index + 1))?;

        if bytes.len() >= MEMORY_SIZE {
            return Err(format!(
                "line {}: image exceeds {MEMORY_SIZE} bytes of memory",
                index + 1
            ));
        }
        bytes.push(value);
    }

    Ok(bytes)
}

/// Parse an image and load it into memory starting at address 0.
pub fn load_image(cpu: &mut Ls8, text: &str) -> Result<(), String> {
    let bytes = parse_image(text)?;
    cpu.load(0, &bytes);
    Ok(())
}
