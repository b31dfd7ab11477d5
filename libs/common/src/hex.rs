//! Hex rendering for frame dumps
//!
//! Binary FINS frames are logged as spaced uppercase bytes, HostLink frames
//! are already ASCII and only need their control characters made visible.

use std::fmt::Write;

/// Encode bytes to uppercase hex string
/// Example: [0x12, 0x34, 0xAB] -> "1234AB"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to String buffer is infallible
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Space separated uppercase bytes
/// Example: [0x80, 0x00, 0x02] -> "80 00 02"
pub fn format_frame(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Render an ASCII frame with `\r`, `\n` and other control bytes escaped
pub fn escape_ascii_frame(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'\r' => result.push_str("\\r"),
            b'\n' => result.push_str("\\n"),
            0x20..=0x7E => result.push(byte as char),
            _ => {
                let _ = write!(&mut result, "\\x{:02X}", byte);
            },
        }
    }
    result
}
