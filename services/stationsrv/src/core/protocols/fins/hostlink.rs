//! HostLink ASCII framing for serial links
//!
//! ```text
//! @00FA 0000000000 10 2310 WWW BB 0001 DD FCS *\r
//! │     │          │  │    │   │  │    │  │
//! │     │          │  │    │   │  │    │  └ XOR of every preceding char
//! │     │          │  │    │   │  │    └ 01 = ON, 00 = OFF
//! │     │          │  │    │   │  └ bit count
//! │     │          │  │    │   └ bit, 2 hex digits
//! │     │          │  │    └ word, 3 hex digits
//! │     │          │  └ bit write, W area
//! │     │          └ service id
//! │     └ network header
//! └ unit 00, FINS command header
//! ```

use super::{BitAddress, ReplyStatus};

const HEADER: &str = "@00FA";
const NETWORK_HEADER: &str = "0000000000";
const SERVICE_ID: &str = "10";
const WRITE_W_BIT: &str = "2310";
const BIT_COUNT: &str = "0001";
const TERMINATOR: &str = "*\r";

/// Frame check sequence: XOR of every byte
pub fn fcs(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Build the complete write-bit command, terminator included
pub fn build_bit_write(address: BitAddress, on: bool) -> String {
    let mut frame = String::with_capacity(48);
    frame.push_str(HEADER);
    frame.push_str(NETWORK_HEADER);
    frame.push_str(SERVICE_ID);
    frame.push_str(WRITE_W_BIT);
    frame.push_str(&format!("{:03X}", address.word));
    frame.push_str(&format!("{:02X}", address.bit));
    frame.push_str(BIT_COUNT);
    frame.push_str(if on { "01" } else { "00" });

    let check = fcs(&frame);
    frame.push_str(&format!("{:02X}", check));
    frame.push_str(TERMINATOR);
    frame
}

/// Classify whatever arrived on the port after a write
///
/// `None` means nothing arrived, which callers treat as sent but unconfirmed.
pub fn interpret_reply(raw: &[u8]) -> Option<ReplyStatus> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains("00") {
        Some(ReplyStatus::Normal)
    } else {
        Some(ReplyStatus::Abnormal(text.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn addr(word: u16, bit: u8) -> BitAddress {
        BitAddress::new(word, bit).unwrap()
    }

    #[test]
    fn test_build_bit_write_on() {
        assert_eq!(
            build_bit_write(addr(511, 11), true),
            "@00FA00000000001023101FF0B00010105*\r"
        );
    }

    #[test]
    fn test_build_bit_write_off_and_low_word() {
        assert_eq!(
            build_bit_write(addr(511, 12), false),
            "@00FA00000000001023101FF0C00010005*\r"
        );
        assert_eq!(
            build_bit_write(addr(100, 0), true),
            "@00FA00000000001023100640000010174*\r"
        );
    }

    #[test]
    fn test_fcs_is_xor_of_preceding_chars() {
        let frame = build_bit_write(addr(511, 13), true);
        let body = &frame[..frame.len() - 4];
        let expected = body.bytes().fold(0u8, |a, b| a ^ b);
        assert_eq!(&frame[frame.len() - 4..frame.len() - 2], format!("{:02X}", expected));
        assert_eq!(frame, build_bit_write(addr(511, 13), true));
        assert!(frame.ends_with("*\r"));
    }

    #[test]
    fn test_interpret_reply() {
        assert_eq!(interpret_reply(b""), None);
        assert_eq!(interpret_reply(b"  \r\n"), None);
        assert_eq!(
            interpret_reply(b"@00FA00400000000102310000*\r"),
            Some(ReplyStatus::Normal)
        );
        assert_eq!(
            interpret_reply(b"@01FA1404*\r"),
            Some(ReplyStatus::Abnormal("@01FA1404*".to_string()))
        );
    }
}
